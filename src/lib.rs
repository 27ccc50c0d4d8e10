//! Ingestion and aggregation core for a district performance dashboard.
//!
//! Rows arrive from spreadsheets, PDF extraction or manual entry, are
//! normalized into [`models::NewRecord`]s and written in one batch. The
//! [`aggregate`] functions turn a snapshot of stored records into KPI deltas,
//! a district comparison matrix, a month-wise trend and a leaderboard.

pub mod aggregate;
pub mod config;
pub mod db;
pub mod extract;
pub mod importer;
pub mod memory;
pub mod models;
pub mod normalize;
pub mod registry;
pub mod report;
pub mod sheet;
pub mod store;
pub mod summary;

pub use aggregate::{DashboardView, DateRange, Filters};
pub use importer::{ImportError, ImportOutcome, Importer};
pub use memory::MemoryStore;
pub use models::{Cell, NewRecord, PerformanceMetric, PerformanceRecord, RawInputRow};
pub use normalize::{normalize, NormalizationError};
pub use registry::{Category, District, Registry};
pub use store::{RecordQuery, RecordStore, StoreError, Subscription};
