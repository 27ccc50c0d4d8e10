use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::PerformanceMetric;

pub const NOT_ENOUGH_DATA: &str =
    "Not enough data to generate an insight. Please select a different date range or district.";
pub const SUMMARY_UNAVAILABLE: &str = "Could not generate an AI insight at this time.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub summary: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    #[error("summarizer unavailable: {0}")]
    Unavailable(String),
    #[error("summarizer returned malformed output: {0}")]
    Malformed(String),
}

/// Turns KPI metrics into one readable sentence. Implementations never touch
/// stored data.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, metrics: &[PerformanceMetric]) -> Result<Summary, SummaryError>;
}

/// False when every metric is zero; summarizing that is pointless.
pub fn has_signal(metrics: &[PerformanceMetric]) -> bool {
    metrics.iter().any(|metric| metric.value != 0.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// Hands out increasing tickets so late results from superseded requests can
/// be recognised and dropped.
#[derive(Debug, Default)]
pub struct RequestGate {
    latest: AtomicU64,
}

impl RequestGate {
    pub fn issue(&self) -> Ticket {
        Ticket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }
}

/// Keeps the visible summary in step with the latest request.
pub struct SummaryService<Z> {
    summarizer: Z,
    gate: RequestGate,
    visible: Mutex<Option<String>>,
}

impl<Z: Summarizer> SummaryService<Z> {
    pub fn new(summarizer: Z) -> Self {
        Self {
            summarizer,
            gate: RequestGate::default(),
            visible: Mutex::new(None),
        }
    }

    /// Produces a summary for `metrics` and makes it visible, unless a newer
    /// request was issued meanwhile. Returns the applied text, or `None` when
    /// the result was stale.
    pub async fn refresh(&self, metrics: &[PerformanceMetric]) -> Option<String> {
        let ticket = self.gate.issue();

        let text = if has_signal(metrics) {
            match self.summarizer.summarize(metrics).await {
                Ok(summary) => summary.summary,
                Err(err) => {
                    warn!(error = %err, "summary generation failed");
                    SUMMARY_UNAVAILABLE.to_string()
                }
            }
        } else {
            NOT_ENOUGH_DATA.to_string()
        };

        let mut visible = self.visible.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.gate.is_current(ticket) {
            debug!("discarding stale summary");
            return None;
        }
        *visible = Some(text.clone());
        Some(text)
    }

    pub fn current(&self) -> Option<String> {
        self.visible
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Offline summarizer: names the overall direction and the metric that moved
/// the most (or, when nothing moved, the largest one).
#[derive(Debug, Clone, Copy, Default)]
pub struct HighlightSummarizer;

#[async_trait]
impl Summarizer for HighlightSummarizer {
    async fn summarize(&self, metrics: &[PerformanceMetric]) -> Result<Summary, SummaryError> {
        let rising = metrics.iter().filter(|m| m.change > 0.0).count();
        let falling = metrics.iter().filter(|m| m.change < 0.0).count();
        let direction = match rising.cmp(&falling) {
            std::cmp::Ordering::Greater => "improved",
            std::cmp::Ordering::Less => "declined",
            std::cmp::Ordering::Equal => "held steady",
        };

        let moved = metrics
            .iter()
            .filter(|m| m.change != 0.0)
            .max_by(|a, b| a.change.abs().total_cmp(&b.change.abs()));

        let sentence = match moved {
            Some(metric) => format!(
                "Performance {direction} over the previous month across {rising} of {} categories, led by {} at {} ({:+.1}%).",
                metrics.len(),
                metric.label,
                format_value(metric.value),
                metric.change
            ),
            None => {
                let largest = metrics
                    .iter()
                    .max_by(|a, b| a.value.total_cmp(&b.value))
                    .ok_or_else(|| SummaryError::Malformed("no metrics".to_string()))?;
                format!(
                    "Performance {direction} over the previous month, with {} leading at {}.",
                    largest.label,
                    format_value(largest.value)
                )
            }
        };

        Ok(Summary { summary: sentence })
    }
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}
