use std::path::Path;

use tracing::{info, warn};
use uuid::Uuid;

use crate::extract::{pdf_data_uri, ExtractionError, PdfExtractor};
use crate::models::{NewRecord, RawInputRow};
use crate::normalize::{normalize, NormalizationError};
use crate::registry::Registry;
use crate::sheet::{self, SheetError};
use crate::store::{RecordStore, StoreError};

/// A row that did not make it into the batch. `row` is 1-based.
#[derive(Debug, Clone, PartialEq)]
pub struct RowRejection {
    pub row: usize,
    pub error: NormalizationError,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportOutcome {
    pub added: usize,
    pub rejected: Vec<RowRejection>,
}

impl ImportOutcome {
    /// True when no row survived normalization. This is a validation result,
    /// not a transport failure.
    pub fn nothing_added(&self) -> bool {
        self.added == 0
    }

    pub fn total_rows(&self) -> usize {
        self.added + self.rejected.len()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),
    #[error("extraction failed: {0}")]
    ExtractionFailed(#[from] ExtractionError),
    #[error(transparent)]
    Source(#[from] SheetError),
    #[error("record rejected: {0}")]
    Rejected(#[from] NormalizationError),
}

/// Normalizes every row, logging and collecting the ones that fail.
pub fn prepare(rows: &[RawInputRow], registry: &Registry) -> (Vec<NewRecord>, Vec<RowRejection>) {
    let mut accepted = Vec::with_capacity(rows.len());
    let mut rejected = Vec::new();

    for (index, row) in rows.iter().enumerate() {
        match normalize(row, registry) {
            Ok(record) => accepted.push(record),
            Err(error) => {
                warn!(line = index + 1, %row, reason = %error, "skipping row");
                rejected.push(RowRejection {
                    row: index + 1,
                    error,
                });
            }
        }
    }

    (accepted, rejected)
}

pub struct Importer<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    registry: &'a Registry,
}

impl<'a, S: RecordStore + ?Sized> Importer<'a, S> {
    pub fn new(store: &'a S, registry: &'a Registry) -> Self {
        Self { store, registry }
    }

    /// Writes every row that normalizes in one batch. Nothing is written
    /// when no row does.
    pub async fn import_rows(&self, rows: &[RawInputRow]) -> Result<ImportOutcome, ImportError> {
        let (records, rejected) = prepare(rows, self.registry);

        if records.is_empty() {
            warn!(rows = rows.len(), "no valid rows to import");
            return Ok(ImportOutcome { added: 0, rejected });
        }

        self.store.batch_write(&records).await?;
        info!(
            added = records.len(),
            skipped = rejected.len(),
            "import committed"
        );

        Ok(ImportOutcome {
            added: records.len(),
            rejected,
        })
    }

    /// Reads a CSV or workbook and imports its rows.
    pub async fn import_sheet(&self, path: &Path) -> Result<ImportOutcome, ImportError> {
        let rows = sheet::read_rows(path)?;
        info!(path = %path.display(), rows = rows.len(), "spreadsheet parsed");
        self.import_rows(&rows).await
    }

    /// Sends the PDF through the extractor and imports what comes back.
    pub async fn import_pdf<E: PdfExtractor + ?Sized>(
        &self,
        extractor: &E,
        pdf: &[u8],
    ) -> Result<ImportOutcome, ImportError> {
        let extraction = extractor.extract(&pdf_data_uri(pdf)).await?;
        if extraction.data.is_empty() {
            return Err(ExtractionError::Empty.into());
        }
        info!(rows = extraction.data.len(), "pdf rows extracted");
        self.import_rows(&extraction.into_rows()).await
    }

    /// Manual entry: one row, one write. A bad row is an error here since
    /// there is no batch to carry on with.
    pub async fn submit(&self, row: &RawInputRow) -> Result<Uuid, ImportError> {
        let record = normalize(row, self.registry)?;
        let id = self.store.write(&record).await?;
        info!(%id, district_id = record.district_id, category = %record.category, "record submitted");
        Ok(id)
    }
}
