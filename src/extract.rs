//! PDF extraction collaborator. The extraction model is external; this module
//! only packages the document and turns the returned rows into input rows.

use std::process::Stdio;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::models::{Cell, RawInputRow};

/// One row as returned by the extraction model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRow {
    #[serde(rename = "District")]
    pub district: String,
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "Value")]
    pub value: f64,
    #[serde(rename = "Date")]
    pub date: String,
}

impl From<ExtractedRow> for RawInputRow {
    fn from(row: ExtractedRow) -> Self {
        RawInputRow::new()
            .with("District", row.district)
            .with("Category", row.category)
            .with("Value", Cell::Number(row.value))
            .with("Date", row.date)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Extraction {
    pub data: Vec<ExtractedRow>,
}

impl Extraction {
    pub fn into_rows(self) -> Vec<RawInputRow> {
        self.data.into_iter().map(RawInputRow::from).collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("failed to run extractor: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("extractor exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("extractor returned malformed output: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("extractor returned no rows")]
    Empty,
}

#[async_trait]
pub trait PdfExtractor: Send + Sync {
    async fn extract(&self, pdf_data_uri: &str) -> Result<Extraction, ExtractionError>;
}

pub fn pdf_data_uri(bytes: &[u8]) -> String {
    format!(
        "data:application/pdf;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// Runs an external program, writes the data URI to its stdin and reads
/// `{"data": [...]}` from its stdout.
#[derive(Debug, Clone)]
pub struct CommandExtractor {
    program: String,
    args: Vec<String>,
}

impl CommandExtractor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Splits a command line on whitespace; the first word is the program.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace().map(str::to_string);
        let program = words.next()?;
        Some(Self::new(program, words.collect()))
    }
}

#[async_trait]
impl PdfExtractor for CommandExtractor {
    async fn extract(&self, pdf_data_uri: &str) -> Result<Extraction, ExtractionError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Feed stdin while draining stdout/stderr; a child that writes before
        // reading everything would otherwise block on a full pipe.
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(pdf_data_uri.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            Ok::<_, std::io::Error>(())
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;
        if !output.status.success() {
            return Err(ExtractionError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        fed?;
        Ok(serde_json::from_slice(&output.stdout)?)
    }
}
