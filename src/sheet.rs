//! Spreadsheet parsing. Column headers become row keys verbatim; the
//! normalizer deals with the variants.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};

use crate::models::{Cell, RawInputRow};

#[derive(Debug, thiserror::Error)]
pub enum SheetError {
    #[error("failed to open spreadsheet: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to read CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to read workbook: {0}")]
    Workbook(#[from] calamine::Error),
    #[error("workbook has no worksheets")]
    NoWorksheet,
    #[error("unsupported spreadsheet format: {0}")]
    UnsupportedFormat(String),
}

pub fn read_csv<R: Read>(reader: R) -> Result<Vec<RawInputRow>, SheetError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();

    for result in reader.records() {
        let record = result?;
        let row = headers
            .iter()
            .zip(record.iter())
            .filter(|(header, _)| !header.trim().is_empty())
            .fold(RawInputRow::new(), |row, (header, field)| row.with(header, field));
        if row.iter().any(|(_, cell)| !cell.is_empty()) {
            rows.push(row);
        }
    }

    Ok(rows)
}

/// Reads the first worksheet of an XLSX/XLS/ODS workbook. Date cells come
/// back as spreadsheet serials.
pub fn read_workbook(path: &Path) -> Result<Vec<RawInputRow>, SheetError> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(SheetError::NoWorksheet)??;

    let mut lines = range.rows();
    let Some(header_line) = lines.next() else {
        return Ok(Vec::new());
    };
    let headers: Vec<String> = header_line.iter().map(ToString::to_string).collect();

    let mut rows = Vec::new();
    for line in lines {
        let row = headers
            .iter()
            .zip(line.iter())
            .filter(|(header, _)| !header.trim().is_empty())
            .fold(RawInputRow::new(), |row, (header, data)| {
                row.with(header.as_str(), cell_from_data(data))
            });
        if row.iter().any(|(_, cell)| !cell.is_empty()) {
            rows.push(row);
        }
    }

    Ok(rows)
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Int(number) => Cell::Number(*number as f64),
        Data::Float(number) => Cell::Number(*number),
        Data::String(text) => Cell::Text(text.clone()),
        Data::Bool(flag) => Cell::Bool(*flag),
        Data::DateTime(datetime) => Cell::Number(datetime.as_f64()),
        Data::DateTimeIso(text) | Data::DurationIso(text) => Cell::Text(text.clone()),
        _ => Cell::Empty,
    }
}

/// Picks a parser from the file extension.
pub fn read_rows(path: &Path) -> Result<Vec<RawInputRow>, SheetError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "csv" => read_csv(File::open(path)?),
        "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => read_workbook(path),
        other => Err(SheetError::UnsupportedFormat(other.to_string())),
    }
}
