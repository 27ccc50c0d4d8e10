//! Turns heterogeneous input rows into canonical records.
//!
//! Rows come from spreadsheets (headers verbatim), PDF extraction
//! (`District`, `Category`, `Value`, `Date`) and manual entry (`districtId`,
//! `category`, `value`, `date`). Each field is resolved from its key variants
//! independently, and the first field that cannot be resolved rejects the row.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};

use crate::models::{Cell, NewRecord, RawInputRow, StoreTimestamp};
use crate::registry::{Category, Registry};

const DISTRICT_ID_KEYS: &[&str] = &["districtId", "district_id"];
const DISTRICT_NAME_KEYS: &[&str] = &["District", "districtName"];
const DATE_KEYS: &[&str] = &["Date", "date"];
const CATEGORY_KEYS: &[&str] = &["Category", "category"];
const VALUE_KEYS: &[&str] = &["Value", "value"];

/// Largest serial accepted as a spreadsheet date (year 9999 is ~2.96M).
const MAX_SERIAL: f64 = 3_000_000.0;

/// Smallest serial accepted from a text cell (1927-05-18). Shorter numbers
/// such as a bare year are not dates.
const MIN_TEXT_SERIAL: f64 = 10_000.0;

const TEXT_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
];

const TEXT_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NormalizationError {
    #[error("district not found: {0}")]
    UnknownDistrict(String),
    #[error("invalid date: {0}")]
    InvalidDate(String),
    #[error("invalid category: {0}")]
    InvalidCategory(String),
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

/// Every shape a date can arrive in.
#[derive(Debug, Clone, PartialEq)]
pub enum DateLike {
    NativeDate(NaiveDate),
    StoreTimestamp(StoreTimestamp),
    Serial(f64),
    Text(String),
}

impl DateLike {
    pub fn from_cell(cell: &Cell) -> Option<Self> {
        match cell {
            Cell::Date(date) => Some(DateLike::NativeDate(*date)),
            Cell::Timestamp(ts) => Some(DateLike::StoreTimestamp(*ts)),
            Cell::Number(serial) => Some(DateLike::Serial(*serial)),
            Cell::Text(text) => Some(DateLike::Text(text.clone())),
            Cell::Empty | Cell::Bool(_) => None,
        }
    }

    pub fn to_calendar_date(&self) -> Option<NaiveDate> {
        match self {
            DateLike::NativeDate(date) => Some(*date),
            DateLike::StoreTimestamp(ts) => ts.to_date(),
            DateLike::Serial(serial) => excel_serial_to_date(*serial),
            DateLike::Text(text) => parse_date_text(text),
        }
    }
}

/// Converts an Excel/Lotus serial day number. Day zero is 1899-12-30, which
/// absorbs the Lotus leap-year bug for every date after February 1900.
/// The fractional part is a time of day and is dropped.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial.abs() > MAX_SERIAL {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let days = Duration::try_days(serial.floor() as i64)?;
    epoch.checked_add_signed(days)
}

fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    // CSV cells arrive as text, so a bare number is still a serial.
    if let Ok(serial) = trimmed.parse::<f64>() {
        if serial < MIN_TEXT_SERIAL {
            return None;
        }
        return excel_serial_to_date(serial);
    }

    if let Ok(datetime) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(datetime.date_naive());
    }

    TEXT_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
        .or_else(|| {
            TEXT_DATETIME_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
                .map(|datetime| datetime.date())
        })
}

/// Normalizes one row against the registry.
pub fn normalize(row: &RawInputRow, registry: &Registry) -> Result<NewRecord, NormalizationError> {
    let district_id = resolve_district(row, registry)?;
    let date = resolve_date(row)?;
    let category = resolve_category(row)?;
    let value = resolve_value(row)?;

    Ok(NewRecord {
        district_id,
        category,
        value,
        date,
    })
}

fn resolve_district(row: &RawInputRow, registry: &Registry) -> Result<i32, NormalizationError> {
    let explicit = row.first_of(DISTRICT_ID_KEYS);
    if let Some(district) = explicit
        .and_then(cell_as_district_id)
        .and_then(|id| registry.by_id(id))
    {
        return Ok(district.id);
    }

    let named = row.first_of(DISTRICT_NAME_KEYS);
    if let Some(Cell::Text(name)) = named {
        if let Some(district) = registry.by_name(name) {
            return Ok(district.id);
        }
    }

    let seen = named
        .or(explicit)
        .map_or_else(|| "missing".to_string(), |cell| format!("{cell:?}"));
    Err(NormalizationError::UnknownDistrict(seen))
}

fn cell_as_district_id(cell: &Cell) -> Option<i32> {
    match cell {
        Cell::Number(number) if number.fract() == 0.0 => i32::try_from(*number as i64).ok(),
        Cell::Text(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn resolve_date(row: &RawInputRow) -> Result<NaiveDate, NormalizationError> {
    let cell = row
        .first_of(DATE_KEYS)
        .ok_or_else(|| NormalizationError::InvalidDate("missing".to_string()))?;

    DateLike::from_cell(cell)
        .and_then(|date| date.to_calendar_date())
        .ok_or_else(|| NormalizationError::InvalidDate(cell.to_string()))
}

fn resolve_category(row: &RawInputRow) -> Result<Category, NormalizationError> {
    match row.first_of(CATEGORY_KEYS) {
        Some(Cell::Text(tag)) => tag
            .parse()
            .map_err(|_| NormalizationError::InvalidCategory(tag.clone())),
        Some(other) => Err(NormalizationError::InvalidCategory(other.to_string())),
        None => Err(NormalizationError::InvalidCategory("missing".to_string())),
    }
}

fn resolve_value(row: &RawInputRow) -> Result<f64, NormalizationError> {
    let cell = row
        .first_of(VALUE_KEYS)
        .ok_or_else(|| NormalizationError::InvalidValue("missing".to_string()))?;

    let value = match cell {
        Cell::Number(number) => Some(*number),
        Cell::Text(text) => text.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    };

    match value {
        Some(value) if value.is_finite() && value >= 0.0 => Ok(value),
        _ => Err(NormalizationError::InvalidValue(cell.to_string())),
    }
}
