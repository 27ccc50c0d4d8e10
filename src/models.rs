use std::fmt;

use chrono::{DateTime, NaiveDate};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::registry::Category;

/// A record that passed normalization and is ready to be written.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRecord {
    pub district_id: i32,
    pub category: Category,
    pub value: f64,
    pub date: NaiveDate,
}

impl NewRecord {
    pub fn with_id(self, id: Uuid) -> PerformanceRecord {
        PerformanceRecord {
            id,
            district_id: self.district_id,
            category: self.category,
            value: self.value,
            date: self.date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceRecord {
    pub id: Uuid,
    pub district_id: i32,
    pub category: Category,
    pub value: f64,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceMetric {
    pub category: Category,
    pub label: String,
    pub value: f64,
    pub change: f64,
}

/// One running sum per category, indexed by [`Category::index`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CategoryTotals([f64; 8]);

impl CategoryTotals {
    pub fn add(&mut self, category: Category, value: f64) {
        self.0[category.index()] += value;
    }

    pub fn get(&self, category: Category) -> f64 {
        self.0[category.index()]
    }

    pub fn total(&self) -> f64 {
        self.0.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, f64)> + '_ {
        Category::ALL.into_iter().map(|category| (category, self.get(category)))
    }
}

impl Serialize for CategoryTotals {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Category::ALL.len()))?;
        for (category, value) in self.iter() {
            map.serialize_entry(category.as_str(), &value)?;
        }
        map.end()
    }
}

/// Timestamp as handed out by the document store: seconds and nanoseconds
/// since the Unix epoch, UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreTimestamp {
    pub seconds: i64,
    pub nanos: u32,
}

impl StoreTimestamp {
    pub fn to_date(self) -> Option<NaiveDate> {
        DateTime::from_timestamp(self.seconds, self.nanos).map(|dt| dt.date_naive())
    }
}

/// A single untyped cell of an input row.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
    Timestamp(StoreTimestamp),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(text) => f.write_str(text),
            Cell::Number(number) => write!(f, "{number}"),
            Cell::Bool(flag) => write!(f, "{flag}"),
            Cell::Date(date) => write!(f, "{date}"),
            Cell::Timestamp(ts) => write!(f, "{}s+{}ns", ts.seconds, ts.nanos),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<i32> for Cell {
    fn from(value: i32) -> Self {
        Cell::Number(f64::from(value))
    }
}

impl From<NaiveDate> for Cell {
    fn from(value: NaiveDate) -> Self {
        Cell::Date(value)
    }
}

impl From<serde_json::Value> for Cell {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => Cell::Empty,
            Value::Bool(flag) => Cell::Bool(flag),
            Value::Number(number) => number.as_f64().map_or(Cell::Empty, Cell::Number),
            Value::String(text) => Cell::Text(text),
            Value::Object(object) => {
                // Store timestamps serialize as {seconds, nanoseconds}, with or
                // without a leading underscore.
                let seconds = object
                    .get("seconds")
                    .or_else(|| object.get("_seconds"))
                    .and_then(Value::as_i64);
                let nanos = object
                    .get("nanoseconds")
                    .or_else(|| object.get("_nanoseconds"))
                    .and_then(Value::as_u64)
                    .and_then(|n| u32::try_from(n).ok())
                    .unwrap_or(0);
                match seconds {
                    Some(seconds) => Cell::Timestamp(StoreTimestamp { seconds, nanos }),
                    None => Cell::Text(Value::Object(object).to_string()),
                }
            }
            other => Cell::Text(other.to_string()),
        }
    }
}

/// An input row before normalization. Keys are kept exactly as the source
/// produced them (spreadsheet headers, extraction field names, form fields).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawInputRow {
    cells: Vec<(String, Cell)>,
}

impl RawInputRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, cell: impl Into<Cell>) -> Self {
        self.insert(key, cell);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, cell: impl Into<Cell>) {
        let key = key.into();
        let cell = cell.into();
        match self.cells.iter_mut().find(|(existing, _)| *existing == key) {
            Some(slot) => slot.1 = cell,
            None => self.cells.push((key, cell)),
        }
    }

    /// Looks a key up exactly, then by trimmed case-insensitive comparison.
    pub fn get(&self, key: &str) -> Option<&Cell> {
        self.cells
            .iter()
            .find(|(existing, _)| existing == key)
            .or_else(|| {
                self.cells
                    .iter()
                    .find(|(existing, _)| existing.trim().eq_ignore_ascii_case(key))
            })
            .map(|(_, cell)| cell)
    }

    /// First non-empty cell among the given key variants.
    pub fn first_of(&self, keys: &[&str]) -> Option<&Cell> {
        keys.iter()
            .filter_map(|key| self.get(key))
            .find(|cell| !cell.is_empty())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Cell)> {
        self.cells.iter().map(|(key, cell)| (key.as_str(), cell))
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for RawInputRow {
    fn from(object: serde_json::Map<String, serde_json::Value>) -> Self {
        object
            .into_iter()
            .fold(RawInputRow::new(), |row, (key, value)| row.with(key, Cell::from(value)))
    }
}

impl fmt::Display for RawInputRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (position, (key, cell)) in self.cells.iter().enumerate() {
            if position > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}: {cell}")?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_lookup_falls_back_to_case_insensitive() {
        let row = RawInputRow::new()
            .with("District", "Puri")
            .with(" VALUE ", 4.0);

        assert_eq!(row.get("District"), Some(&Cell::from("Puri")));
        assert_eq!(row.get("district"), Some(&Cell::from("Puri")));
        assert_eq!(row.get("value"), Some(&Cell::Number(4.0)));
        assert!(row.get("date").is_none());
    }

    #[test]
    fn first_of_skips_blank_variants() {
        let row = RawInputRow::new()
            .with("District", "  ")
            .with("districtName", "Cuttack");
        assert_eq!(
            row.first_of(&["District", "districtName"]),
            Some(&Cell::from("Cuttack"))
        );
    }

    #[test]
    fn json_objects_become_cells() {
        let value = json!({
            "District": "Puri",
            "Value": 12,
            "date": { "seconds": 1_672_531_200, "nanoseconds": 0 },
            "note": null
        });
        let serde_json::Value::Object(object) = value else {
            panic!("expected object");
        };
        let row = RawInputRow::from(object);

        assert_eq!(row.len(), 4);
        assert_eq!(row.get("Value"), Some(&Cell::Number(12.0)));
        assert_eq!(row.get("note"), Some(&Cell::Empty));
        let Some(Cell::Timestamp(ts)) = row.get("date") else {
            panic!("expected timestamp");
        };
        assert_eq!(ts.to_date(), NaiveDate::from_ymd_opt(2023, 1, 1));
    }

    #[test]
    fn totals_accumulate_per_category() {
        let mut totals = CategoryTotals::default();
        totals.add(Category::Nbw, 3.0);
        totals.add(Category::Nbw, 2.0);
        totals.add(Category::Firearms, 1.5);

        assert_eq!(totals.get(Category::Nbw), 5.0);
        assert_eq!(totals.get(Category::Conviction), 0.0);
        assert_eq!(totals.total(), 6.5);
        assert_eq!(totals.iter().count(), 8);
    }
}
