//! Record - Sparse Forestry Operation Rows
//!
//! `TigerStyle`: Reserved metadata kept apart from the free-form fields.
//!
//! A record is one spreadsheet row. Its columns vary from sheet to sheet, so
//! the fields are an insertion-ordered map rather than a fixed struct. The
//! three keys the ingestion layer adds (`_id`, `_sheetName`, `_rowIndex`)
//! live in [`RecordMeta`]. Both flatten into a single JSON object on disk:
//!
//! ```json
//! {"_id":"sheet_0_row_5","_sheetName":"整地","_rowIndex":5,"林场":"南山林场","作业面积":12.5}
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::constants::{RECORD_ID_KEY, RECORD_ROW_INDEX_KEY, RECORD_SHEET_NAME_KEY};

// =============================================================================
// FieldValue
// =============================================================================

/// A scalar cell value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Textual cell
    Text(String),
    /// Numeric cell, kept in its JSON form so integers stay integers
    Number(serde_json::Number),
    /// Blank cell
    Empty,
}

impl FieldValue {
    /// Text content, if this is a text cell.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric content as `f64`, if this is a number cell.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    /// Whether this cell is blank.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

impl From<f64> for FieldValue {
    /// Non-finite floats have no JSON form and become [`FieldValue::Empty`].
    fn from(value: f64) -> Self {
        serde_json::Number::from_f64(value).map_or(Self::Empty, Self::Number)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Empty, Into::into)
    }
}

// =============================================================================
// RecordMeta
// =============================================================================

/// Metadata attached to every record by the ingestion layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    /// Unique identifier, e.g. `sheet_0_row_5`
    #[serde(rename = "_id")]
    pub id: String,
    /// Name of the sheet the row came from
    #[serde(rename = "_sheetName")]
    pub sheet_name: String,
    /// One-based row index in the source sheet
    #[serde(rename = "_rowIndex")]
    pub row_index: u64,
}

impl RecordMeta {
    /// Create metadata.
    ///
    /// # Panics
    /// Panics if `id` is empty.
    #[must_use]
    pub fn new(id: impl Into<String>, sheet_name: impl Into<String>, row_index: u64) -> Self {
        let id = id.into();

        // Precondition
        assert!(!id.is_empty(), "record id must not be empty");

        Self {
            id,
            sheet_name: sheet_name.into(),
            row_index,
        }
    }

    /// Metadata for a row in the ingestion layer's id scheme.
    #[must_use]
    pub fn for_sheet_row(sheet_index: usize, sheet_name: impl Into<String>, row_index: u64) -> Self {
        Self::new(
            format!("sheet_{sheet_index}_row_{row_index}"),
            sheet_name,
            row_index,
        )
    }
}

// =============================================================================
// Record
// =============================================================================

/// One persisted row: metadata plus a sparse, ordered field map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Reserved metadata
    #[serde(flatten)]
    pub meta: RecordMeta,
    /// Column name to cell value, in source column order
    #[serde(flatten)]
    fields: IndexMap<String, FieldValue>,
}

impl Record {
    /// Create a record with no fields.
    #[must_use]
    pub fn new(meta: RecordMeta) -> Self {
        Self {
            meta,
            fields: IndexMap::new(),
        }
    }

    /// Whether `name` collides with one of the metadata keys.
    #[must_use]
    pub fn is_reserved(name: &str) -> bool {
        name == RECORD_ID_KEY || name == RECORD_SHEET_NAME_KEY || name == RECORD_ROW_INDEX_KEY
    }

    /// Add a field (builder style).
    ///
    /// # Panics
    /// Panics if `name` is empty or reserved.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Set a field, returning the previous value.
    ///
    /// # Panics
    /// Panics if `name` is empty or reserved.
    pub fn set(
        &mut self,
        name: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Option<FieldValue> {
        let name = name.into();

        // Preconditions
        assert!(!name.is_empty(), "field name must not be empty");
        assert!(
            !Self::is_reserved(&name),
            "field name {name} is reserved for record metadata"
        );

        self.fields.insert(name, value.into())
    }

    /// Get a field value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Remove a field, keeping the order of the remaining ones.
    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.shift_remove(name)
    }

    /// Iterate fields in column order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields (metadata excluded).
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Record id shortcut.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.meta.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Record {
        Record::new(RecordMeta::for_sheet_row(0, "整地", 5))
            .with_field("林场", "南山林场")
            .with_field("更新年度", 2018_i64)
            .with_field("作业面积", 12.5)
            .with_field("备注", FieldValue::Empty)
    }

    #[test]
    fn test_json_shape_is_flat() {
        let json = serde_json::to_string(&sample()).unwrap();

        assert_eq!(
            json,
            r#"{"_id":"sheet_0_row_5","_sheetName":"整地","_rowIndex":5,"林场":"南山林场","更新年度":2018,"作业面积":12.5,"备注":null}"#
        );
    }

    #[test]
    fn test_parse_keeps_meta_out_of_fields() {
        let json = r#"{"_id":"demo_1","_sheetName":"整地","_rowIndex":3,"作业人":"张三","投资标准":20}"#;

        let record: Record = serde_json::from_str(json).unwrap();

        assert_eq!(record.meta, RecordMeta::new("demo_1", "整地", 3));
        assert_eq!(record.field_count(), 2);
        assert!(record.get("_id").is_none());
        assert_eq!(record.get("作业人"), Some(&FieldValue::from("张三")));
        assert_eq!(record.get("投资标准").and_then(FieldValue::as_f64), Some(20.0));
    }

    #[test]
    fn test_field_order_preserved() {
        let record = sample();
        let names: Vec<&str> = record.fields().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["林场", "更新年度", "作业面积", "备注"]);

        let parsed: Record = serde_json::from_str(&serde_json::to_string(&record).unwrap()).unwrap();
        let parsed_names: Vec<&str> = parsed.fields().map(|(k, _)| k).collect();
        assert_eq!(parsed_names, names);
    }

    #[test]
    fn test_integer_stays_integer() {
        let value = FieldValue::from(2015_i64);
        assert_eq!(serde_json::to_string(&value).unwrap(), "2015");
    }

    #[test]
    fn test_non_finite_float_is_empty() {
        assert!(FieldValue::from(f64::NAN).is_empty());
        assert!(FieldValue::from(f64::INFINITY).is_empty());
    }

    #[test]
    fn test_set_returns_previous() {
        let mut record = sample();
        let old = record.set("林场", "东山林场");
        assert_eq!(old, Some(FieldValue::from("南山林场")));
        assert_eq!(record.remove("林场"), Some(FieldValue::from("东山林场")));
        assert_eq!(record.field_count(), 3);
    }

    #[test]
    #[should_panic(expected = "reserved for record metadata")]
    fn test_reserved_field_rejected() {
        let _ = sample().with_field("_rowIndex", 1_i64);
    }

    #[test]
    #[should_panic(expected = "record id must not be empty")]
    fn test_empty_id_rejected() {
        let _ = RecordMeta::new("", "sheet", 1);
    }
}
