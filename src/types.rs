//! Core data model types.
//!
//! Datasets are held in memory as a [`DataSet`]: a [`Schema`] (a list of typed [`Field`]s) plus
//! row-major [`Value`] storage in schema order.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Logical data type for a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point number.
    Float64,
    /// UTF-8 string.
    Utf8,
    /// Calendar date (no time component).
    Date,
}

impl DataType {
    /// Whether values of this type are numeric.
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Int64 | Self::Float64)
    }
}

/// A single named, typed field in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Field/column name. This is also the header written to artifacts.
    pub name: String,
    /// Field data type.
    pub data_type: DataType,
    /// Alternative header spellings accepted on ingestion.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    /// Load numeric cells that do not parse as null instead of failing the load.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub lenient: bool,
}

impl Field {
    /// Create a new field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            aliases: Vec::new(),
            lenient: false,
        }
    }

    /// Add an accepted alternative header spelling.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Accept unparseable numeric cells as null.
    pub fn lenient(mut self) -> Self {
        self.lenient = true;
        self
    }

    /// Whether `header` names this field.
    ///
    /// Exact name or alias matches win; otherwise a trimmed, case-insensitive comparison is used.
    pub fn matches_header(&self, header: &str) -> bool {
        let header = header.trim();
        if header == self.name || self.aliases.iter().any(|a| a == header) {
            return true;
        }
        let lower = header.to_lowercase();
        lower == self.name.to_lowercase() || self.aliases.iter().any(|a| a.to_lowercase() == lower)
    }
}

/// A list of fields describing the expected shape of incoming data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Ordered list of fields.
    pub fields: Vec<Field>,
}

impl Schema {
    /// Create a new schema from fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Returns the index of a field by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// A single typed value in a [`DataSet`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Missing/empty value.
    Null,
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// UTF-8 string.
    Utf8(String),
    /// Calendar date.
    Date(NaiveDate),
}

impl Value {
    /// Whether this is [`Value::Null`] or a blank string.
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Utf8(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int64(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }
}

/// Date patterns tried after the preferred one: day-first first, then ISO.
const FALLBACK_DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%Y-%m-%d", "%d-%m-%Y", "%Y/%m/%d"];

/// Date-time patterns whose date part is kept.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Parse a date string, trying `preferred` first, then day-first and ISO patterns.
///
/// Returns `None` for blank or unparseable input.
pub fn parse_date(raw: &str, preferred: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    std::iter::once(preferred)
        .chain(FALLBACK_DATE_FORMATS.iter().copied())
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
}

/// Date view of a value: dates as-is, strings parsed with [`parse_date`], anything else `None`.
pub fn coerce_date(value: &Value, preferred: &str) -> Option<NaiveDate> {
    match value {
        Value::Date(d) => Some(*d),
        Value::Utf8(s) => parse_date(s, preferred),
        _ => None,
    }
}

/// In-memory tabular dataset.
///
/// Rows are stored as `Vec<Vec<Value>>` in the same order as the [`Schema`] fields.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSet {
    /// Schema describing row shape.
    pub schema: Schema,
    /// Row-major value storage.
    pub rows: Vec<Vec<Value>>,
}

impl DataSet {
    /// Create a dataset from schema and rows.
    pub fn new(schema: Schema, rows: Vec<Vec<Value>>) -> Self {
        Self { schema, rows }
    }

    /// Number of rows in the dataset.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Whether the dataset has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Create a new dataset by applying `mapper` to every row.
    ///
    /// The returned dataset preserves the original schema.
    ///
    /// # Panics
    ///
    /// Panics if `mapper` returns a row with a different length than the schema field count.
    pub fn map_rows<F>(&self, mut mapper: F) -> Self
    where
        F: FnMut(&[Value]) -> Vec<Value>,
    {
        let expected_len = self.schema.fields.len();
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let out = mapper(row.as_slice());
                assert!(
                    out.len() == expected_len,
                    "mapped row length {} does not match schema length {}",
                    out.len(),
                    expected_len
                );
                out
            })
            .collect();

        Self {
            schema: self.schema.clone(),
            rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{coerce_date, parse_date, DataSet, DataType, Field, Schema, Value};

    #[test]
    fn parse_date_prefers_day_first_and_falls_back_to_iso() {
        let march_5 = NaiveDate::from_ymd_opt(2021, 3, 5).unwrap();
        assert_eq!(parse_date("05/03/2021", "%d/%m/%Y"), Some(march_5));
        assert_eq!(parse_date("2021-03-05", "%d/%m/%Y"), Some(march_5));
        assert_eq!(parse_date("2021-03-05 14:30:00", "%d/%m/%Y"), Some(march_5));
        assert_eq!(parse_date("not a date", "%d/%m/%Y"), None);
        assert_eq!(parse_date("  ", "%d/%m/%Y"), None);
    }

    #[test]
    fn coerce_date_ignores_non_date_values() {
        let d = NaiveDate::from_ymd_opt(2020, 1, 31).unwrap();
        assert_eq!(coerce_date(&Value::Date(d), "%d/%m/%Y"), Some(d));
        assert_eq!(coerce_date(&Value::Utf8("31/01/2020".into()), "%d/%m/%Y"), Some(d));
        assert_eq!(coerce_date(&Value::Int64(20200131), "%d/%m/%Y"), None);
    }

    fn sample_dataset() -> DataSet {
        let schema = Schema::new(vec![
            Field::new("Id", DataType::Int64),
            Field::new("Data Emissao", DataType::Date).with_alias("Data emissao"),
            Field::new("Cliente", DataType::Utf8),
        ]);

        let rows = vec![
            vec![Value::Int64(1), Value::Null, Value::Utf8("a".to_string())],
            vec![Value::Int64(2), Value::Null, Value::Utf8("b".to_string())],
            vec![Value::Int64(3), Value::Null, Value::Utf8("c".to_string())],
        ];

        DataSet::new(schema, rows)
    }

    #[test]
    fn schema_index_of_works() {
        let ds = sample_dataset();
        assert_eq!(ds.schema.index_of("Id"), Some(0));
        assert_eq!(ds.schema.index_of("Cliente"), Some(2));
        assert_eq!(ds.schema.index_of("missing"), None);
    }

    #[test]
    fn field_matches_aliases_and_case_insensitive_headers() {
        let f = Field::new("Data Emissao", DataType::Date).with_alias("Data emissao");
        assert!(f.matches_header("Data Emissao"));
        assert!(f.matches_header("Data emissao"));
        assert!(f.matches_header(" DATA EMISSAO "));
        assert!(!f.matches_header("Data vencimento"));
    }

    #[test]
    fn missing_values_include_blank_strings() {
        assert!(Value::Null.is_missing());
        assert!(Value::Utf8("  ".to_string()).is_missing());
        assert!(!Value::Int64(0).is_missing());
    }

    #[test]
    #[should_panic(expected = "mapped row length")]
    fn map_rows_panics_if_mapper_returns_wrong_arity() {
        let ds = sample_dataset();
        let _ = ds.map_rows(|_row| vec![Value::Int64(1)]);
    }
}
