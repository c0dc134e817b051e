//! CSV loading.

use std::path::Path;

use tracing::{debug, warn};

use crate::error::{ExportError, ExportResult};
use crate::types::{parse_date, DataSet, DataType, Field, Schema, Value};

/// Load a CSV file into a [`DataSet`] shaped by `schema`.
///
/// Rules:
///
/// - The first record is the header row; a leading UTF-8 BOM is ignored.
/// - Schema fields are matched to headers by name or alias (see [`crate::types::Field::matches_header`]);
///   column order does not matter and extra columns are dropped.
/// - Schema fields with no matching header are filled with [`Value::Null`].
/// - Date cells that cannot be parsed become [`Value::Null`], as do numeric cells of a
///   [`Field::lenient`] field; other type errors fail the load.
pub fn read_csv(path: impl AsRef<Path>, schema: &Schema, date_format: &str) -> ExportResult<DataSet> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;
    read_csv_from_reader(&mut rdr, schema, date_format)
}

/// Load CSV data from an existing reader. See [`read_csv`].
pub fn read_csv_from_reader<R: std::io::Read>(
    rdr: &mut csv::Reader<R>,
    schema: &Schema,
    date_format: &str,
) -> ExportResult<DataSet> {
    let headers: Vec<String> = rdr
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();
    let projection = project_headers(&headers, schema);

    let mut rows: Vec<Vec<Value>> = Vec::new();
    let mut unparsed = 0usize;
    for (row_idx0, result) in rdr.records().enumerate() {
        // 1-based, and the header is row 1.
        let user_row = row_idx0 + 2;
        let record = result?;

        let mut row: Vec<Value> = Vec::with_capacity(schema.fields.len());
        for (field, col) in schema.fields.iter().zip(projection.iter()) {
            let raw = col.and_then(|idx| record.get(idx)).unwrap_or("");
            let value = lenient_cell(field, parse_cell(user_row, &field.name, field.data_type, raw, date_format))?;
            if value == Value::Null && !raw.trim().is_empty() {
                unparsed += 1;
            }
            row.push(value);
        }
        rows.push(row);
    }

    if unparsed > 0 {
        debug!(cells = unparsed, "unparseable cells loaded as null");
    }
    Ok(DataSet::new(schema.clone(), rows))
}

/// Map each schema field to the index of its header, if any.
pub(crate) fn project_headers(headers: &[String], schema: &Schema) -> Vec<Option<usize>> {
    schema
        .fields
        .iter()
        .map(|field| {
            let idx = headers.iter().position(|h| field.matches_header(h));
            if idx.is_none() {
                warn!(column = %field.name, "column missing from input; filling with nulls");
            }
            idx
        })
        .collect()
}

/// A parse error on a lenient field becomes [`Value::Null`].
pub(crate) fn lenient_cell(field: &Field, parsed: ExportResult<Value>) -> ExportResult<Value> {
    match parsed {
        Err(ExportError::ParseError { row, raw, .. }) if field.lenient => {
            debug!(row, column = %field.name, %raw, "unparseable value loaded as null");
            Ok(Value::Null)
        }
        other => other,
    }
}

/// Parse one text cell into the field's type. Blank cells are null.
pub(crate) fn parse_cell(
    row: usize,
    column: &str,
    data_type: DataType,
    raw: &str,
    date_format: &str,
) -> ExportResult<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }
    let parse_error = |message: String| ExportError::ParseError {
        row,
        column: column.to_owned(),
        raw: raw.to_owned(),
        message,
    };

    match data_type {
        DataType::Utf8 => Ok(Value::Utf8(trimmed.to_owned())),
        DataType::Date => Ok(parse_date(trimmed, date_format).map_or(Value::Null, Value::Date)),
        DataType::Int64 => match trimmed.parse::<i64>() {
            Ok(v) => Ok(Value::Int64(v)),
            Err(e) => match parse_decimal(trimmed) {
                // Integral columns exported through a float type, e.g. `42.0`.
                Some(f) if f.fract() == 0.0 => Ok(Value::Int64(f as i64)),
                _ => Err(parse_error(e.to_string())),
            },
        },
        DataType::Float64 => parse_decimal(trimmed)
            .map(Value::Float64)
            .ok_or_else(|| parse_error("expected number".to_string())),
    }
}

/// Decimal point first, then a single decimal comma (`1234,56`).
fn parse_decimal(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().or_else(|| {
        if s.contains(',') && !s.contains('.') {
            s.replacen(',', ".", 1).parse::<f64>().ok()
        } else {
            None
        }
    })
}
