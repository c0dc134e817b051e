#![cfg(feature = "excel")]

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use chrono::{Days, NaiveDate};

use crate::error::{ExportError, ExportResult};
use crate::types::{parse_date, DataSet, DataType, Schema, Value};

use super::csv::{lenient_cell, parse_cell, project_headers};

/// Load one sheet of a workbook (`.xlsx`, `.xls`, `.ods`, ...) into a [`DataSet`].
///
/// Behavior:
/// - Picks `sheet_name` if provided; otherwise uses the first sheet in the workbook
/// - Detects the first non-empty row as the header row
/// - Matches schema fields to headers by name or alias; unmatched fields are filled with nulls
/// - Reads remaining rows and converts cells into typed `Value`s
pub fn read_excel(
    path: impl AsRef<Path>,
    sheet_name: Option<&str>,
    schema: &Schema,
    date_format: &str,
) -> ExportResult<DataSet> {
    let mut workbook = open_workbook_auto(path)?;

    let sheet = match sheet_name {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ExportError::SchemaMismatch {
                message: "workbook has no sheets".to_string(),
            })?,
    };
    let range = workbook.worksheet_range(&sheet)?;

    let Some(header_row_idx) = range
        .rows()
        .position(|row| row.iter().any(|c| !matches!(c, Data::Empty)))
    else {
        // A sheet without a header row holds no records.
        return Ok(DataSet::new(schema.clone(), Vec::new()));
    };
    let headers: Vec<String> = range
        .rows()
        .nth(header_row_idx)
        .map(|row| row.iter().map(cell_to_header_string).collect())
        .unwrap_or_default();
    let projection = project_headers(&headers, schema);

    let mut rows: Vec<Vec<Value>> = Vec::new();
    for (idx0, row) in range.rows().enumerate().skip(header_row_idx + 1) {
        // Excel-like 1-based row number.
        let user_row = idx0 + 1;
        let mut out_row: Vec<Value> = Vec::with_capacity(schema.fields.len());
        for (field, col) in schema.fields.iter().zip(projection.iter()) {
            let cell = col.and_then(|idx| row.get(idx)).unwrap_or(&Data::Empty);
            let column = format!("{sheet}:{}", field.name);
            let parsed = convert_cell(user_row, &column, field.data_type, cell, date_format);
            out_row.push(lenient_cell(field, parsed)?);
        }
        rows.push(out_row);
    }

    Ok(DataSet::new(schema.clone(), rows))
}

fn cell_to_header_string(c: &Data) -> String {
    match c {
        Data::String(s) => s.trim_start_matches('\u{feff}').to_string(),
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

fn convert_cell(
    row: usize,
    column: &str,
    data_type: DataType,
    c: &Data,
    date_format: &str,
) -> ExportResult<Value> {
    let parse_error = |message: &str| ExportError::ParseError {
        row,
        column: column.to_string(),
        raw: c.to_string(),
        message: message.to_string(),
    };

    match (data_type, c) {
        (_, Data::Empty) => Ok(Value::Null),
        (_, Data::String(s)) => parse_cell(row, column, data_type, s, date_format),
        (DataType::Utf8, other) => Ok(Value::Utf8(other.to_string())),
        (DataType::Date, Data::DateTime(dt)) => Ok(excel_serial_to_date(dt.as_f64()).map_or(Value::Null, Value::Date)),
        (DataType::Date, Data::DateTimeIso(s)) => Ok(parse_date(s, date_format).map_or(Value::Null, Value::Date)),
        (DataType::Date, _) => Ok(Value::Null),
        (DataType::Int64, Data::Int(i)) => Ok(Value::Int64(*i)),
        (DataType::Int64, Data::Float(f)) if f.fract() == 0.0 => Ok(Value::Int64(*f as i64)),
        (DataType::Int64, Data::Bool(b)) => Ok(Value::Int64(i64::from(*b))),
        (DataType::Int64, _) => Err(parse_error("expected integer")),
        (DataType::Float64, Data::Float(f)) => Ok(Value::Float64(*f)),
        (DataType::Float64, Data::Int(i)) => Ok(Value::Float64(*i as f64)),
        (DataType::Float64, _) => Err(parse_error("expected number")),
    }
}

/// Spreadsheet serial day number (1900 date system) to a calendar date.
fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_days(Days::new(serial.floor() as u64))
}
