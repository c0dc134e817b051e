#![cfg(feature = "excel")]

use rust_xlsxwriter::Workbook;

use crate::error::{ExportError, ExportResult};
use crate::types::{Schema, Value};

use super::format_value;

/// Largest worksheet row index supported by the XLSX format.
const MAX_XLSX_ROW: usize = 1_048_575;

/// Encode a header row plus `rows` as a single-sheet workbook.
///
/// Dates are written as text in `date_format`, matching the CSV artifacts.
pub(crate) fn encode_xlsx(schema: &Schema, rows: &[&[Value]], date_format: &str) -> ExportResult<Vec<u8>> {
    if rows.len() > MAX_XLSX_ROW {
        return Err(ExportError::Encode {
            message: format!("{} rows exceed the xlsx sheet limit", rows.len()),
        });
    }
    if schema.fields.len() > u16::MAX as usize {
        return Err(ExportError::Encode {
            message: format!("{} columns exceed the xlsx sheet limit", schema.fields.len()),
        });
    }

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();

    for (col, name) in schema.field_names().enumerate() {
        sheet.write_string(0, col as u16, name)?;
    }

    for (idx0, row) in rows.iter().enumerate() {
        let r = (idx0 + 1) as u32;
        for (col, value) in row.iter().enumerate() {
            let c = col as u16;
            match value {
                Value::Null => {}
                Value::Int64(v) => {
                    sheet.write_number(r, c, *v as f64)?;
                }
                Value::Float64(v) => {
                    sheet.write_number(r, c, *v)?;
                }
                Value::Utf8(_) | Value::Date(_) => {
                    sheet.write_string(r, c, format_value(value, date_format)?)?;
                }
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}
