//! CSV artifact encoding.

use csv::{Terminator, WriterBuilder};

use crate::error::{ExportError, ExportResult};
use crate::types::{Schema, Value};

use super::format_value;

/// UTF-8 BOM bytes, so spreadsheet tools detect the encoding.
pub(crate) const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Encode a header row plus `rows` as BOM-prefixed, `\n`-terminated CSV.
pub(crate) fn encode_csv(schema: &Schema, rows: &[&[Value]], date_format: &str) -> ExportResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(UTF8_BOM.len() + (rows.len() + 1) * schema.fields.len() * 16);
    buf.extend_from_slice(UTF8_BOM);

    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(buf);

    writer.write_record(schema.field_names())?;

    let mut record: Vec<String> = Vec::with_capacity(schema.fields.len());
    for row in rows {
        record.clear();
        for value in row.iter() {
            record.push(format_value(value, date_format)?);
        }
        writer.write_record(&record)?;
    }

    writer.into_inner().map_err(|e| ExportError::Encode {
        message: format!("failed to flush csv buffer: {}", e.error()),
    })
}
