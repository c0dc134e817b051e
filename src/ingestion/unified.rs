//! Unified loading entrypoint.
//!
//! Most callers should use [`load_dataset`], which loads a file exported by the extraction step
//! into an in-memory [`crate::types::DataSet`] shaped by a profile's [`crate::types::Schema`].
//! If [`LoadOptions::format`] is `None`, the format is inferred from the file extension.

use std::path::Path;

use tracing::debug;

use crate::error::{ExportError, ExportResult};
use crate::types::{DataSet, Schema};

use super::csv;

/// Supported input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// Comma-separated values.
    Csv,
    /// Spreadsheet/workbook formats (feature-gated behind `excel`).
    Excel,
}

impl InputFormat {
    /// Parse an input format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "xlsx" | "xls" | "xlsm" | "xlsb" | "ods" => Some(Self::Excel),
            _ => None,
        }
    }
}

/// Options controlling [`load_dataset`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    /// If `None`, infer the format from the file extension.
    pub format: Option<InputFormat>,
    /// Sheet to read from a workbook; `None` reads the first sheet.
    pub sheet: Option<String>,
    /// Preferred `chrono` pattern for date cells. Day-first and ISO forms are always tried too.
    pub date_format: String,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            format: None,
            sheet: None,
            date_format: "%d/%m/%Y".to_string(),
        }
    }
}

impl LoadOptions {
    /// Options preferring `date_format` for date cells.
    pub fn with_date_format(date_format: impl Into<String>) -> Self {
        Self {
            date_format: date_format.into(),
            ..Self::default()
        }
    }
}

/// Load `path` into a [`DataSet`] shaped by `schema`.
///
/// A path that does not exist yields [`ExportError::MissingInput`] so callers can skip the
/// dataset without treating it as an I/O failure.
///
/// ```no_run
/// use bounded_export::ingestion::{load_dataset, LoadOptions};
/// use bounded_export::types::{DataType, Field, Schema};
///
/// # fn main() -> Result<(), bounded_export::ExportError> {
/// let schema = Schema::new(vec![
///     Field::new("Id", DataType::Int64),
///     Field::new("Data Emissao", DataType::Date).with_alias("Data emissao"),
/// ]);
/// let ds = load_dataset("exported_data/contas_a_pagar.csv", &schema, &LoadOptions::default())?;
/// println!("rows={}", ds.row_count());
/// # Ok(())
/// # }
/// ```
pub fn load_dataset(path: impl AsRef<Path>, schema: &Schema, options: &LoadOptions) -> ExportResult<DataSet> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ExportError::MissingInput {
            path: path.to_path_buf(),
        });
    }
    let format = match options.format {
        Some(f) => f,
        None => infer_format_from_path(path)?,
    };

    let ds = match format {
        InputFormat::Csv => csv::read_csv(path, schema, &options.date_format)?,
        InputFormat::Excel => load_excel_dispatch(path, schema, options)?,
    };
    debug!(path = %path.display(), ?format, rows = ds.row_count(), "dataset loaded");
    Ok(ds)
}

fn infer_format_from_path(path: &Path) -> ExportResult<InputFormat> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| ExportError::SchemaMismatch {
            message: format!("cannot infer format: path has no extension ({})", path.display()),
        })?;

    InputFormat::from_extension(ext).ok_or_else(|| ExportError::SchemaMismatch {
        message: format!("cannot infer format from extension '{ext}' for path ({})", path.display()),
    })
}

fn load_excel_dispatch(path: &Path, schema: &Schema, options: &LoadOptions) -> ExportResult<DataSet> {
    #[cfg(feature = "excel")]
    {
        super::excel::read_excel(path, options.sheet.as_deref(), schema, &options.date_format)
    }

    #[cfg(not(feature = "excel"))]
    {
        let _ = (path, schema, options);
        Err(ExportError::SchemaMismatch {
            message: "excel input not enabled (enable cargo feature 'excel')".to_string(),
        })
    }
}
