use std::path::PathBuf;

use thiserror::Error;

/// Convenience result type for export operations.
pub type ExportResult<T> = Result<T, ExportError>;

/// Error type returned across loading, encoding, partitioning and artifact persistence.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Underlying I/O error (e.g. permission denied, disk full).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "excel")]
    /// Excel ingestion error (feature-gated behind `excel`).
    #[error("excel error: {0}")]
    Excel(#[from] calamine::Error),

    #[cfg(feature = "excel")]
    /// XLSX encoding error (feature-gated behind `excel`).
    #[error("xlsx error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    /// CSV read/write error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON configuration or manifest error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid artifact glob pattern.
    #[error("pattern error: {0}")]
    Pattern(#[from] glob::PatternError),

    /// Error while walking an input directory.
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// The input file for a dataset does not exist.
    #[error("input not found: {}", path.display())]
    MissingInput { path: PathBuf },

    /// The input does not conform to the declared schema.
    #[error("schema mismatch: {message}")]
    SchemaMismatch { message: String },

    /// A value could not be parsed into the required [`crate::types::DataType`].
    #[error("failed to parse value at row {row} column '{column}': {message} (raw='{raw}')")]
    ParseError {
        row: usize,
        column: String,
        raw: String,
        message: String,
    },

    /// The export configuration or a dataset profile is not usable.
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },

    /// A row selection could not be serialized to the artifact encoding.
    #[error("encode error: {message}")]
    Encode { message: String },

    /// Written artifacts do not account for every row exactly once.
    #[error("integrity error: {message}")]
    Integrity { message: String },
}

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal).
    Warning,
    /// Error-level event (the dataset's pipeline failed).
    Error,
    /// Critical error (typically I/O or other infrastructure failures).
    Critical,
}

impl ExportError {
    /// Severity of this error for observers.
    pub fn severity(&self) -> Severity {
        match self {
            ExportError::Io(_) | ExportError::Walk(_) => Severity::Critical,
            ExportError::Csv(err) => match err.kind() {
                csv::ErrorKind::Io(_) => Severity::Critical,
                _ => Severity::Error,
            },
            #[cfg(feature = "excel")]
            ExportError::Excel(_) | ExportError::Xlsx(_) => Severity::Error,
            ExportError::MissingInput { .. } => Severity::Error,
            ExportError::Json(_)
            | ExportError::Pattern(_)
            | ExportError::SchemaMismatch { .. }
            | ExportError::ParseError { .. }
            | ExportError::InvalidConfig { .. }
            | ExportError::Encode { .. }
            | ExportError::Integrity { .. } => Severity::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ExportError, Severity};

    #[test]
    fn io_errors_are_critical() {
        let err = ExportError::from(std::io::Error::other("disk full"));
        assert_eq!(err.severity(), Severity::Critical);
    }

    #[test]
    fn missing_input_is_an_error_not_critical() {
        let err = ExportError::MissingInput {
            path: "exported_data/contatos.csv".into(),
        };
        assert_eq!(err.severity(), Severity::Error);
        assert!(err.to_string().contains("contatos.csv"));
    }
}
