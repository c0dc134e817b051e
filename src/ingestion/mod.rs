//! Input loading.
//!
//! Most callers should use [`load_dataset`] (from [`unified`]), which:
//!
//! - auto-detects format by file extension (or you can override via [`LoadOptions`])
//! - matches headers to the profile schema by name or alias
//! - loads into an in-memory [`crate::types::DataSet`]
//!
//! Format-specific functions are also available under [`csv`] and (feature `excel`) `excel`.

pub mod csv;
#[cfg(feature = "excel")]
pub mod excel;
pub mod unified;

pub use unified::{load_dataset, InputFormat, LoadOptions};
