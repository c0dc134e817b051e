//! In-memory column reductions.
//!
//! Used by [`crate::pipeline::verify`] to compare monetary totals between a complete artifact and
//! its parts and to report the partition date range.
//!
//! ```rust
//! use bounded_export::processing::{reduce, ReduceOp};
//! use bounded_export::types::{DataSet, DataType, Field, Schema, Value};
//!
//! let schema = Schema::new(vec![
//!     Field::new("Id", DataType::Int64),
//!     Field::new("Valor documento", DataType::Float64),
//! ]);
//! let ds = DataSet::new(
//!     schema,
//!     vec![
//!         vec![Value::Int64(1), Value::Float64(10.0)],
//!         vec![Value::Int64(2), Value::Null],
//!     ],
//! );
//!
//! // Nulls are ignored.
//! let sum = reduce(&ds, "Valor documento", ReduceOp::Sum).unwrap();
//! assert_eq!(sum, Value::Float64(10.0));
//! ```

pub mod reduce;

pub use reduce::{column_total, reduce, ReduceOp};
