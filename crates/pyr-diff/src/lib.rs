//! Diff engine for pyramid sync.
//!
//! Matches the units of two pyramids by `source_ref` and compares them field
//! by field, producing one [`Diff`] per unit.
//!
//! # Key Types
//!
//! - [`FieldType`] / [`FieldValue`] -- What is compared and how
//! - [`Comparison`] / [`ComparisonStatus`] -- Outcome for one field of one unit
//! - [`Diff`] / [`DiffStatus`] -- Outcome for one unit
//! - [`Differ`] / [`DiffQuery`] / [`DiffReport`] -- Pyramid-level diffing
//! - [`sort_by_path`] -- Parent-before-child ordering of diffs

pub mod comparison;
pub mod differ;
pub mod error;
pub mod field;
pub mod ordering;

pub use comparison::{compare, Comparison, ComparisonStatus, Diff, DiffStatus};
pub use differ::{Diagnostic, DiffQuery, DiffReport, Differ};
pub use error::{DiffError, DiffResult};
pub use field::{field_types, FieldType, FieldValue, GroupRef, DEFAULT_FIELDS};
pub use ordering::{compare_paths, sort_by_path, PathOrdered};
