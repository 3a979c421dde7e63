//! Renderers for pyramid diffs.
//!
//! # Key Types
//!
//! - [`DiffStats`] -- Status counts per unit and per field, with samples
//! - [`as_json`] -- Nested JSON carrying the full unit snapshots
//! - [`as_csv`] / [`to_csv_string`] -- One row per diff
//! - [`as_table`] -- Colored terminal table of the changed units

pub mod csv;
pub mod json;
pub mod stats;
pub mod table;

pub use csv::{as_csv, to_csv_string};
pub use json::as_json;
pub use stats::{stats, DiffStats, FieldStats};
pub use table::as_table;

/// External id used to identify a diff's unit in reports: its `source_ref`,
/// or the local id when it has none.
pub(crate) fn unit_label(diff: &pyr_diff::Diff) -> String {
    match diff.org_unit() {
        Some(unit) => unit
            .source_ref()
            .map(str::to_string)
            .unwrap_or_else(|| unit.id.to_string()),
        None => String::new(),
    }
}
