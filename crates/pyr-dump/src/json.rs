//! Nested JSON rendering: every entry carries the full unit snapshots.

use serde::Serialize;
use serde_json::Value;

use pyr_diff::{Comparison, Diff, DiffStatus};
use pyr_types::OrgUnitSnapshot;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NestedDiff<'a> {
    org_unit: Option<&'a OrgUnitSnapshot>,
    org_unit_ref: Option<&'a OrgUnitSnapshot>,
    org_unit_target: Option<&'a OrgUnitSnapshot>,
    status: DiffStatus,
    comparisons: &'a [Comparison],
}

impl<'a> From<&'a Diff> for NestedDiff<'a> {
    fn from(diff: &'a Diff) -> Self {
        Self {
            org_unit: diff.org_unit(),
            org_unit_ref: diff.org_unit_ref.as_ref(),
            org_unit_target: diff.org_unit_target.as_ref(),
            status: diff.status,
            comparisons: &diff.comparisons,
        }
    }
}

/// Render diffs as a JSON array of
/// `{orgUnit, orgUnitRef, orgUnitTarget, status, comparisons}`.
pub fn as_json(diffs: &[Diff]) -> serde_json::Result<Value> {
    let nested: Vec<NestedDiff<'_>> = diffs.iter().map(NestedDiff::from).collect();
    serde_json::to_value(nested)
}
