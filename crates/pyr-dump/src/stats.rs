//! Status counts over a diff set.

use std::collections::BTreeMap;

use serde::Serialize;

use pyr_diff::{ComparisonStatus, Diff, DiffStatus};

use crate::unit_label;

/// Comparison counts for one field, with the first unit seen per status.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FieldStats {
    pub counts: BTreeMap<ComparisonStatus, usize>,
    pub samples: BTreeMap<ComparisonStatus, String>,
}

impl FieldStats {
    pub fn count(&self, status: ComparisonStatus) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    /// Whether at least one comparison of this field brings a change to
    /// apply.
    pub fn has_changes(&self) -> bool {
        self.count(ComparisonStatus::New) + self.count(ComparisonStatus::Modified) > 0
    }
}

/// Summary of a diff set.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DiffStats {
    pub total: usize,
    pub units: BTreeMap<DiffStatus, usize>,
    pub fields: BTreeMap<String, FieldStats>,
}

impl DiffStats {
    pub fn unit_count(&self, status: DiffStatus) -> usize {
        self.units.get(&status).copied().unwrap_or(0)
    }

    pub fn field(&self, field: &str) -> Option<&FieldStats> {
        self.fields.get(field)
    }
}

/// Count unit statuses, and comparison statuses per field.
pub fn stats(diffs: &[Diff]) -> DiffStats {
    let mut out = DiffStats {
        total: diffs.len(),
        ..DiffStats::default()
    };
    for diff in diffs {
        *out.units.entry(diff.status).or_default() += 1;
        for comparison in &diff.comparisons {
            let field = out.fields.entry(comparison.field.clone()).or_default();
            *field.counts.entry(comparison.status).or_default() += 1;
            field
                .samples
                .entry(comparison.status)
                .or_insert_with(|| unit_label(diff));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::diffs;

    #[test]
    fn counts_units_and_fields() {
        let s = stats(&diffs());
        assert_eq!(s.total, 4);
        assert_eq!(s.unit_count(DiffStatus::Same), 1);
        assert_eq!(s.unit_count(DiffStatus::Modified), 1);
        assert_eq!(s.unit_count(DiffStatus::New), 1);
        assert_eq!(s.unit_count(DiffStatus::Deleted), 1);
        assert_eq!(s.unit_count(DiffStatus::NeverSeen), 0);

        let name = s.field("name").unwrap();
        assert_eq!(name.count(ComparisonStatus::Same), 1);
        assert_eq!(name.count(ComparisonStatus::Modified), 1);
        assert_eq!(name.count(ComparisonStatus::New), 1);
        assert_eq!(name.count(ComparisonStatus::Deleted), 1);
        assert!(name.has_changes());

        // No unit has a parent, so only the deleted unit reports a change.
        let parent = s.field("parent").unwrap();
        assert_eq!(parent.count(ComparisonStatus::Same), 3);
        assert!(!parent.has_changes());
    }

    #[test]
    fn samples_keep_first_unit() {
        let s = stats(&diffs());
        let name = s.field("name").unwrap();
        assert_eq!(name.samples[&ComparisonStatus::Same], "AO");
        assert_eq!(name.samples[&ComparisonStatus::Modified], "LU");
        // Units without a source_ref fall back to their local id.
        assert_eq!(name.samples[&ComparisonStatus::New], "13");
        assert_eq!(s.field("parent").unwrap().samples[&ComparisonStatus::Same], "AO");
    }

    #[test]
    fn serializes_with_status_keys() {
        let value = serde_json::to_value(stats(&diffs())).unwrap();
        assert_eq!(value["units"]["modified"], 1);
        assert_eq!(value["fields"]["name"]["samples"]["new"], "13");
    }

    #[test]
    fn empty_input() {
        let s = stats(&[]);
        assert_eq!(s.total, 0);
        assert!(s.fields.is_empty());
    }
}
