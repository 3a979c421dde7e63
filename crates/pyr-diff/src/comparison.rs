//! Field-level and unit-level diff results.

use std::fmt;

use serde::{Deserialize, Serialize};

use pyr_types::OrgUnitSnapshot;

use crate::field::{FieldType, FieldValue};

/// Outcome of comparing one field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonStatus {
    Same,
    New,
    Modified,
    Deleted,
}

impl ComparisonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Same => "same",
            Self::New => "new",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        }
    }

    /// `new` or `modified`: the reference side brings something to apply.
    pub fn is_new_or_modified(&self) -> bool {
        matches!(self, Self::New | Self::Modified)
    }
}

impl fmt::Display for ComparisonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of comparing one unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffStatus {
    Same,
    New,
    Modified,
    Deleted,
    NeverSeen,
}

impl DiffStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Same => "same",
            Self::New => "new",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::NeverSeen => "never_seen",
        }
    }
}

impl fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison of one field between the target unit (`before`) and the
/// reference unit (`after`).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Comparison {
    pub field: String,
    pub before: Option<FieldValue>,
    pub after: Option<FieldValue>,
    pub status: ComparisonStatus,
    pub distance: Option<f64>,
}

/// Classify one field given the target and reference values.
pub fn compare(
    field: &FieldType,
    target_value: Option<FieldValue>,
    ref_value: Option<FieldValue>,
) -> Comparison {
    let same = field.is_same(target_value.as_ref(), ref_value.as_ref());
    let ref_is_empty = ref_value.as_ref().map_or(true, FieldValue::is_empty);
    let status = if target_value.is_none() && ref_value.is_some() {
        ComparisonStatus::New
    } else if !same && target_value.is_some() && ref_is_empty {
        ComparisonStatus::Deleted
    } else if same {
        ComparisonStatus::Same
    } else {
        ComparisonStatus::Modified
    };
    let distance = if same {
        Some(0.0)
    } else {
        field.distance(target_value.as_ref(), ref_value.as_ref())
    };
    Comparison {
        field: field.key(),
        before: target_value,
        after: ref_value,
        status,
        distance,
    }
}

/// Diff of one org unit across the two pyramids.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diff {
    /// Unit from the reference pyramid.
    pub org_unit_ref: Option<OrgUnitSnapshot>,
    /// Matching unit from the target pyramid.
    pub org_unit_target: Option<OrgUnitSnapshot>,
    pub status: DiffStatus,
    pub comparisons: Vec<Comparison>,
}

impl Diff {
    /// Diff of a reference unit and its match, if any. The status is derived
    /// from the match and the comparisons.
    pub fn matched(
        org_unit_ref: OrgUnitSnapshot,
        org_unit_target: Option<OrgUnitSnapshot>,
        comparisons: Vec<Comparison>,
    ) -> Self {
        let status = if org_unit_target.is_none() {
            DiffStatus::New
        } else if comparisons.iter().any(|c| c.status != ComparisonStatus::Same) {
            DiffStatus::Modified
        } else {
            DiffStatus::Same
        };
        Self {
            org_unit_ref: Some(org_unit_ref),
            org_unit_target,
            status,
            comparisons,
        }
    }

    /// Diff of a target unit absent from the reference pyramid. Every field
    /// is reported as deleted.
    pub fn removed(org_unit_target: OrgUnitSnapshot, fields: &[FieldType], status: DiffStatus) -> Self {
        let comparisons = fields
            .iter()
            .map(|f| Comparison {
                field: f.key(),
                before: f.access(&org_unit_target),
                after: None,
                status: ComparisonStatus::Deleted,
                distance: None,
            })
            .collect();
        Self {
            org_unit_ref: None,
            org_unit_target: Some(org_unit_target),
            status,
            comparisons,
        }
    }

    /// The reference unit if present, otherwise the target unit.
    pub fn org_unit(&self) -> Option<&OrgUnitSnapshot> {
        self.org_unit_ref.as_ref().or(self.org_unit_target.as_ref())
    }

    /// Path of [`Diff::org_unit`].
    pub fn path(&self) -> Option<&str> {
        self.org_unit().and_then(|u| u.path.as_deref())
    }

    /// The comparison for `field`, if that field was compared.
    pub fn comparison(&self, field: &str) -> Option<&Comparison> {
        self.comparisons.iter().find(|c| c.field == field)
    }

    /// Returns `true` if any of `fields` has a non-`same` comparison.
    pub fn changed_any(&self, fields: &[&str]) -> bool {
        self.comparisons
            .iter()
            .any(|c| c.status != ComparisonStatus::Same && fields.contains(&c.field.as_str()))
    }
}
