//! Compact projection of diffs.
//!
//! Units are reduced to scalar identity and position fields plus the local
//! ids of their groups. Comparison values are kept as plain JSON. This shape
//! round-trips through JSON, unlike the nested rendering of `pyr-dump`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use pyr_diff::{ComparisonStatus, Diff, DiffStatus, PathOrdered};
use pyr_types::{Geometry, GroupId, OrgUnitSnapshot, OrgUnitTypeId, UnitId, ValidationStatus, VersionId};

use crate::error::SyncResult;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompactUnit {
    pub id: UnitId,
    pub version: VersionId,
    pub source_ref: Option<String>,
    pub name: String,
    #[serde(default)]
    pub org_unit_type_id: Option<OrgUnitTypeId>,
    #[serde(default)]
    pub validation_status: ValidationStatus,
    #[serde(default)]
    pub parent_id: Option<UnitId>,
    #[serde(default)]
    pub parent_source_ref: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub location: Option<Geometry>,
    #[serde(default)]
    pub geom: Option<Geometry>,
    #[serde(default)]
    pub opening_date: Option<NaiveDate>,
    #[serde(default)]
    pub closed_date: Option<NaiveDate>,
    #[serde(default)]
    pub groups: Vec<GroupId>,
}

impl CompactUnit {
    /// The `source_ref`, treating blank strings as absent.
    pub fn source_ref(&self) -> Option<&str> {
        self.source_ref.as_deref().filter(|r| !r.trim().is_empty())
    }
}

impl From<&OrgUnitSnapshot> for CompactUnit {
    fn from(unit: &OrgUnitSnapshot) -> Self {
        Self {
            id: unit.id,
            version: unit.version,
            source_ref: unit.source_ref.clone(),
            name: unit.name.clone(),
            org_unit_type_id: unit.org_unit_type.as_ref().map(|t| t.id),
            validation_status: unit.validation_status,
            parent_id: unit.parent.as_ref().map(|p| p.id),
            parent_source_ref: unit.parent_source_ref().map(str::to_string),
            path: unit.path.clone(),
            location: unit.location.clone(),
            geom: unit.geom.clone(),
            opening_date: unit.opening_date,
            closed_date: unit.closed_date,
            groups: unit.groups.iter().map(|g| g.id).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompactComparison {
    pub field: String,
    #[serde(default)]
    pub before: Value,
    #[serde(default)]
    pub after: Value,
    pub status: ComparisonStatus,
    #[serde(default)]
    pub distance: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompactDiff {
    pub org_unit: Option<CompactUnit>,
    pub org_unit_ref: Option<CompactUnit>,
    pub org_unit_target: Option<CompactUnit>,
    pub status: DiffStatus,
    pub comparisons: Vec<CompactComparison>,
}

impl CompactDiff {
    pub fn from_diff(diff: &Diff) -> SyncResult<Self> {
        let comparisons = diff
            .comparisons
            .iter()
            .map(|c| -> SyncResult<CompactComparison> {
                Ok(CompactComparison {
                    field: c.field.clone(),
                    before: serde_json::to_value(&c.before)?,
                    after: serde_json::to_value(&c.after)?,
                    status: c.status,
                    distance: c.distance,
                })
            })
            .collect::<SyncResult<Vec<_>>>()?;
        Ok(Self {
            org_unit: diff.org_unit().map(CompactUnit::from),
            org_unit_ref: diff.org_unit_ref.as_ref().map(CompactUnit::from),
            org_unit_target: diff.org_unit_target.as_ref().map(CompactUnit::from),
            status: diff.status,
            comparisons,
        })
    }

    pub fn comparison(&self, field: &str) -> Option<&CompactComparison> {
        self.comparisons.iter().find(|c| c.field == field)
    }
}

impl PathOrdered for CompactDiff {
    fn sort_path(&self) -> Option<&str> {
        self.org_unit.as_ref().and_then(|u| u.path.as_deref())
    }
}

/// Compact form of every diff.
pub fn compact_diffs(diffs: &[Diff]) -> SyncResult<Vec<CompactDiff>> {
    diffs.iter().map(CompactDiff::from_diff).collect()
}

/// Compact form of every diff, as a JSON array.
pub fn diffs_to_json(diffs: &[Diff]) -> SyncResult<Value> {
    Ok(serde_json::to_value(compact_diffs(diffs)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyr_diff::{compare, FieldType, FieldValue};
    use pyr_types::{GroupMembership, ParentRef};
    use serde_json::json;

    fn snapshot() -> OrgUnitSnapshot {
        let mut unit = OrgUnitSnapshot::new(UnitId(12), VersionId(2), "Luanda");
        unit.source_ref = Some("LU".into());
        unit.path = Some("11.12".into());
        unit.parent = Some(ParentRef {
            id: UnitId(11),
            source_ref: Some("AO".into()),
            name: "Angola".into(),
            parent: None,
        });
        unit.location = Some(Geometry::point(13.2, -8.8));
        unit.groups = vec![GroupMembership {
            id: GroupId(7),
            source_ref: Some("pub".into()),
            name: "Public".into(),
            group_sets: Vec::new(),
        }];
        unit
    }

    #[test]
    fn units_are_flattened() {
        let compact = CompactUnit::from(&snapshot());
        assert_eq!(compact.parent_id, Some(UnitId(11)));
        assert_eq!(compact.parent_source_ref.as_deref(), Some("AO"));
        assert_eq!(compact.groups, vec![GroupId(7)]);

        let value = serde_json::to_value(&compact).unwrap();
        assert_eq!(value["groups"], json!([7]));
        assert_eq!(value["id"], 12);
        assert!(value.get("parent").is_none());
    }

    #[test]
    fn diffs_round_trip_through_json() {
        let unit = snapshot();
        let mut target = unit.clone();
        target.name = "Luanda old".into();
        target.id = UnitId(2);
        let comparisons = vec![compare(
            &FieldType::Name,
            Some(FieldValue::Text("Luanda old".into())),
            Some(FieldValue::Text("Luanda".into())),
        )];
        let diff = Diff::matched(unit, Some(target), comparisons);

        let value = diffs_to_json(std::slice::from_ref(&diff)).unwrap();
        assert_eq!(value[0]["status"], "modified");
        assert_eq!(value[0]["org_unit"]["name"], "Luanda");
        assert_eq!(value[0]["org_unit_target"]["id"], 2);
        assert_eq!(value[0]["comparisons"][0]["before"], "Luanda old");

        let back: Vec<CompactDiff> = serde_json::from_value(value).unwrap();
        assert_eq!(back, compact_diffs(&[diff]).unwrap());
        assert_eq!(back[0].sort_path(), Some("11.12"));
    }
}
