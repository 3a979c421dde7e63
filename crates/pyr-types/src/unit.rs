use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::geometry::Geometry;
use crate::ids::{GroupId, GroupSetId, OrgUnitTypeId, UnitId, VersionId};

/// Validation state of an org unit within its version.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    #[default]
    New,
    Valid,
    Rejected,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Valid => "VALID",
            Self::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidationStatus {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NEW" => Ok(Self::New),
            "VALID" => Ok(Self::Valid),
            "REJECTED" => Ok(Self::Rejected),
            _ => Err(TypeError::InvalidValidationStatus(s.to_string())),
        }
    }
}

/// Org unit type (level/category such as "Province" or "Health Facility").
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgUnitType {
    pub id: OrgUnitTypeId,
    pub name: String,
}

/// Parent of an org unit, with its own ancestors preloaded a few levels up.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParentRef {
    pub id: UnitId,
    pub source_ref: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Box<ParentRef>>,
}

impl ParentRef {
    /// Number of ancestors reachable from this reference, itself included.
    pub fn chain_len(&self) -> usize {
        1 + self.parent.as_ref().map_or(0, |p| p.chain_len())
    }
}

/// A group set as seen from a group membership.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSetRef {
    pub id: GroupSetId,
    pub source_ref: Option<String>,
    pub name: String,
}

/// A group an org unit belongs to, with the group sets it is part of.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMembership {
    pub id: GroupId,
    pub source_ref: Option<String>,
    pub name: String,
    #[serde(default)]
    pub group_sets: Vec<GroupSetRef>,
}

impl GroupMembership {
    /// Returns `true` if this group belongs to the group set `set_ref`.
    pub fn in_group_set(&self, set_ref: &str) -> bool {
        self.group_sets
            .iter()
            .any(|gs| gs.source_ref.as_deref() == Some(set_ref))
    }
}

/// A group as stored for one version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub version: VersionId,
    pub source_ref: Option<String>,
    pub name: String,
    #[serde(default)]
    pub group_set_ids: Vec<GroupSetId>,
}

/// A group set as stored for one version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSet {
    pub id: GroupSetId,
    pub version: VersionId,
    pub source_ref: Option<String>,
    pub name: String,
}

impl GroupSet {
    /// The comparison field key for this group set, `groupset:<ref>:<name>`.
    ///
    /// Group sets without a `source_ref` cannot be matched across versions
    /// and have no field key.
    pub fn field_key(&self) -> Option<String> {
        let source_ref = self.source_ref.as_deref().filter(|r| !r.trim().is_empty())?;
        Some(format!("groupset:{}:{}", source_ref, self.name))
    }
}

/// One org unit of a pyramid, with its parent, groups and group sets
/// preloaded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrgUnitSnapshot {
    pub id: UnitId,
    pub version: VersionId,
    pub source_ref: Option<String>,
    pub name: String,
    #[serde(default)]
    pub org_unit_type: Option<OrgUnitType>,
    #[serde(default)]
    pub validation_status: ValidationStatus,
    #[serde(default)]
    pub parent: Option<ParentRef>,
    /// Dotted path of local ids from the root down to this unit.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub location: Option<Geometry>,
    #[serde(default)]
    pub geom: Option<Geometry>,
    #[serde(default)]
    pub simplified_geom: Option<Geometry>,
    #[serde(default)]
    pub opening_date: Option<NaiveDate>,
    #[serde(default)]
    pub closed_date: Option<NaiveDate>,
    #[serde(default)]
    pub groups: Vec<GroupMembership>,
}

impl OrgUnitSnapshot {
    /// A bare unit with only identity and name set.
    pub fn new(id: UnitId, version: VersionId, name: impl Into<String>) -> Self {
        Self {
            id,
            version,
            source_ref: None,
            name: name.into(),
            org_unit_type: None,
            validation_status: ValidationStatus::default(),
            parent: None,
            path: None,
            location: None,
            geom: None,
            simplified_geom: None,
            opening_date: None,
            closed_date: None,
            groups: Vec::new(),
        }
    }

    /// The `source_ref`, treating blank strings as absent.
    pub fn source_ref(&self) -> Option<&str> {
        self.source_ref.as_deref().filter(|r| !r.trim().is_empty())
    }

    /// The parent's `source_ref`, if any.
    pub fn parent_source_ref(&self) -> Option<&str> {
        self.parent.as_ref().and_then(|p| p.source_ref.as_deref())
    }

    /// Name of the unit's type, or an empty string.
    pub fn type_name(&self) -> &str {
        self.org_unit_type.as_ref().map_or("", |t| t.name.as_str())
    }

    /// Groups of this unit that belong to the group set `set_ref`.
    pub fn groups_in_set<'a>(
        &'a self,
        set_ref: &'a str,
    ) -> impl Iterator<Item = &'a GroupMembership> + 'a {
        self.groups.iter().filter(move |g| g.in_group_set(set_ref))
    }

    /// The membership for the group whose `source_ref` is `group_ref`.
    pub fn group_by_ref(&self, group_ref: &str) -> Option<&GroupMembership> {
        self.groups
            .iter()
            .find(|g| g.source_ref.as_deref() == Some(group_ref))
    }

    /// Depth in the hierarchy derived from the path (root = 1).
    pub fn depth(&self) -> Option<usize> {
        self.path.as_deref().map(|p| p.split('.').count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(id: u64, source_ref: &str, sets: &[&str]) -> GroupMembership {
        GroupMembership {
            id: GroupId(id),
            source_ref: Some(source_ref.into()),
            name: source_ref.to_uppercase(),
            group_sets: sets
                .iter()
                .enumerate()
                .map(|(i, s)| GroupSetRef {
                    id: GroupSetId(i as u64),
                    source_ref: Some((*s).into()),
                    name: (*s).into(),
                })
                .collect(),
        }
    }

    #[test]
    fn validation_status_parse_and_display() {
        assert_eq!("valid".parse::<ValidationStatus>().unwrap(), ValidationStatus::Valid);
        assert_eq!(ValidationStatus::Rejected.to_string(), "REJECTED");
        assert!("bogus".parse::<ValidationStatus>().is_err());
    }

    #[test]
    fn validation_status_serde_is_uppercase() {
        let json = serde_json::to_string(&ValidationStatus::Valid).unwrap();
        assert_eq!(json, "\"VALID\"");
    }

    #[test]
    fn blank_source_ref_is_absent() {
        let mut unit = OrgUnitSnapshot::new(UnitId(1), VersionId(1), "Angola");
        unit.source_ref = Some("   ".into());
        assert_eq!(unit.source_ref(), None);
        unit.source_ref = Some("AO".into());
        assert_eq!(unit.source_ref(), Some("AO"));
    }

    #[test]
    fn groups_filtered_by_group_set() {
        let mut unit = OrgUnitSnapshot::new(UnitId(1), VersionId(1), "Clinic");
        unit.groups = vec![group(1, "a", &["type"]), group(2, "b", &["owner"]), group(3, "c", &["type"])];
        let refs: Vec<_> = unit
            .groups_in_set("type")
            .filter_map(|g| g.source_ref.as_deref())
            .collect();
        assert_eq!(refs, vec!["a", "c"]);
        assert!(unit.group_by_ref("b").is_some());
        assert!(unit.group_by_ref("z").is_none());
    }

    #[test]
    fn group_set_field_key() {
        let gs = GroupSet {
            id: GroupSetId(1),
            version: VersionId(1),
            source_ref: Some("J5jldMd8OHv".into()),
            name: "Facility Type".into(),
        };
        assert_eq!(gs.field_key().as_deref(), Some("groupset:J5jldMd8OHv:Facility Type"));

        let orphan = GroupSet { source_ref: None, ..gs };
        assert!(orphan.field_key().is_none());
    }

    #[test]
    fn parent_chain_length_and_depth() {
        let mut unit = OrgUnitSnapshot::new(UnitId(3), VersionId(1), "Leaf");
        unit.path = Some("1.2.3".into());
        unit.parent = Some(ParentRef {
            id: UnitId(2),
            source_ref: Some("p".into()),
            name: "Mid".into(),
            parent: Some(Box::new(ParentRef {
                id: UnitId(1),
                source_ref: None,
                name: "Root".into(),
                parent: None,
            })),
        });
        assert_eq!(unit.depth(), Some(3));
        assert_eq!(unit.parent.as_ref().unwrap().chain_len(), 2);
        assert_eq!(unit.parent_source_ref(), Some("p"));
    }
}
