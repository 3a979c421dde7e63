//! Comparable attributes of an org unit.
//!
//! A field is named by a string key: `name`, `geometry`, `parent`,
//! `opening_date`, `closed_date`, `groupset:<ref>:<name>` (membership within
//! one group set) or `group:<ref>:<name>` (membership of one group).

use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use pyr_types::{Geometry, GroupMembership, OrgUnitSnapshot};

use crate::error::{DiffError, DiffResult};

/// Fields compared when the caller does not name any.
pub const DEFAULT_FIELDS: [&str; 3] = ["name", "geometry", "parent"];

/// Scale applied to planar point distances to get approximate kilometres.
const DISTANCE_SCALE: f64 = 100.0;

/// A group as exposed by group fields: its external id and name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GroupRef {
    pub id: Option<String>,
    pub name: String,
}

impl From<&GroupMembership> for GroupRef {
    fn from(g: &GroupMembership) -> Self {
        Self {
            id: g.source_ref.clone(),
            name: g.name.clone(),
        }
    }
}

/// Value of one field of one unit.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Date(NaiveDate),
    Geometry(Geometry),
    Groups(Vec<GroupRef>),
    Group(GroupRef),
}

impl FieldValue {
    /// Empty lists count as "no value" when classifying deletions.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Groups(groups) if groups.is_empty())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_geometry(&self) -> Option<&Geometry> {
        match self {
            Self::Geometry(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_groups(&self) -> Option<&[GroupRef]> {
        match self {
            Self::Groups(groups) => Some(groups),
            _ => None,
        }
    }

    /// Plain-text rendering used by CSV and table output.
    pub fn display(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::Geometry(g) => match g.as_point() {
                Some((x, y)) => format!("POINT ({x} {y})"),
                None => g.kind().to_uppercase(),
            },
            Self::Groups(groups) => groups
                .iter()
                .map(|g| g.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            Self::Group(g) => g.name.clone(),
        }
    }
}

/// A comparable attribute of an org unit.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
    Name,
    Geometry,
    Parent,
    OpeningDate,
    ClosedDate,
    /// Memberships within the group set whose `source_ref` is `set_ref`.
    GroupSet { set_ref: String, name: String },
    /// Membership of the group whose `source_ref` is `group_ref`.
    Group { group_ref: String, name: String },
}

impl FieldType {
    /// Parse a field name. Unknown names are a configuration error.
    pub fn parse(field_name: &str) -> DiffResult<Self> {
        match field_name {
            "name" => Ok(Self::Name),
            "geometry" => Ok(Self::Geometry),
            "parent" => Ok(Self::Parent),
            "opening_date" => Ok(Self::OpeningDate),
            "closed_date" => Ok(Self::ClosedDate),
            other => {
                let mut parts = other.splitn(3, ':');
                let (prefix, reference, name) = (parts.next(), parts.next(), parts.next());
                match (prefix, reference, name) {
                    (Some("groupset"), Some(r), Some(n)) if !r.is_empty() => Ok(Self::GroupSet {
                        set_ref: r.to_string(),
                        name: n.to_string(),
                    }),
                    (Some("group"), Some(r), Some(n)) if !r.is_empty() => Ok(Self::Group {
                        group_ref: r.to_string(),
                        name: n.to_string(),
                    }),
                    _ => Err(DiffError::Configuration(other.to_string())),
                }
            }
        }
    }

    /// The field name this type was parsed from.
    pub fn key(&self) -> String {
        match self {
            Self::Name => "name".into(),
            Self::Geometry => "geometry".into(),
            Self::Parent => "parent".into(),
            Self::OpeningDate => "opening_date".into(),
            Self::ClosedDate => "closed_date".into(),
            Self::GroupSet { set_ref, name } => format!("groupset:{set_ref}:{name}"),
            Self::Group { group_ref, name } => format!("group:{group_ref}:{name}"),
        }
    }

    /// Human label: the group (set) name for membership fields, the key
    /// otherwise.
    pub fn label(&self) -> String {
        match self {
            Self::GroupSet { name, .. } | Self::Group { name, .. } => name.clone(),
            other => other.key(),
        }
    }

    pub fn is_group_set(&self) -> bool {
        matches!(self, Self::GroupSet { .. })
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group { .. })
    }

    /// Read this field from a unit.
    pub fn access(&self, unit: &OrgUnitSnapshot) -> Option<FieldValue> {
        match self {
            Self::Name => Some(FieldValue::Text(unit.name.clone())),
            Self::Geometry => unit
                .location
                .as_ref()
                .or(unit.geom.as_ref())
                .or(unit.simplified_geom.as_ref())
                .cloned()
                .map(FieldValue::Geometry),
            Self::Parent => unit
                .parent_source_ref()
                .map(|r| FieldValue::Text(r.to_string())),
            Self::OpeningDate => unit.opening_date.map(FieldValue::Date),
            Self::ClosedDate => unit.closed_date.map(FieldValue::Date),
            Self::GroupSet { set_ref, .. } => Some(FieldValue::Groups(
                unit.groups_in_set(set_ref).map(GroupRef::from).collect(),
            )),
            Self::Group { group_ref, .. } => unit
                .group_by_ref(group_ref)
                .map(|g| FieldValue::Group(GroupRef::from(g))),
        }
    }

    /// Whether two values of this field are equal.
    pub fn is_same(&self, a: Option<&FieldValue>, b: Option<&FieldValue>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => match (self, a, b) {
                (Self::GroupSet { .. }, FieldValue::Groups(x), FieldValue::Groups(y)) => {
                    let x: BTreeSet<_> = x.iter().map(|g| g.id.as_deref()).collect();
                    let y: BTreeSet<_> = y.iter().map(|g| g.id.as_deref()).collect();
                    x == y
                }
                (Self::Group { .. }, FieldValue::Group(x), FieldValue::Group(y)) => x.id == y.id,
                _ => a == b,
            },
            _ => false,
        }
    }

    /// Distance between two values. Only defined for two point geometries:
    /// planar distance scaled to approximate kilometres.
    pub fn distance(&self, a: Option<&FieldValue>, b: Option<&FieldValue>) -> Option<f64> {
        match self {
            Self::Geometry => {
                let a = a?.as_geometry()?;
                let b = b?.as_geometry()?;
                a.planar_distance(b).map(|d| d * DISTANCE_SCALE)
            }
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Parse a list of field names, failing on the first unsupported one.
pub fn field_types<S: AsRef<str>>(names: &[S]) -> DiffResult<Vec<FieldType>> {
    names.iter().map(|n| FieldType::parse(n.as_ref())).collect()
}
