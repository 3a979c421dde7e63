//! JSON pyramid documents.
//!
//! A document is a flat, normalized dump of one or more versions: org unit
//! types, group sets, groups and org units referencing each other by local
//! id. It is what the CLI reads and writes; the in-memory store hydrates it
//! into snapshots.

use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use pyr_types::{
    Geometry, Group, GroupId, GroupSet, OrgUnitType, OrgUnitTypeId, UnitId, ValidationStatus,
    VersionId,
};

use crate::error::{StoreError, StoreResult};

/// One org unit row as stored: references are local ids.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrgUnitRecord {
    pub id: UnitId,
    pub version: VersionId,
    #[serde(default)]
    pub source_ref: Option<String>,
    pub name: String,
    #[serde(default)]
    pub org_unit_type_id: Option<OrgUnitTypeId>,
    #[serde(default)]
    pub validation_status: ValidationStatus,
    #[serde(default)]
    pub parent_id: Option<UnitId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Geometry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geom: Option<Geometry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simplified_geom: Option<Geometry>,
    #[serde(default)]
    pub opening_date: Option<NaiveDate>,
    #[serde(default)]
    pub closed_date: Option<NaiveDate>,
    #[serde(default)]
    pub group_ids: Vec<GroupId>,
}

impl OrgUnitRecord {
    /// A record with only identity and name set.
    pub fn new(id: u64, version: u64, name: impl Into<String>) -> Self {
        Self {
            id: UnitId(id),
            version: VersionId(version),
            source_ref: None,
            name: name.into(),
            org_unit_type_id: None,
            validation_status: ValidationStatus::default(),
            parent_id: None,
            location: None,
            geom: None,
            simplified_geom: None,
            opening_date: None,
            closed_date: None,
            group_ids: Vec::new(),
        }
    }

    pub fn with_source_ref(mut self, source_ref: impl Into<String>) -> Self {
        self.source_ref = Some(source_ref.into());
        self
    }

    pub fn with_parent(mut self, parent: u64) -> Self {
        self.parent_id = Some(UnitId(parent));
        self
    }

    pub fn with_groups(mut self, groups: &[u64]) -> Self {
        self.group_ids = groups.iter().copied().map(GroupId).collect();
        self
    }

    pub fn with_location(mut self, location: Geometry) -> Self {
        self.location = Some(location);
        self
    }
}

/// Normalized dump of one or more pyramid versions.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PyramidDocument {
    #[serde(default)]
    pub org_unit_types: Vec<OrgUnitType>,
    #[serde(default)]
    pub group_sets: Vec<GroupSet>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub org_units: Vec<OrgUnitRecord>,
}

impl PyramidDocument {
    /// Parse a document from JSON text.
    pub fn from_json(text: &str) -> StoreResult<Self> {
        serde_json::from_str(text).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Render the document as pretty-printed JSON.
    pub fn to_json(&self) -> StoreResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Read a document from a file.
    pub fn read_from(path: &Path) -> StoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Write a document to a file, replacing it.
    pub fn write_to(&self, path: &Path) -> StoreResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
