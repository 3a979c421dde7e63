use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;

use tracing::debug;

use pyr_types::{
    Group, GroupId, GroupMembership, GroupSet, GroupSetId, GroupSetRef, OrgUnitSnapshot,
    OrgUnitType, OrgUnitTypeId, ParentRef, UnitId, VersionId,
};

use crate::document::{OrgUnitRecord, PyramidDocument};
use crate::error::{StoreError, StoreResult};
use crate::traits::{NewOrgUnit, OrgUnitPatch, PyramidFilter, PyramidStore, PyramidWriter};

/// Number of ancestor levels hydrated into [`OrgUnitSnapshot::parent`].
pub const PARENT_CHAIN_DEPTH: usize = 4;

#[derive(Default)]
struct StoreState {
    org_unit_types: BTreeMap<OrgUnitTypeId, OrgUnitType>,
    group_sets: BTreeMap<GroupSetId, GroupSet>,
    groups: BTreeMap<GroupId, Group>,
    units: BTreeMap<UnitId, OrgUnitRecord>,
}

impl StoreState {
    fn next_unit_id(&self) -> UnitId {
        UnitId(self.units.keys().next_back().map_or(1, |id| id.0 + 1))
    }

    fn next_group_id(&self) -> GroupId {
        GroupId(self.groups.keys().next_back().map_or(1, |id| id.0 + 1))
    }

    /// Dotted path of local ids from the root down to `id`.
    fn path_of(&self, id: UnitId) -> Option<String> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(id);
        while let Some(cur) = current {
            if !seen.insert(cur) {
                return None;
            }
            let record = self.units.get(&cur)?;
            chain.push(cur.to_string());
            current = record.parent_id;
        }
        chain.reverse();
        Some(chain.join("."))
    }

    fn parent_ref(&self, id: UnitId, depth: usize) -> Option<ParentRef> {
        let record = self.units.get(&id)?;
        let parent = match (depth > 1, record.parent_id) {
            (true, Some(pid)) => self.parent_ref(pid, depth - 1).map(Box::new),
            _ => None,
        };
        Some(ParentRef {
            id: record.id,
            source_ref: record.source_ref.clone(),
            name: record.name.clone(),
            parent,
        })
    }

    fn membership(&self, id: GroupId) -> Option<GroupMembership> {
        let group = self.groups.get(&id)?;
        let group_sets = group
            .group_set_ids
            .iter()
            .filter_map(|gs| self.group_sets.get(gs))
            .map(|gs| GroupSetRef {
                id: gs.id,
                source_ref: gs.source_ref.clone(),
                name: gs.name.clone(),
            })
            .collect();
        Some(GroupMembership {
            id: group.id,
            source_ref: group.source_ref.clone(),
            name: group.name.clone(),
            group_sets,
        })
    }

    fn hydrate(&self, record: &OrgUnitRecord) -> OrgUnitSnapshot {
        OrgUnitSnapshot {
            id: record.id,
            version: record.version,
            source_ref: record.source_ref.clone(),
            name: record.name.clone(),
            org_unit_type: record
                .org_unit_type_id
                .and_then(|t| self.org_unit_types.get(&t).cloned()),
            validation_status: record.validation_status,
            parent: record
                .parent_id
                .and_then(|p| self.parent_ref(p, PARENT_CHAIN_DEPTH)),
            path: self.path_of(record.id),
            location: record.location.clone(),
            geom: record.geom.clone(),
            simplified_geom: record.simplified_geom.clone(),
            opening_date: record.opening_date,
            closed_date: record.closed_date,
            groups: record
                .group_ids
                .iter()
                .filter_map(|g| self.membership(*g))
                .collect(),
        }
    }

    fn is_in_subtree(&self, id: UnitId, top: UnitId) -> bool {
        let mut seen = HashSet::new();
        let mut current = Some(id);
        while let Some(cur) = current {
            if cur == top {
                return true;
            }
            if !seen.insert(cur) {
                return false;
            }
            current = self.units.get(&cur).and_then(|r| r.parent_id);
        }
        false
    }

    fn check_parent(&self, unit: UnitId, version: VersionId, parent: UnitId) -> StoreResult<()> {
        let parent_record = self.units.get(&parent).ok_or_else(|| StoreError::InvalidParent {
            unit,
            parent,
            reason: "parent does not exist".into(),
        })?;
        if parent_record.version != version {
            return Err(StoreError::VersionMismatch {
                what: format!("parent {parent}"),
                expected: version,
                actual: parent_record.version,
            });
        }
        if self.is_in_subtree(parent, unit) {
            return Err(StoreError::InvalidParent {
                unit,
                parent,
                reason: "parent is a descendant of the unit".into(),
            });
        }
        Ok(())
    }

    fn check_group(&self, unit_version: VersionId, group: GroupId) -> StoreResult<()> {
        let record = self.groups.get(&group).ok_or(StoreError::GroupNotFound(group))?;
        if record.version != unit_version {
            return Err(StoreError::VersionMismatch {
                what: format!("group {group}"),
                expected: unit_version,
                actual: record.version,
            });
        }
        Ok(())
    }
}

/// In-memory, `BTreeMap`-based pyramid store.
///
/// Intended for tests, embedding, and the CLI. Records are held behind a
/// `RwLock` and hydrated into snapshots on every read.
pub struct InMemoryPyramidStore {
    state: RwLock<StoreState>,
}

impl InMemoryPyramidStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
        }
    }

    /// Build a store from a document, validating every reference.
    pub fn from_document(doc: PyramidDocument) -> StoreResult<Self> {
        let store = Self::new();
        for t in doc.org_unit_types {
            store.insert_org_unit_type(t)?;
        }
        for gs in doc.group_sets {
            store.insert_group_set(gs)?;
        }
        for g in doc.groups {
            store.insert_group(g)?;
        }
        // Parents may appear after their children in the file.
        {
            let mut state = store.state.write().expect("lock poisoned");
            for unit in doc.org_units {
                if state.units.contains_key(&unit.id) {
                    return Err(StoreError::DuplicateId(format!("org unit {}", unit.id)));
                }
                state.units.insert(unit.id, unit);
            }
            let records: Vec<OrgUnitRecord> = state.units.values().cloned().collect();
            for record in &records {
                if let Some(parent) = record.parent_id {
                    state.check_parent(record.id, record.version, parent)?;
                }
                for group in &record.group_ids {
                    state.check_group(record.version, *group)?;
                }
                if let Some(t) = record.org_unit_type_id {
                    if !state.org_unit_types.contains_key(&t) {
                        return Err(StoreError::DanglingReference(format!(
                            "org unit {} has unknown type {t}",
                            record.id
                        )));
                    }
                }
            }
        }
        debug!(units = store.len(), "pyramid document loaded");
        Ok(store)
    }

    /// Dump the store back into a document.
    pub fn to_document(&self) -> PyramidDocument {
        let state = self.state.read().expect("lock poisoned");
        PyramidDocument {
            org_unit_types: state.org_unit_types.values().cloned().collect(),
            group_sets: state.group_sets.values().cloned().collect(),
            groups: state.groups.values().cloned().collect(),
            org_units: state.units.values().cloned().collect(),
        }
    }

    pub fn insert_org_unit_type(&self, t: OrgUnitType) -> StoreResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        if state.org_unit_types.contains_key(&t.id) {
            return Err(StoreError::DuplicateId(format!("org unit type {}", t.id)));
        }
        state.org_unit_types.insert(t.id, t);
        Ok(())
    }

    pub fn insert_group_set(&self, gs: GroupSet) -> StoreResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        if state.group_sets.contains_key(&gs.id) {
            return Err(StoreError::DuplicateId(format!("group set {}", gs.id)));
        }
        state.group_sets.insert(gs.id, gs);
        Ok(())
    }

    pub fn insert_group(&self, group: Group) -> StoreResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        if state.groups.contains_key(&group.id) {
            return Err(StoreError::DuplicateId(format!("group {}", group.id)));
        }
        for gs in &group.group_set_ids {
            if !state.group_sets.contains_key(gs) {
                return Err(StoreError::DanglingReference(format!(
                    "group {} references unknown group set {gs}",
                    group.id
                )));
            }
        }
        state.groups.insert(group.id, group);
        Ok(())
    }

    /// Insert a raw unit record. The parent, if any, must already exist.
    pub fn insert_unit(&self, record: OrgUnitRecord) -> StoreResult<UnitId> {
        let mut state = self.state.write().expect("lock poisoned");
        if state.units.contains_key(&record.id) {
            return Err(StoreError::DuplicateId(format!("org unit {}", record.id)));
        }
        if let Some(parent) = record.parent_id {
            state.check_parent(record.id, record.version, parent)?;
        }
        for group in &record.group_ids {
            state.check_group(record.version, *group)?;
        }
        let id = record.id;
        state.units.insert(id, record);
        Ok(id)
    }

    /// The raw record of a unit.
    pub fn record(&self, id: UnitId) -> Option<OrgUnitRecord> {
        self.state.read().expect("lock poisoned").units.get(&id).cloned()
    }

    /// Hydrated snapshot of a unit.
    pub fn snapshot(&self, id: UnitId) -> Option<OrgUnitSnapshot> {
        let state = self.state.read().expect("lock poisoned");
        state.units.get(&id).map(|r| state.hydrate(r))
    }

    /// Number of units currently stored, across all versions.
    pub fn len(&self) -> usize {
        self.state.read().expect("lock poisoned").units.len()
    }

    /// Returns `true` if the store holds no units.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryPyramidStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryPyramidStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryPyramidStore")
            .field("unit_count", &self.len())
            .finish()
    }
}

impl PyramidStore for InMemoryPyramidStore {
    fn load_pyramid(
        &self,
        version: VersionId,
        filter: &PyramidFilter,
    ) -> StoreResult<Vec<OrgUnitSnapshot>> {
        let state = self.state.read().expect("lock poisoned");
        let units = state
            .units
            .values()
            .filter(|r| r.version == version)
            .filter(|r| {
                filter
                    .validation_status
                    .map_or(true, |s| r.validation_status == s)
            })
            .filter(|r| {
                filter.org_unit_types.is_empty()
                    || r
                        .org_unit_type_id
                        .is_some_and(|t| filter.org_unit_types.contains(&t))
            })
            .filter(|r| {
                filter
                    .top_org_unit
                    .map_or(true, |top| state.is_in_subtree(r.id, top))
            })
            .map(|r| state.hydrate(r))
            .collect();
        Ok(units)
    }

    fn group_sets(&self, version: VersionId) -> StoreResult<Vec<GroupSet>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state
            .group_sets
            .values()
            .filter(|gs| gs.version == version)
            .cloned()
            .collect())
    }

    fn groups(&self, version: VersionId) -> StoreResult<Vec<Group>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state
            .groups
            .values()
            .filter(|g| g.version == version)
            .cloned()
            .collect())
    }

    fn source_ref_exists(&self, version: VersionId, source_ref: &str) -> StoreResult<bool> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state
            .units
            .values()
            .any(|r| r.version == version && r.source_ref.as_deref() == Some(source_ref)))
    }

    fn find_by_source_ref(
        &self,
        version: VersionId,
        source_ref: &str,
    ) -> StoreResult<Option<OrgUnitSnapshot>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state
            .units
            .values()
            .find(|r| r.version == version && r.source_ref.as_deref() == Some(source_ref))
            .map(|r| state.hydrate(r)))
    }
}

impl PyramidWriter for InMemoryPyramidStore {
    fn create_org_unit(&self, unit: NewOrgUnit) -> StoreResult<UnitId> {
        let mut state = self.state.write().expect("lock poisoned");
        let id = state.next_unit_id();
        if let Some(parent) = unit.parent_id {
            state.check_parent(id, unit.version, parent)?;
        }
        let record = OrgUnitRecord {
            id,
            version: unit.version,
            source_ref: unit.source_ref,
            name: unit.name,
            org_unit_type_id: unit.org_unit_type_id,
            validation_status: unit.validation_status,
            parent_id: unit.parent_id,
            location: unit.location,
            geom: unit.geom,
            simplified_geom: None,
            opening_date: unit.opening_date,
            closed_date: unit.closed_date,
            group_ids: Vec::new(),
        };
        debug!(%id, version = %record.version, name = %record.name, "org unit created");
        state.units.insert(id, record);
        Ok(id)
    }

    fn update_org_unit(&self, id: UnitId, patch: &OrgUnitPatch) -> StoreResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        let version = state
            .units
            .get(&id)
            .map(|r| r.version)
            .ok_or(StoreError::UnitNotFound(id))?;
        if let Some(Some(parent)) = patch.parent_id {
            state.check_parent(id, version, parent)?;
        }
        let record = state.units.get_mut(&id).ok_or(StoreError::UnitNotFound(id))?;
        if let Some(name) = &patch.name {
            record.name = name.clone();
        }
        if let Some(parent) = patch.parent_id {
            record.parent_id = parent;
        }
        if let Some(location) = &patch.location {
            record.location = location.clone();
        }
        if let Some(geom) = &patch.geom {
            record.geom = geom.clone();
            record.simplified_geom = None;
        }
        if let Some(date) = patch.opening_date {
            record.opening_date = date;
        }
        if let Some(date) = patch.closed_date {
            record.closed_date = date;
        }
        Ok(())
    }

    fn set_source_ref(&self, id: UnitId, source_ref: &str) -> StoreResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        let record = state.units.get_mut(&id).ok_or(StoreError::UnitNotFound(id))?;
        record.source_ref = Some(source_ref.to_string());
        Ok(())
    }

    fn find_group(&self, version: VersionId, source_ref: &str) -> StoreResult<Option<Group>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state
            .groups
            .values()
            .find(|g| g.version == version && g.source_ref.as_deref() == Some(source_ref))
            .cloned())
    }

    fn create_group(
        &self,
        version: VersionId,
        source_ref: &str,
        name: &str,
    ) -> StoreResult<GroupId> {
        let mut state = self.state.write().expect("lock poisoned");
        let id = state.next_group_id();
        state.groups.insert(
            id,
            Group {
                id,
                version,
                source_ref: Some(source_ref.to_string()),
                name: name.to_string(),
                group_set_ids: Vec::new(),
            },
        );
        debug!(%id, %version, source_ref, "group created");
        Ok(id)
    }

    fn add_to_group(&self, unit: UnitId, group: GroupId) -> StoreResult<bool> {
        let mut state = self.state.write().expect("lock poisoned");
        let version = state
            .units
            .get(&unit)
            .map(|r| r.version)
            .ok_or(StoreError::UnitNotFound(unit))?;
        state.check_group(version, group)?;
        let record = state.units.get_mut(&unit).ok_or(StoreError::UnitNotFound(unit))?;
        if record.group_ids.contains(&group) {
            return Ok(false);
        }
        record.group_ids.push(group);
        Ok(true)
    }

    fn remove_from_group(&self, unit: UnitId, group: GroupId) -> StoreResult<bool> {
        let mut state = self.state.write().expect("lock poisoned");
        let record = state.units.get_mut(&unit).ok_or(StoreError::UnitNotFound(unit))?;
        let before = record.group_ids.len();
        record.group_ids.retain(|g| *g != group);
        Ok(record.group_ids.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyr_types::{Geometry, ValidationStatus};

    fn fixture() -> InMemoryPyramidStore {
        let store = InMemoryPyramidStore::new();
        store
            .insert_org_unit_type(OrgUnitType { id: OrgUnitTypeId(1), name: "Country".into() })
            .unwrap();
        store
            .insert_org_unit_type(OrgUnitType { id: OrgUnitTypeId(2), name: "Province".into() })
            .unwrap();
        store
            .insert_group_set(GroupSet {
                id: GroupSetId(1),
                version: VersionId(1),
                source_ref: Some("gs".into()),
                name: "Ownership".into(),
            })
            .unwrap();
        store
            .insert_group(Group {
                id: GroupId(1),
                version: VersionId(1),
                source_ref: Some("pub".into()),
                name: "Public".into(),
                group_set_ids: vec![GroupSetId(1)],
            })
            .unwrap();

        let mut root = OrgUnitRecord::new(1, 1, "Angola").with_source_ref("AO");
        root.org_unit_type_id = Some(OrgUnitTypeId(1));
        root.validation_status = ValidationStatus::Valid;
        store.insert_unit(root).unwrap();

        let mut child = OrgUnitRecord::new(2, 1, "Luanda")
            .with_source_ref("LU")
            .with_parent(1)
            .with_groups(&[1]);
        child.org_unit_type_id = Some(OrgUnitTypeId(2));
        store.insert_unit(child).unwrap();

        store
            .insert_unit(OrgUnitRecord::new(3, 1, "Viana").with_parent(2))
            .unwrap();
        store
            .insert_unit(OrgUnitRecord::new(4, 2, "Angola v2").with_source_ref("AO"))
            .unwrap();
        store
    }

    #[test]
    fn load_pyramid_hydrates_snapshots() {
        let store = fixture();
        let units = store.load_pyramid(VersionId(1), &PyramidFilter::new()).unwrap();
        assert_eq!(units.len(), 3);

        let viana = units.iter().find(|u| u.name == "Viana").unwrap();
        assert_eq!(viana.path.as_deref(), Some("1.2.3"));
        let parent = viana.parent.as_ref().unwrap();
        assert_eq!(parent.source_ref.as_deref(), Some("LU"));
        assert_eq!(parent.chain_len(), 2);

        let luanda = units.iter().find(|u| u.name == "Luanda").unwrap();
        assert_eq!(luanda.type_name(), "Province");
        assert_eq!(luanda.groups.len(), 1);
        assert!(luanda.groups[0].in_group_set("gs"));
    }

    #[test]
    fn filters_restrict_pyramid() {
        let store = fixture();
        let valid = store
            .load_pyramid(
                VersionId(1),
                &PyramidFilter::new().with_validation_status(ValidationStatus::Valid),
            )
            .unwrap();
        assert_eq!(valid.len(), 1);

        let provinces = store
            .load_pyramid(
                VersionId(1),
                &PyramidFilter::new().with_org_unit_types(vec![OrgUnitTypeId(2)]),
            )
            .unwrap();
        assert_eq!(provinces.len(), 1);
        assert_eq!(provinces[0].name, "Luanda");

        let subtree = store
            .load_pyramid(VersionId(1), &PyramidFilter::new().with_top_org_unit(UnitId(2)))
            .unwrap();
        let names: Vec<_> = subtree.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["Luanda", "Viana"]);
    }

    #[test]
    fn unknown_version_is_empty() {
        let store = fixture();
        assert!(store.load_pyramid(VersionId(99), &PyramidFilter::new()).unwrap().is_empty());
    }

    #[test]
    fn source_ref_lookup_is_per_version() {
        let store = fixture();
        assert!(store.source_ref_exists(VersionId(1), "AO").unwrap());
        assert!(store.source_ref_exists(VersionId(2), "AO").unwrap());
        assert!(!store.source_ref_exists(VersionId(2), "LU").unwrap());
        let found = store.find_by_source_ref(VersionId(2), "AO").unwrap().unwrap();
        assert_eq!(found.id, UnitId(4));
    }

    #[test]
    fn insert_rejects_missing_parent_and_cross_version_group() {
        let store = fixture();
        let err = store
            .insert_unit(OrgUnitRecord::new(10, 1, "Orphan").with_parent(99))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidParent { .. }));

        let err = store
            .insert_unit(OrgUnitRecord::new(11, 2, "Wrong").with_groups(&[1]))
            .unwrap_err();
        assert!(matches!(err, StoreError::VersionMismatch { .. }));
    }

    #[test]
    fn create_and_update_units() {
        let store = fixture();
        let mut new = NewOrgUnit::new(VersionId(1), "Cacuaco");
        new.parent_id = Some(UnitId(2));
        new.source_ref = Some("CA".into());
        let id = store.create_org_unit(new).unwrap();
        assert_eq!(id, UnitId(5));
        assert_eq!(store.snapshot(id).unwrap().path.as_deref(), Some("1.2.5"));

        let patch = OrgUnitPatch {
            name: Some("Cacuaco new".into()),
            location: Some(Some(Geometry::point(1.0, 2.0))),
            ..Default::default()
        };
        store.update_org_unit(id, &patch).unwrap();
        let snap = store.snapshot(id).unwrap();
        assert_eq!(snap.name, "Cacuaco new");
        assert_eq!(snap.location, Some(Geometry::point(1.0, 2.0)));
    }

    #[test]
    fn reparenting_under_descendant_is_rejected() {
        let store = fixture();
        let patch = OrgUnitPatch { parent_id: Some(Some(UnitId(3))), ..Default::default() };
        let err = store.update_org_unit(UnitId(1), &patch).unwrap_err();
        assert!(matches!(err, StoreError::InvalidParent { .. }));
    }

    #[test]
    fn group_membership_changes() {
        let store = fixture();
        assert!(store.add_to_group(UnitId(3), GroupId(1)).unwrap());
        assert!(!store.add_to_group(UnitId(3), GroupId(1)).unwrap());
        assert!(store.remove_from_group(UnitId(3), GroupId(1)).unwrap());
        assert!(!store.remove_from_group(UnitId(3), GroupId(1)).unwrap());

        let gid = store.create_group(VersionId(2), "new", "New group").unwrap();
        assert_eq!(gid, GroupId(2));
        assert_eq!(store.find_group(VersionId(2), "new").unwrap().unwrap().name, "New group");
        assert!(store.find_group(VersionId(1), "new").unwrap().is_none());
    }

    #[test]
    fn document_roundtrip_preserves_store() {
        let store = fixture();
        let doc = store.to_document();
        let reloaded = InMemoryPyramidStore::from_document(doc.clone()).unwrap();
        assert_eq!(reloaded.to_document(), doc);
        assert_eq!(reloaded.len(), 4);
    }

    #[test]
    fn document_with_children_before_parents_loads() {
        let doc = PyramidDocument {
            org_units: vec![
                OrgUnitRecord::new(2, 1, "Child").with_parent(1),
                OrgUnitRecord::new(1, 1, "Root"),
            ],
            ..Default::default()
        };
        let store = InMemoryPyramidStore::from_document(doc).unwrap();
        assert_eq!(store.snapshot(UnitId(2)).unwrap().path.as_deref(), Some("1.2"));
    }
}
