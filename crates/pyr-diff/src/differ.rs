//! Pyramid-level diff: load two pyramids, match units by `source_ref`, and
//! compare every matched pair field by field.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use pyr_store::{PyramidFilter, PyramidStore};
use pyr_types::{OrgUnitSnapshot, UnitId, VersionId};

use crate::comparison::{compare, Diff, DiffStatus};
use crate::error::DiffResult;
use crate::field::{field_types, FieldType, DEFAULT_FIELDS};

/// Parameters of one diff run.
///
/// The reference pyramid (`version_ref`) is the one being compared; the
/// target pyramid (`version_target`) is what it is compared against.
#[derive(Clone, Debug)]
pub struct DiffQuery {
    pub version_ref: VersionId,
    pub version_target: VersionId,
    /// Do not append one field per group set of the target version.
    pub ignore_groups: bool,
    /// Also report target units that have no counterpart in the reference.
    pub show_deleted_units: bool,
    /// Append one field per individual group found in either version.
    pub compare_groups: bool,
    pub filter_ref: PyramidFilter,
    pub filter_target: PyramidFilter,
    /// Fields to compare; [`DEFAULT_FIELDS`] when `None`.
    pub field_names: Option<Vec<String>>,
}

impl DiffQuery {
    pub fn new(version_ref: VersionId, version_target: VersionId) -> Self {
        Self {
            version_ref,
            version_target,
            ignore_groups: false,
            show_deleted_units: false,
            compare_groups: false,
            filter_ref: PyramidFilter::default(),
            filter_target: PyramidFilter::default(),
            field_names: None,
        }
    }

    pub fn with_fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.field_names = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn ignoring_groups(mut self) -> Self {
        self.ignore_groups = true;
        self
    }

    pub fn showing_deleted_units(mut self) -> Self {
        self.show_deleted_units = true;
        self
    }

    pub fn comparing_groups(mut self) -> Self {
        self.compare_groups = true;
        self
    }
}

/// Non-fatal data anomaly found while diffing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Several units of one version share a `source_ref`; the first one is
    /// used for matching.
    DuplicateSourceRef {
        version: VersionId,
        source_ref: String,
        unit_ids: Vec<UnitId>,
    },
}

/// Result of a diff run.
#[derive(Clone, Debug, Default)]
pub struct DiffReport {
    pub diffs: Vec<Diff>,
    /// Fully resolved field names, group set fields included.
    pub field_names: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Computes diffs between two pyramids of a store.
pub struct Differ<'a> {
    store: &'a dyn PyramidStore,
}

impl<'a> Differ<'a> {
    pub fn new(store: &'a dyn PyramidStore) -> Self {
        Self { store }
    }

    /// Load all units of `version` matching `filter`.
    pub fn load_pyramid(
        &self,
        version: VersionId,
        filter: &PyramidFilter,
    ) -> DiffResult<Vec<OrgUnitSnapshot>> {
        Ok(self.store.load_pyramid(version, filter)?)
    }

    /// Compute the diff described by `query`.
    pub fn diff(&self, query: &DiffQuery) -> DiffResult<DiffReport> {
        let requested: Vec<String> = match &query.field_names {
            Some(names) => names.clone(),
            None => DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect(),
        };
        // Reject unsupported names before touching any data.
        let mut fields = field_types(&requested)?;

        if !query.ignore_groups {
            for group_set in self.store.group_sets(query.version_target)? {
                if let Some(key) = group_set.field_key() {
                    fields.push(FieldType::parse(&key)?);
                }
            }
        }
        if query.compare_groups {
            fields.extend(self.group_fields(query)?);
        }
        dedup_fields(&mut fields);
        let field_names: Vec<String> = fields.iter().map(FieldType::key).collect();

        info!(
            version_ref = %query.version_ref,
            version_target = %query.version_target,
            fields = ?field_names,
            "computing pyramid diff"
        );

        let units_ref = self.load_pyramid(query.version_ref, &query.filter_ref)?;
        let units_target = self.load_pyramid(query.version_target, &query.filter_target)?;
        debug!(
            ref_units = units_ref.len(),
            target_units = units_target.len(),
            "pyramids loaded"
        );

        let mut diagnostics = duplicate_diagnostics(query.version_target, &units_target);
        diagnostics.extend(duplicate_diagnostics(query.version_ref, &units_ref));
        for d in &diagnostics {
            let Diagnostic::DuplicateSourceRef { version, source_ref, unit_ids } = d;
            warn!(%version, %source_ref, units = ?unit_ids, "duplicate source_ref, using first match");
        }

        let index = index_by_source_ref(&units_target);

        let mut diffs = Vec::with_capacity(units_ref.len());
        for unit_ref in &units_ref {
            let unit_target = unit_ref
                .source_ref()
                .and_then(|r| index.get(r))
                .map(|matches| matches[0]);
            let comparisons = fields
                .iter()
                .map(|f| compare(f, unit_target.and_then(|t| f.access(t)), f.access(unit_ref)))
                .collect();
            diffs.push(Diff::matched(unit_ref.clone(), unit_target.cloned(), comparisons));
        }

        if query.show_deleted_units {
            let ref_refs: HashSet<&str> =
                units_ref.iter().filter_map(OrgUnitSnapshot::source_ref).collect();
            let mut seen = HashSet::new();
            for unit_target in &units_target {
                let Some(source_ref) = unit_target.source_ref() else {
                    continue;
                };
                if ref_refs.contains(source_ref) || !seen.insert(source_ref) {
                    continue;
                }
                // Existence is checked in the same target version the unit was
                // just loaded from.
                let status = if self.store.source_ref_exists(query.version_target, source_ref)? {
                    DiffStatus::Deleted
                } else {
                    DiffStatus::NeverSeen
                };
                diffs.push(Diff::removed(unit_target.clone(), &fields, status));
            }
        }

        debug!(diffs = diffs.len(), "pyramid diff complete");
        Ok(DiffReport {
            diffs,
            field_names,
            diagnostics,
        })
    }

    /// One `group:` field per group of either version, target groups first.
    fn group_fields(&self, query: &DiffQuery) -> DiffResult<Vec<FieldType>> {
        let mut groups = self.store.groups(query.version_target)?;
        groups.extend(self.store.groups(query.version_ref)?);
        Ok(groups
            .into_iter()
            .filter_map(|g| {
                let group_ref = g.source_ref.filter(|r| !r.trim().is_empty())?;
                Some(FieldType::Group { group_ref, name: g.name })
            })
            .collect())
    }
}

fn dedup_fields(fields: &mut Vec<FieldType>) {
    let mut seen = HashSet::new();
    fields.retain(|f| match f {
        FieldType::Group { group_ref, .. } => seen.insert(format!("group:{group_ref}")),
        other => seen.insert(other.key()),
    });
}

fn index_by_source_ref(units: &[OrgUnitSnapshot]) -> HashMap<&str, Vec<&OrgUnitSnapshot>> {
    let mut index: HashMap<&str, Vec<&OrgUnitSnapshot>> = HashMap::new();
    for unit in units {
        if let Some(r) = unit.source_ref() {
            index.entry(r).or_default().push(unit);
        }
    }
    index
}

fn duplicate_diagnostics(version: VersionId, units: &[OrgUnitSnapshot]) -> Vec<Diagnostic> {
    let mut order = Vec::new();
    let mut by_ref: HashMap<&str, Vec<UnitId>> = HashMap::new();
    for unit in units {
        if let Some(r) = unit.source_ref() {
            let ids = by_ref.entry(r).or_default();
            if ids.is_empty() {
                order.push(r);
            }
            ids.push(unit.id);
        }
    }
    order
        .into_iter()
        .filter_map(|r| {
            let ids = by_ref.remove(r)?;
            (ids.len() > 1).then(|| Diagnostic::DuplicateSourceRef {
                version,
                source_ref: r.to_string(),
                unit_ids: ids,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparison::ComparisonStatus;
    use crate::error::DiffError;
    use crate::field::{FieldValue, GroupRef};
    use pyr_store::{InMemoryPyramidStore, OrgUnitRecord};
    use pyr_types::{Geometry, Group, GroupId, GroupSet, GroupSetId};

    const REF: VersionId = VersionId(2);
    const TARGET: VersionId = VersionId(1);

    /// Target version 1 and reference version 2 with the same shape:
    /// Angola > Luanda, each carrying a source_ref.
    fn twin_store() -> InMemoryPyramidStore {
        let store = InMemoryPyramidStore::new();
        for (base, version) in [(0, 1), (10, 2)] {
            store
                .insert_unit(
                    OrgUnitRecord::new(base + 1, version, "Angola")
                        .with_source_ref("AO")
                        .with_location(Geometry::point(13.0, -8.0)),
                )
                .unwrap();
            store
                .insert_unit(
                    OrgUnitRecord::new(base + 2, version, "Luanda")
                        .with_source_ref("LU")
                        .with_parent(base + 1),
                )
                .unwrap();
        }
        store
    }

    fn text(s: &str) -> Option<FieldValue> {
        Some(FieldValue::Text(s.into()))
    }

    #[test]
    fn self_diff_is_all_same() {
        let store = twin_store();
        let differ = Differ::new(&store);
        let report = differ.diff(&DiffQuery::new(TARGET, TARGET)).unwrap();
        assert_eq!(report.diffs.len(), 2);
        assert!(report.diffs.iter().all(|d| d.status == DiffStatus::Same));
        assert_eq!(report.field_names, vec!["name", "geometry", "parent"]);
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn rename_is_modified() {
        let store = InMemoryPyramidStore::new();
        store
            .insert_unit(OrgUnitRecord::new(1, 1, "Angola").with_source_ref("AO"))
            .unwrap();
        store
            .insert_unit(OrgUnitRecord::new(2, 2, "Angola new").with_source_ref("AO"))
            .unwrap();

        let report = Differ::new(&store)
            .diff(&DiffQuery::new(REF, TARGET).with_fields(["name"]))
            .unwrap();
        assert_eq!(report.diffs.len(), 1);
        let diff = &report.diffs[0];
        assert_eq!(diff.status, DiffStatus::Modified);
        assert_eq!(diff.comparisons.len(), 1);
        let c = &diff.comparisons[0];
        assert_eq!(c.field, "name");
        assert_eq!(c.before, text("Angola"));
        assert_eq!(c.after, text("Angola new"));
        assert_eq!(c.status, ComparisonStatus::Modified);
        assert_eq!(c.distance, None);
    }

    #[test]
    fn unmatched_unit_is_new() {
        let store = InMemoryPyramidStore::new();
        store
            .insert_unit(OrgUnitRecord::new(1, 2, "Angola").with_source_ref("AO"))
            .unwrap();
        let report = Differ::new(&store)
            .diff(&DiffQuery::new(REF, TARGET).with_fields(["name"]))
            .unwrap();
        let diff = &report.diffs[0];
        assert_eq!(diff.status, DiffStatus::New);
        assert!(diff.org_unit_target.is_none());
        let c = &diff.comparisons[0];
        assert_eq!(c.before, None);
        assert_eq!(c.after, text("Angola"));
        assert_eq!(c.status, ComparisonStatus::New);
    }

    #[test]
    fn unit_without_source_ref_never_matches() {
        let store = InMemoryPyramidStore::new();
        store.insert_unit(OrgUnitRecord::new(1, 1, "Angola")).unwrap();
        store.insert_unit(OrgUnitRecord::new(2, 2, "Angola")).unwrap();
        let report = Differ::new(&store).diff(&DiffQuery::new(REF, TARGET)).unwrap();
        assert_eq!(report.diffs[0].status, DiffStatus::New);
    }

    #[test]
    fn geometry_move_reports_distance() {
        let store = InMemoryPyramidStore::new();
        store
            .insert_unit(
                OrgUnitRecord::new(1, 1, "A")
                    .with_source_ref("A")
                    .with_location(Geometry::point(0.0, 0.0)),
            )
            .unwrap();
        store
            .insert_unit(
                OrgUnitRecord::new(2, 2, "A")
                    .with_source_ref("A")
                    .with_location(Geometry::point(0.03, 0.04)),
            )
            .unwrap();
        let report = Differ::new(&store)
            .diff(&DiffQuery::new(REF, TARGET).with_fields(["geometry"]))
            .unwrap();
        let c = &report.diffs[0].comparisons[0];
        assert_eq!(c.status, ComparisonStatus::Modified);
        assert!((c.distance.unwrap() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn unsupported_field_fails_before_loading() {
        let store = twin_store();
        let err = Differ::new(&store)
            .diff(&DiffQuery::new(REF, TARGET).with_fields(["name", "population"]))
            .unwrap_err();
        assert!(matches!(err, DiffError::Configuration(f) if f == "population"));
    }

    fn grouped_store() -> InMemoryPyramidStore {
        let store = InMemoryPyramidStore::new();
        for version in [1u64, 2] {
            store
                .insert_group_set(GroupSet {
                    id: GroupSetId(version),
                    version: VersionId(version),
                    source_ref: Some("owner".into()),
                    name: "Ownership".into(),
                })
                .unwrap();
        }
        let groups = [(1, 1, "A"), (2, 1, "B"), (3, 2, "A"), (4, 2, "C")];
        for (id, version, name) in groups {
            store
                .insert_group(Group {
                    id: GroupId(id),
                    version: VersionId(version),
                    source_ref: Some(name.to_lowercase()),
                    name: name.into(),
                    group_set_ids: vec![GroupSetId(version)],
                })
                .unwrap();
        }
        store
            .insert_unit(OrgUnitRecord::new(1, 1, "Clinic").with_source_ref("CL").with_groups(&[1, 2]))
            .unwrap();
        store
            .insert_unit(OrgUnitRecord::new(2, 2, "Clinic").with_source_ref("CL").with_groups(&[3, 4]))
            .unwrap();
        store
    }

    #[test]
    fn group_set_fields_are_appended() {
        let store = grouped_store();
        let report = Differ::new(&store)
            .diff(&DiffQuery::new(REF, TARGET).with_fields(["name"]))
            .unwrap();
        assert_eq!(report.field_names, vec!["name", "groupset:owner:Ownership"]);
        let diff = &report.diffs[0];
        assert_eq!(diff.status, DiffStatus::Modified);
        let c = diff.comparison("groupset:owner:Ownership").unwrap();
        assert_eq!(c.status, ComparisonStatus::Modified);
        assert_eq!(
            c.after,
            Some(FieldValue::Groups(vec![
                GroupRef { id: Some("a".into()), name: "A".into() },
                GroupRef { id: Some("c".into()), name: "C".into() },
            ]))
        );

        let ignored = Differ::new(&store)
            .diff(&DiffQuery::new(REF, TARGET).with_fields(["name"]).ignoring_groups())
            .unwrap();
        assert_eq!(ignored.field_names, vec!["name"]);
        assert_eq!(ignored.diffs[0].status, DiffStatus::Same);
    }

    #[test]
    fn individual_group_comparisons() {
        let store = grouped_store();
        let report = Differ::new(&store)
            .diff(
                &DiffQuery::new(REF, TARGET)
                    .with_fields(["name"])
                    .ignoring_groups()
                    .comparing_groups(),
            )
            .unwrap();
        assert_eq!(report.field_names, vec!["name", "group:a:A", "group:b:B", "group:c:C"]);
        let diff = &report.diffs[0];
        assert_eq!(diff.comparison("group:a:A").unwrap().status, ComparisonStatus::Same);
        assert_eq!(diff.comparison("group:b:B").unwrap().status, ComparisonStatus::Deleted);
        assert_eq!(diff.comparison("group:c:C").unwrap().status, ComparisonStatus::New);
    }

    #[test]
    fn duplicates_are_diagnosed_and_first_wins() {
        let store = InMemoryPyramidStore::new();
        store.insert_unit(OrgUnitRecord::new(1, 1, "First").with_source_ref("X")).unwrap();
        store.insert_unit(OrgUnitRecord::new(2, 1, "Second").with_source_ref("X")).unwrap();
        store.insert_unit(OrgUnitRecord::new(3, 2, "First").with_source_ref("X")).unwrap();

        let report = Differ::new(&store)
            .diff(&DiffQuery::new(REF, TARGET).with_fields(["name"]))
            .unwrap();
        assert_eq!(report.diffs.len(), 1);
        assert_eq!(report.diffs[0].status, DiffStatus::Same);
        assert_eq!(report.diffs[0].org_unit_target.as_ref().unwrap().id, UnitId(1));
        assert_eq!(
            report.diagnostics,
            vec![Diagnostic::DuplicateSourceRef {
                version: TARGET,
                source_ref: "X".into(),
                unit_ids: vec![UnitId(1), UnitId(2)],
            }]
        );
    }

    #[test]
    fn deleted_units_are_reported_on_request() {
        let store = twin_store();
        store.insert_unit(OrgUnitRecord::new(5, 1, "Benguela").with_source_ref("BG")).unwrap();

        let without = Differ::new(&store).diff(&DiffQuery::new(REF, TARGET)).unwrap();
        assert_eq!(without.diffs.len(), 2);

        let with = Differ::new(&store)
            .diff(&DiffQuery::new(REF, TARGET).showing_deleted_units())
            .unwrap();
        assert_eq!(with.diffs.len(), 3);
        let deleted = &with.diffs[2];
        assert_eq!(deleted.status, DiffStatus::Deleted);
        assert!(deleted.org_unit_ref.is_none());
        assert_eq!(deleted.org_unit().unwrap().name, "Benguela");
        let c = deleted.comparison("name").unwrap();
        assert_eq!(c.before, text("Benguela"));
        assert_eq!(c.after, None);
        assert_eq!(c.status, ComparisonStatus::Deleted);
    }

    /// Store whose existence check never finds a ref, as when the unit has
    /// vanished from the target version since the pyramid was loaded.
    struct VanishingRefs(InMemoryPyramidStore);

    impl PyramidStore for VanishingRefs {
        fn load_pyramid(
            &self,
            version: VersionId,
            filter: &PyramidFilter,
        ) -> pyr_store::StoreResult<Vec<OrgUnitSnapshot>> {
            self.0.load_pyramid(version, filter)
        }

        fn group_sets(&self, version: VersionId) -> pyr_store::StoreResult<Vec<GroupSet>> {
            self.0.group_sets(version)
        }

        fn groups(&self, version: VersionId) -> pyr_store::StoreResult<Vec<Group>> {
            self.0.groups(version)
        }

        fn source_ref_exists(&self, _: VersionId, _: &str) -> pyr_store::StoreResult<bool> {
            Ok(false)
        }

        fn find_by_source_ref(
            &self,
            version: VersionId,
            source_ref: &str,
        ) -> pyr_store::StoreResult<Option<OrgUnitSnapshot>> {
            self.0.find_by_source_ref(version, source_ref)
        }
    }

    #[test]
    fn unknown_ref_is_never_seen() {
        let store = twin_store();
        store.insert_unit(OrgUnitRecord::new(5, 1, "Benguela").with_source_ref("BG")).unwrap();
        let store = VanishingRefs(store);

        let report = Differ::new(&store)
            .diff(&DiffQuery::new(REF, TARGET).with_fields(["name", "parent"]).showing_deleted_units())
            .unwrap();
        assert_eq!(report.diffs.len(), 3);
        let gone = &report.diffs[2];
        assert_eq!(gone.status, DiffStatus::NeverSeen);
        assert_eq!(gone.org_unit().unwrap().name, "Benguela");
        assert_eq!(gone.comparisons.len(), 2);
        assert!(gone
            .comparisons
            .iter()
            .all(|c| c.status == ComparisonStatus::Deleted && c.after.is_none()));
        // Matched units are unaffected by the existence check.
        assert!(report.diffs[..2].iter().all(|d| d.status == DiffStatus::Same));
    }

    #[test]
    fn filters_are_applied_per_side() {
        let store = twin_store();
        let mut query = DiffQuery::new(REF, TARGET).showing_deleted_units();
        query.filter_ref = PyramidFilter::new().with_top_org_unit(UnitId(12));
        let report = Differ::new(&store).diff(&query).unwrap();
        // Only Luanda on the reference side; Angola shows up as deleted.
        assert_eq!(report.diffs.len(), 2);
        assert_eq!(report.diffs[0].org_unit().unwrap().name, "Luanda");
        assert_eq!(report.diffs[1].status, DiffStatus::Deleted);
    }
}
