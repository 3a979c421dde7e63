//! Applies compact diffs to a target version of the local store.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde_json::Value;
use tracing::{debug, info, warn};

use pyr_diff::{sort_by_path, ComparisonStatus, DiffStatus, FieldType};
use pyr_store::{NewOrgUnit, OrgUnitPatch, PyramidWriter};
use pyr_types::{generate_uid, Geometry, ProgressSink, UnitId, VersionId};

use crate::compact::{CompactComparison, CompactDiff, CompactUnit};
use crate::error::{SyncError, SyncResult};

/// Parse an ISO `YYYY-MM-DD` date.
pub fn parse_date_str(s: &str) -> SyncResult<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|source| SyncError::InvalidDate {
        value: s.to_string(),
        source,
    })
}

/// Whether any `group:` comparison gained or lost a membership.
pub fn has_group_changes(comparisons: &[CompactComparison]) -> bool {
    comparisons.iter().any(|c| {
        c.field.starts_with("group:")
            && matches!(c.status, ComparisonStatus::New | ComparisonStatus::Deleted)
    })
}

/// What a synchronization run did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Reference units that had no `source_ref` and got a generated one.
    pub refs_assigned: usize,
    pub groups_created: usize,
    pub memberships_added: usize,
    pub memberships_removed: usize,
}

/// Writes diffs into a target version.
pub struct Synchronizer<'a> {
    store: &'a dyn PyramidWriter,
}

fn text(field: &str, value: &Value) -> SyncResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        other => Err(SyncError::InvalidValue {
            field: field.to_string(),
            reason: format!("expected a string, got {other}"),
        }),
    }
}

fn date(field: &str, value: &Value) -> SyncResult<Option<NaiveDate>> {
    text(field, value)?.map(|s| parse_date_str(&s)).transpose()
}

fn geometry(field: &str, value: &Value) -> SyncResult<Option<Geometry>> {
    if value.is_null() {
        return Ok(None);
    }
    serde_json::from_value(value.clone())
        .map(Some)
        .map_err(|e| SyncError::InvalidValue {
            field: field.to_string(),
            reason: e.to_string(),
        })
}

fn unit_label(unit: &CompactUnit) -> String {
    unit.source_ref()
        .map(str::to_string)
        .unwrap_or_else(|| unit.id.to_string())
}

impl<'a> Synchronizer<'a> {
    pub fn new(store: &'a dyn PyramidWriter) -> Self {
        Self { store }
    }

    /// Apply `diffs` to `target_version`.
    ///
    /// Diffs are processed in path order so parents exist before their
    /// children are created. `same`, `deleted` and `never_seen` diffs are
    /// skipped. Progress is reported after every diff.
    ///
    /// A new reference unit without a `source_ref` gets a generated one,
    /// written to the reference unit before the target copy is created, so
    /// the next diff matches the two.
    pub fn synchronize(
        &self,
        diffs: &[CompactDiff],
        target_version: VersionId,
        progress: &mut dyn ProgressSink,
    ) -> SyncResult<SyncReport> {
        let mut ordered: Vec<&CompactDiff> = diffs.iter().collect();
        sort_by_path(&mut ordered);
        let total = ordered.len() as u64;
        info!(diffs = ordered.len(), %target_version, "synchronizing pyramid");

        let mut report = SyncReport::default();
        // Reference unit id -> target unit id, for parents without a ref.
        let mut placed: HashMap<UnitId, UnitId> = HashMap::new();
        for (i, diff) in ordered.into_iter().enumerate() {
            let label = match diff.status {
                DiffStatus::New => self.create(diff, target_version, &mut placed, &mut report)?,
                DiffStatus::Modified => self.update(diff, target_version, &mut report)?,
                DiffStatus::Same | DiffStatus::Deleted | DiffStatus::NeverSeen => {
                    report.skipped += 1;
                    diff.org_unit.as_ref().map(unit_label).unwrap_or_default()
                }
            };
            progress.report(&format!("synchronized {label}"), Some(i as u64 + 1), Some(total))?;
        }
        info!(
            created = report.created,
            updated = report.updated,
            skipped = report.skipped,
            "synchronization complete"
        );
        Ok(report)
    }

    fn resolve_parent(
        &self,
        unit: &CompactUnit,
        parent_ref: &str,
        target_version: VersionId,
    ) -> SyncResult<UnitId> {
        self.store
            .find_by_source_ref(target_version, parent_ref)?
            .map(|p| p.id)
            .ok_or_else(|| SyncError::MissingParent {
                unit: unit_label(unit),
                parent: parent_ref.to_string(),
            })
    }

    /// Target id of the parent of a reference unit about to be created.
    fn new_unit_parent(
        &self,
        unit: &CompactUnit,
        target_version: VersionId,
        placed: &HashMap<UnitId, UnitId>,
    ) -> SyncResult<Option<UnitId>> {
        let parent_ref = unit.parent_source_ref.as_deref().filter(|r| !r.trim().is_empty());
        match (parent_ref, unit.parent_id) {
            (Some(r), _) => self.resolve_parent(unit, r, target_version).map(Some),
            (None, Some(parent)) => placed.get(&parent).copied().map(Some).ok_or_else(|| {
                SyncError::MissingParent {
                    unit: unit_label(unit),
                    parent: parent.to_string(),
                }
            }),
            (None, None) => Ok(None),
        }
    }

    fn create(
        &self,
        diff: &CompactDiff,
        target_version: VersionId,
        placed: &mut HashMap<UnitId, UnitId>,
        report: &mut SyncReport,
    ) -> SyncResult<String> {
        let unit = diff
            .org_unit_ref
            .as_ref()
            .ok_or_else(|| SyncError::MissingUnit(diff.status.to_string()))?;

        let existing = match unit.source_ref() {
            Some(r) => self.store.find_by_source_ref(target_version, r)?,
            None => None,
        };
        let (id, label) = match existing {
            Some(found) => {
                debug!(source_ref = %unit_label(unit), "unit already present in target, not creating");
                (found.id, unit_label(unit))
            }
            None => {
                let parent_id = self.new_unit_parent(unit, target_version, placed)?;
                let source_ref = match unit.source_ref() {
                    Some(r) => r.to_string(),
                    None => {
                        let uid = generate_uid();
                        self.store.set_source_ref(unit.id, &uid)?;
                        debug!(unit = %unit.id, source_ref = %uid, "assigned source ref");
                        report.refs_assigned += 1;
                        uid
                    }
                };
                let id = self.store.create_org_unit(NewOrgUnit {
                    version: target_version,
                    source_ref: Some(source_ref.clone()),
                    name: unit.name.clone(),
                    org_unit_type_id: unit.org_unit_type_id,
                    validation_status: unit.validation_status,
                    parent_id,
                    location: unit.location.clone(),
                    geom: unit.geom.clone(),
                    opening_date: unit.opening_date,
                    closed_date: unit.closed_date,
                })?;
                report.created += 1;
                (id, source_ref)
            }
        };
        placed.insert(unit.id, id);

        if has_group_changes(&diff.comparisons) {
            self.reconcile_groups(id, &diff.comparisons, target_version, report)?;
        }
        Ok(label)
    }

    fn update(
        &self,
        diff: &CompactDiff,
        target_version: VersionId,
        report: &mut SyncReport,
    ) -> SyncResult<String> {
        let target = diff
            .org_unit_target
            .as_ref()
            .ok_or_else(|| SyncError::MissingUnit(diff.status.to_string()))?;
        let label = diff.org_unit.as_ref().map(unit_label).unwrap_or_else(|| unit_label(target));

        let mut patch = OrgUnitPatch::default();
        for c in diff.comparisons.iter().filter(|c| c.status != ComparisonStatus::Same) {
            match c.field.as_str() {
                "name" => patch.name = text(&c.field, &c.after)?,
                "geometry" => match geometry(&c.field, &c.after)? {
                    Some(g @ Geometry::Point(_)) => patch.location = Some(Some(g)),
                    // The location takes precedence over the shape when read.
                    Some(g) => {
                        patch.location = Some(None);
                        patch.geom = Some(Some(g));
                    }
                    None => {
                        patch.location = Some(None);
                        patch.geom = Some(None);
                    }
                },
                "parent" => {
                    let parent = match text(&c.field, &c.after)? {
                        Some(r) => Some(self.resolve_parent(target, &r, target_version)?),
                        None => None,
                    };
                    patch.parent_id = Some(parent);
                }
                "opening_date" => patch.opening_date = Some(date(&c.field, &c.after)?),
                "closed_date" => patch.closed_date = Some(date(&c.field, &c.after)?),
                other => {
                    if !other.starts_with("group:") {
                        debug!(field = other, unit = %label, "field not synchronized");
                    }
                }
            }
        }

        if !patch.is_empty() {
            self.store.update_org_unit(target.id, &patch)?;
            report.updated += 1;
        }
        if has_group_changes(&diff.comparisons) {
            self.reconcile_groups(target.id, &diff.comparisons, target_version, report)?;
        }
        Ok(label)
    }

    fn reconcile_groups(
        &self,
        unit: UnitId,
        comparisons: &[CompactComparison],
        target_version: VersionId,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        for c in comparisons.iter().filter(|c| c.field.starts_with("group:")) {
            let Ok(FieldType::Group { group_ref, name }) = FieldType::parse(&c.field) else {
                warn!(field = %c.field, "malformed group field, skipping");
                continue;
            };
            let existing = self.store.find_group(target_version, &group_ref)?;
            match c.status {
                ComparisonStatus::New => {
                    let group = match existing {
                        Some(g) => g.id,
                        None => {
                            report.groups_created += 1;
                            self.store.create_group(target_version, &group_ref, &name)?
                        }
                    };
                    if self.store.add_to_group(unit, group)? {
                        report.memberships_added += 1;
                    }
                }
                ComparisonStatus::Deleted => {
                    if let Some(g) = existing {
                        if self.store.remove_from_group(unit, g.id)? {
                            report.memberships_removed += 1;
                        }
                    }
                }
                ComparisonStatus::Same | ComparisonStatus::Modified => {}
            }
        }
        Ok(())
    }
}
