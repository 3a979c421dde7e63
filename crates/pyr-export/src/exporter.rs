//! The three-phase export job.

use std::collections::{BTreeSet, HashMap};

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use pyr_diff::{compare, sort_by_path, Diff, DiffStatus, FieldType, FieldValue};
use pyr_types::{generate_uid, ProgressSink, UnitId};

use crate::client::{RemoteClient, RemoteResponse};
use crate::error::{ExportError, ExportResult};
use crate::payload::{
    create_payload, group_payload, is_soft_error, member_ids, merge_changes,
};

/// Placeholder opening date sent with created units.
pub const DEFAULT_OPENING_DATE: &str = "1960-08-03T00:00:00.000";

/// Fields whose changes are pushed by the update phase.
const UPDATABLE_FIELDS: [&str; 3] = ["name", "parent", "geometry"];

/// Tunables of an export run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportConfig {
    /// Units per `metadata` import. Keeps requests small.
    pub update_batch_size: usize,
    pub opening_date: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            update_batch_size: 4,
            opening_date: DEFAULT_OPENING_DATE.to_string(),
        }
    }
}

/// A `source_ref` generated for a unit that had none.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssignedRef {
    pub unit: UnitId,
    pub source_ref: String,
}

/// What an export run did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExportReport {
    pub created: usize,
    pub updated: usize,
    pub groups_updated: usize,
    /// Refs generated during the create phase. Callers persist these so a
    /// rerun reuses them.
    pub assigned_refs: Vec<AssignedRef>,
}

/// Pushes diffs to a [`RemoteClient`].
pub struct Exporter<'a> {
    client: &'a dyn RemoteClient,
    config: ExportConfig,
}

impl<'a> Exporter<'a> {
    pub fn new(client: &'a dyn RemoteClient) -> Self {
        Self {
            client,
            config: ExportConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ExportConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Run the create, update and group phases in order.
    ///
    /// Reference units of `new` diffs that lack a `source_ref` get one
    /// assigned in place, so `diffs` is mutated.
    pub async fn export(
        &self,
        diffs: &mut [Diff],
        fields: &[FieldType],
        progress: &mut dyn ProgressSink,
    ) -> ExportResult<ExportReport> {
        let mut report = ExportReport::default();

        report.assigned_refs = assign_missing_refs(diffs);
        report.created = self.create_missing(diffs, progress).await?;
        progress.report("create phase done", Some(report.created as u64), None)?;

        report.updated = self.update_existing(diffs, progress).await?;
        progress.report("update phase done", Some(report.updated as u64), None)?;

        report.groups_updated = self.update_groups(diffs, fields, progress).await?;
        progress.report("group phase done", Some(report.groups_updated as u64), None)?;

        info!(
            created = report.created,
            updated = report.updated,
            groups_updated = report.groups_updated,
            assigned_refs = report.assigned_refs.len(),
            "export complete"
        );
        Ok(report)
    }

    async fn create_missing(
        &self,
        diffs: &[Diff],
        progress: &mut dyn ProgressSink,
    ) -> ExportResult<usize> {
        let mut to_create: Vec<&Diff> = diffs.iter().filter(|d| d.status == DiffStatus::New).collect();
        sort_by_path(&mut to_create);
        let total = to_create.len() as u64;
        info!(count = to_create.len(), "creating missing org units");

        let mut created = 0;
        for diff in to_create {
            let Some(unit) = diff.org_unit_ref.as_ref() else {
                continue;
            };
            let Some(id) = unit.source_ref() else {
                continue;
            };
            let payload = create_payload(
                unit,
                id,
                unit.parent_source_ref(),
                &self.config.opening_date,
            );
            debug!(id, name = %unit.name, "creating org unit");
            let response = self
                .client
                .post("organisationUnits", &payload)
                .await
                .map_err(|e| ExportError::request(format!("creating org unit {id} failed"), payload.clone(), e))?;
            check_soft_error(&response, format!("creating org unit {id} failed"), &payload)?;
            created += 1;
            progress.report(&format!("created {}", unit.name), Some(created), Some(total))?;
        }
        Ok(created as usize)
    }

    async fn update_existing(
        &self,
        diffs: &[Diff],
        progress: &mut dyn ProgressSink,
    ) -> ExportResult<usize> {
        let mut to_update: Vec<&Diff> = diffs
            .iter()
            .filter(|d| d.status == DiffStatus::Modified && d.changed_any(&UPDATABLE_FIELDS))
            .filter(|d| d.org_unit_ref.as_ref().and_then(|u| u.source_ref()).is_some())
            .collect();
        sort_by_path(&mut to_update);
        let batch_size = self.config.update_batch_size.max(1);
        let batches = to_update.len().div_ceil(batch_size) as u64;
        info!(count = to_update.len(), batch_size, "updating existing org units");

        let mut updated = 0;
        for (n, batch) in to_update.chunks(batch_size).enumerate() {
            let ids: Vec<&str> = batch
                .iter()
                .filter_map(|d| d.org_unit_ref.as_ref().and_then(|u| u.source_ref()))
                .collect();
            let params = [
                ("filter", format!("id:in:[{}]", ids.join(","))),
                ("fields", ":all".to_string()),
                ("paging", "false".to_string()),
            ];
            let fetched = self
                .client
                .get("organisationUnits", &params)
                .await
                .map_err(|e| ExportError::request("fetching org units failed", json!({ "ids": ids }), e))?;
            let by_id: HashMap<&str, &Value> = fetched["organisationUnits"]
                .as_array()
                .map(|units| {
                    units
                        .iter()
                        .filter_map(|u| u["id"].as_str().map(|id| (id, u)))
                        .collect()
                })
                .unwrap_or_default();

            let mut records = Vec::with_capacity(batch.len());
            for (diff, id) in batch.iter().zip(&ids) {
                match by_id.get(id) {
                    Some(record) => records.push(merge_changes(record, &diff.comparisons)),
                    None => warn!(id, "org unit missing on remote, skipping update"),
                }
            }
            if !records.is_empty() {
                let count = records.len();
                let payload = json!({ "organisationUnits": records });
                debug!(batch = n + 1, count, "posting metadata batch");
                let response = self
                    .client
                    .post("metadata", &payload)
                    .await
                    .map_err(|e| ExportError::request("updating org units failed", payload.clone(), e))?;
                check_soft_error(&response, "updating org units failed".into(), &payload)?;
                updated += count;
            }
            progress.report("updated batch", Some(n as u64 + 1), Some(batches))?;
        }
        Ok(updated)
    }

    async fn update_groups(
        &self,
        diffs: &[Diff],
        fields: &[FieldType],
        progress: &mut dyn ProgressSink,
    ) -> ExportResult<usize> {
        let mut groups_updated = 0;
        for field in fields {
            let FieldType::GroupSet { set_ref, name } = field else {
                continue;
            };
            let key = field.key();
            let changed = diffs.iter().any(|d| {
                d.comparison(&key)
                    .is_some_and(|c| c.status.is_new_or_modified())
            });
            if !changed {
                continue;
            }
            info!(group_set = %name, set_ref, "updating group memberships");

            // Desired members: unit ref -> group ids from the reference side.
            let desired: Vec<(&str, BTreeSet<&str>)> = diffs
                .iter()
                .filter_map(|d| {
                    let unit_ref = d.org_unit_ref.as_ref()?.source_ref()?;
                    let c = d.comparison(&key)?;
                    let groups = c
                        .after
                        .as_ref()
                        .and_then(FieldValue::as_groups)
                        .unwrap_or_default()
                        .iter()
                        .filter_map(|g| g.id.as_deref())
                        .collect();
                    Some((unit_ref, groups))
                })
                .collect();

            let params = [
                ("filter", format!("groupSets.id:eq:{set_ref}")),
                ("fields", "id,name,organisationUnits".to_string()),
                ("paging", "false".to_string()),
            ];
            let body = self
                .client
                .get("organisationUnitGroups", &params)
                .await
                .map_err(|e| {
                    ExportError::request("fetching groups failed", json!({ "groupSet": set_ref }), e)
                })?;
            let remote_groups = body["organisationUnitGroups"].as_array().cloned().unwrap_or_default();

            for group in &remote_groups {
                let Some(group_id) = group["id"].as_str() else {
                    continue;
                };
                let current = member_ids(group);
                let mut members = current.clone();
                for (unit_ref, groups) in &desired {
                    let wanted = groups.contains(group_id);
                    let present = members.iter().any(|m| m == unit_ref);
                    if wanted && !present {
                        members.push(unit_ref.to_string());
                    } else if !wanted && present {
                        members.retain(|m| m != unit_ref);
                    }
                }
                if members == current {
                    continue;
                }
                let payload = group_payload(group, &members);
                debug!(group_id, before = current.len(), after = members.len(), "updating group");
                let path = format!("organisationUnitGroups/{group_id}");
                let response = self
                    .client
                    .put(&path, &payload)
                    .await
                    .map_err(|e| {
                        ExportError::request(format!("updating group {group_id} failed"), payload.clone(), e)
                    })?;
                check_soft_error(&response, format!("updating group {group_id} failed"), &payload)?;
                groups_updated += 1;
            }
            progress.report(&format!("updated groups of {name}"), None, None)?;
        }
        Ok(groups_updated)
    }
}

fn check_soft_error(response: &RemoteResponse, message: String, payload: &Value) -> ExportResult<()> {
    if is_soft_error(&response.body) {
        return Err(ExportError::soft(message, payload.clone(), &response.body));
    }
    Ok(())
}

/// Give every `new` reference unit without a `source_ref` a generated one.
///
/// Existing refs are kept, so running this twice assigns nothing new.
/// Children whose parent just received a ref have their parent link updated.
fn assign_missing_refs(diffs: &mut [Diff]) -> Vec<AssignedRef> {
    let mut assigned = Vec::new();
    for diff in diffs.iter_mut().filter(|d| d.status == DiffStatus::New) {
        let Some(unit) = diff.org_unit_ref.as_mut() else {
            continue;
        };
        if unit.source_ref().is_none() {
            let uid = generate_uid();
            debug!(unit = %unit.id, uid, "assigned source ref");
            unit.source_ref = Some(uid.clone());
            assigned.push(AssignedRef {
                unit: unit.id,
                source_ref: uid,
            });
        }
    }
    if assigned.is_empty() {
        return assigned;
    }

    let by_unit: HashMap<UnitId, &str> = assigned
        .iter()
        .map(|a| (a.unit, a.source_ref.as_str()))
        .collect();
    for diff in diffs.iter_mut() {
        let Some(parent) = diff.org_unit_ref.as_mut().and_then(|u| u.parent.as_mut()) else {
            continue;
        };
        let blank = parent.source_ref.as_deref().map_or(true, |r| r.trim().is_empty());
        if let (true, Some(uid)) = (blank, by_unit.get(&parent.id)) {
            parent.source_ref = Some(uid.to_string());
            for c in diff.comparisons.iter_mut().filter(|c| c.field == "parent") {
                *c = compare(
                    &FieldType::Parent,
                    c.before.take(),
                    Some(FieldValue::Text(uid.to_string())),
                );
            }
        }
    }
    assigned
}
