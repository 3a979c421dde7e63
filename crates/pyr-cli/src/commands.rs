use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use colored::Colorize;
use tracing::{info, warn};

use pyr_diff::{field_types, Diagnostic, DiffQuery, DiffReport, DiffStatus, Differ};
use pyr_dump::{as_csv, as_json, as_table, stats, to_csv_string};
use pyr_export::{
    ExportConfig, ExportReport, Exporter, HttpRemoteClient, InMemoryReferenceSystem, RemoteClient,
};
use pyr_store::{InMemoryPyramidStore, PyramidDocument, PyramidWriter};
use pyr_sync::{compact_diffs, diffs_to_json, Synchronizer};
use pyr_types::{ProgressSink, UnitId, VersionId};

use crate::cli::*;
use crate::config::Config;
use crate::progress::{cancel_on_ctrl_c, LogProgress};

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Diff(args) => cmd_diff(args),
        Command::Export(args) => cmd_export(args).await,
        Command::Sync(args) => cmd_sync(args),
    }
}

fn load_store(path: &Path) -> anyhow::Result<InMemoryPyramidStore> {
    let doc = PyramidDocument::read_from(path)
        .with_context(|| format!("reading pyramid {}", path.display()))?;
    Ok(InMemoryPyramidStore::from_document(doc)?)
}

fn save_store(store: &InMemoryPyramidStore, path: &Path) -> anyhow::Result<()> {
    store
        .to_document()
        .write_to(path)
        .with_context(|| format!("writing pyramid {}", path.display()))
}

fn base_query(args: &PyramidArgs, fields: &[String]) -> DiffQuery {
    DiffQuery::new(VersionId(args.version_ref), VersionId(args.target)).with_fields(fields.iter().cloned())
}

fn print_diagnostics(report: &DiffReport) {
    for diagnostic in &report.diagnostics {
        match diagnostic {
            Diagnostic::DuplicateSourceRef { version, source_ref, unit_ids } => {
                let ids: Vec<String> = unit_ids.iter().map(|id| id.to_string()).collect();
                eprintln!(
                    "{} version {version}: source ref {} shared by units {}",
                    "warning:".yellow().bold(),
                    source_ref.yellow(),
                    ids.join(", ")
                );
            }
        }
    }
}

fn cmd_diff(args: DiffArgs) -> anyhow::Result<()> {
    let config = Config::load_or_default(args.pyramid.config.as_deref())?;
    let store = load_store(&args.pyramid.data)?;

    let fields = if args.fields.is_empty() { config.diff.fields.clone() } else { args.fields.clone() };
    let mut query = base_query(&args.pyramid, &fields);
    query.ignore_groups = args.ignore_groups;
    query.compare_groups = args.compare_groups;
    query.show_deleted_units = args.show_deleted;

    let report = Differ::new(&store).diff(&query)?;
    print_diagnostics(&report);
    println!("{}", render(&report, args.format)?);
    Ok(())
}

fn render(report: &DiffReport, format: DiffFormat) -> anyhow::Result<String> {
    let fields = field_types(&report.field_names)?;
    Ok(match format {
        DiffFormat::Table => as_table(&report.diffs, &fields, &stats(&report.diffs)),
        DiffFormat::Json => serde_json::to_string_pretty(&as_json(&report.diffs)?)?,
        DiffFormat::Compact => serde_json::to_string_pretty(&diffs_to_json(&report.diffs)?)?,
        DiffFormat::Csv => to_csv_string(&as_csv(&report.diffs, &fields)),
        DiffFormat::Stats => serde_json::to_string_pretty(&stats(&report.diffs))?,
    })
}

async fn cmd_export(args: ExportArgs) -> anyhow::Result<()> {
    let config = Config::load_or_default(args.pyramid.config.as_deref())?;
    let store = load_store(&args.pyramid.data)?;
    let mut progress = LogProgress::new(cancel_on_ctrl_c());

    let report = if args.dry_run {
        info!("dry run: exporting to an in-memory reference system");
        let remote = InMemoryReferenceSystem::new();
        export_with(&remote, &store, &args.pyramid, &config, &mut progress).await?
    } else {
        let remote = HttpRemoteClient::new(config.remote.base_url.clone())
            .with_basic_auth(config.remote.username.clone(), config.remote_password()?);
        let result = export_with(&remote, &store, &args.pyramid, &config, &mut progress).await;
        // Generated refs are kept even when a later phase failed, so the
        // next run matches the units it already created.
        save_store(&store, &args.pyramid.data)?;
        result?
    };

    println!(
        "{} Export {}: {} created, {} updated, {} groups updated",
        "✓".green().bold(),
        if args.dry_run { "(dry run) done" } else { "done" },
        report.created.to_string().bold(),
        report.updated.to_string().bold(),
        report.groups_updated.to_string().bold()
    );
    for assigned in &report.assigned_refs {
        println!("  {} unit {} → {}", "ref:".cyan(), assigned.unit, assigned.source_ref.yellow());
    }
    Ok(())
}

/// Diff the pyramids and push the result through `remote`. Refs generated
/// for new units are written into `store`, whether or not the export
/// succeeds.
async fn export_with(
    remote: &dyn RemoteClient,
    store: &InMemoryPyramidStore,
    args: &PyramidArgs,
    config: &Config,
    progress: &mut dyn ProgressSink,
) -> anyhow::Result<ExportReport> {
    let report = Differ::new(store).diff(&base_query(args, &config.diff.fields))?;
    print_diagnostics(&report);
    let fields = field_types(&report.field_names)?;
    let mut diffs = report.diffs;

    let without_ref: HashSet<UnitId> = diffs
        .iter()
        .filter(|d| d.status == DiffStatus::New)
        .filter_map(|d| d.org_unit_ref.as_ref())
        .filter(|u| u.source_ref().is_none())
        .map(|u| u.id)
        .collect();

    let exporter = Exporter::new(remote).with_config(ExportConfig::from(&config.export));
    let result = exporter.export(&mut diffs, &fields, progress).await;

    for unit in diffs.iter().filter_map(|d| d.org_unit_ref.as_ref()) {
        if let (true, Some(source_ref)) = (without_ref.contains(&unit.id), unit.source_ref()) {
            store.set_source_ref(unit.id, source_ref)?;
        }
    }
    if let Err(e) = &result {
        warn!(error = %e, "export stopped");
    }
    Ok(result?)
}

fn cmd_sync(args: SyncArgs) -> anyhow::Result<()> {
    let config = Config::load_or_default(args.pyramid.config.as_deref())?;
    let store = load_store(&args.pyramid.data)?;

    let query = base_query(&args.pyramid, &config.diff.fields)
        .ignoring_groups()
        .comparing_groups();
    let report = Differ::new(&store).diff(&query)?;
    print_diagnostics(&report);
    let compact = compact_diffs(&report.diffs)?;

    if let Some(out) = &args.out {
        let json = serde_json::to_string_pretty(&compact)?;
        std::fs::write(out, json).with_context(|| format!("writing {}", out.display()))?;
        info!(path = %out.display(), diffs = compact.len(), "compact diff written");
    }

    let mut progress = LogProgress::new(cancel_on_ctrl_c());
    let result = Synchronizer::new(&store).synchronize(&compact, VersionId(args.pyramid.target), &mut progress);
    // Whatever was applied before a failure is kept.
    save_store(&store, &args.pyramid.data)?;
    let sync = result?;

    println!(
        "{} Synchronized version {} into {}: {} created, {} updated, {} skipped",
        "✓".green().bold(),
        args.pyramid.version_ref.to_string().yellow(),
        args.pyramid.target.to_string().yellow(),
        sync.created.to_string().bold(),
        sync.updated.to_string().bold(),
        sync.skipped
    );
    if sync.refs_assigned > 0 {
        println!("  {} source refs generated for new units", sync.refs_assigned);
    }
    if sync.groups_created + sync.memberships_added + sync.memberships_removed > 0 {
        println!(
            "  groups: {} created, {} memberships added, {} removed",
            sync.groups_created, sync.memberships_added, sync.memberships_removed
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyr_store::{OrgUnitRecord, PyramidStore};
    use pyr_types::RecordingProgress;
    use std::path::PathBuf;

    const TARGET: VersionId = VersionId(1);
    const REF: VersionId = VersionId(2);

    fn write_pyramid(dir: &Path) -> PathBuf {
        let store = InMemoryPyramidStore::new();
        store.insert_unit(OrgUnitRecord::new(1, 1, "Angola").with_source_ref("AO")).unwrap();
        store.insert_unit(OrgUnitRecord::new(11, 2, "Angola new").with_source_ref("AO")).unwrap();
        store
            .insert_unit(OrgUnitRecord::new(12, 2, "Luanda").with_source_ref("LU").with_parent(11))
            .unwrap();
        store.insert_unit(OrgUnitRecord::new(13, 2, "Viana").with_parent(12)).unwrap();
        let path = dir.join("pyramid.json");
        save_store(&store, &path).unwrap();
        path
    }

    fn pyramid_args(data: PathBuf) -> PyramidArgs {
        PyramidArgs { data, version_ref: 2, target: 1, config: None }
    }

    fn names(store: &InMemoryPyramidStore, version: VersionId) -> Vec<String> {
        let mut names: Vec<String> = store
            .load_pyramid(version, &Default::default())
            .unwrap()
            .into_iter()
            .map(|u| u.name)
            .collect();
        names.sort();
        names
    }

    #[test]
    fn render_every_format() {
        let dir = tempfile::tempdir().unwrap();
        let store = load_store(&write_pyramid(dir.path())).unwrap();
        let report = Differ::new(&store)
            .diff(&DiffQuery::new(REF, TARGET).with_fields(["name", "parent"]))
            .unwrap();

        colored::control::set_override(false);
        let table = render(&report, DiffFormat::Table).unwrap();
        assert!(table.contains("Angola → Angola new"));

        let json: serde_json::Value = serde_json::from_str(&render(&report, DiffFormat::Json).unwrap()).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 3);

        let csv = render(&report, DiffFormat::Csv).unwrap();
        assert!(csv.starts_with("externalId,diff status,type"));

        let compact: serde_json::Value =
            serde_json::from_str(&render(&report, DiffFormat::Compact).unwrap()).unwrap();
        assert!(compact.as_array().unwrap().iter().any(|d| d["status"] == "modified"));

        let stats: serde_json::Value = serde_json::from_str(&render(&report, DiffFormat::Stats).unwrap()).unwrap();
        assert_eq!(stats["total"], 3);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let args = DiffArgs {
            pyramid: pyramid_args(write_pyramid(dir.path())),
            fields: vec!["population".into()],
            ignore_groups: false,
            compare_groups: false,
            show_deleted: false,
            format: DiffFormat::Table,
        };
        assert!(cmd_diff(args).is_err());
    }

    #[tokio::test]
    async fn sync_updates_the_data_file() {
        let dir = tempfile::tempdir().unwrap();
        let data = write_pyramid(dir.path());
        let out = dir.path().join("diff.json");

        cmd_sync(SyncArgs { pyramid: pyramid_args(data.clone()), out: Some(out.clone()) }).unwrap();

        let store = load_store(&data).unwrap();
        assert_eq!(names(&store, TARGET), vec!["Angola new", "Luanda", "Viana"]);
        // Viana had no ref; the generated one is saved on both copies.
        let viana_ref = store.record(UnitId(13)).unwrap().source_ref.unwrap();
        assert!(store.find_by_source_ref(TARGET, &viana_ref).unwrap().is_some());
        assert_eq!(names(&store, REF).len(), 3);

        let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(out).unwrap()).unwrap();
        assert_eq!(written.as_array().unwrap().len(), 3);

        // Nothing left to apply.
        let report = Differ::new(&store)
            .diff(&DiffQuery::new(REF, TARGET).with_fields(["name"]).ignoring_groups())
            .unwrap();
        assert!(report.diffs.iter().all(|d| d.status == DiffStatus::Same));
    }

    #[tokio::test]
    async fn export_persists_generated_refs() {
        let dir = tempfile::tempdir().unwrap();
        let data = write_pyramid(dir.path());
        let store = load_store(&data).unwrap();
        let remote = InMemoryReferenceSystem::new().with_org_unit(serde_json::json!({
            "id": "AO", "name": "Angola", "shortName": "Angola", "openingDate": "1960-08-03T00:00:00.000"
        }));
        let mut progress = RecordingProgress::new();

        let report = export_with(&remote, &store, &pyramid_args(data), &Config::default(), &mut progress)
            .await
            .unwrap();
        assert_eq!(report.created, 2);
        assert_eq!(report.assigned_refs.len(), 1);
        assert_eq!(report.assigned_refs[0].unit, UnitId(13));

        let viana = store.record(UnitId(13)).unwrap();
        assert_eq!(viana.source_ref.as_deref(), Some(report.assigned_refs[0].source_ref.as_str()));
        assert!(remote.org_unit(&report.assigned_refs[0].source_ref).is_some());
        assert!(progress.messages().contains(&"group phase done"));
    }

    #[tokio::test]
    async fn dry_run_leaves_the_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let data = write_pyramid(dir.path());
        let before = std::fs::read_to_string(&data).unwrap();

        cmd_export(ExportArgs { pyramid: pyramid_args(data.clone()), dry_run: true }).await.unwrap();

        assert_eq!(std::fs::read_to_string(&data).unwrap(), before);
    }
}
