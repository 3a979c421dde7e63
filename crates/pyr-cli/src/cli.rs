use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "pyr",
    about = "Pyramid diff & sync: compare org unit hierarchies and propagate the changes",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compare two versions of a pyramid
    Diff(DiffArgs),
    /// Push the changes of the reference version to the remote reference system
    Export(ExportArgs),
    /// Apply the changes of the reference version to the target version
    Sync(SyncArgs),
}

/// The pyramid document and the two versions to compare.
#[derive(Args, Clone, Debug)]
pub struct PyramidArgs {
    /// Pyramid document (JSON)
    #[arg(long)]
    pub data: PathBuf,
    /// Version whose state is compared (the source of changes)
    #[arg(long = "ref")]
    pub version_ref: u64,
    /// Version compared against
    #[arg(long)]
    pub target: u64,
    /// Configuration file; `pyr.toml` in the working directory when present
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum DiffFormat {
    Table,
    Json,
    Compact,
    Csv,
    Stats,
}

#[derive(Args)]
pub struct DiffArgs {
    #[command(flatten)]
    pub pyramid: PyramidArgs,
    /// Fields to compare, comma separated
    #[arg(long, value_delimiter = ',')]
    pub fields: Vec<String>,
    /// Do not compare group set memberships
    #[arg(long)]
    pub ignore_groups: bool,
    /// Compare membership of every individual group
    #[arg(long)]
    pub compare_groups: bool,
    /// Also list units of the target missing from the reference
    #[arg(long)]
    pub show_deleted: bool,
    #[arg(long, default_value = "table")]
    pub format: DiffFormat,
}

#[derive(Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub pyramid: PyramidArgs,
    /// Run against an in-memory remote and leave the data file untouched
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct SyncArgs {
    #[command(flatten)]
    pub pyramid: PyramidArgs,
    /// Also write the compact diff as JSON
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_diff() {
        let cli = Cli::try_parse_from([
            "pyr", "diff", "--data", "p.json", "--ref", "2", "--target", "1",
            "--fields", "name,parent", "--show-deleted", "--format", "csv",
        ])
        .unwrap();
        if let Command::Diff(args) = cli.command {
            assert_eq!(args.pyramid.data, PathBuf::from("p.json"));
            assert_eq!(args.pyramid.version_ref, 2);
            assert_eq!(args.pyramid.target, 1);
            assert_eq!(args.fields, vec!["name", "parent"]);
            assert!(args.show_deleted);
            assert!(!args.ignore_groups);
            assert_eq!(args.format, DiffFormat::Csv);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn diff_defaults_to_table() {
        let cli = Cli::try_parse_from(["pyr", "diff", "--data", "p.json", "--ref", "2", "--target", "1"]).unwrap();
        if let Command::Diff(args) = cli.command {
            assert_eq!(args.format, DiffFormat::Table);
            assert!(args.fields.is_empty());
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_export_dry_run() {
        let cli = Cli::try_parse_from([
            "pyr", "export", "--data", "p.json", "--ref", "2", "--target", "1",
            "--config", "pyr.toml", "--dry-run",
        ])
        .unwrap();
        if let Command::Export(args) = cli.command {
            assert!(args.dry_run);
            assert_eq!(args.pyramid.config, Some(PathBuf::from("pyr.toml")));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_sync_out() {
        let cli = Cli::try_parse_from([
            "pyr", "sync", "--data", "p.json", "--ref", "2", "--target", "1", "--out", "diff.json",
        ])
        .unwrap();
        if let Command::Sync(args) = cli.command {
            assert_eq!(args.out, Some(PathBuf::from("diff.json")));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn versions_are_required() {
        assert!(Cli::try_parse_from(["pyr", "diff", "--data", "p.json", "--target", "1"]).is_err());
        assert!(Cli::try_parse_from(["pyr", "diff", "--data", "p.json", "--ref", "x", "--target", "1"]).is_err());
    }

    #[test]
    fn parse_verbose() {
        let cli = Cli::try_parse_from(["pyr", "--verbose", "sync", "--data", "p.json", "--ref", "2", "--target", "1"]).unwrap();
        assert!(cli.verbose);
    }
}
