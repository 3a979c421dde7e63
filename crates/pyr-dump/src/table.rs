//! Colored terminal table of the units that changed.

use colored::{ColoredString, Colorize};

use pyr_diff::{Comparison, ComparisonStatus, Diff, DiffStatus, FieldType};

use crate::stats::DiffStats;
use crate::unit_label;

fn paint_unit(text: &str, status: DiffStatus) -> ColoredString {
    match status {
        DiffStatus::Same => text.normal(),
        DiffStatus::New => text.green(),
        DiffStatus::Modified => text.yellow(),
        DiffStatus::Deleted => text.red(),
        DiffStatus::NeverSeen => text.dimmed(),
    }
}

fn paint_field(text: &str, status: ComparisonStatus) -> ColoredString {
    match status {
        ComparisonStatus::Same => text.normal(),
        ComparisonStatus::New => text.green(),
        ComparisonStatus::Modified => text.yellow(),
        ComparisonStatus::Deleted => text.red(),
    }
}

fn change_cell(c: &Comparison) -> String {
    if c.status == ComparisonStatus::Same {
        return String::new();
    }
    let before = c.before.as_ref().map(|v| v.display()).unwrap_or_default();
    let after = c.after.as_ref().map(|v| v.display()).unwrap_or_default();
    format!("{before} → {after}")
}

struct Row<'a> {
    status: DiffStatus,
    cells: Vec<(String, Option<&'a Comparison>)>,
}

/// Render the non-`same` diffs as an aligned table.
///
/// Only fields with at least one `new` or `modified` comparison in `stats`
/// get a column. A one-line summary of unit statuses follows the table.
pub fn as_table(diffs: &[Diff], fields: &[FieldType], stats: &DiffStats) -> String {
    let active: Vec<&FieldType> = fields
        .iter()
        .filter(|f| stats.field(&f.key()).is_some_and(|s| s.has_changes()))
        .collect();

    let mut header = vec!["externalId".to_string(), "name".to_string(), "status".to_string()];
    header.extend(active.iter().map(|f| f.label()));

    let rows: Vec<Row<'_>> = diffs
        .iter()
        .filter(|d| d.status != DiffStatus::Same)
        .map(|d| {
            let mut cells = vec![
                (unit_label(d), None),
                (d.org_unit().map(|u| u.name.clone()).unwrap_or_default(), None),
                (d.status.to_string(), None),
            ];
            for field in &active {
                let c = d.comparison(&field.key());
                cells.push((c.map(change_cell).unwrap_or_default(), c));
            }
            Row { status: d.status, cells }
        })
        .collect();

    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (i, (text, _)) in row.cells.iter().enumerate() {
            widths[i] = widths[i].max(text.chars().count());
        }
    }

    let mut out = String::new();
    let head: Vec<String> = header
        .iter()
        .zip(&widths)
        .map(|(h, w)| format!("{h:<w$}").bold().to_string())
        .collect();
    out.push_str(head.join("  ").trim_end());
    out.push('\n');

    for row in &rows {
        let line: Vec<String> = row
            .cells
            .iter()
            .zip(&widths)
            .enumerate()
            .map(|(i, ((text, comparison), w))| {
                let padded = format!("{text:<w$}");
                match (i, comparison) {
                    (2, _) => paint_unit(&padded, row.status).to_string(),
                    (_, Some(c)) => paint_field(&padded, c.status).to_string(),
                    _ => padded,
                }
            })
            .collect();
        out.push_str(line.join("  ").trim_end());
        out.push('\n');
    }

    let summary: Vec<String> = stats
        .units
        .iter()
        .map(|(status, n)| format!("{n} {status}"))
        .collect();
    out.push_str(&format!("{} units: {}\n", stats.total, summary.join(", ")));
    out
}
