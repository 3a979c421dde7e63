//! CSV rendering: one row per diff, three columns per field.

use pyr_diff::{Diff, FieldType, FieldValue};

use crate::unit_label;

fn cell(value: Option<&FieldValue>) -> String {
    value.map(FieldValue::display).unwrap_or_default()
}

/// Header plus one row per diff.
///
/// Columns are `externalId`, `diff status`, `type`, then for each field its
/// label, `<label> before` and `<label> after`. Group set fields are labelled
/// by their human name.
pub fn as_csv(diffs: &[Diff], fields: &[FieldType]) -> Vec<Vec<String>> {
    let mut header = vec![
        "externalId".to_string(),
        "diff status".to_string(),
        "type".to_string(),
    ];
    for field in fields {
        let label = field.label();
        header.push(label.clone());
        header.push(format!("{label} before"));
        header.push(format!("{label} after"));
    }

    let mut rows = Vec::with_capacity(diffs.len() + 1);
    rows.push(header);
    for diff in diffs {
        let mut row = vec![
            unit_label(diff),
            diff.status.to_string(),
            diff.org_unit().map(|u| u.type_name().to_string()).unwrap_or_default(),
        ];
        for field in fields {
            match diff.comparison(&field.key()) {
                Some(c) => {
                    row.push(c.status.to_string());
                    row.push(cell(c.before.as_ref()));
                    row.push(cell(c.after.as_ref()));
                }
                None => row.extend([String::new(), String::new(), String::new()]),
            }
        }
        rows.push(row);
    }
    rows
}

fn quote(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Serialize rows with RFC 4180 quoting and CRLF line endings.
pub fn to_csv_string(rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    for row in rows {
        let line: Vec<String> = row.iter().map(|v| quote(v)).collect();
        out.push_str(&line.join(","));
        out.push_str("\r\n");
    }
    out
}
