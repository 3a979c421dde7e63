//! Pure construction of remote payloads.
//!
//! Every function returns a fresh value; fetched records are never modified
//! in place.

use serde_json::{json, Map, Value};

use pyr_diff::{Comparison, ComparisonStatus, FieldValue};
use pyr_types::{Geometry, OrgUnitSnapshot};

/// Maximum length of the remote `shortName`.
pub const SHORT_NAME_LENGTH: usize = 50;

/// Geometry members of a unit payload: GeoJSON cut to two dimensions, plus
/// the legacy `coordinates` (JSON text) and `featureType` members.
///
/// Truncation is exact for points and single polygons. Multi-part shapes go
/// through the same path and may lose information on older remotes.
pub fn geometry_fields(geometry: &Geometry) -> Map<String, Value> {
    let flat = geometry.truncated_2d();
    let coordinates = flat.coordinates_json();
    let mut fields = Map::new();
    fields.insert(
        "geometry".into(),
        json!({"type": flat.kind(), "coordinates": coordinates}),
    );
    fields.insert("coordinates".into(), Value::String(coordinates.to_string()));
    fields.insert("featureType".into(), Value::String(flat.feature_type().into()));
    fields
}

/// Geometry used for a unit: location first, then the full and simplified
/// shapes.
pub fn unit_geometry(unit: &OrgUnitSnapshot) -> Option<&Geometry> {
    unit.location
        .as_ref()
        .or(unit.geom.as_ref())
        .or(unit.simplified_geom.as_ref())
}

/// Minimal creation payload for a new unit.
pub fn create_payload(
    unit: &OrgUnitSnapshot,
    id: &str,
    parent_id: Option<&str>,
    opening_date: &str,
) -> Value {
    let mut payload = Map::new();
    payload.insert("id".into(), Value::String(id.into()));
    payload.insert("name".into(), Value::String(unit.name.clone()));
    payload.insert(
        "shortName".into(),
        Value::String(unit.name.chars().take(SHORT_NAME_LENGTH).collect()),
    );
    payload.insert("openingDate".into(), Value::String(opening_date.into()));
    if let Some(parent) = parent_id {
        payload.insert("parent".into(), json!({ "id": parent }));
    }
    if let Some(geometry) = unit_geometry(unit) {
        payload.extend(geometry_fields(geometry));
    }
    Value::Object(payload)
}

/// Copy of `record` with the changed name, parent and geometry comparisons
/// applied. Other comparisons are ignored.
pub fn merge_changes(record: &Value, comparisons: &[Comparison]) -> Value {
    let mut merged = record.as_object().cloned().unwrap_or_default();
    for c in comparisons.iter().filter(|c| c.status != ComparisonStatus::Same) {
        match c.field.as_str() {
            "name" => {
                if let Some(name) = c.after.as_ref().and_then(FieldValue::as_text) {
                    merged.insert("name".into(), Value::String(name.into()));
                }
            }
            "parent" => match c.after.as_ref().and_then(FieldValue::as_text) {
                Some(parent) => {
                    merged.insert("parent".into(), json!({ "id": parent }));
                }
                None => {
                    merged.remove("parent");
                }
            },
            "geometry" => match c.after.as_ref().and_then(FieldValue::as_geometry) {
                Some(geometry) => merged.extend(geometry_fields(geometry)),
                None => {
                    for key in ["geometry", "coordinates", "featureType"] {
                        merged.remove(key);
                    }
                }
            },
            _ => {}
        }
    }
    Value::Object(merged)
}

/// Ids of the members of a remote group record.
pub fn member_ids(group: &Value) -> Vec<String> {
    group["organisationUnits"]
        .as_array()
        .map(|units| {
            units
                .iter()
                .filter_map(|u| u["id"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Group update payload with the given members.
pub fn group_payload(group: &Value, members: &[String]) -> Value {
    json!({
        "id": group["id"],
        "name": group["name"],
        "organisationUnits": members.iter().map(|id| json!({ "id": id })).collect::<Vec<_>>(),
    })
}

/// Every `errorReports[].message` found anywhere in `body`, falling back to
/// a top-level `message` when the body reports an error without details.
pub fn error_messages(body: &Value) -> Vec<String> {
    fn walk(value: &Value, out: &mut Vec<String>) {
        match value {
            Value::Object(map) => {
                for (key, v) in map {
                    if key == "errorReports" {
                        if let Some(reports) = v.as_array() {
                            out.extend(
                                reports
                                    .iter()
                                    .filter_map(|r| r["message"].as_str().map(str::to_string)),
                            );
                        }
                    } else {
                        walk(v, out);
                    }
                }
            }
            Value::Array(items) => items.iter().for_each(|v| walk(v, out)),
            _ => {}
        }
    }
    let mut out = Vec::new();
    walk(body, &mut out);
    if out.is_empty() && is_error_status(body) {
        if let Some(message) = body["message"].as_str() {
            out.push(message.to_string());
        }
    }
    out
}

fn is_error_status(body: &Value) -> bool {
    body["status"].as_str() == Some("ERROR")
        || body["response"]["status"].as_str() == Some("ERROR")
}

/// Whether a success response still reports a failure.
pub fn is_soft_error(body: &Value) -> bool {
    is_error_status(body) || !error_messages(body).is_empty()
}
