//! In-process stand-in for the remote reference system.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::client::{RemoteClient, RemoteResponse};
use crate::error::{ClientError, ClientResult};

/// One request received by an [`InMemoryReferenceSystem`].
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub path: String,
    pub body: Option<Value>,
}

#[derive(Default)]
struct RemoteState {
    org_units: BTreeMap<String, Value>,
    groups: BTreeMap<String, Value>,
    requests: Vec<RecordedRequest>,
    rejected_units: HashMap<String, String>,
    metadata_error: Option<String>,
}

/// Serves the endpoints used by the exporter from memory.
///
/// Org units and groups are kept as the JSON records the real API returns.
/// Creation of chosen ids can be rejected with a `409`, and the next
/// `metadata` import can be made to answer `200` with an error report.
#[derive(Default)]
pub struct InMemoryReferenceSystem {
    state: Mutex<RemoteState>,
}

impl InMemoryReferenceSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_org_unit(self, record: Value) -> Self {
        if let Some(id) = record["id"].as_str().map(str::to_string) {
            self.state.lock().expect("lock poisoned").org_units.insert(id, record);
        }
        self
    }

    pub fn with_group(self, id: &str, name: &str, group_set: &str, members: &[&str]) -> Self {
        let record = json!({
            "id": id,
            "name": name,
            "groupSets": [{ "id": group_set }],
            "organisationUnits": members.iter().map(|m| json!({ "id": m })).collect::<Vec<_>>(),
        });
        self.state
            .lock()
            .expect("lock poisoned")
            .groups
            .insert(id.to_string(), record);
        self
    }

    /// Answer `409` with an error report when `id` is created.
    pub fn reject_org_unit(self, id: &str, message: &str) -> Self {
        self.state
            .lock()
            .expect("lock poisoned")
            .rejected_units
            .insert(id.to_string(), message.to_string());
        self
    }

    /// Answer the next `metadata` import with `200` and an error report.
    pub fn fail_next_metadata(self, message: &str) -> Self {
        self.state.lock().expect("lock poisoned").metadata_error = Some(message.to_string());
        self
    }

    pub fn org_unit(&self, id: &str) -> Option<Value> {
        self.state.lock().expect("lock poisoned").org_units.get(id).cloned()
    }

    pub fn org_unit_count(&self) -> usize {
        self.state.lock().expect("lock poisoned").org_units.len()
    }

    pub fn group(&self, id: &str) -> Option<Value> {
        self.state.lock().expect("lock poisoned").groups.get(id).cloned()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().expect("lock poisoned").requests.clone()
    }

    /// Number of requests with `method` whose path starts with `prefix`.
    pub fn request_count(&self, method: &str, prefix: &str) -> usize {
        self.state
            .lock()
            .expect("lock poisoned")
            .requests
            .iter()
            .filter(|r| r.method == method && r.path.starts_with(prefix))
            .count()
    }

    fn not_found(path: &str) -> ClientError {
        ClientError::Http {
            status: 404,
            url: path.to_string(),
            body: json!({"status": "ERROR", "message": format!("no endpoint {path}")}).to_string(),
        }
    }
}

fn param<'a>(params: &'a [(&str, String)], name: &str) -> Option<&'a str> {
    params.iter().find(|(k, _)| *k == name).map(|(_, v)| v.as_str())
}

/// Ids listed in an `id:in:[a,b,c]` filter.
fn ids_in_filter(filter: &str) -> Vec<&str> {
    filter
        .strip_prefix("id:in:[")
        .and_then(|rest| rest.strip_suffix(']'))
        .map(|list| list.split(',').map(str::trim).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

fn in_group_set(group: &Value, set: &str) -> bool {
    group["groupSets"]
        .as_array()
        .is_some_and(|sets| sets.iter().any(|s| s["id"].as_str() == Some(set)))
}

#[async_trait]
impl RemoteClient for InMemoryReferenceSystem {
    async fn get(&self, path: &str, params: &[(&str, String)]) -> ClientResult<Value> {
        let mut state = self.state.lock().expect("lock poisoned");
        state.requests.push(RecordedRequest {
            method: "GET",
            path: path.to_string(),
            body: None,
        });
        let filter = param(params, "filter").unwrap_or_default();
        match path {
            "organisationUnits" => {
                let units: Vec<Value> = ids_in_filter(filter)
                    .into_iter()
                    .filter_map(|id| state.org_units.get(id).cloned())
                    .collect();
                Ok(json!({ "organisationUnits": units }))
            }
            "organisationUnitGroups" => {
                let set = filter.strip_prefix("groupSets.id:eq:").unwrap_or_default();
                let groups: Vec<Value> = state
                    .groups
                    .values()
                    .filter(|g| in_group_set(g, set))
                    .map(|g| {
                        json!({
                            "id": g["id"],
                            "name": g["name"],
                            "organisationUnits": g["organisationUnits"],
                        })
                    })
                    .collect();
                Ok(json!({ "organisationUnitGroups": groups }))
            }
            other => Err(Self::not_found(other)),
        }
    }

    async fn post(&self, path: &str, body: &Value) -> ClientResult<RemoteResponse> {
        let mut state = self.state.lock().expect("lock poisoned");
        state.requests.push(RecordedRequest {
            method: "POST",
            path: path.to_string(),
            body: Some(body.clone()),
        });
        match path {
            "organisationUnits" => {
                let id = body["id"].as_str().unwrap_or_default().to_string();
                if let Some(message) = state.rejected_units.get(&id) {
                    return Err(ClientError::Http {
                        status: 409,
                        url: path.to_string(),
                        body: json!({
                            "status": "ERROR",
                            "response": { "errorReports": [{ "message": message }] }
                        })
                        .to_string(),
                    });
                }
                state.org_units.insert(id.clone(), body.clone());
                Ok(RemoteResponse {
                    status: 201,
                    body: json!({ "status": "OK", "response": { "uid": id } }),
                })
            }
            "metadata" => {
                if let Some(message) = state.metadata_error.take() {
                    return Ok(RemoteResponse {
                        status: 200,
                        body: json!({
                            "status": "ERROR",
                            "typeReports": [{ "objectReports": [{
                                "errorReports": [{ "message": message }]
                            }]}]
                        }),
                    });
                }
                let units = body["organisationUnits"].as_array().cloned().unwrap_or_default();
                for unit in units {
                    if let Some(id) = unit["id"].as_str().map(str::to_string) {
                        state.org_units.insert(id, unit);
                    }
                }
                Ok(RemoteResponse {
                    status: 200,
                    body: json!({ "status": "OK" }),
                })
            }
            other => Err(Self::not_found(other)),
        }
    }

    async fn put(&self, path: &str, body: &Value) -> ClientResult<RemoteResponse> {
        let mut state = self.state.lock().expect("lock poisoned");
        state.requests.push(RecordedRequest {
            method: "PUT",
            path: path.to_string(),
            body: Some(body.clone()),
        });
        let Some(id) = path.strip_prefix("organisationUnitGroups/") else {
            return Err(Self::not_found(path));
        };
        let Some(group) = state.groups.get_mut(id) else {
            return Err(Self::not_found(path));
        };
        group["organisationUnits"] = body["organisationUnits"].clone();
        if let Some(name) = body["name"].as_str() {
            group["name"] = Value::String(name.to_string());
        }
        Ok(RemoteResponse {
            status: 200,
            body: json!({ "status": "OK" }),
        })
    }
}
