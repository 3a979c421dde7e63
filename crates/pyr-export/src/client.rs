//! Request/response contract of the remote reference system.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{ClientError, ClientResult};

/// Status and decoded body of a successful write.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteResponse {
    pub status: u16,
    pub body: Value,
}

/// Remote API used by the exporter.
///
/// Paths are relative to the API root (`organisationUnits`, `metadata`).
/// Non-success statuses are reported as [`ClientError::Http`].
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn get(&self, path: &str, params: &[(&str, String)]) -> ClientResult<Value>;
    async fn post(&self, path: &str, body: &Value) -> ClientResult<RemoteResponse>;
    async fn put(&self, path: &str, body: &Value) -> ClientResult<RemoteResponse>;
}

/// [`RemoteClient`] over HTTP.
#[derive(Clone, Debug)]
pub struct HttpRemoteClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Option<(String, String)>,
}

impl HttpRemoteClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            credentials: None,
        }
    }

    /// Authenticate every request with HTTP basic auth.
    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn send(&self, request: reqwest::RequestBuilder, url: String) -> ClientResult<RemoteResponse> {
        let request = match &self.credentials {
            Some((user, password)) => request.basic_auth(user, Some(password)),
            None => request,
        };
        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        debug!(%url, status = status.as_u16(), bytes = text.len(), "remote response");

        if !status.is_success() {
            return Err(ClientError::Http {
                status: status.as_u16(),
                url,
                body: text,
            });
        }
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).map_err(|e| ClientError::Decode {
                url,
                reason: e.to_string(),
            })?
        };
        Ok(RemoteResponse {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn get(&self, path: &str, params: &[(&str, String)]) -> ClientResult<Value> {
        let url = self.url(path);
        let request = self.http.get(&url).query(params);
        Ok(self.send(request, url).await?.body)
    }

    async fn post(&self, path: &str, body: &Value) -> ClientResult<RemoteResponse> {
        let url = self.url(path);
        let request = self.http.post(&url).json(body);
        self.send(request, url).await
    }

    async fn put(&self, path: &str, body: &Value) -> ClientResult<RemoteResponse> {
        let url = self.url(path);
        let request = self.http.put(&url).json(body);
        self.send(request, url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_joined_with_one_slash() {
        let client = HttpRemoteClient::new("https://remote.example.org/api/");
        assert_eq!(client.url("/metadata"), "https://remote.example.org/api/metadata");
        assert_eq!(
            client.url("organisationUnitGroups/abc"),
            "https://remote.example.org/api/organisationUnitGroups/abc"
        );
    }

    #[tokio::test]
    async fn unreachable_remote_is_a_transport_error() {
        let client = HttpRemoteClient::new("http://127.0.0.1:1").with_basic_auth("admin", "district");
        let err = client.get("organisationUnits", &[]).await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
    }
}
