//! Error types for the export crate.

use serde_json::Value;
use thiserror::Error;

use pyr_types::Cancelled;

use crate::payload::error_messages;

/// Failure of a single remote request.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The remote answered with a non-success status.
    #[error("HTTP {status} from {url}: {body}")]
    Http { status: u16, url: String, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("undecodable response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

impl ClientError {
    /// Error messages reported in the response body, if it was JSON.
    pub fn remote_messages(&self) -> Vec<String> {
        match self {
            Self::Http { body, .. } => serde_json::from_str::<Value>(body)
                .map(|v| error_messages(&v))
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that abort an export run.
#[derive(Debug, Error)]
pub enum ExportError {
    /// A request failed or the remote reported an error in a success
    /// response. Carries what was sent and what the remote said about it.
    #[error("{message}: {}", .error_messages.join("; "))]
    Remote {
        message: String,
        payload: Value,
        error_messages: Vec<String>,
        #[source]
        source: Option<ClientError>,
    },

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl ExportError {
    /// Wrap a failed request together with its payload.
    pub fn request(message: impl Into<String>, payload: Value, source: ClientError) -> Self {
        Self::Remote {
            message: message.into(),
            payload,
            error_messages: source.remote_messages(),
            source: Some(source),
        }
    }

    /// A success response whose body reports an error.
    pub fn soft(message: impl Into<String>, payload: Value, body: &Value) -> Self {
        Self::Remote {
            message: message.into(),
            payload,
            error_messages: error_messages(body),
            source: None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

pub type ExportResult<T> = Result<T, ExportError>;
