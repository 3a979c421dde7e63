//! Export of pyramid diffs to a remote reference system.
//!
//! The [`Exporter`] runs three sequential phases over a diff set: create the
//! units the remote lacks, update the units whose name, parent or geometry
//! changed, then reconcile group membership for every changed group set.
//! Nothing is retried and nothing already sent is rolled back.
//!
//! # Key Types
//!
//! - [`RemoteClient`] -- Async request/response contract of the remote API
//! - [`HttpRemoteClient`] -- `reqwest` implementation with basic auth
//! - [`InMemoryReferenceSystem`] -- In-process remote for tests and dry runs
//! - [`Exporter`] / [`ExportConfig`] / [`ExportReport`] -- The export job

pub mod client;
pub mod error;
pub mod exporter;
pub mod memory;
pub mod payload;

pub use client::{HttpRemoteClient, RemoteClient, RemoteResponse};
pub use error::{ClientError, ClientResult, ExportError, ExportResult};
pub use exporter::{AssignedRef, ExportConfig, ExportReport, Exporter, DEFAULT_OPENING_DATE};
pub use memory::{InMemoryReferenceSystem, RecordedRequest};
