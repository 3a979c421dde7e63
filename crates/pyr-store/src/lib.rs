//! Pyramid storage for pyramid sync.
//!
//! The diff engine never talks to a database directly. It reads pyramids
//! through the [`PyramidStore`] trait and, when synchronizing two internal
//! versions, writes through [`PyramidWriter`].
//!
//! # Storage Backends
//!
//! - [`InMemoryPyramidStore`] -- `BTreeMap`-based store for tests, embedding,
//!   and the CLI (loaded from and saved to a [`PyramidDocument`])
//!
//! # Design Rules
//!
//! 1. Snapshots are returned fully hydrated: parent chain, groups and group
//!    sets are resolved before the caller sees them.
//! 2. Paths are dotted local ids from the root, derived from parent links.
//! 3. Reads never mutate; writes validate references before applying.
//! 4. All errors are propagated, never silently ignored.

pub mod document;
pub mod error;
pub mod memory;
pub mod traits;

pub use document::{OrgUnitRecord, PyramidDocument};
pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryPyramidStore, PARENT_CHAIN_DEPTH};
pub use traits::{NewOrgUnit, OrgUnitPatch, PyramidFilter, PyramidStore, PyramidWriter};
