//! Foundation types for pyramid sync.
//!
//! This crate provides the snapshot model shared by every other `pyr-*`
//! crate: organisational units as loaded from one version of a data source,
//! their groups and group sets, their geometry, and the progress contract
//! used by long-running jobs.
//!
//! # Key Types
//!
//! - [`OrgUnitSnapshot`] -- One org unit with parent, groups and geometry preloaded
//! - [`Geometry`] -- GeoJSON-shaped point / polygon / multipolygon
//! - [`VersionId`], [`UnitId`], [`GroupId`] -- Local numeric identifiers
//! - [`generate_uid`] -- 11-character identifier accepted by the reference system
//! - [`ProgressSink`] / [`Cancelled`] -- Progress reporting and cancellation

pub mod error;
pub mod geometry;
pub mod ids;
pub mod progress;
pub mod unit;

pub use error::TypeError;
pub use geometry::{Geometry, Position};
pub use ids::{
    generate_uid, is_valid_uid, GroupId, GroupSetId, OrgUnitTypeId, UnitId, VersionId, UID_LENGTH,
};
pub use progress::{Cancelled, NoProgress, ProgressReport, ProgressSink, RecordingProgress};
pub use unit::{
    Group, GroupMembership, GroupSet, GroupSetRef, OrgUnitSnapshot, OrgUnitType, ParentRef,
    ValidationStatus,
};
