//! Local synchronization of pyramid diffs.
//!
//! Diffs are first reduced to a compact, self-contained form
//! ([`CompactDiff`]) that can be written out as JSON and read back. The
//! [`Synchronizer`] then applies that form to a target version of a
//! [`PyramidWriter`](pyr_store::PyramidWriter): new units are created parents
//! first, changed fields are patched, and group membership is reconciled only
//! for units whose groups changed.

pub mod compact;
pub mod error;
pub mod synchronizer;

pub use compact::{compact_diffs, diffs_to_json, CompactComparison, CompactDiff, CompactUnit};
pub use error::{SyncError, SyncResult};
pub use pyr_diff::{sort_by_path, PathOrdered};
pub use synchronizer::{has_group_changes, parse_date_str, SyncReport, Synchronizer};
