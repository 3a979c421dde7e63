use chrono::NaiveDate;
use pyr_types::{
    Geometry, Group, GroupId, GroupSet, OrgUnitSnapshot, OrgUnitTypeId, UnitId, ValidationStatus,
    VersionId,
};

use crate::error::StoreResult;

/// Optional restrictions applied when loading a pyramid.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PyramidFilter {
    /// Keep only units with this validation status.
    pub validation_status: Option<ValidationStatus>,
    /// Keep only this unit and its descendants.
    pub top_org_unit: Option<UnitId>,
    /// Keep only units of these types. An empty list means no restriction.
    pub org_unit_types: Vec<OrgUnitTypeId>,
}

impl PyramidFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_validation_status(mut self, status: ValidationStatus) -> Self {
        self.validation_status = Some(status);
        self
    }

    pub fn with_top_org_unit(mut self, top: UnitId) -> Self {
        self.top_org_unit = Some(top);
        self
    }

    pub fn with_org_unit_types(mut self, types: Vec<OrgUnitTypeId>) -> Self {
        self.org_unit_types = types;
        self
    }
}

/// Read side of the pyramid store.
///
/// Implementations must satisfy these invariants:
/// - Returned snapshots carry their parent chain (at least
///   [`PARENT_CHAIN_DEPTH`](crate::PARENT_CHAIN_DEPTH) levels), groups, and
///   the group sets of each group.
/// - `load_pyramid` returns units in a stable order across calls.
/// - A unit matching no filter is never returned; a missing version yields an
///   empty pyramid, not an error.
pub trait PyramidStore: Send + Sync {
    /// All units of `version` matching `filter`.
    fn load_pyramid(
        &self,
        version: VersionId,
        filter: &PyramidFilter,
    ) -> StoreResult<Vec<OrgUnitSnapshot>>;

    /// All group sets defined for `version`.
    fn group_sets(&self, version: VersionId) -> StoreResult<Vec<GroupSet>>;

    /// All groups defined for `version`.
    fn groups(&self, version: VersionId) -> StoreResult<Vec<Group>>;

    /// Whether a unit with `source_ref` currently exists in `version`.
    fn source_ref_exists(&self, version: VersionId, source_ref: &str) -> StoreResult<bool>;

    /// The first unit of `version` carrying `source_ref`, if any.
    fn find_by_source_ref(
        &self,
        version: VersionId,
        source_ref: &str,
    ) -> StoreResult<Option<OrgUnitSnapshot>>;
}

/// Fields of a unit to be created.
#[derive(Clone, Debug, PartialEq)]
pub struct NewOrgUnit {
    pub version: VersionId,
    pub source_ref: Option<String>,
    pub name: String,
    pub org_unit_type_id: Option<OrgUnitTypeId>,
    pub validation_status: ValidationStatus,
    pub parent_id: Option<UnitId>,
    pub location: Option<Geometry>,
    pub geom: Option<Geometry>,
    pub opening_date: Option<NaiveDate>,
    pub closed_date: Option<NaiveDate>,
}

impl NewOrgUnit {
    pub fn new(version: VersionId, name: impl Into<String>) -> Self {
        Self {
            version,
            source_ref: None,
            name: name.into(),
            org_unit_type_id: None,
            validation_status: ValidationStatus::default(),
            parent_id: None,
            location: None,
            geom: None,
            opening_date: None,
            closed_date: None,
        }
    }
}

/// Partial update of a unit. `None` leaves a field untouched; for nullable
/// fields `Some(None)` clears it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OrgUnitPatch {
    pub name: Option<String>,
    pub parent_id: Option<Option<UnitId>>,
    pub location: Option<Option<Geometry>>,
    pub geom: Option<Option<Geometry>>,
    pub opening_date: Option<Option<NaiveDate>>,
    pub closed_date: Option<Option<NaiveDate>>,
}

impl OrgUnitPatch {
    /// Returns `true` if applying this patch would change nothing.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Write side of the pyramid store, used when synchronizing two internal
/// versions and when persisting generated source refs.
pub trait PyramidWriter: PyramidStore {
    /// Create a unit and return its id.
    fn create_org_unit(&self, unit: NewOrgUnit) -> StoreResult<UnitId>;

    /// Apply a partial update to a unit.
    fn update_org_unit(&self, id: UnitId, patch: &OrgUnitPatch) -> StoreResult<()>;

    /// Set the `source_ref` of a unit.
    fn set_source_ref(&self, id: UnitId, source_ref: &str) -> StoreResult<()>;

    /// The group of `version` carrying `source_ref`, if any.
    fn find_group(&self, version: VersionId, source_ref: &str) -> StoreResult<Option<Group>>;

    /// Create a group in `version`.
    fn create_group(&self, version: VersionId, source_ref: &str, name: &str)
        -> StoreResult<GroupId>;

    /// Add a unit to a group. Returns `false` if it already was a member.
    fn add_to_group(&self, unit: UnitId, group: GroupId) -> StoreResult<bool>;

    /// Remove a unit from a group. Returns `false` if it was not a member.
    fn remove_from_group(&self, unit: UnitId, group: GroupId) -> StoreResult<bool>;
}
