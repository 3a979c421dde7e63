use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

macro_rules! local_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// The raw numeric value.
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl FromStr for $name {
            type Err = TypeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<u64>()
                    .map(Self)
                    .map_err(|_| TypeError::InvalidId(s.to_string()))
            }
        }
    };
}

local_id!(
    /// Local identifier of a data source version (one pyramid).
    VersionId,
    "VersionId"
);
local_id!(
    /// Local identifier of an org unit row. Only unique within the store,
    /// never across data sources; matching uses `source_ref` instead.
    UnitId,
    "UnitId"
);
local_id!(
    /// Local identifier of a group.
    GroupId,
    "GroupId"
);
local_id!(
    /// Local identifier of a group set.
    GroupSetId,
    "GroupSetId"
);
local_id!(
    /// Local identifier of an org unit type.
    OrgUnitTypeId,
    "OrgUnitTypeId"
);

/// Length of identifiers generated for the reference system.
pub const UID_LENGTH: usize = 11;

const UID_LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const UID_ALPHANUMERIC: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generate a fresh reference-system identifier.
///
/// The format is 11 alphanumeric characters, the first of which is a
/// letter, which is what the reference system accepts as a unit id.
pub fn generate_uid() -> String {
    let mut rng = rand::thread_rng();
    let mut uid = String::with_capacity(UID_LENGTH);
    uid.push(UID_LETTERS[rng.gen_range(0..UID_LETTERS.len())] as char);
    for _ in 1..UID_LENGTH {
        uid.push(UID_ALPHANUMERIC[rng.gen_range(0..UID_ALPHANUMERIC.len())] as char);
    }
    uid
}

/// Returns `true` if `s` has the shape produced by [`generate_uid`].
pub fn is_valid_uid(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == UID_LENGTH
        && bytes[0].is_ascii_alphabetic()
        && bytes.iter().all(|b| b.is_ascii_alphanumeric())
}
