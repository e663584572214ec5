//! Newtype identifiers.
//!
//! Workstations are keyed by their owner-chosen name (unique per account),
//! not a generated id, so there is no `WorkstationId` here — see
//! [`crate::domain::Workstation::name`].

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id!(OperationId, "Unique id of a scheduler [`crate::domain::Operation`].");
uuid_id!(ProjectId, "Unique id of a [`crate::domain::Project`].");
uuid_id!(VolumeId, "Unique id of a [`crate::domain::Volume`].");
uuid_id!(IdlePolicyId, "Unique id of an [`crate::domain::IdlePolicy`].");
