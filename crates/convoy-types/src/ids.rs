//! Type-safe identifier wrappers around [`Uuid`].
//!
//! Agents, bikes and loot boxes each get their own newtype so that an agent
//! identifier can never be passed where a loot box is expected. Identifiers
//! are totally ordered; the decision engine relies on that ordering as its
//! deterministic tie-break ("lowest identifier wins").

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Create an identifier from 16 caller-supplied random bytes.
            ///
            /// Used by seeded spawners so that a run is reproducible.
            pub fn from_random_bytes(bytes: [u8; 16]) -> Self {
                Self(uuid::Builder::from_random_bytes(bytes).into_uuid())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for an agent (a rider).
    AgentId
}

define_id! {
    /// Unique identifier for a group-owned bike.
    BikeId
}

define_id! {
    /// Unique identifier for a loot box (a travel target).
    LootBoxId
}
