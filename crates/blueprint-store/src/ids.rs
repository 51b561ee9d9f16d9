//! Time-ordered 128-bit identifiers.
//!
//! Every durable entity id in this crate is a UUIDv7: the high bits encode
//! the creation millisecond, so sorting by id is sorting by time. This is
//! what lets the events engine use `id` as its only ordering key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An id that failed to parse as a UUID.
///
/// The store never surfaces this to callers directly — a
/// malformed id is folded into the entity's own not-found error kind rather
/// than a distinct "invalid argument" kind, to avoid leaking storage format
/// details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdParseError;

impl fmt::Display for IdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed identifier")
    }
}

impl std::error::Error for IdParseError {}

macro_rules! id_type {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
        )]
        #[serde(transparent)]
        #[sqlx(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Mint a fresh, time-ordered id from the current instant.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Parse from its canonical string form.
            pub fn parse(s: &str) -> Result<Self, IdParseError> {
                Uuid::parse_str(s).map(Self).map_err(|_| IdParseError)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
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

        impl FromStr for $name {
            type Err = IdParseError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl From<Uuid> for $name {
            fn from(u: Uuid) -> Self {
                Self(u)
            }
        }
    };
}

id_type!(InstanceId, "Primary key of a blueprint instance.");
id_type!(ResourceId, "Primary key of a resource.");
id_type!(LinkId, "Primary key of a link.");
id_type!(EventId, "Primary key of an event; monotonic by creation time.");
id_type!(ChangesetId, "Primary key of a change set.");
id_type!(ValidationId, "Primary key of a blueprint validation request.");
id_type!(ChannelId, "Identifies one event channel instance within a channel type.");

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn ids_are_monotonic_by_creation_order() {
        let a = EventId::new();
        sleep(Duration::from_millis(2));
        let b = EventId::new();
        assert!(a.as_uuid() < b.as_uuid(), "later id must sort after earlier id");
    }

    #[test]
    fn parse_round_trips_display() {
        let id = ResourceId::new();
        let parsed = ResourceId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(InstanceId::parse("not-a-uuid").is_err());
        assert!(InstanceId::parse("").is_err());
    }

    #[test]
    fn distinct_id_types_do_not_compare() {
        // Compile-time guarantee only: ResourceId and LinkId are distinct
        // types even though both wrap Uuid, so a ResourceId can never be
        // handed to a function expecting a LinkId.
        let r = ResourceId::new();
        let l = LinkId::new();
        assert_ne!(r.as_uuid(), l.as_uuid());
    }
}
