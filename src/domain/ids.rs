//! Type-safe identifiers for arenas, users, and subscriptions.
//!
//! Each identifier is a newtype wrapper around [`uuid::Uuid`] so that an
//! arena ID can never be passed where a user ID is expected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

macro_rules! uuid_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Creates a new random identifier (UUID v4).
            #[must_use]
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// Wraps an existing [`uuid::Uuid`].
            #[must_use]
            pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner [`uuid::Uuid`].
            #[must_use]
            pub const fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
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
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                uuid::Uuid::parse_str(s).map(Self)
            }
        }

        impl From<uuid::Uuid> for $name {
            fn from(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for uuid::Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_newtype!(
    /// Identifier of an arena (a live retrospective board).
    ///
    /// Arenas are created and destroyed by the store; the gateway only ever
    /// receives them as path parameters or inside events.
    ArenaId
);

uuid_newtype!(
    /// Identifier of a registered or guest user.
    UserId
);

uuid_newtype!(
    /// Identifier of a single admitted connection.
    ///
    /// Generated once per connection at admission time. Two connections of
    /// the same user in the same arena still get distinct subscription IDs.
    SubscriptionId
);

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn new_generates_unique_ids() {
        assert_ne!(ArenaId::new(), ArenaId::new());
        assert_ne!(SubscriptionId::new(), SubscriptionId::new());
    }

    #[test]
    fn display_is_uuid_format() {
        let s = UserId::new().to_string();
        assert_eq!(s.len(), 36);
        assert!(s.contains('-'));
    }

    #[test]
    fn parses_from_str() {
        let uuid = uuid::Uuid::new_v4();
        let Ok(id) = uuid.to_string().parse::<ArenaId>() else {
            panic!("valid uuid must parse");
        };
        assert_eq!(*id.as_uuid(), uuid);
    }

    #[test]
    fn rejects_garbage() {
        assert!("R1".parse::<ArenaId>().is_err());
    }

    #[test]
    fn serializes_transparently() {
        let uuid = uuid::Uuid::new_v4();
        let json = serde_json::to_string(&UserId::from_uuid(uuid)).unwrap_or_default();
        assert_eq!(json, format!("\"{uuid}\""));
    }
}
