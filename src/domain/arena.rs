//! Arena and user models as seen by the gateway.
//!
//! These are read-only snapshots of store-held truth. The gateway never
//! caches them between calls; every decision re-reads the store.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ArenaId, UserId};

/// Whether a user registered an account or joined as an anonymous guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserKind {
    /// Anonymous user identified by the guest cookie.
    Guest,
    /// User with an account and a login session.
    Registered,
}

impl UserKind {
    /// Returns the storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Guest => "guest",
            Self::Registered => "registered",
        }
    }
}

/// A user resolved once per connection at admission time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// User identifier.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Guest or registered.
    pub kind: UserKind,
    /// Optional avatar reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// A member of an arena as broadcast in `user_joined` / `user_left`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArenaUser {
    /// User identifier.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Whether the user currently has a live connection to the arena.
    pub active: bool,
}

/// The stage a retrospective is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArenaPhase {
    /// Participants are arriving.
    Intro,
    /// Participants add items.
    Brainstorm,
    /// Items are clustered.
    Group,
    /// Participants vote on items.
    Vote,
    /// Action items are captured.
    Action,
    /// The retrospective is over.
    Completed,
}

impl ArenaPhase {
    /// Returns the storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Intro => "intro",
            Self::Brainstorm => "brainstorm",
            Self::Group => "group",
            Self::Vote => "vote",
            Self::Action => "action",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for ArenaPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArenaPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "intro" => Ok(Self::Intro),
            "brainstorm" => Ok(Self::Brainstorm),
            "group" => Ok(Self::Group),
            "vote" => Ok(Self::Vote),
            "action" => Ok(Self::Action),
            "completed" => Ok(Self::Completed),
            other => Err(format!("unknown phase: {other}")),
        }
    }
}

/// Column an item is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Went well.
    Worked,
    /// Needs improvement.
    Improve,
    /// Open question.
    Question,
}

impl ItemKind {
    /// Returns the storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Worked => "worked",
            Self::Improve => "improve",
            Self::Question => "question",
        }
    }
}

impl FromStr for ItemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "worked" => Ok(Self::Worked),
            "improve" => Ok(Self::Improve),
            "question" => Ok(Self::Question),
            other => Err(format!("unknown item type: {other}")),
        }
    }
}

/// A brainstorm item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetroItem {
    /// Item identifier.
    pub id: uuid::Uuid,
    /// Author.
    pub user_id: UserId,
    /// Column.
    #[serde(rename = "type")]
    pub kind: ItemKind,
    /// Item text.
    pub content: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// A follow-up action captured during the retrospective.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetroAction {
    /// Action identifier.
    pub id: uuid::Uuid,
    /// Action text.
    pub content: String,
    /// Whether the action has been done.
    pub completed: bool,
}

/// Full arena state, sent to a new participant in the `init` event.
///
/// The join secret is never serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Arena {
    /// Arena identifier.
    pub id: ArenaId,
    /// Board title.
    pub name: String,
    /// Current leader.
    pub owner_id: UserId,
    /// Current stage.
    pub phase: ArenaPhase,
    /// Shared secret gating admission; `None` or empty means open.
    #[serde(skip)]
    pub join_code: Option<String>,
    /// Members that have not abandoned the arena.
    pub users: Vec<ArenaUser>,
    /// Brainstorm items.
    pub items: Vec<RetroItem>,
    /// Action items.
    pub actions: Vec<RetroAction>,
}

impl Arena {
    /// Returns the join secret when the arena is protected by one.
    #[must_use]
    pub fn join_secret(&self) -> Option<&str> {
        self.join_code.as_deref().filter(|code| !code.is_empty())
    }
}

/// A user's standing in an arena, as reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipStatus {
    /// The user has never joined (or abandoned) this arena.
    NotAMember,
    /// The user joined before but has no live connection now.
    Inactive,
    /// The user already has a live connection to this arena.
    Active,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn arena(join_code: Option<&str>) -> Arena {
        Arena {
            id: ArenaId::new(),
            name: "Sprint 12".to_string(),
            owner_id: UserId::new(),
            phase: ArenaPhase::Intro,
            join_code: join_code.map(str::to_string),
            users: Vec::new(),
            items: Vec::new(),
            actions: Vec::new(),
        }
    }

    #[test]
    fn empty_join_code_is_open() {
        assert_eq!(arena(None).join_secret(), None);
        assert_eq!(arena(Some("")).join_secret(), None);
        assert_eq!(arena(Some("7731")).join_secret(), Some("7731"));
    }

    #[test]
    fn join_code_is_never_serialized() {
        let json = serde_json::to_string(&arena(Some("7731"))).unwrap_or_default();
        assert!(!json.contains("7731"));
        assert!(json.contains("ownerId"));
    }

    #[test]
    fn phase_round_trips_through_storage_form() {
        for phase in [
            ArenaPhase::Intro,
            ArenaPhase::Brainstorm,
            ArenaPhase::Group,
            ArenaPhase::Vote,
            ArenaPhase::Action,
            ArenaPhase::Completed,
        ] {
            assert_eq!(phase.as_str().parse::<ArenaPhase>(), Ok(phase));
        }
        assert!("lunch".parse::<ArenaPhase>().is_err());
    }

    #[test]
    fn item_kind_uses_type_key_on_the_wire() {
        let item = RetroItem {
            id: uuid::Uuid::new_v4(),
            user_id: UserId::new(),
            kind: ItemKind::Improve,
            content: "flaky CI".to_string(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&item).unwrap_or_default();
        assert!(json.contains("\"type\":\"improve\""));
    }
}
