//! Typed arena events and the server-emitted socket envelope.
//!
//! Inbound frames carry a `type` string and a `value` string. [`ArenaEvent::parse`]
//! turns that pair into a closed enum with a typed payload per variant, so an
//! unknown type or an undecodable payload is an explicit [`EventError`] rather
//! than a silent no-op.

use axum::extract::ws::Utf8Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::domain::{Arena, ArenaPhase, ArenaUser, ItemKind, UserId};
use crate::store::StoreError;

const OWNER_ONLY: [&str; 3] = ["advance_phase", "promote_owner", "concede"];

/// Payload of `create_item`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewItem {
    /// Column the item goes into.
    #[serde(rename = "type")]
    pub kind: ItemKind,
    /// Item text.
    pub content: String,
}

/// Payload of `delete_item` and `delete_action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TargetId {
    /// Record to delete.
    pub id: uuid::Uuid,
}

/// Payload of `add_action`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewAction {
    /// Action text.
    pub content: String,
}

/// Payload of `update_action`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ActionUpdate {
    /// Action to rewrite.
    pub id: uuid::Uuid,
    /// New text.
    pub content: String,
    /// New completion flag.
    pub completed: bool,
}

/// Payload of `advance_phase`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PhaseChange {
    /// Phase to move to.
    pub phase: ArenaPhase,
}

/// Payload of `promote_owner`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerChange {
    /// Member who becomes the new owner.
    pub user_id: UserId,
}

/// Every event a participant (or an injecting collaborator) may send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArenaEvent {
    /// Add a brainstorm item.
    CreateItem(NewItem),
    /// Remove one of the sender's items.
    DeleteItem(TargetId),
    /// Add an action item.
    AddAction(NewAction),
    /// Rewrite an action item.
    UpdateAction(ActionUpdate),
    /// Remove an action item.
    DeleteAction(TargetId),
    /// Move the arena to another phase. Owner only.
    AdvancePhase(PhaseChange),
    /// Hand leadership to another member. Owner only.
    PromoteOwner(OwnerChange),
    /// End the arena for everyone. Owner only.
    Concede,
    /// Leave the arena for good.
    Abandon,
}

impl ArenaEvent {
    /// Decodes an inbound `(type, value)` pair.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::UnknownType`] for a type outside the event table
    /// and [`EventError::Malformed`] when `value` does not decode into the
    /// type's payload.
    pub fn parse(kind: &str, value: &str) -> Result<Self, EventError> {
        let event = match kind {
            "create_item" => {
                let item: NewItem = decode(kind, value)?;
                require_content(kind, &item.content)?;
                Self::CreateItem(item)
            }
            "delete_item" => Self::DeleteItem(decode(kind, value)?),
            "add_action" => {
                let action: NewAction = decode(kind, value)?;
                require_content(kind, &action.content)?;
                Self::AddAction(action)
            }
            "update_action" => {
                let update: ActionUpdate = decode(kind, value)?;
                require_content(kind, &update.content)?;
                Self::UpdateAction(update)
            }
            "delete_action" => Self::DeleteAction(decode(kind, value)?),
            "advance_phase" => Self::AdvancePhase(decode(kind, value)?),
            "promote_owner" => Self::PromoteOwner(decode(kind, value)?),
            "concede" => Self::Concede,
            "abandon" => Self::Abandon,
            other => return Err(EventError::UnknownType(other.to_string())),
        };
        Ok(event)
    }

    /// Wire name of the event.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::CreateItem(_) => "create_item",
            Self::DeleteItem(_) => "delete_item",
            Self::AddAction(_) => "add_action",
            Self::UpdateAction(_) => "update_action",
            Self::DeleteAction(_) => "delete_action",
            Self::AdvancePhase(_) => "advance_phase",
            Self::PromoteOwner(_) => "promote_owner",
            Self::Concede => "concede",
            Self::Abandon => "abandon",
        }
    }

    /// Returns `true` if only the arena's owner may send this event.
    #[must_use]
    pub fn is_owner_only(&self) -> bool {
        Self::owner_only(self.kind()).is_some()
    }

    /// Looks up an event type on the owner-only list by its wire name,
    /// without decoding any payload.
    #[must_use]
    pub fn owner_only(kind: &str) -> Option<&'static str> {
        OWNER_ONLY.iter().copied().find(|owner_kind| *owner_kind == kind)
    }
}

fn decode<T: DeserializeOwned>(kind: &str, value: &str) -> Result<T, EventError> {
    serde_json::from_str(value).map_err(|err| EventError::Malformed {
        kind: kind.to_string(),
        reason: err.to_string(),
    })
}

fn require_content(kind: &str, content: &str) -> Result<(), EventError> {
    if content.trim().is_empty() {
        return Err(EventError::Malformed {
            kind: kind.to_string(),
            reason: "content must not be empty".to_string(),
        });
    }
    Ok(())
}

/// Reasons an event was not applied.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// The payload did not decode.
    #[error("malformed `{kind}` payload: {reason}")]
    Malformed {
        /// Event type that failed.
        kind: String,
        /// Decoder message.
        reason: String,
    },

    /// The type is not in the event table.
    #[error("unknown event type `{0}`")]
    UnknownType(String),

    /// A non-owner sent an owner-only event.
    #[error("`{0}` is restricted to the arena owner")]
    PermissionDenied(&'static str),

    /// The store refused or failed the operation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The result could not be serialized.
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

impl EventError {
    /// Returns `true` for errors caused by the frame itself, which are
    /// reported back to the sender.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::Malformed { .. } | Self::UnknownType(_))
    }
}

/// Server-emitted event: `{"type", "value", "userId"}`.
///
/// `value` is a plain string; structured results are JSON-encoded into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SocketEvent {
    /// Event name.
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Event payload.
    pub value: String,
    /// User whose action produced the event.
    pub user_id: UserId,
}

impl SocketEvent {
    /// Creates an event with a plain string value.
    #[must_use]
    pub fn new(kind: &'static str, value: impl Into<String>, user_id: UserId) -> Self {
        Self {
            kind,
            value: value.into(),
            user_id,
        }
    }

    /// Creates an event whose value is `payload` encoded as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if `payload` cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(
        kind: &'static str,
        payload: &T,
        user_id: UserId,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(kind, serde_json::to_string(payload)?, user_id))
    }

    /// `init`: full arena state for a newly admitted participant.
    ///
    /// # Errors
    ///
    /// Returns an error if the arena cannot be serialized.
    pub fn init(arena: &Arena, user_id: UserId) -> Result<Self, serde_json::Error> {
        Self::json("init", arena, user_id)
    }

    /// `user_joined`: membership after `user_id` was admitted.
    ///
    /// # Errors
    ///
    /// Returns an error if the member list cannot be serialized.
    pub fn user_joined(users: &[ArenaUser], user_id: UserId) -> Result<Self, serde_json::Error> {
        Self::json("user_joined", users, user_id)
    }

    /// `user_left`: membership after `user_id` disconnected.
    ///
    /// # Errors
    ///
    /// Returns an error if the member list cannot be serialized.
    pub fn user_left(users: &[ArenaUser], user_id: UserId) -> Result<Self, serde_json::Error> {
        Self::json("user_left", users, user_id)
    }

    /// `join_code_required`: challenge sent before admission.
    #[must_use]
    pub fn join_code_required(user_id: UserId) -> Self {
        Self::new("join_code_required", "", user_id)
    }

    /// `join_code_incorrect`: reply to a wrong `auth_retro`.
    #[must_use]
    pub fn join_code_incorrect(user_id: UserId) -> Self {
        Self::new("join_code_incorrect", "", user_id)
    }

    /// `event_rejected`: sent to the sender alone when a frame is refused.
    #[must_use]
    pub fn rejected(error: &EventError, user_id: UserId) -> Self {
        Self::new("event_rejected", error.to_string(), user_id)
    }

    /// Serializes the envelope for the wire.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_payload(&self) -> Result<Utf8Bytes, serde_json::Error> {
        serde_json::to_string(self).map(Utf8Bytes::from)
    }
}

/// Result of applying an event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EventOutcome {
    /// Event to send to every subscriber of the arena.
    pub broadcast: Option<SocketEvent>,
    /// Close the sender's connection after the broadcast.
    pub force_close: bool,
}

impl EventOutcome {
    /// Broadcast `event`; keep the connection open.
    #[must_use]
    pub const fn broadcast(event: SocketEvent) -> Self {
        Self {
            broadcast: Some(event),
            force_close: false,
        }
    }
}
