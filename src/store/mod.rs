//! Store interface consumed by the gateway.
//!
//! The gateway never holds store truth in memory: identity, arena state,
//! membership and ownership are re-read through [`ArenaStore`] whenever a
//! decision depends on them. Two implementations are provided: an in-memory
//! [`MemoryStore`] used by tests and local runs, and a PostgreSQL-backed
//! [`PostgresStore`].

pub mod memory;
pub mod postgres;

pub use memory::{MemoryStore, NewArena};
pub use postgres::PostgresStore;

use async_trait::async_trait;

use crate::domain::{
    Arena, ArenaId, ArenaPhase, ArenaUser, ItemKind, MembershipStatus, RetroAction, RetroItem,
    User, UserId,
};

/// Failure reported by a store operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The referenced record does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The user is not the arena's leader.
    #[error("user is not the arena owner")]
    NotOwner,

    /// The operation is not allowed in the current state.
    #[error("invalid operation: {0}")]
    Invalid(String),

    /// The backing database failed.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("row"),
            other => Self::Backend(other.to_string()),
        }
    }
}

/// Asynchronous store operations used by the connection gate, the sessions
/// and the event handlers.
///
/// Implementations synchronize internally; the gateway issues one call at a
/// time per task.
#[async_trait]
pub trait ArenaStore: Send + Sync + std::fmt::Debug {
    /// Resolves a login session token to its user.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when the session is unknown or expired.
    async fn session_user(&self, session_id: &str) -> Result<User, StoreError>;

    /// Resolves a guest cookie to its user.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when no such guest exists.
    async fn guest_user(&self, user_id: UserId) -> Result<User, StoreError>;

    /// Loads the full arena state.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when the arena does not exist.
    async fn arena(&self, arena_id: ArenaId) -> Result<Arena, StoreError>;

    /// Reports the user's standing in the arena.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when the arena does not exist. An unknown
    /// member is [`MembershipStatus::NotAMember`], not an error.
    async fn membership(
        &self,
        arena_id: ArenaId,
        user_id: UserId,
    ) -> Result<MembershipStatus, StoreError>;

    /// Marks the user as an active member and returns the member list.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when the arena or user does not exist.
    async fn add_user(
        &self,
        arena_id: ArenaId,
        user_id: UserId,
    ) -> Result<Vec<ArenaUser>, StoreError>;

    /// Marks the user inactive and returns the member list.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when the arena does not exist.
    async fn retreat_user(
        &self,
        arena_id: ArenaId,
        user_id: UserId,
    ) -> Result<Vec<ArenaUser>, StoreError>;

    /// Removes the user from the member list for good.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when the arena does not exist.
    async fn abandon_user(
        &self,
        arena_id: ArenaId,
        user_id: UserId,
    ) -> Result<Vec<ArenaUser>, StoreError>;

    /// Succeeds only when `user_id` leads the arena.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotOwner`] for any other user.
    async fn confirm_owner(&self, arena_id: ArenaId, user_id: UserId) -> Result<(), StoreError>;

    /// Adds a brainstorm item and returns all items.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when the arena does not exist.
    async fn create_item(
        &self,
        arena_id: ArenaId,
        user_id: UserId,
        kind: ItemKind,
        content: &str,
    ) -> Result<Vec<RetroItem>, StoreError>;

    /// Deletes an item authored by `user_id` and returns all items.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when the item does not exist or belongs to
    /// someone else.
    async fn delete_item(
        &self,
        arena_id: ArenaId,
        user_id: UserId,
        item_id: uuid::Uuid,
    ) -> Result<Vec<RetroItem>, StoreError>;

    /// Adds an action item and returns all actions.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when the arena does not exist.
    async fn add_action(
        &self,
        arena_id: ArenaId,
        content: &str,
    ) -> Result<Vec<RetroAction>, StoreError>;

    /// Rewrites an action item and returns all actions.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when the action does not exist.
    async fn update_action(
        &self,
        arena_id: ArenaId,
        action_id: uuid::Uuid,
        content: &str,
        completed: bool,
    ) -> Result<Vec<RetroAction>, StoreError>;

    /// Deletes an action item and returns all actions.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when the action does not exist.
    async fn delete_action(
        &self,
        arena_id: ArenaId,
        action_id: uuid::Uuid,
    ) -> Result<Vec<RetroAction>, StoreError>;

    /// Moves the arena to `phase` and returns the updated arena.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when the arena does not exist.
    async fn set_phase(&self, arena_id: ArenaId, phase: ArenaPhase) -> Result<Arena, StoreError>;

    /// Hands leadership to `user_id`, who must be a member.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when the arena or member does not exist.
    async fn set_owner(&self, arena_id: ArenaId, user_id: UserId) -> Result<(), StoreError>;

    /// Destroys the arena.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when the arena does not exist.
    async fn delete_arena(&self, arena_id: ArenaId) -> Result<(), StoreError>;
}
