//! The binding of one connection, one arena, and one user.
//!
//! A [`Subscription`] is created when a connection is admitted and handed
//! to the [`super::Hub`]. It carries the sending half of the connection's
//! outbound queue and the connection's shutdown signal; the receiving half
//! of the queue is owned by the connection's write task alone.

use axum::extract::ws::{CloseFrame, Utf8Bytes};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{ArenaId, SubscriptionId, UserId};

/// A frame waiting in a connection's outbound queue.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Serialized event to write as a text frame.
    Text(Utf8Bytes),
    /// Close frame to write before the write task stops.
    Close(CloseFrame),
}

/// A payload addressed to every subscription of one arena.
///
/// The hub never looks inside `payload`.
#[derive(Debug, Clone)]
pub struct ArenaMessage {
    /// Target arena.
    pub arena_id: ArenaId,
    /// Serialized event.
    pub payload: Utf8Bytes,
}

impl ArenaMessage {
    /// Creates a message for `arena_id`.
    #[must_use]
    pub fn new(arena_id: ArenaId, payload: impl Into<Utf8Bytes>) -> Self {
        Self {
            arena_id,
            payload: payload.into(),
        }
    }
}

/// Reason a subscription could not accept a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// The outbound queue is at capacity.
    Full,
    /// The write task has already stopped.
    Closed,
}

/// One admitted connection as registered with the hub.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: SubscriptionId,
    arena_id: ArenaId,
    user_id: UserId,
    outbound: mpsc::Sender<Outbound>,
    shutdown: CancellationToken,
}

impl Subscription {
    /// Creates a subscription with a fresh ID.
    #[must_use]
    pub fn new(
        arena_id: ArenaId,
        user_id: UserId,
        outbound: mpsc::Sender<Outbound>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id: SubscriptionId::new(),
            arena_id,
            user_id,
            outbound,
            shutdown,
        }
    }

    /// Subscription identifier.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Arena this subscription belongs to.
    #[must_use]
    pub const fn arena_id(&self) -> ArenaId {
        self.arena_id
    }

    /// User behind the connection.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Enqueues a frame without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryFailure`] when the queue is full or closed.
    pub fn try_deliver(&self, frame: Outbound) -> Result<(), DeliveryFailure> {
        self.outbound.try_send(frame).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => DeliveryFailure::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryFailure::Closed,
        })
    }

    /// Signals the connection's tasks to stop.
    pub fn evict(&self) {
        self.shutdown.cancel();
    }

    /// Returns `true` once [`Self::evict`] has been called or the
    /// connection shut itself down.
    #[must_use]
    pub fn is_evicted(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
