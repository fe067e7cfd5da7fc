//! Arena service: event routing, permission checks and presence changes.

use std::sync::Arc;

use crate::domain::{Arena, ArenaId, ArenaMessage, Hub, Subscription, UserId};
use crate::error::GatewayError;
use crate::store::{ArenaStore, StoreError};

use super::event::{ArenaEvent, EventError, EventOutcome, SocketEvent};

/// Orchestration layer between connections, the store and the hub.
///
/// Stateless coordinator: every decision re-reads the store, every
/// broadcast goes through the [`Hub`]. Connection-origin events and
/// injected events run through the same [`ArenaService::execute`], so the
/// two paths produce identical payloads for identical store state.
#[derive(Debug, Clone)]
pub struct ArenaService {
    store: Arc<dyn ArenaStore>,
    hub: Hub,
}

impl ArenaService {
    /// Creates a new `ArenaService`.
    #[must_use]
    pub fn new(store: Arc<dyn ArenaStore>, hub: Hub) -> Self {
        Self { store, hub }
    }

    /// Returns the backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ArenaStore> {
        &self.store
    }

    /// Returns the hub handle.
    #[must_use]
    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Decodes and applies an inbound `(type, value)` pair.
    ///
    /// Ownership is confirmed from the type alone, before the payload is
    /// decoded, so a non-owner never learns whether an owner-only payload
    /// was well formed.
    ///
    /// # Errors
    ///
    /// See [`ArenaEvent::parse`] and [`ArenaService::execute`].
    pub async fn handle(
        &self,
        arena_id: ArenaId,
        user_id: UserId,
        kind: &str,
        value: &str,
    ) -> Result<EventOutcome, EventError> {
        if let Some(owner_kind) = ArenaEvent::owner_only(kind) {
            self.confirm_owner(arena_id, user_id, owner_kind).await?;
        }
        let event = ArenaEvent::parse(kind, value)?;
        self.apply(arena_id, user_id, &event).await
    }

    /// Applies `event` on behalf of `user_id`.
    ///
    /// Owner-only events are checked against the store before anything is
    /// mutated.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::PermissionDenied`] when a non-owner sends an
    /// owner-only event and [`EventError::Store`] when the store refuses
    /// the operation.
    pub async fn execute(
        &self,
        arena_id: ArenaId,
        user_id: UserId,
        event: &ArenaEvent,
    ) -> Result<EventOutcome, EventError> {
        if event.is_owner_only() {
            self.confirm_owner(arena_id, user_id, event.kind()).await?;
        }
        self.apply(arena_id, user_id, event).await
    }

    async fn confirm_owner(
        &self,
        arena_id: ArenaId,
        user_id: UserId,
        kind: &'static str,
    ) -> Result<(), EventError> {
        self.store
            .confirm_owner(arena_id, user_id)
            .await
            .map_err(|err| match err {
                StoreError::NotOwner => EventError::PermissionDenied(kind),
                other => EventError::Store(other),
            })
    }

    async fn apply(
        &self,
        arena_id: ArenaId,
        user_id: UserId,
        event: &ArenaEvent,
    ) -> Result<EventOutcome, EventError> {
        let store = self.store.as_ref();
        let outcome = match event {
            ArenaEvent::CreateItem(item) => {
                let items = store
                    .create_item(arena_id, user_id, item.kind, &item.content)
                    .await?;
                EventOutcome::broadcast(SocketEvent::json("items_updated", &items, user_id)?)
            }
            ArenaEvent::DeleteItem(target) => {
                let items = store.delete_item(arena_id, user_id, target.id).await?;
                EventOutcome::broadcast(SocketEvent::json("items_updated", &items, user_id)?)
            }
            ArenaEvent::AddAction(action) => {
                let actions = store.add_action(arena_id, &action.content).await?;
                EventOutcome::broadcast(SocketEvent::json("action_updated", &actions, user_id)?)
            }
            ArenaEvent::UpdateAction(update) => {
                let actions = store
                    .update_action(arena_id, update.id, &update.content, update.completed)
                    .await?;
                EventOutcome::broadcast(SocketEvent::json("action_updated", &actions, user_id)?)
            }
            ArenaEvent::DeleteAction(target) => {
                let actions = store.delete_action(arena_id, target.id).await?;
                EventOutcome::broadcast(SocketEvent::json("action_updated", &actions, user_id)?)
            }
            ArenaEvent::AdvancePhase(change) => {
                let arena = store.set_phase(arena_id, change.phase).await?;
                EventOutcome::broadcast(SocketEvent::json("phase_updated", &arena, user_id)?)
            }
            ArenaEvent::PromoteOwner(change) => {
                store.set_owner(arena_id, change.user_id).await?;
                EventOutcome::broadcast(SocketEvent::new(
                    "owner_updated",
                    change.user_id.to_string(),
                    user_id,
                ))
            }
            ArenaEvent::Concede => {
                store.delete_arena(arena_id).await?;
                EventOutcome {
                    broadcast: Some(SocketEvent::new("retro_conceded", "", user_id)),
                    force_close: true,
                }
            }
            ArenaEvent::Abandon => {
                store.abandon_user(arena_id, user_id).await?;
                EventOutcome {
                    broadcast: None,
                    force_close: true,
                }
            }
        };

        tracing::debug!(%arena_id, %user_id, event = event.kind(), "event applied");
        Ok(outcome)
    }

    /// Queues `event` for every subscriber of `arena_id`.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] if the event cannot be encoded or the hub
    /// has stopped.
    pub async fn publish(&self, arena_id: ArenaId, event: &SocketEvent) -> Result<(), GatewayError> {
        let payload = event
            .to_payload()
            .map_err(|err| GatewayError::Internal(err.to_string()))?;
        self.hub
            .broadcast(ArenaMessage::new(arena_id, payload))
            .await?;
        Ok(())
    }

    /// Applies an event injected by a non-realtime collaborator.
    ///
    /// The result is broadcast only when the arena has at least one live
    /// subscription. Forced close does not apply to injected events.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] if the event is rejected, the store fails
    /// or the hub has stopped.
    pub async fn api_event(
        &self,
        arena_id: ArenaId,
        user_id: UserId,
        kind: &str,
        value: &str,
    ) -> Result<(), GatewayError> {
        let outcome = self.handle(arena_id, user_id, kind, value).await?;
        let Some(event) = outcome.broadcast else {
            return Ok(());
        };
        if self.hub.is_active(arena_id).await? {
            self.publish(arena_id, &event).await?;
        } else {
            tracing::debug!(%arena_id, event = kind, "no live subscribers, skipping broadcast");
        }
        Ok(())
    }

    /// Registers an admitted connection and marks its user active.
    ///
    /// Returns the arena as it stands after the user was added. The
    /// registration is rolled back if the store calls fail.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] if the hub has stopped or the store
    /// fails.
    pub async fn enter(&self, subscription: &Subscription) -> Result<Arena, GatewayError> {
        let arena_id = subscription.arena_id();
        let user_id = subscription.user_id();
        self.hub.register(subscription.clone()).await?;

        let joined = async {
            self.store.add_user(arena_id, user_id).await?;
            self.store.arena(arena_id).await
        }
        .await;

        match joined {
            Ok(arena) => {
                tracing::info!(
                    %arena_id,
                    %user_id,
                    subscription_id = %subscription.id(),
                    "user joined"
                );
                Ok(arena)
            }
            Err(err) => {
                let _ = self.hub.unregister(arena_id, subscription.id()).await;
                Err(err.into())
            }
        }
    }

    /// Tears down a subscription.
    ///
    /// Only the call that actually removes the subscription from the hub
    /// retreats the user and broadcasts `user_left`; later calls return
    /// `false` and do nothing else.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] if the hub has stopped.
    pub async fn depart(&self, subscription: &Subscription) -> Result<bool, GatewayError> {
        let arena_id = subscription.arena_id();
        let user_id = subscription.user_id();
        if !self.hub.unregister(arena_id, subscription.id()).await? {
            return Ok(false);
        }

        match self.store.retreat_user(arena_id, user_id).await {
            Ok(users) => {
                let event = SocketEvent::user_left(&users, user_id)
                    .map_err(|err| GatewayError::Internal(err.to_string()))?;
                self.publish(arena_id, &event).await?;
                tracing::info!(%arena_id, %user_id, "user left");
            }
            Err(err) => {
                tracing::warn!(
                    %arena_id,
                    %user_id,
                    error = %err,
                    "retreat failed, skipping user_left"
                );
            }
        }
        Ok(true)
    }
}
