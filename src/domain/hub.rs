//! Arena membership registry and fan-out broadcaster.
//!
//! The [`Hub`] is a handle to a single coordinating task that exclusively
//! owns the arena → subscriptions map. Every read and mutation travels to
//! that task over an `mpsc` channel, so registrations, departures and
//! broadcasts are applied one at a time in the order they were sent.
//!
//! Broadcasts never wait on a subscriber: each subscription's outbound
//! queue is fed with `try_send`. A subscriber whose queue is full (or whose
//! write task is gone) has its shutdown signal triggered and is left for its
//! own read task to unregister, which keeps the departure broadcast on the
//! normal teardown path.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};

use super::subscription::{ArenaMessage, DeliveryFailure, Outbound, Subscription};
use super::{ArenaId, SubscriptionId};

/// Error returned when the coordinating task is no longer running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("hub task has stopped")]
pub struct HubStopped;

/// Snapshot of registry size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Arenas with at least one subscription.
    pub arenas: usize,
    /// Total registered subscriptions.
    pub subscriptions: usize,
}

#[derive(Debug)]
enum HubCommand {
    Register {
        subscription: Subscription,
        reply: oneshot::Sender<()>,
    },
    Unregister {
        arena_id: ArenaId,
        subscription_id: SubscriptionId,
        reply: oneshot::Sender<bool>,
    },
    Broadcast(ArenaMessage),
    Presence {
        arena_id: ArenaId,
        reply: oneshot::Sender<usize>,
    },
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
}

/// Cloneable handle to the hub task.
#[derive(Debug, Clone)]
pub struct Hub {
    commands: mpsc::Sender<HubCommand>,
}

impl Hub {
    /// Spawns the coordinating task and returns a handle to it.
    ///
    /// `capacity` bounds the command channel; callers wait when it is full.
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn start(capacity: usize) -> Self {
        let (commands, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(HubTask::default().run(rx));
        Self { commands }
    }

    /// Adds a subscription to its arena.
    ///
    /// Returns once the hub has applied the registration, so any broadcast
    /// issued afterwards reaches the new subscriber.
    ///
    /// # Errors
    ///
    /// Returns [`HubStopped`] if the hub task is gone.
    pub async fn register(&self, subscription: Subscription) -> Result<(), HubStopped> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Register {
            subscription,
            reply,
        })
        .await?;
        rx.await.map_err(|_| HubStopped)
    }

    /// Removes a subscription.
    ///
    /// Returns `true` if this call removed it and `false` if it was already
    /// absent, which makes repeated calls harmless.
    ///
    /// # Errors
    ///
    /// Returns [`HubStopped`] if the hub task is gone.
    pub async fn unregister(
        &self,
        arena_id: ArenaId,
        subscription_id: SubscriptionId,
    ) -> Result<bool, HubStopped> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Unregister {
            arena_id,
            subscription_id,
            reply,
        })
        .await?;
        rx.await.map_err(|_| HubStopped)
    }

    /// Queues `message` for every subscription of its arena.
    ///
    /// # Errors
    ///
    /// Returns [`HubStopped`] if the hub task is gone.
    pub async fn broadcast(&self, message: ArenaMessage) -> Result<(), HubStopped> {
        self.send(HubCommand::Broadcast(message)).await
    }

    /// Number of live subscriptions in `arena_id`.
    ///
    /// # Errors
    ///
    /// Returns [`HubStopped`] if the hub task is gone.
    pub async fn presence(&self, arena_id: ArenaId) -> Result<usize, HubStopped> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Presence { arena_id, reply }).await?;
        rx.await.map_err(|_| HubStopped)
    }

    /// Returns `true` if `arena_id` has at least one live subscription.
    ///
    /// # Errors
    ///
    /// Returns [`HubStopped`] if the hub task is gone.
    pub async fn is_active(&self, arena_id: ArenaId) -> Result<bool, HubStopped> {
        Ok(self.presence(arena_id).await? > 0)
    }

    /// Registry size across all arenas.
    ///
    /// # Errors
    ///
    /// Returns [`HubStopped`] if the hub task is gone.
    pub async fn stats(&self) -> Result<HubStats, HubStopped> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Stats { reply }).await?;
        rx.await.map_err(|_| HubStopped)
    }

    async fn send(&self, command: HubCommand) -> Result<(), HubStopped> {
        self.commands.send(command).await.map_err(|_| HubStopped)
    }
}

/// State owned by the coordinating task. Nothing else touches it.
#[derive(Debug, Default)]
struct HubTask {
    arenas: HashMap<ArenaId, HashMap<SubscriptionId, Subscription>>,
    index: HashMap<SubscriptionId, ArenaId>,
}

impl HubTask {
    async fn run(mut self, mut rx: mpsc::Receiver<HubCommand>) {
        while let Some(command) = rx.recv().await {
            match command {
                HubCommand::Register {
                    subscription,
                    reply,
                } => {
                    self.register(subscription);
                    let _ = reply.send(());
                }
                HubCommand::Unregister {
                    arena_id,
                    subscription_id,
                    reply,
                } => {
                    let removed = self.unregister(arena_id, subscription_id);
                    let _ = reply.send(removed);
                }
                HubCommand::Broadcast(message) => self.broadcast(&message),
                HubCommand::Presence { arena_id, reply } => {
                    let count = self.arenas.get(&arena_id).map_or(0, HashMap::len);
                    let _ = reply.send(count);
                }
                HubCommand::Stats { reply } => {
                    let _ = reply.send(HubStats {
                        arenas: self.arenas.len(),
                        subscriptions: self.index.len(),
                    });
                }
            }
        }
        tracing::debug!("hub task stopped");
    }

    fn register(&mut self, subscription: Subscription) {
        let id = subscription.id();
        let arena_id = subscription.arena_id();

        // A subscription lives in exactly one arena.
        if let Some(previous) = self.index.get(&id).copied()
            && previous != arena_id
        {
            self.unregister(previous, id);
        }

        self.index.insert(id, arena_id);
        self.arenas
            .entry(arena_id)
            .or_default()
            .insert(id, subscription);
        tracing::debug!(%arena_id, subscription_id = %id, "subscription registered");
    }

    fn unregister(&mut self, arena_id: ArenaId, subscription_id: SubscriptionId) -> bool {
        let Some(members) = self.arenas.get_mut(&arena_id) else {
            return false;
        };
        let removed = members.remove(&subscription_id).is_some();
        if members.is_empty() {
            self.arenas.remove(&arena_id);
        }
        if removed {
            self.index.remove(&subscription_id);
            tracing::debug!(%arena_id, %subscription_id, "subscription unregistered");
        }
        removed
    }

    fn broadcast(&self, message: &ArenaMessage) {
        let Some(members) = self.arenas.get(&message.arena_id) else {
            return;
        };
        for subscription in members.values() {
            if subscription.is_evicted() {
                continue;
            }
            match subscription.try_deliver(Outbound::Text(message.payload.clone())) {
                Ok(()) => {}
                Err(DeliveryFailure::Full) => {
                    tracing::warn!(
                        arena_id = %message.arena_id,
                        subscription_id = %subscription.id(),
                        user_id = %subscription.user_id(),
                        "outbound queue full, evicting slow subscriber"
                    );
                    subscription.evict();
                }
                Err(DeliveryFailure::Closed) => {
                    subscription.evict();
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::domain::UserId;

    fn subscribe(arena_id: ArenaId, capacity: usize) -> (Subscription, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity);
        let sub = Subscription::new(arena_id, UserId::new(), tx, CancellationToken::new());
        (sub, rx)
    }

    fn text(frame: Option<Outbound>) -> String {
        match frame {
            Some(Outbound::Text(t)) => t.as_str().to_string(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    async fn drain(hub: &Hub) {
        // Any round-trip command runs after every command queued before it.
        let _ = hub.stats().await;
    }

    #[tokio::test]
    async fn broadcast_reaches_only_its_arena() {
        let hub = Hub::start(16);
        let arena_a = ArenaId::new();
        let arena_b = ArenaId::new();
        let (sub_a, mut rx_a) = subscribe(arena_a, 8);
        let (sub_b, mut rx_b) = subscribe(arena_b, 8);
        assert!(hub.register(sub_a).await.is_ok());
        assert!(hub.register(sub_b).await.is_ok());

        assert!(hub.broadcast(ArenaMessage::new(arena_a, "for-a")).await.is_ok());
        drain(&hub).await;

        assert_eq!(text(rx_a.recv().await), "for-a");
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let hub = Hub::start(16);
        let arena = ArenaId::new();
        let (sub, _rx) = subscribe(arena, 8);
        let id = sub.id();
        assert!(hub.register(sub).await.is_ok());

        assert_eq!(hub.unregister(arena, id).await, Ok(true));
        assert_eq!(hub.unregister(arena, id).await, Ok(false));
        assert_eq!(hub.stats().await, Ok(HubStats::default()));
    }

    #[tokio::test]
    async fn no_delivery_after_unregister() {
        let hub = Hub::start(16);
        let arena = ArenaId::new();
        let (sub, mut rx) = subscribe(arena, 8);
        let id = sub.id();
        assert!(hub.register(sub).await.is_ok());
        assert_eq!(hub.unregister(arena, id).await, Ok(true));

        assert!(hub.broadcast(ArenaMessage::new(arena, "late")).await.is_ok());
        drain(&hub).await;
        // The hub dropped its sender on unregister, so the queue is closed
        // and empty.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn preserves_broadcast_order_per_arena() {
        let hub = Hub::start(64);
        let arena = ArenaId::new();
        let (sub, mut rx) = subscribe(arena, 64);
        assert!(hub.register(sub).await.is_ok());

        for n in 0..20 {
            assert!(hub.broadcast(ArenaMessage::new(arena, n.to_string())).await.is_ok());
        }
        drain(&hub).await;

        for n in 0..20 {
            assert_eq!(text(rx.recv().await), n.to_string());
        }
    }

    #[tokio::test]
    async fn slow_subscriber_is_evicted_without_stalling_others() {
        let hub = Hub::start(16);
        let arena = ArenaId::new();
        let (slow, _slow_rx) = subscribe(arena, 1);
        let slow_handle = slow.clone();
        let (fast, mut fast_rx) = subscribe(arena, 8);
        assert!(hub.register(slow).await.is_ok());
        assert!(hub.register(fast).await.is_ok());

        for payload in ["one", "two", "three"] {
            assert!(hub.broadcast(ArenaMessage::new(arena, payload)).await.is_ok());
        }
        drain(&hub).await;

        assert!(slow_handle.is_evicted());
        assert_eq!(text(fast_rx.recv().await), "one");
        assert_eq!(text(fast_rx.recv().await), "two");
        assert_eq!(text(fast_rx.recv().await), "three");
        // Eviction leaves the entry for the owning read task to remove.
        assert_eq!(hub.presence(arena).await, Ok(2));
    }

    #[tokio::test]
    async fn presence_and_stats_track_registrations() {
        let hub = Hub::start(16);
        let arena = ArenaId::new();
        assert_eq!(hub.is_active(arena).await, Ok(false));

        let (first, _rx1) = subscribe(arena, 4);
        let (second, _rx2) = subscribe(arena, 4);
        assert!(hub.register(first).await.is_ok());
        assert!(hub.register(second).await.is_ok());

        assert_eq!(hub.is_active(arena).await, Ok(true));
        assert_eq!(
            hub.stats().await,
            Ok(HubStats {
                arenas: 1,
                subscriptions: 2
            })
        );
    }

    #[tokio::test]
    async fn unregister_with_wrong_arena_is_a_no_op() {
        let hub = Hub::start(16);
        let arena = ArenaId::new();
        let (sub, _rx) = subscribe(arena, 4);
        let id = sub.id();
        assert!(hub.register(sub).await.is_ok());

        assert_eq!(hub.unregister(ArenaId::new(), id).await, Ok(false));
        assert_eq!(hub.presence(arena).await, Ok(1));
    }

    #[tokio::test]
    async fn closed_queue_triggers_eviction() {
        let hub = Hub::start(16);
        let arena = ArenaId::new();
        let (sub, rx) = subscribe(arena, 4);
        let handle = sub.clone();
        assert!(hub.register(sub).await.is_ok());
        drop(rx);

        assert!(hub.broadcast(ArenaMessage::new(arena, "x")).await.is_ok());
        drain(&hub).await;
        assert!(handle.is_evicted());
    }
}
