//! Domain layer: identifiers, arena models, subscriptions and the hub.
//!
//! This module contains the server-side model of who is connected where:
//! arena and user snapshots read from the store, the per-connection
//! [`Subscription`], and the [`Hub`] that owns arena membership and fans
//! messages out to subscribers.

pub mod arena;
pub mod hub;
pub mod ids;
pub mod subscription;

pub use arena::{
    Arena, ArenaPhase, ArenaUser, ItemKind, MembershipStatus, RetroAction, RetroItem, User,
    UserKind,
};
pub use hub::{Hub, HubStats, HubStopped};
pub use ids::{ArenaId, SubscriptionId, UserId};
pub use subscription::{ArenaMessage, DeliveryFailure, Outbound, Subscription};
