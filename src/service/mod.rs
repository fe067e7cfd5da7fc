//! Service layer: event routing and presence orchestration.
//!
//! [`ArenaService`] decodes and authorizes events, applies them through the
//! store, and hands results to the [`super::domain::Hub`] for fan-out.

pub mod arena_service;
pub mod event;

pub use arena_service::ArenaService;
pub use event::{ArenaEvent, EventError, EventOutcome, SocketEvent};
