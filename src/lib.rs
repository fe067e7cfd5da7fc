//! # retro-gateway
//!
//! Real-time WebSocket gateway for collaborative retrospective boards
//! ("arenas").
//!
//! Participants connect over a WebSocket, are admitted by a cookie-based
//! connection gate and an optional join-code challenge, send typed events,
//! and receive every state change in their arena as it happens. Arena state
//! lives in the store; the gateway only routes.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket, HTTP injection)
//!     │
//!     ├── WS Handler + Gate (ws/)
//!     ├── REST Handlers (api/)
//!     │
//!     ├── ArenaService (service/)
//!     ├── Hub actor (domain/)
//!     │
//!     └── ArenaStore: PostgreSQL or in-memory (store/)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod server;
pub mod service;
pub mod store;
pub mod ws;
