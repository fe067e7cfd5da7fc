//! WebSocket layer: admission, sessions, frame decoding.
//!
//! The endpoint at `/ws/arenas/{arena_id}` admits one participant per
//! connection and streams every broadcast for that arena to it.

pub mod close_code;
pub mod connection;
pub mod gate;
pub mod handler;
pub mod messages;

pub use close_code::CloseCode;
pub use handler::ws_handler;
