//! WebSocket close codes used by the gateway.

use axum::extract::ws::{CloseFrame, Utf8Bytes};

/// Close codes sent to clients. The 4xxx range is application-defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    /// Normal closure (1000).
    Normal,
    /// Credentials missing, invalid or unknown (4001).
    Unauthorized,
    /// The server ended the connection after an event (4002).
    Abandoned,
    /// The user already has a live connection to the arena (4003).
    DuplicateSession,
    /// The arena does not exist (4004).
    ArenaNotFound,
    /// The store or hub failed during admission (4005).
    Internal,
}

impl CloseCode {
    /// Numeric close code.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::Unauthorized => 4001,
            Self::Abandoned => 4002,
            Self::DuplicateSession => 4003,
            Self::ArenaNotFound => 4004,
            Self::Internal => 4005,
        }
    }

    /// Close reason sent alongside the code.
    #[must_use]
    pub const fn reason(self) -> &'static str {
        match self {
            Self::Normal => "",
            Self::Unauthorized => "unauthorized",
            Self::Abandoned => "abandoned",
            Self::DuplicateSession => "duplicate session",
            Self::ArenaNotFound => "retro not found",
            Self::Internal => "internal error",
        }
    }

    /// Builds the close frame for this code.
    #[must_use]
    pub fn frame(self) -> CloseFrame {
        CloseFrame {
            code: self.code(),
            reason: Utf8Bytes::from_static(self.reason()),
        }
    }
}
