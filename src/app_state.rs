//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;

use crate::config::GatewayConfig;
use crate::domain::Hub;
use crate::service::ArenaService;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Arena service for event routing and presence.
    pub arena_service: Arc<ArenaService>,
    /// Hub handle, also reachable through the service.
    pub hub: Hub,
    /// Loaded configuration.
    pub config: Arc<GatewayConfig>,
    /// Key verifying signed session and guest cookies.
    pub cookie_key: Key,
}

impl AppState {
    /// Builds the state, deriving the cookie key from the configured
    /// secret.
    ///
    /// A missing or too-short secret falls back to a random key, which
    /// invalidates every cookie issued before a restart.
    #[must_use]
    pub fn new(arena_service: Arc<ArenaService>, config: GatewayConfig) -> Self {
        let cookie_key = cookie_key(config.cookies.secret.as_deref());
        Self {
            hub: arena_service.hub().clone(),
            arena_service,
            config: Arc::new(config),
            cookie_key,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("arena_service", &self.arena_service)
            .field("hub", &self.hub)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

fn cookie_key(secret: Option<&str>) -> Key {
    match secret.map(|s| Key::try_from(s.as_bytes())) {
        Some(Ok(key)) => key,
        Some(Err(_)) => {
            tracing::warn!("COOKIE_SECRET shorter than 64 bytes, using a random cookie key");
            Key::generate()
        }
        None => {
            tracing::warn!("COOKIE_SECRET not set, using a random cookie key");
            Key::generate()
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn long_secret_yields_stable_key() {
        let secret = "k".repeat(64);
        let first = cookie_key(Some(&secret));
        let second = cookie_key(Some(&secret));
        assert_eq!(first.master(), second.master());
    }

    #[test]
    fn short_secret_falls_back_to_random_key() {
        let first = cookie_key(Some("short"));
        let second = cookie_key(Some("short"));
        assert_ne!(first.master(), second.master());
    }
}
