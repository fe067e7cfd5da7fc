//! Connection gate and join gate.
//!
//! The connection gate resolves who is connecting (signed session cookie,
//! otherwise signed guest cookie) and where (arena lookup plus membership
//! standing). The join gate challenges callers that are not yet members of
//! a secret-protected arena before they are admitted.

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use tokio::time::Instant;
use axum_extra::extract::cookie::{CookieJar, SignedCookieJar};

use super::close_code::CloseCode;
use super::messages::ClientFrame;
use crate::config::{CookieConfig, SessionConfig};
use crate::domain::{Arena, ArenaId, MembershipStatus, User, UserId};
use crate::service::SocketEvent;
use crate::store::{ArenaStore, StoreError};

/// State of one credential cookie.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CookieValue {
    /// The request carried no such cookie.
    #[default]
    Absent,
    /// The cookie was present but its signature did not verify.
    Invalid,
    /// The verified cookie value.
    Valid(String),
}

impl CookieValue {
    fn read(signed: &SignedCookieJar, plain: &CookieJar, name: &str) -> Self {
        match signed.get(name) {
            Some(cookie) => Self::Valid(cookie.value().to_string()),
            None if plain.get(name).is_some() => Self::Invalid,
            None => Self::Absent,
        }
    }
}

/// Credentials captured from the upgrade request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    session: CookieValue,
    guest: CookieValue,
}

impl Credentials {
    /// Creates credentials from already-verified cookie states.
    #[must_use]
    pub const fn new(session: CookieValue, guest: CookieValue) -> Self {
        Self { session, guest }
    }

    /// Reads both credential cookies from the request jars.
    ///
    /// `plain` only tells a forged cookie apart from a missing one.
    #[must_use]
    pub fn from_jars(signed: &SignedCookieJar, plain: &CookieJar, names: &CookieConfig) -> Self {
        Self {
            session: CookieValue::read(signed, plain, &names.session_cookie),
            guest: CookieValue::read(signed, plain, &names.guest_cookie),
        }
    }
}

/// Why a connection was refused admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GateRejection {
    /// No usable credentials.
    #[error("unauthorized")]
    Unauthorized,
    /// The arena does not exist.
    #[error("arena not found")]
    ArenaNotFound,
    /// The user already has a live connection to the arena.
    #[error("duplicate session")]
    DuplicateSession,
    /// The store failed.
    #[error("internal error")]
    Internal,
    /// The peer disconnected during the join challenge.
    #[error("left during join challenge")]
    Departed,
    /// The peer stopped answering pings during the join challenge.
    #[error("unresponsive during join challenge")]
    Unresponsive,
}

impl GateRejection {
    /// Close code to send, if the peer is still there to receive it.
    #[must_use]
    pub const fn close_code(self) -> Option<CloseCode> {
        match self {
            Self::Unauthorized => Some(CloseCode::Unauthorized),
            Self::ArenaNotFound => Some(CloseCode::ArenaNotFound),
            Self::DuplicateSession => Some(CloseCode::DuplicateSession),
            Self::Internal => Some(CloseCode::Internal),
            Self::Unresponsive => Some(CloseCode::Normal),
            Self::Departed => None,
        }
    }
}

/// Resolves the connecting user.
///
/// A session cookie, when present at all, decides the outcome; the guest
/// cookie is consulted only when there is no session cookie.
///
/// # Errors
///
/// Returns [`GateRejection::Unauthorized`] for missing, forged or unknown
/// credentials and [`GateRejection::Internal`] when the store fails.
pub async fn identify(
    store: &dyn ArenaStore,
    credentials: &Credentials,
) -> Result<User, GateRejection> {
    let lookup = match (&credentials.session, &credentials.guest) {
        (CookieValue::Valid(token), _) => store.session_user(token).await,
        (CookieValue::Invalid, _) => return Err(GateRejection::Unauthorized),
        (CookieValue::Absent, CookieValue::Valid(raw)) => {
            let user_id: UserId = raw.parse().map_err(|_| GateRejection::Unauthorized)?;
            store.guest_user(user_id).await
        }
        (CookieValue::Absent, _) => return Err(GateRejection::Unauthorized),
    };
    lookup.map_err(|err| match err {
        StoreError::Backend(reason) => {
            tracing::error!(error = %reason, "user lookup failed");
            GateRejection::Internal
        }
        _ => GateRejection::Unauthorized,
    })
}

/// Loads the arena named in the request path.
///
/// # Errors
///
/// Returns [`GateRejection::ArenaNotFound`] when the ID is malformed or
/// unknown and [`GateRejection::Internal`] when the store fails.
pub async fn locate(store: &dyn ArenaStore, raw_arena_id: &str) -> Result<Arena, GateRejection> {
    let arena_id: ArenaId = raw_arena_id
        .parse()
        .map_err(|_| GateRejection::ArenaNotFound)?;
    store.arena(arena_id).await.map_err(|err| match err {
        StoreError::Backend(reason) => {
            tracing::error!(%arena_id, error = %reason, "arena lookup failed");
            GateRejection::Internal
        }
        _ => GateRejection::ArenaNotFound,
    })
}

/// Reads the user's standing, refusing a second live connection.
///
/// # Errors
///
/// Returns [`GateRejection::DuplicateSession`] for an already active member
/// and [`GateRejection::Internal`] when the lookup fails.
pub async fn standing(
    store: &dyn ArenaStore,
    arena_id: ArenaId,
    user_id: UserId,
) -> Result<MembershipStatus, GateRejection> {
    match store.membership(arena_id, user_id).await {
        Ok(MembershipStatus::Active) => Err(GateRejection::DuplicateSession),
        Ok(status) => Ok(status),
        Err(err) => {
            tracing::error!(%arena_id, %user_id, error = %err, "membership lookup failed");
            Err(GateRejection::Internal)
        }
    }
}

/// Result of the join challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The correct secret was supplied.
    Admitted,
    /// The peer closed the connection or the transport failed.
    Disconnected,
    /// The peer stopped answering pings.
    Unresponsive,
}

/// What a single frame means to a pending join challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStep {
    /// Correct secret.
    Admit,
    /// `auth_retro` with a wrong secret.
    Incorrect,
    /// Anything else.
    Ignore,
}

/// Classifies one text frame received while challenged.
#[must_use]
pub fn join_step(secret: &str, text: &str) -> JoinStep {
    match ClientFrame::decode(text) {
        Ok(frame) if frame.is_auth_with(secret) => JoinStep::Admit,
        Ok(frame) if frame.is_auth() => JoinStep::Incorrect,
        _ => JoinStep::Ignore,
    }
}

/// Runs the join challenge on a not-yet-split socket.
///
/// Attempts are unlimited and there is no limit on how long the peer may
/// take to answer. The session heartbeat runs meanwhile: a ping every
/// ping period, and the challenge ends only when no pong arrives within
/// the pong-wait window.
pub async fn challenge(
    socket: &mut WebSocket,
    secret: &str,
    user_id: UserId,
    session: &SessionConfig,
) -> JoinOutcome {
    let write_wait = session.write_wait;
    if !send_event(socket, &SocketEvent::join_code_required(user_id), write_wait).await {
        return JoinOutcome::Disconnected;
    }

    let period = session.ping_period();
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    let mut deadline = Instant::now() + session.pong_wait;

    loop {
        let read = tokio::select! {
            read = tokio::time::timeout_at(deadline, socket.recv()) => Some(read),
            _ = ticker.tick() => None,
        };
        let Some(read) = read else {
            let ping = tokio::time::timeout(write_wait, socket.send(Message::Ping(Bytes::new())));
            if !matches!(ping.await, Ok(Ok(()))) {
                return JoinOutcome::Disconnected;
            }
            continue;
        };
        let message = match read {
            Err(_) => return JoinOutcome::Unresponsive,
            Ok(None | Some(Err(_))) => return JoinOutcome::Disconnected,
            Ok(Some(Ok(message))) => message,
        };
        let text = match message {
            Message::Text(text) => text,
            Message::Pong(_) => {
                deadline = Instant::now() + session.pong_wait;
                continue;
            }
            Message::Close(_) => return JoinOutcome::Disconnected,
            Message::Binary(_) | Message::Ping(_) => continue,
        };
        match join_step(secret, text.as_str()) {
            JoinStep::Admit => return JoinOutcome::Admitted,
            JoinStep::Incorrect => {
                tracing::debug!(%user_id, "incorrect join code");
                let reply = SocketEvent::join_code_incorrect(user_id);
                if !send_event(socket, &reply, write_wait).await {
                    return JoinOutcome::Disconnected;
                }
            }
            JoinStep::Ignore => {}
        }
    }
}

/// Runs the whole gate: identity, arena, standing, and the join challenge
/// when the arena is protected and the user has never joined it.
///
/// # Errors
///
/// Returns the [`GateRejection`] that ended admission.
pub async fn admit(
    socket: &mut WebSocket,
    store: &dyn ArenaStore,
    credentials: &Credentials,
    raw_arena_id: &str,
    session: &SessionConfig,
) -> Result<(User, Arena), GateRejection> {
    let user = identify(store, credentials).await?;
    let arena = locate(store, raw_arena_id).await?;
    let status = standing(store, arena.id, user.id).await?;

    if status == MembershipStatus::NotAMember
        && let Some(secret) = arena.join_secret()
    {
        match challenge(socket, secret, user.id, session).await {
            JoinOutcome::Admitted => {}
            JoinOutcome::Disconnected => return Err(GateRejection::Departed),
            JoinOutcome::Unresponsive => return Err(GateRejection::Unresponsive),
        }
    }
    Ok((user, arena))
}

/// Writes one event to a not-yet-split socket. Returns `false` on failure.
pub(crate) async fn send_event(socket: &mut WebSocket, event: &SocketEvent, wait: Duration) -> bool {
    let Ok(payload) = event.to_payload() else {
        return false;
    };
    matches!(
        tokio::time::timeout(wait, socket.send(Message::Text(payload))).await,
        Ok(Ok(()))
    )
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use axum::http::{HeaderMap, HeaderValue, header};
    use axum::response::IntoResponse;
    use axum_extra::extract::cookie::{Cookie, Key};

    use super::*;
    use crate::domain::UserKind;
    use crate::store::{MemoryStore, NewArena};

    async fn store_with_user() -> (MemoryStore, User) {
        let store = MemoryStore::new();
        let user = User {
            id: UserId::new(),
            name: "Ada".to_string(),
            kind: UserKind::Registered,
            avatar: None,
        };
        store.insert_user(user.clone()).await;
        store.insert_session("tok-1", user.id).await;
        (store, user)
    }

    fn valid(value: impl Into<String>) -> CookieValue {
        CookieValue::Valid(value.into())
    }

    #[tokio::test]
    async fn session_cookie_resolves_user() {
        let (store, user) = store_with_user().await;
        let creds = Credentials::new(valid("tok-1"), CookieValue::Absent);
        assert_eq!(identify(&store, &creds).await, Ok(user));
    }

    #[tokio::test]
    async fn guest_cookie_used_only_without_session() {
        let (store, user) = store_with_user().await;
        let creds = Credentials::new(CookieValue::Absent, valid(user.id.to_string()));
        assert_eq!(identify(&store, &creds).await, Ok(user.clone()));

        // An unknown session never falls back to the guest cookie.
        let creds = Credentials::new(valid("stale"), valid(user.id.to_string()));
        assert_eq!(
            identify(&store, &creds).await,
            Err(GateRejection::Unauthorized)
        );
    }

    #[tokio::test]
    async fn forged_or_missing_cookies_are_unauthorized() {
        let (store, user) = store_with_user().await;
        let cases = [
            Credentials::new(CookieValue::Invalid, valid(user.id.to_string())),
            Credentials::new(CookieValue::Absent, CookieValue::Invalid),
            Credentials::new(CookieValue::Absent, valid("not-a-uuid")),
            Credentials::new(CookieValue::Absent, valid(UserId::new().to_string())),
            Credentials::default(),
        ];
        for creds in cases {
            assert_eq!(
                identify(&store, &creds).await,
                Err(GateRejection::Unauthorized),
                "{creds:?}"
            );
        }
    }

    #[tokio::test]
    async fn unknown_or_malformed_arena_is_not_found() {
        let (store, _) = store_with_user().await;
        assert_eq!(
            locate(&store, "nope").await.err(),
            Some(GateRejection::ArenaNotFound)
        );
        assert_eq!(
            locate(&store, &ArenaId::new().to_string()).await.err(),
            Some(GateRejection::ArenaNotFound)
        );
    }

    #[tokio::test]
    async fn active_member_is_a_duplicate_session() {
        let (store, user) = store_with_user().await;
        let arena_id = ArenaId::new();
        store
            .insert_arena(NewArena {
                id: arena_id,
                name: "R3".to_string(),
                owner_id: user.id,
                join_code: None,
            })
            .await;
        assert_eq!(
            standing(&store, arena_id, user.id).await,
            Ok(MembershipStatus::NotAMember)
        );
        let _ = store.add_user(arena_id, user.id).await;
        assert_eq!(
            standing(&store, arena_id, user.id).await,
            Err(GateRejection::DuplicateSession)
        );
        let _ = store.retreat_user(arena_id, user.id).await;
        assert_eq!(
            standing(&store, arena_id, user.id).await,
            Ok(MembershipStatus::Inactive)
        );
    }

    #[test]
    fn join_steps() {
        assert_eq!(
            join_step("7731", r#"{"type":"auth_retro","value":"7731"}"#),
            JoinStep::Admit
        );
        assert_eq!(
            join_step("7731", r#"{"type":"auth_retro","value":"0000"}"#),
            JoinStep::Incorrect
        );
        assert_eq!(
            join_step("7731", r#"{"type":"create_item","value":"7731"}"#),
            JoinStep::Ignore
        );
        assert_eq!(join_step("7731", "garbage"), JoinStep::Ignore);
    }

    #[test]
    fn rejection_codes() {
        assert_eq!(
            GateRejection::Unauthorized.close_code().map(CloseCode::code),
            Some(4001)
        );
        assert_eq!(
            GateRejection::ArenaNotFound.close_code().map(CloseCode::code),
            Some(4004)
        );
        assert_eq!(GateRejection::Departed.close_code(), None);
        assert_eq!(
            GateRejection::Unresponsive.close_code().map(CloseCode::code),
            Some(1000)
        );
    }

    #[test]
    fn jars_distinguish_forged_from_absent() {
        let key = Key::generate();
        let names = CookieConfig::default();
        let signed = SignedCookieJar::new(key.clone())
            .add(Cookie::new(names.guest_cookie.clone(), "guest-1"))
            .into_response();
        let Some(set_cookie) = signed.headers().get(header::SET_COOKIE) else {
            panic!("signed jar must emit Set-Cookie");
        };
        let Ok(set_cookie) = set_cookie.to_str() else {
            panic!("header must be ascii");
        };
        let Some(pair) = set_cookie.split(';').next() else {
            panic!("cookie pair missing");
        };

        let mut headers = HeaderMap::new();
        let Ok(value) = HeaderValue::from_str(&format!("{pair}; sessionId=forged")) else {
            panic!("bad header");
        };
        headers.insert(header::COOKIE, value);

        let creds = Credentials::from_jars(
            &SignedCookieJar::from_headers(&headers, key),
            &CookieJar::from_headers(&headers),
            &names,
        );
        assert_eq!(
            creds,
            Credentials::new(CookieValue::Invalid, valid("guest-1"))
        );
    }
}
