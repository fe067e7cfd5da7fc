//! Shared harness: an in-memory gateway on a random port plus WebSocket
//! helpers.

#![allow(dead_code, clippy::panic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header;
use axum::response::IntoResponse;
use axum_extra::extract::cookie::{Cookie, Key, SignedCookieJar};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use retro_gateway::app_state::AppState;
use retro_gateway::config::GatewayConfig;
use retro_gateway::domain::{ArenaId, Hub, User, UserId, UserKind};
use retro_gateway::server::build_app;
use retro_gateway::service::ArenaService;
use retro_gateway::store::{ArenaStore, MemoryStore, NewArena};

/// Client side of a test connection.
pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Injection key configured on every test server.
pub const API_KEY: &str = "test-api-key";

/// How long a test waits for an expected frame.
pub const FRAME_WAIT: Duration = Duration::from_secs(5);

/// A running gateway backed by a [`MemoryStore`].
pub struct TestServer {
    /// Bound address.
    pub addr: SocketAddr,
    /// Store shared with the server, for seeding and inspection.
    pub store: Arc<MemoryStore>,
    key: Key,
}

impl TestServer {
    /// Starts a server with the default heartbeat.
    pub async fn spawn() -> Self {
        Self::spawn_with_pong_wait(Duration::from_secs(60)).await
    }

    /// Starts a server with a custom pong-wait window.
    pub async fn spawn_with_pong_wait(pong_wait: Duration) -> Self {
        let Ok(mut config) = GatewayConfig::from_lookup(|_| None) else {
            panic!("default config must load");
        };
        config.cookies.secret = Some("retro-gateway-test-secret-".repeat(4));
        config.event_api_key = Some(API_KEY.to_string());
        config.session.pong_wait = pong_wait;
        config.session.write_wait = Duration::from_secs(2);

        let store = Arc::new(MemoryStore::new());
        let dyn_store: Arc<dyn ArenaStore> = Arc::clone(&store) as Arc<dyn ArenaStore>;
        let service = Arc::new(ArenaService::new(dyn_store, Hub::start(1024)));
        let state = AppState::new(service, config);
        let key = state.cookie_key.clone();

        let Ok(listener) = TcpListener::bind("127.0.0.1:0").await else {
            panic!("bind failed");
        };
        let Ok(addr) = listener.local_addr() else {
            panic!("no local addr");
        };
        let app = build_app(state);
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, store, key }
    }

    /// Base URL for HTTP requests.
    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Seeds a guest user.
    pub async fn guest(&self, name: &str) -> User {
        let user = User {
            id: UserId::new(),
            name: name.to_string(),
            kind: UserKind::Guest,
            avatar: None,
        };
        self.store.insert_user(user.clone()).await;
        user
    }

    /// Seeds an arena led by `owner`.
    pub async fn arena(&self, owner: &User, join_code: Option<&str>) -> ArenaId {
        let id = ArenaId::new();
        self.store
            .insert_arena(NewArena {
                id,
                name: "Sprint review".to_string(),
                owner_id: owner.id,
                join_code: join_code.map(str::to_string),
            })
            .await;
        id
    }

    /// `Cookie` header value carrying a signed guest cookie.
    pub fn guest_cookie(&self, user_id: UserId) -> String {
        self.signed_cookie("userId", &user_id.to_string())
    }

    /// `Cookie` header value carrying a signed cookie `name=value`.
    pub fn signed_cookie(&self, name: &str, value: &str) -> String {
        let response = SignedCookieJar::new(self.key.clone())
            .add(Cookie::new(name.to_string(), value.to_string()))
            .into_response();
        let Some(set_cookie) = response.headers().get(header::SET_COOKIE) else {
            panic!("no Set-Cookie");
        };
        let Ok(set_cookie) = set_cookie.to_str() else {
            panic!("Set-Cookie not ascii");
        };
        let Some(pair) = set_cookie.split(';').next() else {
            panic!("empty Set-Cookie");
        };
        pair.to_string()
    }

    /// Opens a WebSocket to `arena_id` with an optional `Cookie` header.
    pub async fn connect(&self, arena_id: &str, cookie: Option<&str>) -> Client {
        let url = format!("ws://{}/ws/arenas/{arena_id}", self.addr);
        let Ok(mut request) = url.into_client_request() else {
            panic!("bad ws url");
        };
        if let Some(cookie) = cookie {
            let Ok(value) = HeaderValue::from_str(cookie) else {
                panic!("bad cookie header");
            };
            request.headers_mut().insert("cookie", value);
        }
        let Ok((client, _)) = connect_async(request).await else {
            panic!("ws connect failed");
        };
        client
    }

    /// Connects `user` as a guest and consumes the admission frames
    /// (`init` followed by the user's own `user_joined`).
    pub async fn join(&self, arena_id: ArenaId, user: &User) -> Client {
        let cookie = self.guest_cookie(user.id);
        let mut client = self.connect(&arena_id.to_string(), Some(&cookie)).await;
        let init = next_event(&mut client).await;
        assert_eq!(init["type"], "init");
        let joined = next_event(&mut client).await;
        assert_eq!(joined["type"], "user_joined");
        client
    }
}

/// Sends `{"type", "value"}`.
pub async fn send_event(client: &mut Client, kind: &str, value: &str) {
    let frame = serde_json::json!({ "type": kind, "value": value }).to_string();
    if client.send(Message::text(frame)).await.is_err() {
        panic!("send failed");
    }
}

/// Waits for the next text frame and decodes it. Control frames are skipped.
pub async fn next_event(client: &mut Client) -> serde_json::Value {
    loop {
        let Ok(next) = tokio::time::timeout(FRAME_WAIT, client.next()).await else {
            panic!("timed out waiting for a frame");
        };
        match next {
            Some(Ok(Message::Text(text))) => {
                let Ok(json) = serde_json::from_str(text.as_str()) else {
                    panic!("frame is not json: {text}");
                };
                return json;
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            other => panic!("expected a text frame, got {other:?}"),
        }
    }
}

/// Reads until a close frame arrives and returns its code. Text frames
/// before it are returned too, in order.
pub async fn read_until_close(client: &mut Client) -> (Vec<serde_json::Value>, u16) {
    let mut events = Vec::new();
    loop {
        let Ok(next) = tokio::time::timeout(FRAME_WAIT, client.next()).await else {
            panic!("timed out waiting for close");
        };
        match next {
            Some(Ok(Message::Text(text))) => {
                let Ok(json) = serde_json::from_str(text.as_str()) else {
                    panic!("frame is not json: {text}");
                };
                events.push(json);
            }
            Some(Ok(Message::Close(Some(frame)))) => return (events, u16::from(frame.code)),
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            other => panic!("expected a close frame, got {other:?}"),
        }
    }
}

/// Asserts that no text frame arrives within `window`.
pub async fn expect_silence(client: &mut Client, window: Duration) {
    let deadline = tokio::time::Instant::now() + window;
    loop {
        match tokio::time::timeout_at(deadline, client.next()).await {
            Err(_) => return,
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => {}
            Ok(other) => panic!("expected silence, got {other:?}"),
        }
    }
}
