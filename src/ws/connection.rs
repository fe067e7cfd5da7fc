//! WebSocket session: admission, read task, write task and teardown.
//!
//! After the gate admits a connection the socket is split. The write half
//! moves into a write task that drains the connection's outbound queue and
//! sends pings; the read half stays with the read task, which decodes
//! events, enforces the pong deadline and owns teardown. The two tasks share
//! nothing but the outbound queue and a [`CancellationToken`].

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::close_code::CloseCode;
use super::gate::{self, Credentials, GateRejection};
use super::messages::ClientFrame;
use crate::config::SessionConfig;
use crate::domain::{Outbound, Subscription, User};
use crate::service::{ArenaService, EventError, SocketEvent};

/// Why the read task stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    /// The peer closed the connection or the transport failed.
    Disconnected,
    /// No pong arrived within the pong-wait window.
    TimedOut,
    /// The hub or the write task triggered the shutdown signal.
    Evicted,
    /// An event asked for the connection to be closed.
    Forced,
}

#[derive(Debug, thiserror::Error)]
enum WriteError {
    #[error("transport: {0}")]
    Transport(#[from] axum::Error),
    #[error("write deadline elapsed")]
    TimedOut,
}

/// Runs one connection from upgrade to teardown.
pub async fn run_connection(
    mut socket: WebSocket,
    service: Arc<ArenaService>,
    credentials: Credentials,
    raw_arena_id: String,
    config: SessionConfig,
) {
    let admitted = gate::admit(
        &mut socket,
        service.store().as_ref(),
        &credentials,
        &raw_arena_id,
        &config,
    )
    .await;
    let (user, arena) = match admitted {
        Ok(admitted) => admitted,
        Err(rejection) => {
            reject(socket, rejection, &raw_arena_id, config.write_wait).await;
            return;
        }
    };

    let (outbound, queue) = mpsc::channel(config.outbound_capacity.max(1));
    let shutdown = CancellationToken::new();
    let subscription = Subscription::new(arena.id, user.id, outbound, shutdown.clone());

    let arena = match service.enter(&subscription).await {
        Ok(arena) => arena,
        Err(err) => {
            tracing::error!(
                arena_id = %arena.id,
                user_id = %user.id,
                error = %err,
                "admission failed"
            );
            reject(socket, GateRejection::Internal, &raw_arena_id, config.write_wait).await;
            return;
        }
    };

    // `init` goes straight to the socket so it precedes anything queued.
    let init_sent = match SocketEvent::init(&arena, user.id) {
        Ok(init) => gate::send_event(&mut socket, &init, config.write_wait).await,
        Err(err) => {
            tracing::error!(arena_id = %arena.id, error = %err, "failed to encode init");
            false
        }
    };
    if !init_sent {
        if let Err(err) = service.depart(&subscription).await {
            tracing::error!(
                arena_id = %arena.id,
                user_id = %user.id,
                error = %err,
                "departure failed"
            );
        }
        return;
    }

    match SocketEvent::user_joined(&arena.users, user.id) {
        Ok(joined) => {
            if let Err(err) = service.publish(arena.id, &joined).await {
                tracing::error!(arena_id = %arena.id, error = %err, "failed to announce join");
            }
        }
        Err(err) => {
            tracing::error!(arena_id = %arena.id, error = %err, "failed to encode user_joined");
        }
    }

    let (sink, stream) = socket.split();
    let mut writer = tokio::spawn(write_loop(sink, queue, shutdown.clone(), config));

    let session = Session {
        service: service.as_ref(),
        subscription: &subscription,
        user: &user,
        shutdown: &shutdown,
        config,
    };
    let exit = session.read_loop(stream).await;
    tracing::debug!(arena_id = %arena.id, user_id = %user.id, ?exit, "read task stopped");

    // Teardown. Departure runs first so a forced close follows any
    // broadcast the closing event produced.
    if let Err(err) = service.depart(&subscription).await {
        tracing::error!(
            arena_id = %arena.id,
            user_id = %user.id,
            error = %err,
            "departure failed"
        );
    }
    let code = if exit == Exit::Forced {
        CloseCode::Abandoned
    } else {
        CloseCode::Normal
    };
    if exit == Exit::Evicted || subscription.try_deliver(Outbound::Close(code.frame())).is_err() {
        shutdown.cancel();
    }
    drop(subscription);
    if tokio::time::timeout(config.write_wait, &mut writer).await.is_err() {
        shutdown.cancel();
        let _ = writer.await;
    }
}

async fn reject(
    mut socket: WebSocket,
    rejection: GateRejection,
    raw_arena_id: &str,
    wait: Duration,
) {
    tracing::warn!(arena_id = raw_arena_id, %rejection, "connection rejected");
    if let Some(code) = rejection.close_code() {
        let _ = tokio::time::timeout(wait, socket.send(Message::Close(Some(code.frame())))).await;
    }
}

struct Session<'a> {
    service: &'a ArenaService,
    subscription: &'a Subscription,
    user: &'a User,
    shutdown: &'a CancellationToken,
    config: SessionConfig,
}

impl Session<'_> {
    async fn read_loop(&self, mut stream: SplitStream<WebSocket>) -> Exit {
        let mut deadline = Instant::now() + self.config.pong_wait;
        loop {
            let read = tokio::select! {
                () = self.shutdown.cancelled() => return Exit::Evicted,
                read = tokio::time::timeout_at(deadline, stream.next()) => read,
            };
            let message = match read {
                Err(_) => return Exit::TimedOut,
                Ok(None) => return Exit::Disconnected,
                Ok(Some(Err(err))) => {
                    tracing::debug!(user_id = %self.user.id, error = %err, "read failed");
                    return Exit::Disconnected;
                }
                Ok(Some(Ok(message))) => message,
            };
            match message {
                Message::Text(text) => {
                    if self.dispatch(text.as_str()).await {
                        return Exit::Forced;
                    }
                }
                Message::Pong(_) => deadline = Instant::now() + self.config.pong_wait,
                Message::Close(_) => return Exit::Disconnected,
                Message::Binary(_) | Message::Ping(_) => {}
            }
        }
    }

    /// Handles one text frame. Returns `true` when the connection must close.
    async fn dispatch(&self, text: &str) -> bool {
        let arena_id = self.subscription.arena_id();
        let user_id = self.user.id;

        let result = match ClientFrame::decode(text) {
            Ok(frame) => {
                self.service
                    .handle(arena_id, user_id, &frame.kind, &frame.value)
                    .await
            }
            Err(err) => Err(EventError::Malformed {
                kind: "frame".to_string(),
                reason: err.to_string(),
            }),
        };

        match result {
            Ok(outcome) => {
                if let Some(event) = outcome.broadcast
                    && let Err(err) = self.service.publish(arena_id, &event).await
                {
                    tracing::error!(%arena_id, error = %err, "broadcast failed");
                }
                outcome.force_close
            }
            Err(err) if err.is_rejection() => {
                tracing::warn!(%arena_id, %user_id, error = %err, "event rejected");
                self.reply(&SocketEvent::rejected(&err, user_id));
                false
            }
            Err(err @ EventError::PermissionDenied(_)) => {
                tracing::warn!(%arena_id, %user_id, error = %err, "permission denied");
                false
            }
            Err(err) => {
                tracing::error!(%arena_id, %user_id, error = %err, "event failed");
                false
            }
        }
    }

    /// Queues an event for this connection only.
    fn reply(&self, event: &SocketEvent) {
        let Ok(payload) = event.to_payload() else {
            return;
        };
        if self
            .subscription
            .try_deliver(Outbound::Text(payload))
            .is_err()
        {
            tracing::debug!(user_id = %self.user.id, "reply dropped, outbound queue unavailable");
        }
    }
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut queue: mpsc::Receiver<Outbound>,
    shutdown: CancellationToken,
    config: SessionConfig,
) {
    let period = config.ping_period();
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);

    loop {
        let message = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            frame = queue.recv() => match frame {
                Some(Outbound::Text(text)) => Message::Text(text),
                Some(Outbound::Close(frame)) => {
                    let close = Message::Close(Some(frame));
                    let _ = write_frame(&mut sink, close, config.write_wait).await;
                    break;
                }
                None => {
                    let close = Message::Close(Some(CloseCode::Normal.frame()));
                    let _ = write_frame(&mut sink, close, config.write_wait).await;
                    break;
                }
            },
            _ = ticker.tick() => Message::Ping(Bytes::new()),
        };

        if let Err(err) = write_frame(&mut sink, message, config.write_wait).await {
            tracing::debug!(error = %err, "write failed");
            shutdown.cancel();
            break;
        }
    }
}

async fn write_frame(
    sink: &mut SplitSink<WebSocket, Message>,
    message: Message,
    wait: Duration,
) -> Result<(), WriteError> {
    match tokio::time::timeout(wait, sink.send(message)).await {
        Ok(result) => result.map_err(WriteError::from),
        Err(_) => Err(WriteError::TimedOut),
    }
}
