use std::time::Duration;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::broadcast;
use tokio::time::Instant;

use super::api::SharedState;

/// Ping cadence and dead-peer cutoff for live connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keepalive {
    /// How often to send WebSocket Ping frames.
    pub ping_interval: Duration,
    /// How long to wait for a Pong before considering the connection dead.
    pub pong_timeout: Duration,
}

impl Default for Keepalive {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(60),
        }
    }
}

// ── WebSocket handler ────────────────────────────────────────────────

/// Upgrade and join the broadcast group. Leaving happens implicitly when
/// the socket loop ends and the receiver is dropped.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    let rx = state.ws_tx.subscribe();
    let keepalive = state.keepalive;
    ws.on_upgrade(move |socket| handle_socket(socket, rx, keepalive))
}

async fn handle_socket(socket: WebSocket, rx: broadcast::Receiver<String>, keepalive: Keepalive) {
    tracing::debug!("live client connected");
    let (sender, receiver) = socket.split();
    run_socket_loop(sender, receiver, rx, keepalive).await;
    tracing::debug!("live client disconnected");
}

/// Pump one live connection until it closes, errors, or goes quiet.
///
/// Each ping that finds no deadline pending starts one `pong_timeout` from
/// now; any pong clears it. A tick that finds the deadline passed ends the
/// connection. Generic over the socket halves so tests can drive it with
/// in-memory channels.
async fn run_socket_loop<S, R>(
    mut sender: S,
    mut receiver: R,
    mut rx: broadcast::Receiver<String>,
    keepalive: Keepalive,
) where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let start = Instant::now() + keepalive.ping_interval;
    let mut ticker = tokio::time::interval_at(start, keepalive.ping_interval);
    let mut pong_deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            now = ticker.tick() => {
                if pong_deadline.is_some_and(|deadline| now >= deadline) {
                    tracing::debug!("live client missed pong deadline");
                    break;
                }
                if sender.send(Message::Ping(Default::default())).await.is_err() {
                    break;
                }
                pong_deadline.get_or_insert(now + keepalive.pong_timeout);
            }

            frame = rx.recv() => match frame {
                Ok(json) => {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "live client lagged; frames dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },

            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Pong(_))) => pong_deadline = None,
                // Listen-only protocol: text, binary and client pings are dropped.
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    let _ = sender.send(Message::Close(None)).await;
}

// ── Tests ────────────────────────────────────────────────────────────
