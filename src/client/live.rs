//! Live event feed.
//!
//! `run_feed` holds one WebSocket connection to the desk server, turns each
//! text frame into an [`Action::Event`], and reconnects with capped
//! exponential backoff until the receiving side of the channel goes away.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::store::{Action, ConnectionStatus};
use crate::desk::events::DeskEvent;

pub const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Doubling reconnect delay, capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(INITIAL_BACKOFF, MAX_BACKOFF)
    }
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay to wait now; the following call returns twice as much, up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Decode one text frame. Frames that are not a known event are dropped.
pub fn decode_frame(text: &str) -> Option<Action> {
    match serde_json::from_str::<DeskEvent>(text) {
        Ok(event) => Some(Action::Event(event)),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring undecodable live frame");
            None
        }
    }
}

/// Run the feed until `tx` is closed.
pub async fn run_feed(url: String, tx: mpsc::Sender<Action>, mut backoff: Backoff) {
    loop {
        if tx.is_closed() {
            return;
        }

        match connect_async(url.as_str()).await {
            Ok((mut stream, _response)) => {
                tracing::info!(%url, "live feed connected");
                backoff.reset();
                if tx
                    .send(Action::ConnectionChanged(ConnectionStatus::Connected))
                    .await
                    .is_err()
                {
                    return;
                }

                while let Some(frame) = stream.next().await {
                    match frame {
                        Ok(Message::Text(text)) => {
                            if let Some(action) = decode_frame(text.as_str())
                                && tx.send(action).await.is_err()
                            {
                                return;
                            }
                        }
                        Ok(Message::Close(_)) => break,
                        // Pings are answered by tungstenite on the next read.
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!(error = %e, "live feed read failed");
                            break;
                        }
                    }
                }
                tracing::info!("live feed disconnected");
            }
            Err(e) => {
                tracing::debug!(error = %e, %url, "live feed connect failed");
            }
        }

        if tx
            .send(Action::ConnectionChanged(ConnectionStatus::Disconnected))
            .await
            .is_err()
        {
            return;
        }
        tokio::time::sleep(backoff.next_delay()).await;
    }
}
