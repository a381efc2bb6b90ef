//! Typed error hierarchy for livedesk.
//!
//! Two top-level enums cover the two sides of the wire:
//! - `DeskError`: domain service and store failures on the server
//! - `ClientError`: REST and live-feed failures in the terminal client

use thiserror::Error;
use uuid::Uuid;

/// Errors from the desk service layer.
///
/// `Validation` and the `*NotFound` variants are caller-correctable and map to
/// 4xx responses; everything else is an internal failure.
#[derive(Debug, Error)]
pub enum DeskError {
    #[error("{0}")]
    Validation(String),

    #[error("Agent {id} not found")]
    AgentNotFound { id: Uuid },

    #[error("Ticket {id} not found")]
    TicketNotFound { id: Uuid },

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DeskError {
    pub fn validation(msg: impl Into<String>) -> Self {
        DeskError::Validation(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DeskError::AgentNotFound { .. } | DeskError::TicketNotFound { .. }
        )
    }
}

/// Errors from the terminal client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{message} (HTTP {status})")]
    Api { status: u16, message: String },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Live feed error: {0}")]
    Feed(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Failed to decode server payload: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    /// True when the server rejected the request as invalid input.
    pub fn is_validation(&self) -> bool {
        matches!(self, ClientError::Api { status: 400, .. })
    }
}
