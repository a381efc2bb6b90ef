use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::models::{Agent, Ticket};

// ── Event types ──────────────────────────────────────────────────────

/// A lifecycle event pushed to every live client after a successful commit.
///
/// Wire form is `{"type": "<Variant>", "data": <payload>}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum DeskEvent {
    TicketCreated(Ticket),
    TicketUpdated(Ticket),
    TicketAssigned(Ticket),
    TicketDeleted(Uuid),
    AgentCreated(Agent),
    AgentUpdated(Agent),
    AgentDeleted(AgentRemoval),
    AgentStatusChanged(AgentStatusChange),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentRemoval {
    pub agent_id: Uuid,
    pub unassigned_ticket_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatusChange {
    pub agent: Agent,
    /// Tickets that lost their assignment because the agent was deactivated.
    pub unassigned_ticket_ids: Vec<Uuid>,
}

impl DeskEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::TicketCreated(_) => "TicketCreated",
            Self::TicketUpdated(_) => "TicketUpdated",
            Self::TicketAssigned(_) => "TicketAssigned",
            Self::TicketDeleted(_) => "TicketDeleted",
            Self::AgentCreated(_) => "AgentCreated",
            Self::AgentUpdated(_) => "AgentUpdated",
            Self::AgentDeleted(_) => "AgentDeleted",
            Self::AgentStatusChanged(_) => "AgentStatusChanged",
        }
    }
}

// ── Sinks ────────────────────────────────────────────────────────────

/// Where services send events once their transaction has committed.
/// Publishing is fire-and-forget and must not fail the caller.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: DeskEvent);
}

/// Fans events out to every WebSocket connection subscribed to `tx`.
#[derive(Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<String>,
}

impl BroadcastSink {
    pub fn new(tx: broadcast::Sender<String>) -> Self {
        Self { tx }
    }
}

impl EventSink for BroadcastSink {
    fn publish(&self, event: DeskEvent) {
        match serde_json::to_string(&event) {
            Ok(json) => {
                // No receivers is not an error; nobody is watching.
                let delivered = self.tx.send(json).unwrap_or(0);
                tracing::debug!(event = event.name(), receivers = delivered, "broadcast event");
            }
            Err(e) => {
                tracing::error!(event = event.name(), error = %e, "failed to serialize event");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Sink that keeps every published event for assertions.
    #[derive(Default)]
    pub struct RecordingSink {
        events: Mutex<Vec<DeskEvent>>,
    }

    impl RecordingSink {
        pub fn events(&self) -> Vec<DeskEvent> {
            self.events.lock().unwrap().clone()
        }

        pub fn names(&self) -> Vec<&'static str> {
            self.events().iter().map(DeskEvent::name).collect()
        }
    }

    impl EventSink for RecordingSink {
        fn publish(&self, event: DeskEvent) {
            self.events.lock().unwrap().push(event);
        }
    }
}
