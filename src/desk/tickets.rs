use std::sync::Arc;

use uuid::Uuid;

use super::db::{DbHandle, DeskDb};
use super::events::{DeskEvent, EventSink};
use super::models::*;
use super::validation::{validate_new_ticket, validate_patch};
use crate::errors::DeskError;

const ASSIGNEE_UNAVAILABLE: &str = "Assigned agent not found or inactive";
const AGENT_UNAVAILABLE: &str = "Agent not found or inactive";

/// Ticket rules: new tickets start `Open`, assignment targets must be active
/// agents, and every successful mutation publishes exactly one event.
#[derive(Clone)]
pub struct TicketService {
    db: DbHandle,
    events: Arc<dyn EventSink>,
}

impl TicketService {
    pub fn new(db: DbHandle, events: Arc<dyn EventSink>) -> Self {
        Self { db, events }
    }

    /// One page of tickets plus the total under the same filter.
    pub async fn list(&self, filter: TicketFilter, page: PageRequest) -> Result<TicketPage, DeskError> {
        self.db
            .call(move |db| {
                let data = db.list_tickets(&filter, page)?;
                let total = db.count_tickets(&filter)?;
                Ok(TicketPage {
                    data,
                    pagination: page.pagination(total),
                })
            })
            .await
    }

    pub async fn count(&self, filter: TicketFilter) -> Result<i64, DeskError> {
        self.db
            .call(move |db| Ok(db.count_tickets(&filter)?))
            .await
    }

    pub async fn get(&self, id: Uuid) -> Result<Ticket, DeskError> {
        self.db
            .call(move |db| db.get_ticket(id)?.ok_or(DeskError::TicketNotFound { id }))
            .await
    }

    pub async fn create(&self, new: NewTicket) -> Result<Ticket, DeskError> {
        validate_new_ticket(&new)?;
        let ticket = self
            .db
            .call(move |db| {
                db.transaction(|db| {
                    if let Some(agent_id) = new.assigned_agent_id {
                        require_active_agent(db, agent_id, ASSIGNEE_UNAVAILABLE)?;
                    }
                    Ok(db.insert_ticket(&new)?)
                })
            })
            .await?;

        tracing::info!(ticket_id = %ticket.id, priority = %ticket.priority, "ticket created");
        self.events.publish(DeskEvent::TicketCreated(ticket.clone()));
        Ok(ticket)
    }

    /// Partial update. `updatedAt` moves forward even when nothing else changes.
    pub async fn update(&self, id: Uuid, patch: TicketPatch) -> Result<Ticket, DeskError> {
        validate_patch(&patch)?;
        let ticket = self
            .db
            .call(move |db| {
                db.transaction(|db| {
                    if !db.ticket_exists(id)? {
                        return Err(DeskError::TicketNotFound { id });
                    }
                    if let Some(agent_id) = patch.assigned_agent_id {
                        require_active_agent(db, agent_id, ASSIGNEE_UNAVAILABLE)?;
                    }
                    db.update_ticket(id, &patch)?
                        .ok_or(DeskError::TicketNotFound { id })
                })
            })
            .await?;

        tracing::info!(ticket_id = %id, status = %ticket.status, "ticket updated");
        self.events.publish(DeskEvent::TicketUpdated(ticket.clone()));
        Ok(ticket)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), DeskError> {
        let deleted = self.db.call(move |db| Ok(db.delete_ticket(id)?)).await?;
        if !deleted {
            return Err(DeskError::TicketNotFound { id });
        }

        tracing::info!(ticket_id = %id, "ticket deleted");
        self.events.publish(DeskEvent::TicketDeleted(id));
        Ok(())
    }

    pub async fn assign(&self, id: Uuid, agent_id: Uuid) -> Result<Ticket, DeskError> {
        let ticket = self
            .db
            .call(move |db| {
                db.transaction(|db| {
                    if !db.ticket_exists(id)? {
                        return Err(DeskError::TicketNotFound { id });
                    }
                    require_active_agent(db, agent_id, AGENT_UNAVAILABLE)?;
                    db.assign_ticket(id, agent_id)?
                        .ok_or(DeskError::TicketNotFound { id })
                })
            })
            .await?;

        tracing::info!(ticket_id = %id, agent_id = %agent_id, "ticket assigned");
        self.events.publish(DeskEvent::TicketAssigned(ticket.clone()));
        Ok(ticket)
    }
}

/// Assignment targets must exist and be active right now. A missing agent is
/// a validation failure here, not a 404: the ticket is what was addressed.
fn require_active_agent(db: &DeskDb, agent_id: Uuid, message: &str) -> Result<(), DeskError> {
    match db.agent_active_flag(agent_id)? {
        Some(true) => Ok(()),
        _ => Err(DeskError::validation(message)),
    }
}
