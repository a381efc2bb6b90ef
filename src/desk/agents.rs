use std::sync::Arc;

use uuid::Uuid;

use super::db::{DbHandle, DeskDb, is_unique_violation};
use super::events::{AgentRemoval, AgentStatusChange, DeskEvent, EventSink};
use super::models::{Agent, AgentInput};
use super::validation::validate_agent;
use crate::errors::DeskError;

pub const EMAIL_TAKEN: &str = "An agent with this email already exists";

/// Agent rules: unique emails, and cascading unassignment when an agent is
/// removed or deactivated. Events are published only after commit.
#[derive(Clone)]
pub struct AgentService {
    db: DbHandle,
    events: Arc<dyn EventSink>,
}

impl AgentService {
    pub fn new(db: DbHandle, events: Arc<dyn EventSink>) -> Self {
        Self { db, events }
    }

    /// Agents ordered by name. `None` lists everyone.
    pub async fn list(&self, is_active: Option<bool>) -> Result<Vec<Agent>, DeskError> {
        self.db
            .call(move |db| Ok(db.list_agents(is_active)?))
            .await
    }

    pub async fn get(&self, id: Uuid) -> Result<Agent, DeskError> {
        self.db
            .call(move |db| db.get_agent(id)?.ok_or(DeskError::AgentNotFound { id }))
            .await
    }

    pub async fn create(&self, input: AgentInput) -> Result<Agent, DeskError> {
        validate_agent(&input)?;
        let agent = self
            .db
            .call(move |db| {
                db.transaction(|db| {
                    if db.email_in_use(&input.email, None)? {
                        return Err(DeskError::validation(EMAIL_TAKEN));
                    }
                    write_new_agent(db, &input)
                })
            })
            .await?;

        tracing::info!(agent_id = %agent.id, "agent created");
        self.events.publish(DeskEvent::AgentCreated(agent.clone()));
        Ok(agent)
    }

    /// Replace name and email. The active flag is left alone.
    pub async fn update(&self, id: Uuid, input: AgentInput) -> Result<Agent, DeskError> {
        validate_agent(&input)?;
        let agent = self
            .db
            .call(move |db| {
                db.transaction(|db| {
                    require_agent(db, id)?;
                    if db.email_in_use(&input.email, Some(id))? {
                        return Err(DeskError::validation(EMAIL_TAKEN));
                    }
                    write_agent_fields(db, id, &input)?;
                    db.get_agent(id)?.ok_or(DeskError::AgentNotFound { id })
                })
            })
            .await?;

        tracing::info!(agent_id = %id, "agent updated");
        self.events.publish(DeskEvent::AgentUpdated(agent.clone()));
        Ok(agent)
    }

    /// Delete the agent and unassign its tickets in one transaction.
    /// Returns the ids of the tickets that were unassigned.
    pub async fn delete(&self, id: Uuid) -> Result<Vec<Uuid>, DeskError> {
        let unassigned = self
            .db
            .call(move |db| {
                db.transaction(|db| {
                    require_agent(db, id)?;
                    let unassigned = db.unassign_agent_tickets(id)?;
                    db.delete_agent(id)?;
                    Ok(unassigned)
                })
            })
            .await?;

        tracing::info!(agent_id = %id, unassigned = unassigned.len(), "agent deleted");
        self.events.publish(DeskEvent::AgentDeleted(AgentRemoval {
            agent_id: id,
            unassigned_ticket_ids: unassigned.clone(),
        }));
        Ok(unassigned)
    }

    /// Flip the active flag. Deactivation unassigns every ticket the agent
    /// holds; reactivation restores nothing.
    pub async fn toggle_active(&self, id: Uuid) -> Result<AgentStatusChange, DeskError> {
        let change = self
            .db
            .call(move |db| {
                db.transaction(|db| {
                    let was_active = require_agent(db, id)?;
                    db.set_agent_active(id, !was_active)?;
                    let unassigned_ticket_ids = if was_active {
                        db.unassign_agent_tickets(id)?
                    } else {
                        Vec::new()
                    };
                    let agent = db.get_agent(id)?.ok_or(DeskError::AgentNotFound { id })?;
                    Ok(AgentStatusChange {
                        agent,
                        unassigned_ticket_ids,
                    })
                })
            })
            .await?;

        tracing::info!(
            agent_id = %id,
            is_active = change.agent.is_active,
            unassigned = change.unassigned_ticket_ids.len(),
            "agent status changed"
        );
        self.events
            .publish(DeskEvent::AgentStatusChanged(change.clone()));
        Ok(change)
    }
}

/// Current active flag of an existing agent, or `AgentNotFound`.
fn require_agent(db: &DeskDb, id: Uuid) -> Result<bool, DeskError> {
    db.agent_active_flag(id)?
        .ok_or(DeskError::AgentNotFound { id })
}

fn write_new_agent(db: &DeskDb, input: &AgentInput) -> Result<Agent, DeskError> {
    db.insert_agent(&input.name, &input.email).map_err(email_conflict)
}

fn write_agent_fields(db: &DeskDb, id: Uuid, input: &AgentInput) -> Result<(), DeskError> {
    db.update_agent(id, &input.name, &input.email).map_err(email_conflict)?;
    Ok(())
}

/// Two concurrent writers can both pass the pre-check; the unique index
/// catches the loser.
fn email_conflict(err: anyhow::Error) -> DeskError {
    if is_unique_violation(&err) {
        DeskError::validation(EMAIL_TAKEN)
    } else {
        err.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desk::events::testing::RecordingSink;
    use crate::desk::models::{NewTicket, TicketPatch, TicketPriority, TicketStatus};

    fn setup() -> (AgentService, DbHandle, Arc<RecordingSink>) {
        let db = DbHandle::new(DeskDb::new_in_memory().unwrap());
        let sink = Arc::new(RecordingSink::default());
        let service = AgentService::new(db.clone(), sink.clone());
        (service, db, sink)
    }

    fn input(name: &str, email: &str) -> AgentInput {
        AgentInput {
            name: name.to_string(),
            email: email.to_string(),
        }
    }

    async fn assigned_ticket(db: &DbHandle, title: &str, agent: Uuid) -> crate::desk::models::Ticket {
        let new = NewTicket {
            title: title.to_string(),
            description: "desc".to_string(),
            priority: TicketPriority::Medium,
            assigned_agent_id: Some(agent),
        };
        db.call(move |db| Ok(db.insert_ticket(&new)?)).await.unwrap()
    }

    #[test]
    fn test_unique_index_race_maps_to_email_taken() {
        let db = DeskDb::new_in_memory().unwrap();
        let bob = db.insert_agent("Bob", "bob@example.com").unwrap();

        // Another writer commits the same email after our pre-check passed.
        let created: Result<Agent, DeskError> = db.transaction(|db| {
            db.insert_agent("Racer", "ann@example.com")?;
            write_new_agent(db, &input("Ann", "ann@example.com"))
        });
        assert!(matches!(created, Err(DeskError::Validation(ref m)) if m == EMAIL_TAKEN));

        let updated: Result<(), DeskError> = db.transaction(|db| {
            db.insert_agent("Racer", "taken@example.com")?;
            write_agent_fields(db, bob.id, &input("Bob", "taken@example.com"))
        });
        assert!(matches!(updated, Err(DeskError::Validation(ref m)) if m == EMAIL_TAKEN));

        // Both transactions rolled back.
        assert_eq!(db.count_agents().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_create_agent_defaults() {
        let (service, _db, sink) = setup();
        let agent = service.create(input("Ann", "ann@example.com")).await.unwrap();
        assert!(agent.is_active);
        assert_eq!(agent.active_ticket_count, 0);
        assert_eq!(sink.names(), vec!["AgentCreated"]);
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected_on_create_and_update() {
        let (service, _db, sink) = setup();
        let ann = service.create(input("Ann", "ann@example.com")).await.unwrap();
        let bob = service.create(input("Bob", "bob@example.com")).await.unwrap();

        let err = service
            .create(input("Another Ann", "ann@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, DeskError::Validation(ref m) if m == EMAIL_TAKEN));

        let err = service
            .update(bob.id, input("Bob", "ann@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, DeskError::Validation(_)));

        // Keeping your own email is fine.
        let renamed = service
            .update(ann.id, input("Ann Marie", "ann@example.com"))
            .await
            .unwrap();
        assert_eq!(renamed.name, "Ann Marie");

        assert_eq!(sink.names(), vec!["AgentCreated", "AgentCreated", "AgentUpdated"]);
    }

    #[tokio::test]
    async fn test_email_match_is_case_sensitive() {
        let (service, _db, _sink) = setup();
        service.create(input("Ann", "ann@example.com")).await.unwrap();
        assert!(service.create(input("Ann", "Ann@Example.com")).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_preserves_active_flag() {
        let (service, _db, _sink) = setup();
        let ann = service.create(input("Ann", "ann@example.com")).await.unwrap();
        service.toggle_active(ann.id).await.unwrap();
        let updated = service
            .update(ann.id, input("Ann", "ann2@example.com"))
            .await
            .unwrap();
        assert!(!updated.is_active);
        assert_eq!(updated.id, ann.id);
        assert_eq!(updated.created_at, ann.created_at);
    }

    #[tokio::test]
    async fn test_missing_agent_is_not_found() {
        let (service, _db, sink) = setup();
        let id = Uuid::new_v4();
        assert!(matches!(service.get(id).await, Err(DeskError::AgentNotFound { .. })));
        assert!(service
            .update(id, input("X", "x@example.com"))
            .await
            .unwrap_err()
            .is_not_found());
        assert!(service.delete(id).await.unwrap_err().is_not_found());
        assert!(service.toggle_active(id).await.unwrap_err().is_not_found());
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_delete_agent_unassigns_tickets() {
        let (service, db, sink) = setup();
        let ann = service.create(input("Ann", "ann@example.com")).await.unwrap();
        let t1 = assigned_ticket(&db, "one", ann.id).await;
        let t2 = assigned_ticket(&db, "two", ann.id).await;

        let mut unassigned = service.delete(ann.id).await.unwrap();
        unassigned.sort();
        let mut expected = vec![t1.id, t2.id];
        expected.sort();
        assert_eq!(unassigned, expected);

        for before in [t1, t2] {
            let id = before.id;
            let after = db.call(move |db| Ok(db.get_ticket(id)?)).await.unwrap().unwrap();
            assert_eq!(after.assigned_agent_id, None);
            assert!(after.updated_at > before.updated_at);
        }
        assert!(service.get(ann.id).await.unwrap_err().is_not_found());

        match sink.events().last() {
            Some(DeskEvent::AgentDeleted(removal)) => {
                assert_eq!(removal.agent_id, ann.id);
                assert_eq!(removal.unassigned_ticket_ids.len(), 2);
            }
            other => panic!("expected AgentDeleted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_toggle_twice_restores_flag_but_not_assignments() {
        let (service, db, _sink) = setup();
        let ann = service.create(input("Ann", "ann@example.com")).await.unwrap();
        let ticket = assigned_ticket(&db, "one", ann.id).await;

        let off = service.toggle_active(ann.id).await.unwrap();
        assert!(!off.agent.is_active);
        assert_eq!(off.unassigned_ticket_ids, vec![ticket.id]);
        assert_eq!(off.agent.active_ticket_count, 0);

        let on = service.toggle_active(ann.id).await.unwrap();
        assert!(on.agent.is_active);
        assert!(on.unassigned_ticket_ids.is_empty());

        let id = ticket.id;
        let after = db.call(move |db| Ok(db.get_ticket(id)?)).await.unwrap().unwrap();
        assert_eq!(after.assigned_agent_id, None);
        assert!(after.updated_at > ticket.updated_at);
    }

    #[tokio::test]
    async fn test_list_filters_by_active_flag() {
        let (service, _db, _sink) = setup();
        let ann = service.create(input("Ann", "ann@example.com")).await.unwrap();
        service.create(input("Bob", "bob@example.com")).await.unwrap();
        service.toggle_active(ann.id).await.unwrap();

        assert_eq!(service.list(None).await.unwrap().len(), 2);
        let active = service.list(Some(true)).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "Bob");
        let inactive = service.list(Some(false)).await.unwrap();
        assert_eq!(inactive[0].id, ann.id);
    }

    #[tokio::test]
    async fn test_active_ticket_count_ignores_resolved() {
        let (service, db, _sink) = setup();
        let ann = service.create(input("Ann", "ann@example.com")).await.unwrap();
        let t1 = assigned_ticket(&db, "one", ann.id).await;
        assigned_ticket(&db, "two", ann.id).await;
        let id = t1.id;
        db.call(move |db| {
            Ok(db.update_ticket(
                id,
                &TicketPatch {
                    status: Some(TicketStatus::Resolved),
                    ..Default::default()
                },
            )?)
        })
        .await
        .unwrap();

        let ann = service.get(ann.id).await.unwrap();
        assert_eq!(ann.active_ticket_count, 1);
    }

    #[tokio::test]
    async fn test_invalid_input_rejected_before_store() {
        let (service, _db, sink) = setup();
        let err = service.create(input("", "ann@example.com")).await.unwrap_err();
        assert!(matches!(err, DeskError::Validation(_)));
        let err = service.create(input("Ann", "nope")).await.unwrap_err();
        assert!(matches!(err, DeskError::Validation(_)));
        assert!(service.list(None).await.unwrap().is_empty());
        assert!(sink.events().is_empty());
    }
}
