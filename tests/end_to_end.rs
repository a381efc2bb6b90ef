//! End-to-end tests: a real server on an ephemeral port, exercised through
//! `DeskClient` and the live feed.

use std::time::Duration;

use livedesk::client::live::{Backoff, run_feed};
use livedesk::client::store::{Action, ConnectionStatus, DeskStore};
use livedesk::client::{DeskClient, TicketListParams};
use livedesk::desk::events::DeskEvent;
use livedesk::desk::models::*;
use livedesk::desk::server::{DeskServer, ServerConfig};
use tempfile::TempDir;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

struct TestDesk {
    client: DeskClient,
    stop: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<anyhow::Result<()>>,
    _dir: TempDir,
}

impl TestDesk {
    async fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let config = ServerConfig {
            port: 0,
            db_path: dir.path().join("desk.db"),
            ..Default::default()
        };
        let server = DeskServer::bind(&config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve(async move {
            let _ = stopped.await;
        }));
        Self {
            client: DeskClient::new(&format!("http://{}", addr)),
            stop: Some(stop),
            handle,
            _dir: dir,
        }
    }

    async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        // Open WebSockets keep graceful shutdown waiting; don't hang the test on them.
        let _ = tokio::time::timeout(Duration::from_secs(2), &mut self.handle).await;
    }
}

fn new_ticket(title: &str, priority: TicketPriority) -> NewTicket {
    NewTicket {
        title: title.to_string(),
        description: format!("{} description", title),
        priority,
        assigned_agent_id: None,
    }
}

/// Next event from the feed, skipping connection status changes.
async fn next_event(rx: &mut mpsc::Receiver<Action>) -> DeskEvent {
    loop {
        let action = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for a live event")
            .expect("feed channel closed");
        if let Action::Event(event) = action {
            return event;
        }
    }
}

async fn connect_feed(desk: &TestDesk) -> mpsc::Receiver<Action> {
    let (tx, mut rx) = mpsc::channel(32);
    tokio::spawn(run_feed(desk.client.ws_url(), tx, Backoff::default()));
    let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap();
    assert_eq!(
        first,
        Some(Action::ConnectionChanged(ConnectionStatus::Connected))
    );
    rx
}

#[tokio::test]
async fn test_health_and_empty_lists() {
    let desk = TestDesk::start().await;
    assert!(desk.client.health().await.unwrap());
    assert!(desk.client.list_agents(None).await.unwrap().is_empty());

    let page = desk
        .client
        .list_tickets(&TicketListParams::default())
        .await
        .unwrap();
    assert!(page.data.is_empty());
    assert_eq!(page.pagination.total_count, 0);
    assert_eq!(page.pagination.limit, DEFAULT_PAGE_LIMIT);
    desk.shutdown().await;
}

#[tokio::test]
async fn test_agent_lifecycle_and_validation() {
    let desk = TestDesk::start().await;
    let client = &desk.client;

    let ann = client
        .create_agent(&AgentInput {
            name: "Ann Lee".to_string(),
            email: "ann@example.com".to_string(),
        })
        .await
        .unwrap();
    assert!(ann.is_active);
    assert_eq!(ann.active_ticket_count, 0);

    let dup = client
        .create_agent(&AgentInput {
            name: "Other".to_string(),
            email: "ann@example.com".to_string(),
        })
        .await
        .unwrap_err();
    assert!(dup.is_validation());
    assert!(dup.to_string().contains("An agent with this email already exists"));

    let bad = client
        .create_agent(&AgentInput {
            name: "Bad".to_string(),
            email: "not-an-email".to_string(),
        })
        .await
        .unwrap_err();
    assert!(bad.is_validation());

    let renamed = client
        .update_agent(
            ann.id,
            &AgentInput {
                name: "Ann Park".to_string(),
                email: "ann@example.com".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.name, "Ann Park");

    let toggled = client.toggle_agent(ann.id).await.unwrap();
    assert!(!toggled.is_active);
    assert!(client.list_agents(Some(true)).await.unwrap().is_empty());
    assert_eq!(client.list_agents(Some(false)).await.unwrap().len(), 1);

    client.delete_agent(ann.id).await.unwrap();
    let missing = client.get_agent(ann.id).await.unwrap_err();
    assert!(matches!(
        missing,
        livedesk::errors::ClientError::Api { status: 404, .. }
    ));
    desk.shutdown().await;
}

#[tokio::test]
async fn test_ticket_crud_filters_and_assignment() {
    let desk = TestDesk::start().await;
    let client = &desk.client;

    let agent = client
        .create_agent(&AgentInput {
            name: "Bo".to_string(),
            email: "bo@example.com".to_string(),
        })
        .await
        .unwrap();

    let printer = client
        .create_ticket(&new_ticket("Printer jammed", TicketPriority::Low))
        .await
        .unwrap();
    assert_eq!(printer.status, TicketStatus::Open);
    let vpn = client
        .create_ticket(&new_ticket("VPN down", TicketPriority::Critical))
        .await
        .unwrap();

    let assigned = client.assign_ticket(vpn.id, agent.id).await.unwrap();
    assert_eq!(assigned.assigned_agent_id, Some(agent.id));
    assert_eq!(assigned.assigned_agent_name.as_deref(), Some("Bo"));
    assert_eq!(
        client.get_agent(agent.id).await.unwrap().active_ticket_count,
        1
    );

    let critical = client
        .list_tickets(&TicketListParams {
            filter: TicketFilter {
                priority: Some(TicketPriority::Critical),
                ..Default::default()
            },
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(critical.pagination.total_count, 1);
    assert_eq!(critical.data[0].id, vpn.id);

    let search = client
        .list_tickets(&TicketListParams {
            filter: TicketFilter {
                search_term: Some("printer".to_string()),
                ..Default::default()
            },
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(search.data.len(), 1);
    assert_eq!(search.data[0].id, printer.id);

    let resolved = client
        .update_ticket(
            vpn.id,
            &TicketPatch {
                status: Some(TicketStatus::Resolved),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(resolved.status, TicketStatus::Resolved);
    assert!(resolved.updated_at > vpn.updated_at);
    assert_eq!(
        client.get_agent(agent.id).await.unwrap().active_ticket_count,
        0
    );

    let unknown_agent = client
        .assign_ticket(printer.id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(unknown_agent.is_validation());

    client.delete_ticket(printer.id).await.unwrap();
    let gone = client.get_ticket(printer.id).await.unwrap_err();
    assert!(matches!(
        gone,
        livedesk::errors::ClientError::Api { status: 404, .. }
    ));
    desk.shutdown().await;
}

#[tokio::test]
async fn test_pagination_newest_first() {
    let desk = TestDesk::start().await;
    for i in 0..5 {
        desk.client
            .create_ticket(&new_ticket(&format!("T{}", i), TicketPriority::Medium))
            .await
            .unwrap();
    }

    let page = desk
        .client
        .list_tickets(&TicketListParams {
            page: Some(2),
            limit: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.pagination.total_count, 5);
    assert_eq!(page.pagination.total_pages, 3);
    let titles: Vec<_> = page.data.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["T2", "T1"]);
    desk.shutdown().await;
}

#[tokio::test]
async fn test_live_feed_delivers_events_after_commit() {
    let desk = TestDesk::start().await;
    let mut rx = connect_feed(&desk).await;

    let ticket = desk
        .client
        .create_ticket(&new_ticket("Live one", TicketPriority::High))
        .await
        .unwrap();
    assert_eq!(
        next_event(&mut rx).await,
        DeskEvent::TicketCreated(ticket.clone())
    );

    desk.client.delete_ticket(ticket.id).await.unwrap();
    assert_eq!(next_event(&mut rx).await, DeskEvent::TicketDeleted(ticket.id));

    // Failed mutations publish nothing; the next event is the agent below.
    let _ = desk
        .client
        .create_ticket(&new_ticket("", TicketPriority::Low))
        .await
        .unwrap_err();
    let agent = desk
        .client
        .create_agent(&AgentInput {
            name: "Cy".to_string(),
            email: "cy@example.com".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(next_event(&mut rx).await, DeskEvent::AgentCreated(agent));
    desk.shutdown().await;
}

#[tokio::test]
async fn test_store_follows_deactivation_cascade() {
    let desk = TestDesk::start().await;
    let client = &desk.client;

    let agent = client
        .create_agent(&AgentInput {
            name: "Dee".to_string(),
            email: "dee@example.com".to_string(),
        })
        .await
        .unwrap();
    let ticket = client
        .create_ticket(&NewTicket {
            assigned_agent_id: Some(agent.id),
            ..new_ticket("Assigned at birth", TicketPriority::Medium)
        })
        .await
        .unwrap();

    let mut store = DeskStore::new();
    store.apply(Action::AgentsLoaded(client.list_agents(None).await.unwrap()));
    store.apply(Action::TicketsLoaded(
        client
            .list_tickets(&TicketListParams::default())
            .await
            .unwrap(),
    ));
    assert_eq!(
        store.ticket(ticket.id).unwrap().assigned_agent_id,
        Some(agent.id)
    );

    let mut rx = connect_feed(&desk).await;
    client.toggle_agent(agent.id).await.unwrap();

    let event = next_event(&mut rx).await;
    match &event {
        DeskEvent::AgentStatusChanged(change) => {
            assert!(!change.agent.is_active);
            assert_eq!(change.unassigned_ticket_ids, vec![ticket.id]);
        }
        other => panic!("unexpected event {:?}", other),
    }
    store.apply(Action::Event(event));

    let cached = store.ticket(ticket.id).unwrap();
    assert_eq!(cached.assigned_agent_id, None);
    assert_eq!(cached.assigned_agent_name, None);
    assert!(store.active_agents().is_empty());

    // The server agrees with the reconciled cache.
    let fresh = client.get_ticket(ticket.id).await.unwrap();
    assert_eq!(fresh.assigned_agent_id, None);
    desk.shutdown().await;
}
