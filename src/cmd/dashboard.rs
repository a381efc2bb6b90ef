//! Live dashboard command (`livedesk dashboard`).

use anyhow::{Context, Result};
use console::Term;
use tokio::sync::mpsc;

use livedesk::client::dashboard::{event_notification, render};
use livedesk::client::live::{self, Backoff};
use livedesk::client::store::{Action, ConnectionStatus, DeskStore, Notification};
use livedesk::client::{DeskClient, TicketListParams};
use livedesk::desk::models::MAX_PAGE_LIMIT;
use livedesk::errors::ClientError;

use super::client_failure;

pub async fn cmd_dashboard(server: &str, once: bool) -> Result<()> {
    let client = DeskClient::new(server);
    let mut store = DeskStore::new();
    load(&client, &mut store)
        .await
        .map_err(|e| client_failure(server, e))?;

    if once {
        print!("{}", render(&store));
        return Ok(());
    }

    let (tx, mut rx) = mpsc::channel(64);
    let feed = tokio::spawn(live::run_feed(client.ws_url(), tx, Backoff::default()));
    let term = Term::stdout();
    redraw(&term, &store)?;

    loop {
        tokio::select! {
            action = rx.recv() => {
                let Some(action) = action else { break };
                let reconnected =
                    action == Action::ConnectionChanged(ConnectionStatus::Connected);
                if let Action::Event(event) = &action {
                    store.apply(Action::Notify(event_notification(event)));
                }
                store.apply(action);

                // Events sent while disconnected are gone; refetch to catch up.
                if reconnected && let Err(e) = load(&client, &mut store).await {
                    store.apply(Action::Notify(Notification::error(e.to_string())));
                }
                redraw(&term, &store)?;
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    feed.abort();
    Ok(())
}

async fn load(client: &DeskClient, store: &mut DeskStore) -> Result<(), ClientError> {
    let agents = client.list_agents(None).await?;
    let params = TicketListParams {
        filter: store.filters().clone(),
        page: Some(1),
        limit: Some(MAX_PAGE_LIMIT),
    };
    let tickets = client.list_tickets(&params).await?;
    store.apply(Action::AgentsLoaded(agents));
    store.apply(Action::TicketsLoaded(tickets));
    Ok(())
}

fn redraw(term: &Term, store: &DeskStore) -> Result<()> {
    term.clear_screen().context("Failed to clear terminal")?;
    term.write_str(&render(store)).context("Failed to draw dashboard")?;
    Ok(())
}
