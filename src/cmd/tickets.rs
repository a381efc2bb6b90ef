//! Ticket commands (`livedesk tickets`).

use anyhow::Result;
use console::style;

use livedesk::client::dashboard::{render_ticket, render_tickets};
use livedesk::client::store::{Action, DeskStore};
use livedesk::client::{DeskClient, TicketListParams};
use livedesk::desk::models::{NewTicket, TicketFilter, TicketPatch};

use super::super::TicketCommands;
use super::{client_failure, report_success};

pub async fn cmd_tickets(server: &str, command: TicketCommands) -> Result<()> {
    let client = DeskClient::new(server);
    let fail = |e| client_failure(server, e);

    match command {
        TicketCommands::List {
            status,
            priority,
            agent,
            search,
            page,
            limit,
        } => {
            let params = TicketListParams {
                filter: TicketFilter {
                    status,
                    priority,
                    assigned_agent_id: agent,
                    search_term: search,
                },
                page,
                limit,
            };
            let result = client.list_tickets(&params).await.map_err(fail)?;
            let pagination = result.pagination;

            let mut store = DeskStore::new();
            store.apply(Action::SetFilters(params.filter));
            store.apply(Action::TicketsLoaded(result));

            print!("{}", render_tickets(&store.tickets()));
            println!(
                "{}",
                style(format!(
                    "Page {} of {} ({} ticket(s))",
                    pagination.page,
                    pagination.total_pages.max(1),
                    pagination.total_count
                ))
                .dim()
            );
        }
        TicketCommands::Show { id } => {
            let ticket = client.get_ticket(id).await.map_err(fail)?;
            print!("{}", render_ticket(&ticket));
        }
        TicketCommands::Create {
            title,
            description,
            priority,
            agent,
        } => {
            let new = NewTicket {
                title,
                description,
                priority,
                assigned_agent_id: agent,
            };
            let ticket = client.create_ticket(&new).await.map_err(fail)?;
            report_success(format!("Created ticket {} ({})", ticket.title, ticket.id));
        }
        TicketCommands::Update {
            id,
            title,
            description,
            status,
            priority,
            agent,
        } => {
            let patch = TicketPatch {
                title,
                description,
                status,
                priority,
                assigned_agent_id: agent,
            };
            if patch == TicketPatch::default() {
                anyhow::bail!("Nothing to update: pass at least one field");
            }
            let ticket = client.update_ticket(id, &patch).await.map_err(fail)?;
            report_success(format!(
                "Updated ticket {} ({})",
                ticket.title,
                ticket.status.label()
            ));
        }
        TicketCommands::Assign { id, agent } => {
            let ticket = client.assign_ticket(id, agent).await.map_err(fail)?;
            report_success(format!(
                "Assigned {} to {}",
                ticket.title,
                ticket.assigned_agent_name.as_deref().unwrap_or("agent")
            ));
        }
        TicketCommands::Delete { id } => {
            client.delete_ticket(id).await.map_err(fail)?;
            report_success(format!("Deleted ticket {}", id));
        }
    }

    Ok(())
}
