//! Agent commands (`livedesk agents`).

use anyhow::Result;

use livedesk::client::DeskClient;
use livedesk::client::dashboard::render_agents;
use livedesk::client::store::{Action, DeskStore};
use livedesk::desk::models::AgentInput;

use super::super::AgentCommands;
use super::{client_failure, report_success};

pub async fn cmd_agents(server: &str, command: AgentCommands) -> Result<()> {
    let client = DeskClient::new(server);
    let fail = |e| client_failure(server, e);

    match command {
        AgentCommands::List { active } => {
            let agents = client.list_agents(active).await.map_err(fail)?;
            let mut store = DeskStore::new();
            store.apply(Action::AgentsLoaded(agents));
            print!("{}", render_agents(&store.agents()));
        }
        AgentCommands::Create { name, email } => {
            let agent = client
                .create_agent(&AgentInput { name, email })
                .await
                .map_err(fail)?;
            report_success(format!("Created agent {} ({})", agent.name, agent.id));
        }
        AgentCommands::Update { id, name, email } => {
            if name.is_none() && email.is_none() {
                anyhow::bail!("Nothing to update: pass --name and/or --email");
            }
            // The endpoint takes both fields; fill the missing one from the server.
            let current = client.get_agent(id).await.map_err(fail)?;
            let input = AgentInput {
                name: name.unwrap_or(current.name),
                email: email.unwrap_or(current.email),
            };
            let agent = client.update_agent(id, &input).await.map_err(fail)?;
            report_success(format!("Updated agent {} <{}>", agent.name, agent.email));
        }
        AgentCommands::Toggle { id } => {
            let agent = client.toggle_agent(id).await.map_err(fail)?;
            let state = if agent.is_active { "active" } else { "inactive" };
            report_success(format!("{} is now {}", agent.name, state));
        }
        AgentCommands::Delete { id } => {
            client.delete_agent(id).await.map_err(fail)?;
            report_success(format!("Deleted agent {}", id));
        }
    }

    Ok(())
}
