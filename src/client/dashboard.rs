//! Text rendering for the terminal client.
//!
//! Everything here is a pure function of the data it is handed and returns a
//! `String`; the callers decide when to clear and redraw.

use console::{style, truncate_str};

use super::store::{ConnectionStatus, DeskStore, Notification, NotificationLevel};
use crate::desk::events::DeskEvent;
use crate::desk::models::{Agent, Ticket, TicketPriority, TicketStatus};
use crate::ui::icons::{
    AGENT, PROGRESS, TICKET, connection_icon, notification_icon, priority_marker, status_icon,
};

/// How many tickets the dashboard lists under "Recent tickets".
pub const RECENT_TICKETS: usize = 8;

const TITLE_WIDTH: usize = 40;

/// Full dashboard view of the store.
pub fn render(store: &DeskStore) -> String {
    let stats = store.stats();
    let mut out = String::new();

    out.push_str(&format!(
        "{} {}  {}\n",
        style("livedesk").cyan().bold(),
        style("dashboard").dim(),
        connection_line(store.connection())
    ));
    out.push_str(&format!("{}\n\n", style("═".repeat(60)).cyan()));

    out.push_str(&format!(
        "{}{} {}\n",
        PROGRESS,
        style("Tickets").bold(),
        style(format!("({} total)", stats.total)).dim()
    ));
    let statuses: Vec<String> = stats
        .by_status
        .iter()
        .map(|(status, n)| {
            format!(
                "{}{} {}",
                status_icon(*status),
                status.label(),
                status_count(*status, *n)
            )
        })
        .collect();
    out.push_str(&format!("  {}\n", statuses.join("   ")));
    let priorities: Vec<String> = stats
        .by_priority
        .iter()
        .map(|(priority, n)| format!("{} {}", priority_label(*priority), n))
        .collect();
    out.push_str(&format!("  {}\n", priorities.join("   ")));
    out.push_str(&format!(
        "  {}\n\n",
        style(format!("{} unassigned", stats.unassigned)).dim()
    ));

    out.push_str(&format!(
        "{}{} {}\n",
        AGENT,
        style("Agents").bold(),
        style(format!(
            "({} active of {})",
            stats.active_agents, stats.total_agents
        ))
        .dim()
    ));
    let active = store.active_agents();
    if active.is_empty() {
        out.push_str(&format!("  {}\n", style("no active agents").dim()));
    }
    for agent in active {
        out.push_str(&format!(
            "  {:<24} {}\n",
            truncate_str(&agent.name, 24, "…"),
            workload(agent.active_ticket_count)
        ));
    }
    out.push('\n');

    out.push_str(&format!("{}{}\n", TICKET, style("Recent tickets").bold()));
    let recent: Vec<&Ticket> = store.tickets().into_iter().take(RECENT_TICKETS).collect();
    if recent.is_empty() {
        out.push_str(&format!("  {}\n", style("no tickets").dim()));
    } else {
        for ticket in recent {
            out.push_str(&format!("  {}\n", ticket_line(ticket)));
        }
    }

    if let Some(note) = store.latest_notification() {
        out.push('\n');
        out.push_str(&notification_line(note));
        out.push('\n');
    }
    out
}

/// Table of tickets for `tickets list`.
pub fn render_tickets(tickets: &[&Ticket]) -> String {
    if tickets.is_empty() {
        return format!("{}\n", style("No tickets found.").dim());
    }
    let mut out = format!(
        "{}\n",
        style(format!(
            "{:<36}  {:<12} {:<9} {:<TITLE_WIDTH$}  {}",
            "ID", "STATUS", "PRIORITY", "TITLE", "ASSIGNEE"
        ))
        .bold()
    );
    for ticket in tickets {
        out.push_str(&format!(
            "{:<36}  {:<12} {:<9} {:<TITLE_WIDTH$}  {}\n",
            ticket.id,
            ticket.status.label(),
            ticket.priority.as_str(),
            truncate_str(&ticket.title, TITLE_WIDTH, "…"),
            assignee(ticket)
        ));
    }
    out
}

/// Multi-line view of one ticket.
pub fn render_ticket(ticket: &Ticket) -> String {
    format!(
        "{}{}\n  id:        {}\n  status:    {}\n  priority:  {}\n  assignee:  {}\n  created:   {}\n  updated:   {}\n\n  {}\n",
        status_icon(ticket.status),
        style(&ticket.title).bold(),
        ticket.id,
        ticket.status.label(),
        priority_label(ticket.priority),
        assignee(ticket),
        ticket.created_at.format("%Y-%m-%d %H:%M:%S"),
        ticket.updated_at.format("%Y-%m-%d %H:%M:%S"),
        ticket.description
    )
}

/// Table of agents for `agents list`.
pub fn render_agents(agents: &[&Agent]) -> String {
    if agents.is_empty() {
        return format!("{}\n", style("No agents found.").dim());
    }
    let mut out = format!(
        "{}\n",
        style(format!(
            "{:<36}  {:<24} {:<32} {:<8} {}",
            "ID", "NAME", "EMAIL", "ACTIVE", "OPEN"
        ))
        .bold()
    );
    for agent in agents {
        let active = if agent.is_active {
            style("yes").green().to_string()
        } else {
            style("no").red().to_string()
        };
        out.push_str(&format!(
            "{:<36}  {:<24} {:<32} {:<8} {}\n",
            agent.id,
            truncate_str(&agent.name, 24, "…"),
            truncate_str(&agent.email, 32, "…"),
            active,
            agent.active_ticket_count
        ));
    }
    out
}

pub fn notification_line(note: &Notification) -> String {
    let message = match note.level {
        NotificationLevel::Info => style(&note.message).cyan(),
        NotificationLevel::Success => style(&note.message).green(),
        NotificationLevel::Error => style(&note.message).red(),
    };
    format!("{}{}", notification_icon(note.level), message)
}

/// Short line announcing a live event, for the dashboard footer.
pub fn event_notification(event: &DeskEvent) -> Notification {
    match event {
        DeskEvent::TicketCreated(t) => Notification::info(format!("New ticket: {}", t.title)),
        DeskEvent::TicketUpdated(t) => {
            Notification::info(format!("Ticket updated: {} ({})", t.title, t.status.label()))
        }
        DeskEvent::TicketAssigned(t) => Notification::info(format!(
            "Ticket assigned: {} -> {}",
            t.title,
            assignee(t)
        )),
        DeskEvent::TicketDeleted(_) => Notification::info("Ticket deleted"),
        DeskEvent::AgentCreated(a) => Notification::info(format!("Agent added: {}", a.name)),
        DeskEvent::AgentUpdated(a) => Notification::info(format!("Agent updated: {}", a.name)),
        DeskEvent::AgentDeleted(r) => Notification::info(format!(
            "Agent removed, {} ticket(s) unassigned",
            r.unassigned_ticket_ids.len()
        )),
        DeskEvent::AgentStatusChanged(c) => {
            let state = if c.agent.is_active { "active" } else { "inactive" };
            Notification::info(format!("{} is now {}", c.agent.name, state))
        }
    }
}

fn connection_line(status: ConnectionStatus) -> String {
    let label = match status {
        ConnectionStatus::Connected => style("live").green(),
        ConnectionStatus::Connecting => style("connecting").yellow(),
        ConnectionStatus::Disconnected => style("disconnected").red(),
    };
    format!("{}{}", connection_icon(status), label)
}

fn ticket_line(ticket: &Ticket) -> String {
    format!(
        "{}{:<3} {:<TITLE_WIDTH$}  {}",
        status_icon(ticket.status),
        priority_marker(ticket.priority),
        truncate_str(&ticket.title, TITLE_WIDTH, "…"),
        style(assignee(ticket)).dim()
    )
}

fn status_count(status: TicketStatus, n: usize) -> String {
    match status {
        TicketStatus::Open => style(n).yellow().to_string(),
        TicketStatus::InProgress => style(n).cyan().to_string(),
        TicketStatus::Resolved => style(n).green().to_string(),
    }
}

fn priority_label(priority: TicketPriority) -> String {
    match priority {
        TicketPriority::Low => style(priority.as_str()).dim().to_string(),
        TicketPriority::Medium => priority.as_str().to_string(),
        TicketPriority::High => style(priority.as_str()).yellow().to_string(),
        TicketPriority::Critical => style(priority.as_str()).red().bold().to_string(),
    }
}

fn workload(count: i64) -> String {
    let bar = "█".repeat(count.clamp(0, 20) as usize);
    format!("{} {}", style(bar).cyan(), count)
}

fn assignee(ticket: &Ticket) -> &str {
    ticket.assigned_agent_name.as_deref().unwrap_or("unassigned")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::store::Action;
    use crate::desk::models::{PageRequest, TicketPage};
    use chrono::Utc;
    use console::strip_ansi_codes;
    use uuid::Uuid;

    fn agent(name: &str, active: bool, load: i64) -> Agent {
        Agent {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            is_active: active,
            created_at: Utc::now(),
            active_ticket_count: load,
        }
    }

    fn ticket(title: &str, assignee: Option<&Agent>) -> Ticket {
        let now = Utc::now();
        Ticket {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: "Details here".to_string(),
            status: TicketStatus::InProgress,
            priority: TicketPriority::Critical,
            assigned_agent_id: assignee.map(|a| a.id),
            assigned_agent_name: assignee.map(|a| a.name.clone()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_render_dashboard_sections() {
        let ann = agent("Ann", true, 2);
        let mut store = DeskStore::new();
        store.apply(Action::AgentsLoaded(vec![ann.clone(), agent("Old", false, 0)]));
        store.apply(Action::TicketsLoaded(TicketPage {
            data: vec![ticket("Printer on fire", Some(&ann))],
            pagination: PageRequest::default().pagination(12),
        }));
        store.apply(Action::ConnectionChanged(ConnectionStatus::Connected));
        store.apply(Action::Notify(Notification::success("Ticket created")));

        let out = strip_ansi_codes(&render(&store)).to_string();
        assert!(out.contains("(12 total)"));
        assert!(out.contains("In Progress 1"));
        assert!(out.contains("Critical 1"));
        assert!(out.contains("(1 active of 2)"));
        assert!(out.contains("Ann"));
        assert!(!out.contains("Old"));
        assert!(out.contains("Printer on fire"));
        assert!(out.contains("live"));
        assert!(out.contains("Ticket created"));
    }

    #[test]
    fn test_render_empty_dashboard() {
        let store = DeskStore::new();
        let out = strip_ansi_codes(&render(&store)).to_string();
        assert!(out.contains("no tickets"));
        assert!(out.contains("no active agents"));
        assert!(out.contains("connecting"));
    }

    #[test]
    fn test_render_tables() {
        let ann = agent("Ann", true, 1);
        let t = ticket("Broken login", Some(&ann));
        let out = strip_ansi_codes(&render_tickets(&[&t])).to_string();
        assert!(out.contains("STATUS"));
        assert!(out.contains("Broken login"));
        assert!(out.contains("Ann"));
        assert!(out.contains(&t.id.to_string()));

        let out = strip_ansi_codes(&render_agents(&[&ann])).to_string();
        assert!(out.contains("ann@example.com"));
        assert!(out.contains("yes"));

        assert!(render_tickets(&[]).contains("No tickets found."));
        assert!(render_agents(&[]).contains("No agents found."));
    }

    #[test]
    fn test_render_ticket_detail() {
        let t = ticket("Broken login", None);
        let out = strip_ansi_codes(&render_ticket(&t)).to_string();
        assert!(out.contains("Broken login"));
        assert!(out.contains("unassigned"));
        assert!(out.contains("Details here"));
    }

    #[test]
    fn test_event_notification_messages() {
        let t = ticket("Broken login", None);
        assert_eq!(
            event_notification(&DeskEvent::TicketCreated(t.clone())).message,
            "New ticket: Broken login"
        );
        assert_eq!(
            event_notification(&DeskEvent::TicketAssigned(t)).message,
            "Ticket assigned: Broken login -> unassigned"
        );
        let mut ann = agent("Ann", false, 0);
        ann.is_active = false;
        let change = crate::desk::events::AgentStatusChange {
            agent: ann,
            unassigned_ticket_ids: vec![],
        };
        assert_eq!(
            event_notification(&DeskEvent::AgentStatusChanged(change)).message,
            "Ann is now inactive"
        );
    }

    #[test]
    fn test_long_titles_are_truncated() {
        let long = "x".repeat(100);
        let t = ticket(&long, None);
        let out = strip_ansi_codes(&render_tickets(&[&t])).to_string();
        assert!(!out.contains(&long));
        assert!(out.contains("…"));
    }
}
