//! Client-side state container.
//!
//! `DeskStore` holds the client's view of the desk and changes only through
//! [`DeskStore::apply`]. API responses and live events carry the same DTO
//! shapes, so both reconcile through the same keyed maps: the newest
//! `updatedAt` for a given id wins, whichever path delivered it.

use std::collections::{HashMap, VecDeque};

use uuid::Uuid;

use crate::desk::events::DeskEvent;
use crate::desk::models::*;

/// Oldest notifications are dropped beyond this many.
pub const MAX_NOTIFICATIONS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Connecting,
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}

/// Every state transition the client can make.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    TicketsLoaded(TicketPage),
    AgentsLoaded(Vec<Agent>),
    /// A ticket DTO returned by the API after create/update/assign. It only
    /// refreshes a cached copy; new rows arrive through `TicketCreated`.
    TicketSaved(Ticket),
    AgentSaved(Agent),
    TicketRemoved(Uuid),
    AgentRemoved {
        agent_id: Uuid,
        unassigned_ticket_ids: Vec<Uuid>,
    },
    Event(DeskEvent),
    SetFilters(TicketFilter),
    Notify(Notification),
    DismissNotification,
    ConnectionChanged(ConnectionStatus),
}

/// Ticket counts for the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeskStats {
    pub total: i64,
    pub by_status: Vec<(TicketStatus, usize)>,
    pub by_priority: Vec<(TicketPriority, usize)>,
    pub unassigned: usize,
    pub active_agents: usize,
    pub total_agents: usize,
}

#[derive(Debug, Default)]
pub struct DeskStore {
    tickets: HashMap<Uuid, Ticket>,
    agents: HashMap<Uuid, Agent>,
    filters: TicketFilter,
    pagination: Option<Pagination>,
    notifications: VecDeque<Notification>,
    connection: ConnectionStatus,
}

impl DeskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, action: Action) {
        match action {
            Action::TicketsLoaded(page) => {
                self.tickets = page.data.into_iter().map(|t| (t.id, t)).collect();
                self.pagination = Some(page.pagination);
            }
            Action::AgentsLoaded(agents) => {
                self.agents = agents.into_iter().map(|a| (a.id, a)).collect();
            }
            Action::TicketSaved(ticket) => self.replace_ticket(ticket),
            Action::AgentSaved(agent) => self.upsert_agent(agent),
            Action::TicketRemoved(id) => self.remove_ticket(id),
            Action::AgentRemoved {
                agent_id,
                unassigned_ticket_ids,
            } => self.remove_agent(agent_id, &unassigned_ticket_ids),
            Action::Event(event) => self.apply_event(event),
            Action::SetFilters(filters) => self.filters = filters,
            Action::Notify(notification) => {
                self.notifications.push_back(notification);
                while self.notifications.len() > MAX_NOTIFICATIONS {
                    self.notifications.pop_front();
                }
            }
            Action::DismissNotification => {
                self.notifications.pop_front();
            }
            Action::ConnectionChanged(status) => self.connection = status,
        }
    }

    fn apply_event(&mut self, event: DeskEvent) {
        match event {
            DeskEvent::TicketCreated(ticket) => self.insert_ticket(ticket),
            DeskEvent::TicketUpdated(ticket) | DeskEvent::TicketAssigned(ticket) => {
                self.replace_ticket(ticket)
            }
            DeskEvent::TicketDeleted(id) => self.remove_ticket(id),
            DeskEvent::AgentCreated(agent) | DeskEvent::AgentUpdated(agent) => {
                self.upsert_agent(agent)
            }
            DeskEvent::AgentDeleted(removal) => {
                self.remove_agent(removal.agent_id, &removal.unassigned_ticket_ids)
            }
            DeskEvent::AgentStatusChanged(change) => {
                let agent_id = change.agent.id;
                self.upsert_agent(change.agent);
                self.clear_assignments(agent_id, &change.unassigned_ticket_ids);
            }
        }
    }

    // ── Reconciliation ────────────────────────────────────────────────

    /// A newly created ticket joins the cache and the total. A repeat of one
    /// already held is treated as a replacement.
    fn insert_ticket(&mut self, ticket: Ticket) {
        if self.tickets.contains_key(&ticket.id) {
            self.replace_ticket(ticket);
            return;
        }
        if let Some(p) = self.pagination.as_mut() {
            p.total_count += 1;
            p.total_pages = pages_for(p.total_count, p.limit);
        }
        self.shift_workload(None, Some(&ticket));
        self.tickets.insert(ticket.id, ticket);
    }

    /// Refresh a cached ticket. Tickets outside the loaded page are left
    /// alone, and a copy older than the cached one is ignored so a late API
    /// response cannot undo a newer event.
    fn replace_ticket(&mut self, ticket: Ticket) {
        let Some(existing) = self.tickets.get(&ticket.id) else {
            return;
        };
        if existing.updated_at > ticket.updated_at {
            return;
        }
        let previous = existing.clone();
        self.shift_workload(Some(&previous), Some(&ticket));
        self.tickets.insert(ticket.id, ticket);
    }

    fn remove_ticket(&mut self, id: Uuid) {
        if let Some(removed) = self.tickets.remove(&id) {
            self.shift_workload(Some(&removed), None);
            if let Some(p) = self.pagination.as_mut() {
                p.total_count = (p.total_count - 1).max(0);
                p.total_pages = pages_for(p.total_count, p.limit);
            }
        }
    }

    fn upsert_agent(&mut self, agent: Agent) {
        for ticket in self.tickets.values_mut() {
            if ticket.assigned_agent_id == Some(agent.id) {
                ticket.assigned_agent_name = Some(agent.name.clone());
            }
        }
        self.agents.insert(agent.id, agent);
    }

    fn remove_agent(&mut self, agent_id: Uuid, unassigned: &[Uuid]) {
        self.agents.remove(&agent_id);
        self.clear_assignments(agent_id, unassigned);
    }

    /// Drop the assignment on the listed tickets and on any other cached
    /// ticket still pointing at `agent_id`.
    fn clear_assignments(&mut self, agent_id: Uuid, ticket_ids: &[Uuid]) {
        for ticket in self.tickets.values_mut() {
            if ticket_ids.contains(&ticket.id) || ticket.assigned_agent_id == Some(agent_id) {
                ticket.assigned_agent_id = None;
                ticket.assigned_agent_name = None;
            }
        }
    }

    /// Keep cached agent workloads in step with a ticket moving between
    /// agents or in and out of `Resolved`.
    fn shift_workload(&mut self, before: Option<&Ticket>, after: Option<&Ticket>) {
        if let Some(agent_id) = before.and_then(counted_agent)
            && let Some(agent) = self.agents.get_mut(&agent_id)
        {
            agent.active_ticket_count = (agent.active_ticket_count - 1).max(0);
        }
        if let Some(agent_id) = after.and_then(counted_agent)
            && let Some(agent) = self.agents.get_mut(&agent_id)
        {
            agent.active_ticket_count += 1;
        }
    }

    // ── Views ─────────────────────────────────────────────────────────

    /// Cached tickets, newest first.
    pub fn tickets(&self) -> Vec<&Ticket> {
        let mut tickets: Vec<&Ticket> = self.tickets.values().collect();
        tickets.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        tickets
    }

    /// Cached agents, by name.
    pub fn agents(&self) -> Vec<&Agent> {
        let mut agents: Vec<&Agent> = self.agents.values().collect();
        agents.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        agents
    }

    pub fn active_agents(&self) -> Vec<&Agent> {
        self.agents().into_iter().filter(|a| a.is_active).collect()
    }

    pub fn ticket(&self, id: Uuid) -> Option<&Ticket> {
        self.tickets.get(&id)
    }

    pub fn agent(&self, id: Uuid) -> Option<&Agent> {
        self.agents.get(&id)
    }

    pub fn filters(&self) -> &TicketFilter {
        &self.filters
    }

    pub fn pagination(&self) -> Option<&Pagination> {
        self.pagination.as_ref()
    }

    pub fn connection(&self) -> ConnectionStatus {
        self.connection
    }

    pub fn notifications(&self) -> impl Iterator<Item = &Notification> {
        self.notifications.iter()
    }

    pub fn latest_notification(&self) -> Option<&Notification> {
        self.notifications.back()
    }

    /// Counts over the cached tickets; `total` is the server-side total when known.
    pub fn stats(&self) -> DeskStats {
        let count_status = |s: TicketStatus| self.tickets.values().filter(|t| t.status == s).count();
        let count_priority =
            |p: TicketPriority| self.tickets.values().filter(|t| t.priority == p).count();
        DeskStats {
            total: self
                .pagination
                .map(|p| p.total_count)
                .unwrap_or(self.tickets.len() as i64),
            by_status: TicketStatus::ALL.iter().map(|&s| (s, count_status(s))).collect(),
            by_priority: TicketPriority::ALL
                .iter()
                .map(|&p| (p, count_priority(p)))
                .collect(),
            unassigned: self
                .tickets
                .values()
                .filter(|t| t.assigned_agent_id.is_none())
                .count(),
            active_agents: self.agents.values().filter(|a| a.is_active).count(),
            total_agents: self.agents.len(),
        }
    }
}

/// Agent whose workload counts this ticket, if any.
fn counted_agent(ticket: &Ticket) -> Option<Uuid> {
    if ticket.status == TicketStatus::Resolved {
        None
    } else {
        ticket.assigned_agent_id
    }
}

fn pages_for(total: i64, limit: i64) -> i64 {
    if limit <= 0 {
        0
    } else {
        (total + limit - 1) / limit
    }
}
