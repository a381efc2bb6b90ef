use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, ErrorCode, OptionalExtension, params, params_from_iter};
use uuid::Uuid;

use super::models::*;
use crate::errors::DeskError;

/// Async-safe handle to the desk database.
///
/// Wraps `DeskDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O never
/// ties up async worker threads. The mutex also serialises transactions.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<DeskDb>>,
}

impl DbHandle {
    pub fn new(db: DeskDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R, DeskError>
    where
        F: FnOnce(&DeskDb) -> Result<R, DeskError> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| DeskError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }

    /// Acquire the database mutex synchronously. Only for startup work and
    /// tests; never call this from a request path.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, DeskDb>, DeskError> {
        self.inner.lock().map_err(|_| DeskError::LockPoisoned)
    }
}

pub struct DeskDb {
    conn: Connection,
}

const AGENT_COLUMNS: &str = "a.id, a.name, a.email, a.is_active, a.created_at,
     (SELECT COUNT(*) FROM tickets t WHERE t.assigned_agent_id = a.id AND t.status != 'Resolved')";

const TICKET_COLUMNS: &str = "t.id, t.title, t.description, t.status, t.priority,
     t.assigned_agent_id, a.name, t.created_at, t.updated_at";

impl DeskDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS agents (
                    id TEXT PRIMARY KEY NOT NULL,
                    name TEXT NOT NULL CHECK (length(name) <= 100),
                    email TEXT NOT NULL CHECK (length(email) <= 255),
                    is_active INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL
                );

                CREATE UNIQUE INDEX IF NOT EXISTS idx_agents_email ON agents(email);

                CREATE TABLE IF NOT EXISTS tickets (
                    id TEXT PRIMARY KEY NOT NULL,
                    title TEXT NOT NULL CHECK (length(title) <= 200),
                    description TEXT NOT NULL CHECK (length(description) <= 2000),
                    status TEXT NOT NULL DEFAULT 'Open',
                    priority TEXT NOT NULL DEFAULT 'Medium',
                    assigned_agent_id TEXT REFERENCES agents(id) ON DELETE SET NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets(status);
                CREATE INDEX IF NOT EXISTS idx_tickets_priority ON tickets(priority);
                CREATE INDEX IF NOT EXISTS idx_tickets_assigned_agent ON tickets(assigned_agent_id);
                CREATE INDEX IF NOT EXISTS idx_tickets_created_at ON tickets(created_at);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    /// Run `f` inside a single transaction. The transaction commits only if
    /// `f` returns `Ok`; any error rolls everything back.
    pub fn transaction<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&Self) -> Result<R, E>,
        E: From<anyhow::Error>,
    {
        // Safety: DbHandle's Mutex already guarantees single-threaded access.
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let out = f(self)?;
        tx.commit().context("Failed to commit transaction")?;
        Ok(out)
    }

    // ── Agents ────────────────────────────────────────────────────────

    pub fn insert_agent(&self, name: &str, email: &str) -> Result<Agent> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.conn
            .execute(
                "INSERT INTO agents (id, name, email, is_active, created_at) VALUES (?1, ?2, ?3, 1, ?4)",
                params![id.to_string(), name, email, to_db_time(&now)],
            )
            .context("Failed to insert agent")?;
        self.get_agent(id)?.context("Agent not found after insert")
    }

    pub fn list_agents(&self, is_active: Option<bool>) -> Result<Vec<Agent>> {
        let sql = match is_active {
            Some(_) => format!(
                "SELECT {AGENT_COLUMNS} FROM agents a WHERE a.is_active = ?1 ORDER BY a.name, a.rowid"
            ),
            None => format!("SELECT {AGENT_COLUMNS} FROM agents a ORDER BY a.name, a.rowid"),
        };
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_agents")?;
        let args: Vec<Value> = is_active.map(|b| Value::Integer(b as i64)).into_iter().collect();
        let rows = stmt
            .query_map(params_from_iter(args), AgentRow::from_row)
            .context("Failed to query agents")?;
        let mut agents = Vec::new();
        for row in rows {
            let r = row.context("Failed to read agent row")?;
            agents.push(r.into_agent()?);
        }
        Ok(agents)
    }

    pub fn get_agent(&self, id: Uuid) -> Result<Option<Agent>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {AGENT_COLUMNS} FROM agents a WHERE a.id = ?1"),
                params![id.to_string()],
                AgentRow::from_row,
            )
            .optional()
            .context("Failed to query agent")?;
        row.map(AgentRow::into_agent).transpose()
    }

    /// `Some(is_active)` for an existing agent, `None` if there is no such row.
    pub fn agent_active_flag(&self, id: Uuid) -> Result<Option<bool>> {
        self.conn
            .query_row(
                "SELECT is_active FROM agents WHERE id = ?1",
                params![id.to_string()],
                |row| row.get::<_, bool>(0),
            )
            .optional()
            .context("Failed to query agent status")
    }

    /// Whether `email` belongs to an agent other than `excluding`.
    /// Comparison is exact, so case differences count as distinct emails.
    pub fn email_in_use(&self, email: &str, excluding: Option<Uuid>) -> Result<bool> {
        let excluding = excluding.map(|id| id.to_string());
        self.conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM agents WHERE email = ?1 AND (?2 IS NULL OR id != ?2)",
                params![email, excluding],
                |row| row.get(0),
            )
            .context("Failed to check agent email")
    }

    pub fn update_agent(&self, id: Uuid, name: &str, email: &str) -> Result<bool> {
        let count = self
            .conn
            .execute(
                "UPDATE agents SET name = ?1, email = ?2 WHERE id = ?3",
                params![name, email, id.to_string()],
            )
            .context("Failed to update agent")?;
        Ok(count > 0)
    }

    pub fn set_agent_active(&self, id: Uuid, is_active: bool) -> Result<bool> {
        let count = self
            .conn
            .execute(
                "UPDATE agents SET is_active = ?1 WHERE id = ?2",
                params![is_active, id.to_string()],
            )
            .context("Failed to update agent status")?;
        Ok(count > 0)
    }

    pub fn delete_agent(&self, id: Uuid) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM agents WHERE id = ?1", params![id.to_string()])
            .context("Failed to delete agent")?;
        Ok(count > 0)
    }

    /// Clear the assignment on every ticket owned by `agent_id`, bumping each
    /// ticket's `updated_at`. Returns the ids of the tickets that changed.
    pub fn unassign_agent_tickets(&self, agent_id: Uuid) -> Result<Vec<Uuid>> {
        let dependents: Vec<(String, String)> = {
            let mut stmt = self
                .conn
                .prepare("SELECT id, updated_at FROM tickets WHERE assigned_agent_id = ?1")
                .context("Failed to prepare agent ticket lookup")?;
            let rows = stmt
                .query_map(params![agent_id.to_string()], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })
                .context("Failed to query agent tickets")?;
            rows.collect::<rusqlite::Result<_>>()
                .context("Failed to read agent ticket row")?
        };

        let now = Utc::now();
        let mut unassigned = Vec::with_capacity(dependents.len());
        for (id, updated_at) in dependents {
            let bumped = next_update_time(&parse_db_time(&updated_at)?, now);
            self.conn
                .execute(
                    "UPDATE tickets SET assigned_agent_id = NULL, updated_at = ?1 WHERE id = ?2",
                    params![to_db_time(&bumped), id],
                )
                .context("Failed to unassign ticket")?;
            unassigned.push(parse_uuid(&id)?);
        }
        Ok(unassigned)
    }

    pub fn count_agents(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM agents", [], |row| row.get(0))
            .context("Failed to count agents")
    }

    // ── Tickets ───────────────────────────────────────────────────────

    /// Insert a ticket. Status always starts as `Open`.
    pub fn insert_ticket(&self, new: &NewTicket) -> Result<Ticket> {
        let id = Uuid::new_v4();
        let now = to_db_time(&Utc::now());
        self.conn
            .execute(
                "INSERT INTO tickets (id, title, description, status, priority, assigned_agent_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    id.to_string(),
                    new.title,
                    new.description,
                    TicketStatus::Open.as_str(),
                    new.priority.as_str(),
                    new.assigned_agent_id.map(|a| a.to_string()),
                    now,
                ],
            )
            .context("Failed to insert ticket")?;
        self.get_ticket(id)?.context("Ticket not found after insert")
    }

    pub fn get_ticket(&self, id: Uuid) -> Result<Option<Ticket>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {TICKET_COLUMNS} FROM tickets t
                     LEFT JOIN agents a ON a.id = t.assigned_agent_id
                     WHERE t.id = ?1"
                ),
                params![id.to_string()],
                TicketRow::from_row,
            )
            .optional()
            .context("Failed to query ticket")?;
        row.map(TicketRow::into_ticket).transpose()
    }

    /// One page of tickets matching `filter`, newest first.
    pub fn list_tickets(&self, filter: &TicketFilter, page: PageRequest) -> Result<Vec<Ticket>> {
        let (predicate, mut args) = ticket_predicate(filter);
        let limit_idx = args.len() + 1;
        let offset_idx = args.len() + 2;
        args.push(Value::Integer(page.limit()));
        args.push(Value::Integer(page.offset()));

        let sql = format!(
            "SELECT {TICKET_COLUMNS} FROM tickets t
             LEFT JOIN agents a ON a.id = t.assigned_agent_id
             {predicate}
             ORDER BY t.created_at DESC, t.rowid DESC
             LIMIT ?{limit_idx} OFFSET ?{offset_idx}"
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_tickets")?;
        let rows = stmt
            .query_map(params_from_iter(args), TicketRow::from_row)
            .context("Failed to query tickets")?;
        let mut tickets = Vec::new();
        for row in rows {
            let r = row.context("Failed to read ticket row")?;
            tickets.push(r.into_ticket()?);
        }
        Ok(tickets)
    }

    /// Number of tickets matching `filter`, built from the same predicate as
    /// [`list_tickets`](Self::list_tickets).
    pub fn count_tickets(&self, filter: &TicketFilter) -> Result<i64> {
        let (predicate, args) = ticket_predicate(filter);
        let sql = format!("SELECT COUNT(*) FROM tickets t {predicate}");
        self.conn
            .query_row(&sql, params_from_iter(args), |row| row.get(0))
            .context("Failed to count tickets")
    }

    /// Apply a partial update. Blank title/description are skipped; the
    /// timestamp is refreshed even when no column changes.
    pub fn update_ticket(&self, id: Uuid, patch: &TicketPatch) -> Result<Option<Ticket>> {
        let Some(updated_at) = self.next_ticket_update_time(id)? else {
            return Ok(None);
        };
        self.conn
            .execute(
                "UPDATE tickets SET
                    title = COALESCE(?1, title),
                    description = COALESCE(?2, description),
                    status = COALESCE(?3, status),
                    priority = COALESCE(?4, priority),
                    assigned_agent_id = COALESCE(?5, assigned_agent_id),
                    updated_at = ?6
                 WHERE id = ?7",
                params![
                    patch.effective_title(),
                    patch.effective_description(),
                    patch.status.map(|s| s.as_str()),
                    patch.priority.map(|p| p.as_str()),
                    patch.assigned_agent_id.map(|a| a.to_string()),
                    to_db_time(&updated_at),
                    id.to_string(),
                ],
            )
            .context("Failed to update ticket")?;
        self.get_ticket(id)
    }

    pub fn assign_ticket(&self, id: Uuid, agent_id: Uuid) -> Result<Option<Ticket>> {
        let Some(updated_at) = self.next_ticket_update_time(id)? else {
            return Ok(None);
        };
        self.conn
            .execute(
                "UPDATE tickets SET assigned_agent_id = ?1, updated_at = ?2 WHERE id = ?3",
                params![agent_id.to_string(), to_db_time(&updated_at), id.to_string()],
            )
            .context("Failed to assign ticket")?;
        self.get_ticket(id)
    }

    pub fn delete_ticket(&self, id: Uuid) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM tickets WHERE id = ?1", params![id.to_string()])
            .context("Failed to delete ticket")?;
        Ok(count > 0)
    }

    pub fn ticket_exists(&self, id: Uuid) -> Result<bool> {
        self.conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM tickets WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .context("Failed to check ticket")
    }

    fn next_ticket_update_time(&self, id: Uuid) -> Result<Option<DateTime<Utc>>> {
        let current: Option<String> = self
            .conn
            .query_row(
                "SELECT updated_at FROM tickets WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to read ticket timestamp")?;
        current
            .map(|ts| Ok(next_update_time(&parse_db_time(&ts)?, Utc::now())))
            .transpose()
    }

    // ── Seed data ─────────────────────────────────────────────────────

    /// Insert the starter agents and tickets when the desk is empty.
    /// Returns whether anything was inserted.
    pub fn seed_if_empty(&self) -> Result<bool> {
        if self.count_agents()? > 0 {
            return Ok(false);
        }
        self.transaction(|db: &Self| -> Result<()> {
            let now = to_db_time(&Utc::now());
            for (id, name, email) in SEED_AGENTS {
                db.conn
                    .execute(
                        "INSERT INTO agents (id, name, email, is_active, created_at) VALUES (?1, ?2, ?3, 1, ?4)",
                        params![id, name, email, now],
                    )
                    .context("Failed to insert seed agent")?;
            }
            for (title, description, priority, agent) in SEED_TICKETS {
                let new = NewTicket {
                    title: title.to_string(),
                    description: description.to_string(),
                    priority,
                    assigned_agent_id: agent.map(parse_uuid).transpose()?,
                };
                db.insert_ticket(&new)?;
            }
            Ok(())
        })?;
        Ok(true)
    }
}

const SEED_AGENTS: [(&str, &str, &str); 3] = [
    (
        "11111111-1111-1111-1111-111111111111",
        "John Smith",
        "john.smith@company.com",
    ),
    (
        "22222222-2222-2222-2222-222222222222",
        "Sarah Johnson",
        "sarah.johnson@company.com",
    ),
    (
        "33333333-3333-3333-3333-333333333333",
        "Mike Wilson",
        "mike.wilson@company.com",
    ),
];

const SEED_TICKETS: [(&str, &str, TicketPriority, Option<&str>); 3] = [
    (
        "Login page not loading",
        "Users report a blank screen after submitting credentials.",
        TicketPriority::High,
        Some("11111111-1111-1111-1111-111111111111"),
    ),
    (
        "Invoice PDF has wrong totals",
        "Tax line is counted twice on multi-currency invoices.",
        TicketPriority::Critical,
        Some("22222222-2222-2222-2222-222222222222"),
    ),
    (
        "Feature request: dark mode",
        "Several customers asked for a dark theme in the portal.",
        TicketPriority::Low,
        None,
    ),
];

// ── Predicate builder ─────────────────────────────────────────────────

/// Build the `WHERE` clause for a ticket filter. Both the page query and the
/// count query go through here so they cannot drift apart.
fn ticket_predicate(filter: &TicketFilter) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut args = Vec::new();

    if let Some(status) = filter.status {
        args.push(Value::Text(status.as_str().to_string()));
        clauses.push(format!("t.status = ?{}", args.len()));
    }
    if let Some(priority) = filter.priority {
        args.push(Value::Text(priority.as_str().to_string()));
        clauses.push(format!("t.priority = ?{}", args.len()));
    }
    if let Some(agent) = filter.assigned_agent_id {
        args.push(Value::Text(agent.to_string()));
        clauses.push(format!("t.assigned_agent_id = ?{}", args.len()));
    }
    if let Some(term) = filter.search() {
        args.push(Value::Text(format!("%{}%", escape_like(term))));
        let n = args.len();
        clauses.push(format!(
            "(t.title LIKE ?{n} ESCAPE '\\' OR t.description LIKE ?{n} ESCAPE '\\')"
        ));
    }

    if clauses.is_empty() {
        (String::new(), args)
    } else {
        (format!("WHERE {}", clauses.join(" AND ")), args)
    }
}

fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// ── Timestamps ────────────────────────────────────────────────────────

/// Fixed-width UTC timestamps so lexical order in SQLite matches time order.
fn to_db_time(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_db_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .with_context(|| format!("invalid timestamp in database: '{}'", s))
}

/// A refreshed `updated_at` is always strictly later than the previous one,
/// even if the clock has not visibly advanced at microsecond resolution.
fn next_update_time(previous: &DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let floor = *previous + Duration::microseconds(1);
    if now >= floor { now } else { floor }
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).with_context(|| format!("invalid id in database: '{}'", s))
}

/// True when `err` was caused by a UNIQUE constraint (e.g. the agent email index).
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<rusqlite::Error>() {
        Some(rusqlite::Error::SqliteFailure(e, _)) => e.code == ErrorCode::ConstraintViolation,
        _ => false,
    }
}

// ── Row mapping helpers ───────────────────────────────────────────────

struct AgentRow {
    id: String,
    name: String,
    email: String,
    is_active: bool,
    created_at: String,
    active_ticket_count: i64,
}

impl AgentRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            is_active: row.get(3)?,
            created_at: row.get(4)?,
            active_ticket_count: row.get(5)?,
        })
    }

    fn into_agent(self) -> Result<Agent> {
        Ok(Agent {
            id: parse_uuid(&self.id)?,
            name: self.name,
            email: self.email,
            is_active: self.is_active,
            created_at: parse_db_time(&self.created_at)?,
            active_ticket_count: self.active_ticket_count,
        })
    }
}

struct TicketRow {
    id: String,
    title: String,
    description: String,
    status: String,
    priority: String,
    assigned_agent_id: Option<String>,
    assigned_agent_name: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TicketRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            status: row.get(3)?,
            priority: row.get(4)?,
            assigned_agent_id: row.get(5)?,
            assigned_agent_name: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_ticket(self) -> Result<Ticket> {
        Ok(Ticket {
            id: parse_uuid(&self.id)?,
            title: self.title,
            description: self.description,
            status: self
                .status
                .parse::<TicketStatus>()
                .map_err(|e: String| anyhow::anyhow!(e))
                .context("invalid status in database")?,
            priority: self
                .priority
                .parse::<TicketPriority>()
                .map_err(|e: String| anyhow::anyhow!(e))
                .context("invalid priority in database")?,
            assigned_agent_id: self.assigned_agent_id.as_deref().map(parse_uuid).transpose()?,
            assigned_agent_name: self.assigned_agent_name,
            created_at: parse_db_time(&self.created_at)?,
            updated_at: parse_db_time(&self.updated_at)?,
        })
    }
}
