use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, put},
};
use serde::Deserialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::agents::AgentService;
use super::db::DbHandle;
#[cfg(test)]
use super::db::DeskDb;
use super::events::BroadcastSink;
use super::models::*;
use super::tickets::TicketService;
use super::ws::Keepalive;
use crate::errors::DeskError;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub agents: AgentService,
    pub tickets: TicketService,
    pub ws_tx: broadcast::Sender<String>,
    pub keepalive: Keepalive,
}

impl AppState {
    /// Wire both services to publish onto `ws_tx`.
    pub fn new(db: DbHandle, ws_tx: broadcast::Sender<String>, keepalive: Keepalive) -> Self {
        let sink = Arc::new(BroadcastSink::new(ws_tx.clone()));
        Self {
            agents: AgentService::new(db.clone(), sink.clone()),
            tickets: TicketService::new(db, sink),
            ws_tx,
            keepalive,
        }
    }
}

pub type SharedState = Arc<AppState>;

// ── Query types ───────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentQuery {
    pub is_active: Option<bool>,
}

/// Raw ticket list query. Enum values are parsed case-insensitively.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketQuery {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub assigned_agent_id: Option<String>,
    pub search_term: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl TicketQuery {
    fn into_parts(self) -> Result<(TicketFilter, PageRequest), ApiError> {
        let status = non_empty(self.status)
            .map(|s| s.parse::<TicketStatus>())
            .transpose()
            .map_err(ApiError::BadRequest)?;
        let priority = non_empty(self.priority)
            .map(|p| p.parse::<TicketPriority>())
            .transpose()
            .map_err(ApiError::BadRequest)?;
        let assigned_agent_id = non_empty(self.assigned_agent_id)
            .map(|id| Uuid::parse_str(&id))
            .transpose()
            .map_err(|_| ApiError::BadRequest("Invalid assignedAgentId".to_string()))?;
        let filter = TicketFilter {
            status,
            priority,
            assigned_agent_id,
            search_term: self.search_term,
        };
        Ok((filter, PageRequest::new(self.page, self.limit)))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<DeskError> for ApiError {
    fn from(err: DeskError) -> Self {
        match err {
            DeskError::Validation(msg) => ApiError::BadRequest(msg),
            e @ (DeskError::AgentNotFound { .. } | DeskError::TicketNotFound { .. }) => {
                ApiError::NotFound(e.to_string())
            }
            e => {
                // Details stay in the server log.
                tracing::error!(error = ?e, "request failed");
                ApiError::Internal("An unexpected error occurred".to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// A path segment that is not a UUID cannot name an existing row.
fn parse_id(raw: &str, kind: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound(format!("{} {} not found", kind, raw)))
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/agents", get(list_agents).post(create_agent))
        .route(
            "/api/agents/{id}",
            get(get_agent).put(update_agent).delete(delete_agent),
        )
        .route("/api/agents/{id}/toggle-status", put(toggle_agent_status))
        .route("/api/tickets", get(list_tickets).post(create_ticket))
        .route(
            "/api/tickets/{id}",
            get(get_ticket).put(update_ticket).delete(delete_ticket),
        )
        .route("/api/tickets/{id}/assign", put(assign_ticket))
        .route("/health", get(health_check))
}

// ── Health ────────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

// ── Agent handlers ────────────────────────────────────────────────────

async fn list_agents(
    State(state): State<SharedState>,
    query: Result<Query<AgentQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let agents = state.agents.list(query.is_active).await?;
    Ok(Json(agents))
}

async fn get_agent(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "Agent")?;
    Ok(Json(state.agents.get(id).await?))
}

async fn create_agent(
    State(state): State<SharedState>,
    body: Result<Json<AgentInput>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(input) = body?;
    let agent = state.agents.create(input).await?;
    let location = format!("/api/agents/{}", agent.id);
    Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(agent)))
}

async fn update_agent(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    body: Result<Json<AgentInput>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "Agent")?;
    let Json(input) = body?;
    Ok(Json(state.agents.update(id, input).await?))
}

async fn delete_agent(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "Agent")?;
    state.agents.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn toggle_agent_status(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "Agent")?;
    let change = state.agents.toggle_active(id).await?;
    Ok(Json(change.agent))
}

// ── Ticket handlers ───────────────────────────────────────────────────

async fn list_tickets(
    State(state): State<SharedState>,
    query: Result<Query<TicketQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let (filter, page) = query.into_parts()?;
    Ok(Json(state.tickets.list(filter, page).await?))
}

async fn get_ticket(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "Ticket")?;
    Ok(Json(state.tickets.get(id).await?))
}

async fn create_ticket(
    State(state): State<SharedState>,
    body: Result<Json<NewTicket>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(new) = body?;
    let ticket = state.tickets.create(new).await?;
    let location = format!("/api/tickets/{}", ticket.id);
    Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(ticket)))
}

async fn update_ticket(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    body: Result<Json<TicketPatch>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "Ticket")?;
    let Json(patch) = body?;
    Ok(Json(state.tickets.update(id, patch).await?))
}

async fn delete_ticket(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "Ticket")?;
    state.tickets.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn assign_ticket(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    body: Result<Json<AssignTicket>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "Ticket")?;
    let Json(req) = body?;
    Ok(Json(state.tickets.assign(id, req.agent_id).await?))
}

// ── Tests ─────────────────────────────────────────────────────────────
