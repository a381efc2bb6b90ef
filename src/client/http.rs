use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::desk::models::*;
use crate::errors::ClientError;

/// Typed client for the desk REST API.
#[derive(Debug, Clone)]
pub struct DeskClient {
    base_url: String,
    http: reqwest::Client,
}

/// Query for `GET /api/tickets`. Absent fields are left to server defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TicketListParams {
    pub filter: TicketFilter,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl TicketListParams {
    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(status) = self.filter.status {
            pairs.push(("status", status.to_string()));
        }
        if let Some(priority) = self.filter.priority {
            pairs.push(("priority", priority.to_string()));
        }
        if let Some(agent) = self.filter.assigned_agent_id {
            pairs.push(("assignedAgentId", agent.to_string()));
        }
        if let Some(term) = self.filter.search() {
            pairs.push(("searchTerm", term.to_string()));
        }
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        pairs
    }
}

impl DeskClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// WebSocket endpoint derived from the HTTP base URL.
    pub fn ws_url(&self) -> String {
        let base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.base_url.clone()
        };
        format!("{}/ws", base)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn health(&self) -> Result<bool, ClientError> {
        let resp = self.http.get(self.url("/health")).send().await?;
        Ok(resp.status().is_success())
    }

    // ── Agents ────────────────────────────────────────────────────────

    pub async fn list_agents(&self, is_active: Option<bool>) -> Result<Vec<Agent>, ClientError> {
        let mut req = self.http.get(self.url("/api/agents"));
        if let Some(active) = is_active {
            req = req.query(&[("isActive", active)]);
        }
        decode(req.send().await?).await
    }

    pub async fn get_agent(&self, id: Uuid) -> Result<Agent, ClientError> {
        let resp = self.http.get(self.url(&format!("/api/agents/{}", id))).send().await?;
        decode(resp).await
    }

    pub async fn create_agent(&self, input: &AgentInput) -> Result<Agent, ClientError> {
        let resp = self.http.post(self.url("/api/agents")).json(input).send().await?;
        decode(resp).await
    }

    pub async fn update_agent(&self, id: Uuid, input: &AgentInput) -> Result<Agent, ClientError> {
        let resp = self
            .http
            .put(self.url(&format!("/api/agents/{}", id)))
            .json(input)
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn toggle_agent(&self, id: Uuid) -> Result<Agent, ClientError> {
        let resp = self
            .http
            .put(self.url(&format!("/api/agents/{}/toggle-status", id)))
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn delete_agent(&self, id: Uuid) -> Result<(), ClientError> {
        let resp = self
            .http
            .delete(self.url(&format!("/api/agents/{}", id)))
            .send()
            .await?;
        expect_empty(resp).await
    }

    // ── Tickets ───────────────────────────────────────────────────────

    pub async fn list_tickets(&self, params: &TicketListParams) -> Result<TicketPage, ClientError> {
        let resp = self
            .http
            .get(self.url("/api/tickets"))
            .query(&params.query_pairs())
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn get_ticket(&self, id: Uuid) -> Result<Ticket, ClientError> {
        let resp = self.http.get(self.url(&format!("/api/tickets/{}", id))).send().await?;
        decode(resp).await
    }

    pub async fn create_ticket(&self, new: &NewTicket) -> Result<Ticket, ClientError> {
        let resp = self.http.post(self.url("/api/tickets")).json(new).send().await?;
        decode(resp).await
    }

    pub async fn update_ticket(&self, id: Uuid, patch: &TicketPatch) -> Result<Ticket, ClientError> {
        let resp = self
            .http
            .put(self.url(&format!("/api/tickets/{}", id)))
            .json(patch)
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn assign_ticket(&self, id: Uuid, agent_id: Uuid) -> Result<Ticket, ClientError> {
        let resp = self
            .http
            .put(self.url(&format!("/api/tickets/{}/assign", id)))
            .json(&AssignTicket { agent_id })
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn delete_ticket(&self, id: Uuid) -> Result<(), ClientError> {
        let resp = self
            .http
            .delete(self.url(&format!("/api/tickets/{}", id)))
            .send()
            .await?;
        expect_empty(resp).await
    }
}

// ── Response helpers ──────────────────────────────────────────────────

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    let status = resp.status();
    let bytes = resp.bytes().await?;
    if !status.is_success() {
        return Err(api_error(status, &bytes));
    }
    Ok(serde_json::from_slice(&bytes)?)
}

async fn expect_empty(resp: Response) -> Result<(), ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    let bytes = resp.bytes().await?;
    Err(api_error(status, &bytes))
}

/// Prefer the server's `{"error": ...}` message; fall back to the reason phrase.
fn api_error(status: StatusCode, body: &[u8]) -> ClientError {
    let message = serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Unexpected response")
                .to_string()
        });
    ClientError::Api {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_url_from_base() {
        assert_eq!(
            DeskClient::new("http://127.0.0.1:5080/").ws_url(),
            "ws://127.0.0.1:5080/ws"
        );
        assert_eq!(
            DeskClient::new("https://desk.example.com").ws_url(),
            "wss://desk.example.com/ws"
        );
    }

    #[test]
    fn test_query_pairs_skip_absent_and_blank() {
        let agent = Uuid::new_v4();
        let params = TicketListParams {
            filter: TicketFilter {
                status: Some(TicketStatus::InProgress),
                priority: None,
                assigned_agent_id: Some(agent),
                search_term: Some("  ".to_string()),
            },
            page: Some(2),
            limit: None,
        };
        assert_eq!(
            params.query_pairs(),
            vec![
                ("status", "InProgress".to_string()),
                ("assignedAgentId", agent.to_string()),
                ("page", "2".to_string()),
            ]
        );
    }

    #[test]
    fn test_api_error_uses_server_message() {
        let err = api_error(StatusCode::BAD_REQUEST, br#"{"error":"Title is required"}"#);
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "Title is required (HTTP 400)");

        let err = api_error(StatusCode::BAD_GATEWAY, b"<html>");
        assert_eq!(err.to_string(), "Bad Gateway (HTTP 502)");
    }
}
