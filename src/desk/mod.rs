//! Support desk back-end: agents, tickets, and live fan-out.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Client  │ ───────> │  server.rs  (axum Router, DeskServer, CORS)      │
//! │          │ <─────── │    └─ api.rs  (route handlers, AppState)         │
//! └──────────┘ WebSocket│         │                                        │
//!      ^                │         │ AgentService / TicketService           │
//!      │                │         v                                        │
//!      │                │  agents.rs, tickets.rs  (rules, cascades)        │
//!      │                │         │                   │                    │
//!      │                │         │ DbHandle::call()  │ EventSink::publish │
//!      │                │         v                   v                    │
//!      │                │  db.rs (SQLite)       events.rs ──> ws.rs ───────┼──┐
//!      │                └──────────────────────────────────────────────────┘  │
//!      └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module       | Responsibility                                           |
//! |--------------|----------------------------------------------------------|
//! | `models`     | `Agent`, `Ticket`, inputs, filters, pagination           |
//! | `validation` | Field-shape checks (required, lengths, email)            |
//! | `events`     | `DeskEvent` wire enum and the `EventSink` seam           |
//!
//! ## Typical Request Flow (deactivate an agent)
//!
//! 1. `PUT /api/agents/{id}/toggle-status` → `api::toggle_agent_status()`
//! 2. `AgentService::toggle_active()` opens one transaction: flip the flag,
//!    clear the assignment on every ticket the agent holds, bump their
//!    `updated_at`, commit.
//! 3. Only after commit, an `AgentStatusChanged` event listing the
//!    unassigned tickets goes to the `EventSink`, which serialises it onto
//!    the broadcast channel.
//! 4. Each connected socket in `ws.rs` forwards the frame to its client.

pub mod agents;
pub mod api;
pub mod db;
pub mod events;
pub mod models;
pub mod server;
pub mod tickets;
pub mod validation;
pub mod ws;
