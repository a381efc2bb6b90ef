//! Shared UI icons and emojis.
//!
//! Each icon carries an ASCII fallback that `console` uses when the terminal
//! cannot render emoji.

use console::Emoji;

use crate::client::store::{ConnectionStatus, NotificationLevel};
use crate::desk::models::{TicketPriority, TicketStatus};

// Outcome indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static INFO: Emoji<'_, '_> = Emoji("💬 ", "[i]");

// Ticket status
pub static OPEN: Emoji<'_, '_> = Emoji("📬 ", "[O]");
pub static IN_PROGRESS: Emoji<'_, '_> = Emoji("🔧 ", "[>]");
pub static RESOLVED: Emoji<'_, '_> = Emoji("✔️  ", "[R]");

// Dashboard sections
pub static PROGRESS: Emoji<'_, '_> = Emoji("📊 ", "[STATS]");
pub static AGENT: Emoji<'_, '_> = Emoji("🧑 ", "[A]");
pub static TICKET: Emoji<'_, '_> = Emoji("🎫 ", "[T]");

// Connection
pub static LIVE: Emoji<'_, '_> = Emoji("🟢 ", "[LIVE]");
pub static CONNECTING: Emoji<'_, '_> = Emoji("🟡 ", "[..]");
pub static OFFLINE: Emoji<'_, '_> = Emoji("🔴 ", "[OFF]");

pub fn status_icon(status: TicketStatus) -> &'static Emoji<'static, 'static> {
    match status {
        TicketStatus::Open => &OPEN,
        TicketStatus::InProgress => &IN_PROGRESS,
        TicketStatus::Resolved => &RESOLVED,
    }
}

pub fn connection_icon(status: ConnectionStatus) -> &'static Emoji<'static, 'static> {
    match status {
        ConnectionStatus::Connected => &LIVE,
        ConnectionStatus::Connecting => &CONNECTING,
        ConnectionStatus::Disconnected => &OFFLINE,
    }
}

pub fn notification_icon(level: NotificationLevel) -> &'static Emoji<'static, 'static> {
    match level {
        NotificationLevel::Info => &INFO,
        NotificationLevel::Success => &CHECK,
        NotificationLevel::Error => &CROSS,
    }
}

/// Priority marker: more bangs for more urgency.
pub fn priority_marker(priority: TicketPriority) -> &'static str {
    match priority {
        TicketPriority::Low => "·",
        TicketPriority::Medium => "!",
        TicketPriority::High => "!!",
        TicketPriority::Critical => "!!!",
    }
}
