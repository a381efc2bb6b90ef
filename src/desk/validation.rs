//! Field-shape checks applied before anything touches the store.
//!
//! Each check returns the first problem found as a `DeskError::Validation`
//! carrying a message suitable for showing to the user verbatim.

use std::sync::LazyLock;

use regex::Regex;

use super::models::*;
use crate::errors::DeskError;

// Local part, one @, and a dotted domain. Deliberately loose.
static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email)
}

pub fn validate_agent(input: &AgentInput) -> Result<(), DeskError> {
    required("Name", &input.name)?;
    max_len("Name", &input.name, AGENT_NAME_MAX)?;
    required("Email", &input.email)?;
    max_len("Email", &input.email, AGENT_EMAIL_MAX)?;
    if !is_valid_email(&input.email) {
        return Err(DeskError::validation("Invalid email format"));
    }
    Ok(())
}

pub fn validate_new_ticket(ticket: &NewTicket) -> Result<(), DeskError> {
    required("Title", &ticket.title)?;
    max_len("Title", &ticket.title, TICKET_TITLE_MAX)?;
    required("Description", &ticket.description)?;
    max_len("Description", &ticket.description, TICKET_DESCRIPTION_MAX)?;
    Ok(())
}

/// Only non-blank text fields are checked; blank ones are skipped by the
/// update anyway.
pub fn validate_patch(patch: &TicketPatch) -> Result<(), DeskError> {
    if let Some(title) = patch.effective_title() {
        max_len("Title", title, TICKET_TITLE_MAX)?;
    }
    if let Some(description) = patch.effective_description() {
        max_len("Description", description, TICKET_DESCRIPTION_MAX)?;
    }
    Ok(())
}

fn required(field: &str, value: &str) -> Result<(), DeskError> {
    if value.trim().is_empty() {
        return Err(DeskError::validation(format!("{} is required", field)));
    }
    Ok(())
}

fn max_len(field: &str, value: &str, max: usize) -> Result<(), DeskError> {
    if value.chars().count() > max {
        return Err(DeskError::validation(format!(
            "{} cannot exceed {} characters",
            field, max
        )));
    }
    Ok(())
}
