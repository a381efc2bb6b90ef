//! Terminal client for a running desk server.
//!
//! | Module      | Responsibility                                             |
//! |-------------|------------------------------------------------------------|
//! | `http`      | `DeskClient`, typed calls for every REST endpoint          |
//! | `live`      | WebSocket feed with reconnect backoff                      |
//! | `store`     | `DeskStore`, the client cache reconciled through `Action`s |
//! | `dashboard` | Text rendering of the store and of list results            |
//!
//! API responses and live events both become [`store::Action`]s, so a ticket
//! saved by this client and the `TicketCreated` event for the same ticket
//! collapse onto one cached entry.

pub mod dashboard;
pub mod http;
pub mod live;
pub mod store;

pub use http::{DeskClient, TicketListParams};
pub use store::{Action, DeskStore};
