//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module          | Commands handled                                   |
//! |-----------------|----------------------------------------------------|
//! | `serve`         | `Serve`, `Init`                                    |
//! | `config`        | `Config`                                           |
//! | `dashboard`     | `Dashboard`                                        |
//! | `tickets`       | `Tickets`                                          |
//! | `agents`        | `Agents`                                           |

pub mod agents;
pub mod config;
pub mod dashboard;
pub mod serve;
pub mod tickets;

pub use agents::cmd_agents;
pub use config::cmd_config;
pub use dashboard::cmd_dashboard;
pub use serve::{cmd_init, cmd_serve};
pub use tickets::cmd_tickets;

use livedesk::client::dashboard::notification_line;
use livedesk::client::store::Notification;
use livedesk::errors::ClientError;

/// Turn a client failure into the command's error.
///
/// The server's own message is the whole story for a rejected request.
/// Anything else also gets a notification line naming the server.
pub(crate) fn client_failure(server: &str, err: ClientError) -> anyhow::Error {
    match err {
        ClientError::Api { message, .. } => anyhow::anyhow!(message),
        other => {
            eprintln!(
                "{}",
                notification_line(&Notification::error(format!(
                    "Could not talk to the desk server at {}",
                    server
                )))
            );
            anyhow::Error::new(other)
        }
    }
}

/// Print a success line for a completed mutation.
pub(crate) fn report_success(message: impl Into<String>) {
    println!("{}", notification_line(&Notification::success(message)));
}
