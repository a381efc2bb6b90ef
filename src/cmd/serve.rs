//! Server commands (`livedesk serve` and `livedesk init`).

use std::path::Path;

use anyhow::Result;

use livedesk::config::{CliOverrides, DeskConfig};
use livedesk::desk::server::{self, ServerConfig};

pub async fn cmd_serve(mut config: DeskConfig, overrides: &CliOverrides) -> Result<()> {
    config.apply_cli(overrides);

    let problems = config.validate();
    if !problems.is_empty() {
        for problem in &problems {
            eprintln!("  - {}", problem);
        }
        anyhow::bail!("Refusing to start with an invalid configuration");
    }

    server::start_server(ServerConfig::from(&config)).await
}

pub fn cmd_init(db_path: &Path, seed: bool) -> Result<()> {
    let db = server::open_database(db_path, seed)?;
    println!("Desk database initialized at {}", db_path.display());
    if seed {
        println!("{} agent(s) on file", db.count_agents()?);
    }
    Ok(())
}
