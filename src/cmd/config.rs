//! Configuration view and validation commands (`livedesk config`).

use std::path::Path;

use anyhow::{Context, Result};

use livedesk::config::DeskConfig;

use super::super::ConfigCommands;

pub fn cmd_config(
    config: &DeskConfig,
    explicit_path: Option<&Path>,
    command: Option<ConfigCommands>,
) -> Result<()> {
    let config_path = explicit_path
        .map(Path::to_path_buf)
        .unwrap_or_else(DeskConfig::default_path);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Livedesk Configuration");
            println!("======================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No livedesk.toml found at {}", config_path.display());
                println!("Using defaults. Run 'livedesk config init' to create one.");
            }
            println!("Effective values (with env overrides):");
            println!();

            println!("[server]");
            println!("  host = \"{}\"", config.server.host);
            println!("  port = {}", config.server.port);
            println!("  cors_origins = {:?}", config.server.cors_origins);
            println!("  dev = {}", config.server.dev);
            println!();

            println!("[database]");
            println!("  path = \"{}\"", config.database.path.display());
            println!("  seed = {}", config.database.seed);
            println!();

            println!("[realtime]");
            println!("  channel_capacity = {}", config.realtime.channel_capacity);
            println!(
                "  ping_interval_secs = {}",
                config.realtime.ping_interval_secs
            );
            println!("  pong_timeout_secs = {}", config.realtime.pong_timeout_secs);
            println!();

            println!("[logging]");
            println!("  level = \"{}\"", config.logging.level);
            println!("  format = \"{}\"", config.logging.format);
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let problems = config.validate();
            if problems.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration problems:");
                for problem in &problems {
                    println!("  - {}", problem);
                }
                println!();
                anyhow::bail!("{} configuration problem(s) found", problems.len());
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("livedesk.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if let Some(parent) = config_path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create config directory {}", parent.display())
                })?;
            }

            DeskConfig::default().save(&config_path)?;

            println!("Created livedesk.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [server] host, port, cors_origins, dev");
            println!("  - [database] path, seed");
            println!("  - [realtime] channel_capacity, ping_interval_secs, pong_timeout_secs");
            println!("  - [logging] level, format");
            println!();
        }
    }

    Ok(())
}
