use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use livedesk::config::{DeskConfig, LogFormat};
use livedesk::desk::models::{TicketPriority, TicketStatus};

mod cmd;

#[derive(Parser)]
#[command(name = "livedesk")]
#[command(version, about = "Live support desk: tickets, agents, and a live dashboard")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Path to livedesk.toml. Defaults to .livedesk/livedesk.toml when present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Base URL of the desk server, for client commands
    #[arg(
        long,
        global = true,
        env = "LIVEDESK_SERVER",
        default_value = "http://127.0.0.1:5080"
    )]
    pub server: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the desk server
    Serve {
        #[arg(short, long)]
        port: Option<u16>,

        #[arg(long)]
        host: Option<String>,

        /// Database path
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Enable dev mode (permissive CORS when no origins are configured)
        #[arg(long)]
        dev: bool,

        /// Insert starter agents and tickets into an empty database
        #[arg(long)]
        seed: bool,
    },
    /// Create the database and run migrations without starting the server
    Init {
        #[arg(long)]
        db_path: Option<PathBuf>,

        #[arg(long)]
        seed: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Live dashboard of tickets and agents
    Dashboard {
        /// Render once and exit instead of following the live feed
        #[arg(long)]
        once: bool,
    },
    /// Manage tickets on a running server
    Tickets {
        #[command(subcommand)]
        command: TicketCommands,
    },
    /// Manage agents on a running server
    Agents {
        #[command(subcommand)]
        command: AgentCommands,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the resolved configuration
    Show,
    /// Validate configuration and show any problems
    Validate,
    /// Write a default livedesk.toml
    Init,
}

#[derive(Subcommand, Clone)]
pub enum TicketCommands {
    /// List tickets, newest first
    List {
        #[arg(long)]
        status: Option<TicketStatus>,

        #[arg(long)]
        priority: Option<TicketPriority>,

        /// Only tickets assigned to this agent
        #[arg(long)]
        agent: Option<Uuid>,

        /// Match against title and description
        #[arg(short, long)]
        search: Option<String>,

        #[arg(long)]
        page: Option<i64>,

        #[arg(long)]
        limit: Option<i64>,
    },
    /// Show one ticket
    Show { id: Uuid },
    /// Open a new ticket
    Create {
        #[arg(short, long)]
        title: String,

        #[arg(short, long)]
        description: String,

        #[arg(short, long, default_value = "Medium")]
        priority: TicketPriority,

        /// Assign to this agent on creation
        #[arg(long)]
        agent: Option<Uuid>,
    },
    /// Change fields on a ticket; omitted fields are left alone
    Update {
        id: Uuid,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(short, long)]
        status: Option<TicketStatus>,

        #[arg(short, long)]
        priority: Option<TicketPriority>,

        #[arg(long)]
        agent: Option<Uuid>,
    },
    /// Assign a ticket to an active agent
    Assign { id: Uuid, agent: Uuid },
    /// Delete a ticket
    Delete { id: Uuid },
}

#[derive(Subcommand, Clone)]
pub enum AgentCommands {
    /// List agents by name
    List {
        /// Filter by active flag
        #[arg(long)]
        active: Option<bool>,
    },
    /// Add an agent
    Create {
        #[arg(short, long)]
        name: String,

        #[arg(short, long)]
        email: String,
    },
    /// Change an agent's name or email
    Update {
        id: Uuid,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long)]
        email: Option<String>,
    },
    /// Flip an agent between active and inactive
    Toggle { id: Uuid },
    /// Delete an agent, unassigning their tickets
    Delete { id: Uuid },
}

fn init_tracing(cli: &Cli, config: &DeskConfig) {
    let level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json || config.logging.format == LogFormat::Json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = match &cli.command {
        // The file being created need not exist yet.
        Commands::Config {
            command: Some(ConfigCommands::Init),
        } => DeskConfig::default(),
        _ => DeskConfig::resolve(cli.config.as_deref())?,
    };
    init_tracing(&cli, &config);

    match &cli.command {
        Commands::Serve {
            port,
            host,
            db_path,
            dev,
            seed,
        } => {
            let overrides = livedesk::config::CliOverrides {
                host: host.clone(),
                port: *port,
                db_path: db_path.clone(),
                dev: *dev,
                seed: *seed,
            };
            cmd::cmd_serve(config, &overrides).await?;
        }
        Commands::Init { db_path, seed } => {
            let path = db_path.clone().unwrap_or(config.database.path.clone());
            cmd::cmd_init(&path, *seed || config.database.seed)?;
        }
        Commands::Config { command } => {
            cmd::cmd_config(&config, cli.config.as_deref(), command.clone())?
        }
        Commands::Dashboard { once } => cmd::cmd_dashboard(&cli.server, *once).await?,
        Commands::Tickets { command } => cmd::cmd_tickets(&cli.server, command.clone()).await?,
        Commands::Agents { command } => cmd::cmd_agents(&cli.server, command.clone()).await?,
    }

    Ok(())
}
