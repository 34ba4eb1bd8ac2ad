//! OSDF CLI
//!
//! Administrative front end for the reactive routing engine.
//!
//! # Usage
//!
//! ```bash
//! osdf policy create profile1 -a web -p 50 --region r1
//! osdf policy create video -a video-streaming --region r1 --dst-region r2 --action inter
//! osdf policy list --format json
//! osdf replay scenario.json
//! osdf policy remove 0
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod output;

#[derive(Parser)]
#[command(name = "osdf")]
#[command(author = "OSDF")]
#[command(version)]
#[command(about = "OSDF reactive routing command line interface", long_about = None)]
struct Cli {
    /// Output format
    #[arg(long, short, global = true)]
    format: Option<output::OutputFormat>,

    /// Policy state file
    #[arg(long, global = true, env = "OSDF_STATE")]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage policies
    Policy {
        #[command(subcommand)]
        action: PolicyCommands,
    },
    /// Run captured packets through the engine
    Replay {
        /// Scenario file (JSON)
        scenario: PathBuf,
        /// Engine configuration (JSON), overrides the config file
        #[arg(long)]
        engine_config: Option<PathBuf>,
    },
    /// Configure CLI
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum PolicyCommands {
    /// Create a policy
    Create {
        /// Traffic profile name
        profile: String,
        /// Application type
        #[arg(short, long)]
        application: Option<String>,
        /// Priority
        #[arg(short, long)]
        priority: Option<String>,
        /// Connect points the path must visit (dev/port,dev/port)
        #[arg(long)]
        via: Option<String>,
        /// Path selection algorithm
        #[arg(long)]
        psa: Option<String>,
        /// Region
        #[arg(long)]
        region: String,
        /// Destination region for inter-region policies
        #[arg(long)]
        dst_region: Option<String>,
        /// intra or inter
        #[arg(long)]
        action: Option<String>,
        /// Source host ids (MAC/VLAN,...)
        #[arg(long)]
        src_hosts: Option<String>,
        /// Destination host ids (MAC/VLAN,...)
        #[arg(long)]
        dst_hosts: Option<String>,
    },
    /// List policies
    List,
    /// Get policy details
    Get { id: String },
    /// Remove a policy and withdraw its rules
    Remove { id: String },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Initialize configuration
    Init,
    /// Show configuration
    Show,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let ctx = commands::Context::new(config::Config::load()?, cli.state, cli.format)?;
    match cli.command {
        Commands::Policy { action } => commands::policies::handle(action, &ctx),
        Commands::Replay { scenario, engine_config } => {
            commands::replay::handle(&scenario, engine_config.as_deref(), &ctx).await
        }
        Commands::Config { action } => commands::config::handle(action, &ctx),
    }
}
