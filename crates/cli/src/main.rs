//! jvmctl
//!
//! A command-line tool for inspecting JVM heap and GC configuration,
//! either locally or through a node's agent.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{agent, local};
use std::path::PathBuf;
use std::time::Duration;

/// JVM configuration inspector
#[derive(Parser)]
#[command(name = "jvmctl")]
#[command(
    author,
    version,
    about = "Inspect effective JVM heap and GC configuration",
    long_about = None
)]
pub struct Cli {
    /// Agent API endpoint URL (can also be set via JVMCTL_API_URL env var)
    #[arg(long, env = "JVMCTL_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve the configuration of a JVM running on this host
    Inspect {
        /// Process ID
        pid: u32,

        /// Skip the live attach and resolve from environment and command line only
        #[arg(long)]
        no_attach: bool,

        /// procfs mount point
        #[arg(long, default_value = "/proc")]
        proc_root: PathBuf,

        /// Attach timeout in milliseconds
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
    },

    /// Resolve a configuration offline from a command line and environment options
    Resolve {
        /// Full java command line
        #[arg(long)]
        cmdline: String,

        /// Option variable as KEY=VALUE (repeatable)
        #[arg(long = "env", value_name = "KEY=VALUE")]
        env: Vec<String>,
    },

    /// List JVMs monitored by the agent
    List,

    /// Show one JVM monitored by the agent
    Show {
        /// Process ID
        pid: u32,
    },

    /// Show node pressure
    Pressure {
        /// Read procfs directly instead of asking the agent
        #[arg(long)]
        local: bool,

        /// procfs mount point for --local
        #[arg(long, default_value = "/proc")]
        proc_root: PathBuf,
    },

    /// Show recent OOM kills recorded by the agent
    Ooms,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::Config::load()?;
    let format = config.format(cli.format)?;
    let api_url = config.api_url(cli.api_url.as_deref());
    if cli.verbose {
        eprintln!("Using agent API at {}", api_url);
    }
    let api_client = || client::ApiClient::new(&api_url);

    match cli.command {
        Commands::Inspect {
            pid,
            no_attach,
            proc_root,
            timeout_ms,
        } => {
            local::inspect(pid, no_attach, &proc_root, Duration::from_millis(timeout_ms), format)
                .await?;
        }
        Commands::Resolve { cmdline, env } => {
            local::resolve(&cmdline, &env, format)?;
        }
        Commands::Pressure {
            local: true,
            proc_root,
        } => {
            local::pressure(&proc_root, format).await?;
        }
        Commands::Pressure { local: false, .. } => agent::pressure(&api_client()?, format).await?,
        Commands::List => agent::list(&api_client()?, format).await?,
        Commands::Show { pid } => agent::show(&api_client()?, pid, format).await?,
        Commands::Ooms => agent::ooms(&api_client()?, format).await?,
    }

    Ok(())
}
