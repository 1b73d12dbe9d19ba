//! turnrelay - relay long-running agent turns to web clients and chat threads
//!
//! - `serve` runs the HTTP API in front of the agent process
//! - `ask` is an interactive terminal client that answers agent questions
//! - `relay` streams one turn into a chat thread

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use turnrelay_core::config::{self, RelayConfig};
use turnrelay_core::constants;

mod ask;
mod relay;
mod serve;

/// turnrelay - agent turn relay
#[derive(Parser)]
#[command(name = "turnrelay")]
#[command(about = "Relay long-running agent turns to web clients and chat threads", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.turnrelay/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Address to bind, overrides `server.bind`
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Start a plan and answer its questions interactively
    Ask {
        prompt: String,

        #[arg(long)]
        project_id: Option<String>,

        /// Working directory for the agent
        #[arg(long)]
        project_path: Option<String>,
    },

    /// Stream one turn into a chat thread
    Relay {
        /// Prompt for a new plan (omit when answering)
        prompt: Option<String>,

        /// Answer to a pending question
        #[arg(long, requires = "session")]
        answer: Option<String>,

        /// Session to resume with `--answer`
        #[arg(long)]
        session: Option<String>,

        #[arg(long)]
        plan: Option<String>,

        #[arg(long)]
        channel: String,

        /// Thread to reply in
        #[arg(long)]
        thread: Option<String>,
    },
}

fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(default_filter())
        .with_writer(std::io::stderr)
        .init();
}

/// Log to a file so the interactive terminal stays clean
fn init_file_logging() -> Result<()> {
    let dir = config::data_dir()?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create data directory {:?}", dir))?;
    let log_file = std::fs::File::create(dir.join(constants::paths::LOG_FILE_NAME))
        .context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_env_filter(default_filter())
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn default_filter() -> EnvFilter {
    EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Ask { .. } => init_file_logging()?,
        _ => init_stderr_logging(),
    }

    let config = RelayConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { bind } => serve::run(config, bind).await,
        Commands::Ask {
            prompt,
            project_id,
            project_path,
        } => ask::run(config, prompt, project_id, project_path).await,
        Commands::Relay {
            prompt,
            answer,
            session,
            plan,
            channel,
            thread,
        } => {
            let turn = match (prompt, answer) {
                (_, Some(answer)) => relay::Turn::Continue {
                    answer,
                    session_id: session.unwrap_or_default(),
                    plan_id: plan,
                },
                (Some(prompt), None) => relay::Turn::Start(prompt),
                (None, None) => anyhow::bail!("Either a prompt or --answer is required"),
            };
            relay::run(config, turn, channel, thread).await
        }
    }
}
