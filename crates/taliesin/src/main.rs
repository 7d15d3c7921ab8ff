//! Taliesin - IT support chat assistant
//!
//! Main entry point for the Taliesin CLI.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

use commands::{admins, ask, chat, config, records};
use taliesin_chat::Language;

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Taliesin - IT support chat assistant
#[derive(Parser)]
#[command(name = "taliesin")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config directory override
    #[arg(long, global = true, env = "TALIESIN_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    /// Reply language: en, si, or ta
    #[arg(short, long, global = true)]
    pub language: Option<Language>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Enter interactive chat mode (REPL)
    Chat(chat::ChatArgs),

    /// Ask a one-shot question
    Ask(ask::AskArgs),

    /// Administrator account management
    Admins(admins::AdminsArgs),

    /// Browse recorded incidents, emails, feedback, and sessions
    Records(records::RecordsArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = taliesin_config::load_config_with_options(None, cli.config_dir.as_deref())?;

    // Initialize tracing — console (human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "taliesin=debug,taliesin_chat=debug,taliesin_llm=debug,taliesin_store=debug,taliesin_config=debug,info"
    } else {
        "taliesin=info,taliesin_chat=info,taliesin_llm=info,taliesin_store=info,warn"
    };

    let log_dir = taliesin_config::log_dir(&loaded.config)
        .unwrap_or_else(|| std::path::PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "taliesin.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "taliesin=trace,taliesin_chat=trace,taliesin_llm=trace,taliesin_store=trace,taliesin_config=trace,info",
                )),
        )
        .init();

    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }

    // Create context for commands
    let ctx = commands::Context {
        config: loaded.config,
        language: cli.language,
        verbose: cli.verbose,
    };

    // Dispatch to command handlers
    match cli.command {
        Commands::Chat(args) => chat::run(args, &ctx).await,
        Commands::Ask(args) => ask::run(args, &ctx).await,
        Commands::Admins(args) => admins::run(args, &ctx).await,
        Commands::Records(args) => records::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}
