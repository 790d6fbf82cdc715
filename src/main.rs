mod commands;
mod output;

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use clap::{Parser, Subcommand};
use regula_core::App;
use regula_core::config::{Config, LoggingConfig, resolve_config_path};

/// Regulatory knowledge base: cited answers and compliance gap checks.
#[derive(Debug, Parser)]
#[command(name = "regula", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load, split and embed the documents directory into the vector index.
    Ingest {
        /// Rebuild even when a compatible index already exists.
        #[arg(long)]
        rebuild: bool,
        /// Documents directory; defaults to `paths.documents`.
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Interactive question loop; `quit`, `exit` or `q` ends the session.
    Ask,
    /// Compare practices against the requirements retrieved for a topic.
    Check {
        #[arg(long)]
        topic: String,
        /// Description of current practices.
        #[arg(long)]
        practices: String,
        /// Print the assessment as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Summarize documents or directories.
    Summarize {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_deref());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    init_subscriber(&config.logging)?;
    tracing::debug!(path = %config_path.display(), "config loaded");

    let app = App::from_config(config)
        .await
        .context("failed to initialize regula")?;

    match cli.command {
        Command::Ingest { rebuild, path } => commands::ingest(&app, path, rebuild).await,
        Command::Ask => commands::ask(&app).await,
        Command::Check {
            topic,
            practices,
            json,
        } => commands::check(&app, &topic, &practices, json).await,
        Command::Summarize { paths } => commands::summarize(&app, &paths).await,
    }
}

fn init_subscriber(logging: &LoggingConfig) -> anyhow::Result<()> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let file_layer = match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}
