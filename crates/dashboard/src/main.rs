mod commands;
mod config;
mod live;
mod logger;
mod render;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use backend_client::HttpBackend;
use config::Config;

#[derive(Parser, Debug)]
#[command(name = "logwatch", about = "Live log feed and AI triage for the log collection backend")]
struct Cli {
    /// Backend base URL (overrides LOGWATCH_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow the most recent logs and trigger analyses from stdin
    Live {
        /// Only show logs of this system
        #[arg(long)]
        system: Option<String>,
        #[arg(long)]
        interval_ms: Option<u64>,
        #[arg(long)]
        window: Option<usize>,
    },
    /// Severity distribution and daily volume per system
    Stats,
    /// Classify one log
    Analyze { log_id: i64 },
    /// List registered systems
    Systems,
    /// List generated reports
    Reports {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Manage ingestion filters (needs LOGWATCH_MASTER_KEY)
    Filters {
        system: String,
        #[command(subcommand)]
        action: FilterAction,
    },
    /// Replace a system's technical notes (needs LOGWATCH_MASTER_KEY)
    Notes { system: String, text: String },
    /// Delete stored logs matching a pattern (needs LOGWATCH_MASTER_KEY)
    Cleanup {
        system: String,
        pattern: String,
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
enum FilterAction {
    List,
    Add { pattern: String },
    Rm { id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    logger::init_logging();

    if let Some(url) = cli.api_url {
        config.api_url = url;
    }
    tracing::debug!(?config, "configuration loaded");
    let backend = Arc::new(HttpBackend::with_timeout(&config.api_url, config.http_timeout)?);

    match cli.command {
        Command::Live { system, interval_ms, window } => {
            let every = interval_ms.map(Duration::from_millis).unwrap_or(config.poll_interval);
            let window = window.unwrap_or(config.window_size);
            live::run(backend, system, every, window).await
        }
        Command::Stats => commands::stats(&backend, config.stats_window).await,
        Command::Analyze { log_id } => commands::analyze(backend, log_id).await,
        Command::Systems => commands::systems(&backend).await,
        Command::Reports { limit } => commands::reports(&backend, limit).await,
        Command::Filters { system, action } => {
            let admin = commands::admin_client(&config)?;
            match action {
                FilterAction::List => commands::list_filters(&admin, &system).await,
                FilterAction::Add { pattern } => commands::add_filter(&admin, &system, &pattern).await,
                FilterAction::Rm { id } => commands::remove_filter(&admin, &system, id).await,
            }
        }
        Command::Notes { system, text } => {
            let admin = commands::admin_client(&config)?;
            commands::notes(&admin, &system, &text).await
        }
        Command::Cleanup { system, pattern, yes } => {
            let admin = commands::admin_client(&config)?;
            commands::cleanup(&admin, &system, &pattern, yes).await
        }
    }
}
