//! aas-access CLI
//!
//! Inspects the endpoint catalog and resolves authentication headers for
//! remote AAS servers from the terminal.

mod config;
mod display;
mod prompt;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{debug, info, warn};

use aas_access::{
    AccessCoordinator, ChainResolver, CredentialStore, EnvResolver, JsonFileStore, LocationKey,
};

use crate::config::AccessConfig;
use crate::prompt::ConsolePromptResolver;

/// Exit status after Ctrl-C, following the shell's `128 + SIGINT`.
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (default: ~/.config/aas-access/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List known endpoints
    Catalog,

    /// Show which endpoint a location matches
    Match {
        /// Server URL or host
        location: String,
    },

    /// Resolve the authentication header for a location
    Resolve {
        /// Server URL or host
        location: String,

        /// Also ask for locations that match no endpoint
        #[arg(long)]
        ask_unknown: bool,

        /// Print the header value instead of redacting it
        #[arg(long)]
        reveal: bool,
    },

    /// Forget every cached and stored credential
    Forget,
}

/// Initializes structured logging with tracing.
///
/// Supports two output formats via `AAS_ACCESS_LOG_FORMAT` environment variable:
/// - `json`: Machine-readable JSON logs
/// - `pretty`: Human-readable formatted logs (default)
///
/// Log level is controlled via `RUST_LOG` environment variable.
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let format = std::env::var("AAS_ACCESS_LOG_FORMAT")
        .unwrap_or_else(|_| "pretty".to_string())
        .to_lowercase();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("aas_access=warn,aas_access_cli=warn"));

    match format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .init();
        }
        _ => {
            fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .init();
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<AccessConfig> {
    let config = match path {
        Some(path) => AccessConfig::from_path(path)?,
        None => AccessConfig::load()?,
    };
    Ok(config)
}

fn build_coordinator(config: &AccessConfig) -> AccessCoordinator {
    let resolver = ChainResolver::new()
        .with(Arc::new(EnvResolver::new()))
        .with(Arc::new(ConsolePromptResolver::new()));

    AccessCoordinator::new(config.catalog())
        .with_resolver(Arc::new(resolver))
        .with_settings(config.settings.coordinator_settings())
}

fn open_store(config: &AccessConfig) -> Option<JsonFileStore> {
    config.settings.store_path.as_ref().map(JsonFileStore::new)
}

async fn resolve(
    config: &AccessConfig,
    location: &str,
    ask_unknown: bool,
    reveal: bool,
) -> Result<()> {
    let coordinator = build_coordinator(config);
    let store = open_store(config);

    if let Some(store) = &store {
        let summary = coordinator.preseed(store.load()?);
        debug!(inserted = summary.inserted, "Restored credentials");
    }

    let ask = ask_unknown || config.settings.ask_for_unknown;
    let resolution = coordinator.interactive_determine_authenticate_header(location, ask);
    let Some(outcome) = until_interrupted(resolution, tokio::signal::ctrl_c()).await else {
        // A console prompt may still be blocked reading the terminal. The
        // runtime waits for blocking tasks on shutdown, so leave the process
        // directly instead of returning through `main`.
        warn!("Interrupted");
        eprintln!("{} Resolution interrupted", "✗".bright_red());
        std::process::exit(INTERRUPTED_EXIT_CODE);
    };
    let outcome = outcome?;

    match outcome {
        Some(item) => display::display_header(&item, reveal),
        None => display::display_none(coordinator.state_of(location)),
    }

    if let Some(store) = &store {
        store.save(&coordinator.snapshot())?;
        info!(path = %store.path().display(), "Flushed credentials");
    }

    Ok(())
}

/// Runs `future` until it completes or `interrupt` fires first.
///
/// Dropping `future` on interrupt cancels the in-flight resolution, which
/// wakes any other waiter on the same location with a cancellation.
async fn until_interrupted<F, I>(future: F, interrupt: I) -> Option<F::Output>
where
    F: Future,
    I: Future,
{
    tokio::select! {
        output = future => Some(output),
        _ = interrupt => None,
    }
}

fn forget(config: &AccessConfig) -> Result<()> {
    let coordinator = build_coordinator(config);
    let store = open_store(config);

    if let Some(store) = &store {
        coordinator.preseed(store.load()?);
    }
    let removed = coordinator.clear_all_credentials();

    if let Some(store) = &store {
        store.clear()?;
    }

    println!(
        "{} Forgot {removed} credential(s)",
        "✓".bright_green()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Catalog => {
            if config.endpoints.is_empty() {
                println!("No endpoints configured");
            }
            for (index, endpoint) in config.endpoints.iter().enumerate() {
                display::display_endpoint(index, endpoint);
            }
        }
        Command::Match { location } => {
            let key = LocationKey::normalize(&location)
                .with_context(|| format!("Invalid location: {location:?}"))?;
            let catalog = config.catalog();
            display::display_match(&key, catalog.match_location(&location));
        }
        Command::Resolve {
            location,
            ask_unknown,
            reveal,
        } => resolve(&config, &location, ask_unknown, reveal).await?,
        Command::Forget => forget(&config)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_interrupt_abandons_blocked_resolution() {
        let (release, blocked) = std::sync::mpsc::channel::<()>();
        let resolution = async move {
            tokio::task::spawn_blocking(move || blocked.recv().is_ok())
                .await
                .is_ok()
        };

        let outcome = until_interrupted(resolution, std::future::ready(())).await;
        assert!(outcome.is_none());
        drop(release);
    }

    #[tokio::test]
    async fn test_completed_resolution_wins() {
        let outcome = until_interrupted(
            std::future::ready(7),
            tokio::time::sleep(Duration::from_secs(60)),
        )
        .await;
        assert_eq!(outcome, Some(7));
    }
}
