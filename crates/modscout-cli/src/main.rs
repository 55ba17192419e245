#![deny(unsafe_code)]

//! modscout CLI: one-shot module queries and the tool server.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use modscout_config::AppConfig;
use modscout_core::ModuleEngine;
use modscout_core::build_info::BuildInfo;
use modscout_core::server::{self, AppState, DEFAULT_SEARCH_LIMIT};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// modscout: verified registry modules and their source for AI assistants.
#[derive(Parser)]
#[command(name = "modscout", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "modscout.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the tool endpoints over HTTP.
    Serve {
        /// Override `server.listen_addr`.
        #[arg(long)]
        addr: Option<String>,

        /// Override `server.listen_port`.
        #[arg(long)]
        port: Option<u16>,
    },

    /// Search the registry.
    Search {
        query: String,

        #[arg(short, long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },

    /// Show a module's inputs, outputs, providers and dependencies.
    Details { module_id: String },

    /// List a module's root, examples and submodules.
    List { module_id: String },

    /// Fetch files from a module's repository.
    Get {
        module_id: String,

        /// Directory or file relative to the module root.
        #[arg(short, long, default_value = "")]
        path: String,

        /// Glob a file must match (repeatable).
        #[arg(short, long = "include")]
        include: Vec<String>,

        /// Glob to exclude (repeatable). Replaces the default test-file excludes.
        #[arg(short, long = "exclude")]
        exclude: Vec<String>,

        /// Drop the default test-file excludes without adding any.
        #[arg(long)]
        no_default_excludes: bool,
    },

    /// Probe the registry and repository host.
    Health,

    /// Print build metadata.
    Version,

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, loaded) = load_config(&cli.config).await?;
    init_tracing(cli.verbose, &config.logging.level);
    if loaded {
        debug!(path = %cli.config.display(), "Loaded configuration");
    } else {
        info!(path = %cli.config.display(), "Config file not found, using defaults");
    }

    match cli.command {
        Commands::Serve { addr, port } => cmd_serve(&config, addr, port).await?,
        Commands::Search { query, limit } => {
            let engine = connect(&config)?;
            print_json(&engine.search_modules(&query, limit).await?)?;
        }
        Commands::Details { module_id } => {
            let engine = connect(&config)?;
            print_json(&engine.get_module_details(&module_id).await?)?;
        }
        Commands::List { module_id } => {
            let engine = connect(&config)?;
            print_json(&engine.list_content(&module_id).await?)?;
        }
        Commands::Get {
            module_id,
            path,
            include,
            exclude,
            no_default_excludes,
        } => {
            let engine = connect(&config)?;
            let exclude = exclude_override(&exclude, no_default_excludes);
            let bundle = engine
                .get_content(&module_id, &path, &include, exclude.as_deref())
                .await?;
            print_json(&bundle)?;
        }
        Commands::Health => {
            let engine = connect(&config)?;
            print_json(&engine.health().await)?;
        }
        Commands::Version => print_json(&BuildInfo::current())?,
        Commands::Config { show } => cmd_config(&cli.config, &config, show)?,
    }

    Ok(())
}

/// Explicit exclude list, or `None` for the default test-file excludes.
fn exclude_override(exclude: &[String], no_default_excludes: bool) -> Option<Vec<String>> {
    (no_default_excludes || !exclude.is_empty()).then(|| exclude.to_vec())
}

/// `RUST_LOG` wins, then `-v`, then `logging.level`.
fn filter_directive(verbose: u8, configured: &str) -> String {
    match verbose {
        0 => configured.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

fn init_tracing(verbose: u8, configured: &str) {
    let directive = filter_directive(verbose, configured);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn connect(config: &AppConfig) -> Result<ModuleEngine> {
    ModuleEngine::connect(config).context("failed to set up upstream clients")
}

async fn cmd_serve(config: &AppConfig, addr: Option<String>, port: Option<u16>) -> Result<()> {
    let addr = listen_addr(config, addr.as_deref(), port)?;
    let state = AppState::new(connect(config)?);

    info!(%addr, version = %modscout_core::build_info::version_string(), "Starting modscout");
    server::serve(addr, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    })
    .await
    .context("tool server failed")
}

fn listen_addr(config: &AppConfig, addr: Option<&str>, port: Option<u16>) -> Result<SocketAddr> {
    let host = addr.unwrap_or(&config.server.listen_addr);
    let port = port.unwrap_or(config.server.listen_port);
    format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))
}

fn cmd_config(config_path: &Path, config: &AppConfig, show: bool) -> Result<()> {
    if show {
        let toml_str = toml::to_string_pretty(config).context("failed to render configuration")?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", config_path.display());
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Load the file if it exists, else defaults, then apply `MODSCOUT_*`
/// overrides. Returns whether a file was read.
async fn load_config(path: &Path) -> Result<(AppConfig, bool)> {
    let (mut config, loaded) = if path.exists() {
        let config = AppConfig::load(path)
            .await
            .with_context(|| format!("failed to load {}", path.display()))?;
        (config, true)
    } else {
        (AppConfig::default(), false)
    };
    config
        .apply_env_overrides()
        .context("invalid MODSCOUT_* environment override")?;
    Ok((config, loaded))
}
