//! jobharvest command-line interface.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use jobharvest::config::{load_settings, Settings};
use jobharvest::extract::Extractor;
use jobharvest::models::Preferences;
use jobharvest::pipeline::Harvester;
use jobharvest::scrapers::{HttpClient, ResilientFetcher, RetryPolicy, UrlGenerator};
use jobharvest::server::{self, AppState};
use jobharvest::services::{self, DEFAULT_IP_ECHO_URL};
use jobharvest::store::open_store;

#[derive(Parser)]
#[command(name = "jobharvest")]
#[command(about = "Scrape, filter and store job postings", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (TOML, JSON or YAML); discovered automatically when omitted
    #[arg(long, global = true, env = "JOBHARVEST_CONFIG")]
    config: Option<PathBuf>,

    /// Preferences YAML file
    #[arg(long, global = true)]
    preferences: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the harvest pipeline once
    Scrape,

    /// Start the dashboard API
    Serve {
        /// Bind address (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Export every stored posting to CSV
    Export {
        /// Output file (default: jobs_export_<timestamp>.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Manage the store index
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Check that the configured proxies change the egress IP
    ProxyCheck {
        /// IP echo endpoint
        #[arg(long, default_value = DEFAULT_IP_ECHO_URL)]
        url: String,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Create the index if missing
    Create,
    /// Delete the index and everything in it
    Delete,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("jobharvest=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn scrape(settings: &Settings) -> Result<()> {
    let prefs = Preferences::load(&settings.preferences_path).with_context(|| {
        format!(
            "failed to load preferences from {}",
            settings.preferences_path.display()
        )
    })?;

    let engine = &settings.engine;
    let client = HttpClient::from_settings(engine)?;
    let fetcher = ResilientFetcher::new(client, RetryPolicy::from_settings(engine));
    let store = open_store(&settings.store)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current request");
            on_signal.cancel();
        }
    });

    let harvester = Harvester::new(
        Arc::new(fetcher),
        store,
        Extractor::new(&engine.detail_url_template),
        UrlGenerator::from_settings(engine),
        &settings.store.index,
    )
    .with_dedup_key(settings.store.dedup_key)
    .with_concurrency(engine.concurrency)
    .with_cancellation(cancel);

    match harvester.run(&prefs).await {
        Ok(report) => {
            println!("{}", report);
            Ok(())
        }
        Err(e) => {
            error!(stage = %e.stage(), "run failed: {}", e);
            Err(e.into())
        }
    }
}

async fn serve(settings: &Settings, host: Option<String>, port: Option<u16>) -> Result<()> {
    settings.ensure_directories()?;
    let state = AppState::from_settings(settings)?;
    let host = host.unwrap_or_else(|| settings.server.host.clone());
    let port = port.unwrap_or(settings.server.port);
    server::serve(state, &host, port).await
}

async fn export(settings: &Settings, output: Option<PathBuf>) -> Result<()> {
    let store = open_store(&settings.store)?;
    let (path, rows) =
        services::export_to_file(store.as_ref(), &settings.store.index, output.as_deref())
            .await?;
    println!("Exported {} postings to {}", rows, path.display());
    Ok(())
}

async fn index(settings: &Settings, action: IndexAction) -> Result<()> {
    let store = open_store(&settings.store)?;
    let index = &settings.store.index;
    match action {
        IndexAction::Create => {
            if store.create_index(index).await? {
                println!("Created index '{}'", index);
            } else {
                println!("Index '{}' already exists", index);
            }
        }
        IndexAction::Delete => {
            if store.delete_index(index).await? {
                println!("Deleted index '{}'", index);
            } else {
                println!("Index '{}' does not exist", index);
            }
        }
    }
    Ok(())
}

async fn proxy_check(settings: &Settings, url: &str) -> Result<()> {
    let report = services::check_proxies(&settings.engine, url).await?;
    println!("Direct IP: {}", report.direct_ip);
    println!("Proxy IP:  {}", report.proxy_ip);
    println!("Proxy connection verified.");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut settings = load_settings(cli.config.as_deref()).await?;
    if let Some(path) = cli.preferences {
        settings.preferences_path = path;
    }
    info!(store = %settings.store.backend, index = %settings.store.index, "loaded settings");

    match cli.command {
        Commands::Scrape => scrape(&settings).await,
        Commands::Serve { host, port } => serve(&settings, host, port).await,
        Commands::Export { output } => export(&settings, output).await,
        Commands::Index { action } => index(&settings, action).await,
        Commands::ProxyCheck { url } => proxy_check(&settings, &url).await,
    }
}
