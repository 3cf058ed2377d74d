//! pawmap-discovery - establishment discovery and import
//!
//! Subcommands:
//! - `serve`: HTTP API for the validation queue
//! - `discover`: research one city with the LLM provider and enqueue candidates
//! - `import-file`: import curated batch files
//! - `import-approved`: import approved queue items
//! - `queue`: list or review queue items from the terminal
//!
//! Summaries are printed to stdout as JSON; logs go to stderr. The exit code is
//! non-zero only for setup failures (configuration, unreadable input, store
//! unavailable), never for skipped records or failed batches.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use pawmap_common::config::{resolve_config_path, TomlConfig, CONFIG_ENV_VAR};
use pawmap_common::db::{init_database, load_cities, seed_categories, seed_cities};
use pawmap_discovery::config::resolve_provider_api_key;
use pawmap_discovery::db::queue::{self, EnqueueOutcome};
use pawmap_discovery::db::SqliteEstablishmentStore;
use pawmap_discovery::discovery::{
    CityContext, CityScanReport, DiscoveryAgent, DiscoveryRequest, HttpResearchProvider,
};
use pawmap_discovery::import::{
    collect_batch_paths, load_approved_records, load_batch_file, ImportPipeline,
};
use pawmap_discovery::models::{
    CandidatePlace, ImportOptions, ImportRecord, QueueAction, QueueFilter, QueueStatus,
};
use pawmap_discovery::normalize::{CategoryResolver, CANONICAL_CATEGORIES};
use pawmap_discovery::AppState;

#[derive(Parser, Debug)]
#[command(name = "pawmap-discovery")]
#[command(about = "Discover, review and import dog-friendly establishments")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, env = "PAWMAP_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database file, overrides the configured path
    #[arg(long, global = true, env = "PAWMAP_DATABASE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the validation queue HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Research a city and enqueue candidates for review
    Discover {
        /// City slug (must be a configured city)
        #[arg(long)]
        city: String,
        /// Category to research; repeatable. Defaults to [discovery] default_categories
        #[arg(long = "category")]
        categories: Vec<String>,
        #[arg(long)]
        max_results: Option<u32>,
        /// Language for localized fields; defaults to the city's language
        #[arg(long)]
        language: Option<String>,
        /// Print candidates without enqueueing them
        #[arg(long)]
        no_enqueue: bool,
    },
    /// Import curated batch files (directories import every *.json file)
    ImportFile {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// City for places and files that name none
        #[arg(long)]
        city: Option<String>,
        #[command(flatten)]
        import: ImportArgs,
    },
    /// Import approved validation queue items
    ImportApproved {
        #[arg(long)]
        city: Option<String>,
        #[command(flatten)]
        import: ImportArgs,
    },
    /// Inspect or review the validation queue
    #[command(subcommand)]
    Queue(QueueCommand),
}

#[derive(Args, Debug)]
struct ImportArgs {
    /// Resolve and normalize everything, write nothing
    #[arg(long)]
    dry_run: bool,
    /// Rows per upsert batch (1-200); defaults to [import] batch_size
    #[arg(long)]
    batch_size: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum QueueCommand {
    /// List queue items
    List {
        #[arg(long)]
        status: Option<QueueStatus>,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        min_confidence: Option<i64>,
    },
    /// Approve a pending item
    Approve { id: Uuid },
    /// Reject a pending item
    Reject { id: Uuid },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DiscoverOutput<'a> {
    scan: &'a CityScanReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    enqueue: Option<EnqueueOutcome>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = resolve_config_path(cli.config.as_deref(), CONFIG_ENV_VAR);
    let config = TomlConfig::load_or_default(config_path.as_deref()).with_context(|| {
        format!(
            "Failed to load configuration from {}",
            config_path.as_deref().unwrap_or(Path::new("<defaults>")).display()
        )
    })?;

    init_tracing(&config.logging.level);

    info!(
        "Starting pawmap-discovery v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match &config_path {
        Some(path) if path.exists() => info!("Configuration: {}", path.display()),
        Some(path) => warn!(
            "Config file {} not found, using compiled defaults",
            path.display()
        ),
        None => warn!("No config file found, using compiled defaults"),
    }

    let db_path = cli.database.clone().unwrap_or_else(|| config.database_path());
    info!("Database: {}", db_path.display());
    let pool = init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    seed_categories(&pool, CANONICAL_CATEGORIES)
        .await
        .context("Failed to seed categories")?;
    seed_cities(&pool, &config.cities)
        .await
        .context("Failed to seed cities")?;

    let resolver = Arc::new(CategoryResolver::with_extra_aliases(&config.categories.aliases));

    match cli.command {
        Command::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            serve(pool, &host, port).await
        }
        Command::Discover {
            city,
            categories,
            max_results,
            language,
            no_enqueue,
        } => {
            let city_record = load_cities(&pool)
                .await?
                .into_iter()
                .find(|c| c.slug == city)
                .ok_or_else(|| anyhow!("Unknown city '{}'; add it under [[cities]] in the config", city))?;

            let api_key = resolve_provider_api_key(&pool, &config).await?;
            let provider = HttpResearchProvider::new(&config.provider, api_key)?;
            let agent = DiscoveryAgent::from_config(Arc::new(provider), &config.provider, &config.discovery);

            let request = DiscoveryRequest {
                language: language.unwrap_or_else(|| city_record.language.clone()),
                city: CityContext::from(&city_record),
                categories: if categories.is_empty() {
                    config.discovery.default_categories.clone()
                } else {
                    categories
                },
                max_results: max_results.unwrap_or(config.discovery.max_results),
            };

            let cancel = cancel_on_ctrl_c();
            let report = agent.scan_city(&request, &cancel).await;

            let enqueue = if no_enqueue {
                None
            } else {
                let found: Vec<CandidatePlace> = report.candidates().cloned().collect();
                Some(queue::enqueue_candidates(&pool, &city, &found).await?)
            };

            print_json(&DiscoverOutput {
                scan: &report,
                enqueue,
            })
        }
        Command::ImportFile { paths, city, import } => {
            let files = collect_batch_paths(&paths)?;
            if files.is_empty() {
                bail!("No batch files found");
            }

            let mut records: Vec<ImportRecord> = Vec::new();
            let mut invalid = 0;
            for file in &files {
                let batch = load_batch_file(file, city.as_deref()).await?;
                info!(file = %file.display(), records = batch.records.len(), "Batch file loaded");
                invalid += batch.invalid;
                records.extend(batch.records);
            }

            let pipeline = build_pipeline(&pool, resolver, &config);
            let cancel = cancel_on_ctrl_c();
            let mut summary = pipeline
                .import_records(&records, import_options(&import, &config), &cancel)
                .await?;
            summary.record_invalid(invalid);
            print_json(&summary)
        }
        Command::ImportApproved { city, import } => {
            let records = load_approved_records(&pool, city.as_deref()).await?;
            info!(records = records.len(), "Approved queue items loaded");

            let pipeline = build_pipeline(&pool, resolver, &config);
            let cancel = cancel_on_ctrl_c();
            let summary = pipeline
                .import_records(&records, import_options(&import, &config), &cancel)
                .await?;
            print_json(&summary)
        }
        Command::Queue(QueueCommand::List {
            status,
            city,
            min_confidence,
        }) => {
            let filter = QueueFilter {
                status,
                city,
                min_confidence,
            };
            let items = queue::list_items(&pool, &filter).await?;
            print_json(&items)
        }
        Command::Queue(QueueCommand::Approve { id }) => {
            print_json(&queue::transition(&pool, id, QueueAction::Approve).await?)
        }
        Command::Queue(QueueCommand::Reject { id }) => {
            print_json(&queue::transition(&pool, id, QueueAction::Reject).await?)
        }
    }
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", default_level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn build_pipeline(
    pool: &sqlx::SqlitePool,
    resolver: Arc<CategoryResolver>,
    config: &TomlConfig,
) -> ImportPipeline {
    let store = SqliteEstablishmentStore::new(pool.clone());
    ImportPipeline::new(Arc::new(store), resolver)
        .with_write_timeout(Duration::from_secs(config.import.write_timeout_secs.max(1)))
}

fn import_options(args: &ImportArgs, config: &TomlConfig) -> ImportOptions {
    ImportOptions {
        dry_run: args.dry_run,
        batch_size: args.batch_size.unwrap_or(config.import.batch_size),
    }
}

async fn serve(pool: sqlx::SqlitePool, host: &str, port: u16) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;

    let app = pawmap_discovery::build_router(AppState::new(pool));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Token cancelled on the first Ctrl+C; work already committed stays committed
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl+C, stopping after the current step");
            child.cancel();
        }
    });
    token
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
