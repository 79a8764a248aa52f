//! smithers-crawl - Main entry point
//!
//! Runs one crawl batch over the configured sources, or administers the
//! source list.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use smithers_common::config::{load_toml_config, resolve_config_path, resolve_database_path};
use smithers_common::db::{init_database, AdapterKind, NewSource, SourceFilter};
use smithers_crawl::adapters::{build_http_client, MangadexAdapter, WebtoonAdapter};
use smithers_crawl::{AdapterDispatch, BatchOrchestrator, Scheduler, SqliteStore, UpdateStore};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

const DEFAULT_LOG_FILTER: &str = "smithers_crawl=info,smithers_common=info";

/// Command-line arguments for smithers-crawl
#[derive(Parser, Debug)]
#[command(name = "smithers-crawl")]
#[command(about = "Crawl tracked series for newly published chapters")]
#[command(version)]
struct Cli {
    /// Bootstrap config file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, global = true, value_name = "FILE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one crawl batch (default)
    Run(RunArgs),

    /// Manage tracked sources
    #[command(subcommand)]
    Sources(SourcesCommand),
}

#[derive(clap::Args, Debug, Default)]
struct RunArgs {
    /// Only crawl these sources
    #[arg(long = "source", value_name = "UUID")]
    sources: Vec<Uuid>,

    /// Only crawl sources of this adapter kind
    #[arg(long, value_name = "KIND")]
    adapter: Option<String>,
}

impl RunArgs {
    fn filter(&self) -> SourceFilter {
        SourceFilter {
            source_ids: self.sources.clone(),
            adapter: self.adapter.as_deref().map(AdapterKind::from),
        }
    }

    /// Failure log context describing this invocation
    fn context(&self) -> String {
        let sources = if self.sources.is_empty() {
            "all".to_string()
        } else {
            self.sources
                .iter()
                .map(Uuid::to_string)
                .collect::<Vec<_>>()
                .join(",")
        };
        format!(
            "run sources={} adapter={}",
            sources,
            self.adapter.as_deref().unwrap_or("any")
        )
    }
}

#[derive(Subcommand, Debug)]
enum SourcesCommand {
    /// Register a new source
    Add {
        /// Display name
        #[arg(long)]
        name: String,

        /// Adapter kind (webtoon, mangadex)
        #[arg(long)]
        adapter: String,

        /// Series identifier on the source site
        #[arg(long = "ref", value_name = "REF")]
        external_ref: String,
    },

    /// List registered sources
    List,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; a config file's level replaces the default once
    // loaded, unless RUST_LOG is set
    let env_filter = EnvFilter::try_from_default_env().ok();
    let from_env = env_filter.is_some();
    let (filter, filter_handle) =
        reload::Layer::new(env_filter.unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER)));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = resolve_config_path(cli.config.as_deref());
    let config = load_toml_config(config_path.as_deref()).context("Failed to load configuration")?;

    if !from_env && config_path.is_some() {
        match EnvFilter::try_new(&config.logging.level) {
            Ok(level) => filter_handle
                .reload(level)
                .context("Failed to apply configured log level")?,
            Err(e) => warn!(
                "Invalid log level '{}', keeping {}: {}",
                config.logging.level, DEFAULT_LOG_FILTER, e
            ),
        }
    }

    info!("Starting smithers-crawl");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let db_path = resolve_database_path(cli.database.as_deref(), &config);
    info!("Database: {}", db_path.display());

    let pool = init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    let store = SqliteStore::with_precision(pool, config.crawl.chapter_precision);

    let result = match cli.command.unwrap_or(Command::Run(RunArgs::default())) {
        Command::Run(args) => run_batch(&store, &config, &args).await,
        Command::Sources(SourcesCommand::Add {
            name,
            adapter,
            external_ref,
        }) => add_source(&store, name, adapter, external_ref).await,
        Command::Sources(SourcesCommand::List) => list_sources(&store).await,
    };

    store.close().await;
    result
}

async fn run_batch(
    store: &SqliteStore,
    config: &smithers_common::config::TomlConfig,
    args: &RunArgs,
) -> Result<()> {
    let mut scheduler = Scheduler::from_config(&config.scheduler);
    let http_client = build_http_client().context("Failed to build HTTP client")?;

    let mut dispatch = AdapterDispatch::new();
    dispatch.register_with(Arc::new(WebtoonAdapter::new(http_client.clone())), &mut scheduler);
    dispatch.register_with(Arc::new(MangadexAdapter::new(http_client)), &mut scheduler);

    let store: Arc<dyn UpdateStore> = Arc::new(store.clone());
    let orchestrator = BatchOrchestrator::new(
        store,
        dispatch,
        scheduler.write_queue().clone(),
        &config.crawl,
    );

    let report = orchestrator
        .run_logged(&args.filter(), Some(args.context()))
        .await
        .context("Crawl run failed")?;

    for failure in &report.failures {
        error!("{}", failure);
    }
    info!(
        "Crawl finished: {} succeeded, {} failed",
        report.succeeded(),
        report.failed()
    );

    Ok(())
}

async fn add_source(
    store: &SqliteStore,
    name: String,
    adapter: String,
    external_ref: String,
) -> Result<()> {
    let adapter = AdapterKind::from(adapter.as_str());
    if let AdapterKind::Unsupported(kind) = &adapter {
        anyhow::bail!("Unknown adapter '{}' (expected webtoon or mangadex)", kind);
    }

    let source = store
        .add_source(&NewSource {
            name,
            adapter,
            external_ref,
        })
        .await
        .context("Failed to add source")?;

    info!(source_id = %source.id, "Source added");
    println!("{}\t{}\t{}\t{}", source.id, source.adapter, source.external_ref, source.name);

    Ok(())
}

async fn list_sources(store: &SqliteStore) -> Result<()> {
    let sources = store
        .list_sources(&SourceFilter::all())
        .await
        .context("Failed to list sources")?;

    for source in sources {
        let status = match source.last_success {
            Some(true) => "ok",
            Some(false) => "failed",
            None => "never",
        };
        let attempted = source
            .last_attempted_on
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            source.id, source.adapter, source.external_ref, status, attempted, source.name
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }

    #[test]
    fn test_configured_level_reloads_installed_filter() {
        let (filter, handle) = reload::Layer::<_, tracing_subscriber::Registry>::new(
            EnvFilter::new(DEFAULT_LOG_FILTER),
        );
        let _subscriber = tracing_subscriber::registry().with(filter);

        assert!(handle.reload(EnvFilter::try_new("debug").unwrap()).is_ok());
    }

    #[test]
    fn test_run_is_default_command() {
        let cli = Cli::parse_from(["smithers-crawl", "--database", "/tmp/x.db"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.database, Some(PathBuf::from("/tmp/x.db")));
    }
}
