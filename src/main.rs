//! News Ingestion Service
//!
//! `run` executes the whole pipeline in one process. `scrape`, `transform`
//! and `load` are the same phases split across process boundaries, handing
//! off through artifacts keyed by run date, for an external scheduler.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info, warn, Instrument};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use news_ingestion::artifacts::ArtifactPaths;
use news_ingestion::config::Config;
use news_ingestion::metrics;
use news_ingestion::pipeline::{self, stages, Pipeline};
use news_ingestion::schemas::{parse_since_date, SearchQuery};
use news_ingestion::sources::{AdapterRegistry, SiteAdapter};
use news_ingestion::storage::SqliteStore;

/// News Ingestion Service - publisher crawl, normalize and load
#[derive(Parser, Debug)]
#[command(name = "news-ingestion")]
#[command(author = "Newsroom Data Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Crawls news publishers and stores normalized articles")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, default_value = "false", global = true)]
    json_logs: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run discovery, extraction, normalization and load in one process
    Run(SearchArgs),

    /// Stage 1: discover and extract into the staging artifact
    Scrape(SearchArgs),

    /// Stage 2: normalize the staging artifact into the transformed artifact
    Transform(DateArgs),

    /// Stage 3: upsert the transformed artifact into the store
    Load(DateArgs),

    /// Show configured sources and store contents
    Status,
}

#[derive(Args, Debug)]
struct SearchArgs {
    /// Search terms (defaults to SEARCH_TERMS)
    #[arg(short, long)]
    query: Option<String>,

    /// Window start: a date (2025-10-16) or a duration back from the run date (1d, 36h)
    #[arg(long, default_value = "1d")]
    since: String,

    #[command(flatten)]
    date: DateArgs,
}

#[derive(Args, Debug)]
struct DateArgs {
    /// Run date, YYYY-MM-DD (defaults to today at the capture offset)
    #[arg(short, long)]
    date: Option<NaiveDate>,
}

/// Sets up structured logging with tracing
fn setup_logging(log_level: &str, json_output: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if json_output {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli.log_level, cli.json_logs);

    let run_id = uuid::Uuid::new_v4().to_string();
    let span = tracing::info_span!("invocation", run_id = %run_id);

    execute(cli.command).instrument(span).await
}

async fn execute(command: Commands) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "Starting News Ingestion Service");

    let config = Config::load().context("loading configuration")?;
    config.validate()?;

    info!(
        sources = ?config.enabled_sources,
        max_concurrent = config.max_concurrent_requests,
        database = %config.database_path.display(),
        "Configuration loaded"
    );

    let result = match command {
        Commands::Run(args) => run(&config, args).await,
        Commands::Scrape(args) => scrape(&config, args).await,
        Commands::Transform(args) => transform(&config, args).await,
        Commands::Load(args) => load(&config, args).await,
        Commands::Status => show_status(&config).await,
    };

    if let Err(ref e) = result {
        error!(error = %e, "Command failed");
    }

    if let Some(ref path) = config.metrics_file {
        if let Err(e) = metrics::write_textfile(path) {
            warn!(path = %path.display(), error = %e, "Failed to write metrics");
        }
    }

    result
}

/// Today at the capture offset, unless overridden
fn run_date(config: &Config, args: &DateArgs) -> Result<NaiveDate> {
    match args.date {
        Some(date) => Ok(date),
        None => Ok(Utc::now().with_timezone(&config.capture_offset()?).date_naive()),
    }
}

fn search_query(config: &Config, args: &SearchArgs) -> Result<SearchQuery> {
    let terms = args
        .query
        .clone()
        .or_else(|| config.search_terms.clone())
        .context("no search terms: pass --query or set SEARCH_TERMS")?;

    let run_date = run_date(config, &args.date)?;
    let since = parse_since_date(&args.since, run_date)?;
    Ok(SearchQuery::new(terms, since, run_date))
}

async fn run(config: &Config, args: SearchArgs) -> Result<()> {
    let query = search_query(config, &args)?;
    let store = SqliteStore::open(&config.database_path).await?;

    let pipeline = Pipeline::from_config(config, Arc::new(store.clone()))?;
    let report = pipeline.run(&query).await?;
    store.close().await;

    println!("\nRun Summary");
    println!("===========");
    println!("Query:      {} ({} .. {})", query.terms, query.since, query.last_day());
    println!("Candidates: {}", report.candidates);
    println!("Extracted:  {}", report.extracted);
    println!("Normalized: {}", report.normalized);
    println!("Dropped:    {}", report.dropped_normalization);
    println!("Stored:     {}", report.stored);
    Ok(())
}

async fn scrape(config: &Config, args: SearchArgs) -> Result<()> {
    let query = search_query(config, &args)?;
    let (harvester, _) = pipeline::build_components(config)?;

    let report = stages::scrape(&harvester, &query, &ArtifactPaths::from_config(config)).await?;
    info!(candidates = report.read, staged = report.written, dropped = report.dropped, "Scrape stage finished");
    Ok(())
}

async fn transform(config: &Config, args: DateArgs) -> Result<()> {
    let run_date = run_date(config, &args)?;
    let (_, normalizer) = pipeline::build_components(config)?;

    let report = stages::transform(&normalizer, &ArtifactPaths::from_config(config), run_date).await?;
    info!(read = report.read, written = report.written, dropped = report.dropped, "Transform stage finished");
    Ok(())
}

async fn load(config: &Config, args: DateArgs) -> Result<()> {
    let run_date = run_date(config, &args)?;
    let store = SqliteStore::open(&config.database_path).await?;

    let report = stages::load(&store, &ArtifactPaths::from_config(config), run_date).await?;
    store.close().await;
    info!(read = report.read, stored = report.written, "Load stage finished");
    Ok(())
}

/// Shows configured sources and a summary of the store
async fn show_status(config: &Config) -> Result<()> {
    let registry = AdapterRegistry::from_config(config)?;

    println!("\nNews Ingestion Service Status");
    println!("=============================\n");

    println!("Configured Sources:");
    for adapter in registry.adapters() {
        let meta = adapter.metadata();
        println!("  - {:<8} {} ({})", meta.id, meta.name, meta.description);
    }

    println!("\nStore ({}):", config.database_path.display());
    if !config.database_path.exists() {
        println!("  Not created yet");
        return Ok(());
    }

    let store = SqliteStore::open(&config.database_path).await?;
    let summary = store.summary().await?;
    store.close().await;

    let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
    println!("  Rows:      {}", summary.rows);
    println!("  Published: {} .. {}", show(&summary.min_published), show(&summary.max_published));
    println!("  Scraped:   {} .. {}", show(&summary.min_scraped), show(&summary.max_scraped));
    if summary.duplicate_urls.is_empty() {
        println!("  Duplicate URLs: none");
    } else {
        println!("  Duplicate URLs:");
        for (url, count) in &summary.duplicate_urls {
            println!("    - {url} ({count})");
        }
    }

    Ok(())
}
