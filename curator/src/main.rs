use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use tracing::{error, info};

use curator::config::{Category, Config};
use curator::digest::{summarizer, DigestGenerator};
use curator::error::Result;
use curator::orchestrator::Orchestrator;
use curator::store::{SearchFilters, Store};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(name = "curator")]
#[command(author, version, about = "Content aggregation and digest pipeline", long_about = None)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the ingest orchestrator over all enabled sources, or one source.
    Ingest {
        #[arg(long)]
        all: bool,
        #[arg(long)]
        source: Option<String>,
    },
    /// Show configured sources, their health, and item counts.
    Status,
    /// Full-text search over ingested items.
    Search {
        query: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        lang: Option<String>,
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        days: Option<i64>,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Run the denoise/scoring/quota pipeline and render a digest.
    Digest {
        #[arg(long)]
        date: Option<String>,
    },
    /// Database maintenance.
    Vacuum {
        #[arg(long)]
        optimize_fts: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "curator exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(&cli.config)?;
    let store = Arc::new(
        Store::open(
            &PathBuf::from(&config.storage.db_path),
            config.storage.cache_size_kib,
        )
        .await?,
    );

    match cli.command {
        Commands::Ingest { all, source } => cmd_ingest(&config, store, all, source).await,
        Commands::Status => cmd_status(&config, store).await,
        Commands::Search {
            query,
            category,
            lang,
            source,
            days,
            limit,
        } => cmd_search(store, query, category, lang, source, days, limit).await,
        Commands::Digest { date } => cmd_digest(&config, store, date).await,
        Commands::Vacuum { optimize_fts } => cmd_vacuum(store, optimize_fts).await,
    }
}

async fn cmd_ingest(
    config: &Config,
    store: Arc<Store>,
    all: bool,
    source: Option<String>,
) -> Result<()> {
    let orchestrator = Orchestrator::new(store, config);
    orchestrator.sync_sources().await?;

    let source_ids = if all { None } else { source.map(|id| vec![id]) };
    let summary = orchestrator.ingest(source_ids.as_deref()).await;

    println!(
        "{:<24} {:>8} {:>9} {:>11} {:>7} {:>9}",
        "source", "fetched", "inserted", "duplicates", "errors", "seconds"
    );
    for result in &summary.results {
        println!(
            "{:<24} {:>8} {:>9} {:>11} {:>7} {:>9.2}",
            result.source_id,
            result.fetched,
            result.inserted,
            result.duplicates,
            result.errors,
            result.duration_seconds
        );
        if let Some(msg) = &result.error_message {
            println!("    error: {msg}");
        }
    }
    println!(
        "\ntotal: fetched={} inserted={} duplicates={} errors={} in {:.2}s",
        summary.total_fetched,
        summary.total_inserted,
        summary.total_duplicates,
        summary.total_errors,
        summary.duration_seconds
    );
    info!(inserted = summary.total_inserted, "ingest command complete");
    Ok(())
}

async fn cmd_status(config: &Config, store: Arc<Store>) -> Result<()> {
    let orchestrator = Orchestrator::new(store.clone(), config);
    orchestrator.sync_sources().await?;

    let enabled = store.list_enabled_sources().await?;
    let disabled = store.get_disabled_source_ids().await?;
    let stats = store.stats().await?;

    println!("enabled sources ({}):", enabled.len());
    for source in &enabled {
        let fetch = source
            .last_fetch_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        let error = source.last_error.as_deref().unwrap_or("-");
        println!(
            "  {:<20} last_fetch={fetch} errors={} last_error={error}",
            source.id, source.error_count
        );
    }
    if !disabled.is_empty() {
        println!("disabled sources: {}", disabled.join(", "));
    }
    println!(
        "\nstore: {} items across {} sources ({} bytes)",
        stats.total_items, stats.total_sources, stats.size_bytes
    );
    for (category, count) in &stats.by_category {
        println!("  {category}: {count}");
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_search(
    store: Arc<Store>,
    query: String,
    category: Option<String>,
    lang: Option<String>,
    source: Option<String>,
    days: Option<i64>,
    limit: i64,
) -> Result<()> {
    let filters = SearchFilters {
        category: category.and_then(|c| c.parse::<Category>().ok()),
        language: lang,
        source_id: source,
        since: days.map(|d| Utc::now() - ChronoDuration::days(d)),
        limit,
        offset: 0,
    };
    let results = store.search(&query, filters).await?;
    let count = store.search_count(&query).await?;
    for item in &results {
        println!("[{}] {} — {}", item.source_id, item.title, item.url);
    }
    println!("\n{} of {} total matches", results.len(), count);
    Ok(())
}

async fn cmd_digest(config: &Config, store: Arc<Store>, date: Option<String>) -> Result<()> {
    let date = date.unwrap_or_else(|| Utc::now().format("%Y-%m-%d").to_string());
    let items = store.get_items_for_date(&date).await?;

    let summarizer = summarizer::build(&config.llm);
    let now = Utc::now();
    let generator = DigestGenerator::new(config, now, summarizer.as_ref());
    let (digests, metrics) = generator.generate(items, &date).await;

    store.upsert_metrics(metrics).await?;
    for digest in digests {
        println!("{}", digest.content_markdown);
        store.save_digest(digest).await?;
    }
    info!(date, "digest command complete");
    Ok(())
}

async fn cmd_vacuum(store: Arc<Store>, optimize_fts: bool) -> Result<()> {
    store.vacuum().await?;
    if optimize_fts {
        store.optimize_fts().await?;
    }
    let ok = store.integrity_check().await?;
    println!("vacuum complete; integrity_check={ok}");
    Ok(())
}
