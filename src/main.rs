mod api;
mod config;
mod error;
mod feeds;
mod normalize;
mod pipeline;
mod publish;
mod types;
mod util;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::routes::{router, ApiState};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::pipeline::{FeedSet, Pipeline, RunSettings};
use crate::publish::{HotCache, MemoryCache, Publisher, RedisCache, SnapshotStore};
use crate::types::Platform;

#[derive(Parser)]
#[command(name = "market-pulse", about = "Prediction-market ingestion and aggregation")]
struct Cli {
    /// Use an in-process cache instead of Redis (nothing outlives the process)
    #[arg(long, global = true)]
    memory_cache: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one ingestion cycle for one platform
    Ingest {
        #[arg(long, value_parser = parse_platform)]
        platform: Platform,
    },
    /// Rebuild the combined view from the platforms' cached results
    Combine,
    /// Ingest every platform concurrently, then combine
    Cycle,
    /// Serve the read API over the hot cache
    Serve,
}

fn parse_platform(s: &str) -> std::result::Result<Platform, String> {
    s.parse()
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cli, cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, cfg: Config) -> Result<()> {
    let cache = connect_cache(&cfg, cli.memory_cache).await?;
    let now = Utc::now();

    match cli.command {
        Command::Serve => serve(cache, cfg.api_port).await,
        Command::Ingest { platform } => {
            let (pipeline, store, http) = build_pipeline(&cfg, cache).await?;
            let result = pipeline.ingest(&feeds_for(platform, &cfg, &http), now).await;
            store.close().await;
            let run = result?;
            info!(
                platform = %platform,
                catalog = run.catalog_size,
                duplicates = run.duplicates_dropped,
                active = run.summary.active_markets,
                stubs = run.stubs_created,
                stale_dropped = run.stale_dropped,
                "Ingestion complete"
            );
            Ok(())
        }
        Command::Combine => {
            let (pipeline, store, _http) = build_pipeline(&cfg, cache).await?;
            let result = pipeline.combine(now).await;
            store.close().await;
            let combined = result?;
            info!(markets = combined.markets.len(), "Combine complete");
            Ok(())
        }
        Command::Cycle => {
            let (pipeline, store, http) = build_pipeline(&cfg, cache).await?;
            let feeds: Vec<FeedSet> = Platform::ALL.iter().map(|p| feeds_for(*p, &cfg, &http)).collect();
            let result = pipeline.cycle(&feeds, now).await;
            store.close().await;
            let outcome = result?;
            info!(
                markets = outcome.combined.markets.len(),
                vol_24h = outcome.combined.summary.stats.total_volume_24h,
                hottest = outcome.combined.summary.hottest_market.as_ref().map(|m| m.id.as_str()),
                "Cycle complete"
            );
            if outcome.failed.is_empty() {
                Ok(())
            } else {
                let failed: Vec<String> = outcome.failed.iter().map(ToString::to_string).collect();
                Err(AppError::RunsAborted(failed.join(", ")))
            }
        }
    }
}

async fn serve(cache: Arc<dyn HotCache>, port: u16) -> Result<()> {
    let app = router(ApiState { cache });
    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Durable store, shared HTTP client and the pipeline wired to both sinks.
async fn build_pipeline(
    cfg: &Config,
    cache: Arc<dyn HotCache>,
) -> Result<(Pipeline, SnapshotStore, reqwest::Client)> {
    let store = SnapshotStore::connect(&cfg.database_url()).await?;
    info!("Database ready at {}", cfg.db_path);

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.http_timeout_secs))
        .build()?;
    let publisher = Publisher::new(cache, store.clone(), cfg.cache_ttl_secs);
    Ok((Pipeline::new(publisher, RunSettings::from_config(cfg)), store, http))
}

async fn connect_cache(cfg: &Config, in_memory: bool) -> Result<Arc<dyn HotCache>> {
    if in_memory {
        warn!("Using in-process cache; published values are lost on exit");
        return Ok(Arc::new(MemoryCache::new()));
    }
    Ok(Arc::new(RedisCache::connect(&cfg.redis_url).await?))
}

fn feeds_for(platform: Platform, cfg: &Config, http: &reqwest::Client) -> FeedSet {
    match platform {
        Platform::Polymarket => FeedSet::polymarket(cfg, http),
        Platform::Kalshi => FeedSet::kalshi(cfg, http),
    }
}
