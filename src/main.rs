//! crypto-trend: collect subreddit posts, tag them with a cryptocurrency and a
//! sentiment score, and serve the stored trend table over HTTP.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crypto_trend_aggregator::api::{self, AppState};
use crypto_trend_aggregator::classify::CryptoClassifier;
use crypto_trend_aggregator::config::{AppConfig, LiveSource};
use crypto_trend_aggregator::ingest::backfill::{parse_boundary, run_backfill};
use crypto_trend_aggregator::ingest::config::load_keywords_default;
use crypto_trend_aggregator::ingest::providers::pushshift::PushshiftConnector;
use crypto_trend_aggregator::ingest::providers::reddit::RedditConnector;
use crypto_trend_aggregator::ingest::providers::twitter::TwitterConnector;
use crypto_trend_aggregator::ingest::types::SourceConnector;
use crypto_trend_aggregator::ingest::scheduler::{spawn_live_scheduler, LiveJob, LiveSchedulerCfg};
use crypto_trend_aggregator::ingest::Pipeline;
use crypto_trend_aggregator::metrics::Metrics;
use crypto_trend_aggregator::sentiment::LexiconScorer;
use crypto_trend_aggregator::store::TrendStore;

#[derive(Parser, Debug)]
#[command(name = "crypto-trend", version, about = "Subreddit crypto sentiment aggregator")]
struct Cli {
    /// SQLite database file (overrides TREND_DB_PATH).
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Periodic ingestion of the most recent posts.
    Live {
        /// Run a single pass and exit.
        #[arg(long)]
        once: bool,
        #[arg(long)]
        limit: Option<usize>,
        /// Live connector (overrides TREND_LIVE_SOURCE).
        #[arg(long, value_enum)]
        source: Option<LiveSource>,
        /// Also serve `/metrics` on this address while ingesting.
        #[arg(long, env = "TREND_METRICS_BIND")]
        metrics_bind: Option<String>,
    },
    /// One-off sweep of a historical range `[start, end)`.
    Backfill {
        /// YYYY-MM-DD or RFC3339.
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        #[arg(long)]
        chunk_secs: Option<i64>,
        #[arg(long, env = "TREND_METRICS_BIND")]
        metrics_bind: Option<String>,
    },
    /// Serve the read API and `/metrics`.
    Serve {
        #[arg(long)]
        bind: Option<String>,
        /// Run the periodic live job in this process too.
        #[arg(long)]
        with_live: bool,
    },
}

/// JSON logs when TREND_LOG_JSON=1, compact text otherwise.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("crypto_trend_aggregator=info,info"));

    let json = std::env::var("TREND_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

fn live_connector(cfg: &AppConfig) -> Result<Arc<dyn SourceConnector>> {
    let connector: Arc<dyn SourceConnector> = match cfg.live_source {
        LiveSource::Reddit => Arc::new(
            RedditConnector::new(cfg.subreddit.clone())
                .with_credentials(cfg.reddit_credentials())
                .with_user_agent(cfg.reddit_user_agent.clone()),
        ),
        LiveSource::Twitter => {
            let token = cfg
                .twitter_bearer_token
                .clone()
                .context("TWITTER_BEARER_TOKEN is required for the twitter source")?;
            Arc::new(TwitterConnector::new(token, cfg.twitter_query.clone()))
        }
    };
    Ok(connector)
}

fn live_job(cfg: &AppConfig, store: Arc<TrendStore>, limit: usize) -> Result<Arc<LiveJob>> {
    let connector = live_connector(cfg)?;
    tracing::info!(source = connector.name(), limit, "live job configured");
    let pipeline = Arc::new(build_pipeline(cfg, store)?);
    Ok(Arc::new(LiveJob::new(pipeline, connector, limit)))
}

/// Install the recorder and expose `/metrics` when an address is given.
async fn maybe_metrics(bind: Option<&str>) -> Result<Option<Metrics>> {
    let Some(bind) = bind else {
        return Ok(None);
    };
    let metrics = Metrics::init()?;
    metrics.spawn_server(bind).await?;
    Ok(Some(metrics))
}

fn build_pipeline(cfg: &AppConfig, store: Arc<TrendStore>) -> Result<Pipeline> {
    let table = load_keywords_default().context("loading crypto keyword table")?;
    tracing::info!(cryptos = table.len(), "keyword table loaded");
    Ok(Pipeline::new(
        CryptoClassifier::new(table),
        Arc::new(LexiconScorer::new()),
        store,
        cfg.retry_policy(),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let mut cfg = AppConfig::from_env();
    if let Some(db) = cli.db {
        cfg.db_path = db;
    }

    // Without a store there is nothing to do.
    let store = Arc::new(TrendStore::open(&cfg.db_path)?);

    match cli.command {
        Command::Live {
            once,
            limit,
            source,
            metrics_bind,
        } => {
            if let Some(source) = source {
                cfg.live_source = source;
            }
            let _metrics = maybe_metrics(metrics_bind.as_deref()).await?;
            let limit = limit.filter(|l| *l > 0).unwrap_or(cfg.live_limit);
            let job = live_job(&cfg, store, limit)?;

            if once {
                if let Some(report) = job.trigger().await {
                    tracing::info!(
                        fetched = report.fetched,
                        stored = report.stored,
                        failed = report.failed,
                        "live pass finished"
                    );
                }
            } else {
                let handle = spawn_live_scheduler(
                    job,
                    LiveSchedulerCfg {
                        interval_secs: cfg.live_interval_secs,
                    },
                );
                handle.await.context("live scheduler task")?;
            }
        }
        Command::Backfill {
            start,
            end,
            chunk_secs,
            metrics_bind,
        } => {
            let _metrics = maybe_metrics(metrics_bind.as_deref()).await?;
            let start = parse_boundary(&start)?;
            let end = parse_boundary(&end)?;
            if let Some(secs) = chunk_secs {
                cfg.chunk_secs = secs;
            }
            let pipeline = build_pipeline(&cfg, store)?;
            let mut connector = PushshiftConnector::new(cfg.subreddit.clone());
            if let Some(url) = &cfg.pushshift_url {
                connector = connector.with_base_url(url.clone());
            }

            let opts = cfg.backfill_options()?;
            let report = run_backfill(&pipeline, &connector, start, end, &opts).await?;
            let totals = report.totals();
            tracing::info!(
                chunks = report.chunks.len(),
                skipped = report.skipped(),
                fetched = totals.fetched,
                stored = totals.stored,
                failed = totals.failed,
                "backfill finished"
            );
        }
        Command::Serve { bind, with_live } => {
            let bind = bind.unwrap_or_else(|| cfg.api_bind.clone());
            let metrics = Metrics::init()?;
            let app = api::app(AppState::new(store.clone()), &metrics);

            if with_live {
                let job = live_job(&cfg, store, cfg.live_limit)?;
                spawn_live_scheduler(
                    job,
                    LiveSchedulerCfg {
                        interval_secs: cfg.live_interval_secs,
                    },
                );
            }

            let listener = tokio::net::TcpListener::bind(&bind)
                .await
                .with_context(|| format!("binding {bind}"))?;
            tracing::info!(%bind, with_live, "serving trend API");
            axum::serve(listener, app).await.context("http server")?;
        }
    }

    Ok(())
}
