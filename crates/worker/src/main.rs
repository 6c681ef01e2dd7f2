use anyhow::Context;
use clap::Parser;
use std::time::Duration;
use sthlm_core::config::Settings;
use sthlm_core::domain::history::record_scored_snapshots;
use sthlm_core::ingest::HttpJsonDataProvider;
use sthlm_core::storage;
use sthlm_core::time::stockholm::resolve_as_of_date;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod ingest;
mod universe;

#[derive(Debug, Parser)]
#[command(name = "sthlm_worker")]
struct Args {
    /// History date (YYYY-MM-DD). Defaults to today's Stockholm date.
    #[arg(long)]
    as_of_date: Option<String>,

    /// Compute and log everything, write nothing.
    #[arg(long)]
    dry_run: bool,

    /// Refresh stale tickers from the market-data provider before scoring.
    #[arg(long)]
    fetch: bool,

    /// Refresh every ticker regardless of age (implies --fetch).
    #[arg(long)]
    force: bool,

    /// Maximum number of tickers to refresh.
    #[arg(long)]
    limit: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    if let Err(err) = run(&settings, &args).await {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %format!("{err:#}"), "worker run failed");
        return Err(err);
    }
    Ok(())
}

async fn run(settings: &Settings, args: &Args) -> anyhow::Result<()> {
    let now = chrono::Utc::now();
    let as_of_date = resolve_as_of_date(args.as_of_date.as_deref(), now)?;

    let _lock = if args.dry_run {
        None
    } else {
        match storage::try_acquire_run_lock(&settings.current_store_path)? {
            Some(lock) => Some(lock),
            None => {
                tracing::warn!(%as_of_date, "run lock held; another worker run in progress");
                return Ok(());
            }
        }
    };

    let mut records = storage::load_current(&settings.current_store_path)?;

    if args.fetch || args.force {
        let entries = universe::load_tickers(&settings.tickers_path)?;
        let opts = universe::RefreshOptions {
            force: args.force,
            limit: args.limit,
        };
        let selected = universe::select_for_refresh(&entries, &records, now, opts);

        if selected.is_empty() {
            tracing::info!("all tickers are fresh; nothing to fetch");
        } else {
            let provider = HttpJsonDataProvider::from_settings(settings)?;
            let stats =
                ingest::refresh_records(&provider, &selected, &mut records, request_delay()).await;
            tracing::info!(
                attempted = stats.attempted,
                updated = stats.updated,
                failed = stats.failed,
                "refresh finished"
            );
        }
    }

    let pruned = universe::prune_b_shares(&mut records);
    if !pruned.is_empty() {
        tracing::info!(removed = pruned.len(), "removed B shares with a listed A share");
    }

    let summary = sthlm_core::scoring::score_all(&mut records).context("scoring failed")?;
    let scored = summary
        .variants
        .first()
        .map(|v| v.ranked)
        .unwrap_or_default();
    tracing::info!(%as_of_date, records = summary.records, scored, "scoring finished");

    if args.dry_run {
        tracing::info!(%as_of_date, dry_run = true, "skipping store writes");
        return Ok(());
    }

    storage::save_current(&settings.current_store_path, &records)?;

    let mut history = storage::load_history(&settings.history_store_path)?;
    let mut b_shares = pruned;
    b_shares.extend(universe::redundant_b_shares(history.keys().map(String::as_str)));
    let dropped = storage::drop_b_share_history(&mut history, &b_shares);
    let written = record_scored_snapshots(&mut history, records.values(), as_of_date);
    storage::save_history(&settings.history_store_path, &history)?;
    tracing::info!(%as_of_date, written, dropped, "history updated");

    Ok(())
}

fn request_delay() -> Duration {
    let ms = std::env::var("DATA_PROVIDER_REQ_DELAY_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(150);
    Duration::from_millis(ms)
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
