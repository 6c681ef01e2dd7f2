use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use sthlm_core::config::Settings;
use sthlm_core::domain::history::HistoryEntry;
use sthlm_core::domain::{Figure, StockRecord, Variant};
use sthlm_core::scoring::Records;
use sthlm_core::storage;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

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

    let state = AppState {
        stores: Arc::new(StorePaths {
            current: settings.current_store_path.clone(),
            history: settings.history_store_path.clone(),
        }),
    };

    let app = router(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/rankings/:variant", get(get_rankings))
        .route("/stocks/:ticker", get(get_stock))
        .route("/history/:ticker", get(get_history))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug)]
struct StorePaths {
    current: PathBuf,
    history: PathBuf,
}

#[derive(Debug, Clone)]
struct AppState {
    stores: Arc<StorePaths>,
}

#[derive(Debug, Serialize, PartialEq)]
struct RankingRow {
    ticker: String,
    name: String,
    score: u32,
    ey_rank: u32,
    roc_rank: u32,
    earnings_yield: Figure<f64>,
    return_on_capital: Figure<f64>,
    market_cap: Figure<f64>,
    ebit_periods: Figure<String>,
    uses_ttm: Option<bool>,
}

#[derive(Debug, Serialize)]
struct Rankings {
    variant: Variant,
    rows: Vec<RankingRow>,
}

async fn get_rankings(
    State(state): State<AppState>,
    Path(variant): Path<String>,
) -> Result<Json<Rankings>, StatusCode> {
    let variant = Variant::from_label(&variant).ok_or(StatusCode::NOT_FOUND)?;
    let records = load_current(&state).await?;

    Ok(Json(Rankings {
        variant,
        rows: ranking_rows(&records, variant),
    }))
}

async fn get_stock(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<StockRecord>, StatusCode> {
    let mut records = load_current(&state).await?;
    records
        .remove(&ticker)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn get_history(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<Vec<HistoryEntry>>, StatusCode> {
    let path = state.stores.history.clone();
    let mut history = spawn_store_read(move || storage::read_history(&path)).await?;
    let days: BTreeMap<String, HistoryEntry> =
        history.remove(&ticker).ok_or(StatusCode::NOT_FOUND)?;

    // Keys are ISO dates, so map order is chronological.
    Ok(Json(days.into_values().collect()))
}

async fn load_current(state: &AppState) -> Result<Records, StatusCode> {
    let path = state.stores.current.clone();
    spawn_store_read(move || storage::load_current(&path)).await
}

async fn spawn_store_read<T, F>(read: F) -> Result<T, StatusCode>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    let joined = tokio::task::spawn_blocking(read).await.map_err(|e| {
        let err = anyhow::Error::new(e);
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %err, "store read task failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    joined.map_err(|e| {
        sentry_anyhow::capture_anyhow(&e);
        tracing::error!(error = %format!("{e:#}"), "store read failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// Scored records for `variant`, best (lowest) score first; ties by EY rank,
/// then ticker.
fn ranking_rows(records: &Records, variant: Variant) -> Vec<RankingRow> {
    let mut rows: Vec<RankingRow> = records
        .values()
        .filter_map(|r| {
            let scores = r.scores(variant);
            Some(RankingRow {
                ticker: r.ticker.clone(),
                name: r.name.clone(),
                score: scores.score.get()?,
                ey_rank: scores.ey_rank.get()?,
                roc_rank: scores.roc_rank.get()?,
                earnings_yield: r.earnings_yield,
                return_on_capital: r.return_on_capital,
                market_cap: r.market_cap,
                ebit_periods: r.magic_formula_ebit_periods.clone(),
                uses_ttm: r.magic_formula_uses_ttm,
            })
        })
        .collect();

    rows.sort_by(|a, b| {
        a.score
            .cmp(&b.score)
            .then_with(|| a.ey_rank.cmp(&b.ey_rank))
            .then_with(|| a.ticker.cmp(&b.ticker))
    });
    rows
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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
