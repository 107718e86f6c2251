use anyhow::Context;
use axum::{extract::State, routing::post, Json, Router};
use race_analysis::{
    render_summary, AnalysisConfig, AnalysisReport, CachedStore, JsonDirStore, RaceAnalyzer,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod types;

use types::{session_key, AnalyzeRequest, ApiError, InvalidateOut, SessionRef};

// ---------- Server state ----------

#[derive(Clone)]
struct AppState {
    config: AnalysisConfig,
    store: Arc<CachedStore<JsonDirStore>>,
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/analyze", post(analyze))
        .route("/analyze/summary", post(analyze_summary))
        .route("/cache/invalidate", post(invalidate))
        .with_state(state)
}

// ---------- Handlers ----------

/// Runs one analysis on the blocking pool; detection is CPU-bound.
async fn run_analysis(state: &AppState, req: AnalyzeRequest) -> Result<AnalysisReport, ApiError> {
    let key = session_key(&req.race, &req.session)?;
    let analyzer = RaceAnalyzer::new(state.config.with_overrides(&req.overrides))?;
    let store = Arc::clone(&state.store);
    tracing::info!(session = %key, "analysis requested");

    let report = tokio::task::spawn_blocking(move || analyzer.run(store.as_ref(), &key))
        .await
        .map_err(|e| ApiError::Task(e.to_string()))??;
    Ok(report)
}

async fn analyze(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<AnalysisReport>, ApiError> {
    run_analysis(&state, req).await.map(Json)
}

async fn analyze_summary(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<String, ApiError> {
    let report = run_analysis(&state, req).await?;
    Ok(render_summary(&report))
}

async fn invalidate(
    State(state): State<AppState>,
    Json(req): Json<SessionRef>,
) -> Result<Json<InvalidateOut>, ApiError> {
    let key = session_key(&req.race, &req.session)?;
    let evicted = state.store.invalidate(&key);
    tracing::info!(session = %key, evicted, "cache invalidation");
    Ok(Json(InvalidateOut { evicted }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let data_dir = std::env::var("DATA_DIR").context("DATA_DIR not set")?;
    let port: u16 = std::env::var("PORT").ok().and_then(|s| s.parse().ok()).unwrap_or(8080);
    let config = match std::env::var("ANALYSIS_CONFIG") {
        Ok(path) => AnalysisConfig::load(&path).with_context(|| format!("loading {path}"))?,
        Err(_) => AnalysisConfig::default(),
    };
    config.validate()?;
    tracing::info!(?config, data_dir = %data_dir, "loaded analysis config");

    let state = AppState {
        config,
        store: Arc::new(CachedStore::new(JsonDirStore::new(data_dir))),
    };

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;
    Ok(())
}
