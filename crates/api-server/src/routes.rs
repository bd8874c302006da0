use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use decision_engine::{PipelineReport, SchedulerStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use trade_core::{ActiveTradeFlag, DecisionLogEntry};

use crate::{ApiResponse, AppError, AppState};

const DEFAULT_DECISION_LIMIT: usize = 20;
const MAX_DECISION_LIMIT: usize = 200;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/health", get(health))
        .route("/predict", post(predict))
        .route("/simulate_trade", post(simulate_trade))
        .route("/trade", post(live_trade))
        .route("/admin/active_trade", get(active_trade))
        .route("/admin/clear_active_trade", post(clear_active_trade))
        .route("/latest", get(latest))
        .route("/decisions", get(decisions))
        .route("/pause", post(pause))
        .route("/resume", post(resume))
        .route("/run-now", post(run_now))
}

// ─── Query params ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PredictQuery {
    pub symbol: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DecisionsQuery {
    pub limit: Option<usize>,
}

impl DecisionsQuery {
    fn clamped(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_DECISION_LIMIT)
            .clamp(1, MAX_DECISION_LIMIT)
    }
}

// ─── Responses ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ActiveTradeResponse {
    pub active: bool,
    pub flag: Option<ActiveTradeFlag>,
    pub max_allowed_loss: Decimal,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub cleared: bool,
}

#[derive(Debug, Serialize)]
pub struct RunNowResponse {
    pub runs: usize,
    pub reports: Vec<PipelineReport>,
}

// ─── Handlers ───────────────────────────────────────────────────────────────

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        time: Utc::now(),
    })
}

/// POST /predict?symbol=NIFTY
/// Snapshot, reasoning and the risk-gated path. Live only when approved.
async fn predict(
    State(state): State<AppState>,
    Query(params): Query<PredictQuery>,
) -> Json<ApiResponse<PipelineReport>> {
    let symbol = params
        .symbol
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .or_else(|| state.config.symbols.first().cloned())
        .unwrap_or_else(|| "NIFTY".to_string());

    let report = state.pipeline.run_auto(&symbol, state.simulate_auto()).await;
    Json(ApiResponse::success(report))
}

/// POST /simulate_trade
async fn simulate_trade(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Json<ApiResponse<PipelineReport>> {
    let report = state.pipeline.run_manual(&payload, true).await;
    Json(ApiResponse::success(report))
}

/// POST /trade
async fn live_trade(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Json<ApiResponse<PipelineReport>> {
    tracing::info!("Live trade requested via API");
    let report = state.pipeline.run_manual(&payload, false).await;
    Json(ApiResponse::success(report))
}

async fn active_trade(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<ActiveTradeResponse>>, AppError> {
    let flag = state.pipeline.guard().peek().await?;
    Ok(Json(ApiResponse::success(ActiveTradeResponse {
        active: flag.is_some(),
        flag,
        max_allowed_loss: state.pipeline.risk_gate().ceiling(),
    })))
}

async fn clear_active_trade(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<ClearResponse>>, AppError> {
    let cleared = state.pipeline.guard().clear().await?;
    Ok(Json(ApiResponse::success(ClearResponse { cleared })))
}

async fn latest(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<DecisionLogEntry>>, AppError> {
    match state.pipeline.decision_log().latest().await? {
        Some(entry) => Ok(Json(ApiResponse::success(entry))),
        None => Err(AppError::not_found("no data")),
    }
}

async fn decisions(
    State(state): State<AppState>,
    Query(params): Query<DecisionsQuery>,
) -> Result<Json<ApiResponse<Vec<DecisionLogEntry>>>, AppError> {
    let entries = state.pipeline.decision_log().recent(params.clamped()).await?;
    Ok(Json(ApiResponse::success(entries)))
}

async fn pause(State(state): State<AppState>) -> Json<ApiResponse<SchedulerStatus>> {
    state.scheduler.pause();
    Json(ApiResponse::success(state.scheduler.status().await))
}

async fn resume(State(state): State<AppState>) -> Json<ApiResponse<SchedulerStatus>> {
    state.scheduler.resume();
    Json(ApiResponse::success(state.scheduler.status().await))
}

/// POST /run-now
/// One scheduler pass, awaited. Runs even while paused.
async fn run_now(State(state): State<AppState>) -> Json<ApiResponse<RunNowResponse>> {
    let reports = state.scheduler.run_once().await;
    Json(ApiResponse::success(RunNowResponse {
        runs: reports.len(),
        reports,
    }))
}
