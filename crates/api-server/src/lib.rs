pub mod auth;
pub mod routes;

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use axum::{
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    Json, Router,
};
use broker_trait::{BrokerClient, MarketDataSource};
use decision_engine::{
    ActiveTradeGuard, AppConfig, DecisionPipeline, LogBackend, NotifierSet, OrderSubmitter,
    Scheduler, StoreBackend,
};
use kite_broker::KiteClient;
use reasoning_client::ReasoningClient;
use risk_manager::RiskGate;
use serde::Serialize;
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use trade_store::{
    DecisionStore, KeyValueStore, MemoryStore, RedisStore, SqliteDecisionStore, ACCESS_TOKEN_KEY,
};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pipeline: Arc<DecisionPipeline>,
    pub scheduler: Scheduler,
    admin_token_hash: Option<String>,
}

impl AppState {
    pub fn new(config: AppConfig, pipeline: Arc<DecisionPipeline>) -> Self {
        let simulate = !config.live_trading_approved;
        let scheduler = Scheduler::new(
            pipeline.clone(),
            config.symbols.clone(),
            config.poll_interval(),
            simulate,
        );
        let admin_token_hash = config.admin_token.as_deref().map(auth::hash_token);

        Self {
            config: Arc::new(config),
            pipeline,
            scheduler,
            admin_token_hash,
        }
    }

    pub fn admin_token_hash(&self) -> Option<&str> {
        self.admin_token_hash.as_deref()
    }

    /// Whether the auto path is allowed to place live orders.
    pub fn simulate_auto(&self) -> bool {
        !self.config.live_trading_approved
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Handler error carrying an HTTP status. Anything convertible to
/// `anyhow::Error` becomes a 500 through `?`.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    pub fn with_status(status: StatusCode, error: anyhow::Error) -> Self {
        Self { status, error }
    }

    pub fn not_found(message: &str) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, anyhow!("{}", message))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("Request failed: {:#}", self.error);
        }
        let body = ApiResponse::<()>::error(format!("{:#}", self.error));
        (self.status, Json(body)).into_response()
    }
}

/// Stand-in when no broker credentials are configured. Every snapshot fails,
/// so the pipeline reasons over an error snapshot.
pub struct UnconfiguredMarket;

#[async_trait]
impl MarketDataSource for UnconfiguredMarket {
    async fn get_snapshot(&self, symbol: &str) -> Result<Value> {
        Err(anyhow!("market data not configured for {}", symbol))
    }

    fn source_name(&self) -> &str {
        "unconfigured"
    }
}

/// Full router with admin auth, tracing and CORS layers.
pub fn app(state: AppState) -> Router {
    routes::routes()
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::admin_auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
        default_hook(info);
    }));
}

async fn connect_redis(
    cache: &mut Option<Arc<RedisStore>>,
    config: &AppConfig,
) -> Result<Arc<RedisStore>> {
    if let Some(store) = cache {
        return Ok(store.clone());
    }
    let mut store = RedisStore::new(&config.redis_url)
        .await
        .with_context(|| format!("Failed to connect to Redis at {}", config.redis_url))?;
    if let Some(len) = config.decision_log_max_len {
        store = store.with_max_log_len(len);
    }
    let store = Arc::new(store);
    *cache = Some(store.clone());
    Ok(store)
}

/// Shared-flag store and decision log for the configured backends.
pub async fn build_stores(
    config: &AppConfig,
) -> Result<(Arc<dyn KeyValueStore>, Arc<dyn DecisionStore>)> {
    let memory = Arc::new(MemoryStore::new());
    let mut redis = None;

    let kv: Arc<dyn KeyValueStore> = match config.store_backend {
        StoreBackend::Redis => connect_redis(&mut redis, config).await?,
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory active-trade store; the flag is not shared across processes");
            memory.clone()
        }
    };

    let log: Arc<dyn DecisionStore> = match config.decision_log_backend {
        LogBackend::Sqlite => Arc::new(
            SqliteDecisionStore::new(&config.database_url)
                .await
                .with_context(|| format!("Failed to open decision log {}", config.database_url))?,
        ),
        LogBackend::Redis => connect_redis(&mut redis, config).await?,
        LogBackend::Memory => memory,
    };

    tracing::info!(
        "Stores ready: active-trade={}, decision-log={}",
        kv.kv_backend(),
        log.log_backend()
    );
    Ok((kv, log))
}

/// Kite client when credentials are present. The access token falls back to
/// the one the login helper leaves in the shared store.
async fn build_broker(kv: &Arc<dyn KeyValueStore>) -> Option<Arc<KiteClient>> {
    let kite = match KiteClient::from_env() {
        Ok(kite) => kite,
        Err(e) => {
            tracing::warn!("Kite broker not configured ({:#}); live orders will fail", e);
            return None;
        }
    };

    if !kite.has_access_token().await {
        match kv.get(ACCESS_TOKEN_KEY).await {
            Ok(Some(token)) if !token.trim().is_empty() => {
                kite.set_access_token(token.trim()).await;
                tracing::info!("Loaded Kite access token from shared store");
            }
            Ok(_) => tracing::warn!("No Kite access token available yet"),
            Err(e) => tracing::warn!("Could not read Kite access token from store: {}", e),
        }
    }

    Some(Arc::new(kite))
}

pub async fn build_state(config: AppConfig) -> Result<AppState> {
    let (kv, decision_log) = build_stores(&config).await?;

    let reasoning = ReasoningClient::from_env().context("Failed to build reasoning client")?;
    tracing::info!(
        "Reasoning model: {} at {}",
        reasoning.config().model,
        reasoning.config().base_url
    );

    let (market_data, submitter): (Arc<dyn MarketDataSource>, OrderSubmitter) =
        match build_broker(&kv).await {
            Some(kite) => {
                let broker: Arc<dyn BrokerClient> = kite.clone();
                let market: Arc<dyn MarketDataSource> = kite;
                (market, OrderSubmitter::new(broker, config.broker_timeout()))
            }
            None => {
                let market: Arc<dyn MarketDataSource> = Arc::new(UnconfiguredMarket);
                (market, OrderSubmitter::simulate_only())
            }
        };

    let notifiers = NotifierSet::from_config(&config)?;
    if !notifiers.is_empty() {
        tracing::info!("{} notifier(s) configured", notifiers.len());
    }

    let pipeline = DecisionPipeline::new(
        reasoning,
        market_data,
        RiskGate::new(config.max_allowed_loss),
        ActiveTradeGuard::new(kv),
        submitter,
        decision_log,
    )
    .with_notifiers(notifiers)
    .with_defaults(config.intent_defaults());

    Ok(AppState::new(config, Arc::new(pipeline)))
}

pub async fn run_server() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    install_panic_hook();

    let config = AppConfig::from_env().context("Invalid configuration")?;

    if config.live_trading_approved {
        tracing::warn!("LIVE_TRADING_APPROVED=yes: scheduled decisions will place LIVE orders");
    } else {
        tracing::info!("Scheduled decisions run in simulate mode (set LIVE_TRADING_APPROVED=yes for live)");
    }
    if config.admin_token.is_none() {
        tracing::warn!("ADMIN_TOKEN not set; admin routes will answer 403");
    }

    let bind_addr = config.bind_addr.clone();
    let scheduler_enabled = config.scheduler_enabled;
    let state = build_state(config).await?;

    if scheduler_enabled {
        state.scheduler.spawn();
    } else {
        tracing::info!("Scheduler disabled; use POST /run-now to trigger a pass");
    }

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    tracing::info!("Decision API listening on {}", bind_addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests;
