use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use trade_core::IntentDefaults;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogBackend {
    Sqlite,
    Redis,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            other => bail!("unknown STORE_BACKEND '{}' (expected redis or memory)", other),
        }
    }
}

impl FromStr for LogBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(LogBackend::Sqlite),
            "redis" => Ok(LogBackend::Redis),
            "memory" => Ok(LogBackend::Memory),
            other => bail!(
                "unknown DECISION_LOG_BACKEND '{}' (expected sqlite, redis or memory)",
                other
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    // Risk
    pub max_allowed_loss: Decimal,         // 11000 rupees

    // Server
    pub bind_addr: String,                 // 0.0.0.0:5000
    #[serde(skip_serializing)]
    pub admin_token: Option<String>,

    // Storage
    pub store_backend: StoreBackend,
    pub decision_log_backend: LogBackend,
    pub redis_url: String,
    pub database_url: String,
    pub decision_log_max_len: Option<usize>, // Redis log only; unbounded when unset

    // Broker
    pub broker_timeout_secs: u64,          // 15
    pub default_exchange: String,          // NFO
    pub default_product: String,           // MIS
    pub live_trading_approved: bool,       // auto path places live orders only when true

    // Scheduler
    pub symbols: Vec<String>,
    pub poll_interval_seconds: u64,        // 300
    pub scheduler_enabled: bool,

    // Notifications
    pub webhook_url: Option<String>,
    #[serde(skip_serializing)]
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn flag(key: &str, default: bool) -> bool {
    match optional(key) {
        Some(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

fn parse_max_len(value: Option<String>) -> Result<Option<usize>> {
    value
        .map(|v| v.parse().context("DECISION_LOG_MAX_LEN must be an integer"))
        .transpose()
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = match optional("BIND_ADDR") {
            Some(addr) => addr,
            None => format!("0.0.0.0:{}", env::var("PORT").unwrap_or_else(|_| "5000".to_string())),
        };

        let config = Self {
            max_allowed_loss: env::var("MAX_ALLOWED_LOSS")
                .unwrap_or_else(|_| "11000".to_string())
                .trim()
                .parse()
                .context("MAX_ALLOWED_LOSS must be a decimal amount")?,

            bind_addr,
            admin_token: optional("ADMIN_TOKEN"),

            store_backend: env::var("STORE_BACKEND")
                .unwrap_or_else(|_| "redis".to_string())
                .parse()?,
            decision_log_backend: env::var("DECISION_LOG_BACKEND")
                .unwrap_or_else(|_| "sqlite".to_string())
                .parse()?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:decisions.db".to_string()),
            decision_log_max_len: parse_max_len(optional("DECISION_LOG_MAX_LEN"))?,

            broker_timeout_secs: env::var("BROKER_TIMEOUT_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .context("BROKER_TIMEOUT_SECS must be an integer")?,
            default_exchange: env::var("DEFAULT_EXCHANGE").unwrap_or_else(|_| "NFO".to_string()),
            default_product: env::var("DEFAULT_PRODUCT").unwrap_or_else(|_| "MIS".to_string()),
            live_trading_approved: optional("LIVE_TRADING_APPROVED")
                .map(|v| v.eq_ignore_ascii_case("yes"))
                .unwrap_or(false),

            symbols: env::var("SYMBOLS")
                .unwrap_or_else(|_| "NIFTY".to_string())
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
            poll_interval_seconds: env::var("POLL_INTERVAL_SECONDS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .context("POLL_INTERVAL_SECONDS must be an integer")?,
            scheduler_enabled: flag("SCHEDULER_ENABLED", true),

            webhook_url: optional("WEBHOOK_URL"),
            telegram_token: optional("TELEGRAM_TOKEN"),
            telegram_chat_id: optional("TELEGRAM_CHAT_ID"),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_allowed_loss <= Decimal::ZERO {
            bail!("MAX_ALLOWED_LOSS must be positive, got {}", self.max_allowed_loss);
        }
        if self.poll_interval_seconds == 0 {
            bail!("POLL_INTERVAL_SECONDS must be at least 1");
        }
        if self.broker_timeout_secs == 0 {
            bail!("BROKER_TIMEOUT_SECS must be at least 1");
        }
        if self.decision_log_max_len == Some(0) {
            bail!("DECISION_LOG_MAX_LEN must be at least 1");
        }
        if self.scheduler_enabled && self.symbols.is_empty() {
            bail!("SYMBOLS is empty but the scheduler is enabled");
        }
        Ok(())
    }

    pub fn broker_timeout(&self) -> Duration {
        Duration::from_secs(self.broker_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn intent_defaults(&self) -> IntentDefaults {
        IntentDefaults {
            exchange: self.default_exchange.clone(),
            product: self.default_product.clone(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_allowed_loss: Decimal::from(risk_manager::DEFAULT_MAX_ALLOWED_LOSS),
            bind_addr: "0.0.0.0:5000".to_string(),
            admin_token: None,
            store_backend: StoreBackend::Memory,
            decision_log_backend: LogBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            database_url: "sqlite:decisions.db".to_string(),
            decision_log_max_len: None,
            broker_timeout_secs: 15,
            default_exchange: "NFO".to_string(),
            default_product: "MIS".to_string(),
            live_trading_approved: false,
            symbols: vec!["NIFTY".to_string()],
            poll_interval_seconds: 300,
            scheduler_enabled: false,
            webhook_url: None,
            telegram_token: None,
            telegram_chat_id: None,
        }
    }
}
