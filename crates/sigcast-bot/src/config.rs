//! Application configuration.

use crate::error::{AppError, AppResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sigcast_core::{SubscriberId, TradeMode};
use sigcast_executor::{BroadcastConfig, ConfirmationConfig};
use sigcast_notify::DispatcherConfig;
use sigcast_policy::PolicyConfig;
use std::path::Path;
use tracing::warn;

/// Simulated exchange settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperConfig {
    /// Balance of accounts the venue has not seen before.
    #[serde(default = "default_paper_balance")]
    pub default_balance: Decimal,
    /// Simulated round-trip per adapter call (ms).
    #[serde(default)]
    pub latency_ms: u64,
}

fn default_paper_balance() -> Decimal {
    Decimal::ONE_THOUSAND
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            default_balance: default_paper_balance(),
            latency_ms: 0,
        }
    }
}

/// Subscriber registered at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberSeed {
    pub id: SubscriberId,
    pub credential: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub trade_amount: Option<Decimal>,
    #[serde(default)]
    pub max_leverage: Option<u32>,
    #[serde(default)]
    pub mode: TradeMode,
    /// Paper balance override for this account.
    #[serde(default)]
    pub balance: Option<Decimal>,
}

/// Main application configuration.
///
/// Every section has defaults, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Identities allowed to issue signals besides the console operator.
    #[serde(default)]
    pub operators: Vec<SubscriberId>,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
    #[serde(default)]
    pub notifications: DispatcherConfig,
    #[serde(default)]
    pub paper: PaperConfig,
    #[serde(default)]
    pub subscribers: Vec<SubscriberSeed>,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`from_file`](Self::from_file), but a missing file yields the
    /// defaults.
    pub fn load(path: &str) -> AppResult<Self> {
        if !Path::new(path).exists() {
            warn!(path, "Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    pub fn validate(&self) -> AppResult<()> {
        self.policy.validate()?;
        if self.broadcast.max_concurrency == 0 {
            return Err(AppError::Config(
                "broadcast.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.confirmation.window_secs == 0 {
            return Err(AppError::Config(
                "confirmation.window_secs must be positive".to_string(),
            ));
        }
        if self.notifications.queue_capacity == 0 || self.notifications.max_per_second == 0 {
            return Err(AppError::Config(
                "notifications.queue_capacity and max_per_second must be positive".to_string(),
            ));
        }
        if self.paper.default_balance < Decimal::ZERO {
            return Err(AppError::Config(
                "paper.default_balance must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_operator(&self, id: SubscriberId) -> bool {
        self.operators.contains(&id)
    }
}
