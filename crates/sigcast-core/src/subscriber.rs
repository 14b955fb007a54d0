//! Subscriber account settings.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::decimal::Amount;
use crate::error::{CoreError, CoreResult};
use crate::signal::Leverage;

/// Smallest trade amount a subscriber may configure.
pub const MIN_TRADE_AMOUNT: Decimal = dec!(1);
/// Largest trade amount a subscriber may configure.
pub const MAX_TRADE_AMOUNT: Decimal = dec!(10000);
/// Trade amount assigned at registration when none is given.
pub const DEFAULT_TRADE_AMOUNT: Decimal = dec!(50);
/// Leverage cap assigned at registration.
pub const DEFAULT_MAX_LEVERAGE: u32 = 10;

/// Stable subscriber identity (the chat user id in the transport).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(pub i64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SubscriberId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

/// Opaque reference the exchange adapter resolves to real credentials.
///
/// Raw keys never enter the core.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialRef(String);

impl CredentialRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CredentialRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CredentialRef(..)")
    }
}

/// Execution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeMode {
    /// Execute immediately on broadcast.
    #[default]
    Auto,
    /// Offer the signal and wait for an explicit confirmation.
    Manual,
}

impl FromStr for TradeMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AUTO" => Ok(Self::Auto),
            "MANUAL" => Ok(Self::Manual),
            other => Err(CoreError::InvalidTradeMode(other.to_string())),
        }
    }
}

impl fmt::Display for TradeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "AUTO"),
            Self::Manual => write!(f, "MANUAL"),
        }
    }
}

/// Validate a configured per-trade amount (1 to 10000 inclusive).
pub fn validate_trade_amount(amount: Amount) -> CoreResult<Amount> {
    if amount.inner() < MIN_TRADE_AMOUNT || amount.inner() > MAX_TRADE_AMOUNT {
        return Err(CoreError::InvalidTradeAmount(amount.to_string()));
    }
    Ok(amount)
}

/// An account holder receiving signals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub username: Option<String>,
    pub credential: CredentialRef,
    /// Quote-currency amount committed per trade.
    pub trade_amount: Amount,
    pub max_leverage: Leverage,
    pub mode: TradeMode,
    pub active: bool,
    pub total_trades: u64,
    pub total_pnl: Decimal,
    pub registered_at: DateTime<Utc>,
}

impl Subscriber {
    /// New active AUTO subscriber with default amount and leverage cap.
    #[must_use]
    pub fn new(id: SubscriberId, credential: CredentialRef, registered_at: DateTime<Utc>) -> Self {
        Self {
            id,
            username: None,
            credential,
            trade_amount: Amount::new(DEFAULT_TRADE_AMOUNT),
            max_leverage: Leverage::new(DEFAULT_MAX_LEVERAGE).unwrap_or_default(),
            mode: TradeMode::Auto,
            active: true,
            total_trades: 0,
            total_pnl: Decimal::ZERO,
            registered_at,
        }
    }

    #[must_use]
    pub fn with_trade_amount(mut self, amount: Amount) -> Self {
        self.trade_amount = amount;
        self
    }

    #[must_use]
    pub fn with_max_leverage(mut self, leverage: Leverage) -> Self {
        self.max_leverage = leverage;
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: TradeMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn is_auto(&self) -> bool {
        self.mode == TradeMode::Auto
    }

    /// Display name for operator-facing reports.
    pub fn display_name(&self) -> String {
        match &self.username {
            Some(name) => format!("@{name}"),
            None => self.id.to_string(),
        }
    }
}
