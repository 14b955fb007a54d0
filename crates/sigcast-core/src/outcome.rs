//! Per-subscriber execution outcomes and the aggregate broadcast report.
//!
//! The outcome taxonomy is the primary error vocabulary of the system:
//! adapter failures are converted into an [`OutcomeKind`] at the broadcast
//! boundary instead of propagating.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::decimal::{Amount, Price};
use crate::signal::{Leverage, OrderSide, SignalId};
use crate::subscriber::SubscriberId;

/// Result category of one execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    /// Executed with the configured trade amount.
    Success,
    /// Executed with an amount different from the configured one.
    SuccessReduced,
    /// Live balance was zero or negative.
    InsufficientBalance,
    /// Notional could not reach the exchange minimum within the balance.
    MinOrderNotMet,
    /// A position on the symbol was already open.
    PositionExists,
    /// Credentials rejected by the exchange.
    InvalidKey,
    /// Instrument unknown to the exchange.
    SymbolNotFound,
    /// Any other adapter failure.
    ApiError,
}

impl OutcomeKind {
    pub const ALL: [OutcomeKind; 8] = [
        Self::Success,
        Self::SuccessReduced,
        Self::InsufficientBalance,
        Self::MinOrderNotMet,
        Self::PositionExists,
        Self::InvalidKey,
        Self::SymbolNotFound,
        Self::ApiError,
    ];

    /// Whether the affected subscriber is told about this outcome.
    ///
    /// Technical failures are reported to operators only.
    pub fn is_subscriber_visible(&self) -> bool {
        !matches!(self, Self::SymbolNotFound | Self::ApiError)
    }

    /// Whether an order was actually placed.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::SuccessReduced)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::SuccessReduced => "SUCCESS_REDUCED",
            Self::InsufficientBalance => "INSUFFICIENT_BALANCE",
            Self::MinOrderNotMet => "MIN_ORDER_NOT_MET",
            Self::PositionExists => "POSITION_EXISTS",
            Self::InvalidKey => "INVALID_KEY",
            Self::SymbolNotFound => "SYMBOL_NOT_FOUND",
            Self::ApiError => "API_ERROR",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What was attempted for the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TradeAction {
    Open,
    Close { percentage: Decimal },
    SetLeverage { leverage: Leverage },
    EditSlTp,
}

impl TradeAction {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close { .. } => "close",
            Self::SetLeverage { .. } => "leverage",
            Self::EditSlTp => "edit_sltp",
        }
    }
}

/// Append-only record of one attempt for one subscriber against one signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub subscriber_id: SubscriberId,
    pub signal_id: SignalId,
    pub action: TradeAction,
    pub side: OrderSide,
    /// Resolved quote-currency amount, when sizing happened.
    pub quantity: Option<Amount>,
    pub price: Option<Price>,
    pub leverage: Option<Leverage>,
    pub kind: OutcomeKind,
    pub order_ref: Option<String>,
    pub detail: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl TradeOutcome {
    #[must_use]
    pub fn new(
        subscriber_id: SubscriberId,
        signal_id: SignalId,
        action: TradeAction,
        side: OrderSide,
        kind: OutcomeKind,
    ) -> Self {
        Self {
            subscriber_id,
            signal_id,
            action,
            side,
            quantity: None,
            price: None,
            leverage: None,
            kind,
            order_ref: None,
            detail: None,
            recorded_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_sizing(mut self, quantity: Amount, leverage: Leverage, price: Option<Price>) -> Self {
        self.quantity = Some(quantity);
        self.leverage = Some(leverage);
        self.price = price;
        self
    }

    #[must_use]
    pub fn with_order_ref(mut self, order_ref: impl Into<String>) -> Self {
        self.order_ref = Some(order_ref.into());
        self
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Per-kind counters of a broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub success: usize,
    pub success_reduced: usize,
    pub insufficient_balance: usize,
    pub min_order_not_met: usize,
    pub position_exists: usize,
    pub invalid_key: usize,
    pub symbol_not_found: usize,
    pub api_error: usize,
    pub total: usize,
}

impl OutcomeCounts {
    pub fn record(&mut self, kind: OutcomeKind) {
        let slot = match kind {
            OutcomeKind::Success => &mut self.success,
            OutcomeKind::SuccessReduced => &mut self.success_reduced,
            OutcomeKind::InsufficientBalance => &mut self.insufficient_balance,
            OutcomeKind::MinOrderNotMet => &mut self.min_order_not_met,
            OutcomeKind::PositionExists => &mut self.position_exists,
            OutcomeKind::InvalidKey => &mut self.invalid_key,
            OutcomeKind::SymbolNotFound => &mut self.symbol_not_found,
            OutcomeKind::ApiError => &mut self.api_error,
        };
        *slot += 1;
        self.total += 1;
    }

    pub fn get(&self, kind: OutcomeKind) -> usize {
        match kind {
            OutcomeKind::Success => self.success,
            OutcomeKind::SuccessReduced => self.success_reduced,
            OutcomeKind::InsufficientBalance => self.insufficient_balance,
            OutcomeKind::MinOrderNotMet => self.min_order_not_met,
            OutcomeKind::PositionExists => self.position_exists,
            OutcomeKind::InvalidKey => self.invalid_key,
            OutcomeKind::SymbolNotFound => self.symbol_not_found,
            OutcomeKind::ApiError => self.api_error,
        }
    }
}

/// Operator-facing aggregate of one broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastReport {
    pub signal_id: SignalId,
    /// `new`, `close`, `leverage` or `edit_sltp`.
    pub command: String,
    pub counts: OutcomeCounts,
    /// MANUAL subscribers that received a confirmation offer.
    pub offered: usize,
    pub outcomes: Vec<TradeOutcome>,
    /// Holders whose position survived a full close; the signal stays active.
    #[serde(default)]
    pub still_open: Vec<SubscriberId>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BroadcastReport {
    #[must_use]
    pub fn new(
        signal_id: SignalId,
        command: impl Into<String>,
        offered: usize,
        outcomes: Vec<TradeOutcome>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let mut counts = OutcomeCounts::default();
        for outcome in &outcomes {
            counts.record(outcome.kind);
        }
        Self {
            signal_id,
            command: command.into(),
            counts,
            offered,
            outcomes,
            still_open: Vec::new(),
            started_at,
            finished_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_still_open(mut self, still_open: Vec<SubscriberId>) -> Self {
        self.still_open = still_open;
        self
    }

    pub fn outcomes_for(&self, subscriber_id: SubscriberId) -> impl Iterator<Item = &TradeOutcome> {
        self.outcomes
            .iter()
            .filter(move |o| o.subscriber_id == subscriber_id)
    }

    pub fn elapsed_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{SignalId, Symbol};

    fn sample_id() -> SignalId {
        SignalId::generate(&Symbol::parse("BTCUSDT").unwrap(), Utc::now())
    }

    #[test]
    fn test_visibility_rule() {
        let hidden: Vec<_> = OutcomeKind::ALL
            .iter()
            .filter(|k| !k.is_subscriber_visible())
            .collect();
        assert_eq!(hidden, vec![&OutcomeKind::SymbolNotFound, &OutcomeKind::ApiError]);
    }

    #[test]
    fn test_counts_per_kind() {
        let id = sample_id();
        let outcomes = vec![
            TradeOutcome::new(SubscriberId(1), id.clone(), TradeAction::Open, OrderSide::Buy, OutcomeKind::Success),
            TradeOutcome::new(SubscriberId(2), id.clone(), TradeAction::Open, OrderSide::Buy, OutcomeKind::ApiError),
            TradeOutcome::new(SubscriberId(3), id.clone(), TradeAction::Open, OrderSide::Buy, OutcomeKind::Success),
        ];
        let report = BroadcastReport::new(id, "new", 2, outcomes, Utc::now());

        assert_eq!(report.counts.success, 2);
        assert_eq!(report.counts.api_error, 1);
        assert_eq!(report.counts.total, 3);
        assert_eq!(report.offered, 2);
        assert_eq!(report.outcomes_for(SubscriberId(2)).count(), 1);
    }

    #[test]
    fn test_kind_serializes_screaming() {
        let json = serde_json::to_string(&OutcomeKind::MinOrderNotMet).unwrap();
        assert_eq!(json, "\"MIN_ORDER_NOT_MET\"");
    }
}
