//! Subscriber policy evaluator.
//!
//! Decides, for one subscriber and one new signal, whether to execute and
//! with which amount and leverage. Pure: no I/O, live account state is
//! supplied by the caller.
//!
//! # Decision order
//!
//! First applicable rule wins; later checks assume earlier ones passed.
//!
//! 1. Open position on the symbol: SKIP, `POSITION_EXISTS`
//! 2. Balance <= 0: SKIP, `INSUFFICIENT_BALANCE`
//! 3. `amount = min(trade_amount, balance)`,
//!    `leverage = min(signal.leverage, max_leverage)`
//! 4. `amount * leverage < min_order_value`: raise `amount` to the smallest
//!    value reaching the minimum, bounded by balance, else SKIP,
//!    `MIN_ORDER_NOT_MET`
//! 5. EXECUTE: `SUCCESS` if `amount == trade_amount`, else `SUCCESS_REDUCED`

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use sigcast_core::{Amount, Leverage, OutcomeKind, Signal, Subscriber};
use tracing::trace;

use crate::error::{PolicyError, PolicyResult};

/// Policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Exchange minimum notional (amount x leverage), in quote currency.
    #[serde(default = "default_min_order_value")]
    pub min_order_value: Decimal,
    /// Decimal places of quote-currency amounts sent to the exchange.
    #[serde(default = "default_amount_precision")]
    pub amount_precision: u32,
}

fn default_min_order_value() -> Decimal {
    dec!(8)
}

fn default_amount_precision() -> u32 {
    2
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            min_order_value: default_min_order_value(),
            amount_precision: default_amount_precision(),
        }
    }
}

impl PolicyConfig {
    pub fn validate(&self) -> PolicyResult<()> {
        if self.min_order_value <= Decimal::ZERO {
            return Err(PolicyError::InvalidConfig(format!(
                "min_order_value must be positive, got {}",
                self.min_order_value
            )));
        }
        if self.amount_precision > 8 {
            return Err(PolicyError::InvalidConfig(format!(
                "amount_precision must be at most 8, got {}",
                self.amount_precision
            )));
        }
        Ok(())
    }
}

/// Live account state as reported by the exchange adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountState {
    pub balance: Amount,
    pub has_open_position: bool,
}

/// Go / no-go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PolicyAction {
    Execute,
    Skip,
}

/// Outcome of a policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub action: PolicyAction,
    /// Quote-currency amount to commit. Zero on skips decided before sizing.
    pub resolved_amount: Amount,
    pub resolved_leverage: Leverage,
    pub outcome_kind: OutcomeKind,
}

impl Decision {
    fn skip(kind: OutcomeKind, amount: Amount, leverage: Leverage) -> Self {
        Self {
            action: PolicyAction::Skip,
            resolved_amount: amount,
            resolved_leverage: leverage,
            outcome_kind: kind,
        }
    }

    pub fn is_execute(&self) -> bool {
        self.action == PolicyAction::Execute
    }
}

/// Stateless order-sizing policy.
#[derive(Debug, Clone, Default)]
pub struct PolicyEvaluator {
    config: PolicyConfig,
}

impl PolicyEvaluator {
    #[must_use]
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn min_order_value(&self) -> Amount {
        Amount::new(self.config.min_order_value)
    }

    /// Evaluate one subscriber against one signal.
    pub fn evaluate(
        &self,
        signal: &Signal,
        subscriber: &Subscriber,
        account: AccountState,
    ) -> Decision {
        let leverage = signal.leverage.capped_at(subscriber.max_leverage);

        // Rule 1: one position per symbol
        if account.has_open_position {
            return Decision::skip(OutcomeKind::PositionExists, Amount::ZERO, leverage);
        }

        // Rule 2: nothing to trade with
        if !account.balance.is_positive() {
            return Decision::skip(OutcomeKind::InsufficientBalance, Amount::ZERO, leverage);
        }

        // Rule 3: cap at balance
        let mut amount = if subscriber.trade_amount <= account.balance {
            subscriber.trade_amount
        } else {
            account.balance.floor_dp(self.config.amount_precision)
        };

        // Rule 4: reach the exchange minimum if the balance allows it
        let min_order = self.min_order_value();
        if amount.notional(leverage.get()) < min_order {
            let required = Amount::new(min_order.inner() / Decimal::from(leverage.get()))
                .ceil_dp(self.config.amount_precision);
            if required > account.balance {
                trace!(
                    subscriber_id = %subscriber.id,
                    required = %required,
                    balance = %account.balance,
                    "Minimum order not reachable"
                );
                return Decision::skip(OutcomeKind::MinOrderNotMet, amount, leverage);
            }
            amount = required;
        }

        // Rule 5
        let outcome_kind = if amount == subscriber.trade_amount {
            OutcomeKind::Success
        } else {
            OutcomeKind::SuccessReduced
        };

        Decision {
            action: PolicyAction::Execute,
            resolved_amount: amount,
            resolved_leverage: leverage,
            outcome_kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sigcast_core::{CredentialRef, Direction, EntryOrder, SubscriberId, Symbol};

    fn signal(leverage: u32) -> Signal {
        Signal::new(
            Symbol::parse("BTCUSDT").unwrap(),
            Direction::Long,
            EntryOrder::Market,
            None,
            None,
            Leverage::new(leverage).unwrap(),
            Utc::now(),
        )
    }

    fn subscriber(trade_amount: Decimal, max_leverage: u32) -> Subscriber {
        Subscriber::new(SubscriberId(1), CredentialRef::new("ref"), Utc::now())
            .with_trade_amount(Amount::new(trade_amount))
            .with_max_leverage(Leverage::new(max_leverage).unwrap())
    }

    fn account(balance: Decimal, has_open_position: bool) -> AccountState {
        AccountState {
            balance: Amount::new(balance),
            has_open_position,
        }
    }

    #[test]
    fn test_full_amount_success() {
        let policy = PolicyEvaluator::default();
        let d = policy.evaluate(&signal(10), &subscriber(dec!(50), 10), account(dec!(1000), false));
        assert_eq!(d.action, PolicyAction::Execute);
        assert_eq!(d.outcome_kind, OutcomeKind::Success);
        assert_eq!(d.resolved_amount, Amount::new(dec!(50)));
        assert_eq!(d.resolved_leverage.get(), 10);
    }

    #[test]
    fn test_balance_boundary_reduced() {
        // trade_amount=50, balance=5, leverage=10: 5*10=50 >= 8
        let policy = PolicyEvaluator::default();
        let d = policy.evaluate(&signal(10), &subscriber(dec!(50), 10), account(dec!(5), false));
        assert_eq!(d.action, PolicyAction::Execute);
        assert_eq!(d.outcome_kind, OutcomeKind::SuccessReduced);
        assert_eq!(d.resolved_amount, Amount::new(dec!(5)));
    }

    #[test]
    fn test_balance_boundary_min_not_met() {
        // Leverage 1: 5*1=5 < 8 and cannot be raised above balance
        let policy = PolicyEvaluator::default();
        let d = policy.evaluate(&signal(1), &subscriber(dec!(50), 10), account(dec!(5), false));
        assert_eq!(d.action, PolicyAction::Skip);
        assert_eq!(d.outcome_kind, OutcomeKind::MinOrderNotMet);
    }

    #[test]
    fn test_amount_raised_to_minimum() {
        // trade_amount=2 at 3x is 6 < 8: raised to ceil(8/3)=2.67
        let policy = PolicyEvaluator::default();
        let d = policy.evaluate(&signal(3), &subscriber(dec!(2), 10), account(dec!(100), false));
        assert_eq!(d.action, PolicyAction::Execute);
        assert_eq!(d.resolved_amount, Amount::new(dec!(2.67)));
        assert_eq!(d.outcome_kind, OutcomeKind::SuccessReduced);
        assert!(d.resolved_amount.notional(3) >= policy.min_order_value());
    }

    #[test]
    fn test_position_exists_wins_over_balance() {
        let policy = PolicyEvaluator::default();
        for balance in [dec!(0), dec!(-3), dec!(5), dec!(100000)] {
            let d = policy.evaluate(&signal(10), &subscriber(dec!(50), 10), account(balance, true));
            assert_eq!(d.outcome_kind, OutcomeKind::PositionExists);
            assert_eq!(d.action, PolicyAction::Skip);
        }
    }

    #[test]
    fn test_non_positive_balance_insufficient() {
        let policy = PolicyEvaluator::default();
        for balance in [dec!(0), dec!(-1)] {
            let d = policy.evaluate(&signal(10), &subscriber(dec!(50), 10), account(balance, false));
            assert_eq!(d.outcome_kind, OutcomeKind::InsufficientBalance);
        }
    }

    #[test]
    fn test_leverage_capped_at_subscriber_max() {
        let policy = PolicyEvaluator::default();
        let d = policy.evaluate(&signal(50), &subscriber(dec!(50), 10), account(dec!(1000), false));
        assert_eq!(d.resolved_leverage.get(), 10);
    }

    #[test]
    fn test_balance_cap_floors_to_precision() {
        let policy = PolicyEvaluator::default();
        let d = policy.evaluate(&signal(10), &subscriber(dec!(50), 10), account(dec!(12.349), false));
        assert_eq!(d.resolved_amount, Amount::new(dec!(12.34)));
        assert!(d.resolved_amount <= Amount::new(dec!(12.349)));
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let policy = PolicyEvaluator::default();
        let sig = signal(7);
        let sub = subscriber(dec!(3), 5);
        let acct = account(dec!(4), false);
        let first = policy.evaluate(&sig, &sub, acct);
        for _ in 0..10 {
            assert_eq!(policy.evaluate(&sig, &sub, acct), first);
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(PolicyConfig::default().validate().is_ok());
        let bad = PolicyConfig {
            min_order_value: dec!(0),
            ..PolicyConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
