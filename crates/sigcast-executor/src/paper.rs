//! In-process simulated exchange.
//!
//! Keeps per-subscriber balances and positions in memory so the whole engine
//! can run without a remote venue. Failure modes can be scripted per
//! subscriber or per symbol.

use parking_lot::Mutex;
use rust_decimal::Decimal;
use sigcast_core::{Amount, Leverage, OrderSide, Price, Subscriber, SubscriberId, Symbol};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::error::{ExchangeError, ExchangeResult};
use crate::exchange::{BoxFuture, ExchangeClient, OrderRef, OrderRequest};

/// Simulated open position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperPosition {
    pub side: OrderSide,
    /// Margin still committed.
    pub margin: Amount,
    pub leverage: Leverage,
    pub stop_loss: Option<Price>,
    pub take_profit: Option<Price>,
}

#[derive(Debug, Default)]
struct PaperAccount {
    balance: Amount,
    leverage: HashMap<Symbol, Leverage>,
    positions: HashMap<Symbol, PaperPosition>,
}

#[derive(Debug, Default)]
struct PaperState {
    accounts: HashMap<SubscriberId, PaperAccount>,
    unknown_symbols: HashSet<Symbol>,
    invalid_keys: HashSet<SubscriberId>,
    /// Scripted API failures, keyed by subscriber.
    failures: HashMap<SubscriberId, String>,
    /// SL/TP attach failures, keyed by subscriber.
    sl_tp_failures: HashMap<SubscriberId, String>,
    orders: Vec<(SubscriberId, OrderRequest)>,
}

pub struct PaperExchange {
    state: Mutex<PaperState>,
    default_balance: Amount,
    order_seq: AtomicU64,
    latency: Mutex<Duration>,
}

impl PaperExchange {
    /// New venue where unseen accounts start with `default_balance`.
    pub fn new(default_balance: Amount) -> Self {
        Self {
            state: Mutex::new(PaperState::default()),
            default_balance,
            order_seq: AtomicU64::new(1),
            latency: Mutex::new(Duration::ZERO),
        }
    }

    // =========================================================================
    // Scripting
    // =========================================================================

    pub fn set_balance(&self, id: SubscriberId, balance: Amount) {
        let mut state = self.state.lock();
        Self::account_mut(&mut state, id, self.default_balance).balance = balance;
    }

    /// Seed an existing position, as if opened outside the engine.
    pub fn seed_position(&self, id: SubscriberId, symbol: Symbol, position: PaperPosition) {
        let mut state = self.state.lock();
        Self::account_mut(&mut state, id, self.default_balance)
            .positions
            .insert(symbol, position);
    }

    /// Make the venue reject `symbol` as unknown.
    pub fn reject_symbol(&self, symbol: Symbol) {
        self.state.lock().unknown_symbols.insert(symbol);
    }

    /// Make every call for `id` fail with rejected credentials.
    pub fn invalidate_key(&self, id: SubscriberId) {
        self.state.lock().invalid_keys.insert(id);
    }

    /// Make every call for `id` fail with an API error.
    pub fn fail_with(&self, id: SubscriberId, message: impl Into<String>) {
        self.state.lock().failures.insert(id, message.into());
    }

    /// Make stop-loss / take-profit updates for `id` fail.
    pub fn fail_sl_tp(&self, id: SubscriberId, message: impl Into<String>) {
        self.state.lock().sl_tp_failures.insert(id, message.into());
    }

    pub fn clear_failures(&self, id: SubscriberId) {
        let mut state = self.state.lock();
        state.invalid_keys.remove(&id);
        state.failures.remove(&id);
        state.sl_tp_failures.remove(&id);
    }

    /// Simulated round-trip time applied to every call.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn balance(&self, id: SubscriberId) -> Amount {
        self.state
            .lock()
            .accounts
            .get(&id)
            .map_or(self.default_balance, |a| a.balance)
    }

    pub fn position(&self, id: SubscriberId, symbol: &Symbol) -> Option<PaperPosition> {
        self.state
            .lock()
            .accounts
            .get(&id)
            .and_then(|a| a.positions.get(symbol).cloned())
    }

    pub fn leverage(&self, id: SubscriberId, symbol: &Symbol) -> Option<Leverage> {
        self.state
            .lock()
            .accounts
            .get(&id)
            .and_then(|a| a.leverage.get(symbol).copied())
    }

    /// Every order placed, in arrival order.
    pub fn orders(&self) -> Vec<(SubscriberId, OrderRequest)> {
        self.state.lock().orders.clone()
    }

    pub fn orders_for(&self, id: SubscriberId) -> Vec<OrderRequest> {
        self.state
            .lock()
            .orders
            .iter()
            .filter(|(sub, _)| *sub == id)
            .map(|(_, order)| order.clone())
            .collect()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn account_mut(
        state: &mut PaperState,
        id: SubscriberId,
        default_balance: Amount,
    ) -> &mut PaperAccount {
        state.accounts.entry(id).or_insert_with(|| PaperAccount {
            balance: default_balance,
            ..PaperAccount::default()
        })
    }

    fn check_access(state: &PaperState, id: SubscriberId) -> ExchangeResult<()> {
        if state.invalid_keys.contains(&id) {
            return Err(ExchangeError::InvalidKey);
        }
        if let Some(message) = state.failures.get(&id) {
            return Err(ExchangeError::Api(message.clone()));
        }
        Ok(())
    }

    fn check_symbol(state: &PaperState, symbol: &Symbol) -> ExchangeResult<()> {
        if state.unknown_symbols.contains(symbol) {
            return Err(ExchangeError::SymbolNotFound(symbol.clone()));
        }
        Ok(())
    }

    fn next_order_ref(&self) -> OrderRef {
        OrderRef(format!("paper-{}", self.order_seq.fetch_add(1, Ordering::SeqCst)))
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

impl ExchangeClient for PaperExchange {
    fn has_open_position<'a>(
        &'a self,
        subscriber: &'a Subscriber,
        symbol: &'a Symbol,
    ) -> BoxFuture<'a, ExchangeResult<bool>> {
        Box::pin(async move {
            self.simulate_latency().await;
            let state = self.state.lock();
            Self::check_access(&state, subscriber.id)?;
            Ok(state
                .accounts
                .get(&subscriber.id)
                .is_some_and(|a| a.positions.contains_key(symbol)))
        })
    }

    fn get_balance<'a>(&'a self, subscriber: &'a Subscriber) -> BoxFuture<'a, ExchangeResult<Amount>> {
        Box::pin(async move {
            self.simulate_latency().await;
            let state = self.state.lock();
            Self::check_access(&state, subscriber.id)?;
            Ok(state
                .accounts
                .get(&subscriber.id)
                .map_or(self.default_balance, |a| a.balance))
        })
    }

    fn set_leverage<'a>(
        &'a self,
        subscriber: &'a Subscriber,
        symbol: &'a Symbol,
        leverage: Leverage,
    ) -> BoxFuture<'a, ExchangeResult<()>> {
        Box::pin(async move {
            self.simulate_latency().await;
            let mut state = self.state.lock();
            Self::check_access(&state, subscriber.id)?;
            Self::check_symbol(&state, symbol)?;
            let account = Self::account_mut(&mut state, subscriber.id, self.default_balance);
            account.leverage.insert(symbol.clone(), leverage);
            if let Some(position) = account.positions.get_mut(symbol) {
                position.leverage = leverage;
            }
            Ok(())
        })
    }

    fn place_order<'a>(
        &'a self,
        subscriber: &'a Subscriber,
        order: OrderRequest,
    ) -> BoxFuture<'a, ExchangeResult<OrderRef>> {
        Box::pin(async move {
            self.simulate_latency().await;
            let mut state = self.state.lock();
            Self::check_access(&state, subscriber.id)?;
            Self::check_symbol(&state, &order.symbol)?;

            let account = Self::account_mut(&mut state, subscriber.id, self.default_balance);
            if order.quantity > account.balance {
                return Err(ExchangeError::Api(format!(
                    "margin {} exceeds balance {}",
                    order.quantity, account.balance
                )));
            }
            let leverage = account
                .leverage
                .get(&order.symbol)
                .copied()
                .unwrap_or_default();
            account.balance = account.balance - order.quantity;
            account.positions.insert(
                order.symbol.clone(),
                PaperPosition {
                    side: order.side,
                    margin: order.quantity,
                    leverage,
                    stop_loss: None,
                    take_profit: None,
                },
            );

            let order_ref = self.next_order_ref();
            debug!(
                subscriber_id = %subscriber.id,
                symbol = %order.symbol,
                side = %order.side,
                quantity = %order.quantity,
                order_ref = %order_ref,
                "Paper order filled"
            );
            state.orders.push((subscriber.id, order));
            Ok(order_ref)
        })
    }

    fn set_stop_loss_take_profit<'a>(
        &'a self,
        subscriber: &'a Subscriber,
        symbol: &'a Symbol,
        stop_loss: Option<Price>,
        take_profit: Option<Price>,
    ) -> BoxFuture<'a, ExchangeResult<()>> {
        Box::pin(async move {
            self.simulate_latency().await;
            let mut state = self.state.lock();
            Self::check_access(&state, subscriber.id)?;
            if let Some(message) = state.sl_tp_failures.get(&subscriber.id) {
                return Err(ExchangeError::Api(message.clone()));
            }
            let position = Self::account_mut(&mut state, subscriber.id, self.default_balance)
                .positions
                .get_mut(symbol)
                .ok_or_else(|| ExchangeError::NoPosition(symbol.clone()))?;
            if stop_loss.is_some() {
                position.stop_loss = stop_loss;
            }
            if take_profit.is_some() {
                position.take_profit = take_profit;
            }
            Ok(())
        })
    }

    fn close_position<'a>(
        &'a self,
        subscriber: &'a Subscriber,
        symbol: &'a Symbol,
        percentage: Decimal,
    ) -> BoxFuture<'a, ExchangeResult<OrderRef>> {
        Box::pin(async move {
            self.simulate_latency().await;
            let mut state = self.state.lock();
            Self::check_access(&state, subscriber.id)?;
            Self::check_symbol(&state, symbol)?;

            let account = Self::account_mut(&mut state, subscriber.id, self.default_balance);
            let position = account
                .positions
                .get_mut(symbol)
                .ok_or_else(|| ExchangeError::NoPosition(symbol.clone()))?;

            let fraction = (percentage / Decimal::ONE_HUNDRED).min(Decimal::ONE);
            let released = position.margin * fraction;
            position.margin = position.margin - released;
            let fully_closed = fraction == Decimal::ONE || position.margin.is_zero();
            account.balance = account.balance + released;
            if fully_closed {
                account.positions.remove(symbol);
            }
            Ok(self.next_order_ref())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use sigcast_core::{CredentialRef, OrderKind};
    use tokio_test::assert_ok;

    fn subscriber(id: i64) -> Subscriber {
        Subscriber::new(SubscriberId(id), CredentialRef::new("paper"), Utc::now())
    }

    fn btc() -> Symbol {
        Symbol::parse("BTCUSDT").unwrap()
    }

    fn market_buy(quantity: Decimal) -> OrderRequest {
        OrderRequest {
            symbol: btc(),
            side: OrderSide::Buy,
            kind: OrderKind::Market,
            quantity: Amount::new(quantity),
            price: None,
        }
    }

    #[tokio::test]
    async fn test_order_opens_position_and_debits_margin() {
        let paper = PaperExchange::new(Amount::new(dec!(100)));
        let sub = subscriber(1);

        assert_ok!(paper.set_leverage(&sub, &btc(), Leverage::new(5).unwrap()).await);
        let order_ref = paper.place_order(&sub, market_buy(dec!(40))).await.unwrap();

        assert!(order_ref.0.starts_with("paper-"));
        assert_eq!(paper.balance(SubscriberId(1)), Amount::new(dec!(60)));
        assert!(paper.has_open_position(&sub, &btc()).await.unwrap());
        assert_eq!(paper.position(SubscriberId(1), &btc()).unwrap().leverage.get(), 5);
    }

    #[tokio::test]
    async fn test_partial_then_full_close() {
        let paper = PaperExchange::new(Amount::new(dec!(100)));
        let sub = subscriber(1);
        paper.place_order(&sub, market_buy(dec!(40))).await.unwrap();

        paper.close_position(&sub, &btc(), dec!(50)).await.unwrap();
        assert_eq!(paper.position(SubscriberId(1), &btc()).unwrap().margin, Amount::new(dec!(20)));
        assert_eq!(paper.balance(SubscriberId(1)), Amount::new(dec!(80)));

        paper.close_position(&sub, &btc(), dec!(100)).await.unwrap();
        assert!(paper.position(SubscriberId(1), &btc()).is_none());
        assert_eq!(paper.balance(SubscriberId(1)), Amount::new(dec!(100)));

        assert_eq!(
            paper.close_position(&sub, &btc(), dec!(100)).await,
            Err(ExchangeError::NoPosition(btc()))
        );
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let paper = PaperExchange::new(Amount::new(dec!(100)));
        let sub = subscriber(1);

        paper.reject_symbol(btc());
        assert_eq!(
            paper.place_order(&sub, market_buy(dec!(10))).await,
            Err(ExchangeError::SymbolNotFound(btc()))
        );

        paper.invalidate_key(SubscriberId(1));
        assert_eq!(paper.get_balance(&sub).await, Err(ExchangeError::InvalidKey));

        paper.clear_failures(SubscriberId(1));
        paper.fail_with(SubscriberId(1), "maintenance");
        assert_eq!(
            paper.get_balance(&sub).await,
            Err(ExchangeError::Api("maintenance".into()))
        );
    }

    #[tokio::test]
    async fn test_sl_tp_keeps_unset_side() {
        let paper = PaperExchange::new(Amount::new(dec!(100)));
        let sub = subscriber(1);
        paper.place_order(&sub, market_buy(dec!(10))).await.unwrap();

        paper
            .set_stop_loss_take_profit(&sub, &btc(), Some(Price::new(dec!(60000))), Some(Price::new(dec!(70000))))
            .await
            .unwrap();
        paper
            .set_stop_loss_take_profit(&sub, &btc(), None, Some(Price::new(dec!(72000))))
            .await
            .unwrap();

        let position = paper.position(SubscriberId(1), &btc()).unwrap();
        assert_eq!(position.stop_loss, Some(Price::new(dec!(60000))));
        assert_eq!(position.take_profit, Some(Price::new(dec!(72000))));
    }
}
