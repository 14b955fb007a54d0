//! Broadcast engine.
//!
//! Applies a new signal or a signal mutation across every eligible
//! subscriber and aggregates the per-subscriber outcomes.
//!
//! # Eligibility
//!
//! - New signal: every active subscriber. AUTO executes immediately,
//!   MANUAL receives a confirmation offer.
//! - Close / leverage / SL-TP edit: active AUTO subscribers currently
//!   holding a position opened for the signal.
//!
//! # Isolation
//!
//! Each subscriber runs in its own task behind a global semaphore. Adapter
//! errors become outcomes; a panicking task becomes an `API_ERROR` outcome.
//! Nothing a single subscriber does can abort the broadcast.

use chrono::Utc;
use dashmap::DashSet;
use futures_util::future::join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sigcast_core::{
    BroadcastReport, OrderSide, OutcomeKind, Signal, SignalId, SignalMutation, Subscriber,
    SubscriberId, TradeAction, TradeOutcome,
};
use sigcast_notify::{Notification, NotificationHandle};
use sigcast_policy::{AccountState, PolicyEvaluator};
use sigcast_registry::{SignalBook, SubscriberRegistry, TradeLedger};
use sigcast_telemetry::Metrics;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::confirmation::ConfirmationTracker;
use crate::error::{BroadcastError, BroadcastResult, ConfirmError};
use crate::exchange::{DynExchangeClient, OrderRequest};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Upper bound on in-flight subscriber executions.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_max_concurrency() -> usize {
    10
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
        }
    }
}

/// Shared stores the engine reads and appends to.
#[derive(Clone, Default)]
pub struct Stores {
    pub subscribers: Arc<SubscriberRegistry>,
    pub signals: Arc<SignalBook>,
    pub ledger: Arc<TradeLedger>,
}

impl Stores {
    pub fn new() -> Self {
        Self::default()
    }
}

// ============================================================================
// Jobs
// ============================================================================

/// What a broadcast asks each subscriber's account to do.
#[derive(Debug, Clone)]
enum Job {
    Open(Signal),
    Mutate {
        signal: Signal,
        mutation: SignalMutation,
    },
}

impl Job {
    fn signal(&self) -> &Signal {
        match self {
            Self::Open(signal) | Self::Mutate { signal, .. } => signal,
        }
    }

    fn command(&self) -> &'static str {
        match self {
            Self::Open(_) => "new",
            Self::Mutate { mutation, .. } => mutation.label(),
        }
    }

    fn action(&self) -> TradeAction {
        match self {
            Self::Open(_) => TradeAction::Open,
            Self::Mutate { mutation, .. } => match mutation {
                SignalMutation::Close(cmd) => TradeAction::Close {
                    percentage: cmd.percentage,
                },
                SignalMutation::Leverage(cmd) => TradeAction::SetLeverage {
                    leverage: cmd.leverage,
                },
                SignalMutation::EditSlTp(_) => TradeAction::EditSlTp,
            },
        }
    }

    fn side(&self) -> OrderSide {
        let entry_side = self.signal().direction.order_side();
        match self {
            Self::Mutate {
                mutation: SignalMutation::Close(_),
                ..
            } => entry_side.opposite(),
            _ => entry_side,
        }
    }

    fn outcome(&self, subscriber_id: SubscriberId, kind: OutcomeKind) -> TradeOutcome {
        TradeOutcome::new(
            subscriber_id,
            self.signal().id.clone(),
            self.action(),
            self.side(),
            kind,
        )
    }
}

/// Keeps the in-flight gauge honest even when a task panics.
struct InflightGuard;

impl InflightGuard {
    fn enter() -> Self {
        Metrics::execution_inflight_inc();
        Self
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        Metrics::execution_inflight_dec();
    }
}

// ============================================================================
// Engine
// ============================================================================

struct EngineInner {
    exchange: DynExchangeClient,
    stores: Stores,
    confirmations: Arc<ConfirmationTracker>,
    policy: PolicyEvaluator,
    notifications: NotificationHandle,
    permits: Arc<Semaphore>,
    /// Signals whose symbol the exchange has already rejected once.
    symbol_misses: DashSet<SignalId>,
}

/// Cheap to clone; all clones share stores and the concurrency bound.
#[derive(Clone)]
pub struct BroadcastEngine {
    inner: Arc<EngineInner>,
}

impl BroadcastEngine {
    pub fn new(
        config: &BroadcastConfig,
        exchange: DynExchangeClient,
        stores: Stores,
        confirmations: Arc<ConfirmationTracker>,
        policy: PolicyEvaluator,
        notifications: NotificationHandle,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                exchange,
                stores,
                confirmations,
                policy,
                notifications,
                permits: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
                symbol_misses: DashSet::new(),
            }),
        }
    }

    pub fn stores(&self) -> &Stores {
        &self.inner.stores
    }

    pub fn confirmations(&self) -> &Arc<ConfirmationTracker> {
        &self.inner.confirmations
    }

    /// Broadcast a freshly parsed signal.
    pub async fn broadcast_signal(&self, signal: Signal) -> BroadcastResult<BroadcastReport> {
        let started_at = Utc::now();
        let started = Instant::now();
        self.inner.stores.signals.insert(signal.clone())?;
        Metrics::broadcast_started("new");

        let (auto, manual): (Vec<_>, Vec<_>) = self
            .inner
            .stores
            .subscribers
            .active()
            .into_iter()
            .partition(Subscriber::is_auto);

        info!(
            signal_id = %signal.id,
            symbol = %signal.symbol,
            direction = %signal.direction,
            auto = auto.len(),
            manual = manual.len(),
            "Broadcasting signal"
        );

        let offered = self.offer_to(&signal, &manual);
        let signal_id = signal.id.clone();
        let job = Arc::new(Job::Open(signal));
        let outcomes = self.fan_out(job.clone(), auto).await;

        let report = BroadcastReport::new(signal_id, job.command(), offered, outcomes, started_at);
        Ok(self.finish(&job, report, started))
    }

    /// Broadcast a close, leverage or SL/TP edit of an issued signal.
    pub async fn broadcast_mutation(
        &self,
        mutation: SignalMutation,
    ) -> BroadcastResult<BroadcastReport> {
        let started_at = Utc::now();
        let started = Instant::now();
        let stores = &self.inner.stores;
        let signal_id = mutation.signal_id().clone();

        let signal = stores
            .signals
            .get(&signal_id)
            .ok_or_else(|| BroadcastError::SignalNotFound(signal_id.clone()))?;
        if !signal.is_active() {
            return Err(BroadcastError::SignalInactive(signal_id));
        }
        Metrics::broadcast_started(mutation.label());

        let targets: Vec<Subscriber> = stores
            .ledger
            .holders(&signal_id)
            .into_iter()
            .filter_map(|id| stores.subscribers.get(id))
            .filter(|sub| sub.active && sub.is_auto())
            .collect();

        info!(
            signal_id = %signal_id,
            command = mutation.label(),
            holders = targets.len(),
            "Broadcasting signal update"
        );

        let full_close = matches!(&mutation, SignalMutation::Close(cmd) if cmd.is_full());
        let job = Arc::new(Job::Mutate { signal, mutation });
        let outcomes = self.fan_out(job.clone(), targets).await;

        // A full close retires the signal only once no targeted position is left.
        let still_open: Vec<SubscriberId> = if full_close {
            outcomes
                .iter()
                .filter(|o| !o.kind.is_success())
                .map(|o| o.subscriber_id)
                .collect()
        } else {
            Vec::new()
        };
        if full_close {
            if still_open.is_empty() {
                if stores.signals.close(&signal_id, Utc::now())? {
                    info!(signal_id = %signal_id, "Signal closed");
                }
            } else {
                warn!(
                    signal_id = %signal_id,
                    still_open = still_open.len(),
                    "Full close incomplete, signal kept active"
                );
            }
        }

        let report = BroadcastReport::new(signal_id, job.command(), 0, outcomes, started_at)
            .with_still_open(still_open);
        Ok(self.finish(&job, report, started))
    }

    /// MANUAL subscriber accepts an offer: execute exactly as AUTO would.
    pub async fn confirm(
        &self,
        subscriber_id: SubscriberId,
        signal_id: &SignalId,
    ) -> BroadcastResult<TradeOutcome> {
        let (subscriber, signal) = self.resolve_offer(subscriber_id, signal_id)?;

        if let Err(e) = self.inner.confirmations.claim(subscriber_id, signal_id) {
            if matches!(e, ConfirmError::Expired { .. }) {
                self.inner
                    .notifications
                    .notify(Notification::offer_expired(subscriber_id, signal_id.clone()));
            }
            debug!(subscriber_id = %subscriber_id, signal_id = %signal_id, error = %e, "Confirmation rejected");
            return Err(e.into());
        }

        info!(subscriber_id = %subscriber_id, signal_id = %signal_id, "Confirmation accepted");
        let job = Arc::new(Job::Open(signal));
        let mut outcomes = self.fan_out(job.clone(), vec![subscriber]).await;
        self.record(&job, &outcomes);

        outcomes
            .pop()
            .ok_or_else(|| BroadcastError::SubscriberNotFound(subscriber_id))
    }

    /// MANUAL subscriber declines an offer.
    pub fn skip(&self, subscriber_id: SubscriberId, signal_id: &SignalId) -> BroadcastResult<()> {
        self.inner.confirmations.skip(subscriber_id, signal_id)?;
        info!(subscriber_id = %subscriber_id, signal_id = %signal_id, "Confirmation skipped");
        Ok(())
    }

    /// Queue a plain announcement to every active subscriber.
    pub fn announce(&self, text: &str) -> usize {
        let recipients = self.inner.stores.subscribers.active();
        for subscriber in &recipients {
            self.inner
                .notifications
                .notify(Notification::announcement(subscriber.id, text));
        }
        info!(recipients = recipients.len(), "Announcement queued");
        recipients.len()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn resolve_offer(
        &self,
        subscriber_id: SubscriberId,
        signal_id: &SignalId,
    ) -> BroadcastResult<(Subscriber, Signal)> {
        let stores = &self.inner.stores;
        let subscriber = stores
            .subscribers
            .get(subscriber_id)
            .ok_or(BroadcastError::SubscriberNotFound(subscriber_id))?;
        if !subscriber.active {
            return Err(BroadcastError::SubscriberInactive(subscriber_id));
        }
        let signal = stores
            .signals
            .get(signal_id)
            .ok_or_else(|| BroadcastError::SignalNotFound(signal_id.clone()))?;
        if !signal.is_active() {
            return Err(BroadcastError::SignalInactive(signal_id.clone()));
        }
        Ok((subscriber, signal))
    }

    fn offer_to(&self, signal: &Signal, manual: &[Subscriber]) -> usize {
        let mut offered = 0;
        for subscriber in manual {
            match self.inner.confirmations.offer(subscriber.id, &signal.id) {
                Ok(pending) => {
                    self.inner.notifications.notify(Notification::confirmation_offer(
                        subscriber.id,
                        signal.clone(),
                        pending.expires_at(),
                    ));
                    offered += 1;
                }
                Err(e) => warn!(subscriber_id = %subscriber.id, error = %e, "Offer not created"),
            }
        }
        offered
    }

    /// Run `job` for every target under the concurrency bound.
    ///
    /// Returns exactly one outcome per target.
    async fn fan_out(&self, job: Arc<Job>, targets: Vec<Subscriber>) -> Vec<TradeOutcome> {
        let (ids, handles): (Vec<_>, Vec<_>) = targets
            .into_iter()
            .map(|subscriber| {
                let inner = self.inner.clone();
                let job = job.clone();
                let id = subscriber.id;
                let handle = tokio::spawn(async move { inner.run_gated(&job, &subscriber).await });
                (id, handle)
            })
            .unzip();

        join_all(handles)
            .await
            .into_iter()
            .zip(ids)
            .map(|(joined, subscriber_id)| match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(
                        subscriber_id = %subscriber_id,
                        signal_id = %job.signal().id,
                        error = %e,
                        "Subscriber execution aborted"
                    );
                    job.outcome(subscriber_id, OutcomeKind::ApiError)
                        .with_detail(format!("execution aborted: {e}"))
                }
            })
            .collect()
    }

    /// Persist, notify and count a set of outcomes.
    fn record(&self, job: &Job, outcomes: &[TradeOutcome]) {
        let stores = &self.inner.stores;
        let command = job.command();

        for outcome in outcomes {
            Metrics::outcome_recorded(command, outcome.kind.as_str());

            match outcome.kind {
                OutcomeKind::SymbolNotFound if self.inner.first_symbol_miss(&outcome.signal_id) => {
                    warn!(
                        signal_id = %outcome.signal_id,
                        symbol = %job.signal().symbol,
                        subscriber_id = %outcome.subscriber_id,
                        "Symbol rejected by exchange"
                    );
                }
                OutcomeKind::SymbolNotFound => {
                    debug!(subscriber_id = %outcome.subscriber_id, "Symbol rejected by exchange (repeat)");
                }
                OutcomeKind::ApiError => warn!(
                    subscriber_id = %outcome.subscriber_id,
                    signal_id = %outcome.signal_id,
                    detail = outcome.detail.as_deref().unwrap_or(""),
                    "Execution failed"
                ),
                kind => debug!(subscriber_id = %outcome.subscriber_id, kind = %kind, "Execution outcome"),
            }

            if outcome.kind.is_success() && outcome.action == TradeAction::Open {
                if let Err(e) = stores.subscribers.record_trade(outcome.subscriber_id, Decimal::ZERO) {
                    debug!(subscriber_id = %outcome.subscriber_id, error = %e, "Trade count not updated");
                }
            }
            if outcome.kind.is_subscriber_visible() {
                self.inner
                    .notifications
                    .notify(Notification::trade_result(outcome.clone()));
            }
        }

        stores.ledger.extend(outcomes.iter().cloned());
    }

    /// Queue the operator report ahead of the per-subscriber notices, then record.
    fn finish(&self, job: &Job, report: BroadcastReport, started: Instant) -> BroadcastReport {
        self.inner
            .notifications
            .notify(Notification::operator_report(report.clone()));
        self.record(job, &report.outcomes);

        Metrics::broadcast_latency(job.command(), started.elapsed().as_secs_f64() * 1000.0);
        info!(
            signal_id = %report.signal_id,
            command = %report.command,
            total = report.counts.total,
            success = report.counts.success,
            success_reduced = report.counts.success_reduced,
            offered = report.offered,
            elapsed_ms = report.elapsed_ms(),
            "Broadcast completed"
        );
        report
    }
}

impl EngineInner {
    /// True the first time a symbol rejection is seen for `signal_id`.
    fn first_symbol_miss(&self, signal_id: &SignalId) -> bool {
        self.symbol_misses.insert(signal_id.clone())
    }

    async fn run_gated(&self, job: &Job, subscriber: &Subscriber) -> TradeOutcome {
        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                return job
                    .outcome(subscriber.id, OutcomeKind::ApiError)
                    .with_detail(format!("execution pool closed: {e}"))
            }
        };
        let _inflight = InflightGuard::enter();

        match job {
            Job::Open(signal) => self.open(job, signal, subscriber).await,
            Job::Mutate { signal, mutation } => self.mutate(job, signal, mutation, subscriber).await,
        }
    }

    /// Position check, balance, policy, leverage, order, then SL/TP.
    async fn open(&self, job: &Job, signal: &Signal, subscriber: &Subscriber) -> TradeOutcome {
        let failed = |e: crate::error::ExchangeError| {
            job.outcome(subscriber.id, e.outcome_kind())
                .with_detail(e.to_string())
        };

        let has_open_position = match self.exchange.has_open_position(subscriber, &signal.symbol).await {
            Ok(open) => open,
            Err(e) => return failed(e),
        };
        let balance = if has_open_position {
            sigcast_core::Amount::ZERO
        } else {
            match self.exchange.get_balance(subscriber).await {
                Ok(balance) => balance,
                Err(e) => return failed(e),
            }
        };

        let decision = self.policy.evaluate(
            signal,
            subscriber,
            AccountState {
                balance,
                has_open_position,
            },
        );
        let mut outcome = job.outcome(subscriber.id, decision.outcome_kind);
        if decision.resolved_amount.is_positive() {
            outcome = outcome.with_sizing(
                decision.resolved_amount,
                decision.resolved_leverage,
                signal.entry_price(),
            );
        }
        if !decision.is_execute() {
            return outcome;
        }

        if let Err(e) = self
            .exchange
            .set_leverage(subscriber, &signal.symbol, decision.resolved_leverage)
            .await
        {
            return failed(e);
        }

        let order = OrderRequest {
            symbol: signal.symbol.clone(),
            side: signal.direction.order_side(),
            kind: signal.order_kind(),
            quantity: decision.resolved_amount,
            price: signal.entry_price(),
        };
        let order_ref = match self.exchange.place_order(subscriber, order).await {
            Ok(order_ref) => order_ref,
            Err(e) => return failed(e),
        };
        outcome = outcome.with_order_ref(order_ref.0);

        if signal.stop_loss.is_some() || signal.take_profit.is_some() {
            if let Err(e) = self
                .exchange
                .set_stop_loss_take_profit(subscriber, &signal.symbol, signal.stop_loss, signal.take_profit)
                .await
            {
                warn!(subscriber_id = %subscriber.id, error = %e, "SL/TP not attached");
                outcome = outcome.with_detail(format!("SL/TP not attached: {e}"));
            }
        }
        outcome
    }

    async fn mutate(
        &self,
        job: &Job,
        signal: &Signal,
        mutation: &SignalMutation,
        subscriber: &Subscriber,
    ) -> TradeOutcome {
        let result = match mutation {
            SignalMutation::Close(cmd) => self
                .exchange
                .close_position(subscriber, &signal.symbol, cmd.percentage)
                .await
                .map(|order_ref| Some(order_ref.0)),
            SignalMutation::Leverage(cmd) => {
                let leverage = cmd.leverage.capped_at(subscriber.max_leverage);
                self.exchange
                    .set_leverage(subscriber, &signal.symbol, leverage)
                    .await
                    .map(|()| None)
            }
            SignalMutation::EditSlTp(cmd) => self
                .exchange
                .set_stop_loss_take_profit(subscriber, &signal.symbol, cmd.stop_loss, cmd.take_profit)
                .await
                .map(|()| None),
        };

        match result {
            Ok(order_ref) => {
                let mut outcome = job.outcome(subscriber.id, OutcomeKind::Success);
                if let SignalMutation::Leverage(cmd) = mutation {
                    outcome.leverage = Some(cmd.leverage.capped_at(subscriber.max_leverage));
                }
                match order_ref {
                    Some(order_ref) => outcome.with_order_ref(order_ref),
                    None => outcome,
                }
            }
            Err(e) => job
                .outcome(subscriber.id, e.outcome_kind())
                .with_detail(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExchangeResult;
    use crate::exchange::{BoxFuture, ExchangeClient, OrderRef};
    use crate::paper::PaperExchange;
    use rust_decimal_macros::dec;
    use sigcast_core::{
        Amount, CloseCommand, CredentialRef, Direction, EditSlTpCommand, EntryOrder, Leverage,
        LeverageCommand, ManualClock, Price, Symbol, TradeMode,
    };
    use sigcast_notify::{
        DispatcherConfig, NotificationBody, NotificationDispatcher, Recipient, RecordingSink,
    };
    use sigcast_policy::PolicyConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    struct Harness {
        engine: BroadcastEngine,
        paper: Arc<PaperExchange>,
        clock: Arc<ManualClock>,
        dispatcher: NotificationDispatcher,
        sink: Arc<RecordingSink>,
    }

    impl Harness {
        fn new() -> Self {
            let paper = Arc::new(PaperExchange::new(Amount::new(dec!(1000))));
            Self::with_exchange(paper.clone(), paper)
        }

        fn with_exchange(paper: Arc<PaperExchange>, exchange: DynExchangeClient) -> Self {
            let clock = Arc::new(ManualClock::new(1_700_000_000_000));
            let sink = Arc::new(RecordingSink::new());
            let (dispatcher, handle) = NotificationDispatcher::new(
                &DispatcherConfig {
                    max_per_second: 10_000,
                    ..DispatcherConfig::default()
                },
                sink.clone(),
            );
            let tracker = Arc::new(ConfirmationTracker::new(Duration::from_secs(60), clock.clone()));
            let engine = BroadcastEngine::new(
                &BroadcastConfig::default(),
                exchange,
                Stores::new(),
                tracker,
                PolicyEvaluator::new(PolicyConfig::default()),
                handle,
            );
            Self {
                engine,
                paper,
                clock,
                dispatcher,
                sink,
            }
        }

        fn add(&self, id: i64, mode: TradeMode) {
            self.engine.stores().subscribers.insert(
                Subscriber::new(SubscriberId(id), CredentialRef::new(format!("key-{id}")), Utc::now())
                    .with_mode(mode),
            );
        }

        /// Stop producing and deliver everything queued.
        async fn drain(self) -> Arc<RecordingSink> {
            let Self { engine, dispatcher, sink, .. } = self;
            drop(engine);
            dispatcher.run(CancellationToken::new()).await;
            sink
        }
    }

    fn btc_long() -> Signal {
        Signal::new(
            Symbol::parse("BTCUSDT").unwrap(),
            Direction::Long,
            EntryOrder::Market,
            Some(Price::new(dec!(60000))),
            Some(Price::new(dec!(70000))),
            Leverage::new(10).unwrap(),
            Utc::now(),
        )
    }

    fn btc() -> Symbol {
        Symbol::parse("BTCUSDT").unwrap()
    }

    #[tokio::test]
    async fn test_new_signal_executes_auto_and_offers_manual() {
        let h = Harness::new();
        h.add(1, TradeMode::Auto);
        h.add(2, TradeMode::Auto);
        h.add(3, TradeMode::Manual);

        let report = h.engine.broadcast_signal(btc_long()).await.unwrap();

        assert_eq!(report.counts.total, 2);
        assert_eq!(report.counts.success, 2);
        assert_eq!(report.offered, 1);
        assert!(report.outcomes_for(SubscriberId(3)).next().is_none());
        assert!(h.engine.confirmations().is_pending(SubscriberId(3), &report.signal_id));

        let position = h.paper.position(SubscriberId(1), &btc()).unwrap();
        assert_eq!(position.margin, Amount::new(dec!(50)));
        assert_eq!(position.leverage.get(), 10);
        assert_eq!(position.stop_loss, Some(Price::new(dec!(60000))));
        assert_eq!(h.engine.stores().subscribers.get(SubscriberId(1)).unwrap().total_trades, 1);
        assert_eq!(h.engine.stores().ledger.len(), 2);

        let sink = h.drain().await;
        assert_eq!(sink.delivered_to(Recipient::Subscriber(SubscriberId(1))).len(), 1);
        let offer = sink.delivered_to(Recipient::Subscriber(SubscriberId(3)));
        assert!(matches!(offer[0].body, NotificationBody::ConfirmationOffer { .. }));
        assert_eq!(sink.delivered_to(Recipient::Operator).len(), 1);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_broadcast() {
        let h = Harness::new();
        for id in 1..=5 {
            h.add(id, TradeMode::Auto);
        }
        h.paper.fail_with(SubscriberId(3), "connection reset");

        let report = h.engine.broadcast_signal(btc_long()).await.unwrap();

        assert_eq!(report.counts.total, 5);
        assert_eq!(report.counts.api_error, 1);
        assert_eq!(report.counts.success, 4);
        let failed = report.outcomes_for(SubscriberId(3)).next().unwrap();
        assert_eq!(failed.kind, OutcomeKind::ApiError);

        // API errors reach the operator report only.
        let sink = h.drain().await;
        assert!(sink.delivered_to(Recipient::Subscriber(SubscriberId(3))).is_empty());
        assert_eq!(sink.delivered_to(Recipient::Subscriber(SubscriberId(4))).len(), 1);
    }

    #[tokio::test]
    async fn test_symbol_not_found_recorded_per_subscriber() {
        let h = Harness::new();
        for id in 1..=4 {
            h.add(id, TradeMode::Auto);
        }
        h.paper.reject_symbol(btc());

        let report = h.engine.broadcast_signal(btc_long()).await.unwrap();

        assert_eq!(report.counts.symbol_not_found, 4);
        assert_eq!(report.counts.total, 4);
        let sink = h.drain().await;
        assert_eq!(sink.delivered_to(Recipient::Operator).len(), 1);
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_symbol_rejection_tracked_across_confirmations() {
        let h = Harness::new();
        h.add(1, TradeMode::Auto);
        h.add(2, TradeMode::Manual);
        h.add(3, TradeMode::Manual);
        h.paper.reject_symbol(btc());

        let id = h.engine.broadcast_signal(btc_long()).await.unwrap().signal_id;
        for sub in [2, 3] {
            let outcome = h.engine.confirm(SubscriberId(sub), &id).await.unwrap();
            assert_eq!(outcome.kind, OutcomeKind::SymbolNotFound);
        }

        assert_eq!(h.engine.inner.symbol_misses.len(), 1);
        assert!(!h.engine.inner.first_symbol_miss(&id));
    }

    #[tokio::test]
    async fn test_policy_skips_are_visible() {
        let h = Harness::new();
        h.add(1, TradeMode::Auto);
        h.add(2, TradeMode::Auto);
        h.add(3, TradeMode::Auto);
        h.paper.set_balance(SubscriberId(1), Amount::ZERO);
        h.paper.set_balance(SubscriberId(2), Amount::new(dec!(5)));
        h.paper.invalidate_key(SubscriberId(3));

        let report = h.engine.broadcast_signal(btc_long()).await.unwrap();

        assert_eq!(report.counts.insufficient_balance, 1);
        assert_eq!(report.counts.success_reduced, 1);
        assert_eq!(report.counts.invalid_key, 1);
        let reduced = report.outcomes_for(SubscriberId(2)).next().unwrap();
        assert_eq!(reduced.quantity, Some(Amount::new(dec!(5))));

        let sink = h.drain().await;
        for id in 1..=3 {
            assert_eq!(sink.delivered_to(Recipient::Subscriber(SubscriberId(id))).len(), 1);
        }
    }

    #[tokio::test]
    async fn test_existing_position_is_skipped() {
        let h = Harness::new();
        h.add(1, TradeMode::Auto);
        h.engine.broadcast_signal(btc_long()).await.unwrap();

        let report = h.engine.broadcast_signal(btc_long()).await.unwrap();
        assert_eq!(report.counts.position_exists, 1);
        assert_eq!(h.paper.orders_for(SubscriberId(1)).len(), 1);
    }

    #[tokio::test]
    async fn test_sl_tp_failure_keeps_kind() {
        let h = Harness::new();
        h.add(1, TradeMode::Auto);
        h.paper.fail_sl_tp(SubscriberId(1), "trigger rejected");

        let report = h.engine.broadcast_signal(btc_long()).await.unwrap();
        let outcome = report.outcomes_for(SubscriberId(1)).next().unwrap();
        assert_eq!(outcome.kind, OutcomeKind::Success);
        assert!(outcome.order_ref.is_some());
        assert!(outcome.detail.as_deref().unwrap().contains("trigger rejected"));
    }

    #[tokio::test]
    async fn test_duplicate_signal_rejected() {
        let h = Harness::new();
        let signal = btc_long();
        h.engine.broadcast_signal(signal.clone()).await.unwrap();
        assert!(matches!(
            h.engine.broadcast_signal(signal).await,
            Err(BroadcastError::Registry(_))
        ));
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_mutation_skips_manual_holders() {
        let h = Harness::new();
        h.add(1, TradeMode::Auto);
        h.add(2, TradeMode::Manual);
        let report = h.engine.broadcast_signal(btc_long()).await.unwrap();
        let id = report.signal_id.clone();
        // The MANUAL subscriber confirms and now holds a position too.
        h.engine.confirm(SubscriberId(2), &id).await.unwrap();

        let mutations = [
            SignalMutation::Leverage(LeverageCommand {
                signal_id: id.clone(),
                leverage: Leverage::new(5).unwrap(),
            }),
            SignalMutation::EditSlTp(EditSlTpCommand {
                signal_id: id.clone(),
                stop_loss: Some(Price::new(dec!(61000))),
                take_profit: None,
            }),
            SignalMutation::Close(CloseCommand {
                signal_id: id.clone(),
                percentage: dec!(50),
            }),
        ];
        for mutation in mutations {
            let report = h.engine.broadcast_mutation(mutation).await.unwrap();
            assert_eq!(report.counts.total, 1);
            assert_eq!(report.counts.success, 1);
            assert!(report.outcomes_for(SubscriberId(2)).next().is_none());
        }

        let auto = h.paper.position(SubscriberId(1), &btc()).unwrap();
        assert_eq!(auto.leverage.get(), 5);
        assert_eq!(auto.stop_loss, Some(Price::new(dec!(61000))));
        assert_eq!(auto.take_profit, Some(Price::new(dec!(70000))));
        assert_eq!(auto.margin, Amount::new(dec!(25)));
        let manual = h.paper.position(SubscriberId(2), &btc()).unwrap();
        assert_eq!(manual.margin, Amount::new(dec!(50)));
    }

    #[tokio::test]
    async fn test_leverage_update_respects_cap() {
        let h = Harness::new();
        h.engine.stores().subscribers.insert(
            Subscriber::new(SubscriberId(1), CredentialRef::new("k"), Utc::now())
                .with_max_leverage(Leverage::new(3).unwrap()),
        );
        let id = h.engine.broadcast_signal(btc_long()).await.unwrap().signal_id;

        let report = h
            .engine
            .broadcast_mutation(SignalMutation::Leverage(LeverageCommand {
                signal_id: id,
                leverage: Leverage::new(20).unwrap(),
            }))
            .await
            .unwrap();
        assert_eq!(report.outcomes[0].leverage, Leverage::new(3).ok());
        assert_eq!(h.paper.leverage(SubscriberId(1), &btc()), Leverage::new(3).ok());
    }

    #[tokio::test]
    async fn test_full_close_closes_signal() {
        let h = Harness::new();
        h.add(1, TradeMode::Auto);
        let id = h.engine.broadcast_signal(btc_long()).await.unwrap().signal_id;

        let close = |pct| {
            SignalMutation::Close(CloseCommand {
                signal_id: id.clone(),
                percentage: pct,
            })
        };
        h.engine.broadcast_mutation(close(dec!(30))).await.unwrap();
        assert!(h.engine.stores().signals.get(&id).unwrap().is_active());

        let report = h.engine.broadcast_mutation(close(dec!(100))).await.unwrap();
        assert_eq!(report.counts.success, 1);
        let signal = h.engine.stores().signals.get(&id).unwrap();
        assert!(!signal.is_active());
        assert!(signal.closed_at.is_some());
        assert!(h.paper.position(SubscriberId(1), &btc()).is_none());

        assert!(matches!(
            h.engine.broadcast_mutation(close(dec!(100))).await,
            Err(BroadcastError::SignalInactive(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_full_close_keeps_signal_active() {
        let h = Harness::new();
        h.add(1, TradeMode::Auto);
        h.add(2, TradeMode::Auto);
        let id = h.engine.broadcast_signal(btc_long()).await.unwrap().signal_id;
        let close_all = || {
            SignalMutation::Close(CloseCommand {
                signal_id: id.clone(),
                percentage: dec!(100),
            })
        };

        h.paper.fail_with(SubscriberId(2), "gateway timeout");
        let report = h.engine.broadcast_mutation(close_all()).await.unwrap();
        assert_eq!((report.counts.success, report.counts.api_error), (1, 1));
        assert_eq!(report.still_open, vec![SubscriberId(2)]);
        assert!(h.engine.stores().signals.get(&id).unwrap().is_active());
        assert_eq!(
            h.engine.stores().ledger.holders(&id).into_iter().collect::<Vec<_>>(),
            vec![SubscriberId(2)]
        );

        // Retrying reaches only the holder left open.
        h.paper.clear_failures(SubscriberId(2));
        let retry = h.engine.broadcast_mutation(close_all()).await.unwrap();
        assert_eq!(retry.counts.total, 1);
        assert_eq!(retry.counts.success, 1);
        assert!(retry.still_open.is_empty());
        assert!(h.paper.position(SubscriberId(2), &btc()).is_none());
        assert!(!h.engine.stores().signals.get(&id).unwrap().is_active());
    }

    #[tokio::test]
    async fn test_operator_report_queued_before_subscriber_notices() {
        let h = Harness::new();
        for id in 1..=3 {
            h.add(id, TradeMode::Auto);
        }
        h.engine.broadcast_signal(btc_long()).await.unwrap();

        let sink = h.drain().await;
        let delivered = sink.delivered();
        assert_eq!(delivered.len(), 4);
        assert_eq!(delivered[0].recipient, Recipient::Operator);
        assert!(matches!(delivered[0].body, NotificationBody::OperatorReport(_)));
    }

    #[tokio::test]
    async fn test_mutation_unknown_signal() {
        let h = Harness::new();
        let id = SignalId::parse("SIG-030126-BTCUSDT-ABC123").unwrap();
        assert_eq!(
            h.engine
                .broadcast_mutation(SignalMutation::Close(CloseCommand {
                    signal_id: id.clone(),
                    percentage: dec!(100),
                }))
                .await,
            Err(BroadcastError::SignalNotFound(id))
        );
    }

    // ------------------------------------------------------------------------
    // Confirmations
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_racing_confirms_execute_once() {
        let h = Harness::new();
        h.add(7, TradeMode::Manual);
        let id = h.engine.broadcast_signal(btc_long()).await.unwrap().signal_id;

        let (a, b) = tokio::join!(
            h.engine.confirm(SubscriberId(7), &id),
            h.engine.confirm(SubscriberId(7), &id)
        );
        let results = [a, b];
        let ok = results.iter().filter(|r| r.is_ok()).count();
        let resolved = results
            .iter()
            .filter(|r| matches!(r, Err(BroadcastError::Confirm(ConfirmError::AlreadyResolved { .. }))))
            .count();
        assert_eq!((ok, resolved), (1, 1));
        assert_eq!(h.paper.orders_for(SubscriberId(7)).len(), 1);
        assert_eq!(h.engine.stores().ledger.for_subscriber(SubscriberId(7)).len(), 1);
    }

    #[tokio::test]
    async fn test_confirm_after_window_fails() {
        let h = Harness::new();
        h.add(7, TradeMode::Manual);
        let id = h.engine.broadcast_signal(btc_long()).await.unwrap().signal_id;

        h.clock.advance_secs(61);
        assert!(matches!(
            h.engine.confirm(SubscriberId(7), &id).await,
            Err(BroadcastError::Confirm(ConfirmError::Expired { .. }))
        ));
        assert!(matches!(
            h.engine.confirm(SubscriberId(7), &id).await,
            Err(BroadcastError::Confirm(ConfirmError::AlreadyResolved { .. }))
        ));
        assert!(h.paper.orders().is_empty());

        let sink = h.drain().await;
        let expired = sink
            .delivered_to(Recipient::Subscriber(SubscriberId(7)))
            .into_iter()
            .filter(|n| matches!(n.body, NotificationBody::OfferExpired { .. }))
            .count();
        assert_eq!(expired, 1);
    }

    #[tokio::test]
    async fn test_skip_then_confirm() {
        let h = Harness::new();
        h.add(7, TradeMode::Manual);
        let id = h.engine.broadcast_signal(btc_long()).await.unwrap().signal_id;

        h.engine.skip(SubscriberId(7), &id).unwrap();
        assert!(h.engine.confirm(SubscriberId(7), &id).await.is_err());
        assert!(h.paper.orders().is_empty());
    }

    #[tokio::test]
    async fn test_announce_reaches_active_only() {
        let h = Harness::new();
        h.add(1, TradeMode::Auto);
        h.add(2, TradeMode::Manual);
        h.add(3, TradeMode::Auto);
        h.engine.stores().subscribers.deactivate(SubscriberId(3)).unwrap();

        assert_eq!(h.engine.announce("maintenance at 22:00"), 2);
        let sink = h.drain().await;
        assert_eq!(sink.len(), 2);
    }

    // ------------------------------------------------------------------------
    // Isolation and concurrency
    // ------------------------------------------------------------------------

    /// Panics for one subscriber, counts concurrency for the rest.
    struct HostileExchange {
        inner: Arc<PaperExchange>,
        panic_for: SubscriberId,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ExchangeClient for HostileExchange {
        fn has_open_position<'a>(
            &'a self,
            subscriber: &'a Subscriber,
            symbol: &'a Symbol,
        ) -> BoxFuture<'a, ExchangeResult<bool>> {
            Box::pin(async move {
                if subscriber.id == self.panic_for {
                    panic!("adapter bug");
                }
                self.inner.has_open_position(subscriber, symbol).await
            })
        }

        fn get_balance<'a>(&'a self, subscriber: &'a Subscriber) -> BoxFuture<'a, ExchangeResult<Amount>> {
            Box::pin(async move {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_in_flight.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                self.inner.get_balance(subscriber).await
            })
        }

        fn set_leverage<'a>(
            &'a self,
            subscriber: &'a Subscriber,
            symbol: &'a Symbol,
            leverage: Leverage,
        ) -> BoxFuture<'a, ExchangeResult<()>> {
            self.inner.set_leverage(subscriber, symbol, leverage)
        }

        fn place_order<'a>(
            &'a self,
            subscriber: &'a Subscriber,
            order: OrderRequest,
        ) -> BoxFuture<'a, ExchangeResult<OrderRef>> {
            self.inner.place_order(subscriber, order)
        }

        fn set_stop_loss_take_profit<'a>(
            &'a self,
            subscriber: &'a Subscriber,
            symbol: &'a Symbol,
            stop_loss: Option<Price>,
            take_profit: Option<Price>,
        ) -> BoxFuture<'a, ExchangeResult<()>> {
            self.inner
                .set_stop_loss_take_profit(subscriber, symbol, stop_loss, take_profit)
        }

        fn close_position<'a>(
            &'a self,
            subscriber: &'a Subscriber,
            symbol: &'a Symbol,
            percentage: Decimal,
        ) -> BoxFuture<'a, ExchangeResult<OrderRef>> {
            self.inner.close_position(subscriber, symbol, percentage)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_adapter_and_concurrency_bound() {
        let paper = Arc::new(PaperExchange::new(Amount::new(dec!(1000))));
        let hostile = Arc::new(HostileExchange {
            inner: paper.clone(),
            panic_for: SubscriberId(13),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        });
        let h = Harness::with_exchange(paper, hostile.clone());
        for id in 1..=40 {
            h.add(id, TradeMode::Auto);
        }

        let report = h.engine.broadcast_signal(btc_long()).await.unwrap();

        assert_eq!(report.counts.total, 40);
        assert_eq!(report.counts.api_error, 1);
        assert_eq!(report.counts.success, 39);
        assert_eq!(
            report.outcomes_for(SubscriberId(13)).next().unwrap().kind,
            OutcomeKind::ApiError
        );
        let max = hostile.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 10, "in-flight executions exceeded bound: {max}");
        assert!(max > 1, "executions did not overlap");
    }
}
