//! Append-only trade outcome ledger.

use parking_lot::RwLock;
use rust_decimal::Decimal;
use sigcast_core::{SignalId, SubscriberId, TradeAction, TradeOutcome};
use std::collections::BTreeSet;

/// Every recorded [`TradeOutcome`], in insertion order. Outcomes are never
/// mutated or removed, and survive subscriber removal.
#[derive(Debug, Default)]
pub struct TradeLedger {
    outcomes: RwLock<Vec<TradeOutcome>>,
}

impl TradeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, outcome: TradeOutcome) {
        self.outcomes.write().push(outcome);
    }

    pub fn extend(&self, outcomes: impl IntoIterator<Item = TradeOutcome>) {
        self.outcomes.write().extend(outcomes);
    }

    pub fn for_signal(&self, signal_id: &SignalId) -> Vec<TradeOutcome> {
        self.outcomes
            .read()
            .iter()
            .filter(|o| &o.signal_id == signal_id)
            .cloned()
            .collect()
    }

    pub fn for_subscriber(&self, subscriber_id: SubscriberId) -> Vec<TradeOutcome> {
        self.outcomes
            .read()
            .iter()
            .filter(|o| o.subscriber_id == subscriber_id)
            .cloned()
            .collect()
    }

    /// Subscribers currently holding a position opened for `signal_id`:
    /// a successful open not followed by a successful full close.
    pub fn holders(&self, signal_id: &SignalId) -> BTreeSet<SubscriberId> {
        let mut holders = BTreeSet::new();
        for outcome in self.outcomes.read().iter() {
            if &outcome.signal_id != signal_id || !outcome.kind.is_success() {
                continue;
            }
            match outcome.action {
                TradeAction::Open => {
                    holders.insert(outcome.subscriber_id);
                }
                TradeAction::Close { percentage } if percentage >= Decimal::ONE_HUNDRED => {
                    holders.remove(&outcome.subscriber_id);
                }
                _ => {}
            }
        }
        holders
    }

    pub fn len(&self) -> usize {
        self.outcomes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.read().is_empty()
    }
}
