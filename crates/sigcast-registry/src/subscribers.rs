//! Subscriber registry and settings API.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use sigcast_core::{
    validate_trade_amount, Amount, CredentialRef, Leverage, Subscriber, SubscriberId, TradeMode,
};
use tracing::{debug, info};

use crate::error::{RegistryError, RegistryResult};

/// Population counters for the operator `/stats` command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub total: usize,
    pub active: usize,
    /// Active subscribers in AUTO mode.
    pub auto: usize,
    /// Active subscribers in MANUAL mode.
    pub manual: usize,
}

/// Key-addressable subscriber store.
///
/// Every mutation goes through a single `DashMap` entry, so settings
/// commands for different subscribers never contend.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    subscribers: DashMap<SubscriberId, Subscriber>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber, or reactivate an existing one with new
    /// credentials.
    ///
    /// New subscribers get the default trade amount and leverage cap in AUTO
    /// mode; `trade_amount` overrides the amount when given.
    pub fn register(
        &self,
        id: SubscriberId,
        credential: CredentialRef,
        username: Option<String>,
        trade_amount: Option<Amount>,
        now: DateTime<Utc>,
    ) -> RegistryResult<Subscriber> {
        let trade_amount = trade_amount.map(validate_trade_amount).transpose()?;

        let mut entry = self
            .subscribers
            .entry(id)
            .and_modify(|existing| {
                existing.active = true;
                existing.credential = credential.clone();
                info!(subscriber_id = %id, "Subscriber re-registered");
            })
            .or_insert_with(|| {
                info!(subscriber_id = %id, "Subscriber registered");
                Subscriber::new(id, credential.clone(), now)
            });

        if let Some(amount) = trade_amount {
            entry.trade_amount = amount;
        }
        if username.is_some() {
            entry.username = username;
        }
        Ok(entry.value().clone())
    }

    /// Insert a fully-formed subscriber, replacing any previous record.
    pub fn insert(&self, subscriber: Subscriber) {
        self.subscribers.insert(subscriber.id, subscriber);
    }

    pub fn get(&self, id: SubscriberId) -> Option<Subscriber> {
        self.subscribers.get(&id).map(|s| s.value().clone())
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.contains_key(&id)
    }

    fn update<F>(&self, id: SubscriberId, f: F) -> RegistryResult<Subscriber>
    where
        F: FnOnce(&mut Subscriber),
    {
        let mut entry = self
            .subscribers
            .get_mut(&id)
            .ok_or(RegistryError::SubscriberNotFound(id))?;
        f(entry.value_mut());
        Ok(entry.value().clone())
    }

    /// `setTradeAmount`: 1 to 10000 inclusive.
    pub fn set_trade_amount(&self, id: SubscriberId, amount: Amount) -> RegistryResult<Subscriber> {
        let amount = validate_trade_amount(amount)?;
        let updated = self.update(id, |s| s.trade_amount = amount)?;
        debug!(subscriber_id = %id, amount = %amount, "Trade amount updated");
        Ok(updated)
    }

    /// `setMaxLeverage`: 1 to 100 inclusive.
    pub fn set_max_leverage(&self, id: SubscriberId, leverage: u32) -> RegistryResult<Subscriber> {
        let leverage = Leverage::new(leverage)?;
        let updated = self.update(id, |s| s.max_leverage = leverage)?;
        debug!(subscriber_id = %id, leverage = %leverage, "Leverage cap updated");
        Ok(updated)
    }

    /// `setMode`: AUTO or MANUAL.
    pub fn set_mode(&self, id: SubscriberId, mode: TradeMode) -> RegistryResult<Subscriber> {
        let updated = self.update(id, |s| s.mode = mode)?;
        debug!(subscriber_id = %id, mode = %mode, "Trade mode updated");
        Ok(updated)
    }

    /// `deactivate`: stop receiving signals. The record and its trade history
    /// stay.
    pub fn deactivate(&self, id: SubscriberId) -> RegistryResult<Subscriber> {
        let updated = self.update(id, |s| s.active = false)?;
        info!(subscriber_id = %id, "Subscriber deactivated");
        Ok(updated)
    }

    /// Bump cumulative trade count and PnL after a successful execution.
    pub fn record_trade(&self, id: SubscriberId, pnl: Decimal) -> RegistryResult<()> {
        self.update(id, |s| {
            s.total_trades += 1;
            s.total_pnl += pnl;
        })
        .map(|_| ())
    }

    /// Active subscribers ordered by id.
    pub fn active(&self) -> Vec<Subscriber> {
        let mut active: Vec<Subscriber> = self
            .subscribers
            .iter()
            .filter(|s| s.active)
            .map(|s| s.value().clone())
            .collect();
        active.sort_by_key(|s| s.id);
        active
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats::default();
        for s in self.subscribers.iter() {
            stats.total += 1;
            if s.active {
                stats.active += 1;
                match s.mode {
                    TradeMode::Auto => stats.auto += 1,
                    TradeMode::Manual => stats.manual += 1,
                }
            }
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
