//! Confirmation state tracker for MANUAL subscribers.
//!
//! Each (subscriber, signal) pair moves `OFFERED -> {CONFIRMED, SKIPPED,
//! EXPIRED}`. Only OFFERED entries are stored; every terminal transition is
//! an atomic removal from the map, so of two racing claims exactly one
//! observes the entry and the other gets [`ConfirmError::AlreadyResolved`].

use chrono::{DateTime, TimeZone, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sigcast_core::{Clock, SignalId, SubscriberId};
use sigcast_notify::{Notification, NotificationHandle};
use sigcast_telemetry::Metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{ConfirmError, ConfirmResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    /// How long an offer stays claimable.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Sweep period; independent of the window length.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_window_secs() -> u64 {
    60
}

fn default_sweep_interval_secs() -> u64 {
    10
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl ConfirmationConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// An OFFERED entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingConfirmation {
    pub subscriber_id: SubscriberId,
    pub signal_id: SignalId,
    pub created_at_ms: u64,
    pub expires_at_ms: u64,
}

impl PendingConfirmation {
    /// Age strictly beyond the window.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms > self.expires_at_ms
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.expires_at_ms as i64)
            .single()
            .unwrap_or_default()
    }
}

type PendingKey = (SubscriberId, SignalId);

pub struct ConfirmationTracker {
    pending: DashMap<PendingKey, PendingConfirmation>,
    clock: Arc<dyn Clock>,
    window_ms: u64,
}

impl ConfirmationTracker {
    pub fn new(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            pending: DashMap::new(),
            clock,
            window_ms: window.as_millis() as u64,
        }
    }

    /// Record an offer. A pair can only hold one live offer.
    pub fn offer(
        &self,
        subscriber_id: SubscriberId,
        signal_id: &SignalId,
    ) -> ConfirmResult<PendingConfirmation> {
        let now_ms = self.clock.now_ms();
        let pending = match self.pending.entry((subscriber_id, signal_id.clone())) {
            Entry::Occupied(_) => {
                return Err(ConfirmError::AlreadyOffered {
                    subscriber_id,
                    signal_id: signal_id.clone(),
                })
            }
            Entry::Vacant(vacant) => {
                let pending = PendingConfirmation {
                    subscriber_id,
                    signal_id: signal_id.clone(),
                    created_at_ms: now_ms,
                    expires_at_ms: now_ms + self.window_ms,
                };
                vacant.insert(pending.clone());
                pending
            }
        };
        debug!(
            subscriber_id = %subscriber_id,
            signal_id = %signal_id,
            expires_at_ms = pending.expires_at_ms,
            "Confirmation offered"
        );
        self.publish_gauge();
        Ok(pending)
    }

    /// OFFERED -> CONFIRMED. The caller executes on `Ok`.
    pub fn claim(
        &self,
        subscriber_id: SubscriberId,
        signal_id: &SignalId,
    ) -> ConfirmResult<PendingConfirmation> {
        let pending = self.take(subscriber_id, signal_id)?;
        Metrics::confirmation_resolved("confirmed");
        Ok(pending)
    }

    /// OFFERED -> SKIPPED.
    pub fn skip(
        &self,
        subscriber_id: SubscriberId,
        signal_id: &SignalId,
    ) -> ConfirmResult<PendingConfirmation> {
        let pending = self.take(subscriber_id, signal_id)?;
        Metrics::confirmation_resolved("skipped");
        Ok(pending)
    }

    /// Remove the entry and check it is still within its window.
    ///
    /// An entry found past its window is resolved as EXPIRED here, so the
    /// sweeper never sees it again.
    fn take(
        &self,
        subscriber_id: SubscriberId,
        signal_id: &SignalId,
    ) -> ConfirmResult<PendingConfirmation> {
        let removed = self.pending.remove(&(subscriber_id, signal_id.clone()));
        self.publish_gauge();

        let Some((_, pending)) = removed else {
            Metrics::confirmation_resolved("already_resolved");
            return Err(ConfirmError::AlreadyResolved {
                subscriber_id,
                signal_id: signal_id.clone(),
            });
        };

        if pending.is_expired(self.clock.now_ms()) {
            Metrics::confirmation_resolved("expired");
            return Err(ConfirmError::Expired {
                subscriber_id,
                signal_id: signal_id.clone(),
            });
        }
        Ok(pending)
    }

    /// Remove and return every entry past its window.
    pub fn expire_due(&self) -> Vec<PendingConfirmation> {
        let now_ms = self.clock.now_ms();
        let due: Vec<PendingKey> = self
            .pending
            .iter()
            .filter(|entry| entry.value().is_expired(now_ms))
            .map(|entry| entry.key().clone())
            .collect();

        // remove_if re-checks under the shard lock: a racing claim may have
        // taken the entry since the scan.
        let expired: Vec<PendingConfirmation> = due
            .into_iter()
            .filter_map(|key| {
                self.pending
                    .remove_if(&key, |_, pending| pending.is_expired(now_ms))
                    .map(|(_, pending)| pending)
            })
            .collect();

        for _ in &expired {
            Metrics::confirmation_resolved("expired");
        }
        if !expired.is_empty() {
            self.publish_gauge();
        }
        expired
    }

    pub fn is_pending(&self, subscriber_id: SubscriberId, signal_id: &SignalId) -> bool {
        self.pending.contains_key(&(subscriber_id, signal_id.clone()))
    }

    pub fn pending_for(&self, subscriber_id: SubscriberId) -> Vec<PendingConfirmation> {
        let mut entries: Vec<_> = self
            .pending
            .iter()
            .filter(|entry| entry.key().0 == subscriber_id)
            .map(|entry| entry.value().clone())
            .collect();
        entries.sort_by_key(|p| p.created_at_ms);
        entries
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn publish_gauge(&self) {
        Metrics::pending_confirmations_set(self.pending.len() as i64);
    }
}

// ============================================================================
// Sweeper
// ============================================================================

/// Periodic task expiring stale offers.
pub struct ConfirmationSweeper {
    tracker: Arc<ConfirmationTracker>,
    notifications: NotificationHandle,
    interval: Duration,
}

impl ConfirmationSweeper {
    pub fn new(
        tracker: Arc<ConfirmationTracker>,
        notifications: NotificationHandle,
        interval: Duration,
    ) -> Self {
        Self {
            tracker,
            notifications,
            interval,
        }
    }

    /// Expire due offers once and notify their subscribers.
    pub fn sweep_once(&self) -> usize {
        let expired = self.tracker.expire_due();
        for pending in &expired {
            info!(
                subscriber_id = %pending.subscriber_id,
                signal_id = %pending.signal_id,
                "Confirmation offer expired"
            );
            self.notifications.notify(Notification::offer_expired(
                pending.subscriber_id,
                pending.signal_id.clone(),
            ));
        }
        expired.len()
    }

    /// Sweep until cancelled. Offers still pending at shutdown are abandoned.
    pub async fn run(self, cancel: CancellationToken) {
        info!(interval_ms = self.interval.as_millis() as u64, "Confirmation sweeper started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let expired = self.sweep_once();
                    if expired > 0 {
                        debug!(expired, "Sweep completed");
                    }
                }
            }
        }

        info!(
            abandoned = self.tracker.pending_count(),
            "Confirmation sweeper stopped"
        );
    }
}
