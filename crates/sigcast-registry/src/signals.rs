//! Signal book: every issued signal, keyed by identifier.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sigcast_core::{Signal, SignalId};
use tracing::info;

use crate::error::{RegistryError, RegistryResult};

#[derive(Debug, Default)]
pub struct SignalBook {
    signals: DashMap<SignalId, Signal>,
}

impl SignalBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly parsed signal.
    pub fn insert(&self, signal: Signal) -> RegistryResult<()> {
        use dashmap::mapref::entry::Entry;

        match self.signals.entry(signal.id.clone()) {
            Entry::Occupied(_) => Err(RegistryError::DuplicateSignal(signal.id)),
            Entry::Vacant(slot) => {
                slot.insert(signal);
                Ok(())
            }
        }
    }

    pub fn get(&self, id: &SignalId) -> Option<Signal> {
        self.signals.get(id).map(|s| s.value().clone())
    }

    /// ACTIVE signals, oldest first.
    pub fn active(&self) -> Vec<Signal> {
        let mut active: Vec<Signal> = self
            .signals
            .iter()
            .filter(|s| s.is_active())
            .map(|s| s.value().clone())
            .collect();
        active.sort_by_key(|s| s.created_at);
        active
    }

    /// Transition a signal to CLOSED.
    ///
    /// Returns `Ok(false)` if it was already closed.
    pub fn close(&self, id: &SignalId, at: DateTime<Utc>) -> RegistryResult<bool> {
        let mut entry = self
            .signals
            .get_mut(id)
            .ok_or_else(|| RegistryError::SignalNotFound(id.clone()))?;
        let closed = entry.value_mut().close(at);
        if closed {
            info!(signal_id = %id, "Signal closed");
        }
        Ok(closed)
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sigcast_core::{Direction, EntryOrder, Leverage, SignalStatus, Symbol};

    fn signal(symbol: &str, at: DateTime<Utc>) -> Signal {
        Signal::new(
            Symbol::parse(symbol).unwrap(),
            Direction::Long,
            EntryOrder::Market,
            None,
            None,
            Leverage::DEFAULT,
            at,
        )
    }

    #[test]
    fn test_insert_and_get() {
        let book = SignalBook::new();
        let s = signal("BTCUSDT", Utc::now());
        book.insert(s.clone()).unwrap();
        assert_eq!(book.get(&s.id), Some(s.clone()));
        assert_eq!(
            book.insert(s.clone()),
            Err(RegistryError::DuplicateSignal(s.id))
        );
    }

    #[test]
    fn test_close_transitions_once() {
        let book = SignalBook::new();
        let s = signal("ETHUSDT", Utc::now());
        let id = s.id.clone();
        book.insert(s).unwrap();

        assert!(book.close(&id, Utc::now()).unwrap());
        assert!(!book.close(&id, Utc::now()).unwrap());
        let stored = book.get(&id).unwrap();
        assert_eq!(stored.status, SignalStatus::Closed);
        assert!(stored.closed_at.is_some());
    }

    #[test]
    fn test_close_unknown() {
        let book = SignalBook::new();
        let id = SignalId::parse("SIG-030126-BTCUSDT-AAAAAA").unwrap();
        assert_eq!(
            book.close(&id, Utc::now()),
            Err(RegistryError::SignalNotFound(id))
        );
    }

    #[test]
    fn test_active_oldest_first() {
        let book = SignalBook::new();
        let now = Utc::now();
        let newer = signal("SOLUSDT", now);
        let older = signal("BTCUSDT", now - Duration::minutes(5));
        let closed = signal("XRPUSDT", now);
        book.insert(newer.clone()).unwrap();
        book.insert(older.clone()).unwrap();
        book.insert(closed.clone()).unwrap();
        book.close(&closed.id, now).unwrap();

        let ids: Vec<_> = book.active().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![older.id, newer.id]);
    }
}
