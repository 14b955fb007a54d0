//! Executor error types.

use sigcast_core::{OutcomeKind, SignalId, SubscriberId, Symbol};
use sigcast_registry::RegistryError;
use thiserror::Error;

/// Failure reported by the exchange adapter.
///
/// Never propagates out of a broadcast: it is converted into an
/// [`OutcomeKind`] for the affected subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    #[error("Credentials rejected")]
    InvalidKey,

    #[error("Symbol not found: {0}")]
    SymbolNotFound(Symbol),

    #[error("No open position on {0}")]
    NoPosition(Symbol),

    #[error("Exchange API error: {0}")]
    Api(String),
}

impl ExchangeError {
    pub fn outcome_kind(&self) -> OutcomeKind {
        match self {
            Self::InvalidKey => OutcomeKind::InvalidKey,
            Self::SymbolNotFound(_) => OutcomeKind::SymbolNotFound,
            Self::NoPosition(_) | Self::Api(_) => OutcomeKind::ApiError,
        }
    }
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// Confirmation tracker failures. All are non-fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfirmError {
    #[error("Offer already resolved for {subscriber_id} on {signal_id}")]
    AlreadyResolved {
        subscriber_id: SubscriberId,
        signal_id: SignalId,
    },

    #[error("Offer expired for {subscriber_id} on {signal_id}")]
    Expired {
        subscriber_id: SubscriberId,
        signal_id: SignalId,
    },

    #[error("Offer already pending for {subscriber_id} on {signal_id}")]
    AlreadyOffered {
        subscriber_id: SubscriberId,
        signal_id: SignalId,
    },
}

pub type ConfirmResult<T> = Result<T, ConfirmError>;

/// Reasons a broadcast cannot start.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BroadcastError {
    #[error("Signal not found: {0}")]
    SignalNotFound(SignalId),

    #[error("Signal is no longer active: {0}")]
    SignalInactive(SignalId),

    #[error("Subscriber not registered: {0}")]
    SubscriberNotFound(SubscriberId),

    #[error("Subscriber is inactive: {0}")]
    SubscriberInactive(SubscriberId),

    #[error(transparent)]
    Confirm(#[from] ConfirmError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub type BroadcastResult<T> = Result<T, BroadcastError>;
