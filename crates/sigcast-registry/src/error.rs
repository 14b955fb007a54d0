//! Registry error types.

use sigcast_core::{CoreError, SignalId, SubscriberId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Subscriber not registered: {0}")]
    SubscriberNotFound(SubscriberId),

    #[error("Signal not found: {0}")]
    SignalNotFound(SignalId),

    #[error("Signal already recorded: {0}")]
    DuplicateSignal(SignalId),

    #[error("Invalid setting: {0}")]
    InvalidSetting(#[from] CoreError),
}

pub type RegistryResult<T> = Result<T, RegistryError>;
