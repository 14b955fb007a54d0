//! Error types for sigcast-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("Invalid leverage: {0} (allowed 1..=100)")]
    InvalidLeverage(u32),

    #[error("Invalid trade amount: {0} (allowed 1..=10000)")]
    InvalidTradeAmount(String),

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Invalid signal id: {0}")]
    InvalidSignalId(String),

    #[error("Invalid trade mode: {0}")]
    InvalidTradeMode(String),

    #[error("Invalid direction: {0}")]
    InvalidDirection(String),
}

/// Result type alias for core operations.
pub type CoreResult<T> = std::result::Result<T, CoreError>;
