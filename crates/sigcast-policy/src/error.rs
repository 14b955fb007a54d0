//! Policy error types.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("Invalid policy config: {0}")]
    InvalidConfig(String),
}

pub type PolicyResult<T> = Result<T, PolicyError>;
