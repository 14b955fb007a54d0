//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Policy error: {0}")]
    Policy(#[from] sigcast_policy::PolicyError),

    #[error("Registry error: {0}")]
    Registry(#[from] sigcast_registry::RegistryError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] sigcast_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
