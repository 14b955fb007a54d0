//! sigcast application.
//!
//! Wires the signal broadcast engine to a console transport:
//! - Operator text parsed into signals and signal updates
//! - Subscriber settings, confirmations and status
//! - Notification dispatch and confirmation expiry in the background

pub mod app;
pub mod config;
pub mod console;
pub mod error;

pub use app::{Application, Sender};
pub use config::AppConfig;
pub use console::ConsoleSink;
pub use error::{AppError, AppResult};
