//! Notification dispatch for sigcast.
//!
//! Subscriber and operator messages travel through a bounded queue drained
//! by one rate-limited task, detached from trade execution.

pub mod dispatcher;
pub mod error;
pub mod message;
pub mod rate_limiter;
pub mod render;
pub mod sink;

pub use dispatcher::{DispatcherConfig, NotificationDispatcher, NotificationHandle};
pub use error::{NotifyError, NotifyResult};
pub use message::{Notification, NotificationBody, Recipient};
pub use rate_limiter::RateLimiter;
pub use sink::{BoxFuture, DynNotificationSink, LogSink, NotificationSink, RecordingSink};
