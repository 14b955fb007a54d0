//! Delivery seam towards the chat transport.

use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::error::{NotifyError, NotifyResult};
use crate::message::{Notification, Recipient};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Delivers rendered notifications to their recipient.
///
/// Implemented by the chat transport. The dispatcher owns rate limiting, so
/// implementations send immediately.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, notification: Notification) -> BoxFuture<'_, NotifyResult<()>>;
}

/// Arc wrapper for NotificationSink trait objects.
pub type DynNotificationSink = Arc<dyn NotificationSink>;

/// Sink that writes every notification to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn deliver(&self, notification: Notification) -> BoxFuture<'_, NotifyResult<()>> {
        Box::pin(async move {
            info!(
                recipient = %notification.recipient,
                text = %notification.render(),
                "Notification"
            );
            Ok(())
        })
    }
}

/// Sink that keeps every delivered notification in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<Notification>>,
    /// When set, deliveries fail.
    failing: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered.lock().clone()
    }

    pub fn delivered_to(&self, recipient: Recipient) -> Vec<Notification> {
        self.delivered
            .lock()
            .iter()
            .filter(|n| n.recipient == recipient)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.delivered.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.delivered.lock().is_empty()
    }

    pub fn clear(&self) {
        self.delivered.lock().clear();
    }
}

impl NotificationSink for RecordingSink {
    fn deliver(&self, notification: Notification) -> BoxFuture<'_, NotifyResult<()>> {
        Box::pin(async move {
            if self.failing.load(Ordering::SeqCst) {
                return Err(NotifyError::Delivery("recording sink set to fail".into()));
            }
            self.delivered.lock().push(notification);
            Ok(())
        })
    }
}
