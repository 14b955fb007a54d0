//! Notification dispatcher.
//!
//! Producers push into a bounded queue through a cloneable
//! [`NotificationHandle`] and never wait: a full queue drops the message.
//! A single dispatch task drains the queue at a bounded rate, so a slow
//! transport never delays trade execution.

use serde::{Deserialize, Serialize};
use sigcast_telemetry::Metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{NotifyError, NotifyResult};
use crate::message::Notification;
use crate::rate_limiter::RateLimiter;
use crate::sink::NotificationSink;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Bounded queue length.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Sends allowed per second.
    #[serde(default = "default_max_per_second")]
    pub max_per_second: u32,
    /// How long queued messages keep flowing after shutdown is requested.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_max_per_second() -> u32 {
    25
}

fn default_shutdown_grace_ms() -> u64 {
    2000
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            max_per_second: default_max_per_second(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

/// Producer side of the notification queue.
#[derive(Debug, Clone)]
pub struct NotificationHandle {
    tx: mpsc::Sender<Notification>,
}

impl NotificationHandle {
    /// Queue a notification without waiting.
    pub fn enqueue(&self, notification: Notification) -> NotifyResult<()> {
        match self.tx.try_send(notification) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(recipient = %dropped.recipient, "Notification queue full, dropping message");
                Metrics::notification_dropped("queue_full");
                Err(NotifyError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(dropped)) => {
                debug!(recipient = %dropped.recipient, "Notification dispatcher stopped, dropping message");
                Metrics::notification_dropped("closed");
                Err(NotifyError::Closed)
            }
        }
    }

    /// Fire-and-forget variant of [`enqueue`](Self::enqueue); failures are
    /// already logged and counted.
    pub fn notify(&self, notification: Notification) {
        let _ = self.enqueue(notification);
    }

    /// Free queue slots.
    pub fn capacity(&self) -> usize {
        self.tx.capacity()
    }
}

/// Consumer side: delivers queued notifications through a sink.
pub struct NotificationDispatcher {
    rx: mpsc::Receiver<Notification>,
    sink: Arc<dyn NotificationSink>,
    limiter: RateLimiter,
    shutdown_grace: Duration,
}

impl NotificationDispatcher {
    pub fn new(
        config: &DispatcherConfig,
        sink: Arc<dyn NotificationSink>,
    ) -> (Self, NotificationHandle) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let dispatcher = Self {
            rx,
            sink,
            limiter: RateLimiter::per_second(config.max_per_second),
            shutdown_grace: Duration::from_millis(config.shutdown_grace_ms),
        };
        (dispatcher, NotificationHandle { tx })
    }

    /// Run until cancelled or every handle is dropped.
    ///
    /// On cancellation, messages already queued keep flowing for the
    /// configured grace period; the rest are abandoned.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Notification dispatcher started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = self.rx.recv() => match next {
                    Some(notification) => self.deliver(notification).await,
                    None => {
                        info!("Notification channel closed, dispatcher stopping");
                        return;
                    }
                },
            }
        }

        self.rx.close();
        let deadline = tokio::time::Instant::now() + self.shutdown_grace;
        loop {
            match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Ok(Some(notification)) => self.deliver(notification).await,
                Ok(None) => break,
                Err(_) => {
                    let mut abandoned = 0usize;
                    while self.rx.try_recv().is_ok() {
                        abandoned += 1;
                        Metrics::notification_dropped("closed");
                    }
                    warn!(abandoned, "Shutdown grace elapsed, abandoning queued notifications");
                    break;
                }
            }
        }
        info!("Notification dispatcher stopped");
    }

    async fn deliver(&self, notification: Notification) {
        self.limiter.wait_for_capacity().await;
        self.limiter.record_send();

        let recipient = notification.recipient;
        match self.sink.deliver(notification).await {
            Ok(()) => Metrics::notification_sent(recipient.kind()),
            Err(e) => {
                warn!(recipient = %recipient, error = %e, "Notification delivery failed");
                Metrics::notification_dropped("send_failed");
            }
        }
    }
}
