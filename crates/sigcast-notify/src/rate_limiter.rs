//! Sliding-window send rate limiter.
//!
//! Bounds outbound notifications to `max_messages` per `window` so the chat
//! transport's own flood limits are never hit.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

pub struct RateLimiter {
    /// Maximum messages per window.
    max_messages: u32,
    window: Duration,
    /// Send times inside the current window, oldest first.
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// # Arguments
    /// * `max_messages` - Maximum messages per window (at least 1)
    /// * `window` - Window length
    pub fn new(max_messages: u32, window: Duration) -> Self {
        let max_messages = max_messages.max(1);
        Self {
            max_messages,
            window,
            timestamps: Mutex::new(VecDeque::with_capacity(max_messages as usize)),
        }
    }

    pub fn per_second(max_messages: u32) -> Self {
        Self::new(max_messages, Duration::from_secs(1))
    }

    /// Check if we can send a message.
    pub fn can_send(&self) -> bool {
        self.cleanup_old_timestamps();
        self.timestamps.lock().len() < self.max_messages as usize
    }

    /// Record a message send.
    pub fn record_send(&self) {
        self.cleanup_old_timestamps();
        self.timestamps.lock().push_back(Instant::now());
    }

    /// Current message count in window.
    pub fn current_count(&self) -> u32 {
        self.cleanup_old_timestamps();
        self.timestamps.lock().len() as u32
    }

    pub fn remaining_capacity(&self) -> u32 {
        self.max_messages.saturating_sub(self.current_count())
    }

    /// Wait until a send slot frees up.
    ///
    /// Sleeps until the oldest send leaves the window instead of polling.
    pub async fn wait_for_capacity(&self) {
        loop {
            let wake_at = {
                self.cleanup_old_timestamps();
                let timestamps = self.timestamps.lock();
                if timestamps.len() < self.max_messages as usize {
                    return;
                }
                timestamps.front().map(|&oldest| oldest + self.window)
            };
            if let Some(wake_at) = wake_at {
                trace!("Notification rate limit reached, waiting");
                tokio::time::sleep_until(wake_at).await;
            }
        }
    }

    fn cleanup_old_timestamps(&self) {
        let now = Instant::now();
        let mut timestamps = self.timestamps.lock();
        while timestamps
            .front()
            .is_some_and(|&t| now.duration_since(t) >= self.window)
        {
            timestamps.pop_front();
        }
    }
}
