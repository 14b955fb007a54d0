//! Shared harness for application-level tests.

#![allow(dead_code)]

use sigcast_bot::{AppConfig, Application, Sender};
use sigcast_core::{SignalId, SubscriberId};
use sigcast_notify::{Notification, Recipient, RecordingSink};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const OPERATOR: Sender = Sender::Operator;

pub fn subscriber(id: i64) -> Sender {
    Sender::Subscriber(SubscriberId(id))
}

/// Config with a fast dispatcher so draining never waits on the limiter.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.notifications.max_per_second = 10_000;
    config
}

pub struct TestApp {
    pub app: Application,
    pub sink: Arc<RecordingSink>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl TestApp {
    pub fn start(config: AppConfig) -> Self {
        let sink = Arc::new(RecordingSink::new());
        let mut app = Application::new(config, sink.clone()).expect("valid config");
        let cancel = CancellationToken::new();
        let tasks = app.spawn_background(cancel.clone());
        Self {
            app,
            sink,
            cancel,
            tasks,
        }
    }

    pub async fn send(&self, sender: Sender, text: &str) -> String {
        self.app.handle(sender, text).await
    }

    /// Register `id` in the given mode.
    pub async fn register(&self, id: i64, mode: &str) {
        let reply = self.send(subscriber(id), &format!("/register paper:{id}")).await;
        assert!(reply.starts_with("Registered"), "{reply}");
        let reply = self.send(subscriber(id), &format!("/setmode {mode}")).await;
        assert!(reply.starts_with("Mode set"), "{reply}");
    }

    /// Most recent active signal id.
    pub fn last_signal_id(&self) -> SignalId {
        self.app
            .engine()
            .stores()
            .signals
            .active()
            .pop()
            .expect("an active signal")
            .id
    }

    /// Stop background tasks, delivering everything queued.
    pub async fn shutdown(self) -> Arc<RecordingSink> {
        self.cancel.cancel();
        for task in self.tasks {
            task.await.expect("background task");
        }
        self.sink
    }
}

pub fn delivered_to(sink: &RecordingSink, id: i64) -> Vec<Notification> {
    sink.delivered_to(Recipient::Subscriber(SubscriberId(id)))
}
