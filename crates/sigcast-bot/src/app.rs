//! Application wiring and command routing.
//!
//! Builds the stores, engine, dispatcher and sweeper from [`AppConfig`] and
//! maps inbound chat text onto engine and settings operations.

use crate::config::AppConfig;
use crate::error::AppResult;
use chrono::Utc;
use rust_decimal::Decimal;
use sigcast_core::{
    Amount, CredentialRef, SignalCommand, SignalId, Subscriber, SubscriberId, SystemClock,
    TradeMode,
};
use sigcast_executor::{
    BroadcastEngine, ConfirmationSweeper, ConfirmationTracker, PaperExchange, Stores,
};
use sigcast_notify::{NotificationDispatcher, NotificationSink};
use sigcast_parser::{format_mutation_summary, format_signal_summary};
use sigcast_policy::PolicyEvaluator;
use sigcast_telemetry::Metrics;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Origin of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    Operator,
    Subscriber(SubscriberId),
}

const SUBSCRIBER_HELP: &str = "Commands:\n\
    /register <credential> [amount]\n\
    /setamount <1-10000>\n\
    /setleverage <1-100>\n\
    /setmode <auto|manual>\n\
    /unregister\n\
    /status\n\
    /confirm <signal id>\n\
    /skip <signal id>";

const OPERATOR_HELP: &str = "Commands:\n\
    /signal <SYMBOL> <LONG|SHORT> [entry=..] [sl=..] [tp=..] [lev=..]\n\
    /close <signal id> [percent]\n\
    /leverage <signal id> <n>\n\
    /editsltp <signal id> [sl=..] [tp=..]\n\
    /broadcast <text>\n\
    /stats\n\
    /signals\n\
    /metrics";

pub struct Application {
    config: AppConfig,
    engine: BroadcastEngine,
    paper: Arc<PaperExchange>,
    dispatcher: Option<NotificationDispatcher>,
    sweeper: Option<ConfirmationSweeper>,
}

impl Application {
    /// Wire every component. Seed subscribers from the config are
    /// registered immediately.
    pub fn new(config: AppConfig, sink: Arc<dyn NotificationSink>) -> AppResult<Self> {
        config.validate()?;

        let paper = Arc::new(PaperExchange::new(Amount::new(config.paper.default_balance)));
        paper.set_latency(Duration::from_millis(config.paper.latency_ms));

        let (dispatcher, notifications) = NotificationDispatcher::new(&config.notifications, sink);
        let tracker = Arc::new(ConfirmationTracker::new(
            config.confirmation.window(),
            Arc::new(SystemClock),
        ));
        let sweeper = ConfirmationSweeper::new(
            tracker.clone(),
            notifications.clone(),
            config.confirmation.sweep_interval(),
        );
        let engine = BroadcastEngine::new(
            &config.broadcast,
            paper.clone(),
            Stores::new(),
            tracker,
            PolicyEvaluator::new(config.policy.clone()),
            notifications,
        );

        let app = Self {
            config,
            engine,
            paper,
            dispatcher: Some(dispatcher),
            sweeper: Some(sweeper),
        };
        app.seed_subscribers()?;
        Ok(app)
    }

    fn seed_subscribers(&self) -> AppResult<()> {
        let registry = &self.engine.stores().subscribers;
        for seed in &self.config.subscribers {
            registry.register(
                seed.id,
                CredentialRef::new(seed.credential.clone()),
                seed.username.clone(),
                seed.trade_amount.map(Amount::new),
                Utc::now(),
            )?;
            if let Some(leverage) = seed.max_leverage {
                registry.set_max_leverage(seed.id, leverage)?;
            }
            registry.set_mode(seed.id, seed.mode)?;
            if let Some(balance) = seed.balance {
                self.paper.set_balance(seed.id, Amount::new(balance));
            }
        }
        if !self.config.subscribers.is_empty() {
            info!(count = self.config.subscribers.len(), "Seed subscribers registered");
        }
        Ok(())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn engine(&self) -> &BroadcastEngine {
        &self.engine
    }

    pub fn paper(&self) -> &Arc<PaperExchange> {
        &self.paper
    }

    /// Start the notification dispatcher and confirmation sweeper.
    ///
    /// Both stop when `cancel` fires. Calling this twice starts nothing new.
    pub fn spawn_background(&mut self, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        if let Some(dispatcher) = self.dispatcher.take() {
            handles.push(tokio::spawn(dispatcher.run(cancel.clone())));
        }
        if let Some(sweeper) = self.sweeper.take() {
            handles.push(tokio::spawn(sweeper.run(cancel)));
        }
        handles
    }

    /// Route one inbound message and return the direct reply.
    pub async fn handle(&self, sender: Sender, text: &str) -> String {
        let text = text.trim();
        match sender {
            Sender::Operator => self.handle_operator(text).await,
            Sender::Subscriber(id) if self.config.is_operator(id) => {
                self.handle_operator(text).await
            }
            Sender::Subscriber(id) => self.handle_subscriber(id, text).await,
        }
    }

    // ========================================================================
    // Operator commands
    // ========================================================================

    async fn handle_operator(&self, text: &str) -> String {
        let (command, rest) = split_command(text);
        match command {
            "/help" | "/start" => OPERATOR_HELP.to_string(),
            "/stats" => self.stats(),
            "/signals" => self.active_signals(),
            "/metrics" => match Metrics::render() {
                Ok(rendered) => rendered,
                Err(e) => format!("Metrics unavailable: {e}"),
            },
            "/broadcast" => {
                if rest.is_empty() {
                    return "Usage: /broadcast <text>".to_string();
                }
                let recipients = self.engine.announce(rest);
                format!("Announcement queued for {recipients} subscribers")
            }
            _ => self.handle_signal_text(text).await,
        }
    }

    async fn handle_signal_text(&self, text: &str) -> String {
        let command = match sigcast_parser::parse(text) {
            Ok(command) => command,
            Err(e) => {
                Metrics::parse_failed(e.rule());
                warn!(rule = e.rule(), error = %e, "Malformed signal");
                return format!("Malformed signal: {e}");
            }
        };

        match command {
            SignalCommand::New(signal) => {
                let summary = format_signal_summary(&signal);
                match self.engine.broadcast_signal(signal).await {
                    Ok(report) => format!(
                        "{summary}\n\nExecuted: {}, offered: {}",
                        report.counts.total, report.offered
                    ),
                    Err(e) => format!("Broadcast failed: {e}"),
                }
            }
            SignalCommand::Mutation(mutation) => {
                let summary = format_mutation_summary(&mutation);
                match self.engine.broadcast_mutation(mutation).await {
                    Ok(report) if report.still_open.is_empty() => {
                        format!("{summary}\n\nApplied to {} holders", report.counts.total)
                    }
                    Ok(report) => format!(
                        "{summary}\n\nApplied to {} holders, {} still open (signal kept active)",
                        report.counts.total,
                        report.still_open.len()
                    ),
                    Err(e) => format!("Update failed: {e}"),
                }
            }
        }
    }

    fn stats(&self) -> String {
        let stores = self.engine.stores();
        let stats = stores.subscribers.stats();
        format!(
            "Subscribers: {} total, {} active ({} auto, {} manual)\n\
             Active signals: {}\n\
             Pending confirmations: {}\n\
             Recorded outcomes: {}",
            stats.total,
            stats.active,
            stats.auto,
            stats.manual,
            stores.signals.active().len(),
            self.engine.confirmations().pending_count(),
            stores.ledger.len(),
        )
    }

    fn active_signals(&self) -> String {
        let signals = self.engine.stores().signals.active();
        if signals.is_empty() {
            return "No active signals".to_string();
        }
        let mut out = String::new();
        for signal in signals {
            let holders = self.engine.stores().ledger.holders(&signal.id).len();
            let _ = writeln!(
                out,
                "{} {} {} ({} holders)",
                signal.id, signal.direction, signal.symbol, holders
            );
        }
        out.trim_end().to_string()
    }

    // ========================================================================
    // Subscriber commands
    // ========================================================================

    async fn handle_subscriber(&self, id: SubscriberId, text: &str) -> String {
        let (command, rest) = split_command(text);
        let registry = &self.engine.stores().subscribers;

        if command == "/register" {
            return self.register(id, rest);
        }
        if matches!(command, "/help" | "/start") {
            return SUBSCRIBER_HELP.to_string();
        }
        if !registry.contains(id) {
            return "Not registered. Use /register <credential> [amount]".to_string();
        }

        let result = match command {
            "/setamount" => match rest.parse::<Decimal>() {
                Ok(amount) => registry
                    .set_trade_amount(id, Amount::new(amount))
                    .map(|s| format!("Trade amount set to {}", s.trade_amount)),
                Err(_) => return "Usage: /setamount <1-10000>".to_string(),
            },
            "/setleverage" => match rest.trim_end_matches(['x', 'X']).parse::<u32>() {
                Ok(leverage) => registry
                    .set_max_leverage(id, leverage)
                    .map(|s| format!("Max leverage set to {}", s.max_leverage)),
                Err(_) => return "Usage: /setleverage <1-100>".to_string(),
            },
            "/setmode" => match rest.parse::<TradeMode>() {
                Ok(mode) => registry
                    .set_mode(id, mode)
                    .map(|s| format!("Mode set to {}", s.mode)),
                Err(_) => return "Usage: /setmode <auto|manual>".to_string(),
            },
            "/unregister" => registry
                .deactivate(id)
                .map(|_| "Unregistered. You will no longer receive signals".to_string()),
            "/status" => return self.status(id),
            "/confirm" => return self.confirm(id, rest).await,
            "/skip" => return self.skip(id, rest),
            _ => return format!("Unknown command.\n{SUBSCRIBER_HELP}"),
        };

        result.unwrap_or_else(|e| e.to_string())
    }

    fn register(&self, id: SubscriberId, args: &str) -> String {
        let mut parts = args.split_whitespace();
        let Some(credential) = parts.next() else {
            return "Usage: /register <credential> [amount]".to_string();
        };
        let amount = match parts.next().map(str::parse::<Decimal>).transpose() {
            Ok(amount) => amount.map(Amount::new),
            Err(_) => return "Usage: /register <credential> [amount]".to_string(),
        };

        match self.engine.stores().subscribers.register(
            id,
            CredentialRef::new(credential),
            None,
            amount,
            Utc::now(),
        ) {
            Ok(subscriber) => format!("Registered.\n{}", describe(&subscriber)),
            Err(e) => e.to_string(),
        }
    }

    fn status(&self, id: SubscriberId) -> String {
        let stores = self.engine.stores();
        let Some(subscriber) = stores.subscribers.get(id) else {
            return "Not registered".to_string();
        };
        let pending = self.engine.confirmations().pending_for(id);
        let mut out = describe(&subscriber);
        let _ = write!(out, "\nPending confirmations: {}", pending.len());
        for offer in pending {
            let _ = write!(out, "\n  {}", offer.signal_id);
        }
        out
    }

    async fn confirm(&self, id: SubscriberId, args: &str) -> String {
        let signal_id = match SignalId::parse(args) {
            Ok(signal_id) => signal_id,
            Err(e) => return e.to_string(),
        };
        match self.engine.confirm(id, &signal_id).await {
            Ok(outcome) => format!("Confirmed {signal_id}: {}", outcome.kind),
            Err(e) => e.to_string(),
        }
    }

    fn skip(&self, id: SubscriberId, args: &str) -> String {
        let signal_id = match SignalId::parse(args) {
            Ok(signal_id) => signal_id,
            Err(e) => return e.to_string(),
        };
        match self.engine.skip(id, &signal_id) {
            Ok(()) => format!("Skipped {signal_id}"),
            Err(e) => e.to_string(),
        }
    }
}

fn describe(subscriber: &Subscriber) -> String {
    format!(
        "Status: {}\nMode: {}\nTrade amount: {}\nMax leverage: {}\nTrades: {}",
        if subscriber.active { "active" } else { "inactive" },
        subscriber.mode,
        subscriber.trade_amount,
        subscriber.max_leverage,
        subscriber.total_trades,
    )
}

/// Split `/cmd@bot rest` into `("/cmd", "rest")`.
fn split_command(text: &str) -> (&str, &str) {
    let (head, rest) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
    let command = head.split('@').next().unwrap_or(head);
    (command, rest.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_command() {
        assert_eq!(split_command("/status"), ("/status", ""));
        assert_eq!(split_command("/setamount  25 "), ("/setamount", "25"));
        assert_eq!(split_command("/skip@sigcast_bot SIG-1"), ("/skip", "SIG-1"));
    }
}
