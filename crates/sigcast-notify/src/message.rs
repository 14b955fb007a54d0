//! Notification payloads.

use chrono::{DateTime, Utc};
use sigcast_core::{BroadcastReport, Signal, SignalId, SubscriberId, TradeOutcome};
use std::fmt;

use crate::render;

/// Who a notification is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recipient {
    Subscriber(SubscriberId),
    /// Every configured operator.
    Operator,
}

impl Recipient {
    /// Metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Subscriber(_) => "subscriber",
            Self::Operator => "operator",
        }
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subscriber(id) => write!(f, "subscriber:{id}"),
            Self::Operator => write!(f, "operator"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationBody {
    /// Result of one execution attempt.
    TradeResult(TradeOutcome),
    /// MANUAL subscriber is asked to confirm or skip.
    ConfirmationOffer {
        signal: Signal,
        expires_at: DateTime<Utc>,
    },
    /// Offer aged out without a decision.
    OfferExpired { signal_id: SignalId },
    /// Aggregate of one broadcast.
    OperatorReport(BroadcastReport),
    /// Free text from an operator.
    Announcement(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub recipient: Recipient,
    pub body: NotificationBody,
}

impl Notification {
    pub fn trade_result(outcome: TradeOutcome) -> Self {
        Self {
            recipient: Recipient::Subscriber(outcome.subscriber_id),
            body: NotificationBody::TradeResult(outcome),
        }
    }

    pub fn confirmation_offer(
        subscriber_id: SubscriberId,
        signal: Signal,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            recipient: Recipient::Subscriber(subscriber_id),
            body: NotificationBody::ConfirmationOffer { signal, expires_at },
        }
    }

    pub fn offer_expired(subscriber_id: SubscriberId, signal_id: SignalId) -> Self {
        Self {
            recipient: Recipient::Subscriber(subscriber_id),
            body: NotificationBody::OfferExpired { signal_id },
        }
    }

    pub fn operator_report(report: BroadcastReport) -> Self {
        Self {
            recipient: Recipient::Operator,
            body: NotificationBody::OperatorReport(report),
        }
    }

    pub fn announcement(subscriber_id: SubscriberId, text: impl Into<String>) -> Self {
        Self {
            recipient: Recipient::Subscriber(subscriber_id),
            body: NotificationBody::Announcement(text.into()),
        }
    }

    /// Plain-text rendering for chat delivery.
    pub fn render(&self) -> String {
        match &self.body {
            NotificationBody::TradeResult(outcome) => render::trade_result(outcome),
            NotificationBody::ConfirmationOffer { signal, expires_at } => {
                render::confirmation_offer(signal, *expires_at)
            }
            NotificationBody::OfferExpired { signal_id } => render::offer_expired(signal_id),
            NotificationBody::OperatorReport(report) => render::operator_report(report),
            NotificationBody::Announcement(text) => render::announcement(text),
        }
    }
}
