//! Plain-text message templates.

use chrono::{DateTime, Utc};
use sigcast_core::{
    BroadcastReport, EntryOrder, OutcomeKind, Price, Signal, SignalId, TradeAction, TradeOutcome,
};
use std::fmt::Write;

const RULE: &str = "--------------------";

/// Failure lines listed in an operator report before truncation.
const MAX_REPORT_FAILURES: usize = 20;

fn sizing_line(outcome: &TradeOutcome) -> Option<String> {
    let quantity = outcome.quantity?;
    let mut line = format!("Amount: {quantity}");
    if let Some(leverage) = outcome.leverage {
        let _ = write!(line, " @ {leverage}");
    }
    if let Some(price) = outcome.price {
        let _ = write!(line, " (limit {price})");
    }
    Some(line)
}

fn open_heading(kind: OutcomeKind) -> &'static str {
    match kind {
        OutcomeKind::Success => "Trade Executed",
        OutcomeKind::SuccessReduced => "Trade Executed (reduced size)",
        OutcomeKind::InsufficientBalance => "Trade Skipped - Insufficient Balance",
        OutcomeKind::MinOrderNotMet => "Trade Skipped - Minimum Order Not Met",
        OutcomeKind::PositionExists => "Trade Skipped - Position Already Open",
        OutcomeKind::InvalidKey => "Trade Failed - API Key Rejected",
        OutcomeKind::SymbolNotFound => "Trade Failed - Symbol Not Supported",
        OutcomeKind::ApiError => "Trade Failed",
    }
}

fn hint(kind: OutcomeKind) -> Option<&'static str> {
    match kind {
        OutcomeKind::SuccessReduced => Some("Order size was limited by your available balance."),
        OutcomeKind::InsufficientBalance => Some("Top up your wallet to receive future signals."),
        OutcomeKind::MinOrderNotMet => {
            Some("Your balance cannot reach the exchange minimum order value at this leverage.")
        }
        OutcomeKind::PositionExists => Some("You already hold a position on this symbol."),
        OutcomeKind::InvalidKey => Some("Please /register again with a valid API key."),
        _ => None,
    }
}

/// Subscriber-facing result of one execution attempt.
pub fn trade_result(outcome: &TradeOutcome) -> String {
    let heading = match (outcome.action, outcome.kind.is_success()) {
        (TradeAction::Open, _) => open_heading(outcome.kind).to_string(),
        (TradeAction::Close { percentage }, true) => {
            format!("Position Closed ({}%)", percentage.normalize())
        }
        (TradeAction::Close { .. }, false) => "Close Failed".to_string(),
        (TradeAction::SetLeverage { leverage }, true) => format!("Leverage Updated to {leverage}"),
        (TradeAction::SetLeverage { .. }, false) => "Leverage Update Failed".to_string(),
        (TradeAction::EditSlTp, true) => "Stop Loss / Take Profit Updated".to_string(),
        (TradeAction::EditSlTp, false) => "Stop Loss / Take Profit Update Failed".to_string(),
    };

    let mut text = format!(
        "{heading}\n{RULE}\nSignal: {}\n{} {}",
        outcome.signal_id,
        outcome.side,
        outcome.signal_id.symbol()
    );
    if let Some(line) = sizing_line(outcome) {
        let _ = write!(text, "\n{line}");
    }
    if let Some(order_ref) = &outcome.order_ref {
        let _ = write!(text, "\nOrder: {order_ref}");
    }
    if matches!(outcome.action, TradeAction::Open) {
        if let Some(hint) = hint(outcome.kind) {
            let _ = write!(text, "\n\n{hint}");
        }
    }
    if let Some(detail) = &outcome.detail {
        let _ = write!(text, "\n\nNote: {detail}");
    }
    text.push('\n');
    text.push_str(RULE);
    text
}

pub fn confirmation_offer(signal: &Signal, expires_at: DateTime<Utc>) -> String {
    let order = match signal.entry {
        EntryOrder::Market => "MARKET".to_string(),
        EntryOrder::Limit { price } => format!("LIMIT @ {price}"),
    };
    let level = |p: Option<Price>| p.map_or_else(|| "None".to_string(), |p| p.to_string());
    format!(
        "New Signal - Confirmation Required\n{RULE}\n\
         Signal: {id}\n\
         {dir} {sym}\n\
         Order: {order}\n\
         Stop Loss: {sl}\n\
         Take Profit: {tp}\n\
         Leverage: {lev}\n\n\
         Reply /confirm {id} or /skip {id} before {expires} UTC.\n{RULE}",
        id = signal.id,
        dir = signal.direction,
        sym = signal.symbol,
        sl = level(signal.stop_loss),
        tp = level(signal.take_profit),
        lev = signal.leverage,
        expires = expires_at.format("%H:%M:%S"),
    )
}

pub fn offer_expired(signal_id: &SignalId) -> String {
    format!("Signal {signal_id} expired without confirmation. No trade was placed.")
}

/// Operator-facing aggregate, including technical failures.
pub fn operator_report(report: &BroadcastReport) -> String {
    let c = &report.counts;
    let mut text = format!(
        "Broadcast Complete ({command})\n{RULE}\n\
         Signal: {id}\n\
         Success: {}\n\
         Success (reduced): {}\n\
         Insufficient Balance: {}\n\
         Min Order Not Met: {}\n\
         Position Exists: {}\n\
         Invalid Key: {}\n\
         Symbol Not Found: {}\n\
         API Error: {}\n\
         {RULE}\n\
         Total: {} subscribers",
        c.success,
        c.success_reduced,
        c.insufficient_balance,
        c.min_order_not_met,
        c.position_exists,
        c.invalid_key,
        c.symbol_not_found,
        c.api_error,
        c.total,
        command = report.command,
        id = report.signal_id,
    );
    if report.offered > 0 {
        let _ = write!(text, "\nAwaiting confirmation: {}", report.offered);
    }
    if !report.still_open.is_empty() {
        let ids: Vec<String> = report.still_open.iter().map(ToString::to_string).collect();
        let _ = write!(
            text,
            "\nSignal kept ACTIVE, positions still open: {}",
            ids.join(", ")
        );
    }

    let failures: Vec<&TradeOutcome> = report
        .outcomes
        .iter()
        .filter(|o| !o.kind.is_success())
        .collect();
    if !failures.is_empty() {
        text.push_str("\n\nNot executed:");
        for outcome in failures.iter().take(MAX_REPORT_FAILURES) {
            let _ = write!(text, "\n  {}: {}", outcome.subscriber_id, outcome.kind);
            if let Some(detail) = &outcome.detail {
                let _ = write!(text, " ({detail})");
            }
        }
        if failures.len() > MAX_REPORT_FAILURES {
            let _ = write!(text, "\n  ... and {} more", failures.len() - MAX_REPORT_FAILURES);
        }
    }
    text
}

pub fn announcement(text: &str) -> String {
    format!("Announcement\n{RULE}\n{text}\n{RULE}")
}
