//! Operator echo of parsed commands.

use sigcast_core::{EntryOrder, Price, Signal, SignalMutation};

fn level(price: Option<Price>) -> String {
    price.map_or_else(|| "None".to_string(), |p| p.to_string())
}

/// Render a canonical signal for display.
pub fn format_signal_summary(signal: &Signal) -> String {
    let order = match signal.entry {
        EntryOrder::Market => "MARKET".to_string(),
        EntryOrder::Limit { price } => format!("LIMIT @ {price}"),
    };
    format!(
        "Signal Broadcast\n\
         ID: {}\n\
         {} {}\n\
         Order: {}\n\
         Stop Loss: {}\n\
         Take Profit: {}\n\
         Leverage: {}",
        signal.id,
        signal.direction,
        signal.symbol,
        order,
        level(signal.stop_loss),
        level(signal.take_profit),
        signal.leverage,
    )
}

/// One-line description of a mutation.
pub fn format_mutation_summary(mutation: &SignalMutation) -> String {
    match mutation {
        SignalMutation::Close(c) => format!("Close {}% of {}", c.percentage.normalize(), c.signal_id),
        SignalMutation::Leverage(c) => format!("Set leverage {} on {}", c.leverage, c.signal_id),
        SignalMutation::EditSlTp(c) => format!(
            "Edit {}: SL {} / TP {}",
            c.signal_id,
            c.stop_loss.map_or_else(|| "unchanged".to_string(), |p| p.to_string()),
            c.take_profit.map_or_else(|| "unchanged".to_string(), |p| p.to_string()),
        ),
    }
}
