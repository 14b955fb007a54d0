//! Field tokenizer shared by every signal surface form.
//!
//! Lines are split into whitespace tokens. A token carrying `=` or `:` is a
//! labeled field (`sl=62000`, `Entry:`, `Loss:`); the words before it on
//! the same line may complete a multi-word label (`Stop Loss: 62000`).
//! Remaining bare words are positional: a direction, the `market` keyword,
//! or the symbol.

use sigcast_core::Direction;

use crate::error::{ParseError, ParseResult};

/// Canonical field a label refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Label {
    Symbol,
    Direction,
    Entry,
    StopLoss,
    TakeProfit,
    Leverage,
}

impl Label {
    /// Resolve a label or one of its synonyms, case-insensitive.
    pub(crate) fn resolve(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "symbol" | "pair" | "coin" => Some(Self::Symbol),
            "direction" | "side" | "type" => Some(Self::Direction),
            "entry" | "entry price" => Some(Self::Entry),
            "sl" | "stop loss" | "stoploss" => Some(Self::StopLoss),
            "tp" | "take profit" | "takeprofit" => Some(Self::TakeProfit),
            "lev" | "leverage" => Some(Self::Leverage),
            _ => None,
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Symbol => "symbol",
            Self::Direction => "direction",
            Self::Entry => "entry",
            Self::StopLoss => "stop loss",
            Self::TakeProfit => "take profit",
            Self::Leverage => "leverage",
        }
    }
}

/// Raw field values, not yet validated. An empty string means the label
/// was present with no value.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct RawFields<'a> {
    pub symbol: Option<&'a str>,
    pub direction: Option<&'a str>,
    pub entry: Option<&'a str>,
    pub stop_loss: Option<&'a str>,
    pub take_profit: Option<&'a str>,
    pub leverage: Option<&'a str>,
}

impl<'a> RawFields<'a> {
    fn slot(&mut self, label: Label) -> &mut Option<&'a str> {
        match label {
            Label::Symbol => &mut self.symbol,
            Label::Direction => &mut self.direction,
            Label::Entry => &mut self.entry,
            Label::StopLoss => &mut self.stop_loss,
            Label::TakeProfit => &mut self.take_profit,
            Label::Leverage => &mut self.leverage,
        }
    }

    fn set(&mut self, label: Label, value: &'a str) -> ParseResult<()> {
        let slot = self.slot(label);
        if slot.is_some() {
            return Err(ParseError::DuplicateField(label.name()));
        }
        *slot = Some(value);
        Ok(())
    }

    fn set_positional(&mut self, word: &'a str) -> ParseResult<()> {
        if Direction::parse(word).is_ok() {
            self.set(Label::Direction, word)
        } else if word.eq_ignore_ascii_case("market") {
            self.set(Label::Entry, word)
        } else if self.symbol.is_none() {
            self.set(Label::Symbol, word)
        } else {
            Err(ParseError::UnexpectedToken(word.to_string()))
        }
    }

    /// Labels other than stop-loss and take-profit that were supplied.
    pub(crate) fn first_non_level_label(&self) -> Option<Label> {
        [
            (Label::Symbol, self.symbol),
            (Label::Direction, self.direction),
            (Label::Entry, self.entry),
            (Label::Leverage, self.leverage),
        ]
        .into_iter()
        .find_map(|(label, value)| value.map(|_| label))
    }
}

fn is_separator(c: char) -> bool {
    c == '=' || c == ':'
}

/// Resolve the label for a `key<sep>` token, folding in the preceding word
/// when it forms a two-word label.
fn resolve_label(pending: &mut Vec<&str>, key: &str) -> Option<Label> {
    if key.is_empty() {
        // "Stop Loss : 62000"
        for take in [2, 1] {
            if pending.len() >= take {
                let start = pending.len() - take;
                if let Some(label) = Label::resolve(&pending[start..].join(" ")) {
                    pending.truncate(start);
                    return Some(label);
                }
            }
        }
        return None;
    }
    if let Some(last) = pending.last() {
        if let Some(label) = Label::resolve(&format!("{last} {key}")) {
            pending.pop();
            return Some(label);
        }
    }
    Label::resolve(key)
}

/// Collect raw fields from every line of `text`.
pub(crate) fn collect_fields(text: &str) -> ParseResult<RawFields<'_>> {
    let mut fields = RawFields::default();

    for line in text.lines() {
        let mut pending: Vec<&str> = Vec::new();
        let mut tokens = line.split_whitespace().peekable();

        while let Some(token) = tokens.next() {
            let Some(sep) = token.find(is_separator) else {
                pending.push(token);
                continue;
            };

            let key = &token[..sep];
            let mut value = &token[sep + 1..];
            let label = resolve_label(&mut pending, key)
                .ok_or_else(|| ParseError::UnexpectedToken(token.to_string()))?;

            if value.is_empty() {
                if let Some(next) = tokens.next_if(|t| !t.contains(is_separator)) {
                    value = next;
                }
            }
            fields.set(label, value)?;
        }

        for word in pending {
            fields.set_positional(word)?;
        }
    }

    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line_key_values() {
        let fields = collect_fields("LONG BTCUSDT entry=64000 sl:62000 tp=68000 lev=10x").unwrap();
        assert_eq!(fields.symbol, Some("BTCUSDT"));
        assert_eq!(fields.direction, Some("LONG"));
        assert_eq!(fields.entry, Some("64000"));
        assert_eq!(fields.stop_loss, Some("62000"));
        assert_eq!(fields.take_profit, Some("68000"));
        assert_eq!(fields.leverage, Some("10x"));
    }

    #[test]
    fn test_multi_word_labels() {
        let text = "Pair: ETHUSDT\nSide: short\nEntry Price: 3000\nStop Loss: NA\nTake Profit : 2500";
        let fields = collect_fields(text).unwrap();
        assert_eq!(fields.symbol, Some("ETHUSDT"));
        assert_eq!(fields.direction, Some("short"));
        assert_eq!(fields.entry, Some("3000"));
        assert_eq!(fields.stop_loss, Some("NA"));
        assert_eq!(fields.take_profit, Some("2500"));
    }

    #[test]
    fn test_empty_label_value() {
        let fields = collect_fields("SL:\nTP: 5").unwrap();
        assert_eq!(fields.stop_loss, Some(""));
        assert_eq!(fields.take_profit, Some("5"));
    }

    #[test]
    fn test_label_value_not_stolen_from_next_field() {
        let fields = collect_fields("sl: tp=5").unwrap();
        assert_eq!(fields.stop_loss, Some(""));
        assert_eq!(fields.take_profit, Some("5"));
    }

    #[test]
    fn test_duplicate_field_rejected() {
        assert_eq!(
            collect_fields("sl=1 stoploss=2"),
            Err(ParseError::DuplicateField("stop loss"))
        );
        assert_eq!(
            collect_fields("LONG BTC SHORT"),
            Err(ParseError::DuplicateField("direction"))
        );
    }

    #[test]
    fn test_unknown_label_rejected() {
        assert_eq!(
            collect_fields("BTCUSDT LONG size=5"),
            Err(ParseError::UnexpectedToken("size=5".to_string()))
        );
    }

    #[test]
    fn test_extra_positional_rejected() {
        assert_eq!(
            collect_fields("BTCUSDT LONG now"),
            Err(ParseError::UnexpectedToken("now".to_string()))
        );
    }
}
