//! Command grammars.
//!
//! New signals come in three surface forms that normalize to the same
//! [`Signal`]:
//!
//! ```text
//! /signal LONG BTCUSDT entry=64000 sl=62000 tp=68000 lev=10x
//!
//! /signal
//! Symbol: BTCUSDT
//! Direction: LONG
//! Entry: 64000
//! ...
//!
//! BTCUSDT
//! LONG
//! Entry: 64000
//! ...
//! ```
//!
//! Mutations reference an issued signal by identifier:
//! `/close <ID> [pct%]`, `/leverage <ID> <n>x`, `/editsltp <ID> sl=.. tp=..`.
//! Identifiers are only checked lexically here; existence is resolved by the
//! broadcast engine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sigcast_core::{
    CloseCommand, Direction, EditSlTpCommand, EntryOrder, Leverage, LeverageCommand, Price,
    Signal, SignalCommand, SignalId, SignalMutation, Symbol,
};
use std::str::FromStr;
use tracing::trace;

use crate::error::{ParseError, ParseResult};
use crate::fields::{collect_fields, RawFields};

/// Parse operator text, stamping new signals with the current time.
pub fn parse(text: &str) -> ParseResult<SignalCommand> {
    parse_at(text, Utc::now())
}

/// Parse operator text, stamping new signals with `now`.
pub fn parse_at(text: &str, now: DateTime<Utc>) -> ParseResult<SignalCommand> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ParseError::Empty);
    }

    let (head, rest) = split_first_token(text);
    if !head.starts_with('/') {
        return parse_signal_body(text, now).map(SignalCommand::New);
    }

    // "/signal@SomeBot" addresses a specific bot in group chats.
    let command = head
        .split('@')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    trace!(command = %command, "Parsing operator command");

    match command.as_str() {
        "/signal" => parse_signal_body(rest, now).map(SignalCommand::New),
        "/close" => parse_close(rest).map(|c| SignalCommand::Mutation(SignalMutation::Close(c))),
        "/leverage" => {
            parse_leverage_change(rest).map(|c| SignalCommand::Mutation(SignalMutation::Leverage(c)))
        }
        "/editsltp" => {
            parse_edit_sl_tp(rest).map(|c| SignalCommand::Mutation(SignalMutation::EditSlTp(c)))
        }
        _ => Err(ParseError::UnknownCommand(head.to_string())),
    }
}

fn split_first_token(text: &str) -> (&str, &str) {
    match text.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim_start()),
        None => (text, ""),
    }
}

// ============================================================================
// New signal
// ============================================================================

fn parse_signal_body(body: &str, now: DateTime<Utc>) -> ParseResult<Signal> {
    let fields = collect_fields(body)?;
    build_signal(&fields, now)
}

fn build_signal(fields: &RawFields<'_>, now: DateTime<Utc>) -> ParseResult<Signal> {
    let raw_symbol = fields.symbol.ok_or(ParseError::MissingField("symbol"))?;
    let symbol = Symbol::parse(raw_symbol)
        .map_err(|_| ParseError::InvalidSymbol(raw_symbol.to_string()))?;

    let raw_direction = fields
        .direction
        .ok_or(ParseError::MissingField("direction"))?;
    let direction = Direction::parse(raw_direction)
        .map_err(|_| ParseError::InvalidDirection(raw_direction.to_string()))?;

    let entry = parse_entry(fields.entry)?;
    let stop_loss = parse_level(fields.stop_loss, ParseError::InvalidStopLoss)?;
    let take_profit = parse_level(fields.take_profit, ParseError::InvalidTakeProfit)?;
    let leverage = match fields.leverage {
        None | Some("") => Leverage::DEFAULT,
        Some(raw) => parse_leverage(raw)?,
    };

    Ok(Signal::new(
        symbol,
        direction,
        entry,
        stop_loss,
        take_profit,
        leverage,
        now,
    ))
}

/// Absent, empty or `market` means MARKET; a positive number means LIMIT.
fn parse_entry(raw: Option<&str>) -> ParseResult<EntryOrder> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(EntryOrder::Market),
        Some(raw) if raw.eq_ignore_ascii_case("market") => return Ok(EntryOrder::Market),
        Some(raw) => raw,
    };
    match Decimal::from_str(raw) {
        Ok(price) if price > Decimal::ZERO => Ok(EntryOrder::Limit {
            price: Price::new(price),
        }),
        _ => Err(ParseError::InvalidEntry(raw.to_string())),
    }
}

/// Stop-loss / take-profit level. Absent, empty, `NA` or non-positive
/// means unset.
fn parse_level(
    raw: Option<&str>,
    invalid: fn(String) -> ParseError,
) -> ParseResult<Option<Price>> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(raw) if raw.eq_ignore_ascii_case("na") || raw.eq_ignore_ascii_case("n/a") => {
            return Ok(None)
        }
        Some(raw) => raw,
    };
    let value = Decimal::from_str(raw).map_err(|_| invalid(raw.to_string()))?;
    Ok(Some(Price::new(value)).filter(Price::is_positive))
}

/// Integer 1..=100 with an optional trailing `x`.
fn parse_leverage(raw: &str) -> ParseResult<Leverage> {
    let invalid = || ParseError::InvalidLeverage(raw.to_string());
    let digits = raw
        .trim()
        .trim_end_matches(|c| c == 'x' || c == 'X');
    let value: u32 = digits.parse().map_err(|_| invalid())?;
    Leverage::new(value).map_err(|_| invalid())
}

// ============================================================================
// Mutations
// ============================================================================

fn parse_signal_id(raw: Option<&str>) -> ParseResult<SignalId> {
    let raw = raw.ok_or(ParseError::MissingField("signal id"))?;
    SignalId::parse(raw).map_err(|_| ParseError::InvalidSignalId(raw.to_string()))
}

fn reject_trailing<'a>(mut tokens: impl Iterator<Item = &'a str>) -> ParseResult<()> {
    match tokens.next() {
        Some(extra) => Err(ParseError::UnexpectedToken(extra.to_string())),
        None => Ok(()),
    }
}

/// `/close <ID> [pct[%]]`, default 100%.
fn parse_close(rest: &str) -> ParseResult<CloseCommand> {
    let mut tokens = rest.split_whitespace();
    let signal_id = parse_signal_id(tokens.next())?;

    let percentage = match tokens.next() {
        None => Decimal::ONE_HUNDRED,
        Some(raw) => {
            let invalid = || ParseError::InvalidPercentage(raw.to_string());
            let value = Decimal::from_str(raw.trim_end_matches('%')).map_err(|_| invalid())?;
            if value <= Decimal::ZERO || value > Decimal::ONE_HUNDRED {
                return Err(invalid());
            }
            value
        }
    };
    reject_trailing(tokens)?;

    Ok(CloseCommand {
        signal_id,
        percentage,
    })
}

/// `/leverage <ID> <n>[x]`.
fn parse_leverage_change(rest: &str) -> ParseResult<LeverageCommand> {
    let mut tokens = rest.split_whitespace();
    let signal_id = parse_signal_id(tokens.next())?;
    let leverage = parse_leverage(tokens.next().ok_or(ParseError::MissingField("leverage"))?)?;
    reject_trailing(tokens)?;

    Ok(LeverageCommand {
        signal_id,
        leverage,
    })
}

/// `/editsltp <ID> sl=<price> tp=<price>`, at least one level required.
fn parse_edit_sl_tp(rest: &str) -> ParseResult<EditSlTpCommand> {
    let (raw_id, levels) = split_first_token(rest);
    let signal_id = parse_signal_id(Some(raw_id).filter(|s| !s.is_empty()))?;

    let fields = collect_fields(levels)?;
    if let Some(label) = fields.first_non_level_label() {
        return Err(ParseError::UnexpectedToken(label.name().to_string()));
    }
    let stop_loss = parse_level(fields.stop_loss, ParseError::InvalidStopLoss)?;
    let take_profit = parse_level(fields.take_profit, ParseError::InvalidTakeProfit)?;
    if stop_loss.is_none() && take_profit.is_none() {
        return Err(ParseError::MissingSlTp);
    }

    Ok(EditSlTpCommand {
        signal_id,
        stop_loss,
        take_profit,
    })
}
