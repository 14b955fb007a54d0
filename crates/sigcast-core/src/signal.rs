//! Canonical signal record and the mutation commands that reference it.
//!
//! A [`Signal`] is produced once by the parser and is immutable afterwards
//! except for its lifecycle status. Close, leverage and SL/TP commands carry
//! only a [`SignalId`] and must be resolved against the signal book.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::decimal::Price;
use crate::error::{CoreError, CoreResult};

/// Prefix of every generated signal identifier.
pub const SIGNAL_ID_PREFIX: &str = "SIG";

/// Length of the random identifier suffix.
const SIGNAL_ID_SUFFIX_LEN: usize = 6;

// ============================================================================
// Symbol
// ============================================================================

/// Instrument symbol, e.g. `BTCUSDT`.
///
/// Always upper-case ASCII alphanumeric, 2 to 15 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub const MIN_LEN: usize = 2;
    pub const MAX_LEN: usize = 15;

    /// Validate and upper-case a raw symbol.
    pub fn parse(raw: &str) -> CoreResult<Self> {
        let raw = raw.trim();
        let valid_len = (Self::MIN_LEN..=Self::MAX_LEN).contains(&raw.len());
        if !valid_len || !raw.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CoreError::InvalidSymbol(raw.to_string()));
        }
        Ok(Self(raw.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// SignalId
// ============================================================================

/// Signal identifier: `SIG-DDMMYY-SYMBOL-XXXXXX`.
///
/// The suffix is six upper-case hex characters taken from a v4 UUID.
/// Legacy identifiers without the suffix are accepted by [`SignalId::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalId(String);

impl SignalId {
    /// Generate a fresh identifier for `symbol` created at `created_at`.
    pub fn generate(symbol: &Symbol, created_at: DateTime<Utc>) -> Self {
        let date = created_at.format("%d%m%y");
        let suffix = Uuid::new_v4().simple().to_string()[..SIGNAL_ID_SUFFIX_LEN].to_ascii_uppercase();
        Self(format!("{SIGNAL_ID_PREFIX}-{date}-{symbol}-{suffix}"))
    }

    /// Validate the lexical shape of an identifier and normalize it upward.
    ///
    /// Only the shape is checked; whether the signal exists is decided by
    /// the signal book.
    pub fn parse(raw: &str) -> CoreResult<Self> {
        let normalized = raw.trim().to_ascii_uppercase();
        let invalid = || CoreError::InvalidSignalId(raw.trim().to_string());

        let parts: Vec<&str> = normalized.split('-').collect();
        if !(3..=4).contains(&parts.len()) || parts[0] != SIGNAL_ID_PREFIX {
            return Err(invalid());
        }
        if parts[1].len() != 6 || !parts[1].chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        Symbol::parse(parts[2]).map_err(|_| invalid())?;
        if let Some(suffix) = parts.get(3) {
            if suffix.len() != SIGNAL_ID_SUFFIX_LEN
                || !suffix.chars().all(|c| c.is_ascii_alphanumeric())
            {
                return Err(invalid());
            }
        }
        Ok(Self(normalized))
    }

    /// Symbol embedded in the identifier.
    pub fn symbol(&self) -> Symbol {
        // Shape was validated at construction, the third segment is a symbol.
        let segment = self.0.split('-').nth(2).unwrap_or_default();
        Symbol(segment.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Direction / OrderSide / OrderKind
// ============================================================================

/// Position direction requested by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Parse `LONG` / `SHORT`, case-insensitive.
    pub fn parse(raw: &str) -> CoreResult<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "LONG" => Ok(Self::Long),
            "SHORT" => Ok(Self::Short),
            _ => Err(CoreError::InvalidDirection(raw.trim().to_string())),
        }
    }

    /// Order side that opens a position in this direction.
    pub fn order_side(&self) -> OrderSide {
        match self {
            Self::Long => OrderSide::Buy,
            Self::Short => OrderSide::Sell,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// Order side: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Order kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderKind {
    Market,
    Limit,
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Market => write!(f, "MARKET"),
            Self::Limit => write!(f, "LIMIT"),
        }
    }
}

/// Entry instruction. A limit price exists exactly when the order is LIMIT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "UPPERCASE")]
pub enum EntryOrder {
    Market,
    Limit { price: Price },
}

impl EntryOrder {
    pub fn kind(&self) -> OrderKind {
        match self {
            Self::Market => OrderKind::Market,
            Self::Limit { .. } => OrderKind::Limit,
        }
    }

    pub fn price(&self) -> Option<Price> {
        match self {
            Self::Market => None,
            Self::Limit { price } => Some(*price),
        }
    }
}

// ============================================================================
// Leverage
// ============================================================================

/// Leverage multiplier, 1 to 100 inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Leverage(u32);

impl Leverage {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 100;
    pub const DEFAULT: Self = Self(1);

    pub fn new(value: u32) -> CoreResult<Self> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(CoreError::InvalidLeverage(value))
        }
    }

    #[inline]
    pub fn get(&self) -> u32 {
        self.0
    }

    /// Leverage actually applied for a subscriber: never above their cap.
    #[inline]
    pub fn capped_at(&self, cap: Leverage) -> Leverage {
        std::cmp::min(*self, cap)
    }
}

impl Default for Leverage {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u32> for Leverage {
    type Error = CoreError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Leverage> for u32 {
    fn from(l: Leverage) -> Self {
        l.0
    }
}

impl fmt::Display for Leverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.0)
    }
}

// ============================================================================
// Signal
// ============================================================================

/// Signal lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalStatus {
    #[default]
    Active,
    Closed,
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

/// Canonical trading instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub id: SignalId,
    pub symbol: Symbol,
    pub direction: Direction,
    pub entry: EntryOrder,
    /// `None` means no stop-loss; zero is never stored.
    pub stop_loss: Option<Price>,
    /// `None` means no take-profit; zero is never stored.
    pub take_profit: Option<Price>,
    pub leverage: Leverage,
    pub status: SignalStatus,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Signal {
    /// Create an ACTIVE signal with a freshly generated identifier.
    #[must_use]
    pub fn new(
        symbol: Symbol,
        direction: Direction,
        entry: EntryOrder,
        stop_loss: Option<Price>,
        take_profit: Option<Price>,
        leverage: Leverage,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SignalId::generate(&symbol, created_at),
            symbol,
            direction,
            entry,
            stop_loss: stop_loss.filter(Price::is_positive),
            take_profit: take_profit.filter(Price::is_positive),
            leverage,
            status: SignalStatus::Active,
            created_at,
            closed_at: None,
        }
    }

    pub fn order_kind(&self) -> OrderKind {
        self.entry.kind()
    }

    pub fn entry_price(&self) -> Option<Price> {
        self.entry.price()
    }

    pub fn is_active(&self) -> bool {
        self.status == SignalStatus::Active
    }

    /// Same instruction content, ignoring identity and lifecycle fields.
    pub fn same_instruction(&self, other: &Signal) -> bool {
        self.symbol == other.symbol
            && self.direction == other.direction
            && self.entry == other.entry
            && self.stop_loss == other.stop_loss
            && self.take_profit == other.take_profit
            && self.leverage == other.leverage
    }

    /// Transition to CLOSED. Returns false if already closed.
    pub fn close(&mut self, at: DateTime<Utc>) -> bool {
        if self.status == SignalStatus::Closed {
            return false;
        }
        self.status = SignalStatus::Closed;
        self.closed_at = Some(at);
        true
    }
}

// ============================================================================
// Mutation commands
// ============================================================================

/// Close (part of) every position opened for a signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseCommand {
    pub signal_id: SignalId,
    /// Percentage of the position to close, in (0, 100].
    pub percentage: Decimal,
}

impl CloseCommand {
    pub fn is_full(&self) -> bool {
        self.percentage >= Decimal::ONE_HUNDRED
    }
}

/// Change leverage on every position opened for a signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeverageCommand {
    pub signal_id: SignalId,
    pub leverage: Leverage,
}

/// Replace stop-loss and/or take-profit on every position opened for a signal.
///
/// At least one of the two is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditSlTpCommand {
    pub signal_id: SignalId,
    pub stop_loss: Option<Price>,
    pub take_profit: Option<Price>,
}

/// Mutation of an already-issued signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalMutation {
    Close(CloseCommand),
    Leverage(LeverageCommand),
    EditSlTp(EditSlTpCommand),
}

impl SignalMutation {
    pub fn signal_id(&self) -> &SignalId {
        match self {
            Self::Close(c) => &c.signal_id,
            Self::Leverage(c) => &c.signal_id,
            Self::EditSlTp(c) => &c.signal_id,
        }
    }

    /// Short label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Close(_) => "close",
            Self::Leverage(_) => "leverage",
            Self::EditSlTp(_) => "edit_sltp",
        }
    }
}

/// Any operator command the parser can produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalCommand {
    New(Signal),
    Mutation(SignalMutation),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn sample_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 3, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_symbol_normalized_upward() {
        assert_eq!(Symbol::parse("btcusdt").unwrap().as_str(), "BTCUSDT");
    }

    #[test]
    fn test_symbol_rejects_bad_shapes() {
        assert!(Symbol::parse("B").is_err());
        assert!(Symbol::parse("BTC-USDT").is_err());
        assert!(Symbol::parse("ABCDEFGHIJKLMNOP").is_err());
    }

    #[test]
    fn test_signal_id_generation_shape() {
        let symbol = Symbol::parse("BTCUSDT").unwrap();
        let id = SignalId::generate(&symbol, sample_time());
        assert!(id.as_str().starts_with("SIG-030126-BTCUSDT-"));
        assert_eq!(id.as_str().len(), "SIG-030126-BTCUSDT-".len() + 6);
        assert_eq!(SignalId::parse(id.as_str()).unwrap(), id);
        assert_eq!(id.symbol(), symbol);
    }

    #[test]
    fn test_signal_id_unique() {
        let symbol = Symbol::parse("ETHUSDT").unwrap();
        let a = SignalId::generate(&symbol, sample_time());
        let b = SignalId::generate(&symbol, sample_time());
        assert_ne!(a, b);
    }

    #[test]
    fn test_signal_id_parse_lexical_only() {
        assert!(SignalId::parse("sig-030126-btcusdt-59797f").is_ok());
        assert!(SignalId::parse("SIG-030126-BTCUSDT").is_ok());
        assert!(SignalId::parse("SIG-0301-BTCUSDT-59797F").is_err());
        assert!(SignalId::parse("XYZ-030126-BTCUSDT-59797F").is_err());
        assert!(SignalId::parse("SIG-030126-BTCUSDT-5979").is_err());
        assert!(SignalId::parse("hello").is_err());
    }

    #[test]
    fn test_leverage_bounds_and_cap() {
        assert!(Leverage::new(0).is_err());
        assert!(Leverage::new(101).is_err());
        let signal_lev = Leverage::new(50).unwrap();
        let cap = Leverage::new(10).unwrap();
        assert_eq!(signal_lev.capped_at(cap).get(), 10);
        assert_eq!(cap.capped_at(signal_lev).get(), 10);
    }

    #[test]
    fn test_leverage_serde_rejects_out_of_range() {
        assert!(serde_json::from_str::<Leverage>("0").is_err());
        assert_eq!(serde_json::from_str::<Leverage>("20").unwrap().get(), 20);
    }

    #[test]
    fn test_entry_order_kind() {
        assert_eq!(EntryOrder::Market.kind(), OrderKind::Market);
        let limit = EntryOrder::Limit {
            price: Price::new(dec!(64000)),
        };
        assert_eq!(limit.kind(), OrderKind::Limit);
        assert_eq!(limit.price(), Some(Price::new(dec!(64000))));
    }

    #[test]
    fn test_signal_drops_non_positive_sl_tp() {
        let signal = Signal::new(
            Symbol::parse("SOLUSDT").unwrap(),
            Direction::Short,
            EntryOrder::Market,
            Some(Price::new(dec!(0))),
            Some(Price::new(dec!(120))),
            Leverage::DEFAULT,
            sample_time(),
        );
        assert_eq!(signal.stop_loss, None);
        assert_eq!(signal.take_profit, Some(Price::new(dec!(120))));
        assert_eq!(signal.direction.order_side(), OrderSide::Sell);
    }

    #[test]
    fn test_signal_close_once() {
        let mut signal = Signal::new(
            Symbol::parse("SOLUSDT").unwrap(),
            Direction::Long,
            EntryOrder::Market,
            None,
            None,
            Leverage::DEFAULT,
            sample_time(),
        );
        assert!(signal.is_active());
        assert!(signal.close(sample_time()));
        assert!(!signal.close(sample_time()));
        assert_eq!(signal.status, SignalStatus::Closed);
        assert_eq!(signal.closed_at, Some(sample_time()));
    }
}
