//! Parser error types.
//!
//! Every variant is a `MalformedSignal`: it names the rule the operator text
//! violated and is reported back to that operator only.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Malformed signal: empty message")]
    Empty,

    #[error("Malformed signal: unknown command {0}")]
    UnknownCommand(String),

    #[error("Malformed signal: missing {0}")]
    MissingField(&'static str),

    #[error("Malformed signal: {0} given more than once")]
    DuplicateField(&'static str),

    #[error("Malformed signal: unexpected token {0:?}")]
    UnexpectedToken(String),

    #[error("Malformed signal: invalid symbol {0:?} (alphanumeric, 2-15 chars)")]
    InvalidSymbol(String),

    #[error("Malformed signal: invalid direction {0:?} (LONG or SHORT)")]
    InvalidDirection(String),

    #[error("Malformed signal: invalid entry {0:?} (market or a positive number)")]
    InvalidEntry(String),

    #[error("Malformed signal: invalid stop loss {0:?}")]
    InvalidStopLoss(String),

    #[error("Malformed signal: invalid take profit {0:?}")]
    InvalidTakeProfit(String),

    #[error("Malformed signal: invalid leverage {0:?} (integer 1-100)")]
    InvalidLeverage(String),

    #[error("Malformed signal: invalid signal id {0:?}")]
    InvalidSignalId(String),

    #[error("Malformed signal: invalid close percentage {0:?} (0 < pct <= 100)")]
    InvalidPercentage(String),

    #[error("Malformed signal: edit needs at least one of sl or tp")]
    MissingSlTp,
}

impl ParseError {
    /// Stable rule name, used as a metric label.
    pub fn rule(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::UnknownCommand(_) => "unknown_command",
            Self::MissingField(_) => "missing_field",
            Self::DuplicateField(_) => "duplicate_field",
            Self::UnexpectedToken(_) => "unexpected_token",
            Self::InvalidSymbol(_) => "symbol",
            Self::InvalidDirection(_) => "direction",
            Self::InvalidEntry(_) => "entry",
            Self::InvalidStopLoss(_) => "stop_loss",
            Self::InvalidTakeProfit(_) => "take_profit",
            Self::InvalidLeverage(_) => "leverage",
            Self::InvalidSignalId(_) => "signal_id",
            Self::InvalidPercentage(_) => "percentage",
            Self::MissingSlTp => "missing_sl_tp",
        }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;
