//! Core domain types for the sigcast signal broadcast engine.
//!
//! This crate provides fundamental types used throughout the system:
//! - `Signal`, `SignalId`, `Symbol`: The canonical trading instruction
//! - `SignalMutation`: Close / leverage / SL-TP commands referencing a signal
//! - `Subscriber`: Account settings of a signal recipient
//! - `Amount`, `Price`: Precision-safe numeric types
//! - `OutcomeKind`, `TradeOutcome`, `BroadcastReport`: Execution results
//! - `Clock`: Injectable time source

pub mod clock;
pub mod decimal;
pub mod error;
pub mod outcome;
pub mod signal;
pub mod subscriber;

pub use clock::{Clock, ManualClock, SystemClock};
pub use decimal::{Amount, Price};
pub use error::{CoreError, CoreResult};
pub use outcome::{BroadcastReport, OutcomeCounts, OutcomeKind, TradeAction, TradeOutcome};
pub use signal::{
    CloseCommand, Direction, EditSlTpCommand, EntryOrder, Leverage, LeverageCommand, OrderKind,
    OrderSide, Signal, SignalCommand, SignalId, SignalMutation, SignalStatus, Symbol,
    SIGNAL_ID_PREFIX,
};
pub use subscriber::{
    validate_trade_amount, CredentialRef, Subscriber, SubscriberId, TradeMode,
    DEFAULT_MAX_LEVERAGE, DEFAULT_TRADE_AMOUNT, MAX_TRADE_AMOUNT, MIN_TRADE_AMOUNT,
};
