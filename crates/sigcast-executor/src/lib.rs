//! Signal broadcast and execution for sigcast.
//!
//! - `BroadcastEngine`: fans signals and mutations out to subscribers
//! - `ConfirmationTracker` / `ConfirmationSweeper`: MANUAL offer lifecycle
//! - `ExchangeClient`: adapter seam, with `PaperExchange` as the in-process venue

pub mod confirmation;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod paper;

pub use confirmation::{
    ConfirmationConfig, ConfirmationSweeper, ConfirmationTracker, PendingConfirmation,
};
pub use engine::{BroadcastConfig, BroadcastEngine, Stores};
pub use error::{
    BroadcastError, BroadcastResult, ConfirmError, ConfirmResult, ExchangeError, ExchangeResult,
};
pub use exchange::{BoxFuture, DynExchangeClient, ExchangeClient, OrderRef, OrderRequest};
pub use paper::{PaperExchange, PaperPosition};
