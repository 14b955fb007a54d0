//! In-memory stores for sigcast.
//!
//! Stand-ins for the external storage collaborator: synchronous,
//! key-addressable, shared between tasks behind `Arc`.
//! - `SubscriberRegistry`: subscriber records and the settings API
//! - `SignalBook`: issued signals and their lifecycle
//! - `TradeLedger`: append-only execution outcomes

pub mod error;
pub mod ledger;
pub mod signals;
pub mod subscribers;

pub use error::{RegistryError, RegistryResult};
pub use ledger::TradeLedger;
pub use signals::SignalBook;
pub use subscribers::{RegistryStats, SubscriberRegistry};
