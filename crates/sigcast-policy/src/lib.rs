//! Subscriber policy evaluation for sigcast.
//!
//! Given a signal, a subscriber's settings and live account state, decides
//! order size, leverage and go/no-go. See [`evaluator`] for the rule order.

pub mod error;
pub mod evaluator;

pub use error::{PolicyError, PolicyResult};
pub use evaluator::{AccountState, Decision, PolicyAction, PolicyConfig, PolicyEvaluator};
