//! Signal grammar parser.
//!
//! Turns operator free text into a canonical [`sigcast_core::Signal`] or a
//! mutation command referencing one, or rejects it with a [`ParseError`]
//! naming the violated rule.

pub mod error;
mod fields;
pub mod grammar;
pub mod summary;

pub use error::{ParseError, ParseResult};
pub use grammar::{parse, parse_at};
pub use summary::{format_mutation_summary, format_signal_summary};
