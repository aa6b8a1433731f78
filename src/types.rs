//! Re-exported types from external crates for convenience.
//!
//! These types appear in this crate's public API and are re-exported here
//! so users don't need to add these dependencies to their `Cargo.toml`.

/// Date and time types for receipt timestamps and payload fields.
pub use chrono::{DateTime, Utc};
/// Arbitrary precision decimal type for prices, quantities and profits.
pub use rust_decimal::Decimal;
/// Untyped JSON value carried by frame bodies.
pub use serde_json::Value;

/// Identifier of the bot (or other process instance) a topic update pertains to.
pub type EntityId = u64;
