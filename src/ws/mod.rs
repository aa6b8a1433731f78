//! Core WebSocket infrastructure.
//!
//! This module holds the transport-agnostic pieces of the channel: the connection
//! lifecycle with its reconnection policy, configuration and error types.
//!
//! # Architecture
//!
//! - [`Connection`]: Sans-IO connection state machine with exponential backoff
//! - [`Action`]: Side effects a transition asks its driver to perform
//! - [`config::Config`]: Heartbeat, reconnection and cache policy
//!
//! # Example
//!
//! ```
//! use botfeed::ws::config::ReconnectConfig;
//! use botfeed::ws::{Action, Connection};
//!
//! let mut connection = Connection::new(ReconnectConfig::default());
//! assert_eq!(connection.connect(), Some(Action::Open));
//! assert!(connection.opened());
//! assert!(connection.state().is_open());
//! ```

pub mod config;
pub mod connection;
pub mod error;

pub use connection::{Action, Connection, ConnectionState};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
