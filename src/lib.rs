#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod channel;
pub mod error;
pub mod types;
pub mod ws;

pub use channel::Client;

use crate::error::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Environment variable holding the channel endpoint used by [`Client::from_env`].
pub const ENDPOINT_VAR: &str = "BOTFEED_WS_URL";

/// Endpoint used when [`ENDPOINT_VAR`] is unset.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8000/ws";
