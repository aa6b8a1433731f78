#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

/// WebSocket error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum WsError {
    /// Error connecting to or communicating with the WebSocket server
    Connection(tokio_tungstenite::tungstenite::Error),
    /// Error parsing a WebSocket frame
    MessageParse(serde_json::Error),
    /// WebSocket connection was closed
    ConnectionClosed,
    /// No frame arrived within the heartbeat timeout
    HeartbeatTimeout(Duration),
    /// The opening handshake did not complete in time
    HandshakeTimeout(Duration),
    /// Received a frame that parsed but is not a valid channel frame
    InvalidMessage(String),
    /// Automatic reconnection gave up after the configured number of retries
    RetriesExhausted {
        /// Number of retries that were attempted
        attempts: u32,
    },
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "WebSocket connection error: {e}"),
            Self::MessageParse(e) => write!(f, "Failed to parse WebSocket frame: {e}"),
            Self::ConnectionClosed => write!(f, "WebSocket connection closed"),
            Self::HeartbeatTimeout(after) => {
                write!(f, "WebSocket heartbeat timed out after {after:?}")
            }
            Self::HandshakeTimeout(after) => {
                write!(f, "WebSocket handshake timed out after {after:?}")
            }
            Self::InvalidMessage(msg) => write!(f, "Invalid WebSocket frame: {msg}"),
            Self::RetriesExhausted { attempts } => {
                write!(f, "Gave up reconnecting after {attempts} retries")
            }
        }
    }
}

impl StdError for WsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Connection(e) => Some(e),
            Self::MessageParse(e) => Some(e),
            _ => None,
        }
    }
}

// Integration with main Error type
impl From<WsError> for crate::error::Error {
    fn from(e: WsError) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, e)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for crate::error::Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, WsError::Connection(e))
    }
}
