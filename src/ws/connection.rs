#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::fmt;
use std::time::{Duration, Instant};

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff as _;
use tokio::sync::watch;

use super::config::ReconnectConfig;
use super::error::WsError;

/// Connection state tracking.
///
/// Transitions only ever go `Idle -> Connecting -> Open -> Backoff -> Connecting -> ...`,
/// with `Failed` reachable from a failure once retries are exhausted.
///
/// The exhausting failure goes straight from `Connecting` or `Open` to `Failed`: no
/// retry will run, so there is no `Backoff` delay to report.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected and not trying to
    Idle,
    /// Attempting to connect
    Connecting,
    /// Successfully connected
    Open {
        /// When the connection was established
        since: Instant,
    },
    /// Waiting before the next reconnection attempt
    Backoff {
        /// Reconnection attempt that will run when the delay elapses (1-based)
        attempt: u32,
        /// Delay before that attempt
        retry_in: Duration,
    },
    /// Retries exhausted; only an explicit reset reconnects
    Failed,
}

impl ConnectionState {
    /// Check if the connection is currently open.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// Check if the connection gave up reconnecting.
    #[must_use]
    pub const fn is_failed(self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// Side effect requested by a state transition, executed by whoever owns the transport.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Open the transport
    Open,
    /// Write a text frame to the open transport
    Send(String),
    /// Close the transport, if any
    Close,
    /// Fire a retry after the delay
    ScheduleRetry(Duration),
    /// Drop any pending retry timer
    CancelRetry,
}

/// Connection lifecycle and reconnection policy.
///
/// This type performs no I/O: every transition reports the [`Action`] it needs and
/// publishes the new [`ConnectionState`] on a watch channel.
pub struct Connection {
    config: ReconnectConfig,
    backoff: ExponentialBackoff,
    /// Retries scheduled since the last successful open
    attempt: u32,
    state_tx: watch::Sender<ConnectionState>,
    torn_down: bool,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .field("attempt", &self.attempt)
            .field("torn_down", &self.torn_down)
            .finish_non_exhaustive()
    }
}

impl Connection {
    #[must_use]
    pub fn new(config: ReconnectConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);

        Self {
            backoff: config.clone().into(),
            config,
            attempt: 0,
            state_tx,
            torn_down: false,
        }
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Retries scheduled since the last successful open.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether [`Connection::teardown`] has run.
    #[must_use]
    pub const fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    fn transition(&self, next: ConnectionState) {
        tracing::debug!(from = ?self.state(), to = ?next, "Connection state transition");
        self.state_tx.send_replace(next);
    }

    /// Start connecting from `Idle`. No-op in any other state.
    pub fn connect(&mut self) -> Option<Action> {
        if self.torn_down || self.state() != ConnectionState::Idle {
            return None;
        }

        self.transition(ConnectionState::Connecting);
        Some(Action::Open)
    }

    /// The backoff timer fired: start the scheduled attempt.
    pub fn retry_elapsed(&mut self) -> Option<Action> {
        if self.torn_down || !matches!(self.state(), ConnectionState::Backoff { .. }) {
            return None;
        }

        self.transition(ConnectionState::Connecting);
        Some(Action::Open)
    }

    /// The transport finished opening. Returns `false` when the event is stale.
    pub fn opened(&mut self) -> bool {
        if self.torn_down || self.state() != ConnectionState::Connecting {
            return false;
        }

        self.attempt = 0;
        self.backoff.reset();
        self.transition(ConnectionState::Open {
            since: Instant::now(),
        });
        true
    }

    /// The transport closed or failed to open.
    ///
    /// Schedules the next retry, or moves to `Failed` once `max_attempts` retries have
    /// been spent since the last successful open.
    pub fn closed(&mut self) -> Option<Action> {
        if self.torn_down
            || !matches!(
                self.state(),
                ConnectionState::Connecting | ConnectionState::Open { .. }
            )
        {
            return None;
        }

        if self.attempt >= self.config.max_attempts {
            let error = WsError::RetriesExhausted {
                attempts: self.attempt,
            };
            tracing::warn!(%error, "Connection failed, waiting for an explicit reset");
            self.transition(ConnectionState::Failed);
            return None;
        }

        let delay = self
            .backoff
            .next_backoff()
            .unwrap_or(self.config.max_backoff)
            .min(self.config.max_backoff);
        self.attempt = self.attempt.saturating_add(1);
        tracing::debug!(attempt = self.attempt, ?delay, "Scheduling reconnect");
        self.transition(ConnectionState::Backoff {
            attempt: self.attempt,
            retry_in: delay,
        });
        Some(Action::ScheduleRetry(delay))
    }

    /// Leave `Failed` or `Backoff` and connect again with a fresh retry budget.
    ///
    /// No-op while connecting, open, idle or after teardown.
    pub fn reset(&mut self) -> Vec<Action> {
        if self.torn_down
            || !matches!(
                self.state(),
                ConnectionState::Failed | ConnectionState::Backoff { .. }
            )
        {
            return Vec::new();
        }

        self.attempt = 0;
        self.backoff.reset();
        self.transition(ConnectionState::Idle);

        let mut actions = vec![Action::CancelRetry];
        actions.extend(self.connect());
        actions
    }

    /// Stop for good: cancel any pending retry and close the transport.
    pub fn teardown(&mut self) -> Vec<Action> {
        if self.torn_down {
            return Vec::new();
        }

        self.transition(ConnectionState::Idle);
        self.torn_down = true;
        vec![Action::CancelRetry, Action::Close]
    }
}
