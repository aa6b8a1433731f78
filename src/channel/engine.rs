use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use super::queue::OutboundQueue;
use super::registry::SubscriptionRegistry;
use super::router::MessageRouter;
use super::types::SubscriptionKey;
use super::types::request::ControlFrame;
use super::types::response::parse_frames;
use crate::ws::config::Config;
use crate::ws::{Action, Connection, ConnectionState};

/// The channel's single-owner core: connection lifecycle, subscription bookkeeping,
/// outbound buffering and inbound routing.
///
/// `Engine` performs no I/O. Transport events, timer expiry and facade calls are fed
/// in as method calls; the transport work they imply comes out of
/// [`Engine::poll_action`] in the order it must happen.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use botfeed::channel::{Engine, MessageRouter, SubscriptionKey};
/// use botfeed::ws::Action;
/// use botfeed::ws::config::Config;
///
/// let mut engine = Engine::new(&Config::default(), Arc::new(MessageRouter::new()));
/// engine.subscribe(SubscriptionKey::entity(7, "status"));
/// engine.connect();
/// assert_eq!(engine.poll_action(), Some(Action::Open));
///
/// engine.on_open();
/// assert_eq!(
///     engine.poll_action(),
///     Some(Action::Send(r#"{"action":"subscribe","bot_id":7,"type":"status"}"#.to_owned()))
/// );
/// ```
#[derive(Debug)]
pub struct Engine {
    connection: Connection,
    registry: SubscriptionRegistry,
    outbound: OutboundQueue,
    router: Arc<MessageRouter>,
    actions: VecDeque<Action>,
    evict_on_unsubscribe: bool,
}

impl Engine {
    #[must_use]
    pub fn new(config: &Config, router: Arc<MessageRouter>) -> Self {
        Self {
            connection: Connection::new(config.reconnect.clone()),
            registry: SubscriptionRegistry::new(),
            outbound: OutboundQueue::new(),
            router,
            actions: VecDeque::new(),
            evict_on_unsubscribe: config.evict_on_unsubscribe,
        }
    }

    /// Next transport action to perform, in order.
    pub fn poll_action(&mut self) -> Option<Action> {
        self.actions.pop_front()
    }

    /// Start connecting if idle.
    pub fn connect(&mut self) {
        self.actions.extend(self.connection.connect());
    }

    /// The transport opened: replay every desired subscription, then flush buffered frames.
    pub fn on_open(&mut self) {
        if !self.connection.opened() {
            return;
        }

        let desired = self.registry.desired_set();
        tracing::debug!(count = desired.len(), "Replaying subscriptions");
        for key in &desired {
            self.emit(&ControlFrame::subscribe(key));
        }

        let actions = &mut self.actions;
        let flushed = self
            .outbound
            .flush(|frame| actions.push_back(Action::Send(frame)));
        if flushed > 0 {
            tracing::debug!(count = flushed, "Flushed outbound queue");
        }
    }

    /// The transport closed, errored or failed to open.
    ///
    /// Writes still pending for the dead transport are dropped.
    pub fn on_close(&mut self) {
        let before = self.actions.len();
        self.actions
            .retain(|action| !matches!(action, Action::Send(_)));
        let dropped = before - self.actions.len();
        if dropped > 0 {
            tracing::debug!(count = dropped, "Dropped writes for closed transport");
        }

        self.actions.extend(self.connection.closed());
    }

    /// The backoff timer fired.
    pub fn on_retry_elapsed(&mut self) {
        self.actions.extend(self.connection.retry_elapsed());
    }

    /// Inbound text from the transport. Malformed frames are logged and dropped.
    pub fn on_frame(&mut self, bytes: &[u8]) {
        match parse_frames(bytes) {
            Ok(frames) => {
                for frame in frames {
                    self.router.route(frame);
                }
            }
            Err(error) => {
                tracing::warn!(
                    text = %String::from_utf8_lossy(bytes),
                    %error,
                    "Dropping malformed frame"
                );
            }
        }
    }

    /// Record interest in the key; goes on the wire only for the first reference.
    pub fn subscribe(&mut self, key: SubscriptionKey) {
        let frame = ControlFrame::subscribe(&key);
        if self.registry.acquire(key) && self.state().is_open() {
            tracing::debug!(key = %frame.topic, bot_id = ?frame.bot_id, "Subscribing");
            self.emit(&frame);
        }
    }

    /// Release one reference to the key; goes on the wire only for the last one.
    pub fn unsubscribe(&mut self, key: &SubscriptionKey) {
        if !self.registry.release(key) {
            return;
        }

        if self.state().is_open() {
            tracing::debug!(%key, "Unsubscribing");
            self.emit(&ControlFrame::unsubscribe(key));
        }
        if self.evict_on_unsubscribe {
            self.router.evict(key);
        }
    }

    /// Send a data frame now if open, otherwise buffer it for the next open.
    pub fn send(&mut self, frame: String) {
        if self.state().is_open() {
            self.actions.push_back(Action::Send(frame));
        } else {
            tracing::trace!(queued = self.outbound.len() + 1, "Connection not open, queueing frame");
            self.outbound.enqueue(frame);
        }
    }

    /// Explicit reset out of `Failed` (or an in-progress backoff).
    pub fn reset(&mut self) {
        self.actions.extend(self.connection.reset());
    }

    /// Tear the channel down. Registry and queue are left as they are, but nothing
    /// will use them again.
    pub fn teardown(&mut self) {
        self.actions.clear();
        self.actions.extend(self.connection.teardown());
    }

    fn emit<R: Serialize>(&mut self, frame: &R) {
        match serde_json::to_string(frame) {
            Ok(text) => self.actions.push_back(Action::Send(text)),
            Err(error) => tracing::warn!(%error, "Unable to serialize control frame"),
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.connection.state_receiver()
    }

    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.connection.is_torn_down()
    }

    #[must_use]
    pub fn desired_set(&self) -> Vec<SubscriptionKey> {
        self.registry.desired_set()
    }

    #[must_use]
    pub fn subscription_count(&self, key: &SubscriptionKey) -> usize {
        self.registry.count(key)
    }

    /// Frames waiting for the next open.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.outbound.len()
    }

    #[must_use]
    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }
}
