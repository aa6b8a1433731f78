use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_stream::stream;
use futures::Stream;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use url::Url;

use super::driver::{Command, Driver};
use super::engine::Engine;
use super::router::{CachedValue, ListenerHandle, MessageRouter};
use super::types::SubscriptionKey;
use crate::error::Error;
use crate::types::EntityId;
use crate::ws::ConnectionState;
use crate::ws::config::Config;
use crate::{DEFAULT_ENDPOINT, ENDPOINT_VAR, Result};

/// Handle to one shared real-time channel.
///
/// Every clone talks to the same connection. Reads (`latest`, `connection_state`) are
/// answered immediately from shared state; writes are handed to a background task and
/// never block. Dropping the last clone tears the channel down.
///
/// Must be created inside a tokio runtime.
///
/// # Example
///
/// ```rust, no_run
/// use botfeed::Client;
/// use botfeed::channel::topics;
/// use botfeed::ws::config::Config;
///
/// #[tokio::main]
/// async fn main() -> botfeed::Result<()> {
///     let client = Client::new("ws://localhost:8000/ws", Config::default())?;
///
///     let subscription = client.subscribe(Some(7), topics::ACTIVE_ORDERS);
///     let _listener = client.on_message(Some(7), topics::ACTIVE_ORDERS, |value| {
///         println!("{}: {}", value.msg_type, value.body);
///     });
///
///     if let Some(value) = client.latest(Some(7), topics::ACTIVE_ORDERS) {
///         println!("cached: {}", value.body);
///     }
///
///     client.unsubscribe(subscription);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    /// Endpoint the channel connects to
    endpoint: String,
    /// Configuration the channel was created with
    config: Config,
    /// Requests for the driver task
    commands: mpsc::UnboundedSender<Command>,
    /// Connection state published by the driver
    state_rx: watch::Receiver<ConnectionState>,
    /// Shared last-value cache and listener table
    router: Arc<MessageRouter>,
    next_subscription: AtomicU64,
}

impl Client {
    /// Create a channel for `endpoint` and start connecting in the background.
    ///
    /// Fails only if `endpoint` is not a `ws://` or `wss://` URL.
    pub fn new(endpoint: &str, config: Config) -> Result<Self> {
        let url = Url::parse(endpoint)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::validation(format!(
                "Expected a ws:// or wss:// endpoint, got {endpoint}"
            )));
        }

        if config.heartbeat_interval.is_zero() {
            return Err(Error::validation("Heartbeat interval must be greater than zero"));
        }

        let router = Arc::new(MessageRouter::new());
        let engine = Engine::new(&config, Arc::clone(&router));
        let state_rx = engine.state_receiver();
        let (commands, commands_rx) = mpsc::unbounded_channel();

        let driver = Driver::new(endpoint.to_owned(), &config, engine, commands_rx);
        tokio::spawn(driver.run());

        Ok(Self {
            inner: Arc::new(ClientInner {
                endpoint: endpoint.to_owned(),
                config,
                commands,
                state_rx,
                router,
                next_subscription: AtomicU64::new(0),
            }),
        })
    }

    /// Create a channel from the environment.
    ///
    /// The endpoint comes from `BOTFEED_WS_URL` (default `ws://localhost:8000/ws`) and the
    /// reconnect policy from [`Config::from_env`].
    pub fn from_env() -> Result<Self> {
        let endpoint = std::env::var(ENDPOINT_VAR).unwrap_or_else(|_| DEFAULT_ENDPOINT.to_owned());
        Self::new(&endpoint, Config::from_env()?)
    }

    /// Declare interest in `topic` for `entity` (`None` for a global topic).
    ///
    /// Only the first outstanding subscription for a key reaches the server; the
    /// interest is replayed after every reconnection until released with
    /// [`Client::unsubscribe`].
    pub fn subscribe(&self, entity: Option<EntityId>, topic: &str) -> Subscription {
        let key = SubscriptionKey::new(entity, topic);
        let id = self.inner.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.command(Command::Subscribe(key.clone()));

        Subscription { id, key }
    }

    /// Release one subscription. The server is told only when the last one for the key
    /// goes away.
    pub fn unsubscribe(&self, subscription: Subscription) {
        self.command(Command::Unsubscribe(subscription.key));
    }

    /// Send an arbitrary data frame, buffering it until the connection is open.
    ///
    /// Errors only if `request` cannot be serialized.
    pub fn send<R: Serialize>(&self, request: &R) -> Result<()> {
        let frame = serde_json::to_string(request)?;
        self.command(Command::Send(frame));
        Ok(())
    }

    /// Latest value received for the key, even one nobody subscribed to.
    #[must_use]
    pub fn latest(&self, entity: Option<EntityId>, topic: &str) -> Option<CachedValue> {
        self.inner.router.latest(&SubscriptionKey::new(entity, topic))
    }

    /// Call `callback` with every new value for the key until the handle is dropped.
    ///
    /// Callbacks run on the channel's task, in registration order, and may call back
    /// into the client.
    pub fn on_message<F>(&self, entity: Option<EntityId>, topic: &str, callback: F) -> ListenerHandle
    where
        F: Fn(&CachedValue) + Send + Sync + 'static,
    {
        self.inner
            .router
            .listen(SubscriptionKey::new(entity, topic), callback)
    }

    /// Stream of every new value for the key. The listener goes away with the stream.
    pub fn updates(
        &self,
        entity: Option<EntityId>,
        topic: &str,
    ) -> impl Stream<Item = CachedValue> + use<> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = self.on_message(entity, topic, move |value| {
            _ = tx.send(value.clone());
        });

        stream! {
            let _handle = handle;
            while let Some(value) = rx.recv().await {
                yield value;
            }
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.state_rx.borrow()
    }

    /// Receiver for awaiting connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_rx.clone()
    }

    /// Reconnect after retries were exhausted. No-op unless failed or backing off.
    pub fn reset(&self) {
        self.command(Command::Reset);
    }

    /// Close the connection and stop reconnecting, for every clone of this client.
    pub fn shutdown(&self) {
        self.command(Command::Shutdown);
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    fn command(&self, command: Command) {
        if let Err(e) = self.inner.commands.send(command) {
            tracing::debug!(command = ?e.0, "Channel is shut down, ignoring request");
        }
    }
}

/// One outstanding subscription, released by [`Client::unsubscribe`].
///
/// Not `Clone`: each handle accounts for exactly one reference to its key.
#[must_use = "dropping a subscription without unsubscribing keeps it active"]
#[derive(Debug, PartialEq, Eq)]
pub struct Subscription {
    id: u64,
    key: SubscriptionKey,
}

impl Subscription {
    /// Identifier unique among subscriptions made through the same client.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }
}
