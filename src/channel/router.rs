#![expect(
    clippy::module_name_repetitions,
    reason = "Router types carry the module name for clarity when re-exported"
)]

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::types::SubscriptionKey;
use super::types::response::{FrameKind, InboundFrame};
use crate::Result;

/// Callback invoked with every new value for a key.
pub type Listener = Arc<dyn Fn(&CachedValue) + Send + Sync + 'static>;

/// Most recent body received for a key.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub struct CachedValue {
    /// Whether the frame was topic data or an event
    pub kind: FrameKind,
    /// Raw message type as received (e.g., `active_orders_data`)
    pub msg_type: String,
    /// Frame body
    pub body: Value,
    /// When the frame was routed
    pub received_at: DateTime<Utc>,
}

impl CachedValue {
    /// Decode the body into a typed payload such as
    /// [`BotStatus`](super::types::response::BotStatus) or `Vec<ActiveOrder>`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(T::deserialize(&self.body)?)
    }
}

/// Keyed last-value cache with per-key listeners.
///
/// The cache mirrors everything received, including keys nobody subscribed to. Both
/// tables are concurrent maps so reads never wait on the routing task.
#[derive(Default)]
pub struct MessageRouter {
    cache: DashMap<SubscriptionKey, CachedValue>,
    listeners: DashMap<SubscriptionKey, Vec<(u64, Listener)>>,
    next_listener: AtomicU64,
}

impl fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageRouter")
            .field("cached", &self.cache.len())
            .field("listened", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl MessageRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the frame as the latest value for its key and notify that key's listeners.
    ///
    /// Last write wins. Listeners run synchronously in registration order on the
    /// calling thread, after the cache has been updated.
    pub fn route(&self, frame: InboundFrame) {
        let key = frame.key();
        let value = CachedValue {
            kind: frame.kind(),
            msg_type: frame.msg_type.clone(),
            body: frame.into_body(),
            received_at: Utc::now(),
        };
        tracing::trace!(%key, msg_type = %value.msg_type, "Routing frame");

        self.cache.insert(key.clone(), value.clone());

        // Snapshot so callbacks can add or remove listeners without deadlocking
        let listeners: Vec<Listener> = self
            .listeners
            .get(&key)
            .map(|entry| entry.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();

        for listener in listeners {
            listener(&value);
        }
    }

    /// Latest value for the key, if any frame for it has been received.
    #[must_use]
    pub fn latest(&self, key: &SubscriptionKey) -> Option<CachedValue> {
        self.cache.get(key).map(|entry| entry.value().clone())
    }

    /// Forget the cached value for the key.
    pub fn evict(&self, key: &SubscriptionKey) -> Option<CachedValue> {
        self.cache.remove(key).map(|(_, value)| value)
    }

    /// Number of keys with a cached value.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Register a listener for the key. It stays registered until the handle is dropped.
    pub fn listen<F>(self: &Arc<Self>, key: SubscriptionKey, listener: F) -> ListenerHandle
    where
        F: Fn(&CachedValue) + Send + Sync + 'static,
    {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        let listener: Listener = Arc::new(listener);
        self.listeners
            .entry(key.clone())
            .or_default()
            .push((id, listener));

        ListenerHandle {
            id,
            key,
            router: Arc::downgrade(self),
        }
    }

    /// Number of listeners registered for the key.
    #[must_use]
    pub fn listener_count(&self, key: &SubscriptionKey) -> usize {
        self.listeners.get(key).map_or(0, |entry| entry.len())
    }

    fn remove_listener(&self, key: &SubscriptionKey, id: u64) {
        if let Some(mut entry) = self.listeners.get_mut(key) {
            entry.retain(|(listener_id, _)| *listener_id != id);
        }
        self.listeners.remove_if(key, |_, entry| entry.is_empty());
    }
}

/// Registration of a [`Listener`]. Dropping it removes only this listener.
#[must_use = "the listener is removed as soon as the handle is dropped"]
#[derive(Debug)]
pub struct ListenerHandle {
    id: u64,
    key: SubscriptionKey,
    router: Weak<MessageRouter>,
}

impl ListenerHandle {
    /// Key this listener is registered for.
    #[must_use]
    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    /// Remove the listener now.
    pub fn remove(self) {
        drop(self);
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(router) = self.router.upgrade() {
            router.remove_listener(&self.key, self.id);
        }
    }
}
