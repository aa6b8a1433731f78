#![expect(
    clippy::module_name_repetitions,
    reason = "The registry type carries the module name for clarity when re-exported"
)]

use indexmap::IndexMap;
use indexmap::map::Entry;

use super::types::SubscriptionKey;

/// Desired `(entity, topic)` interests with reference counts.
///
/// Independent of connection state. Keys keep their insertion order so a replay after
/// reconnect is deterministic; a key that is released and added again moves to the end.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    counts: IndexMap<SubscriptionKey, usize>,
}

impl SubscriptionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one reference to the key. Returns `true` on the 0 -> 1 transition.
    pub fn acquire(&mut self, key: SubscriptionKey) -> bool {
        match self.counts.entry(key) {
            Entry::Occupied(mut entry) => {
                *entry.get_mut() += 1;
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(1);
                true
            }
        }
    }

    /// Drop one reference to the key. Returns `true` on the 1 -> 0 transition.
    ///
    /// Releasing an absent key does nothing.
    pub fn release(&mut self, key: &SubscriptionKey) -> bool {
        let Some(count) = self.counts.get_mut(key) else {
            return false;
        };

        *count = count.saturating_sub(1);
        if *count > 0 {
            return false;
        }

        self.counts.shift_remove(key);
        true
    }

    /// Current reference count for the key, 0 when absent.
    #[must_use]
    pub fn count(&self, key: &SubscriptionKey) -> usize {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Every key with a positive count, in insertion order.
    #[must_use]
    pub fn desired_set(&self) -> Vec<SubscriptionKey> {
        self.counts.keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}
