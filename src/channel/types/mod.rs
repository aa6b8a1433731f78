pub mod request;
pub mod response;

use std::fmt;

use crate::types::EntityId;

/// Unique identifier for an `(entity, topic)` interest.
///
/// `entity` is `None` for global topics that are not tied to a single bot.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionKey {
    /// Bot the topic belongs to, `None` for global topics
    pub entity: Option<EntityId>,
    /// Topic name (e.g., `status`, `active_orders`)
    pub topic: String,
}

impl SubscriptionKey {
    #[must_use]
    pub fn new(entity: Option<EntityId>, topic: &str) -> Self {
        Self {
            entity,
            topic: topic.to_owned(),
        }
    }

    /// Key for a topic scoped to one bot.
    #[must_use]
    pub fn entity(entity: EntityId, topic: &str) -> Self {
        Self::new(Some(entity), topic)
    }

    /// Key for a global topic.
    #[must_use]
    pub fn global(topic: &str) -> Self {
        Self::new(None, topic)
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.entity {
            Some(entity) => write!(f, "{entity}/{}", self.topic),
            None => write!(f, "*/{}", self.topic),
        }
    }
}
