use bon::Builder;
use serde::Serialize;

use super::SubscriptionKey;
use crate::types::EntityId;

/// Subscription control frame.
///
/// Serializes as `{"action": "subscribe", "bot_id": 7, "type": "active_orders"}`;
/// `bot_id` is omitted for global topics.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ControlFrame {
    /// Action type ("subscribe" or "unsubscribe")
    pub action: SubscriptionAction,
    /// Bot the topic belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<EntityId>,
    /// Topic name
    #[serde(rename = "type")]
    pub topic: String,
}

impl ControlFrame {
    /// Create a subscribe frame for the key.
    #[must_use]
    pub fn subscribe(key: &SubscriptionKey) -> Self {
        Self {
            action: SubscriptionAction::Subscribe,
            bot_id: key.entity,
            topic: key.topic.clone(),
        }
    }

    /// Create an unsubscribe frame for the key.
    #[must_use]
    pub fn unsubscribe(key: &SubscriptionKey) -> Self {
        Self {
            action: SubscriptionAction::Unsubscribe,
            bot_id: key.entity,
            topic: key.topic.clone(),
        }
    }
}

/// Subscription action type.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionAction {
    /// Start receiving a topic
    Subscribe,
    /// Stop receiving a topic
    Unsubscribe,
}

/// Candlestick stream request sent when a chart changes symbol or interval.
///
/// Serializes as `{"type": "subscribe", "symbol": "BTCUSDT", "interval": "1m"}`.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Builder)]
pub struct IntervalChange {
    #[serde(rename = "type")]
    #[builder(skip = "subscribe")]
    kind: &'static str,
    /// Trading pair symbol (e.g., `BTCUSDT`)
    #[builder(into)]
    pub symbol: String,
    /// Candle interval (e.g., `1m`, `1h`)
    #[builder(into)]
    pub interval: String,
}

/// Switch the candle interval of an existing chart stream.
///
/// Serializes as `{"type": "change_interval", "interval": "1h"}`.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChangeInterval {
    #[serde(rename = "type")]
    kind: &'static str,
    /// New candle interval
    pub interval: String,
}

impl ChangeInterval {
    #[must_use]
    pub fn new<S: Into<String>>(interval: S) -> Self {
        Self {
            kind: "change_interval",
            interval: interval.into(),
        }
    }
}
