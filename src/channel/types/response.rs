use bon::Builder;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::SubscriptionKey;
use crate::Result;
use crate::types::{Decimal, EntityId};
use crate::ws::WsError;

/// Suffixes the server appends to a topic name when pushing its data.
const DATA_SUFFIXES: [&str; 2] = ["_data", "_update"];

/// Whether an inbound frame carries topic data or a one-off event.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    /// Snapshot or update for a topic (`*_data`, `*_update`)
    Data,
    /// Anything else, e.g. `notification`
    Event,
}

/// Inbound frame as pushed by the server.
///
/// `{"type": "active_orders_data", "bot_id": 7, "payload": [...]}`
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Deserialize, Builder)]
pub struct InboundFrame {
    /// Message type; doubles as the topic once the data suffix is removed
    #[serde(rename = "type")]
    #[builder(into)]
    pub msg_type: String,
    /// Bot the frame belongs to, absent for global frames
    #[serde(default)]
    pub bot_id: Option<EntityId>,
    /// Object body used by status-like frames
    #[serde(default)]
    pub data: Option<Value>,
    /// Array body used by list-like frames
    #[serde(default)]
    pub payload: Option<Value>,
    /// Any other top-level fields
    #[serde(flatten)]
    #[builder(default)]
    pub extra: Map<String, Value>,
}

impl InboundFrame {
    /// Topic this frame updates.
    ///
    /// `active_orders_data` and `status_update` map to `active_orders` and `status`;
    /// types without a data suffix are their own topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        self.data_topic().unwrap_or(&self.msg_type)
    }

    #[must_use]
    pub fn kind(&self) -> FrameKind {
        if self.data_topic().is_some() {
            FrameKind::Data
        } else {
            FrameKind::Event
        }
    }

    fn data_topic(&self) -> Option<&str> {
        DATA_SUFFIXES
            .iter()
            .find_map(|suffix| self.msg_type.strip_suffix(suffix))
            .filter(|topic| !topic.is_empty())
    }

    /// Cache key for this frame.
    #[must_use]
    pub fn key(&self) -> SubscriptionKey {
        SubscriptionKey::new(self.bot_id, self.topic())
    }

    /// Body of the frame: `data`, else `payload`, else the remaining fields.
    #[must_use]
    pub fn into_body(self) -> Value {
        self.data
            .or(self.payload)
            .unwrap_or(Value::Object(self.extra))
    }
}

/// Parse inbound text into frames.
///
/// Accepts a single frame object or a batch array. A lone frame fails on invalid JSON,
/// a missing or empty `type`, or a non-integer `bot_id`. Batch elements that fail the
/// same checks are logged and skipped; the rest of the batch is kept.
pub fn parse_frames(bytes: &[u8]) -> Result<Vec<InboundFrame>> {
    let value: Value = serde_json::from_slice(bytes).map_err(WsError::MessageParse)?;

    match value {
        Value::Object(_) => Ok(vec![parse_frame(value)?]),
        Value::Array(elements) => Ok(elements
            .into_iter()
            .filter_map(|element| match parse_frame(element) {
                Ok(frame) => Some(frame),
                Err(error) => {
                    tracing::warn!(%error, "Skipping malformed frame in batch");
                    None
                }
            })
            .collect()),
        other => {
            Err(WsError::InvalidMessage(format!("expected object or array, got {other}")).into())
        }
    }
}

fn parse_frame(value: Value) -> Result<InboundFrame> {
    let frame: InboundFrame = serde_json::from_value(value).map_err(WsError::MessageParse)?;
    if frame.msg_type.is_empty() {
        return Err(WsError::InvalidMessage(format!("frame without a type: {frame:?}")).into());
    }
    Ok(frame)
}

/// Bot status snapshot, pushed as `status_update` / `bot_status_data`.
#[non_exhaustive]
#[derive(Debug, Clone, Deserialize, Serialize, Builder)]
pub struct BotStatus {
    /// `active` or `stopped`
    pub status: String,
    pub current_price: Option<Decimal>,
    pub deviation: Option<Decimal>,
    #[serde(default)]
    #[builder(default)]
    pub realized_profit_a: Decimal,
    #[serde(default)]
    #[builder(default)]
    pub realized_profit_b: Decimal,
    #[serde(default)]
    #[builder(default)]
    pub total_profit_usdt: Decimal,
    #[serde(default)]
    #[builder(default)]
    pub unrealized_profit_a: Decimal,
    #[serde(default)]
    #[builder(default)]
    pub unrealized_profit_b: Decimal,
    #[serde(default)]
    #[builder(default)]
    pub unrealized_profit_usdt: Decimal,
    #[serde(default)]
    #[builder(default)]
    pub active_orders_count: u64,
    #[serde(default)]
    #[builder(default)]
    pub completed_trades_count: u64,
    pub running_time: Option<String>,
    /// Strategy parameters the bot was started with
    #[serde(default)]
    pub initial_parameters: Option<Value>,
}

impl BotStatus {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

/// Open order, one element of an `active_orders_data` payload.
#[non_exhaustive]
#[derive(Debug, Clone, Deserialize, Serialize, Builder)]
pub struct ActiveOrder {
    #[builder(into)]
    pub order_id: String,
    /// `buy` or `sell`
    #[builder(into)]
    pub order_type: String,
    #[serde(default, rename = "isInitial")]
    #[builder(default)]
    pub is_initial: bool,
    pub price: Decimal,
    pub quantity: Decimal,
    pub created_at: Option<NaiveDateTime>,
}

/// Historical order, one element of an `order_history_data` payload.
#[non_exhaustive]
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrderRecord {
    pub order_id: String,
    pub order_type: String,
    #[serde(default, rename = "isInitial")]
    pub is_initial: bool,
    pub price: Decimal,
    pub quantity: Decimal,
    pub status: String,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

/// Completed buy/sell pair, one element of an `all_trades_data` payload.
#[non_exhaustive]
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TradeRecord {
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    pub quantity: Decimal,
    pub profit: Decimal,
    pub profit_asset: String,
    pub status: String,
    pub trade_type: String,
    pub buy_order_id: Option<String>,
    pub sell_order_id: Option<String>,
    pub executed_at: Option<NaiveDateTime>,
}

/// Candlestick, the body of `kline_data` frames.
#[non_exhaustive]
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Kline {
    /// Candle open time in Unix milliseconds
    #[serde(alias = "time")]
    pub open_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

impl Kline {
    /// Candle open time as a UTC timestamp.
    #[must_use]
    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.open_time)
    }
}

/// Trade notification, the payload of `notification` event frames.
#[non_exhaustive]
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TradeNotification {
    pub notification_type: String,
    /// `BUY_SELL` or `SELL_BUY`
    pub trade_type: String,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    pub quantity: Decimal,
    pub symbol: String,
}
