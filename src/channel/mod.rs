//! Real-time channel to the trading-bot backend.
//!
//! One multiplexed WebSocket carries every `(bot, topic)` stream. The channel keeps
//! the set of desired subscriptions across disconnects, replays it on every
//! reconnection, buffers outbound frames while the socket is down and caches the
//! latest value received for every key.
//!
//! # Layers
//!
//! - [`SubscriptionRegistry`]: reference-counted interests, in insertion order
//! - [`OutboundQueue`]: FIFO of frames sent while not connected
//! - [`MessageRouter`]: last-value cache and listeners per key
//! - [`Engine`]: the above plus [`crate::ws::Connection`], driven by events
//! - [`Client`]: cloneable facade running the engine on a background task
//!
//! # Example
//!
//! ```rust, no_run
//! use botfeed::channel::{Client, topics};
//! use botfeed::channel::types::response::BotStatus;
//! use futures::StreamExt as _;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Client::from_env()?;
//!     let _status = client.subscribe(Some(7), topics::STATUS);
//!
//!     let mut updates = Box::pin(client.updates(Some(7), topics::STATUS));
//!     while let Some(value) = updates.next().await {
//!         let status: BotStatus = value.decode()?;
//!         println!("bot 7 active: {}", status.is_active());
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub(crate) mod driver;
pub mod engine;
pub mod queue;
pub mod registry;
pub mod router;
pub mod types;

/// Topic names the backend publishes.
///
/// Per-bot topics take the bot id as entity; market topics are global.
pub mod topics {
    /// Bot status (`status_update`), per bot
    pub const STATUS: &str = "status";
    /// Bot status snapshot (`bot_status_data`), per bot
    pub const BOT_STATUS: &str = "bot_status";
    /// Open orders (`active_orders_data`), per bot
    pub const ACTIVE_ORDERS: &str = "active_orders";
    /// Filled and cancelled orders (`order_history_data`), per bot
    pub const ORDER_HISTORY: &str = "order_history";
    /// Executed trades (`all_trades_data`), per bot
    pub const ALL_TRADES: &str = "all_trades";
    /// Live candles (`kline_data`)
    pub const KLINE: &str = "kline";
    /// Candle backfill (`historical_kline_data`)
    pub const HISTORICAL_KLINE: &str = "historical_kline";
    /// Candle updates from the chart stream (`candlestick_update`)
    pub const CANDLESTICK: &str = "candlestick";
    /// Last traded price (`price_data`)
    pub const PRICE: &str = "price";
    /// Trade notifications (`notification` event)
    pub const NOTIFICATION: &str = "notification";
}

pub use client::{Client, Subscription};
pub use engine::Engine;
pub use queue::OutboundQueue;
pub use registry::SubscriptionRegistry;
pub use router::{CachedValue, Listener, ListenerHandle, MessageRouter};
pub use types::SubscriptionKey;
pub use types::request::{ChangeInterval, ControlFrame, IntervalChange, SubscriptionAction};
pub use types::response::{FrameKind, InboundFrame};
