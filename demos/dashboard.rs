//! Terminal dashboard for one trading bot.
//!
//! Subscribes to a bot's status, open orders and trades plus the global candle stream,
//! logs every update and prints a summary of the cached values on exit.
//!
//! Run against a local backend:
//! ```sh
//! RUST_LOG=info,botfeed=debug cargo run --example dashboard -- 7
//! ```
//!
//! The endpoint comes from `BOTFEED_WS_URL` (default `ws://localhost:8000/ws`).

use std::time::Duration;

use botfeed::Client;
use botfeed::channel::topics;
use botfeed::channel::types::request::IntervalChange;
use botfeed::channel::types::response::{ActiveOrder, BotStatus, Kline, TradeNotification};
use futures::StreamExt as _;
use tokio::time::timeout;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let bot_id: u64 = std::env::args().nth(1).map_or(Ok(1), |arg| arg.parse())?;
    let client = Client::from_env()?;
    info!(endpoint = client.endpoint(), bot_id, "Starting dashboard");

    let mut state = client.state_receiver();
    tokio::spawn(async move {
        while state.changed().await.is_ok() {
            info!(state = ?*state.borrow_and_update(), "Connection state");
        }
    });

    let subscriptions = vec![
        client.subscribe(Some(bot_id), topics::STATUS),
        client.subscribe(Some(bot_id), topics::ACTIVE_ORDERS),
        client.subscribe(Some(bot_id), topics::ALL_TRADES),
        client.subscribe(None, topics::KLINE),
    ];
    client.send(
        &IntervalChange::builder()
            .symbol("BTCUSDT")
            .interval("1m")
            .build(),
    )?;

    let _status = client.on_message(Some(bot_id), topics::STATUS, |value| {
        match value.decode::<BotStatus>() {
            Ok(status) => info!(active = status.is_active(), profit = %status.total_profit_usdt, "Status"),
            Err(e) => warn!(error = %e, "Unexpected status payload"),
        }
    });
    let _orders = client.on_message(Some(bot_id), topics::ACTIVE_ORDERS, |value| {
        match value.decode::<Vec<ActiveOrder>>() {
            Ok(orders) => info!(count = orders.len(), "Active orders"),
            Err(e) => warn!(error = %e, "Unexpected active orders payload"),
        }
    });
    let _notifications = client.on_message(None, topics::NOTIFICATION, |value| {
        if let Ok(trade) = value.decode::<TradeNotification>() {
            info!(
                symbol = %trade.symbol,
                trade_type = %trade.trade_type,
                buy = %trade.buy_price,
                sell = %trade.sell_price,
                "Trade executed"
            );
        }
    });

    let mut candles = Box::pin(client.updates(None, topics::KLINE));
    let mut received = 0;
    while let Ok(Some(value)) = timeout(Duration::from_secs(30), candles.next()).await {
        match value.decode::<Kline>() {
            Ok(kline) => info!(opened_at = ?kline.opened_at(), close = %kline.close, "Candle"),
            Err(e) => warn!(error = %e, "Unexpected candle payload"),
        }
        received += 1;
        if received >= 20 {
            break;
        }
    }

    for subscription in subscriptions {
        let key = subscription.key().clone();
        match client.latest(key.entity, &key.topic) {
            Some(value) => info!(%key, received_at = %value.received_at, "Cached"),
            None => info!(%key, "Nothing received"),
        }
        client.unsubscribe(subscription);
    }

    client.shutdown();
    Ok(())
}
