#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]

use std::sync::Arc;
use std::time::Duration;

use botfeed::channel::{Engine, MessageRouter, SubscriptionKey, topics};
use botfeed::ws::config::{Config, ReconnectConfig};
use botfeed::ws::{Action, ConnectionState};
use serde_json::{Value, json};

fn config(max_attempts: u32) -> Config {
    Config::builder()
        .reconnect(
            ReconnectConfig::builder()
                .max_attempts(max_attempts)
                .initial_backoff(Duration::from_secs(1))
                .max_backoff(Duration::from_secs(60))
                .build(),
        )
        .build()
}

fn engine() -> Engine {
    Engine::new(&config(5), Arc::new(MessageRouter::new()))
}

fn drain(engine: &mut Engine) -> Vec<Action> {
    std::iter::from_fn(|| engine.poll_action()).collect()
}

/// Every frame the engine wants written, parsed as JSON.
fn sent(engine: &mut Engine) -> Vec<Value> {
    drain(engine)
        .into_iter()
        .filter_map(|action| match action {
            Action::Send(text) => Some(serde_json::from_str(&text).unwrap()),
            _ => None,
        })
        .collect()
}

/// Delay of the only action queued, if it is a retry.
fn retry_delay_ms(engine: &mut Engine) -> Option<u128> {
    match drain(engine).as_slice() {
        [Action::ScheduleRetry(delay)] => Some(delay.as_millis()),
        _ => None,
    }
}

fn open(engine: &mut Engine) {
    engine.connect();
    assert_eq!(drain(engine), vec![Action::Open]);
    engine.on_open();
}

fn control(action: &str, bot_id: u64, topic: &str) -> Value {
    json!({ "action": action, "bot_id": bot_id, "type": topic })
}

mod reference_counting {
    use super::*;

    #[test]
    fn wire_frames_only_on_edge_transitions() {
        let mut engine = engine();
        open(&mut engine);
        let key = SubscriptionKey::entity(1, topics::STATUS);

        engine.subscribe(key.clone());
        engine.subscribe(key.clone());
        engine.subscribe(key.clone());
        assert_eq!(sent(&mut engine), vec![control("subscribe", 1, "status")]);
        assert_eq!(engine.subscription_count(&key), 3);

        engine.unsubscribe(&key);
        engine.unsubscribe(&key);
        assert!(sent(&mut engine).is_empty());

        engine.unsubscribe(&key);
        assert_eq!(sent(&mut engine), vec![control("unsubscribe", 1, "status")]);

        engine.unsubscribe(&key);
        assert!(sent(&mut engine).is_empty());
        assert_eq!(engine.subscription_count(&key), 0);
    }

    #[test]
    fn interleavings_clamp_at_zero() {
        let key = SubscriptionKey::global(topics::KLINE);
        // `true` subscribes, `false` unsubscribes
        let sequences: [&[bool]; 4] = [
            &[true, false, true, false],
            &[false, false, true, true, false],
            &[true, true, false, true, false, false, false],
            &[false, true, false, false, true],
        ];

        for sequence in sequences {
            let mut engine = engine();
            open(&mut engine);

            let mut expected = 0_usize;
            let mut wire = Vec::new();
            for &subscribe in sequence {
                if subscribe {
                    expected += 1;
                    engine.subscribe(key.clone());
                    if expected == 1 {
                        wire.push("subscribe");
                    }
                } else if expected > 0 {
                    expected -= 1;
                    engine.unsubscribe(&key);
                    if expected == 0 {
                        wire.push("unsubscribe");
                    }
                } else {
                    engine.unsubscribe(&key);
                }
            }

            let actions: Vec<String> = sent(&mut engine)
                .into_iter()
                .map(|frame| frame["action"].as_str().unwrap().to_owned())
                .collect();
            assert_eq!(actions, wire, "sequence {sequence:?}");
            assert_eq!(engine.subscription_count(&key), expected);
        }
    }

    #[test]
    fn subscriptions_while_disconnected_are_not_sent() {
        let mut engine = engine();
        engine.subscribe(SubscriptionKey::entity(1, topics::STATUS));
        engine.unsubscribe(&SubscriptionKey::entity(1, topics::STATUS));
        engine.subscribe(SubscriptionKey::entity(2, topics::STATUS));

        assert!(drain(&mut engine).is_empty());
        assert_eq!(
            engine.desired_set(),
            vec![SubscriptionKey::entity(2, topics::STATUS)]
        );
    }
}

mod replay {
    use super::*;

    #[test]
    fn reconnect_replays_desired_set_in_order_before_queued_frames() {
        let mut engine = engine();
        open(&mut engine);

        engine.subscribe(SubscriptionKey::entity(3, topics::STATUS));
        engine.subscribe(SubscriptionKey::global(topics::KLINE));
        engine.subscribe(SubscriptionKey::entity(1, topics::ACTIVE_ORDERS));
        drain(&mut engine);

        engine.on_close();
        assert_eq!(retry_delay_ms(&mut engine), Some(1000));

        engine.send(json!({ "n": 1 }).to_string());
        engine.send(json!({ "n": 2 }).to_string());
        engine.send(json!({ "n": 3 }).to_string());
        assert_eq!(engine.queued(), 3);

        engine.on_retry_elapsed();
        assert_eq!(drain(&mut engine), vec![Action::Open]);
        engine.on_open();

        assert_eq!(
            sent(&mut engine),
            vec![
                control("subscribe", 3, "status"),
                json!({ "action": "subscribe", "type": "kline" }),
                control("subscribe", 1, "active_orders"),
                json!({ "n": 1 }),
                json!({ "n": 2 }),
                json!({ "n": 3 }),
            ]
        );
        assert_eq!(engine.queued(), 0);
    }

    #[test]
    fn released_keys_are_not_replayed() {
        let mut engine = engine();
        open(&mut engine);
        let kept = SubscriptionKey::entity(1, topics::STATUS);
        let released = SubscriptionKey::entity(2, topics::STATUS);
        engine.subscribe(kept.clone());
        engine.subscribe(released.clone());
        engine.on_close();

        engine.unsubscribe(&released);
        drain(&mut engine);

        engine.on_retry_elapsed();
        drain(&mut engine);
        engine.on_open();
        assert_eq!(sent(&mut engine), vec![control("subscribe", 1, "status")]);
    }

    #[test]
    fn queue_survives_failed_attempts() {
        let mut engine = engine();
        engine.connect();
        engine.send("first".to_owned());
        engine.on_close();
        engine.send("second".to_owned());
        engine.on_retry_elapsed();
        engine.on_close();
        drain(&mut engine);
        assert_eq!(engine.queued(), 2);

        engine.on_retry_elapsed();
        drain(&mut engine);
        engine.on_open();
        assert_eq!(
            drain(&mut engine),
            vec![
                Action::Send("first".to_owned()),
                Action::Send("second".to_owned())
            ]
        );
    }

    #[test]
    fn pending_writes_are_dropped_on_close() {
        let mut engine = engine();
        open(&mut engine);
        engine.send("lost".to_owned());

        engine.on_close();
        assert_eq!(retry_delay_ms(&mut engine), Some(1000));
        assert_eq!(engine.queued(), 0);
    }

    #[test]
    fn send_while_open_goes_straight_out() {
        let mut engine = engine();
        open(&mut engine);

        engine.send("now".to_owned());
        assert_eq!(drain(&mut engine), vec![Action::Send("now".to_owned())]);
        assert_eq!(engine.queued(), 0);
    }
}

mod retries {
    use super::*;

    #[test]
    fn delays_double_until_failed() {
        let mut engine = Engine::new(&config(5), Arc::new(MessageRouter::new()));
        engine.connect();
        drain(&mut engine);

        let mut delays = Vec::new();
        for _ in 0..5 {
            engine.on_close();
            delays.push(retry_delay_ms(&mut engine).unwrap());
            engine.on_retry_elapsed();
            assert_eq!(drain(&mut engine), vec![Action::Open]);
        }
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);

        engine.on_close();
        assert!(drain(&mut engine).is_empty());
        assert_eq!(engine.state(), ConnectionState::Failed);

        engine.on_retry_elapsed();
        engine.connect();
        assert!(drain(&mut engine).is_empty());
    }

    #[test]
    fn delays_are_capped() {
        let config = Config::builder()
            .reconnect(
                ReconnectConfig::builder()
                    .max_attempts(5)
                    .initial_backoff(Duration::from_secs(1))
                    .max_backoff(Duration::from_secs(5))
                    .build(),
            )
            .build();
        let mut engine = Engine::new(&config, Arc::new(MessageRouter::new()));
        engine.connect();

        let mut delays = Vec::new();
        for _ in 0..5 {
            engine.on_close();
            for action in drain(&mut engine) {
                if let Action::ScheduleRetry(delay) = action {
                    delays.push(delay.as_millis());
                }
            }
            engine.on_retry_elapsed();
        }
        assert_eq!(delays, vec![1000, 2000, 4000, 5000, 5000]);
    }

    #[test]
    fn reset_recovers_from_failed() {
        let mut engine = Engine::new(&config(0), Arc::new(MessageRouter::new()));
        engine.subscribe(SubscriptionKey::entity(9, topics::STATUS));
        engine.connect();
        engine.on_close();
        drain(&mut engine);
        assert!(engine.state().is_failed());

        engine.reset();
        assert_eq!(drain(&mut engine), vec![Action::CancelRetry, Action::Open]);
        engine.on_open();
        assert_eq!(sent(&mut engine), vec![control("subscribe", 9, "status")]);
    }

    #[test]
    fn reset_while_open_does_nothing() {
        let mut engine = engine();
        open(&mut engine);

        engine.reset();
        assert!(drain(&mut engine).is_empty());
        assert!(engine.state().is_open());
    }

    #[test]
    fn teardown_stops_reconnecting() {
        let mut engine = engine();
        open(&mut engine);
        engine.send("unsent".to_owned());

        engine.teardown();
        assert_eq!(drain(&mut engine), vec![Action::CancelRetry, Action::Close]);
        assert!(engine.is_torn_down());

        engine.on_close();
        engine.on_retry_elapsed();
        engine.connect();
        assert!(drain(&mut engine).is_empty());
        assert_eq!(engine.state(), ConnectionState::Idle);
    }
}

mod cache {
    use super::*;

    fn push(engine: &mut Engine, frame: &Value) {
        engine.on_frame(frame.to_string().as_bytes());
    }

    #[test]
    fn latest_is_last_delivered_frame() {
        let mut engine = engine();
        open(&mut engine);
        let key = SubscriptionKey::entity(42, topics::STATUS);

        push(&mut engine, &json!({ "type": "status_update", "bot_id": 42, "data": { "seq": 1 } }));
        push(&mut engine, &json!({ "type": "status_update", "bot_id": 42, "data": { "seq": 2 } }));
        push(&mut engine, &json!({ "type": "status_update", "bot_id": 41, "data": { "seq": 3 } }));

        let latest = engine.router().latest(&key).unwrap();
        assert_eq!(latest.body, json!({ "seq": 2 }));
    }

    #[test]
    fn malformed_frames_leave_cache_and_connection_alone() {
        let mut engine = engine();
        open(&mut engine);

        engine.on_frame(b"{not json");
        engine.on_frame(b"42");
        engine.on_frame(br#"{"bot_id": 1}"#);
        engine.on_frame(br#"{"type": "", "bot_id": 1}"#);

        assert_eq!(engine.router().cached_len(), 0);
        assert!(drain(&mut engine).is_empty());
        assert!(engine.state().is_open());
    }

    #[test]
    fn malformed_batch_element_does_not_drop_its_siblings() {
        let mut engine = engine();
        open(&mut engine);

        engine.on_frame(
            br#"[{"type":"status_update","bot_id":1,"data":{"ok":true}},{"bot_id":2},{"type":"status_update","bot_id":3,"data":{"ok":false}}]"#,
        );

        let first = engine.router().latest(&SubscriptionKey::entity(1, topics::STATUS));
        assert_eq!(first.unwrap().body, json!({ "ok": true }));
        let last = engine.router().latest(&SubscriptionKey::entity(3, topics::STATUS));
        assert_eq!(last.unwrap().body, json!({ "ok": false }));
        assert_eq!(engine.router().cached_len(), 2);
        assert!(engine.state().is_open());
    }

    #[test]
    fn eviction_is_opt_in() {
        let key = SubscriptionKey::entity(5, topics::ALL_TRADES);
        let frame = json!({ "type": "all_trades_data", "bot_id": 5, "payload": [] });

        let mut lazy = engine();
        open(&mut lazy);
        lazy.subscribe(key.clone());
        push(&mut lazy, &frame);
        lazy.unsubscribe(&key);
        assert!(lazy.router().latest(&key).is_some());

        let config = Config::builder().evict_on_unsubscribe(true).build();
        let mut eager = Engine::new(&config, Arc::new(MessageRouter::new()));
        open(&mut eager);
        eager.subscribe(key.clone());
        push(&mut eager, &frame);
        eager.unsubscribe(&key);
        assert!(eager.router().latest(&key).is_none());
    }
}

#[test]
fn active_orders_survive_flaky_connect_and_unsubscribe() {
    let mut engine = engine();
    let key = SubscriptionKey::entity(7, topics::ACTIVE_ORDERS);
    engine.subscribe(key.clone());

    engine.connect();
    assert_eq!(drain(&mut engine), vec![Action::Open]);
    for _ in 0..2 {
        engine.on_close();
        assert!(retry_delay_ms(&mut engine).is_some());
        engine.on_retry_elapsed();
        assert_eq!(drain(&mut engine), vec![Action::Open]);
    }
    engine.on_open();
    assert_eq!(
        sent(&mut engine),
        vec![control("subscribe", 7, "active_orders")]
    );

    let payload = json!([{ "order_id": "A1", "order_type": "buy", "price": 100, "quantity": 1 }]);
    engine.on_frame(
        json!({ "type": "active_orders_data", "bot_id": 7, "payload": payload })
            .to_string()
            .as_bytes(),
    );
    assert_eq!(engine.router().latest(&key).unwrap().body, payload);

    engine.unsubscribe(&key);
    let later = json!([{ "order_id": "A2", "order_type": "sell", "price": 110, "quantity": 1 }]);
    engine.on_frame(
        json!({ "type": "active_orders_data", "bot_id": 7, "payload": later })
            .to_string()
            .as_bytes(),
    );
    assert_eq!(engine.router().latest(&key).unwrap().body, later);

    engine.unsubscribe(&key);
    assert_eq!(
        sent(&mut engine),
        vec![control("unsubscribe", 7, "active_orders")]
    );
}
