use crate::broker::Broker;
use crate::config::BrokerSettings;
use crate::transport::message::ServerMessage;
use crate::transport::websocket::{ACCEPT_BACKOFF, bind, handle_request, serve};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tungstenite::protocol::Message as WsMessage;

#[tokio::test]
async fn test_handle_publish() {
    let broker = Arc::new(Broker::default());
    let msg = json!({
        "type": "publish",
        "topic": "sensor_data",
        "payload": { "sensor_id": "S1", "timestamp": "2025-01-01T00:00:00Z" }
    })
    .to_string();

    let response = handle_request(&broker, &msg).await;
    assert_eq!(
        response,
        ServerMessage::Published {
            topic: "sensor_data".to_string(),
            accepted: true
        }
    );

    let consumed = broker.consume("sensor_data", Duration::from_millis(10)).unwrap();
    assert_eq!(consumed.payload["sensor_id"], "S1");
}

#[tokio::test]
async fn test_handle_publish_to_full_topic() {
    let broker = Arc::new(Broker::with_settings(&BrokerSettings {
        topic_capacity: 1,
        publish_timeout_ms: 10,
        subscriber_poll_ms: 20,
    }));
    let msg = json!({ "type": "publish", "topic": "t", "payload": 1 }).to_string();

    assert!(matches!(
        handle_request(&broker, &msg).await,
        ServerMessage::Published { accepted: true, .. }
    ));
    assert!(matches!(
        handle_request(&broker, &msg).await,
        ServerMessage::Published { accepted: false, .. }
    ));
}

#[tokio::test]
async fn test_handle_stats() {
    let broker = Arc::new(Broker::default());
    broker.publish("a", json!(1));
    broker.create_topic("b");

    match handle_request(&broker, r#"{"type":"stats"}"#).await {
        ServerMessage::Stats { topics } => {
            assert_eq!(topics["a"].pending, 1);
            assert_eq!(topics["b"].pending, 0);
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn test_handle_invalid_message() {
    let broker = Arc::new(Broker::default());
    let response = handle_request(&broker, r#"{"type":"subscribe","topic":"x"}"#).await;
    assert!(matches!(response, ServerMessage::Error { .. }));

    let response = handle_request(&broker, "not json").await;
    assert!(matches!(response, ServerMessage::Error { .. }));
}

#[tokio::test]
async fn test_ingest_end_to_end() {
    let broker = Arc::new(Broker::default());
    let listener = bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, Arc::clone(&broker)));

    let (mut ws, _) = connect_async(format!("ws://{addr}")).await.expect("connect");

    let publish = json!({
        "type": "publish",
        "topic": "sensor_data",
        "payload": { "sensor_id": "WS_CAI_001", "timestamp": "2025-01-01T00:00:00Z", "temperature": 20.0 }
    })
    .to_string();
    ws.send(WsMessage::text(publish)).await.unwrap();

    match ws.next().await {
        Some(Ok(WsMessage::Text(text))) => {
            let parsed: ServerMessage = serde_json::from_str(text.as_str()).unwrap();
            assert_eq!(
                parsed,
                ServerMessage::Published {
                    topic: "sensor_data".to_string(),
                    accepted: true
                }
            );
        }
        other => panic!("expected a text response, got {other:?}"),
    }

    ws.send(WsMessage::text(r#"{"type":"stats"}"#)).await.unwrap();
    match ws.next().await {
        Some(Ok(WsMessage::Text(text))) => {
            let parsed: ServerMessage = serde_json::from_str(text.as_str()).unwrap();
            match parsed {
                ServerMessage::Stats { topics } => assert_eq!(topics["sensor_data"].pending, 1),
                other => panic!("unexpected response: {other:?}"),
            }
        }
        other => panic!("expected a text response, got {other:?}"),
    }
}

#[tokio::test]
async fn test_bind_failure_is_reported() {
    let first = bind("127.0.0.1:0").await.unwrap();
    let addr = first.local_addr().unwrap().to_string();
    assert!(bind(&addr).await.is_err());
}

#[test]
fn test_accept_backoff_is_short_but_nonzero() {
    assert!(ACCEPT_BACKOFF > Duration::ZERO);
    assert!(ACCEPT_BACKOFF <= Duration::from_secs(1));
}
