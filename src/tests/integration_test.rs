use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::json;

use crate::broker::Broker;
use crate::config::{BrokerSettings, ConsumerSettings};
use crate::consumer::{ConsumerState, StreamingConsumer};
use crate::persistence::{PersistenceSink, SledSink};
use crate::rules::RuleEngine;
use crate::simulator::SensorSimulator;

fn consumer_settings() -> ConsumerSettings {
    ConsumerSettings {
        topic: "sensor_data".to_string(),
        poll_timeout_ms: 50,
        status_every: 25,
    }
}

fn wait_for(mut done: impl FnMut() -> bool, limit: Duration) {
    let deadline = Instant::now() + limit;
    while !done() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn integration_hundred_readings_end_to_end() {
    crate::utils::logging::init("warn");

    let broker = Arc::new(Broker::default());
    let sink = Arc::new(SledSink::temporary().unwrap());
    let consumer = Arc::new(StreamingConsumer::new(
        Arc::clone(&broker),
        Arc::clone(&sink) as Arc<dyn PersistenceSink>,
        RuleEngine::default(),
        &consumer_settings(),
    ));
    let worker = Arc::clone(&consumer).spawn().unwrap();

    let producer_broker = Arc::clone(&broker);
    let producer = thread::spawn(move || {
        let mut accepted = 0;
        for i in 0..100 {
            // every tenth envelope lacks its sensor id
            let sensor_id = if i % 10 == 9 { None } else { Some(format!("WS_{:03}", i % 4)) };
            let payload = json!({
                "sensor_id": sensor_id,
                "timestamp": format!("2025-05-05T10:{:02}:{:02}Z", i / 60, i % 60),
                "value": { "temperature": 20.0 + i as f64 * 0.25, "humidity": 50.0 }
            });
            if producer_broker.publish("sensor_data", payload) {
                accepted += 1;
            }
        }
        accepted
    });

    let accepted = producer.join().unwrap();
    wait_for(|| consumer.counters().processed >= accepted as u64, Duration::from_secs(10));
    consumer.stop();
    let counters = worker.join().unwrap().unwrap();

    assert_eq!(consumer.state(), ConsumerState::Stopped);
    assert!(counters.processed <= 100);
    assert_eq!(counters.processed, accepted as u64);
    assert_eq!(counters.processed, counters.persisted + counters.discarded_malformed);
    assert_eq!(counters.discarded_malformed, 10);
    assert_eq!(counters.persist_failures, 0);

    // temperatures above 40.0 start at i = 81; i = 89 and 99 are malformed
    assert_eq!(counters.alerts, 17);
    assert_eq!(sink.reading_count().unwrap() as u64, counters.persisted);
    assert_eq!(sink.alert_count().unwrap() as u64, counters.alerts);
    assert_eq!(broker.get_stats()["sensor_data"].pending, 0);
}

#[test]
fn integration_slow_consumer_causes_drops() {
    let broker = Arc::new(Broker::with_settings(&BrokerSettings {
        topic_capacity: 10,
        publish_timeout_ms: 20,
        subscriber_poll_ms: 20,
    }));
    let mut simulator = SensorSimulator::with_fleet(3, 42);

    // nobody consumes yet
    let report = simulator.publish_batch(&broker, "sensor_data", 25);
    assert_eq!(report.accepted, 10);
    assert_eq!(report.dropped, 15);

    let sink = Arc::new(SledSink::temporary().unwrap());
    let consumer = Arc::new(StreamingConsumer::new(
        Arc::clone(&broker),
        Arc::clone(&sink) as Arc<dyn PersistenceSink>,
        RuleEngine::default(),
        &consumer_settings(),
    ));
    let worker = Arc::clone(&consumer).spawn().unwrap();
    wait_for(|| consumer.counters().processed >= 10, Duration::from_secs(5));
    consumer.stop();
    let counters = worker.join().unwrap().unwrap();

    assert_eq!(counters.processed, 10);
    assert_eq!(counters.persisted, 10);
    assert_eq!(sink.reading_count().unwrap(), 10);
}
