#![allow(dead_code)]

use apm_queue::config::KafkaSettings;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use std::env;

/// Get test Kafka settings from environment variables
pub fn get_test_settings() -> KafkaSettings {
    KafkaSettings {
        brokers: env::var("TEST_KAFKA_BROKERS")
            .unwrap_or_else(|_| "localhost:9092".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect(),
        client_id: Some(format!("apm_queue_test_{}", std::process::id())),
        version: None,
        compression: Vec::new(), // No compression for tests
        sync: true,
        flush_timeout_ms: 5_000,
        probe_timeout_ms: 5_000,
        tls: None,
        sasl: None,
    }
}

/// Unique topic name per test run
pub fn test_topic(name: &str) -> String {
    format!("apm_queue_test_{}_{}", std::process::id(), name)
}

pub fn create_test_consumer(settings: &KafkaSettings, topic: &str) -> StreamConsumer {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", settings.brokers.join(","))
        .set("group.id", format!("test_consumer_{}", std::process::id()))
        .set("auto.offset.reset", "earliest")
        .set("enable.auto.commit", "false")
        .create()
        .expect("Failed to create consumer");

    consumer
        .subscribe(&[topic])
        .expect("Failed to subscribe to topic");

    consumer
}
