//! Batch event publisher for Kafka.
//!
//! A [`Producer`] takes an ordered batch of events, routes each one to a
//! topic, runs the configured [`RecordMutator`] chain, encodes it and
//! submits it as an independent record. Batches are published either
//! synchronously (wait for every acknowledgment) or asynchronously (return
//! once handed off, log failures as they arrive).
//!
//! ```rust,no_run
//! use apm_queue::kafka::{JsonEncoder, Producer, ProducerConfig, StaticRouter};
//! use apm_queue::QueueContext;
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! # async fn run() -> apm_queue::Result<()> {
//! let producer = Producer::new(ProducerConfig::<serde_json::Value> {
//!     brokers: vec!["localhost:9092".to_string()],
//!     logger: Some(tracing::Dispatch::none()),
//!     encoder: Some(Arc::new(JsonEncoder::default())),
//!     topic_router: Some(Arc::new(StaticRouter::new("apm-events"))),
//!     sync: true,
//!     ..Default::default()
//! })?;
//!
//! let ctx = QueueContext::background()
//!     .with_metadata(HashMap::from([("project".to_string(), "checkout".to_string())]));
//! producer
//!     .process_batch(&ctx, &[serde_json::json!({"transaction": {"id": "1"}})])
//!     .await?;
//! producer.close().await
//! # }
//! ```

pub mod config;
pub mod error;
pub mod queuecontext;

pub mod kafka;

pub use crate::config::Config;
pub use error::{BoxError, ConfigErrors, Error, Result};
pub use kafka::{Producer, ProducerConfig, Record, RecordMutator};
pub use queuecontext::QueueContext;
