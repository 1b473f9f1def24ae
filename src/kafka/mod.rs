pub mod client;
pub mod key_strategy;
pub mod mutator;
pub mod producer;
pub mod record;
pub mod serializer;
pub mod topic;


pub use client::{BrokerClient, Delivery, DeliveryCallback, KafkaClient};
pub use key_strategy::KeyStrategy;
pub use mutator::{RecordMutator, Timestamp};
pub use producer::{Producer, ProducerConfig};
pub use record::{headers_from_context, Headers, Record, RecordHeader};
pub use serializer::{Encoder, JsonEncoder, SerializationFormat};
pub use topic::{StaticRouter, Topic, TopicRouter};
