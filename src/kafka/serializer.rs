use crate::error::BoxError;
use serde::Serialize;

/// Turns an event into the payload of its record.
pub trait Encoder<E>: Send + Sync {
    fn encode(&self, event: &E) -> Result<Vec<u8>, BoxError>;
}

impl<E, F> Encoder<E> for F
where
    F: Fn(&E) -> Result<Vec<u8>, BoxError> + Send + Sync,
{
    fn encode(&self, event: &E) -> Result<Vec<u8>, BoxError> {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SerializationFormat {
    #[default]
    JsonCompact,
    Json,
}

/// Encodes any `Serialize` event as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder {
    format: SerializationFormat,
}

impl JsonEncoder {
    pub fn new(format: SerializationFormat) -> Self {
        Self { format }
    }

    pub fn serialize<E: Serialize>(&self, event: &E) -> crate::Result<Vec<u8>> {
        let encoded = match self.format {
            SerializationFormat::JsonCompact => serde_json::to_vec(event)?,
            SerializationFormat::Json => serde_json::to_vec_pretty(event)?,
        };
        Ok(encoded)
    }
}

impl<E: Serialize> Encoder<E> for JsonEncoder {
    fn encode(&self, event: &E) -> Result<Vec<u8>, BoxError> {
        Ok(self.serialize(event)?)
    }
}
