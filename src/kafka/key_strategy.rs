use super::mutator::RecordMutator;
use super::record::Record;
use crate::error::BoxError;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Sets the record key from fields of the event's JSON representation.
///
/// Records sharing a key land on the same partition. When a field is missing
/// the key is left unset and the client picks the partition.
#[derive(Debug, Clone, Default)]
pub enum KeyStrategy {
    /// Dot-separated path, e.g. `service.name`.
    FieldPath(String),
    /// Several paths joined with `:`.
    Composite(Vec<String>),
    #[default]
    None,
}

impl KeyStrategy {
    pub fn extract_key(&self, event: &Value) -> Option<String> {
        match self {
            KeyStrategy::FieldPath(path) => extract_field_value(event, path),
            KeyStrategy::Composite(fields) => extract_composite_key(event, fields),
            KeyStrategy::None => None,
        }
    }
}

impl<E: Serialize> RecordMutator<E> for KeyStrategy {
    fn mutate(&self, event: &E, record: &mut Record) -> Result<(), BoxError> {
        if matches!(self, KeyStrategy::None) {
            return Ok(());
        }
        let value = serde_json::to_value(event)?;
        if let Some(key) = self.extract_key(&value) {
            record.key = Some(key.into_bytes());
        }
        Ok(())
    }
}

fn extract_field_value(record: &Value, field_path: &str) -> Option<String> {
    let mut current = record;

    for part in field_path.split('.') {
        match current.get(part) {
            Some(value) => current = value,
            None => {
                debug!("Field '{}' not found in event", part);
                return None;
            }
        }
    }

    match current {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => None,
        _ => Some(current.to_string()),
    }
}

fn extract_composite_key(record: &Value, fields: &[String]) -> Option<String> {
    let mut key_parts = Vec::with_capacity(fields.len());

    for field in fields {
        match extract_field_value(record, field) {
            Some(value) => key_parts.push(value),
            None => {
                debug!("Missing field '{}' for composite key", field);
                return None;
            }
        }
    }

    if key_parts.is_empty() {
        None
    } else {
        Some(key_parts.join(":"))
    }
}
