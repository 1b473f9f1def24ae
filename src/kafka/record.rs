use crate::queuecontext::QueueContext;
use std::fmt;
use std::sync::Arc;

/// A single header attached to a published record.
#[derive(Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub key: String,
    pub value: Vec<u8>,
}

impl fmt::Debug for RecordHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, String::from_utf8_lossy(&self.value))
    }
}

/// Headers shared by every record built from the same batch.
pub type Headers = Arc<[RecordHeader]>;

/// Builds the headers for one batch from the context metadata.
///
/// Headers are sorted by key. A context without metadata yields no headers.
pub fn headers_from_context(ctx: &QueueContext) -> Headers {
    let Some(metadata) = ctx.metadata() else {
        return Arc::from(Vec::new());
    };

    let mut headers: Vec<RecordHeader> = metadata
        .iter()
        .map(|(key, value)| RecordHeader {
            key: key.clone(),
            value: value.as_bytes().to_vec(),
        })
        .collect();
    headers.sort_by(|a, b| a.key.cmp(&b.key));
    Arc::from(headers)
}

/// The in-flight record derived from one event.
///
/// The topic is set from routing, mutators may then adjust any field, and
/// the value is filled in by the encoder right before submission.
#[derive(Debug, Clone)]
pub struct Record {
    pub topic: String,
    pub headers: Headers,
    pub key: Option<Vec<u8>>,
    pub partition: Option<i32>,
    /// Milliseconds since the Unix epoch; the client assigns one when unset.
    pub timestamp: Option<i64>,
    pub value: Vec<u8>,
}

impl Record {
    pub fn new(topic: impl Into<String>, headers: Headers) -> Self {
        Self {
            topic: topic.into(),
            headers,
            key: None,
            partition: None,
            timestamp: None,
            value: Vec::new(),
        }
    }
}
