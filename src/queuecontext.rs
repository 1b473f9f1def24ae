//! Request-scoped context carrying queue metadata.
//!
//! A [`QueueContext`] is passed explicitly alongside each batch call. It may
//! carry a string map of metadata which the producer copies into the headers
//! of every record published for that call. A context without metadata is
//! distinct from one carrying an empty map.

use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct QueueContext {
    metadata: Option<Arc<HashMap<String, String>>>,
}

impl QueueContext {
    /// An empty context with no metadata attached.
    pub fn background() -> Self {
        Self::default()
    }

    /// Returns a copy of this context carrying `metadata`, replacing any
    /// metadata previously attached.
    pub fn with_metadata(&self, metadata: HashMap<String, String>) -> Self {
        Self {
            metadata: Some(Arc::new(metadata)),
        }
    }

    /// The attached metadata, or `None` when none was attached.
    pub fn metadata(&self) -> Option<&HashMap<String, String>> {
        self.metadata.as_deref()
    }
}
