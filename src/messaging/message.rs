use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// Describes the operation a unit of work executes.
///
/// The payload itself is the handler at the end of the chain; the message
/// only carries identity and metadata, and is immutable once built.
#[derive(Clone, Debug)]
pub struct Message {
    identifier: Uuid,
    name: String,
    metadata: HashMap<String, String>,
    timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            identifier: Uuid::new_v4(),
            name: name.into(),
            metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn identifier(&self) -> Uuid {
        self.identifier
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
