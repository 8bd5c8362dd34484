use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::errors::Result;
use super::stream::StreamId;

// ============================================================================
// Event Envelope - Typed Event with Metadata
// ============================================================================
//
// Wraps domain events with the metadata a stream needs: identity, position
// in the stream, correlation. Works with ANY event type.
//
// ============================================================================

/// Generic Event Envelope - wraps any domain event with metadata
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EventEnvelope<E> {
    // Event Identity
    pub event_id: Uuid,
    pub stream_id: StreamId,
    pub sequence_number: u64,

    // Event Type Information
    pub event_type: String,
    pub event_version: i32,

    // Event Payload
    pub event_data: E,

    // Causation & Correlation
    pub causation_id: Option<Uuid>,
    pub correlation_id: Uuid,

    pub timestamp: DateTime<Utc>,
    pub metadata: HashMap<String, String>,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        stream_id: StreamId,
        sequence_number: u64,
        event_type: String,
        event_data: E,
        correlation_id: Uuid,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            stream_id,
            sequence_number,
            event_type,
            event_version: 1,
            event_data,
            causation_id: None,
            correlation_id,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_causation(mut self, causation_id: Uuid) -> Self {
        self.causation_id = Some(causation_id);
        self
    }

    pub fn with_metadata(mut self, key: String, value: String) -> Self {
        self.metadata.insert(key, value);
        self
    }
}

// ============================================================================
// Domain Event Trait
// ============================================================================

/// All events appended through the event store facade implement this trait.
pub trait DomainEvent: Serialize + for<'de> Deserialize<'de> + Clone + Send + Sync {
    fn event_type() -> &'static str where Self: Sized;
    fn event_version() -> i32 where Self: Sized { 1 }
}

// ============================================================================
// Stored Event - what the storage engine keeps
// ============================================================================

/// Engine-level record: envelope metadata plus the JSON-encoded payload.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub stream_id: StreamId,
    pub sequence_number: u64,
    pub event_type: String,
    pub event_version: i32,
    pub payload: String,
    pub causation_id: Option<Uuid>,
    pub correlation_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub metadata: HashMap<String, String>,
}

impl StoredEvent {
    pub fn from_envelope<E: Serialize>(envelope: &EventEnvelope<E>) -> Result<Self> {
        Ok(Self {
            event_id: envelope.event_id,
            stream_id: envelope.stream_id.clone(),
            sequence_number: envelope.sequence_number,
            event_type: envelope.event_type.clone(),
            event_version: envelope.event_version,
            payload: serialize_event(&envelope.event_data)?,
            causation_id: envelope.causation_id,
            correlation_id: envelope.correlation_id,
            timestamp: envelope.timestamp,
            metadata: envelope.metadata.clone(),
        })
    }

    /// Decode the payload back into a typed envelope
    pub fn decode<E: for<'de> Deserialize<'de>>(&self) -> Result<EventEnvelope<E>> {
        Ok(EventEnvelope {
            event_id: self.event_id,
            stream_id: self.stream_id.clone(),
            sequence_number: self.sequence_number,
            event_type: self.event_type.clone(),
            event_version: self.event_version,
            event_data: deserialize_event(&self.payload)?,
            causation_id: self.causation_id,
            correlation_id: self.correlation_id,
            timestamp: self.timestamp,
            metadata: self.metadata.clone(),
        })
    }
}

// ============================================================================
// Event Serialization Helpers
// ============================================================================

pub fn serialize_event<E: Serialize>(event: &E) -> Result<String> {
    Ok(serde_json::to_string(event)?)
}

pub fn deserialize_event<E: for<'de> Deserialize<'de>>(json: &str) -> Result<E> {
    Ok(serde_json::from_str(json)?)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
    struct TestEvent {
        data: String,
    }

    impl DomainEvent for TestEvent {
        fn event_type() -> &'static str { "TestEvent" }
    }

    #[test]
    fn test_event_envelope_creation() {
        let stream_id = StreamId::new("stream-1");
        let correlation_id = Uuid::new_v4();

        let envelope = EventEnvelope::new(
            stream_id.clone(),
            3,
            TestEvent::event_type().to_string(),
            TestEvent { data: "test".to_string() },
            correlation_id,
        );

        assert_eq!(envelope.stream_id, stream_id);
        assert_eq!(envelope.sequence_number, 3);
        assert_eq!(envelope.event_type, "TestEvent");
        assert_eq!(envelope.event_version, 1);
        assert_eq!(envelope.correlation_id, correlation_id);
    }

    #[test]
    fn test_stored_event_decodes_to_same_payload() {
        let causation_id = Uuid::new_v4();
        let envelope = EventEnvelope::new(
            StreamId::new("stream-2"),
            0,
            "TestEvent".to_string(),
            TestEvent { data: "payload".to_string() },
            Uuid::new_v4(),
        )
        .with_causation(causation_id)
        .with_metadata("worker".to_string(), "7".to_string());

        let stored = StoredEvent::from_envelope(&envelope).unwrap();
        assert!(stored.payload.contains("payload"));

        let decoded: EventEnvelope<TestEvent> = stored.decode().unwrap();
        assert_eq!(decoded.event_id, envelope.event_id);
        assert_eq!(decoded.event_data, envelope.event_data);
        assert_eq!(decoded.causation_id, Some(causation_id));
        assert_eq!(decoded.metadata.get("worker").map(String::as_str), Some("7"));
    }

    #[test]
    fn test_decode_rejects_foreign_payload() {
        let mut stored = StoredEvent::from_envelope(&EventEnvelope::new(
            StreamId::new("stream-3"),
            0,
            "TestEvent".to_string(),
            TestEvent { data: "x".to_string() },
            Uuid::new_v4(),
        ))
        .unwrap();
        stored.payload = "[1, 2, 3]".to_string();

        let result = stored.decode::<TestEvent>();
        assert!(matches!(result, Err(crate::errors::Error::Serialization(_))));
    }
}
