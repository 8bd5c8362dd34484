// ============================================================================
// Event Sourcing Core - Event Model
// ============================================================================
//
// Typed events, the stored record the engine keeps, and stream identity.
// Nothing in here knows about transactions or storage.
//
// ============================================================================

pub mod event;
pub mod stream;

pub use event::{DomainEvent, EventEnvelope, StoredEvent, serialize_event, deserialize_event};
pub use stream::StreamId;
