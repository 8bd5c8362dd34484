// ============================================================================
// Event Sourcing Store - Persistence Layer
// ============================================================================
//
// The storage engine contract, the in-memory engine, and the facade that
// business code uses from inside a unit of work.
//
// ============================================================================

pub mod engine;
pub mod event_store;
pub mod memory;

pub use engine::EventStorageEngine;
pub use event_store::{EventBatch, EventStore};
pub use memory::{InMemoryEventStorageEngine, InMemoryTransaction};
