use async_trait::async_trait;

use crate::errors::Result;
use crate::event_sourcing::core::{StoredEvent, StreamId};
use crate::messaging::Transaction;

// ============================================================================
// Event Storage Engine - Boundary Contract
// ============================================================================
//
// Responsibilities:
// 1. Append events to a stream (append-only) inside a transaction
// 2. Read a stream back, including the transaction's own uncommitted writes
// 3. Optimistic concurrency: `expected_next_sequence` must equal the head
//
// A stream's head is the next sequence number to be written, which is the
// number of events it holds. Sequences start at 0.
//
// ============================================================================

#[async_trait]
pub trait EventStorageEngine: Send + Sync {
    type Transaction: Transaction;

    /// Append `events` (already numbered from `expected_next_sequence`).
    /// Returns the new head.
    async fn append(
        &self,
        transaction: &mut Self::Transaction,
        stream_id: &StreamId,
        expected_next_sequence: u64,
        events: Vec<StoredEvent>,
    ) -> Result<u64>;

    /// At most `max_count` events with sequence >= `from_sequence`, ascending
    async fn read(
        &self,
        transaction: &Self::Transaction,
        stream_id: &StreamId,
        from_sequence: u64,
        max_count: usize,
    ) -> Result<Vec<StoredEvent>>;

    async fn head(&self, transaction: &Self::Transaction, stream_id: &StreamId) -> Result<u64>;

    /// Drop every stream. Used to prepare a clean benchmark run.
    async fn purge(&self) -> Result<()>;
}
