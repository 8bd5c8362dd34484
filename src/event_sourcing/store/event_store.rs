use std::sync::Arc;

use crate::errors::{Error, Result};
use crate::event_sourcing::core::{DomainEvent, EventEnvelope, StoredEvent, StreamId};
use crate::messaging::UnitOfWork;
use super::engine::EventStorageEngine;

// ============================================================================
// Event Store Facade
// ============================================================================
//
// What business code inside a unit of work talks to.
//
// Responsibilities:
// 1. Wrap typed events in envelopes and number them
// 2. Join the transaction bound to the unit of work
// 3. Hand append/read to the storage engine
//
// Reads go through the same transaction as appends, so a read right after
// an append sees the appended events before commit.
//
// ============================================================================

pub struct EventStore<S: EventStorageEngine> {
    engine: Arc<S>,
}

impl<S: EventStorageEngine> Clone for EventStore<S> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
        }
    }
}

impl<S: EventStorageEngine> EventStore<S> {
    pub fn new(engine: Arc<S>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<S> {
        &self.engine
    }

    /// Append events starting at `expected_next_sequence`.
    /// Returns the new head of the stream.
    pub async fn append<E: DomainEvent>(
        &self,
        uow: &mut UnitOfWork<S::Transaction>,
        stream_id: &StreamId,
        expected_next_sequence: u64,
        events: Vec<E>,
    ) -> Result<u64> {
        if events.is_empty() {
            return Err(Error::InvalidArgument("cannot append an empty event list".to_string()));
        }

        let correlation_id = uow.message().identifier();
        let event_count = events.len();
        let transaction = uow.transaction_mut().ok_or(Error::NoTransaction)?;

        // Numbering past u64::MAX: a stale sequence is still a conflict
        if expected_next_sequence.checked_add(event_count as u64).is_none() {
            let head = self.engine.head(transaction, stream_id).await?;
            if head != expected_next_sequence {
                return Err(Error::ConcurrencyConflict {
                    stream_id: stream_id.to_string(),
                    expected: expected_next_sequence,
                    actual: head,
                });
            }
            return Err(Error::InvalidArgument(format!(
                "{} events from sequence {} overflow stream {}",
                event_count, expected_next_sequence, stream_id
            )));
        }

        let stored = events
            .into_iter()
            .enumerate()
            .map(|(offset, event)| {
                let mut envelope = EventEnvelope::new(
                    stream_id.clone(),
                    expected_next_sequence + offset as u64,
                    E::event_type().to_string(),
                    event,
                    correlation_id,
                );
                envelope.event_version = E::event_version();
                StoredEvent::from_envelope(&envelope)
            })
            .collect::<Result<Vec<_>>>()?;

        let new_head = self
            .engine
            .append(transaction, stream_id, expected_next_sequence, stored)
            .await?;

        tracing::debug!(
            stream_id = %stream_id,
            from_sequence = expected_next_sequence,
            new_head = new_head,
            event_count = event_count,
            "Appended events"
        );

        Ok(new_head)
    }

    /// Read at most `max_count` events from `from_sequence` on, in order
    pub async fn read_batch(
        &self,
        uow: &UnitOfWork<S::Transaction>,
        stream_id: &StreamId,
        from_sequence: u64,
        max_count: usize,
    ) -> Result<EventBatch> {
        let transaction = uow.transaction().ok_or(Error::NoTransaction)?;
        let events = self
            .engine
            .read(transaction, stream_id, from_sequence, max_count)
            .await?;

        tracing::debug!(
            stream_id = %stream_id,
            from_sequence = from_sequence,
            event_count = events.len(),
            "Loaded event batch"
        );

        Ok(EventBatch {
            stream_id: stream_id.clone(),
            events,
        })
    }

    /// Next sequence to write, as seen by the bound transaction
    pub async fn head(&self, uow: &UnitOfWork<S::Transaction>, stream_id: &StreamId) -> Result<u64> {
        let transaction = uow.transaction().ok_or(Error::NoTransaction)?;
        self.engine.head(transaction, stream_id).await
    }
}

// ============================================================================
// Event Batch
// ============================================================================

/// A bounded, ordered slice of one stream.
///
/// Iteration borrows the batch, so it can be walked any number of times;
/// payloads are only decoded as the iterator advances.
#[derive(Debug, Clone)]
pub struct EventBatch {
    stream_id: StreamId,
    events: Vec<StoredEvent>,
}

impl EventBatch {
    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StoredEvent> {
        self.events.iter()
    }

    pub fn sequence_numbers(&self) -> impl Iterator<Item = u64> + '_ {
        self.events.iter().map(|event| event.sequence_number)
    }

    pub fn decoded<'a, E: DomainEvent + 'a>(&'a self) -> impl Iterator<Item = Result<EventEnvelope<E>>> + 'a {
        self.events.iter().map(StoredEvent::decode::<E>)
    }
}

impl<'a> IntoIterator for &'a EventBatch {
    type Item = &'a StoredEvent;
    type IntoIter = std::slice::Iter<'a, StoredEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

impl IntoIterator for EventBatch {
    type Item = StoredEvent;
    type IntoIter = std::vec::IntoIter<StoredEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
