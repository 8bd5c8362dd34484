use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::errors::{Error, Result, TransactionOperation};
use crate::event_sourcing::core::{StoredEvent, StreamId};
use crate::messaging::{Transaction, TransactionProvider};
use super::engine::EventStorageEngine;

// ============================================================================
// In-Memory Storage Engine
// ============================================================================
//
// Implements both the transaction provider and the storage engine.
//
// - Committed streams live behind one RwLock, shared by all workers
// - Each transaction stages its appends privately (read-your-writes)
// - Commit re-validates every staged stream against the committed head and
//   applies all of them under the write lock, or none
//
// ============================================================================

#[derive(Clone, Default)]
pub struct InMemoryEventStorageEngine {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    streams: RwLock<HashMap<StreamId, Vec<StoredEvent>>>,
    #[cfg(test)]
    failing_commits: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransactionState {
    Open,
    Committed,
    RolledBack,
}

pub struct InMemoryTransaction {
    id: Uuid,
    inner: Arc<Inner>,
    pending: BTreeMap<StreamId, Vec<StoredEvent>>,
    state: TransactionState,
}

impl InMemoryEventStorageEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed events of one stream, outside of any transaction
    pub async fn committed_events(&self, stream_id: &StreamId) -> Vec<StoredEvent> {
        let streams = self.inner.streams.read().await;
        streams.get(stream_id).cloned().unwrap_or_default()
    }

    pub async fn stream_count(&self) -> usize {
        self.inner.streams.read().await.len()
    }

    /// Make the next `count` commits fail before touching any stream
    #[cfg(test)]
    pub(crate) fn fail_next_commits(&self, count: usize) {
        self.inner.failing_commits.store(count, Ordering::SeqCst);
    }
}

impl InMemoryTransaction {
    fn ensure_open(&self) -> Result<()> {
        if self.state != TransactionState::Open {
            return Err(Error::InvalidArgument(format!(
                "transaction {} is no longer open ({:?})",
                self.id, self.state
            )));
        }
        Ok(())
    }

    fn pending_len(&self, stream_id: &StreamId) -> u64 {
        self.pending.get(stream_id).map_or(0, |events| events.len() as u64)
    }
}

#[async_trait]
impl TransactionProvider for InMemoryEventStorageEngine {
    type Transaction = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction> {
        Ok(InMemoryTransaction {
            id: Uuid::now_v7(),
            inner: self.inner.clone(),
            pending: BTreeMap::new(),
            state: TransactionState::Open,
        })
    }
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    fn id(&self) -> Uuid {
        self.id
    }

    async fn commit(&mut self) -> Result<()> {
        if self.state != TransactionState::Open {
            return Err(Error::transaction(
                TransactionOperation::Commit,
                format!("transaction {} already completed ({:?})", self.id, self.state),
            ));
        }

        #[cfg(test)]
        {
            let failing = self.inner.failing_commits.load(Ordering::SeqCst);
            if failing > 0 {
                self.inner.failing_commits.store(failing - 1, Ordering::SeqCst);
                return Err(Error::transaction(TransactionOperation::Commit, "injected commit failure"));
            }
        }

        let mut streams = self.inner.streams.write().await;

        // Validate every stream first so a conflict leaves the store untouched
        for (stream_id, events) in &self.pending {
            let head = streams.get(stream_id).map_or(0, |stored| stored.len() as u64);
            let first = events.first().map_or(head, |event| event.sequence_number);
            if first != head {
                return Err(Error::ConcurrencyConflict {
                    stream_id: stream_id.to_string(),
                    expected: first,
                    actual: head,
                });
            }
        }

        let event_count: usize = self.pending.values().map(Vec::len).sum();
        for (stream_id, events) in std::mem::take(&mut self.pending) {
            streams.entry(stream_id).or_default().extend(events);
        }
        self.state = TransactionState::Committed;

        tracing::debug!(transaction_id = %self.id, event_count = event_count, "In-memory transaction committed");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if self.state != TransactionState::Open {
            return Err(Error::transaction(
                TransactionOperation::Rollback,
                format!("transaction {} already completed ({:?})", self.id, self.state),
            ));
        }
        self.pending.clear();
        self.state = TransactionState::RolledBack;
        Ok(())
    }
}

#[async_trait]
impl EventStorageEngine for InMemoryEventStorageEngine {
    type Transaction = InMemoryTransaction;

    async fn append(
        &self,
        transaction: &mut InMemoryTransaction,
        stream_id: &StreamId,
        expected_next_sequence: u64,
        events: Vec<StoredEvent>,
    ) -> Result<u64> {
        transaction.ensure_open()?;
        if events.is_empty() {
            return Err(Error::InvalidArgument("cannot append an empty event list".to_string()));
        }

        let head = self.head(transaction, stream_id).await?;
        if head != expected_next_sequence {
            return Err(Error::ConcurrencyConflict {
                stream_id: stream_id.to_string(),
                expected: expected_next_sequence,
                actual: head,
            });
        }

        let new_head = expected_next_sequence
            .checked_add(events.len() as u64)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "{} events from sequence {} overflow stream {}",
                    events.len(),
                    expected_next_sequence,
                    stream_id
                ))
            })?;

        for (offset, event) in events.iter().enumerate() {
            let sequence = expected_next_sequence + offset as u64;
            if event.sequence_number != sequence || &event.stream_id != stream_id {
                return Err(Error::InvalidArgument(format!(
                    "event {} is numbered {} on stream {}, expected {} on stream {}",
                    event.event_id, event.sequence_number, event.stream_id, sequence, stream_id
                )));
            }
        }

        transaction.pending.entry(stream_id.clone()).or_default().extend(events);
        Ok(new_head)
    }

    async fn read(
        &self,
        transaction: &InMemoryTransaction,
        stream_id: &StreamId,
        from_sequence: u64,
        max_count: usize,
    ) -> Result<Vec<StoredEvent>> {
        transaction.ensure_open()?;
        let streams = self.inner.streams.read().await;

        let committed = streams.get(stream_id).map(Vec::as_slice).unwrap_or(&[]);
        let pending = transaction.pending.get(stream_id).map(Vec::as_slice).unwrap_or(&[]);

        Ok(committed
            .iter()
            .chain(pending.iter())
            .filter(|event| event.sequence_number >= from_sequence)
            .take(max_count)
            .cloned()
            .collect())
    }

    async fn head(&self, transaction: &InMemoryTransaction, stream_id: &StreamId) -> Result<u64> {
        let streams = self.inner.streams.read().await;
        let committed = streams.get(stream_id).map_or(0, |stored| stored.len() as u64);
        Ok(committed + transaction.pending_len(stream_id))
    }

    async fn purge(&self) -> Result<()> {
        let mut streams = self.inner.streams.write().await;
        let purged = streams.len();
        streams.clear();
        tracing::info!(streams = purged, "🧹 Purged in-memory event store");
        Ok(())
    }
}
