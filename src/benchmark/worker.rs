use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::errors::{Error, Result, UnitOfWorkError};
use crate::event_sourcing::{DomainEvent, EventStorageEngine, EventStore, StreamId};
use crate::messaging::{Interceptor, Message, MessageHandler, UnitOfWork};
use crate::metrics::Metrics;
use crate::utils::retry_on_transient;
use super::config::BenchmarkConfig;

// ============================================================================
// Benchmark Worker
// ============================================================================
//
// One worker = one stream + one sequence counter, iterations strictly
// sequential:
//
//   unit of work → interceptors → append batch → read batch back → commit
//
// The counter is a plain value handed into each iteration and replaced by
// the new head only when the iteration committed. A failed iteration ends
// the run.
//
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BenchmarkEvent {
    pub worker: usize,
    pub iteration: usize,
    pub index: usize,
    pub payload: String,
}

impl DomainEvent for BenchmarkEvent {
    fn event_type() -> &'static str { "BenchmarkEvent" }
}

#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub worker: usize,
    pub stream_id: StreamId,
    pub completed: usize,
    pub failed: usize,
    /// Head of the stream after the last committed iteration
    pub final_sequence: u64,
    pub timed_out: bool,
    pub elapsed: Duration,
    pub last_error: Option<String>,
}

/// Terminal handler of one iteration
struct SaveAndLoad<S: EventStorageEngine> {
    store: EventStore<S>,
    stream_id: StreamId,
    expected_sequence: u64,
    worker: usize,
    iteration: usize,
    event_count: usize,
    payload: String,
}

#[async_trait]
impl<S: EventStorageEngine + 'static> MessageHandler<S::Transaction, u64> for SaveAndLoad<S> {
    async fn handle(&self, uow: &mut UnitOfWork<S::Transaction>) -> Result<u64> {
        let events = (0..self.event_count)
            .map(|index| BenchmarkEvent {
                worker: self.worker,
                iteration: self.iteration,
                index,
                payload: self.payload.clone(),
            })
            .collect();

        let new_head = self
            .store
            .append(uow, &self.stream_id, self.expected_sequence, events)
            .await?;

        let batch = self
            .store
            .read_batch(uow, &self.stream_id, self.expected_sequence, self.event_count)
            .await?;

        if batch.len() != self.event_count || !batch.sequence_numbers().eq(self.expected_sequence..new_head) {
            return Err(Error::ChainAbort(anyhow::anyhow!(
                "read back {} events from sequence {}, expected {}..{}",
                batch.len(),
                self.expected_sequence,
                self.expected_sequence,
                new_head
            )));
        }

        Ok(new_head)
    }
}

pub struct BenchmarkWorker<S: EventStorageEngine> {
    id: usize,
    stream_id: StreamId,
    config: Arc<BenchmarkConfig>,
    store: EventStore<S>,
    interceptors: Vec<Arc<dyn Interceptor<S::Transaction, u64>>>,
    metrics: Option<Arc<Metrics>>,
    payload: String,
}

impl<S: EventStorageEngine + 'static> BenchmarkWorker<S> {
    pub fn new(
        id: usize,
        stream_id: StreamId,
        config: Arc<BenchmarkConfig>,
        store: EventStore<S>,
        interceptors: Vec<Arc<dyn Interceptor<S::Transaction, u64>>>,
    ) -> Self {
        let payload = "x".repeat(config.payload_size);
        Self {
            id,
            stream_id,
            config,
            store,
            interceptors,
            metrics: None,
            payload,
        }
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<Metrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// Run every iteration, stopping at the first failure or at the deadline
    pub async fn run(self) -> WorkerReport {
        let started = Instant::now();
        let deadline = self.config.run_timeout().map(|timeout| started + timeout);
        let mut sequence: u64 = 0;
        let mut report = WorkerReport {
            worker: self.id,
            stream_id: self.stream_id.clone(),
            completed: 0,
            failed: 0,
            final_sequence: 0,
            timed_out: false,
            elapsed: Duration::ZERO,
            last_error: None,
        };

        tracing::info!(
            worker = self.id,
            stream_id = %self.stream_id,
            transactions = self.config.transaction_count,
            events_per_transaction = self.config.events_per_transaction,
            "🏁 Worker started"
        );

        for iteration in 0..self.config.transaction_count {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                tracing::warn!(worker = self.id, iteration = iteration, "⏱️ Run timeout reached, stopping worker");
                report.timed_out = true;
                break;
            }

            match self.run_iteration(iteration, sequence).await {
                Ok(new_sequence) => {
                    sequence = new_sequence;
                    report.completed += 1;
                }
                Err(err) => {
                    tracing::error!(
                        worker = self.id,
                        stream_id = %self.stream_id,
                        iteration = iteration,
                        sequence = sequence,
                        error = %err,
                        "❌ Iteration failed, stopping worker"
                    );
                    report.failed += 1;
                    report.last_error = Some(err.to_string());
                    break;
                }
            }
        }

        report.final_sequence = sequence;
        report.elapsed = started.elapsed();

        tracing::info!(
            worker = self.id,
            completed = report.completed,
            failed = report.failed,
            final_sequence = report.final_sequence,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "✅ Worker finished"
        );

        report
    }

    /// One iteration, re-run on conflict when the policy allows it.
    /// Returns the new head; on failure `sequence` stays where it was.
    async fn run_iteration(&self, iteration: usize, sequence: u64) -> std::result::Result<u64, UnitOfWorkError> {
        let expected = AtomicU64::new(sequence);
        let expected = &expected;

        retry_on_transient(self.config.retry_policy(), move |attempt| async move {
            let from = expected.load(Ordering::Relaxed);
            let result = self.execute_unit_of_work(iteration, from, attempt).await;

            // A conflict means the head moved: the next attempt appends at
            // the head reported by the store, not at the stale sequence.
            if let Err(UnitOfWorkError {
                cause: Error::ConcurrencyConflict { actual, .. },
                ..
            }) = &result
            {
                tracing::debug!(worker = self.id, stale = from, head = *actual, "Refreshed expected sequence after conflict");
                expected.store(*actual, Ordering::Relaxed);
            }

            result
        })
        .await
        .into_result()
    }

    async fn execute_unit_of_work(
        &self,
        iteration: usize,
        sequence: u64,
        attempt: u32,
    ) -> std::result::Result<u64, UnitOfWorkError> {
        if attempt > 1 {
            if let Some(metrics) = &self.metrics {
                metrics.record_retry_attempt();
            }
        }

        let message = Message::new("SaveAndLoadEvents")
            .with_metadata("worker", self.id.to_string())
            .with_metadata("iteration", iteration.to_string())
            .with_metadata("attempt", attempt.to_string());

        let handler = SaveAndLoad {
            store: self.store.clone(),
            stream_id: self.stream_id.clone(),
            expected_sequence: sequence,
            worker: self.id,
            iteration,
            event_count: self.config.events_per_transaction,
            payload: self.payload.clone(),
        };

        let started = Instant::now();
        let mut uow = UnitOfWork::new(message);
        let result = uow.execute(&self.interceptors, &handler).await;

        if let Some(metrics) = &self.metrics {
            let elapsed = started.elapsed().as_secs_f64();
            match &result {
                Ok(_) => metrics.record_commit(self.config.events_per_transaction, elapsed),
                Err(err) => metrics.record_rollback(failure_reason(&err.cause), elapsed),
            }
        }

        result
    }
}

fn failure_reason(error: &Error) -> &'static str {
    match error {
        Error::ConcurrencyConflict { .. } => "concurrency_conflict",
        Error::TransactionFailure { .. } => "transaction_failure",
        Error::ChainAbort(_) => "chain_abort",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_sourcing::{InMemoryEventStorageEngine, InMemoryTransaction};
    use crate::messaging::{Next, TransactionalInterceptor};
    use crate::utils::RetryConfig;
    use std::sync::atomic::AtomicBool;

    type Tx = InMemoryTransaction;

    fn config(transactions: usize, events: usize) -> Arc<BenchmarkConfig> {
        Arc::new(BenchmarkConfig {
            transaction_count: transactions,
            events_per_transaction: events,
            worker_count: 1,
            payload_size: 8,
            ..BenchmarkConfig::default()
        })
    }

    fn worker(
        engine: &Arc<InMemoryEventStorageEngine>,
        config: Arc<BenchmarkConfig>,
    ) -> BenchmarkWorker<InMemoryEventStorageEngine> {
        let interceptors: Vec<Arc<dyn Interceptor<Tx, u64>>> =
            vec![Arc::new(TransactionalInterceptor::new(engine.clone()))];
        BenchmarkWorker::new(
            0,
            StreamId::random(),
            config,
            EventStore::new(engine.clone()),
            interceptors,
        )
    }

    /// Appends one foreign event behind the worker's back, once
    struct Interloper {
        engine: Arc<InMemoryEventStorageEngine>,
        stream_id: StreamId,
        fired: AtomicBool,
    }

    #[async_trait]
    impl Interceptor<Tx, u64> for Interloper {
        async fn intercept(&self, uow: &mut UnitOfWork<Tx>, next: Next<'_, Tx, u64>) -> Result<u64> {
            if !self.fired.swap(true, Ordering::SeqCst) {
                use crate::messaging::{Transaction, TransactionProvider};
                let store = EventStore::new(self.engine.clone());
                let mut sneaky = UnitOfWork::<Tx>::new(Message::new("interloper"));
                sneaky.bind_transaction(self.engine.begin().await?)?;
                let head = store.head(&sneaky, &self.stream_id).await?;
                store
                    .append(&mut sneaky, &self.stream_id, head, vec![BenchmarkEvent {
                        worker: 99,
                        iteration: 0,
                        index: 0,
                        payload: String::new(),
                    }])
                    .await?;
                if let Some(mut tx) = sneaky.take_transaction() {
                    tx.commit().await?;
                }
            }
            next.proceed(uow).await
        }
    }

    #[tokio::test]
    async fn test_three_iterations_of_two_events() {
        let engine = Arc::new(InMemoryEventStorageEngine::new());
        let worker = worker(&engine, config(3, 2));
        let stream_id = worker.stream_id().clone();

        let report = worker.run().await;

        assert_eq!(report.completed, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(report.final_sequence, 6);
        assert!(report.last_error.is_none());

        let stored = engine.committed_events(&stream_id).await;
        let sequences: Vec<u64> = stored.iter().map(|e| e.sequence_number).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3, 4, 5]);
        let decoded = stored[2].decode::<BenchmarkEvent>().unwrap();
        assert_eq!(decoded.event_data.iteration, 1);
        assert_eq!(decoded.event_data.index, 0);
        assert_eq!(decoded.event_data.payload.len(), 8);
    }

    #[tokio::test]
    async fn test_commit_failure_stops_worker_without_advancing_sequence() {
        let engine = Arc::new(InMemoryEventStorageEngine::new());
        let worker = worker(&engine, config(3, 2));
        let stream_id = worker.stream_id().clone();
        engine.fail_next_commits(1);

        let report = worker.run().await;

        assert_eq!(report.completed, 0);
        assert_eq!(report.failed, 1);
        assert_eq!(report.final_sequence, 0);
        assert!(report.last_error.unwrap().contains("Transaction commit failed"));
        assert!(engine.committed_events(&stream_id).await.is_empty());
    }

    #[tokio::test]
    async fn test_conflict_fails_iteration_without_retry_policy() {
        let engine = Arc::new(InMemoryEventStorageEngine::new());
        let config = config(2, 2);
        let stream_id = StreamId::random();
        let interloper: Arc<dyn Interceptor<Tx, u64>> = Arc::new(Interloper {
            engine: engine.clone(),
            stream_id: stream_id.clone(),
            fired: AtomicBool::new(false),
        });
        let interceptors: Vec<Arc<dyn Interceptor<Tx, u64>>> =
            vec![interloper, Arc::new(TransactionalInterceptor::new(engine.clone()))];
        let worker = BenchmarkWorker::new(0, stream_id.clone(), config, EventStore::new(engine.clone()), interceptors);

        let report = worker.run().await;

        assert_eq!(report.completed, 0);
        assert_eq!(report.failed, 1);
        assert_eq!(report.final_sequence, 0);
        assert!(report.last_error.unwrap().contains("Concurrency conflict"));
        // Only the interloper's event made it in
        assert_eq!(engine.committed_events(&stream_id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_conflict_retry_appends_at_refreshed_head() {
        let engine = Arc::new(InMemoryEventStorageEngine::new());
        let metrics = Arc::new(Metrics::new().unwrap());
        let config = Arc::new(BenchmarkConfig {
            transaction_count: 2,
            events_per_transaction: 2,
            worker_count: 1,
            retry_conflicts: true,
            retry: RetryConfig {
                initial_delay: Duration::from_millis(1),
                ..RetryConfig::default()
            },
            ..BenchmarkConfig::default()
        });
        let stream_id = StreamId::random();
        let interloper: Arc<dyn Interceptor<Tx, u64>> = Arc::new(Interloper {
            engine: engine.clone(),
            stream_id: stream_id.clone(),
            fired: AtomicBool::new(false),
        });
        let interceptors: Vec<Arc<dyn Interceptor<Tx, u64>>> =
            vec![interloper, Arc::new(TransactionalInterceptor::new(engine.clone()))];
        let worker = BenchmarkWorker::new(0, stream_id.clone(), config, EventStore::new(engine.clone()), interceptors)
            .with_metrics(Some(metrics.clone()));

        let report = worker.run().await;

        assert_eq!(report.completed, 2);
        assert_eq!(report.failed, 0);
        assert!(report.last_error.is_none());
        // One foreign event at 0, then two batches of two behind it
        assert_eq!(report.final_sequence, 5);
        assert_eq!(metrics.retry_attempts_total.get(), 1);
        let sequences: Vec<u64> = engine
            .committed_events(&stream_id)
            .await
            .iter()
            .map(|e| e.sequence_number)
            .collect();
        assert_eq!(sequences, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_metrics_follow_iterations() {
        let engine = Arc::new(InMemoryEventStorageEngine::new());
        let metrics = Arc::new(Metrics::new().unwrap());
        let worker = worker(&engine, config(4, 3)).with_metrics(Some(metrics.clone()));

        worker.run().await;

        assert_eq!(metrics.units_of_work_committed.get(), 4);
        assert_eq!(metrics.events_appended.get(), 12);
    }

    #[tokio::test]
    async fn test_elapsed_timeout_stops_before_next_iteration() {
        let engine = Arc::new(InMemoryEventStorageEngine::new());
        let config = Arc::new(BenchmarkConfig {
            transaction_count: 5,
            events_per_transaction: 1,
            run_timeout_secs: Some(0),
            ..BenchmarkConfig::default()
        });
        let worker = worker(&engine, config);

        let report = worker.run().await;

        assert!(report.timed_out);
        assert_eq!(report.completed, 0);
        assert_eq!(report.failed, 0);
    }
}
