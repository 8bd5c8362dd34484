use chrono::Utc;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::event_sourcing::{EventStorageEngine, EventStore, StreamId};
use crate::messaging::{Interceptor, TransactionProvider, TransactionalInterceptor};
use crate::metrics::Metrics;
use super::config::BenchmarkConfig;
use super::worker::{BenchmarkWorker, WorkerReport};

// ============================================================================
// Benchmark Runner
// ============================================================================
//
// 1. Validate the configuration
// 2. Prepare the store (purge every stream)
// 3. Spawn one task per worker, each on its own random stream
// 4. Join them and total the per-worker reports
//
// Workers share the engine and the transaction provider, nothing else.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct BenchmarkReport {
    pub workers: Vec<WorkerReport>,
    pub elapsed: Duration,
}

impl BenchmarkReport {
    pub fn completed(&self) -> usize {
        self.workers.iter().map(|w| w.completed).sum()
    }

    pub fn failed(&self) -> usize {
        self.workers.iter().map(|w| w.failed).sum()
    }

    /// Events committed across all streams
    pub fn events_committed(&self) -> u64 {
        self.workers.iter().map(|w| w.final_sequence).sum()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0 && self.workers.iter().all(|w| !w.timed_out)
    }
}

pub async fn run_benchmark<S, P>(
    config: BenchmarkConfig,
    engine: Arc<S>,
    provider: Arc<P>,
    metrics: Option<Arc<Metrics>>,
) -> anyhow::Result<BenchmarkReport>
where
    S: EventStorageEngine + 'static,
    P: TransactionProvider<Transaction = S::Transaction> + 'static,
{
    config.validate()?;
    engine.purge().await?;

    let started = Instant::now();
    tracing::info!(
        workers = config.worker_count,
        transactions = config.transaction_count,
        events_per_transaction = config.events_per_transaction,
        "🚀 Start benchmark at: {}",
        Utc::now()
    );

    let config = Arc::new(config);
    let store = EventStore::new(engine);
    let interceptors: Vec<Arc<dyn Interceptor<S::Transaction, u64>>> =
        vec![Arc::new(TransactionalInterceptor::new(provider))];

    let handles: Vec<_> = (0..config.worker_count)
        .map(|id| {
            let worker = BenchmarkWorker::new(
                id,
                StreamId::random(),
                config.clone(),
                store.clone(),
                interceptors.clone(),
            )
            .with_metrics(metrics.clone());
            tokio::spawn(worker.run())
        })
        .collect();

    let mut workers = Vec::with_capacity(handles.len());
    for joined in join_all(handles).await {
        workers.push(joined?);
    }

    let report = BenchmarkReport {
        workers,
        elapsed: started.elapsed(),
    };

    tracing::info!(
        completed = report.completed(),
        failed = report.failed(),
        events = report.events_committed(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "🎉 End benchmark at: {}",
        Utc::now()
    );

    Ok(report)
}
