use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use event_store_bench::benchmark::{run_benchmark, BenchmarkConfig};
use event_store_bench::event_sourcing::InMemoryEventStorageEngine;
use event_store_bench::metrics::Metrics;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,event_store_bench=debug"))
        )
        .init();

    // === 1. Configuration (BENCH_* environment variables) ===
    let config = BenchmarkConfig::from_env()?;
    tracing::info!(?config, "Loaded benchmark configuration");

    // === 2. Storage engine + transaction provider ===
    let engine = Arc::new(InMemoryEventStorageEngine::new());
    let metrics = Arc::new(Metrics::new()?);

    // === 3. Run ===
    let events_per_transaction = config.events_per_transaction;
    let report = run_benchmark(config, engine.clone(), engine, Some(metrics.clone())).await?;

    let seconds = report.elapsed.as_secs_f64();
    let throughput = if seconds > 0.0 {
        report.events_committed() as f64 / seconds
    } else {
        0.0
    };

    tracing::info!(
        completed = report.completed(),
        failed = report.failed(),
        events_per_transaction = events_per_transaction,
        events_per_second = throughput.round() as u64,
        committed_units_of_work = metrics.units_of_work_committed.get(),
        "📊 Benchmark summary"
    );

    if !report.is_success() {
        anyhow::bail!(
            "{} of {} workers did not finish cleanly",
            report.workers.iter().filter(|w| w.failed > 0 || w.timed_out).count(),
            report.workers.len()
        );
    }

    Ok(())
}
