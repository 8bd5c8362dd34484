// ============================================================================
// Benchmark - Throughput of Transactional Event Appends
// ============================================================================
//
// Workers drive units of work against a shared storage engine; the runner
// spawns them and collects what each one managed to commit.
//
// ============================================================================

pub mod config;
pub mod runner;
pub mod worker;

pub use config::BenchmarkConfig;
pub use runner::{run_benchmark, BenchmarkReport};
pub use worker::{BenchmarkEvent, BenchmarkWorker, WorkerReport};
