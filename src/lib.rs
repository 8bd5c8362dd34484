// ============================================================================
// Transactional event store benchmark core
// ============================================================================
//
// src/messaging/       unit of work, interceptor chain, transactions
// src/event_sourcing/  event model, storage engine contract, in-memory engine
// src/benchmark/       workers, runner, configuration
//
// ============================================================================

pub mod benchmark;
pub mod errors;
pub mod event_sourcing;
pub mod messaging;
pub mod metrics;
pub mod utils;

pub use errors::{Error, Result, UnitOfWorkError};
