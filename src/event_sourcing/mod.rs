// ============================================================================
// Event Sourcing Infrastructure
// ============================================================================
//
// Event model and storage. Transactions and the unit of work live in
// src/messaging/.
//
// ============================================================================

pub mod core;
pub mod store;

pub use self::core::*;
pub use store::*;
