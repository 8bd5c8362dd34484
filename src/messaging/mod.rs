// ============================================================================
// Messaging - Unit of Work & Interceptor Chain
// ============================================================================
//
// Runs one business operation through an ordered chain of interceptors,
// inside a unit of work that decides between commit and rollback.
//
// ============================================================================

pub mod interceptor;
pub mod message;
pub mod transaction;
pub mod unit_of_work;

#[cfg(test)]
pub(crate) mod testing;

pub use interceptor::{handler_fn, HandlerFn, Interceptor, InterceptorChain, MessageHandler, Next};
pub use message::Message;
pub use transaction::{Transaction, TransactionProvider, TransactionalInterceptor};
pub use unit_of_work::{Phase, UnitOfWork};
