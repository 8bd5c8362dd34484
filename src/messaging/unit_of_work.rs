use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::{Error, Result, UnitOfWorkError};
use super::interceptor::{Interceptor, InterceptorChain, MessageHandler};
use super::message::Message;
use super::transaction::Transaction;

// ============================================================================
// Unit of Work - Lifecycle of One Logical Operation
// ============================================================================
//
// States:
// - NotStarted: created, nothing has run
// - Started: the interceptor chain is running
// - Committing: chain succeeded, commit callbacks running
// - Committed: done, after-commit callbacks running
// - RolledBack: chain or commit failed
//
// Cleanup callbacks run on every exit path. A unit of work executes once.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    Started,
    Committing,
    Committed,
    RolledBack,
}

type Callback = Box<dyn FnOnce(&Message) + Send + Sync>;

pub struct UnitOfWork<T: Transaction> {
    id: Uuid,
    message: Message,
    phase: Phase,
    transaction: Option<T>,
    resources: HashMap<String, Box<dyn Any + Send + Sync>>,
    on_commit: Vec<Callback>,
    after_commit: Vec<Callback>,
    on_rollback: Vec<Callback>,
    on_cleanup: Vec<Callback>,
    rollback_failure: Option<Error>,
}

impl<T: Transaction> UnitOfWork<T> {
    pub fn new(message: Message) -> Self {
        Self {
            id: Uuid::new_v4(),
            message,
            phase: Phase::NotStarted,
            transaction: None,
            resources: HashMap::new(),
            on_commit: Vec::new(),
            after_commit: Vec::new(),
            on_rollback: Vec::new(),
            on_cleanup: Vec::new(),
            rollback_failure: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        matches!(self.phase, Phase::Started | Phase::Committing)
    }

    // ------------------------------------------------------------------------
    // Transaction binding
    // ------------------------------------------------------------------------

    /// Bind a transaction so downstream handlers can join it
    pub fn bind_transaction(&mut self, transaction: T) -> Result<()> {
        if let Some(existing) = &self.transaction {
            return Err(Error::InvalidArgument(format!(
                "transaction {} is already bound to unit of work {}",
                existing.id(),
                self.id
            )));
        }
        self.transaction = Some(transaction);
        Ok(())
    }

    pub fn has_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    pub fn transaction(&self) -> Option<&T> {
        self.transaction.as_ref()
    }

    pub fn transaction_mut(&mut self) -> Option<&mut T> {
        self.transaction.as_mut()
    }

    pub fn take_transaction(&mut self) -> Option<T> {
        self.transaction.take()
    }

    /// Keep the first rollback failure; it is reported next to the cause.
    pub fn record_rollback_failure(&mut self, error: Error) {
        if self.rollback_failure.is_none() {
            self.rollback_failure = Some(error);
        }
    }

    // ------------------------------------------------------------------------
    // Resources
    // ------------------------------------------------------------------------

    pub fn put_resource<V: Any + Send + Sync>(&mut self, key: impl Into<String>, value: V) {
        self.resources.insert(key.into(), Box::new(value));
    }

    pub fn resource<V: Any + Send + Sync>(&self, key: &str) -> Option<&V> {
        self.resources.get(key).and_then(|value| value.downcast_ref::<V>())
    }

    // ------------------------------------------------------------------------
    // Phase callbacks
    // ------------------------------------------------------------------------

    /// Runs once the chain has succeeded, before a transaction still bound
    /// here commits. A `TransactionalInterceptor` in the chain has already
    /// committed its own transaction by then, so this is not a pre-commit
    /// hook for it.
    pub fn on_commit(&mut self, callback: impl FnOnce(&Message) + Send + Sync + 'static) {
        self.on_commit.push(Box::new(callback));
    }

    pub fn after_commit(&mut self, callback: impl FnOnce(&Message) + Send + Sync + 'static) {
        self.after_commit.push(Box::new(callback));
    }

    pub fn on_rollback(&mut self, callback: impl FnOnce(&Message) + Send + Sync + 'static) {
        self.on_rollback.push(Box::new(callback));
    }

    /// Runs after commit or rollback, whatever the outcome
    pub fn on_cleanup(&mut self, callback: impl FnOnce(&Message) + Send + Sync + 'static) {
        self.on_cleanup.push(Box::new(callback));
    }

    // ------------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------------

    /// Run `handler` behind `interceptors`, then commit or roll back.
    pub async fn execute<R: Send + 'static>(
        &mut self,
        interceptors: &[Arc<dyn Interceptor<T, R>>],
        handler: &dyn MessageHandler<T, R>,
    ) -> std::result::Result<R, UnitOfWorkError> {
        if self.phase != Phase::NotStarted {
            tracing::warn!(uow_id = %self.id, phase = ?self.phase, "Rejected re-execution of unit of work");
            return Err(UnitOfWorkError::new(Error::AlreadyExecuted));
        }

        self.phase = Phase::Started;
        tracing::debug!(
            uow_id = %self.id,
            message = %self.message.name(),
            interceptors = interceptors.len(),
            "Unit of work started"
        );

        let chain = InterceptorChain::new(interceptors.to_vec(), handler);
        let outcome = match chain.proceed(self).await {
            Ok(value) => self.commit().await.map(|_| value),
            Err(cause) => Err(cause),
        };

        let result = match outcome {
            Ok(value) => Ok(value),
            Err(cause) => {
                self.rollback().await;
                Err(UnitOfWorkError {
                    cause,
                    rollback_failure: self.rollback_failure.take(),
                })
            }
        };

        self.cleanup();
        result
    }

    async fn commit(&mut self) -> Result<()> {
        self.phase = Phase::Committing;
        run_callbacks(&mut self.on_commit, &self.message);

        if let Some(mut transaction) = self.transaction.take() {
            tracing::debug!(uow_id = %self.id, transaction_id = %transaction.id(), "Committing transaction left bound to unit of work");
            if let Err(err) = transaction.commit().await {
                self.transaction = Some(transaction);
                return Err(err);
            }
        }

        self.phase = Phase::Committed;
        tracing::debug!(uow_id = %self.id, "Unit of work committed");
        run_callbacks(&mut self.after_commit, &self.message);
        Ok(())
    }

    async fn rollback(&mut self) {
        if let Some(mut transaction) = self.transaction.take() {
            tracing::debug!(uow_id = %self.id, transaction_id = %transaction.id(), "Rolling back transaction left bound to unit of work");
            if let Err(err) = transaction.rollback().await {
                tracing::error!(uow_id = %self.id, error = %err, "Rollback failed");
                self.record_rollback_failure(err);
            }
        }

        self.phase = Phase::RolledBack;
        tracing::debug!(uow_id = %self.id, "Unit of work rolled back");
        run_callbacks(&mut self.on_rollback, &self.message);
    }

    fn cleanup(&mut self) {
        run_callbacks(&mut self.on_cleanup, &self.message);
        self.on_commit.clear();
        self.after_commit.clear();
        self.on_rollback.clear();
        self.resources.clear();
    }
}

fn run_callbacks(callbacks: &mut Vec<Callback>, message: &Message) {
    for callback in callbacks.drain(..) {
        callback(message);
    }
}
