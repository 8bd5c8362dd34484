use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::{Error, Result, TransactionOperation};
use super::interceptor::{Interceptor, Next};
use super::unit_of_work::UnitOfWork;

// ============================================================================
// Transaction Provider - Boundary Contract
// ============================================================================
//
// Implementations must give read-your-writes inside one transaction and be
// safe to share between workers running independent transactions.
//
// ============================================================================

#[async_trait]
pub trait Transaction: Send + Sync + 'static {
    fn id(&self) -> Uuid;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;
}

#[async_trait]
pub trait TransactionProvider: Send + Sync {
    type Transaction: Transaction;

    async fn begin(&self) -> Result<Self::Transaction>;
}

// ============================================================================
// Transactional Interceptor
// ============================================================================
//
// begin → bind to unit of work → proceed → commit | rollback
//
// A failed commit is followed by one rollback attempt and the commit error is
// raised. A failed rollback is recorded on the unit of work and never
// replaces the error that caused it.
//
// Nesting: when a transaction is already bound to the unit of work, the
// interceptor joins it and leaves begin/commit/rollback to the outer one.
//
// ============================================================================

pub struct TransactionalInterceptor<P: TransactionProvider> {
    provider: Arc<P>,
}

impl<P: TransactionProvider> TransactionalInterceptor<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }

    async fn rollback(&self, uow: &mut UnitOfWork<P::Transaction>, transaction: &mut P::Transaction) {
        if let Err(err) = transaction.rollback().await {
            tracing::error!(
                transaction_id = %transaction.id(),
                error = %err,
                "Rollback failed"
            );
            uow.record_rollback_failure(err);
        } else {
            tracing::debug!(transaction_id = %transaction.id(), "Transaction rolled back");
        }
    }
}

#[async_trait]
impl<P, R> Interceptor<P::Transaction, R> for TransactionalInterceptor<P>
where
    P: TransactionProvider + 'static,
    R: Send + 'static,
{
    async fn intercept(
        &self,
        uow: &mut UnitOfWork<P::Transaction>,
        next: Next<'_, P::Transaction, R>,
    ) -> Result<R> {
        if let Some(existing) = uow.transaction() {
            tracing::debug!(transaction_id = %existing.id(), "Joining transaction already bound to unit of work");
            return next.proceed(uow).await;
        }

        let transaction = self.provider.begin().await?;
        let transaction_id = transaction.id();
        tracing::debug!(transaction_id = %transaction_id, uow_id = %uow.id(), "Transaction started");
        uow.bind_transaction(transaction)?;

        let outcome = next.proceed(uow).await;

        let Some(mut transaction) = uow.take_transaction() else {
            tracing::error!(transaction_id = %transaction_id, "Transaction was detached from the unit of work");
            return match outcome {
                Ok(_) => Err(Error::transaction(
                    TransactionOperation::Commit,
                    format!("transaction {} was detached before commit", transaction_id),
                )),
                Err(err) => Err(err),
            };
        };

        match outcome {
            Ok(value) => match transaction.commit().await {
                Ok(()) => {
                    tracing::debug!(transaction_id = %transaction_id, "Transaction committed");
                    Ok(value)
                }
                Err(commit_err) => {
                    tracing::warn!(transaction_id = %transaction_id, error = %commit_err, "Commit failed, rolling back");
                    self.rollback(uow, &mut transaction).await;
                    Err(commit_err)
                }
            },
            Err(err) => {
                tracing::debug!(transaction_id = %transaction_id, error = %err, "Chain failed, rolling back");
                self.rollback(uow, &mut transaction).await;
                Err(err)
            }
        }
    }
}
