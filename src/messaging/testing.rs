// Test doubles for the messaging layer: a transaction provider that records
// every call into a shared journal and can be told to fail.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::errors::{Error, Result, TransactionOperation};
use super::transaction::{Transaction, TransactionProvider};

#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == entry).count()
    }
}

#[derive(Clone, Default)]
pub struct RecordingProvider {
    pub journal: Journal,
    pub fail_begin: bool,
    pub fail_commit: bool,
    pub fail_rollback: bool,
}

impl RecordingProvider {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Default::default()
        }
    }
}

pub struct RecordingTransaction {
    id: Uuid,
    journal: Journal,
    fail_commit: bool,
    fail_rollback: bool,
}

#[async_trait]
impl TransactionProvider for RecordingProvider {
    type Transaction = RecordingTransaction;

    async fn begin(&self) -> Result<RecordingTransaction> {
        if self.fail_begin {
            return Err(Error::transaction(TransactionOperation::Begin, "provider offline"));
        }
        self.journal.record("begin");
        Ok(RecordingTransaction {
            id: Uuid::new_v4(),
            journal: self.journal.clone(),
            fail_commit: self.fail_commit,
            fail_rollback: self.fail_rollback,
        })
    }
}

#[async_trait]
impl Transaction for RecordingTransaction {
    fn id(&self) -> Uuid {
        self.id
    }

    async fn commit(&mut self) -> Result<()> {
        self.journal.record("commit");
        if self.fail_commit {
            return Err(Error::transaction(TransactionOperation::Commit, "commit refused"));
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.journal.record("rollback");
        if self.fail_rollback {
            return Err(Error::transaction(TransactionOperation::Rollback, "rollback refused"));
        }
        Ok(())
    }
}
