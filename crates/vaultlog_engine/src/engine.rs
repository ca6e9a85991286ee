//! Transaction write path.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::oplog::OplogCache;
use crate::store::{DurableStore, StoreError, WritePredicate};
use std::sync::Arc;
use tracing::{info, warn};
use vaultlog_protocol::{Command, Transaction, WriteCommand};

/// Orchestrates the write path: validate, allocate a sequence number,
/// persist conditionally, and commit or roll back.
///
/// Every started transaction is driven to a terminal state. A durable
/// write the caller saw fail may still have landed; the rollback path
/// detects that case and commits the slot instead, so readers never see
/// an incorrect entry and callers retry idempotently by item id.
pub struct TransactionEngine {
    config: EngineConfig,
    store: Arc<dyn DurableStore>,
    cache: Arc<OplogCache>,
}

impl TransactionEngine {
    /// Creates an engine over a store and a shared projection cache.
    pub fn new(config: EngineConfig, store: Arc<dyn DurableStore>, cache: Arc<OplogCache>) -> Self {
        Self {
            config,
            store,
            cache,
        }
    }

    /// Appends one transaction to a user's log.
    ///
    /// Returns the assigned sequence number once the write is durable.
    pub async fn submit(&self, user_id: &str, write: WriteCommand) -> EngineResult<u64> {
        self.validate_write(&write)?;
        self.cache.ensure_loaded(self.store.as_ref(), user_id).await?;

        let tx = self.cache.push(user_id, write);
        persist_slot(Arc::clone(&self.store), Arc::clone(&self.cache), tx).await
    }

    /// Appends several transactions as one batch.
    ///
    /// Sequence numbers are assigned in input order, then the durable
    /// writes run concurrently. Returns the sequence numbers in input
    /// order. If any write fails, the earliest failure surfaces;
    /// already-durable siblings stay committed (writes are atomic per
    /// transaction, not per batch).
    pub async fn submit_batch(
        &self,
        user_id: &str,
        writes: Vec<WriteCommand>,
    ) -> EngineResult<Vec<u64>> {
        self.validate_batch(&writes)?;
        self.cache.ensure_loaded(self.store.as_ref(), user_id).await?;

        let transactions: Vec<Transaction> = writes
            .into_iter()
            .map(|write| self.cache.push(user_id, write))
            .collect();

        let mut handles = Vec::with_capacity(transactions.len());
        for tx in transactions {
            let store = Arc::clone(&self.store);
            let cache = Arc::clone(&self.cache);
            handles.push(tokio::spawn(persist_slot(store, cache, tx)));
        }

        let mut sequence_nos = Vec::with_capacity(handles.len());
        let mut first_error = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(sequence_no)) => sequence_nos.push(sequence_no),
                Ok(Err(err)) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
                Err(err) => {
                    if first_error.is_none() {
                        first_error =
                            Some(EngineError::Internal(format!("persist task died: {err}")));
                    }
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(sequence_nos),
        }
    }

    /// Validates a single write before any state is touched.
    fn validate_write(&self, write: &WriteCommand) -> EngineResult<()> {
        if write.item_id.is_empty() {
            return Err(EngineError::BadInput("item id must not be empty".into()));
        }
        if !write.command.client_submittable() {
            return Err(EngineError::BadInput(
                "rollback is not a client-submittable command".into(),
            ));
        }
        if write.command.carries_record() {
            match &write.record {
                None => {
                    return Err(EngineError::BadInput(format!(
                        "{} requires a record",
                        write.command.as_str()
                    )));
                }
                Some(record) if record.len() > self.config.max_item_bytes => {
                    return Err(EngineError::BadInput(format!(
                        "record of {} bytes exceeds the {}-byte limit",
                        record.len(),
                        self.config.max_item_bytes
                    )));
                }
                Some(_) => {}
            }
        } else if write.record.is_some() {
            return Err(EngineError::BadInput(format!(
                "{} takes no record",
                write.command.as_str()
            )));
        }
        Ok(())
    }

    fn validate_batch(&self, writes: &[WriteCommand]) -> EngineResult<()> {
        if writes.is_empty() {
            return Err(EngineError::BadInput("batch must not be empty".into()));
        }
        let total_bytes: usize = writes.iter().map(|write| write.record_size()).sum();
        if total_bytes > self.config.max_batch_bytes {
            return Err(EngineError::BadInput(format!(
                "batch of {} bytes exceeds the {}-byte limit",
                total_bytes, self.config.max_batch_bytes
            )));
        }
        let deletes = writes
            .iter()
            .filter(|write| write.command == Command::Delete)
            .count();
        if deletes > self.config.max_batch_deletes {
            return Err(EngineError::BadInput(format!(
                "{} deletes exceed the batch limit of {}",
                deletes, self.config.max_batch_deletes
            )));
        }
        for write in writes {
            self.validate_write(write)?;
        }
        Ok(())
    }
}

/// Drives one allocated slot to a durable outcome.
///
/// On a failed insert the rollback runs as a detached task; its outcome
/// never changes the error the caller already received.
async fn persist_slot(
    store: Arc<dyn DurableStore>,
    cache: Arc<OplogCache>,
    tx: Transaction,
) -> EngineResult<u64> {
    match store
        .put_transaction(&tx, WritePredicate::InsertIfAbsent)
        .await
    {
        Ok(()) => {
            cache.mark_committed(&tx);
            Ok(tx.sequence_no)
        }
        Err(err) => {
            warn!(
                user_id = %tx.user_id,
                sequence_no = tx.sequence_no,
                error = %err,
                "durable insert failed, scheduling rollback"
            );
            let sequence_no = tx.sequence_no;
            tokio::spawn(roll_back_slot(store, cache, tx));
            Err(EngineError::TransientWrite(format!(
                "durable write failed at sequence {sequence_no}"
            )))
        }
    }
}

/// Durably marks a slot rolled back after a failed insert.
async fn roll_back_slot(store: Arc<dyn DurableStore>, cache: Arc<OplogCache>, tx: Transaction) {
    let rollback = Transaction::rollback_of(&tx);
    match store
        .put_transaction(&rollback, WritePredicate::AbsentOrRollback)
        .await
    {
        Ok(()) => cache.mark_rolled_back(&rollback),
        Err(StoreError::Conflict) => {
            // A non-rollback row occupies the slot, so the insert the
            // caller saw fail actually landed. The slot is live.
            info!(
                user_id = %tx.user_id,
                sequence_no = tx.sequence_no,
                "rollback rejected, original write was durable; committing slot"
            );
            cache.mark_committed(&tx);
        }
        Err(err) => {
            // Leave the slot pending; reconstruction after a restart
            // resolves it from the durable state.
            warn!(
                user_id = %tx.user_id,
                sequence_no = tx.sequence_no,
                error = %err,
                "rollback attempt failed, slot stays pending"
            );
        }
    }
}
