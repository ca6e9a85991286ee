//! Read path: log tails and snapshot downloads.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::oplog::OplogCache;
use crate::store::{DurableStore, ObjectDownload};
use std::sync::Arc;
use vaultlog_protocol::TransactionLogResponse;

/// Serves transaction-log tails from the projection and snapshot
/// downloads streamed from the object store.
pub struct ReadPath {
    config: EngineConfig,
    store: Arc<dyn DurableStore>,
    cache: Arc<OplogCache>,
}

impl ReadPath {
    /// Creates a read path over the shared engine state.
    pub fn new(config: EngineConfig, store: Arc<dyn DurableStore>, cache: Arc<OplogCache>) -> Self {
        Self {
            config,
            store,
            cache,
        }
    }

    /// Returns the committed tail of a user's log.
    ///
    /// The watermark and the transaction list come from one projection
    /// snapshot, so a concurrent truncation is either fully visible or
    /// not at all.
    pub async fn transaction_log(&self, user_id: &str) -> EngineResult<TransactionLogResponse> {
        self.cache.ensure_loaded(self.store.as_ref(), user_id).await?;
        let (bundle_seq_no, transactions) = self.cache.tail(user_id);
        Ok(TransactionLogResponse {
            bundle_seq_no,
            transactions,
        })
    }

    /// Streams a stored bundle back to the caller, forwarding its length
    /// and content type.
    pub async fn db_state(&self, user_id: &str, bundle_seq_no: u64) -> EngineResult<ObjectDownload> {
        let key = format!("{user_id}/{bundle_seq_no}");
        self.store
            .get_object(&self.config.bundle_bucket, &key)
            .await
            .map_err(EngineError::from_store)
    }
}
