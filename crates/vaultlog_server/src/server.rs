//! The log service facade.

use std::sync::Arc;
use tracing::debug;
use vaultlog_engine::{
    BundleCoordinator, BundleLocks, DurableStore, EngineConfig, ObjectBody, ObjectDownload,
    OplogCache, ReadPath, TransactionEngine,
};
use vaultlog_protocol::{Command, ErrorResponse, Request, Response, WriteCommand};

/// The per-user transactional log service.
///
/// Wires one [`TransactionEngine`], [`BundleCoordinator`], and
/// [`ReadPath`] over a shared durable store and projection cache, and
/// dispatches the tagged request envelope to them.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use vaultlog_engine::{EngineConfig, MemoryStore};
/// use vaultlog_server::LogServer;
///
/// let server = LogServer::new(EngineConfig::default(), Arc::new(MemoryStore::new()));
/// // A transport layer feeds parsed requests into server.handle_request().
/// ```
pub struct LogServer {
    engine: TransactionEngine,
    coordinator: BundleCoordinator,
    reader: ReadPath,
}

impl LogServer {
    /// Creates a server over a durable store.
    pub fn new(config: EngineConfig, store: Arc<dyn DurableStore>) -> Self {
        let cache = Arc::new(OplogCache::new());
        let locks = Arc::new(BundleLocks::new(config.bundle_lock_lease));
        Self {
            engine: TransactionEngine::new(config.clone(), Arc::clone(&store), Arc::clone(&cache)),
            coordinator: BundleCoordinator::new(
                config.clone(),
                Arc::clone(&store),
                Arc::clone(&cache),
                locks,
            ),
            reader: ReadPath::new(config, store, cache),
        }
    }

    /// Dispatches one request to the matching engine operation.
    pub async fn handle_request(&self, request: Request) -> Result<Response, ErrorResponse> {
        debug!(action = request.action(), "dispatching request");
        match request {
            Request::Insert {
                user_id,
                item_id,
                record,
            } => self
                .submit_one(&user_id, item_id, Command::Insert, record)
                .await,
            Request::Update {
                user_id,
                item_id,
                record,
            } => self
                .submit_one(&user_id, item_id, Command::Update, record)
                .await,
            Request::Delete { user_id, item_id } => {
                self.submit_one(&user_id, item_id, Command::Delete, None).await
            }
            Request::BatchTransaction {
                user_id,
                operations,
            } => self
                .engine
                .submit_batch(&user_id, operations)
                .await
                .map(|sequence_nos| Response::SequenceBatch { sequence_nos })
                .map_err(ErrorResponse::from),
            Request::QueryTransactionLog { user_id } => self
                .reader
                .transaction_log(&user_id)
                .await
                .map(Response::TransactionLog)
                .map_err(ErrorResponse::from),
            Request::AcquireBundleLock { user_id } => Ok(Response::BundleLock {
                lock_id: self.coordinator.acquire_lock(&user_id),
            }),
            Request::ReleaseBundleLock { user_id, lock_id } => Ok(Response::LockReleased {
                released: self.coordinator.release_lock(&user_id, &lock_id),
            }),
        }
    }

    /// Parses a JSON envelope and dispatches it.
    pub async fn handle_json(&self, bytes: &[u8]) -> Result<Response, ErrorResponse> {
        let request = Request::from_json(bytes)?;
        self.handle_request(request).await
    }

    /// Streams a bundle upload into the store and advances the watermark.
    pub async fn upload_bundle(
        &self,
        user_id: &str,
        bundle_seq_no: u64,
        lock_id: &str,
        content_type: Option<String>,
        body: ObjectBody,
    ) -> Result<(), ErrorResponse> {
        self.coordinator
            .upload_bundle(user_id, bundle_seq_no, lock_id, content_type, body)
            .await
            .map_err(ErrorResponse::from)
    }

    /// Streams a stored snapshot back to the caller.
    pub async fn fetch_db_state(
        &self,
        user_id: &str,
        bundle_seq_no: u64,
    ) -> Result<ObjectDownload, ErrorResponse> {
        self.reader
            .db_state(user_id, bundle_seq_no)
            .await
            .map_err(ErrorResponse::from)
    }

    async fn submit_one(
        &self,
        user_id: &str,
        item_id: String,
        command: Command,
        record: Option<Vec<u8>>,
    ) -> Result<Response, ErrorResponse> {
        self.engine
            .submit(
                user_id,
                WriteCommand {
                    item_id,
                    command,
                    record,
                },
            )
            .await
            .map(|sequence_no| Response::Sequence { sequence_no })
            .map_err(ErrorResponse::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultlog_engine::MemoryStore;

    fn server() -> LogServer {
        LogServer::new(EngineConfig::default(), Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn insert_dispatch() {
        let server = server();

        let response = server
            .handle_request(Request::Insert {
                user_id: "u1".into(),
                item_id: "a".into(),
                record: Some(vec![1]),
            })
            .await
            .unwrap();
        assert_eq!(response, Response::Sequence { sequence_no: 0 });
    }

    #[tokio::test]
    async fn insert_without_record_is_bad_input() {
        let server = server();

        let err = server
            .handle_request(Request::Insert {
                user_id: "u1".into(),
                item_id: "a".into(),
                record: None,
            })
            .await
            .unwrap_err();
        assert!(err.code.is_client_error());
    }

    #[tokio::test]
    async fn lock_lifecycle_dispatch() {
        let server = server();

        let response = server
            .handle_request(Request::AcquireBundleLock {
                user_id: "u1".into(),
            })
            .await
            .unwrap();
        let lock_id = match response {
            Response::BundleLock { lock_id: Some(id) } => id,
            other => panic!("unexpected response: {other:?}"),
        };

        // A second acquisition is refused while the lease is live.
        let response = server
            .handle_request(Request::AcquireBundleLock {
                user_id: "u1".into(),
            })
            .await
            .unwrap();
        assert_eq!(response, Response::BundleLock { lock_id: None });

        let response = server
            .handle_request(Request::ReleaseBundleLock {
                user_id: "u1".into(),
                lock_id,
            })
            .await
            .unwrap();
        assert_eq!(response, Response::LockReleased { released: true });
    }
}
