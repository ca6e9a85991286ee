//! Durable store seam.
//!
//! All network I/O in the engine goes through the [`DurableStore`] trait:
//! conditional puts and scans against a strongly-consistent record store,
//! user record updates, and streaming blob transfer against an object
//! store. Every other component is pure logic over in-memory state plus
//! these calls.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use vaultlog_protocol::{Command, Transaction};

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by the durable store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional write predicate was violated.
    #[error("conditional write rejected")]
    Conflict,

    /// The requested object does not exist.
    #[error("object not found: {0}")]
    NotFound(String),

    /// Network or store failure; the operation may have partially applied.
    #[error("transient store failure: {0}")]
    Transient(String),
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        StoreError::Transient(err.to_string())
    }
}

/// A streaming object body.
pub type ObjectBody = Pin<Box<dyn AsyncRead + Send>>;

/// Wraps an owned buffer as a streaming body.
pub fn body_from_bytes(bytes: Vec<u8>) -> ObjectBody {
    Box::pin(io::Cursor::new(bytes))
}

/// A streaming object download with its transfer headers.
pub struct ObjectDownload {
    /// Object size in bytes.
    pub content_length: u64,
    /// MIME type recorded at upload time.
    pub content_type: Option<String>,
    /// The object body.
    pub body: ObjectBody,
}

impl std::fmt::Debug for ObjectDownload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectDownload")
            .field("content_length", &self.content_length)
            .field("content_type", &self.content_type)
            .field("body", &"<stream>")
            .finish()
    }
}

impl ObjectDownload {
    /// Buffers the remaining body into memory.
    pub async fn into_bytes(mut self) -> StoreResult<Vec<u8>> {
        let mut data = Vec::with_capacity(self.content_length as usize);
        self.body.read_to_end(&mut data).await?;
        Ok(data)
    }
}

/// Conditional predicate applied to a transaction put.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePredicate {
    /// Succeed only if no row exists at `(user_id, sequence_no)`.
    InsertIfAbsent,
    /// Succeed if no row exists, or the existing row is a Rollback.
    AbsentOrRollback,
}

/// The user record attributes the engine reads and updates.
///
/// The record itself is owned by the external user-management
/// collaborator; only `bundle_seq_no` is written from here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// Partition key of the user table.
    pub username: String,
    /// Opaque user identifier used everywhere else.
    pub user_id: String,
    /// Sequence number of the most recent snapshot, 0 if none.
    pub bundle_seq_no: u64,
}

/// Adapter over the external record and object stores.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Conditionally writes a transaction row.
    async fn put_transaction(
        &self,
        tx: &Transaction,
        predicate: WritePredicate,
    ) -> StoreResult<()>;

    /// Returns every durable transaction for a user, in sequence order.
    async fn scan_transactions(&self, user_id: &str) -> StoreResult<Vec<Transaction>>;

    /// Looks up a user record by its opaque identifier.
    async fn get_user(&self, user_id: &str) -> StoreResult<Option<UserRecord>>;

    /// Unconditionally sets a user's bundle watermark.
    async fn update_user_bundle_seq_no(
        &self,
        username: &str,
        bundle_seq_no: u64,
    ) -> StoreResult<()>;

    /// Streams an object out of the blob store.
    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectDownload>;

    /// Streams an object into the blob store.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
        body: ObjectBody,
    ) -> StoreResult<()>;
}

/// Fault injected ahead of a conditional transaction put.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutFault {
    /// Report failure without applying the write.
    Reject,
    /// Apply the write, then report failure anyway.
    ///
    /// Models the store acknowledging after the client connection died:
    /// the caller sees `Transient` while the row is durable.
    RejectAfterWrite,
}

struct StoredObject {
    content_type: Option<String>,
    data: Vec<u8>,
}

/// In-memory [`DurableStore`] for development and testing.
///
/// **WARNING:** nothing here is durable. Production deployments back the
/// engine with a strongly-consistent record store and an object store;
/// this implementation exists so the engine, tests, and local tooling can
/// run without external services. Queued faults make the failure paths
/// testable.
#[derive(Default)]
pub struct MemoryStore {
    /// user_id -> sequence_no -> row.
    transactions: Mutex<HashMap<String, BTreeMap<u64, Transaction>>>,
    /// Keyed by username, like the external user table.
    users: Mutex<HashMap<String, UserRecord>>,
    /// "bucket/key" -> object.
    objects: Mutex<HashMap<String, StoredObject>>,
    put_faults: Mutex<VecDeque<PutFault>>,
    object_put_faults: Mutex<VecDeque<()>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a user record.
    pub fn put_user(&self, user: UserRecord) {
        self.users.lock().insert(user.username.clone(), user);
    }

    /// Queues a fault for an upcoming transaction put.
    pub fn inject_put_fault(&self, fault: PutFault) {
        self.put_faults.lock().push_back(fault);
    }

    /// Queues a failure for the next object upload.
    pub fn fail_next_object_put(&self) {
        self.object_put_faults.lock().push_back(());
    }

    /// Returns the durable row at `(user_id, sequence_no)`, if any.
    pub fn transaction(&self, user_id: &str, sequence_no: u64) -> Option<Transaction> {
        self.transactions
            .lock()
            .get(user_id)
            .and_then(|log| log.get(&sequence_no))
            .cloned()
    }

    /// Returns the number of durable rows for a user.
    pub fn transaction_count(&self, user_id: &str) -> usize {
        self.transactions
            .lock()
            .get(user_id)
            .map(|log| log.len())
            .unwrap_or(0)
    }

    /// Returns a stored object's bytes, if present.
    pub fn object_bytes(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .get(&object_key(bucket, key))
            .map(|obj| obj.data.clone())
    }
}

fn object_key(bucket: &str, key: &str) -> String {
    format!("{bucket}/{key}")
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn put_transaction(
        &self,
        tx: &Transaction,
        predicate: WritePredicate,
    ) -> StoreResult<()> {
        let fault = self.put_faults.lock().pop_front();
        if matches!(fault, Some(PutFault::Reject)) {
            return Err(StoreError::Transient("injected put failure".into()));
        }

        let mut transactions = self.transactions.lock();
        let log = transactions.entry(tx.user_id.clone()).or_default();
        let admissible = match (predicate, log.get(&tx.sequence_no)) {
            (WritePredicate::InsertIfAbsent, existing) => existing.is_none(),
            (WritePredicate::AbsentOrRollback, existing) => {
                existing.map_or(true, |row| row.command == Command::Rollback)
            }
        };
        if !admissible {
            return Err(StoreError::Conflict);
        }
        log.insert(tx.sequence_no, tx.clone());

        if matches!(fault, Some(PutFault::RejectAfterWrite)) {
            return Err(StoreError::Transient("injected failure after write".into()));
        }
        Ok(())
    }

    async fn scan_transactions(&self, user_id: &str) -> StoreResult<Vec<Transaction>> {
        Ok(self
            .transactions
            .lock()
            .get(user_id)
            .map(|log| log.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_user(&self, user_id: &str) -> StoreResult<Option<UserRecord>> {
        Ok(self
            .users
            .lock()
            .values()
            .find(|user| user.user_id == user_id)
            .cloned())
    }

    async fn update_user_bundle_seq_no(
        &self,
        username: &str,
        bundle_seq_no: u64,
    ) -> StoreResult<()> {
        // An unconditional SET upserts, matching the external table's
        // update semantics.
        let mut users = self.users.lock();
        users
            .entry(username.to_string())
            .and_modify(|user| user.bundle_seq_no = bundle_seq_no)
            .or_insert_with(|| UserRecord {
                username: username.to_string(),
                user_id: username.to_string(),
                bundle_seq_no,
            });
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectDownload> {
        let objects = self.objects.lock();
        let stored = objects
            .get(&object_key(bucket, key))
            .ok_or_else(|| StoreError::NotFound(object_key(bucket, key)))?;
        Ok(ObjectDownload {
            content_length: stored.data.len() as u64,
            content_type: stored.content_type.clone(),
            body: body_from_bytes(stored.data.clone()),
        })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
        mut body: ObjectBody,
    ) -> StoreResult<()> {
        if self.object_put_faults.lock().pop_front().is_some() {
            return Err(StoreError::Transient("injected object put failure".into()));
        }

        // The dev store buffers; production adapters forward the stream.
        let mut data = Vec::new();
        body.read_to_end(&mut data).await?;
        self.objects
            .lock()
            .insert(object_key(bucket, key), StoredObject { content_type, data });
        Ok(())
    }
}
