//! Request and response envelopes.

use crate::error::ErrorResponse;
use crate::transaction::{Command, Transaction};
use serde::{Deserialize, Serialize};

/// A single client-submitted write, before sequence assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteCommand {
    /// Client-chosen item identifier.
    pub item_id: String,
    /// The command.
    pub command: Command,
    /// Opaque encrypted payload, required for Insert and Update.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub record: Option<Vec<u8>>,
}

impl WriteCommand {
    /// Creates an Insert command.
    pub fn insert(item_id: impl Into<String>, record: Vec<u8>) -> Self {
        Self {
            item_id: item_id.into(),
            command: Command::Insert,
            record: Some(record),
        }
    }

    /// Creates an Update command.
    pub fn update(item_id: impl Into<String>, record: Vec<u8>) -> Self {
        Self {
            item_id: item_id.into(),
            command: Command::Update,
            record: Some(record),
        }
    }

    /// Creates a Delete command.
    pub fn delete(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            command: Command::Delete,
            record: None,
        }
    }

    /// Returns the size of the record in bytes.
    pub fn record_size(&self) -> usize {
        self.record.as_ref().map(|r| r.len()).unwrap_or(0)
    }
}

/// A service request, dispatched on the `action` tag.
///
/// Bundle uploads and snapshot downloads stream their bodies and therefore
/// have dedicated entry points on the server instead of envelope variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum Request {
    /// Append an Insert transaction.
    #[serde(rename_all = "camelCase")]
    Insert {
        /// Owner of the log.
        user_id: String,
        /// Client-chosen item identifier.
        item_id: String,
        /// Opaque encrypted payload.
        #[serde(skip_serializing_if = "Option::is_none", default)]
        record: Option<Vec<u8>>,
    },
    /// Append an Update transaction.
    #[serde(rename_all = "camelCase")]
    Update {
        /// Owner of the log.
        user_id: String,
        /// Client-chosen item identifier.
        item_id: String,
        /// Opaque encrypted payload.
        #[serde(skip_serializing_if = "Option::is_none", default)]
        record: Option<Vec<u8>>,
    },
    /// Append a Delete transaction.
    #[serde(rename_all = "camelCase")]
    Delete {
        /// Owner of the log.
        user_id: String,
        /// Client-chosen item identifier.
        item_id: String,
    },
    /// Append several transactions as one batch.
    #[serde(rename_all = "camelCase")]
    BatchTransaction {
        /// Owner of the log.
        user_id: String,
        /// The writes, in order.
        operations: Vec<WriteCommand>,
    },
    /// Read the committed tail of the log.
    #[serde(rename_all = "camelCase")]
    QueryTransactionLog {
        /// Owner of the log.
        user_id: String,
    },
    /// Acquire the advisory bundle lock.
    #[serde(rename_all = "camelCase")]
    AcquireBundleLock {
        /// Owner of the log.
        user_id: String,
    },
    /// Release the advisory bundle lock.
    #[serde(rename_all = "camelCase")]
    ReleaseBundleLock {
        /// Owner of the log.
        user_id: String,
        /// Token returned on acquisition.
        lock_id: String,
    },
}

impl Request {
    /// Parses a request from JSON bytes.
    ///
    /// Unknown action tags and malformed envelopes surface as `BadInput`.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ErrorResponse> {
        serde_json::from_slice(bytes)
            .map_err(|e| ErrorResponse::bad_input(format!("malformed request: {e}")))
    }

    /// Returns the action tag for logging.
    pub fn action(&self) -> &'static str {
        match self {
            Request::Insert { .. } => "Insert",
            Request::Update { .. } => "Update",
            Request::Delete { .. } => "Delete",
            Request::BatchTransaction { .. } => "BatchTransaction",
            Request::QueryTransactionLog { .. } => "QueryTransactionLog",
            Request::AcquireBundleLock { .. } => "AcquireBundleLock",
            Request::ReleaseBundleLock { .. } => "ReleaseBundleLock",
        }
    }
}

/// The committed tail of a user's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionLogResponse {
    /// Sequence number of the most recent snapshot, 0 if none.
    pub bundle_seq_no: u64,
    /// Committed transactions after the snapshot, in sequence order.
    ///
    /// Rolled-back slots are omitted; readers observe gaps in the
    /// sequence numbers for them.
    pub transactions: Vec<Transaction>,
}

/// A service response, dispatched on the `result` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result")]
pub enum Response {
    /// Sequence number assigned to a single write.
    #[serde(rename_all = "camelCase")]
    Sequence {
        /// The assigned sequence number.
        sequence_no: u64,
    },
    /// Sequence numbers assigned to a batch, in input order.
    #[serde(rename_all = "camelCase")]
    SequenceBatch {
        /// The assigned sequence numbers.
        sequence_nos: Vec<u64>,
    },
    /// The committed log tail.
    TransactionLog(TransactionLogResponse),
    /// Result of a lock acquisition attempt.
    #[serde(rename_all = "camelCase")]
    BundleLock {
        /// The lock token, or `None` when another holder is live.
        lock_id: Option<String>,
    },
    /// Result of a lock release.
    #[serde(rename_all = "camelCase")]
    LockReleased {
        /// Whether the caller owned the lock.
        released: bool,
    },
}

impl Response {
    /// Encodes the response to JSON bytes.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
