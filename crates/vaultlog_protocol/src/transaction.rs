//! Transaction log units.

use serde::{Deserialize, Serialize};

/// Command carried by a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// An item was created.
    Insert,
    /// An item was overwritten.
    Update,
    /// An item was removed.
    Delete,
    /// The slot was rolled back after a failed durable write.
    Rollback,
}

impl Command {
    /// Returns the command's durable-store attribute value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Insert => "Insert",
            Command::Update => "Update",
            Command::Delete => "Delete",
            Command::Rollback => "Rollback",
        }
    }

    /// Returns true if transactions with this command carry a record blob.
    ///
    /// Delete and Rollback rows store no record.
    pub fn carries_record(&self) -> bool {
        matches!(self, Command::Insert | Command::Update)
    }

    /// Returns true if clients may submit this command directly.
    ///
    /// Rollback rows are written only by the engine's rollback path.
    pub fn client_submittable(&self) -> bool {
        !matches!(self, Command::Rollback)
    }
}

/// A single entry in a user's transaction log.
///
/// The server never inspects `record`; it is an opaque encrypted blob.
///
/// # Fields
///
/// - `user_id`: owner of the log
/// - `sequence_no`: position in the log, unique per user, assigned on entry
/// - `item_id`: client-chosen identifier scoping application-level replay
/// - `command`: what happened to the item
/// - `record`: the encrypted payload, absent for Delete and Rollback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Owner of the log.
    pub user_id: String,
    /// Position in the user's log.
    pub sequence_no: u64,
    /// Client-chosen item identifier.
    pub item_id: String,
    /// The command.
    pub command: Command,
    /// Opaque encrypted payload.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub record: Option<Vec<u8>>,
}

impl Transaction {
    /// Creates an Insert transaction.
    pub fn insert(
        user_id: impl Into<String>,
        sequence_no: u64,
        item_id: impl Into<String>,
        record: Vec<u8>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            sequence_no,
            item_id: item_id.into(),
            command: Command::Insert,
            record: Some(record),
        }
    }

    /// Creates an Update transaction.
    pub fn update(
        user_id: impl Into<String>,
        sequence_no: u64,
        item_id: impl Into<String>,
        record: Vec<u8>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            sequence_no,
            item_id: item_id.into(),
            command: Command::Update,
            record: Some(record),
        }
    }

    /// Creates a Delete transaction.
    pub fn delete(
        user_id: impl Into<String>,
        sequence_no: u64,
        item_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            sequence_no,
            item_id: item_id.into(),
            command: Command::Delete,
            record: None,
        }
    }

    /// Creates the Rollback rewrite of an existing slot.
    pub fn rollback_of(other: &Transaction) -> Self {
        Self {
            user_id: other.user_id.clone(),
            sequence_no: other.sequence_no,
            item_id: other.item_id.clone(),
            command: Command::Rollback,
            record: None,
        }
    }

    /// Returns the size of the record in bytes.
    pub fn record_size(&self) -> usize {
        self.record.as_ref().map(|r| r.len()).unwrap_or(0)
    }
}
