//! Engine configuration.

use std::time::Duration;

/// Configuration for the log engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum size of a single record.
    pub max_item_bytes: usize,
    /// Maximum total record bytes in one batch.
    pub max_batch_bytes: usize,
    /// Maximum number of deletes in one batch.
    pub max_batch_deletes: usize,
    /// How long a bundle lock lease stays live.
    pub bundle_lock_lease: Duration,
    /// Name of the durable transaction table.
    pub transaction_table: String,
    /// Name of the user record table.
    pub user_table: String,
    /// Bucket holding bundle snapshots.
    pub bundle_bucket: String,
}

impl EngineConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            max_item_bytes: 400 * 1024,
            max_batch_bytes: 10 * 1024 * 1024,
            max_batch_deletes: 100,
            bundle_lock_lease: Duration::from_secs(20),
            transaction_table: "transactions".into(),
            user_table: "users".into(),
            bundle_bucket: "bundles".into(),
        }
    }

    /// Sets the maximum record size.
    pub fn with_max_item_bytes(mut self, bytes: usize) -> Self {
        self.max_item_bytes = bytes;
        self
    }

    /// Sets the maximum total batch size.
    pub fn with_max_batch_bytes(mut self, bytes: usize) -> Self {
        self.max_batch_bytes = bytes;
        self
    }

    /// Sets the maximum number of deletes per batch.
    pub fn with_max_batch_deletes(mut self, count: usize) -> Self {
        self.max_batch_deletes = count;
        self
    }

    /// Sets the bundle lock lease duration.
    pub fn with_bundle_lock_lease(mut self, lease: Duration) -> Self {
        self.bundle_lock_lease = lease;
        self
    }

    /// Sets the durable transaction table name.
    pub fn with_transaction_table(mut self, name: impl Into<String>) -> Self {
        self.transaction_table = name.into();
        self
    }

    /// Sets the user record table name.
    pub fn with_user_table(mut self, name: impl Into<String>) -> Self {
        self.user_table = name.into();
        self
    }

    /// Sets the bundle bucket name.
    pub fn with_bundle_bucket(mut self, name: impl Into<String>) -> Self {
        self.bundle_bucket = name.into();
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
