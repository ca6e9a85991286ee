//! Snapshot ("bundle") upload path.

use crate::bundle_lock::BundleLocks;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::oplog::OplogCache;
use crate::store::{DurableStore, ObjectBody};
use std::sync::Arc;
use tracing::info;

/// Coordinates bundle uploads against live writes.
///
/// A bundle at sequence `n` is a client-computed snapshot covering every
/// transaction up to and including `n`. Uploads are gated by the advisory
/// [`BundleLocks`] table and by watermark monotonicity; the latter is
/// what makes concurrent uploads safe, since any accepted bundle
/// correctly reconstructs state up to its own sequence number.
pub struct BundleCoordinator {
    config: EngineConfig,
    store: Arc<dyn DurableStore>,
    cache: Arc<OplogCache>,
    locks: Arc<BundleLocks>,
}

impl BundleCoordinator {
    /// Creates a coordinator over the shared engine state.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn DurableStore>,
        cache: Arc<OplogCache>,
        locks: Arc<BundleLocks>,
    ) -> Self {
        Self {
            config,
            store,
            cache,
            locks,
        }
    }

    /// Acquires the bundle lock for a user.
    pub fn acquire_lock(&self, user_id: &str) -> Option<String> {
        self.locks.acquire(user_id)
    }

    /// Releases the bundle lock; returns whether the caller owned it.
    pub fn release_lock(&self, user_id: &str, lock_id: &str) -> bool {
        self.locks.release(user_id, lock_id)
    }

    /// Uploads a bundle and advances the user's watermark.
    ///
    /// The body streams straight through to the object store. On any
    /// failure after the ownership check the lock is released before the
    /// error surfaces.
    pub async fn upload_bundle(
        &self,
        user_id: &str,
        bundle_seq_no: u64,
        lock_id: &str,
        content_type: Option<String>,
        body: ObjectBody,
    ) -> EngineResult<()> {
        if lock_id.is_empty() {
            return Err(EngineError::BadInput("lock id required".into()));
        }
        if bundle_seq_no == 0 {
            return Err(EngineError::BadInput(
                "bundle sequence number must be positive".into(),
            ));
        }
        if !self.locks.owns(user_id, lock_id) {
            return Err(EngineError::Unauthorized("bundle lock not owned".into()));
        }

        self.cache.ensure_loaded(self.store.as_ref(), user_id).await?;
        let user = self
            .store
            .get_user(user_id)
            .await
            .map_err(EngineError::from_store)?
            .ok_or_else(|| EngineError::Internal(format!("no user record for {user_id}")))?;

        if user.bundle_seq_no >= bundle_seq_no {
            return Err(EngineError::BadInput(format!(
                "bundle sequence number must be greater than {}",
                user.bundle_seq_no
            )));
        }

        let key = format!("{user_id}/{bundle_seq_no}");
        if let Err(err) = self
            .store
            .put_object(&self.config.bundle_bucket, &key, content_type, body)
            .await
        {
            self.locks.release(user_id, lock_id);
            return Err(EngineError::from_store(err));
        }

        if let Err(err) = self
            .store
            .update_user_bundle_seq_no(&user.username, bundle_seq_no)
            .await
        {
            self.locks.release(user_id, lock_id);
            return Err(EngineError::from_store(err));
        }

        self.cache.set_bundle_seq(user_id, bundle_seq_no);
        self.locks.release(user_id, lock_id);
        info!(user_id, bundle_seq_no, "bundle watermark advanced");
        Ok(())
    }
}
