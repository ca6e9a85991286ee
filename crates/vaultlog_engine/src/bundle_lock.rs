//! Advisory per-user bundle locks.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Lease {
    lock_id: String,
    acquired_at: Instant,
}

/// Advisory per-user locks gating bundle uploads.
///
/// At most one live lease exists per user; leases expire after a fixed
/// duration rather than being reaped. The lock is an optimization, not a
/// correctness primitive: the upload path re-checks ownership but
/// tolerates concurrent holders, because bundle-sequence monotonicity
/// carries correctness.
pub struct BundleLocks {
    lease: Duration,
    locks: Mutex<HashMap<String, Lease>>,
}

impl BundleLocks {
    /// Creates a lock table with the given lease duration.
    pub fn new(lease: Duration) -> Self {
        Self {
            lease,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquires the lock for a user.
    ///
    /// Returns a fresh unguessable token when no live lease exists (an
    /// expired lease is replaced), or `None` while another holder is live.
    pub fn acquire(&self, user_id: &str) -> Option<String> {
        let mut locks = self.locks.lock();
        if let Some(lease) = locks.get(user_id) {
            if lease.acquired_at.elapsed() < self.lease {
                return None;
            }
        }
        let lock_id = Uuid::new_v4().to_string();
        locks.insert(
            user_id.to_string(),
            Lease {
                lock_id: lock_id.clone(),
                acquired_at: Instant::now(),
            },
        );
        Some(lock_id)
    }

    /// Returns true if a live lease for this user matches the token.
    pub fn owns(&self, user_id: &str, lock_id: &str) -> bool {
        self.locks
            .lock()
            .get(user_id)
            .map(|lease| lease.acquired_at.elapsed() < self.lease && lease.lock_id == lock_id)
            .unwrap_or(false)
    }

    /// Releases the lock iff the caller owns it; returns whether it did.
    pub fn release(&self, user_id: &str, lock_id: &str) -> bool {
        let mut locks = self.locks.lock();
        let owned = locks
            .get(user_id)
            .map(|lease| lease.acquired_at.elapsed() < self.lease && lease.lock_id == lock_id)
            .unwrap_or(false);
        if owned {
            locks.remove(user_id);
        }
        owned
    }
}
