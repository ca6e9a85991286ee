//! Per-user log projection.
//!
//! Process-local mirror of each user's transaction log. Sequence numbers
//! are allocated here, durability outcomes are reflected back here, and
//! tailing reads are served from here without touching the store.

use crate::error::{EngineError, EngineResult};
use crate::store::DurableStore;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use vaultlog_protocol::{Command, Transaction, WriteCommand};

/// Lifecycle state of a transaction slot.
///
/// ```text
/// Pending ──commit──▶ Committed
///    │
///    └──rollback──▶ RolledBack
/// ```
///
/// Committed and RolledBack are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Sequence allocated, durability unresolved.
    Pending,
    /// Durably persisted and visible to readers.
    Committed,
    /// Durably rolled back; readers skip the slot.
    RolledBack,
}

#[derive(Debug, Clone)]
struct Slot {
    state: SlotState,
    tx: Transaction,
}

#[derive(Debug, Default)]
struct UserLog {
    next_seq: u64,
    bundle_seq: u64,
    slots: BTreeMap<u64, Slot>,
}

impl UserLog {
    fn evict_covered(&mut self) {
        if self.bundle_seq > 0 {
            self.slots = self.slots.split_off(&(self.bundle_seq + 1));
        }
    }
}

/// Process-local cache of per-user log projections.
///
/// Each user's log sits behind its own mutex; that mutex is the per-user
/// serialization point for sequence allocation. Two concurrent pushes for
/// the same user receive distinct, ordered sequence numbers; different
/// users never contend.
///
/// Projections are created lazily and live for the process lifetime. On a
/// cold start they are rebuilt from the durable store via
/// [`OplogCache::ensure_loaded`].
#[derive(Default)]
pub struct OplogCache {
    users: RwLock<HashMap<String, Arc<Mutex<UserLog>>>>,
}

impl OplogCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The first sequence a reader wants given a bundle watermark.
    ///
    /// A watermark of 0 means no snapshot exists and the log starts at 0;
    /// otherwise the snapshot covers everything up to and including the
    /// watermark.
    pub const fn starting_seq(bundle_seq: u64) -> u64 {
        if bundle_seq == 0 {
            0
        } else {
            bundle_seq + 1
        }
    }

    /// Returns true if a projection exists for this user.
    pub fn is_loaded(&self, user_id: &str) -> bool {
        self.users.read().contains_key(user_id)
    }

    fn user(&self, user_id: &str) -> Option<Arc<Mutex<UserLog>>> {
        self.users.read().get(user_id).cloned()
    }

    fn user_or_default(&self, user_id: &str) -> Arc<Mutex<UserLog>> {
        if let Some(log) = self.user(user_id) {
            return log;
        }
        Arc::clone(
            self.users
                .write()
                .entry(user_id.to_string())
                .or_default(),
        )
    }

    /// Rebuilds a user's projection from the durable store if absent.
    ///
    /// Rollback rows hydrate as RolledBack, everything else as Committed;
    /// there are no Pending slots after a cold start.
    pub async fn ensure_loaded(
        &self,
        store: &dyn DurableStore,
        user_id: &str,
    ) -> EngineResult<()> {
        if self.is_loaded(user_id) {
            return Ok(());
        }
        let scanned = store
            .scan_transactions(user_id)
            .await
            .map_err(EngineError::from_store)?;
        let bundle_seq = store
            .get_user(user_id)
            .await
            .map_err(EngineError::from_store)?
            .map(|user| user.bundle_seq_no)
            .unwrap_or(0);
        self.hydrate(user_id, scanned, bundle_seq);
        Ok(())
    }

    /// Seeds a projection from scanned durable rows. Idempotent: an
    /// already-loaded user is left untouched, so concurrent first touches
    /// are safe.
    pub fn hydrate(&self, user_id: &str, scanned: Vec<Transaction>, bundle_seq: u64) {
        let mut slots = BTreeMap::new();
        let mut highest = None;
        for tx in scanned {
            let state = if tx.command == Command::Rollback {
                SlotState::RolledBack
            } else {
                SlotState::Committed
            };
            highest = Some(highest.unwrap_or(0).max(tx.sequence_no));
            slots.insert(tx.sequence_no, Slot { state, tx });
        }
        let next_seq = highest
            .map(|seq| seq + 1)
            .unwrap_or(0)
            .max(Self::starting_seq(bundle_seq));

        let mut log = UserLog {
            next_seq,
            bundle_seq,
            slots,
        };
        log.evict_covered();

        let mut users = self.users.write();
        users
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(log)));
    }

    /// Allocates the next sequence number and appends a pending slot.
    ///
    /// Allocation and append happen in one critical section; the returned
    /// transaction carries the assigned sequence number.
    pub fn push(&self, user_id: &str, write: WriteCommand) -> Transaction {
        let log = self.user_or_default(user_id);
        let mut log = log.lock();
        let sequence_no = log.next_seq;
        log.next_seq += 1;
        let tx = Transaction {
            user_id: user_id.to_string(),
            sequence_no,
            item_id: write.item_id,
            command: write.command,
            record: write.record,
        };
        log.slots.insert(
            sequence_no,
            Slot {
                state: SlotState::Pending,
                tx: tx.clone(),
            },
        );
        tx
    }

    /// Marks the slot at `tx.sequence_no` Committed. Idempotent; terminal
    /// states are never left.
    pub fn mark_committed(&self, tx: &Transaction) {
        let Some(log) = self.user(&tx.user_id) else {
            return;
        };
        let mut log = log.lock();
        if let Some(slot) = log.slots.get_mut(&tx.sequence_no) {
            if slot.state == SlotState::Pending {
                slot.state = SlotState::Committed;
            }
        }
    }

    /// Marks the slot at `tx.sequence_no` RolledBack and rewrites its
    /// command. Idempotent.
    pub fn mark_rolled_back(&self, tx: &Transaction) {
        let Some(log) = self.user(&tx.user_id) else {
            return;
        };
        let mut log = log.lock();
        if let Some(slot) = log.slots.get_mut(&tx.sequence_no) {
            if slot.state != SlotState::RolledBack {
                slot.state = SlotState::RolledBack;
                slot.tx.command = Command::Rollback;
                slot.tx.record = None;
            }
        }
    }

    /// Returns the user's bundle watermark, 0 if none.
    pub fn bundle_seq(&self, user_id: &str) -> u64 {
        self.user(user_id).map(|log| log.lock().bundle_seq).unwrap_or(0)
    }

    /// Advances the bundle watermark and evicts covered slots.
    ///
    /// The watermark only moves forward; a concurrent upload that lost the
    /// race cannot drag it back.
    pub fn set_bundle_seq(&self, user_id: &str, bundle_seq: u64) {
        let log = self.user_or_default(user_id);
        let mut log = log.lock();
        if bundle_seq > log.bundle_seq {
            log.bundle_seq = bundle_seq;
            log.next_seq = log.next_seq.max(Self::starting_seq(bundle_seq));
            log.evict_covered();
        }
    }

    /// Committed transactions from `from_seq` onward.
    ///
    /// Pending and rolled-back slots are skipped; their sequence numbers
    /// appear as gaps in the result.
    pub fn transactions_since(&self, user_id: &str, from_seq: u64) -> Vec<Transaction> {
        self.user(user_id)
            .map(|log| {
                let log = log.lock();
                log.slots
                    .range(from_seq..)
                    .filter(|(_, slot)| slot.state == SlotState::Committed)
                    .map(|(_, slot)| slot.tx.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The committed tail and its watermark, taken in one critical
    /// section so a reader never observes a watermark advance without the
    /// matching truncation.
    pub fn tail(&self, user_id: &str) -> (u64, Vec<Transaction>) {
        let Some(log) = self.user(user_id) else {
            return (0, Vec::new());
        };
        let log = log.lock();
        let from_seq = Self::starting_seq(log.bundle_seq);
        let transactions = log
            .slots
            .range(from_seq..)
            .filter(|(_, slot)| slot.state == SlotState::Committed)
            .map(|(_, slot)| slot.tx.clone())
            .collect();
        (log.bundle_seq, transactions)
    }

    /// Returns the state of a slot, if the slot is resident.
    pub fn slot_state(&self, user_id: &str, sequence_no: u64) -> Option<SlotState> {
        self.user(user_id)
            .and_then(|log| log.lock().slots.get(&sequence_no).map(|slot| slot.state))
    }

    /// The next sequence number that would be allocated for a user.
    pub fn next_seq(&self, user_id: &str) -> u64 {
        self.user(user_id).map(|log| log.lock().next_seq).unwrap_or(0)
    }
}
