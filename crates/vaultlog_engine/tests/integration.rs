//! End-to-end tests for the log engine over the in-memory store.

use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use vaultlog_engine::{
    body_from_bytes, BundleCoordinator, BundleLocks, EngineConfig, EngineError, MemoryStore,
    OplogCache, PutFault, ReadPath, SlotState, TransactionEngine, UserRecord,
};
use vaultlog_protocol::{Command, WriteCommand};

/// The engine stack a process would run: one store, one shared projection.
struct Stack {
    store: Arc<MemoryStore>,
    cache: Arc<OplogCache>,
    engine: TransactionEngine,
    coordinator: BundleCoordinator,
    reader: ReadPath,
}

impl Stack {
    fn over(store: Arc<MemoryStore>) -> Self {
        let config = EngineConfig::default();
        let cache = Arc::new(OplogCache::new());
        let locks = Arc::new(BundleLocks::new(config.bundle_lock_lease));
        Self {
            engine: TransactionEngine::new(
                config.clone(),
                store.clone(),
                Arc::clone(&cache),
            ),
            coordinator: BundleCoordinator::new(
                config.clone(),
                store.clone(),
                Arc::clone(&cache),
                locks,
            ),
            reader: ReadPath::new(config, store.clone(), Arc::clone(&cache)),
            store,
            cache,
        }
    }

    fn new() -> Self {
        Self::over(Arc::new(MemoryStore::new()))
    }

    fn seed_user(&self, username: &str, user_id: &str) {
        self.store.put_user(UserRecord {
            username: username.into(),
            user_id: user_id.into(),
            bundle_seq_no: 0,
        });
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn insert_then_read() {
    let stack = Stack::new();

    let seq = stack
        .engine
        .submit("u", WriteCommand::insert("a", vec![0x01]))
        .await
        .unwrap();
    assert_eq!(seq, 0);

    let log = stack.reader.transaction_log("u").await.unwrap();
    assert_eq!(log.bundle_seq_no, 0);
    assert_eq!(log.transactions.len(), 1);
    let tx = &log.transactions[0];
    assert_eq!(tx.sequence_no, 0);
    assert_eq!(tx.item_id, "a");
    assert_eq!(tx.command, Command::Insert);
    assert_eq!(tx.record, Some(vec![0x01]));
}

#[tokio::test]
async fn ordered_batch() {
    let stack = Stack::new();

    let seqs = stack
        .engine
        .submit_batch(
            "u",
            vec![
                WriteCommand::insert("a", vec![1]),
                WriteCommand::insert("b", vec![2]),
                WriteCommand::delete("a"),
            ],
        )
        .await
        .unwrap();
    assert_eq!(seqs, vec![0, 1, 2]);

    let log = stack.reader.transaction_log("u").await.unwrap();
    let entries: Vec<(u64, String, Command)> = log
        .transactions
        .iter()
        .map(|tx| (tx.sequence_no, tx.item_id.clone(), tx.command))
        .collect();
    assert_eq!(
        entries,
        vec![
            (0, "a".into(), Command::Insert),
            (1, "b".into(), Command::Insert),
            (2, "a".into(), Command::Delete),
        ]
    );
}

#[tokio::test]
async fn transient_then_committed_race() {
    let stack = Stack::new();

    // The store applies the write but reports failure; the rollback
    // rewrite then finds a live row and the slot commits.
    stack.store.inject_put_fault(PutFault::RejectAfterWrite);
    let err = stack
        .engine
        .submit("u", WriteCommand::insert("a", vec![0x0A]))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::TransientWrite(_)));

    settle().await;
    let log = stack.reader.transaction_log("u").await.unwrap();
    assert_eq!(log.transactions.len(), 1);
    assert_eq!(log.transactions[0].item_id, "a");
    assert_eq!(log.transactions[0].record, Some(vec![0x0A]));
}

#[tokio::test]
async fn oversize_record_consumes_nothing() {
    let stack = Stack::new();

    let err = stack
        .engine
        .submit("u", WriteCommand::insert("a", vec![0u8; 400 * 1024 + 1]))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::BadInput(_)));

    assert_eq!(stack.store.transaction_count("u"), 0);
    // The next accepted write takes sequence 0.
    let seq = stack
        .engine
        .submit("u", WriteCommand::insert("a", vec![0u8; 400 * 1024]))
        .await
        .unwrap();
    assert_eq!(seq, 0);
}

#[tokio::test]
async fn bundle_happy_path() {
    let stack = Stack::new();
    stack.seed_user("alice", "u");

    for seq in 0u64..6 {
        let got = stack
            .engine
            .submit("u", WriteCommand::insert(format!("item-{seq}"), vec![seq as u8]))
            .await
            .unwrap();
        assert_eq!(got, seq);
    }

    let lock_id = stack.coordinator.acquire_lock("u").unwrap();
    stack
        .coordinator
        .upload_bundle(
            "u",
            5,
            &lock_id,
            Some("application/octet-stream".into()),
            body_from_bytes(vec![0xDB; 16]),
        )
        .await
        .unwrap();

    let log = stack.reader.transaction_log("u").await.unwrap();
    assert_eq!(log.bundle_seq_no, 5);
    assert!(log.transactions.is_empty());

    // Repeating the accepted sequence number is rejected.
    let lock_id = stack.coordinator.acquire_lock("u").unwrap();
    let err = stack
        .coordinator
        .upload_bundle("u", 5, &lock_id, None, body_from_bytes(vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::BadInput(_)));

    // Writes after the bundle continue past the watermark.
    let seq = stack
        .engine
        .submit("u", WriteCommand::insert("later", vec![7]))
        .await
        .unwrap();
    assert_eq!(seq, 6);

    let log = stack.reader.transaction_log("u").await.unwrap();
    assert_eq!(log.bundle_seq_no, 5);
    let seqs: Vec<u64> = log.transactions.iter().map(|tx| tx.sequence_no).collect();
    assert_eq!(seqs, vec![6]);

    // The snapshot itself streams back with its headers.
    let download = stack.reader.db_state("u", 5).await.unwrap();
    assert_eq!(download.content_length, 16);
    assert_eq!(
        download.content_type.as_deref(),
        Some("application/octet-stream")
    );
    assert_eq!(download.into_bytes().await.unwrap(), vec![0xDB; 16]);
}

#[tokio::test]
async fn lock_race_admits_one() {
    let stack = Stack::new();
    let coordinator = Arc::new(stack.coordinator);

    let mut handles = Vec::new();
    for _ in 0..2 {
        let coordinator = Arc::clone(&coordinator);
        handles.push(std::thread::spawn(move || coordinator.acquire_lock("u")));
    }
    let outcomes: Vec<Option<String>> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();

    let granted: Vec<&String> = outcomes.iter().flatten().collect();
    assert_eq!(granted.len(), 1);

    // After release the lock is available again.
    assert!(coordinator.release_lock("u", granted[0]));
    assert!(coordinator.acquire_lock("u").is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submits_allocate_compactly() {
    let stack = Stack::new();
    let engine = Arc::new(stack.engine);

    let mut handles = Vec::new();
    for i in 0..32u8 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine
                .submit("u", WriteCommand::insert(format!("item-{i}"), vec![i]))
                .await
                .unwrap()
        }));
    }

    let mut seqs = Vec::new();
    for handle in handles {
        seqs.push(handle.await.unwrap());
    }
    seqs.sort_unstable();
    let expected: Vec<u64> = (0..32).collect();
    assert_eq!(seqs, expected);

    // Every accepted write is visible at its sequence number.
    let log = stack.reader.transaction_log("u").await.unwrap();
    assert_eq!(log.transactions.len(), 32);
}

#[tokio::test]
async fn rollback_completeness_after_transient() {
    let stack = Stack::new();

    stack.store.inject_put_fault(PutFault::Reject);
    stack
        .engine
        .submit("u", WriteCommand::insert("ghost", vec![1]))
        .await
        .unwrap_err();
    settle().await;

    // The failed slot never reads back as committed.
    let log = stack.reader.transaction_log("u").await.unwrap();
    assert!(log.transactions.is_empty());

    // Running the rollback path again does not disturb the terminal slot.
    assert_eq!(stack.cache.slot_state("u", 0), Some(SlotState::RolledBack));
    let seq = stack
        .engine
        .submit("u", WriteCommand::insert("ghost", vec![1]))
        .await
        .unwrap();
    assert_eq!(seq, 1);
}

#[tokio::test]
async fn restart_rebuilds_projection() {
    let store = Arc::new(MemoryStore::new());

    // First process: three writes, the middle one rolled back.
    {
        let stack = Stack::over(Arc::clone(&store));
        stack
            .engine
            .submit("u", WriteCommand::insert("a", vec![1]))
            .await
            .unwrap();
        store.inject_put_fault(PutFault::Reject);
        stack
            .engine
            .submit("u", WriteCommand::insert("b", vec![2]))
            .await
            .unwrap_err();
        settle().await;
        stack
            .engine
            .submit("u", WriteCommand::insert("c", vec![3]))
            .await
            .unwrap();
    }

    // Second process over the same durable state.
    let stack = Stack::over(Arc::clone(&store));
    let log = stack.reader.transaction_log("u").await.unwrap();
    let seqs: Vec<u64> = log.transactions.iter().map(|tx| tx.sequence_no).collect();
    assert_eq!(seqs, vec![0, 2]);
    assert_eq!(stack.cache.slot_state("u", 1), Some(SlotState::RolledBack));

    // Allocation resumes past the reconstructed log.
    let seq = stack
        .engine
        .submit("u", WriteCommand::insert("d", vec![4]))
        .await
        .unwrap();
    assert_eq!(seq, 3);
}

#[tokio::test]
async fn restart_respects_bundle_watermark() {
    let store = Arc::new(MemoryStore::new());

    {
        let stack = Stack::over(Arc::clone(&store));
        stack.seed_user("alice", "u");
        for seq in 0u64..8 {
            stack
                .engine
                .submit("u", WriteCommand::insert(format!("item-{seq}"), vec![seq as u8]))
                .await
                .unwrap();
        }
        let lock_id = stack.coordinator.acquire_lock("u").unwrap();
        stack
            .coordinator
            .upload_bundle("u", 5, &lock_id, None, body_from_bytes(vec![0xDB]))
            .await
            .unwrap();
    }

    let stack = Stack::over(store);
    let log = stack.reader.transaction_log("u").await.unwrap();
    assert_eq!(log.bundle_seq_no, 5);
    let seqs: Vec<u64> = log.transactions.iter().map(|tx| tx.sequence_no).collect();
    assert_eq!(seqs, vec![6, 7]);
}

proptest! {
    // Any interleaving of pushes across users yields compact per-user
    // sequence ranges with no duplicates.
    #[test]
    fn sequence_allocation_is_compact(order in prop::collection::vec(0usize..4, 1..64)) {
        let cache = OplogCache::new();
        let mut expected = [0u64; 4];
        for user in order {
            let user_id = format!("user-{user}");
            let tx = cache.push(&user_id, WriteCommand::insert("item", vec![0]));
            prop_assert_eq!(tx.sequence_no, expected[user]);
            expected[user] += 1;
        }
    }
}
