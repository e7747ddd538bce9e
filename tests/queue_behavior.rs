use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use serde_json::json;
use tokio::sync::Notify;

use mutqueue::{
    codec::decode_queue,
    persist::{StorageAdapter, memory::MemoryStorage},
    runtime::{
        config::{DEFAULT_STORAGE_KEY, QueueConfig},
        handle::{DrainOutcome, MutationQueue, Skip},
        processor::{Processor, ProcessorError, processor_fn},
    },
    types::{MutationId, NetworkStatus},
};

/// Records every mutation it sees and fails the first `fail_first` calls.
fn recording(fail_first: usize) -> (Arc<dyn Processor>, Arc<Mutex<Vec<MutationId>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_in = Arc::clone(&seen);
    let calls = Arc::new(AtomicUsize::new(0));
    let processor = processor_fn(move |m| {
        let seen = Arc::clone(&seen_in);
        let n = calls.fetch_add(1, Ordering::SeqCst);
        async move {
            seen.lock().expect("lock").push(m.id);
            if n < fail_first {
                Err(ProcessorError::failed(format!("attempt {n} refused")))
            } else {
                Ok(())
            }
        }
    });
    (processor, seen)
}

fn always_failing() -> (Arc<dyn Processor>, Arc<Mutex<Vec<MutationId>>>) {
    recording(usize::MAX)
}

async fn spawn_memory(config: QueueConfig) -> (MutationQueue, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    let queue = MutationQueue::spawn(storage.clone(), config).await;
    (queue, storage)
}

#[tokio::test]
async fn processes_in_enqueue_order() {
    let (queue, storage) = spawn_memory(QueueConfig::default()).await;
    let (processor, seen) = recording(0);
    queue.set_processor(processor).await.expect("processor");

    let m1 = queue.enqueue("create_task", json!({"title": "1"})).await.expect("m1");
    let m2 = queue.enqueue("create_task", json!({"title": "2"})).await.expect("m2");
    let m3 = queue.enqueue("update_note", json!({"id": "n"})).await.expect("m3");
    queue.idle().await.expect("idle");

    assert_eq!(*seen.lock().expect("lock"), vec![m1, m2, m3]);
    assert_eq!(queue.queue_length(), 0);
    assert!(storage.is_empty(), "empty queue leaves no persisted key");
}

#[tokio::test]
async fn enqueued_state_survives_a_new_queue_instance() {
    let config = QueueConfig {
        initial_network: NetworkStatus::Offline,
        ..QueueConfig::default()
    };
    let (queue, storage) = spawn_memory(config.clone()).await;

    let id = queue
        .enqueue("create_task", json!({"title": "x"}))
        .await
        .expect("enqueue");
    assert_eq!(queue.queue_length(), 1);
    queue.shutdown().await.expect("shutdown");

    let reopened = MutationQueue::spawn(storage.clone(), config).await;
    assert_eq!(reopened.queue_length(), 1);

    let pending = reopened.pending().await.expect("pending");
    assert_eq!(pending[0].id, id);
    assert_eq!(pending[0].kind, "create_task");
    assert_eq!(pending[0].payload, json!({"title": "x"}));
    assert_eq!(pending[0].retry_count, 0);
}

#[tokio::test]
async fn concurrent_process_calls_invoke_processor_once() {
    let (queue, _storage) = spawn_memory(QueueConfig::default()).await;
    let id = queue.enqueue("create_task", json!({})).await.expect("enqueue");

    let gate = Arc::new(Notify::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let (gate_in, calls_in) = (Arc::clone(&gate), Arc::clone(&calls));
    queue
        .set_processor(processor_fn(move |_| {
            let gate = Arc::clone(&gate_in);
            calls_in.fetch_add(1, Ordering::SeqCst);
            async move {
                gate.notified().await;
                Ok(())
            }
        }))
        .await
        .expect("processor");

    let first = queue.process();
    let second = queue.process();
    let third = queue.process();
    assert_eq!(
        second.await.expect("second"),
        DrainOutcome::Skipped(Skip::AlreadyDraining)
    );
    assert_eq!(
        third.await.expect("third"),
        DrainOutcome::Skipped(Skip::AlreadyDraining)
    );

    tokio::time::timeout(Duration::from_secs(2), async {
        while calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("processor called");

    gate.notify_one();
    match first.await.expect("first") {
        DrainOutcome::Completed(report) => {
            assert_eq!(report.succeeded, vec![id]);
            assert_eq!(report.remaining, 0);
        }
        other => panic!("expected completed drain, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn succeeds_on_last_allowed_attempt() {
    let (queue, _storage) = spawn_memory(QueueConfig::default()).await;
    let id = queue.enqueue("create_task", json!({})).await.expect("enqueue");
    let (processor, seen) = recording(2);
    queue.set_processor(processor).await.expect("processor");

    for expected_retry in 1..=2 {
        match queue.process().await.expect("process") {
            DrainOutcome::Completed(report) => {
                let failed = report.failed.expect("failed attempt");
                assert_eq!(failed.id, id);
                assert_eq!(failed.retry_count, expected_retry);
                assert!(!failed.dropped);
                assert_eq!(report.remaining, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
        let pending = queue.pending().await.expect("pending");
        assert_eq!(pending[0].retry_count, expected_retry);
    }

    match queue.process().await.expect("process") {
        DrainOutcome::Completed(report) => {
            assert_eq!(report.succeeded, vec![id]);
            assert!(report.failed.is_none());
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(queue.queue_length(), 0);
    assert_eq!(seen.lock().expect("lock").len(), 3);
}

#[tokio::test]
async fn always_failing_mutation_is_dropped_after_max_retries() {
    let (queue, storage) = spawn_memory(QueueConfig::default()).await;
    let a = queue
        .enqueue("create_task", json!({"title": "x"}))
        .await
        .expect("enqueue");
    let (processor, seen) = always_failing();
    queue.set_processor(processor).await.expect("processor");

    for _ in 0..3 {
        let outcome = queue.process().await.expect("process");
        assert!(matches!(outcome, DrainOutcome::Completed(_)));
    }

    assert_eq!(queue.queue_length(), 0);
    assert_eq!(*seen.lock().expect("lock"), vec![a, a, a]);
    assert!(storage.is_empty());
    assert_eq!(
        queue.process().await.expect("process"),
        DrainOutcome::Skipped(Skip::Empty)
    );
}

#[tokio::test]
async fn failure_does_not_advance_to_later_mutations() {
    let (queue, _storage) = spawn_memory(QueueConfig::default()).await;
    let a = queue.enqueue("a", json!(1)).await.expect("a");
    let b = queue.enqueue("b", json!(2)).await.expect("b");
    let (processor, seen) = recording(1);
    queue.set_processor(processor).await.expect("processor");

    let first = queue.process().await.expect("first");
    assert!(matches!(first, DrainOutcome::Completed(ref r) if r.succeeded.is_empty()));
    assert_eq!(queue.queue_length(), 2);

    queue.process().await.expect("second");
    assert_eq!(*seen.lock().expect("lock"), vec![a, a, b]);
    assert_eq!(queue.queue_length(), 0);
}

#[tokio::test]
async fn offline_enqueues_wait_for_online_transition() {
    let (queue, _storage) = spawn_memory(QueueConfig::default()).await;
    let (processor, seen) = recording(0);
    queue.set_processor(processor).await.expect("processor");
    queue
        .set_network_status(NetworkStatus::Offline)
        .await
        .expect("offline");

    let mut ids = Vec::new();
    for i in 0..4 {
        ids.push(queue.enqueue("create_task", json!({"n": i})).await.expect("enqueue"));
    }
    assert_eq!(queue.queue_length(), 4);
    assert_eq!(
        queue.process().await.expect("process"),
        DrainOutcome::Skipped(Skip::Offline)
    );
    assert!(seen.lock().expect("lock").is_empty());

    queue
        .set_network_status(NetworkStatus::Online)
        .await
        .expect("online");
    queue.idle().await.expect("idle");

    assert_eq!(*seen.lock().expect("lock"), ids);
    assert_eq!(queue.queue_length(), 0);
    assert_eq!(
        queue.network_status().await.expect("status"),
        NetworkStatus::Online
    );
}

#[tokio::test]
async fn going_offline_mid_drain_stops_after_in_flight_call() {
    let (queue, _storage) = spawn_memory(QueueConfig::default()).await;
    let a = queue.enqueue("a", json!(1)).await.expect("a");
    queue.enqueue("b", json!(2)).await.expect("b");

    let gate = Arc::new(Notify::new());
    let gate_in = Arc::clone(&gate);
    queue
        .set_processor(processor_fn(move |_| {
            let gate = Arc::clone(&gate_in);
            async move {
                gate.notified().await;
                Ok(())
            }
        }))
        .await
        .expect("processor");

    let drain = queue.process();
    queue
        .set_network_status(NetworkStatus::Offline)
        .await
        .expect("offline");
    gate.notify_one();

    match drain.await.expect("drain") {
        DrainOutcome::Completed(report) => {
            assert_eq!(report.succeeded, vec![a]);
            assert_eq!(report.stopped_by, Some(Skip::Offline));
            assert_eq!(report.remaining, 1);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn corrupt_state_starts_empty_and_recovers() {
    let storage = Arc::new(MemoryStorage::with_entry(DEFAULT_STORAGE_KEY, "{{{ not json"));
    let queue = MutationQueue::spawn(storage.clone(), QueueConfig {
        initial_network: NetworkStatus::Offline,
        ..QueueConfig::default()
    })
    .await;
    assert_eq!(queue.queue_length(), 0);

    let id = queue.enqueue("create_note", json!({"body": "b"})).await.expect("enqueue");
    assert_eq!(queue.queue_length(), 1);

    let raw = storage
        .get(DEFAULT_STORAGE_KEY)
        .await
        .expect("get")
        .expect("persisted");
    let stored = decode_queue(&raw).expect("decodes now");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, id);
}

#[tokio::test]
async fn processor_registered_later_replaces_earlier() {
    let (queue, _storage) = spawn_memory(QueueConfig::default()).await;
    let (first, first_seen) = recording(0);
    let (second, second_seen) = recording(0);
    queue.set_processor(first).await.expect("first");
    queue.set_processor(second).await.expect("second");

    queue.enqueue("a", json!(null)).await.expect("enqueue");
    queue.idle().await.expect("idle");

    assert!(first_seen.lock().expect("lock").is_empty());
    assert_eq!(second_seen.lock().expect("lock").len(), 1);

    queue.clear_processor().await.expect("clear");
    queue.enqueue("b", json!(null)).await.expect("enqueue");
    assert_eq!(
        queue.process().await.expect("process"),
        DrainOutcome::Skipped(Skip::NoProcessor)
    );
}

#[tokio::test]
async fn dropped_replies_still_apply_in_order() {
    let (queue, _storage) = spawn_memory(QueueConfig {
        initial_network: NetworkStatus::Offline,
        ..QueueConfig::default()
    })
    .await;

    for i in 0..5 {
        drop(queue.enqueue("fire_and_forget", json!(i)));
    }
    let pending = queue.pending().await.expect("pending");
    let payloads: Vec<_> = pending.iter().map(|m| m.payload.clone()).collect();
    assert_eq!(payloads, (0..5).map(|i| json!(i)).collect::<Vec<_>>());
    assert_eq!(queue.queue_length(), 5);
}
