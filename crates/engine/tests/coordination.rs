//! End-to-end debounce and single-winner behavior
//!
//! In-memory scenarios run on tokio's paused clock so the quiet period can be
//! checked to the millisecond. Sled scenarios use real time with a short
//! quiet period since sled flushes on its own threads.

mod common;

use common::{engine_config, key, GatedDispatcher, RecordingDispatcher, TokioClock};
use futures::future::join_all;
use settle_core::{unix_now_ms, Clock, KeyStateStore, SystemClock};
use settle_engine::{Coordinator, DispatchError, EngineError, EnqueueOutcome, Evaluation, ScheduledEvaluation};
use settle_store::{MemoryStore, SledStore};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const D: Duration = Duration::from_millis(5_000);

/// Timer deadlines snap to millisecond ticks, so allow a little slack
fn near(actual: Duration, expected_ms: u64) -> bool {
    (actual.as_millis() as u64).abs_diff(expected_ms) <= 3
}

async fn enqueue(coordinator: &Coordinator, k: &str, text: &str) -> ScheduledEvaluation {
    match coordinator.enqueue(key(k), text).await.unwrap() {
        EnqueueOutcome::Scheduled { evaluation, .. } => evaluation,
        EnqueueOutcome::Locked(record) => panic!("unexpected lock on {}", record.key),
    }
}

#[tokio::test(start_paused = true)]
async fn test_burst_dispatches_once_after_last_trigger() {
    let clock = TokioClock::start();
    let store = Arc::new(MemoryStore::new());
    let dispatcher = RecordingDispatcher::new();
    let coordinator = Coordinator::with_parts(&engine_config(D), store.clone(), dispatcher.clone(), clock);
    let start = tokio::time::Instant::now();

    let mut pending = vec![enqueue(&coordinator, "A", "one").await];
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    pending.push(enqueue(&coordinator, "A", "two").await);
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    pending.push(enqueue(&coordinator, "A", "three").await);

    let outcomes: Vec<_> = join_all(pending.into_iter().map(ScheduledEvaluation::wait))
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert!(matches!(outcomes[0], Evaluation::Superseded { idle } if near(idle, 3_000)));
    assert!(matches!(outcomes[1], Evaluation::Superseded { idle } if near(idle, 4_000)));
    assert!(matches!(outcomes[2], Evaluation::Dispatched { arrivals: 3, .. }));

    let deliveries = dispatcher.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].request.key, key("A"));
    assert_eq!(deliveries[0].request.payload, "one two three");
    assert!(near(deliveries[0].at - start, 7_000));
    assert!(store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_single_trigger_dispatches_after_quiet_period() {
    let clock = TokioClock::start();
    let store = Arc::new(MemoryStore::new());
    let dispatcher = RecordingDispatcher::new();
    let coordinator = Coordinator::with_parts(&engine_config(D), store.clone(), dispatcher.clone(), clock);
    let start = tokio::time::Instant::now();

    let outcome = enqueue(&coordinator, "A", "hello").await.wait().await.unwrap();

    assert!(outcome.is_dispatched());
    let deliveries = dispatcher.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert!(near(deliveries[0].at - start, 5_000));
    assert!(store.get(&key("A")).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_racing_evaluations_dispatch_once() {
    let clock = TokioClock::start();
    let store = Arc::new(MemoryStore::new());
    let dispatcher = GatedDispatcher::new();
    let coordinator = Arc::new(Coordinator::with_parts(
        &engine_config(D),
        store.clone(),
        dispatcher.clone(),
        clock.clone(),
    ));

    store.accumulate(&key("A"), "batch", clock.now_ms()).await.unwrap();
    tokio::time::sleep(D).await;

    // First evaluator takes the lock and parks inside the dispatcher
    let first = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.evaluate(&key("A")).await })
    };
    dispatcher.entered.notified().await;

    let second = coordinator.evaluate(&key("A")).await.unwrap();
    assert_eq!(second, Evaluation::LockLost);

    dispatcher.open();
    let first = first.await.unwrap().unwrap();
    assert!(matches!(first, Evaluation::Dispatched { arrivals: 1, .. }));
    assert_eq!(dispatcher.inner.count(), 1);
    assert!(store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_dispatch_leaves_record_locked() {
    let clock = TokioClock::start();
    let store = Arc::new(MemoryStore::new());
    let dispatcher = RecordingDispatcher::failing(500);
    let coordinator = Coordinator::with_parts(&engine_config(D), store.clone(), dispatcher.clone(), clock);

    let err = enqueue(&coordinator, "A", "doomed").await.wait().await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Dispatch { source: DispatchError::Status { status: 500, .. }, .. }
    ));

    let record = store.get(&key("A")).await.unwrap().unwrap();
    assert!(record.is_processing);
    assert_eq!(record.combined_payload, "doomed");

    // Nothing retries on its own
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(dispatcher.count(), 1);

    // Later arrivals are refused and later triggers lose the lock
    assert!(matches!(
        coordinator.enqueue(key("A"), "late").await.unwrap(),
        EnqueueOutcome::Locked(_)
    ));
    let outcome = coordinator.trigger(key("A")).wait().await.unwrap();
    assert_eq!(outcome, Evaluation::LockLost);
    assert_eq!(dispatcher.count(), 1);
    assert_eq!(store.get(&key("A")).await.unwrap().unwrap().combined_payload, "doomed");
}

#[tokio::test(start_paused = true)]
async fn test_next_arrival_after_dispatch_starts_fresh_cycle() {
    let clock = TokioClock::start();
    let store = Arc::new(MemoryStore::new());
    let dispatcher = RecordingDispatcher::new();
    let coordinator = Coordinator::with_parts(&engine_config(D), store.clone(), dispatcher.clone(), clock);

    enqueue(&coordinator, "A", "first").await.wait().await.unwrap();

    let record = match coordinator.enqueue(key("A"), "second").await.unwrap() {
        EnqueueOutcome::Scheduled { record, evaluation } => {
            evaluation.wait().await.unwrap();
            record
        }
        EnqueueOutcome::Locked(_) => panic!("fresh cycle should not be locked"),
    };
    assert_eq!(record.arrivals, 1);
    assert_eq!(record.combined_payload, "second");

    let payloads: Vec<_> = dispatcher.deliveries().into_iter().map(|d| d.request.payload).collect();
    assert_eq!(payloads, vec!["first", "second"]);
}

#[tokio::test(start_paused = true)]
async fn test_keys_are_independent() {
    let clock = TokioClock::start();
    let store = Arc::new(MemoryStore::new());
    let dispatcher = RecordingDispatcher::new();
    let coordinator = Coordinator::with_parts(&engine_config(D), store.clone(), dispatcher.clone(), clock);

    let a = enqueue(&coordinator, "A", "a1").await;
    tokio::time::sleep(Duration::from_millis(2_000)).await;
    let b = enqueue(&coordinator, "B", "b1").await;
    let a2 = enqueue(&coordinator, "A", "a2").await;

    let mut outcomes = Vec::new();
    for evaluation in [a, b, a2] {
        outcomes.push(evaluation.wait().await.unwrap().label());
    }
    assert_eq!(outcomes, vec!["superseded", "dispatched", "dispatched"]);

    let mut payloads: Vec<_> = dispatcher.deliveries().into_iter().map(|d| d.request.payload).collect();
    payloads.sort();
    assert_eq!(payloads, vec!["a1 a2", "b1"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sled_concurrent_evaluations_single_winner() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(SledStore::open(temp_dir.path()).unwrap());
    let dispatcher = RecordingDispatcher::new();
    let coordinator = Arc::new(Coordinator::with_parts(
        &engine_config(Duration::from_millis(50)),
        store.clone(),
        dispatcher.clone(),
        Arc::new(SystemClock),
    ));

    store
        .accumulate(&key("A"), "contended", unix_now_ms().saturating_sub(1_000))
        .await
        .unwrap();

    let handles: Vec<_> = (0..12)
        .map(|_| {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.evaluate(&key("A")).await })
        })
        .collect();

    let mut dispatched = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            Evaluation::Dispatched { .. } => dispatched += 1,
            Evaluation::LockLost | Evaluation::Absent => {}
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    assert_eq!(dispatched, 1);
    assert_eq!(dispatcher.count(), 1);
    assert_eq!(store.count(), 0);
}

#[tokio::test]
async fn test_sled_burst_coalesces() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(SledStore::open(temp_dir.path()).unwrap());
    let dispatcher = RecordingDispatcher::new();
    let coordinator = Coordinator::with_parts(
        &engine_config(Duration::from_millis(150)),
        store.clone(),
        dispatcher.clone(),
        Arc::new(SystemClock),
    );

    let mut pending = Vec::new();
    for text in ["x", "y", "z"] {
        pending.push(enqueue(&coordinator, "burst", text).await);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    for evaluation in pending {
        evaluation.wait().await.unwrap();
    }

    let deliveries = dispatcher.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].request.payload, "x y z");
    assert_eq!(store.count(), 0);
}

#[tokio::test]
async fn test_batch_survives_restart() {
    let temp_dir = TempDir::new().unwrap();

    {
        let store = SledStore::open(temp_dir.path()).unwrap();
        store.accumulate(&key("A"), "before", unix_now_ms()).await.unwrap();
        store.accumulate(&key("A"), "restart", unix_now_ms()).await.unwrap();
    }

    // A fresh process only needs a trigger; no timer state carried over
    let store = Arc::new(SledStore::open(temp_dir.path()).unwrap());
    let dispatcher = RecordingDispatcher::new();
    let coordinator = Coordinator::with_parts(
        &engine_config(Duration::from_millis(50)),
        store.clone(),
        dispatcher.clone(),
        Arc::new(SystemClock),
    );

    let outcome = coordinator.trigger(key("A")).wait().await.unwrap();
    assert!(matches!(outcome, Evaluation::Dispatched { arrivals: 2, .. }));
    assert_eq!(dispatcher.deliveries()[0].request.payload, "before restart");
    assert_eq!(store.count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_resume_pending_skips_locked_records() {
    let clock = TokioClock::start();
    let store = Arc::new(MemoryStore::new());
    store.accumulate(&key("open"), "left behind", 0).await.unwrap();
    store.accumulate(&key("stuck"), "failed earlier", 0).await.unwrap();
    store.conditional_set_processing(&key("stuck")).await.unwrap();

    let dispatcher = RecordingDispatcher::new();
    let coordinator = Coordinator::with_parts(&engine_config(D), store.clone(), dispatcher.clone(), clock);

    let pending = coordinator.resume_pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].key(), &key("open"));
    for evaluation in pending {
        assert!(evaluation.wait().await.unwrap().is_dispatched());
    }

    let deliveries = dispatcher.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].request.payload, "left behind");
    assert!(store.get(&key("stuck")).await.unwrap().unwrap().is_processing);
}
