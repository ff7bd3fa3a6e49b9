//! Batch remediation executor: chunking, progress, partial failure, rejection

mod common;

use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde_json::json;
use tokio::sync::mpsc;
use tokio_test::assert_ok;

use common::{RecordingStore, StoreCall};
use datasync_console_lib::application::{BatchRemediationExecutor, BatchRunConfig};
use datasync_console_lib::{BatchJob, BatchProgress, ConflictType, EngineError, ExecutorState, Finding, FindingKind};

fn phone_fix(key: &str) -> Finding {
    Finding::new(FindingKind::PhoneFormat, key, ConflictType::Different)
        .with_current("+84 901 234 567")
        .with_proposed("0901234567")
}

fn phone_fixes(count: usize) -> Vec<Finding> {
    (1..=count).map(|i| phone_fix(&format!("o{i}"))).collect()
}

fn config(batch_size: usize) -> BatchRunConfig {
    BatchRunConfig {
        batch_size,
        inter_batch_delay_ms: 0,
        confirmation_token: None,
    }
}

fn executor(store: &Arc<RecordingStore>) -> BatchRemediationExecutor {
    BatchRemediationExecutor::new(store.clone())
}

#[tokio::test]
async fn progress_is_reported_once_per_chunk() {
    let store = Arc::new(RecordingStore::new(json!({})));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let result = executor(&store)
        .run(BatchJob::new(phone_fixes(25), config(10)), move |progress: BatchProgress| {
            sink.lock().unwrap().push((progress.processed, progress.total));
        })
        .await
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![(10, 25), (20, 25), (25, 25)]);
    assert_eq!(result.total, 25);
    assert_eq!(result.succeeded, 25);
    assert_eq!(result.final_state, ExecutorState::Completed);
    assert_eq!(store.writes().len(), 25);
}

#[tokio::test]
async fn one_failing_item_does_not_stop_the_batch() {
    let store = Arc::new(RecordingStore::new(json!({})));
    store.fail_writes_to("orders/o3");

    let result = assert_ok!(
        executor(&store)
            .run(BatchJob::new(phone_fixes(10), config(10)), |_| {})
            .await
    );

    assert_eq!(result.total, 10);
    assert_eq!(result.succeeded, 9);
    assert_eq!(result.failed, 1);
    assert_eq!(result.final_state, ExecutorState::PartiallyFailed);
    assert_eq!(result.per_item_errors.len(), 1);
    assert_eq!(result.per_item_errors[0].subject_key, "o3");
    assert_eq!(result.per_item_errors[0].kind, FindingKind::PhoneFormat);
    assert!(result.per_item_errors[0].error.contains("injected write failure"));

    // every other order was still written
    let dump = store.dump().await;
    assert_eq!(dump["orders"]["o10"]["customerPhone"], json!("0901234567"));
    assert!(dump["orders"].get("o3").is_none());
}

#[tokio::test]
async fn wrong_confirmation_token_touches_nothing() {
    let store = Arc::new(RecordingStore::new(json!({
        "orders": { "legacy-key": { "id": "o-1" } }
    })));
    let mut rename = Finding::new(FindingKind::WrongStorageKey, "legacy-key", ConflictType::Different)
        .with_current("legacy-key")
        .with_proposed("o-1");
    rename.metadata.record = Some(json!({ "id": "o-1" }));

    for token in [None, Some("rename"), Some("RENAME ")] {
        let mut run_config = config(10);
        run_config.confirmation_token = token.map(String::from);
        let outcome = executor(&store)
            .run(BatchJob::new(vec![phone_fix("o2"), rename.clone()], run_config), |_| {})
            .await;
        assert!(matches!(outcome, Err(EngineError::ValidationRejected(_))));
    }
    assert!(store.calls().is_empty());

    let confirmed = config(10).with_confirmation("RENAME");
    let result = assert_ok!(executor(&store).run(BatchJob::new(vec![rename], confirmed), |_| {}).await);
    assert_eq!(result.succeeded, 1);
    assert_eq!(
        store.writes(),
        vec![StoreCall::Set("orders/o-1".into()), StoreCall::Remove("orders/legacy-key".into())]
    );
}

#[tokio::test]
async fn one_unplannable_finding_rejects_the_whole_batch() {
    let store = Arc::new(RecordingStore::new(json!({})));
    let mut findings = phone_fixes(5);
    findings.push(Finding::new(FindingKind::MissingTimeSlot, "o9", ConflictType::Missing));

    let outcome = executor(&store).run(BatchJob::new(findings, config(2)), |_| {}).await;

    match outcome {
        Err(EngineError::ValidationRejected(reason)) => assert!(reason.contains("o9")),
        other => panic!("expected rejection, got {other:?}"),
    }
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn zero_batch_size_and_empty_jobs_are_refused() {
    let store = Arc::new(RecordingStore::new(json!({})));

    let zero = executor(&store).run(BatchJob::new(phone_fixes(3), config(0)), |_| {}).await;
    assert!(matches!(zero, Err(EngineError::Config(_))));

    let empty = executor(&store).run(BatchJob::new(Vec::new(), config(10)), |_| {}).await;
    assert!(matches!(empty, Err(EngineError::ValidationRejected(_))));
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn progress_can_be_streamed_over_a_channel() {
    let store = Arc::new(RecordingStore::new(json!({})));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let result = executor(&store)
        .run_with_channel(BatchJob::new(phone_fixes(7), config(3)), tx)
        .await
        .unwrap();

    let mut updates = Vec::new();
    while let Some(progress) = rx.recv().await {
        assert_eq!(progress.run_id, result.run_id);
        updates.push(progress.processed);
    }
    assert_eq!(updates, vec![3, 6, 7]);
}

#[tokio::test]
async fn delay_only_between_chunks() {
    let store = Arc::new(RecordingStore::new(json!({})));
    let mut run_config = config(2);
    run_config.inter_batch_delay_ms = 30;

    // 3 chunks, so two pauses
    let started = Instant::now();
    executor(&store)
        .run(BatchJob::new(phone_fixes(6), run_config.clone()), |_| {})
        .await
        .unwrap();
    assert!(started.elapsed().as_millis() >= 60);

    // a single chunk never sleeps
    run_config.inter_batch_delay_ms = 2_000;
    let started = Instant::now();
    executor(&store)
        .run(BatchJob::new(phone_fixes(2), run_config), |_| {})
        .await
        .unwrap();
    assert!(started.elapsed().as_millis() < 2_000);
}

#[tokio::test]
async fn runs_are_independent() {
    let store = Arc::new(RecordingStore::new(json!({})));
    let executor = executor(&store);

    let (first, second) = tokio::join!(
        executor.run(BatchJob::new(phone_fixes(4), config(2)), |_| {}),
        executor.run(BatchJob::new(phone_fixes(3), config(2)), |_| {}),
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.total, 4);
    assert_eq!(second.total, 3);
}
