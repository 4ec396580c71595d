//! Concurrency behavior: many siblings finishing at once must produce exactly
//! one tree completion, and registration interleaved with completion must not
//! lose counts.

mod common;

use std::sync::Arc;

use common::{HookLog, NoopJob, RuntimeBuilder, TestRuntime, TreeJob, TreeSpec};
use futures::future::join_all;
use workbatch_core::batch::CompletionOutcome;
use workbatch_core::config::CleanupPolicy;
use workbatch_core::constants::events;
use workbatch_core::job::JobId;

#[tokio::test]
async fn test_concurrent_siblings_complete_exactly_once() {
    let log = HookLog::new();
    let mut runtime = RuntimeBuilder::new()
        .with_concurrency(8)
        .register("tree", Arc::new(TreeJob::new(log.clone())))
        .build();

    let children: Vec<TreeSpec> = (0..16).map(|i| TreeSpec::leaf(&format!("c{i}"))).collect();
    let spec = TreeSpec::branch("R", children);
    let root = runtime
        .client
        .enqueue("tree", spec.to_args())
        .await
        .unwrap();

    let processed = runtime.worker.drain_concurrent().await;
    assert_eq!(processed, 17);

    assert_eq!(log.count("batch_complete"), 1);
    assert_eq!(log.count("child_complete"), 16);

    let published = runtime.take_events();
    assert_eq!(
        TestRuntime::count_events(&published, events::BATCH_COMPLETED),
        1
    );
    assert_eq!(
        TestRuntime::count_events(&published, events::NODE_COMPLETED),
        17
    );

    // Immediate cleanup ran exactly once and emptied the store.
    assert_eq!(
        TestRuntime::count_events(&published, events::BATCH_CLEANED_UP),
        1
    );
    assert!(runtime.queue.is_empty());
    assert!(runtime.client.fetch_node(root).await.unwrap().is_none());
}

/// Completion reports racing in from many tasks at once: the cascade into the
/// root must have a single winner.
#[tokio::test]
async fn test_racing_completion_reports_have_single_winner() {
    let mut runtime = RuntimeBuilder::new()
        .with_cleanup(CleanupPolicy::ExpireAfter { seconds: 3600 })
        .register("noop", Arc::new(NoopJob))
        .build();

    let root = runtime
        .client
        .enqueue("noop", serde_json::json!(null))
        .await
        .unwrap();
    let handle = runtime.client.handle_for(root);

    let mut children: Vec<JobId> = Vec::new();
    for i in 0..20 {
        children.push(handle.add("noop", serde_json::json!(i)).await.unwrap());
    }
    // Root's own execution finishes before its children.
    runtime
        .client
        .report_completion(root, CompletionOutcome::Success)
        .await
        .unwrap();

    let reports = children.into_iter().map(|child| {
        let client = Arc::clone(&runtime.client);
        tokio::spawn(async move {
            client
                .report_completion(child, CompletionOutcome::Success)
                .await
                .unwrap();
        })
    });
    for joined in join_all(reports).await {
        joined.unwrap();
    }

    let published = runtime.take_events();
    assert_eq!(
        TestRuntime::count_events(&published, events::BATCH_COMPLETED),
        1,
        "root completion must have exactly one winner"
    );
    assert_eq!(
        TestRuntime::count_events(&published, events::NODE_COMPLETED),
        21
    );

    let progress = runtime.client.batch_progress(root).await.unwrap();
    assert_eq!(progress.total, 21);
    assert_eq!(progress.done, 21);
    assert_eq!(progress.dead, 0);
}

#[tokio::test]
async fn test_racing_mixed_outcomes_accounted_once_each() {
    let mut runtime = RuntimeBuilder::new()
        .with_cleanup(CleanupPolicy::ExpireAfter { seconds: 3600 })
        .register("noop", Arc::new(NoopJob))
        .build();

    let root = runtime
        .client
        .enqueue("noop", serde_json::json!(null))
        .await
        .unwrap();
    let handle = runtime.client.handle_for(root);

    let mut children: Vec<JobId> = Vec::new();
    for i in 0..12 {
        children.push(handle.add("noop", serde_json::json!(i)).await.unwrap());
    }
    runtime
        .client
        .report_completion(root, CompletionOutcome::Success)
        .await
        .unwrap();

    let reports = children.into_iter().enumerate().map(|(i, child)| {
        let client = Arc::clone(&runtime.client);
        let outcome = if i % 2 == 0 {
            CompletionOutcome::Success
        } else {
            CompletionOutcome::PermanentFailure
        };
        tokio::spawn(async move {
            // Duplicate delivery of every report, concurrently.
            let first = client.report_completion(child, outcome);
            let second = client.report_completion(child, outcome);
            let (a, b) = tokio::join!(first, second);
            a.unwrap();
            b.unwrap();
        })
    });
    for joined in join_all(reports).await {
        joined.unwrap();
    }

    let published = runtime.take_events();
    assert_eq!(
        TestRuntime::count_events(&published, events::BATCH_COMPLETED),
        1
    );
    assert_eq!(TestRuntime::count_events(&published, events::NODE_DEAD), 6);

    let progress = runtime.client.batch_progress(root).await.unwrap();
    assert_eq!(progress.total, 13);
    assert_eq!(progress.done, 13, "duplicates never double-count");
    assert_eq!(progress.dead, 6);
    assert_eq!(progress.succeeded(), 7);
}

/// Registration interleaved with completion: the count-based completion rule
/// tolerates children arriving in waves while earlier waves finish.
#[tokio::test]
async fn test_interleaved_registration_and_completion() {
    let runtime = RuntimeBuilder::new()
        .with_cleanup(CleanupPolicy::ExpireAfter { seconds: 3600 })
        .register("noop", Arc::new(NoopJob))
        .build();

    let root = runtime
        .client
        .enqueue("noop", serde_json::json!(null))
        .await
        .unwrap();
    let handle = runtime.client.handle_for(root);

    let first_wave: Vec<JobId> = {
        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(handle.add("noop", serde_json::json!(i)).await.unwrap());
        }
        ids
    };
    for child in &first_wave {
        runtime
            .client
            .report_completion(*child, CompletionOutcome::Success)
            .await
            .unwrap();
    }

    // Root is still executing, so it can keep registering.
    let second_wave: Vec<JobId> = {
        let mut ids = Vec::new();
        for i in 5..10 {
            ids.push(handle.add("noop", serde_json::json!(i)).await.unwrap());
        }
        ids
    };

    runtime
        .client
        .report_completion(root, CompletionOutcome::Success)
        .await
        .unwrap();
    let mid = runtime.client.fetch_node(root).await.unwrap().unwrap();
    assert_eq!(mid.completed_children, 5);
    assert_eq!(mid.expected_children, 10);
    assert!(!mid.is_complete());

    for child in &second_wave {
        runtime
            .client
            .report_completion(*child, CompletionOutcome::Success)
            .await
            .unwrap();
    }

    let done = runtime.client.fetch_node(root).await.unwrap().unwrap();
    assert!(done.is_complete());
    let progress = runtime.client.batch_progress(root).await.unwrap();
    assert_eq!(progress.total, 11);
    assert_eq!(progress.done, 11);
}
