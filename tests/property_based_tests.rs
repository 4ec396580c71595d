mod common;

use std::sync::Arc;

use common::jobs::{HookLog, TreeJob, TreeSpec};
use common::strategies::*;
use common::{RuntimeBuilder, TestRuntime};
use proptest::prelude::*;
use workbatch_core::batch::BatchProgress;
use workbatch_core::config::CleanupPolicy;
use workbatch_core::constants::events;

/// What a full drain of one generated tree left behind.
struct DrainOutcome {
    processed: u64,
    performed: usize,
    batch_complete_hooks: usize,
    batch_completed_events: usize,
    progress: BatchProgress,
    store_empty: bool,
    queue_empty: bool,
}

/// Drive a generated tree through a fresh runtime to quiescence.
fn drain_tree(spec: &TreeSpec, cleanup: CleanupPolicy) -> DrainOutcome {
    let spec = spec.clone();

    tokio_test::block_on(async move {
        let log = HookLog::new();
        let mut runtime = RuntimeBuilder::new()
            .with_cleanup(cleanup)
            .register("tree", Arc::new(TreeJob::new(log.clone())))
            .build();

        let root = runtime
            .client
            .enqueue("tree", spec.to_args())
            .await
            .unwrap();
        let processed = runtime.worker.drain().await;

        let published = runtime.take_events();
        let progress = runtime.client.batch_progress(root).await.unwrap();

        DrainOutcome {
            processed,
            performed: log.perform_sequence().len(),
            batch_complete_hooks: log.count("batch_complete"),
            batch_completed_events: TestRuntime::count_events(
                &published,
                events::BATCH_COMPLETED,
            ),
            progress,
            store_empty: runtime.store.is_empty(),
            queue_empty: runtime.queue.is_empty(),
        }
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    /// Property: every healthy tree settles — each node executes once, the
    /// batch completion hook fires exactly once, and immediate cleanup
    /// leaves nothing behind.
    #[test]
    fn healthy_trees_always_settle(spec in tree_spec_strategy()) {
        let expected = spec.node_count() as u64;
        let outcome = drain_tree(&spec, CleanupPolicy::Immediate);

        prop_assert!(outcome.queue_empty);
        prop_assert_eq!(outcome.processed, expected);
        prop_assert_eq!(outcome.performed as u64, expected);
        prop_assert_eq!(outcome.batch_complete_hooks, 1);
        prop_assert_eq!(outcome.batch_completed_events, 1);
        prop_assert!(outcome.store_empty, "cleanup must remove all records");
    }

    /// Property: trees with permanently failing nodes still settle, with
    /// every failure accounted exactly once. The batch completion hook fires
    /// unless the root itself died.
    #[test]
    fn faulty_trees_settle_with_exact_accounting(spec in faulty_tree_spec_strategy()) {
        let expected = spec.node_count() as u64;
        let failures = spec.failure_count() as u64;
        let outcome = drain_tree(&spec, CleanupPolicy::ExpireAfter { seconds: 3600 });

        prop_assert!(outcome.queue_empty);
        prop_assert_eq!(outcome.processed, expected, "permanent failures are not retried");
        prop_assert_eq!(outcome.progress.total, expected);
        prop_assert_eq!(outcome.progress.done, expected, "every node reaches a terminal state");
        prop_assert_eq!(outcome.progress.dead, failures);

        let expected_completions = usize::from(!spec.fail);
        prop_assert_eq!(outcome.batch_complete_hooks, expected_completions);
        prop_assert_eq!(outcome.batch_completed_events, expected_completions);
    }

    /// Property: derived progress arithmetic stays in range for any gauge
    /// readings, including torn ones where counters momentarily disagree.
    #[test]
    fn progress_arithmetic_never_overflows(
        total in 0u64..10_000,
        done in 0u64..10_000,
        dead in 0u64..10_000,
    ) {
        let progress = BatchProgress { total, done, dead };

        let _ = progress.succeeded();
        let _ = progress.pending();
        let percent = progress.percent_done();
        prop_assert!(percent >= 0.0);
        prop_assert!(percent.is_finite());

        // Display never panics either.
        let rendered = format!("{progress}");
        prop_assert!(rendered.contains("done"));
    }
}
