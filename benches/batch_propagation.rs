use std::sync::Arc;

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use workbatch_core::client::WorkbatchClient;
use workbatch_core::config::WorkbatchConfig;
use workbatch_core::job::{JobContext, JobError, JobHandler, JobPayload, JobRegistry, JobResult};
use workbatch_core::queue::{MemoryQueue, QueueBackend};
use workbatch_core::store::MemoryStore;
use workbatch_core::worker::LocalWorker;

/// Spawns `width` children per node until `depth` reaches zero.
struct SpreadJob;

#[async_trait]
impl JobHandler for SpreadJob {
    async fn perform(&self, ctx: &JobContext) -> JobResult<()> {
        let (width, depth): (u32, u32) = ctx.args()?;
        if depth > 0 {
            for _ in 0..width {
                ctx.batch()
                    .add("spread", serde_json::json!([width, depth - 1]))
                    .await
                    .map_err(|e| JobError::retryable(e.to_string()))?;
            }
        }
        Ok(())
    }
}

/// One client and worker shared across iterations; the default immediate
/// cleanup policy leaves the store and queue empty after every drain.
fn build_runtime() -> (Arc<WorkbatchClient>, LocalWorker) {
    let registry = Arc::new(JobRegistry::new());
    registry.register("spread", Arc::new(SpreadJob));

    let queue = Arc::new(MemoryQueue::new());
    let client = Arc::new(WorkbatchClient::new(
        Arc::new(MemoryStore::new()),
        Arc::clone(&queue) as Arc<dyn QueueBackend>,
        registry,
        WorkbatchConfig::default(),
    ));
    let worker = LocalWorker::new(Arc::clone(&client), queue);
    (client, worker)
}

async fn settle_tree(client: &WorkbatchClient, worker: &LocalWorker, width: u32, depth: u32) -> u64 {
    client
        .enqueue("spread", serde_json::json!([width, depth]))
        .await
        .expect("enqueue root");
    worker.drain().await
}

fn benchmark_payload_encoding(c: &mut Criterion) {
    let payload = JobPayload::new("spread", serde_json::json!([16, 1]));
    c.bench_function("payload_encoding", |b| {
        b.iter(|| black_box(&payload).to_json().expect("encode payload"))
    });
}

fn benchmark_single_job_settle(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let (client, worker) = build_runtime();
    c.bench_function("settle_single_job", |b| {
        b.iter(|| runtime.block_on(settle_tree(&client, &worker, black_box(0), black_box(0))))
    });
}

fn benchmark_fanout_drain(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let (client, worker) = build_runtime();
    c.bench_function("drain_fanout_16", |b| {
        b.iter(|| runtime.block_on(settle_tree(&client, &worker, black_box(16), black_box(1))))
    });
}

fn benchmark_deep_chain_drain(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let (client, worker) = build_runtime();
    c.bench_function("drain_chain_depth_8", |b| {
        b.iter(|| runtime.block_on(settle_tree(&client, &worker, black_box(1), black_box(8))))
    });
}

criterion_group!(
    benches,
    benchmark_payload_encoding,
    benchmark_single_job_settle,
    benchmark_fanout_drain,
    benchmark_deep_chain_drain
);
criterion_main!(benches);
