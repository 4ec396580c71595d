//! # Workbatch Client
//!
//! ## Overview
//!
//! The assembled runtime: wires the node repository, callback dispatcher, and
//! completion propagator over an injected store, queue backend, and handler
//! registry. One client instance serves a whole process; it is cheap to share
//! behind an `Arc` and every operation is safe under concurrency.
//!
//! There is no global state anywhere in this crate. A test can build two
//! clients over two stores in the same process and they will never observe
//! each other.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use crate::batch::{
    BatchHandle, BatchNode, BatchNodeRepository, BatchProgress, CallbackDispatcher,
    CompletionOutcome, CompletionPropagator,
};
use crate::config::WorkbatchConfig;
use crate::constants::events;
use crate::error::Result;
use crate::events::{EventPublisher, PublishedEvent};
use crate::job::{JobId, JobPayload, JobRegistry};
use crate::queue::{ensure_within_limit, QueueBackend};
use crate::store::KeyedStore;

/// Entry point for enqueueing jobs and reporting their completion.
#[derive(Clone)]
pub struct WorkbatchClient {
    config: WorkbatchConfig,
    backend: Arc<dyn QueueBackend>,
    registry: Arc<JobRegistry>,
    repository: BatchNodeRepository,
    propagator: CompletionPropagator,
    events: EventPublisher,
}

impl WorkbatchClient {
    /// Assemble a client over the given store, queue backend, and registry.
    pub fn new(
        store: Arc<dyn KeyedStore>,
        backend: Arc<dyn QueueBackend>,
        registry: Arc<JobRegistry>,
        config: WorkbatchConfig,
    ) -> Self {
        Self::with_event_publisher(store, backend, registry, config, EventPublisher::default())
    }

    /// Assemble a client that publishes lifecycle events through `events`,
    /// e.g. a channel shared with an external observer.
    pub fn with_event_publisher(
        store: Arc<dyn KeyedStore>,
        backend: Arc<dyn QueueBackend>,
        registry: Arc<JobRegistry>,
        config: WorkbatchConfig,
        events: EventPublisher,
    ) -> Self {
        let repository = BatchNodeRepository::with_settings(
            store,
            &config.store.key_prefix,
            config.store.node_ttl(),
        );
        let dispatcher = CallbackDispatcher::new(Arc::clone(&registry), events.clone());
        let propagator = CompletionPropagator::new(
            repository.clone(),
            dispatcher,
            events.clone(),
            config.store.cleanup,
        );

        Self {
            config,
            backend,
            registry,
            repository,
            propagator,
            events,
        }
    }

    /// Enqueue a root job on the default queue. The job anchors a new batch
    /// tree whose node shares the returned id.
    pub async fn enqueue(&self, job: &str, args: serde_json::Value) -> Result<JobId> {
        self.enqueue_on(job, args, &self.config.queue.default_queue)
            .await
    }

    /// Enqueue a root job on a specific queue.
    pub async fn enqueue_on(
        &self,
        job: &str,
        args: serde_json::Value,
        queue: &str,
    ) -> Result<JobId> {
        let payload = JobPayload::new(job, args).with_queue(queue);

        ensure_within_limit(&payload, self.payload_limit())?;
        self.repository.create_node(&payload).await?;
        let _ = self
            .events
            .publish(
                events::NODE_CREATED,
                json!({ "node_id": payload.id, "parent_id": null }),
            )
            .await;

        if let Err(e) = self.backend.enqueue(&payload).await {
            warn!(
                job_id = %payload.id,
                job = %payload.job,
                error = %e,
                "Root enqueue failed after node creation"
            );
            return Err(e.into());
        }

        info!(
            job_id = %payload.id,
            job = %payload.job,
            queue = %payload.queue,
            "🚀 Enqueued root job"
        );
        let _ = self
            .events
            .publish(
                events::JOB_ENQUEUED,
                json!({
                    "job_id": payload.id,
                    "job": payload.job,
                    "queue": payload.queue,
                    "parent_id": null,
                }),
            )
            .await;

        Ok(payload.id)
    }

    /// Report the terminal outcome of one job execution. Idempotent under
    /// at-least-once delivery.
    pub async fn report_completion(
        &self,
        node_id: JobId,
        outcome: CompletionOutcome,
    ) -> Result<()> {
        self.propagator.report_completion(node_id, outcome).await?;
        Ok(())
    }

    /// Progress counters for the tree rooted at `root_id`.
    pub async fn batch_progress(&self, root_id: JobId) -> Result<BatchProgress> {
        Ok(self.repository.progress(root_id).await?)
    }

    /// Read one node record, if it still exists.
    pub async fn fetch_node(&self, node_id: JobId) -> Result<Option<BatchNode>> {
        Ok(self.repository.fetch(node_id).await?)
    }

    /// Batch operations scoped to `node_id`, as handed to running jobs.
    pub fn handle_for(&self, node_id: JobId) -> BatchHandle {
        BatchHandle::new(
            node_id,
            self.repository.clone(),
            Arc::clone(&self.backend),
            self.events.clone(),
            &self.config.queue.default_queue,
        )
        .with_payload_limit(self.payload_limit())
    }

    /// Subscribe to the lifecycle event stream.
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<PublishedEvent> {
        self.events.subscribe()
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn repository(&self) -> &BatchNodeRepository {
        &self.repository
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    pub fn config(&self) -> &WorkbatchConfig {
        &self.config
    }

    /// Effective payload limit: the tighter of configuration and backend.
    fn payload_limit(&self) -> usize {
        self.config
            .queue
            .max_payload_bytes
            .min(self.backend.max_payload_bytes())
    }
}

impl std::fmt::Debug for WorkbatchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkbatchClient")
            .field("default_queue", &self.config.queue.default_queue)
            .field("registered_jobs", &self.registry.len())
            .finish_non_exhaustive()
    }
}
