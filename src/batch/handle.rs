//! # Batch Handle
//!
//! The API a running job uses to grow its own batch. A handle is scoped to one
//! node and hands out child spawning plus a progress view; it is cheap to
//! clone and safe to use from concurrent tasks inside the job body.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use crate::constants::events;
use crate::events::EventPublisher;
use crate::job::{JobId, JobPayload};
use crate::queue::{ensure_within_limit, QueueBackend};

use super::progress::BatchProgress;
use super::repository::BatchNodeRepository;
use super::{BatchError, BatchResult};

/// Spawning and progress operations scoped to one batch node.
#[derive(Clone)]
pub struct BatchHandle {
    node_id: JobId,
    repository: BatchNodeRepository,
    backend: Arc<dyn QueueBackend>,
    events: EventPublisher,
    default_queue: String,
    max_payload_bytes: usize,
}

impl BatchHandle {
    pub fn new(
        node_id: JobId,
        repository: BatchNodeRepository,
        backend: Arc<dyn QueueBackend>,
        events: EventPublisher,
        default_queue: impl Into<String>,
    ) -> Self {
        let max_payload_bytes = backend.max_payload_bytes();
        Self {
            node_id,
            repository,
            backend,
            events,
            default_queue: default_queue.into(),
            max_payload_bytes,
        }
    }

    /// Tighten the payload limit below what the backend accepts.
    pub fn with_payload_limit(mut self, limit: usize) -> Self {
        self.max_payload_bytes = limit.min(self.backend.max_payload_bytes());
        self
    }

    /// The node this handle operates on.
    pub fn node_id(&self) -> JobId {
        self.node_id
    }

    /// Spawn a child job on the default queue. The child's completion becomes
    /// part of this node's completion.
    pub async fn add(&self, job: &str, args: serde_json::Value) -> BatchResult<JobId> {
        self.add_on(job, args, &self.default_queue).await
    }

    /// Spawn a child job on a specific queue.
    ///
    /// Ordering matters here: the payload is size-checked first so an
    /// oversized job leaves no trace, then the child is registered on the
    /// parent (which fails once the parent sealed), then the child's record is
    /// created, and only then is the payload submitted to the backend.
    pub async fn add_on(
        &self,
        job: &str,
        args: serde_json::Value,
        queue: &str,
    ) -> BatchResult<JobId> {
        let payload = JobPayload::new(job, args)
            .with_queue(queue)
            .with_parent(self.node_id);

        ensure_within_limit(&payload, self.max_payload_bytes)?;

        self.repository.register_child(self.node_id, payload.id).await?;
        self.repository.create_node(&payload).await?;
        let _ = self
            .events
            .publish(
                events::NODE_CREATED,
                json!({
                    "node_id": payload.id,
                    "parent_id": self.node_id,
                }),
            )
            .await;

        if let Err(e) = self.backend.enqueue(&payload).await {
            // The registered child will never run; its record settles the
            // parent only once the tree's TTL reclaims it.
            warn!(
                parent_id = %self.node_id,
                child_id = %payload.id,
                error = %e,
                "Child enqueue failed after registration"
            );
            return Err(BatchError::Queue(e));
        }

        debug!(
            parent_id = %self.node_id,
            child_id = %payload.id,
            job = %payload.job,
            queue = %payload.queue,
            "👶 Spawned child job"
        );
        let _ = self
            .events
            .publish(
                events::JOB_ENQUEUED,
                json!({
                    "job_id": payload.id,
                    "job": payload.job,
                    "queue": payload.queue,
                    "parent_id": self.node_id,
                }),
            )
            .await;

        Ok(payload.id)
    }

    /// Progress counters for the tree this node belongs to.
    pub async fn progress(&self) -> BatchResult<BatchProgress> {
        let node = self
            .repository
            .fetch(self.node_id)
            .await?
            .ok_or(BatchError::UnknownNode {
                node_id: self.node_id,
            })?;
        self.repository.progress(node.root_id).await
    }
}

impl std::fmt::Debug for BatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchHandle")
            .field("node_id", &self.node_id)
            .field("default_queue", &self.default_queue)
            .finish_non_exhaustive()
    }
}
