//! # System Constants
//!
//! Event names, key-space layout, and operational defaults shared across the
//! workbatch runtime. Keeping these in one place keeps the persisted key layout
//! and the published event vocabulary stable across releases.

/// Lifecycle events published through the [`EventPublisher`](crate::events::EventPublisher).
pub mod events {
    // Job lifecycle events
    pub const JOB_ENQUEUED: &str = "job.enqueued";
    pub const JOB_STARTED: &str = "job.started";
    pub const JOB_SUCCEEDED: &str = "job.succeeded";
    pub const JOB_RETRYING: &str = "job.retrying";
    pub const JOB_DEAD: &str = "job.dead";

    // Batch node lifecycle events
    pub const NODE_CREATED: &str = "batch.node_created";
    pub const NODE_SEALED: &str = "batch.node_sealed";
    pub const NODE_COMPLETED: &str = "batch.node_completed";
    pub const NODE_DEAD: &str = "batch.node_dead";

    // Batch tree events
    pub const BATCH_COMPLETED: &str = "batch.completed";
    pub const BATCH_CLEANED_UP: &str = "batch.cleaned_up";
    pub const HOOK_FAILED: &str = "batch.hook_failed";
}

/// Durable store key layout. All keys are namespaced under the configured
/// prefix so several deployments can share one store.
pub mod keys {
    /// Default key namespace prefix.
    pub const DEFAULT_PREFIX: &str = "workbatch";

    /// Suffix for the per-node record key: `{prefix}:node:{id}`.
    pub const NODE_SEGMENT: &str = "node";

    /// Suffix for per-root progress gauges: `{prefix}:gauge:{root_id}:{gauge}`.
    pub const GAUGE_SEGMENT: &str = "gauge";

    pub const GAUGE_TOTAL: &str = "total";
    pub const GAUGE_DONE: &str = "done";
    pub const GAUGE_DEAD: &str = "dead";
}

/// Operational defaults applied when configuration leaves a value unset.
pub mod defaults {
    /// Maximum job payload size accepted by queue backends, in bytes.
    pub const MAX_PAYLOAD_BYTES: usize = 100 * 1024;

    /// Attempts before a retryable failure is promoted to a permanent one.
    pub const MAX_RETRIES: u32 = 25;

    /// TTL stamped on node records at creation; abandoned subtrees are
    /// reclaimed by the store once this elapses.
    pub const NODE_TTL_SECS: u64 = 7 * 24 * 60 * 60;

    /// Broadcast capacity of the lifecycle event channel.
    pub const EVENT_CHANNEL_CAPACITY: usize = 1000;

    /// Queue name used when a job does not specify one.
    pub const QUEUE_NAME: &str = "default";

    /// Concurrent executions in the local worker loop.
    pub const WORKER_CONCURRENCY: usize = 4;

    /// Idle poll interval of the local worker loop, in milliseconds.
    pub const POLL_INTERVAL_MS: u64 = 250;
}
