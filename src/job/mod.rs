//! # Job Types and Handler Contract
//!
//! ## Overview
//!
//! Everything a job carries across the queue boundary and everything an
//! application implements to execute one:
//!
//! - [`JobPayload`]: the wire envelope submitted to the queue backend
//! - [`JobHandler`]: the application-side execution trait
//! - [`JobContext`]: per-invocation view handed to a handler, including the
//!   [`BatchHandle`] used to spawn child jobs
//! - [`JobError`]: failure classification (retryable vs permanent)
//!
//! A job and its batch node share one identity: the UUID minted at enqueue time
//! names the payload on the queue and the node record in the store.

pub mod registry;

pub use registry::JobRegistry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::batch::dispatcher::BatchCallbacks;
use crate::batch::handle::BatchHandle;
use crate::constants::defaults;

/// Identifier shared by a queued job and its batch node.
pub type JobId = Uuid;

/// Wire envelope for one queued job execution.
///
/// Serialized to JSON for the queue backend; `args` is an opaque document the
/// handler decodes via [`JobContext::args`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobPayload {
    /// Identity of this job and of its batch node.
    pub id: JobId,
    /// Registered handler name.
    pub job: String,
    /// Target queue name.
    pub queue: String,
    /// Handler arguments, decoded by the handler itself.
    pub args: serde_json::Value,
    /// Batch parent, when this job was spawned by another job.
    pub parent_id: Option<JobId>,
    pub created_at: DateTime<Utc>,
}

impl JobPayload {
    /// Create a root payload for the default queue with a fresh identity.
    pub fn new(job: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            job: job.into(),
            queue: defaults::QUEUE_NAME.to_string(),
            args,
            parent_id: None,
            created_at: Utc::now(),
        }
    }

    /// Route the payload to a specific queue.
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    /// Mark the payload as a child of `parent_id`.
    pub fn with_parent(mut self, parent_id: JobId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Serialize to the JSON document submitted to the queue backend.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize a payload received from the queue backend.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Size of the serialized payload in bytes, as counted against the
    /// enqueue limit.
    pub fn size_bytes(&self) -> Result<usize, serde_json::Error> {
        Ok(self.to_json()?.len())
    }
}

/// Failure classification for job execution.
///
/// `Retryable` asks the delivery envelope to run the job again later;
/// `Permanent` and `InvalidArgs` finalize the job as dead immediately.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("retryable job failure: {message}")]
    Retryable { message: String },

    #[error("permanent job failure: {message}")]
    Permanent { message: String },

    #[error("invalid job arguments: {message}")]
    InvalidArgs { message: String },
}

impl JobError {
    /// Create a retryable failure
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Retryable {
            message: message.into(),
        }
    }

    /// Create a permanent failure
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
        }
    }

    /// Whether the delivery envelope should attempt this job again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }
}

/// Unclassified errors default to retryable, so transient infrastructure
/// failures inside handlers get another attempt.
impl From<anyhow::Error> for JobError {
    fn from(err: anyhow::Error) -> Self {
        Self::Retryable {
            message: format!("{err:#}"),
        }
    }
}

/// Malformed arguments never fix themselves on retry.
impl From<serde_json::Error> for JobError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidArgs {
            message: err.to_string(),
        }
    }
}

/// Result type alias for handler code
pub type JobResult<T> = Result<T, JobError>;

/// Per-invocation view handed to [`JobHandler::perform`].
#[derive(Clone)]
pub struct JobContext {
    payload: JobPayload,
    attempt: u32,
    batch: BatchHandle,
}

impl JobContext {
    pub fn new(payload: JobPayload, attempt: u32, batch: BatchHandle) -> Self {
        Self {
            payload,
            attempt,
            batch,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.payload.id
    }

    pub fn payload(&self) -> &JobPayload {
        &self.payload
    }

    /// Zero-based delivery attempt for this execution.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Decode the payload arguments into a concrete type.
    pub fn args<T: serde::de::DeserializeOwned>(&self) -> JobResult<T> {
        Ok(serde_json::from_value(self.payload.args.clone())?)
    }

    /// Batch operations scoped to this job's node. `batch().add(..)` spawns a
    /// child job whose completion this job's batch waits on.
    pub fn batch(&self) -> &BatchHandle {
        &self.batch
    }
}

impl std::fmt::Debug for JobContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobContext")
            .field("job_id", &self.payload.id)
            .field("job", &self.payload.job)
            .field("attempt", &self.attempt)
            .finish()
    }
}

/// Application-side execution contract for a named job.
///
/// Implementations are registered in a [`JobRegistry`] under the name carried
/// by [`JobPayload::job`]. Handlers must be idempotent enough to tolerate
/// at-least-once delivery; a retried execution re-runs the whole body.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Execute the job.
    async fn perform(&self, ctx: &JobContext) -> JobResult<()>;

    /// Batch lifecycle hooks for jobs that spawn children. Returning `None`
    /// (the default) means completion bookkeeping runs without notifying this
    /// handler.
    fn batch_callbacks(&self) -> Option<&dyn BatchCallbacks> {
        None
    }

    /// Human-readable handler name for logging.
    fn handler_name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}
