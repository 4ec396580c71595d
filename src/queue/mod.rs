//! # Queue Backend
//!
//! ## Overview
//!
//! Submission-side contract for the external task queue. The runtime only ever
//! needs three verbs from a queue service: submit a payload, look a task up by
//! id, and delete a task. Delivery is the service's business; workers receive
//! payloads through whatever transport the deployment uses and hand them to the
//! processor.
//!
//! Payload size is enforced on the client side, before a payload reaches the
//! backend: callers run [`ensure_within_limit`] first and surface
//! [`QueueError::PayloadTooLarge`] without ever invoking the backend.

mod memory;

pub use memory::MemoryQueue;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::job::JobPayload;

/// Errors surfaced by queue backends and the enqueue guard.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("job payload too large: {size_bytes} bytes exceeds limit of {limit_bytes} bytes")]
    PayloadTooLarge { size_bytes: usize, limit_bytes: usize },

    #[error("queue backend error: {message}")]
    Backend { message: String },

    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl QueueError {
    /// Create a backend error
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// Result type alias for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// A task as the queue backend sees it: the payload plus backend bookkeeping.
#[derive(Debug, Clone)]
pub struct QueueTask {
    /// Backend-assigned task identifier (distinct from the job id).
    pub task_id: String,
    pub payload: JobPayload,
    pub enqueued_at: DateTime<Utc>,
}

/// Reject a payload that would exceed `limit_bytes` once serialized.
///
/// Returns the serialized size on success. Callers run this before
/// [`QueueBackend::enqueue`] so an oversized payload never reaches the backend
/// and leaves no bookkeeping behind.
pub fn ensure_within_limit(payload: &JobPayload, limit_bytes: usize) -> QueueResult<usize> {
    let size_bytes = payload.size_bytes()?;
    if size_bytes > limit_bytes {
        return Err(QueueError::PayloadTooLarge {
            size_bytes,
            limit_bytes,
        });
    }
    Ok(size_bytes)
}

/// Submission-side interface to a task queue service.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Submit a payload for later delivery. Returns the backend task id.
    async fn enqueue(&self, payload: &JobPayload) -> QueueResult<String>;

    /// Look up a previously submitted task. Returns `None` once the backend
    /// has discarded it (delivered, deleted, or never existed).
    async fn find(&self, task_id: &str) -> QueueResult<Option<QueueTask>>;

    /// Remove a task before delivery. Deleting an unknown task is a no-op.
    async fn delete(&self, task_id: &str) -> QueueResult<()>;

    /// Largest serialized payload this backend accepts.
    fn max_payload_bytes(&self) -> usize {
        crate::constants::defaults::MAX_PAYLOAD_BYTES
    }
}
