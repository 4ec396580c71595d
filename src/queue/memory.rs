//! In-memory [`QueueBackend`] for tests and local development.
//!
//! Stores tasks in a concurrent map with a FIFO index so a local worker can
//! drain them in submission order. The trait surface is submission-only;
//! consumption (`take_next`) is an inherent method because real deployments
//! receive deliveries from the queue service rather than polling it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::job::JobPayload;

use super::{QueueBackend, QueueResult, QueueTask};

/// Process-local queue with FIFO delivery order.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    tasks: DashMap<String, QueueTask>,
    order: Mutex<VecDeque<String>>,
    enqueued_total: AtomicU64,
    max_payload_bytes: Option<usize>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the advertised payload limit, e.g. to exercise rejection paths
    /// in tests without building multi-kilobyte payloads.
    pub fn with_max_payload_bytes(mut self, limit: usize) -> Self {
        self.max_payload_bytes = Some(limit);
        self
    }

    /// Pop the oldest task still awaiting delivery.
    pub fn take_next(&self) -> Option<QueueTask> {
        let mut order = self.order.lock();
        while let Some(task_id) = order.pop_front() {
            // Deleted tasks leave a stale index entry behind; skip them.
            if let Some((_, task)) = self.tasks.remove(&task_id) {
                return Some(task);
            }
        }
        None
    }

    /// Tasks currently awaiting delivery.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Total successful `enqueue` calls over the queue's lifetime. Unlike
    /// `len()`, this never decreases when tasks are taken or deleted.
    pub fn enqueued_total(&self) -> u64 {
        self.enqueued_total.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.tasks.clear();
        self.order.lock().clear();
    }
}

#[async_trait]
impl QueueBackend for MemoryQueue {
    async fn enqueue(&self, payload: &JobPayload) -> QueueResult<String> {
        let task_id = uuid::Uuid::new_v4().to_string();
        let task = QueueTask {
            task_id: task_id.clone(),
            payload: payload.clone(),
            enqueued_at: Utc::now(),
        };

        self.tasks.insert(task_id.clone(), task);
        self.order.lock().push_back(task_id.clone());
        self.enqueued_total.fetch_add(1, Ordering::Relaxed);

        debug!(
            task_id = %task_id,
            job = %payload.job,
            queue = %payload.queue,
            "Task enqueued"
        );
        Ok(task_id)
    }

    async fn find(&self, task_id: &str) -> QueueResult<Option<QueueTask>> {
        Ok(self.tasks.get(task_id).map(|entry| entry.value().clone()))
    }

    async fn delete(&self, task_id: &str) -> QueueResult<()> {
        self.tasks.remove(task_id);
        Ok(())
    }

    fn max_payload_bytes(&self) -> usize {
        self.max_payload_bytes
            .unwrap_or(crate::constants::defaults::MAX_PAYLOAD_BYTES)
    }
}
