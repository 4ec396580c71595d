//! # Local Worker
//!
//! Polls a [`MemoryQueue`] and feeds deliveries through the
//! [`JobProcessor`], tracking per-job attempt counts and re-submitting
//! retryable failures. This is the whole delivery envelope for tests and
//! single-process deployments; distributed deployments replace it with their
//! queue service's push transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use tracing::{error, info};

use crate::client::WorkbatchClient;
use crate::job::JobId;
use crate::queue::{MemoryQueue, QueueBackend, QueueTask};

use super::processor::{JobOutcome, JobProcessor};

/// Poll-driven worker over a process-local queue.
#[derive(Clone)]
pub struct LocalWorker {
    queue: Arc<MemoryQueue>,
    processor: JobProcessor,
    attempts: Arc<DashMap<JobId, u32>>,
    poll_interval: Duration,
    concurrency: usize,
    stopping: Arc<AtomicBool>,
}

impl LocalWorker {
    pub fn new(client: Arc<WorkbatchClient>, queue: Arc<MemoryQueue>) -> Self {
        let worker = &client.config().worker;
        let poll_interval = worker.poll_interval();
        let concurrency = worker.concurrency;

        Self {
            queue,
            processor: JobProcessor::new(client),
            attempts: Arc::new(DashMap::new()),
            poll_interval,
            concurrency,
            stopping: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Process tasks one at a time until the queue is empty, including tasks
    /// spawned while draining. Returns the number of deliveries executed.
    pub async fn drain(&self) -> u64 {
        let mut processed = 0;
        while let Some(task) = self.queue.take_next() {
            self.process_task(task).await;
            processed += 1;
        }
        processed
    }

    /// Like [`drain`](Self::drain), but runs up to the configured concurrency
    /// in flight per wave.
    pub async fn drain_concurrent(&self) -> u64 {
        let mut processed = 0;
        loop {
            let mut wave = Vec::with_capacity(self.concurrency);
            while wave.len() < self.concurrency {
                match self.queue.take_next() {
                    Some(task) => wave.push(task),
                    None => break,
                }
            }
            if wave.is_empty() {
                return processed;
            }
            processed += wave.len() as u64;
            join_all(wave.into_iter().map(|task| self.process_task(task))).await;
        }
    }

    /// Run until [`shutdown`](Self::shutdown) is called, sleeping the poll
    /// interval whenever the queue is idle.
    pub async fn run(&self) {
        info!(concurrency = self.concurrency, "🛠️ Local worker running");
        while !self.stopping.load(Ordering::SeqCst) {
            if self.drain_concurrent().await == 0 {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
        info!("Local worker stopped");
    }

    /// Ask a running worker to stop after its current wave.
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
    }

    async fn process_task(&self, task: QueueTask) {
        let job_id = task.payload.id;
        let attempt = self
            .attempts
            .get(&job_id)
            .map(|entry| *entry.value())
            .unwrap_or(0);

        match self.processor.process(&task.payload, attempt).await {
            JobOutcome::Retry { .. } => {
                self.attempts.insert(job_id, attempt + 1);
                if let Err(e) = self.queue.enqueue(&task.payload).await {
                    error!(job_id = %job_id, error = %e, "Failed to requeue job for retry");
                    self.attempts.remove(&job_id);
                }
            }
            JobOutcome::Success | JobOutcome::Dead { .. } => {
                self.attempts.remove(&job_id);
            }
        }
    }
}

impl std::fmt::Debug for LocalWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalWorker")
            .field("concurrency", &self.concurrency)
            .field("poll_interval", &self.poll_interval)
            .field("pending_attempts", &self.attempts.len())
            .finish_non_exhaustive()
    }
}
