//! # Job Processor
//!
//! Executes one delivered payload end to end: resolve the handler, run it,
//! seal the node, and report the terminal outcome into completion
//! propagation. The processor owns the retry policy boundary: a retryable
//! failure inside the budget surfaces as [`JobOutcome::Retry`] without
//! touching the node (so a rerun can still register children), while a
//! permanent failure or an exhausted budget finalizes the node as dead before
//! returning [`JobOutcome::Dead`].
//!
//! Infrastructure failures during bookkeeping also surface as `Retry`: the
//! delivery envelope redelivers, and every bookkeeping step is idempotent, so
//! a crashed report converges on the rerun.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::batch::{BatchError, CompletionOutcome};
use crate::client::WorkbatchClient;
use crate::constants::events;
use crate::job::{JobContext, JobError, JobPayload};

/// What the delivery envelope should do with the execution it just ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Acknowledge the delivery; the job finished and was reported.
    Success,
    /// Redeliver later; nothing terminal was recorded.
    Retry { error: String },
    /// Acknowledge the delivery; the job was finalized as dead.
    Dead { error: String },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success)
    }

    pub fn is_retry(&self) -> bool {
        matches!(self, JobOutcome::Retry { .. })
    }

    pub fn is_dead(&self) -> bool {
        matches!(self, JobOutcome::Dead { .. })
    }
}

/// Runs delivered payloads against the client's registry and bookkeeping.
#[derive(Clone)]
pub struct JobProcessor {
    client: Arc<WorkbatchClient>,
    max_retries: u32,
}

impl JobProcessor {
    pub fn new(client: Arc<WorkbatchClient>) -> Self {
        let max_retries = client.config().worker.max_retries;
        Self {
            client,
            max_retries,
        }
    }

    /// Override the client's configured retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Execute one delivery. `attempt` is the zero-based count of prior
    /// deliveries of this job, as tracked by the envelope.
    pub async fn process(&self, payload: &JobPayload, attempt: u32) -> JobOutcome {
        debug!(
            job_id = %payload.id,
            job = %payload.job,
            attempt,
            "▶️ Processing job delivery"
        );
        let _ = self
            .client
            .events()
            .publish(
                events::JOB_STARTED,
                json!({ "job_id": payload.id, "job": payload.job, "attempt": attempt }),
            )
            .await;

        let Some(handler) = self.client.registry().get(&payload.job) else {
            // Likely deployment skew: a producer knows the name before this
            // worker does. Retry instead of killing the job.
            let error = JobError::retryable(format!(
                "no handler registered for job '{}'",
                payload.job
            ));
            return self.handle_failure(payload, attempt, error).await;
        };

        let ctx = JobContext::new(
            payload.clone(),
            attempt,
            self.client.handle_for(payload.id),
        );

        match handler.perform(&ctx).await {
            Ok(()) => self.finalize_success(payload).await,
            Err(error) => self.handle_failure(payload, attempt, error).await,
        }
    }

    async fn finalize_success(&self, payload: &JobPayload) -> JobOutcome {
        if let Err(e) = self
            .seal_and_report(payload, CompletionOutcome::Success)
            .await
        {
            warn!(
                job_id = %payload.id,
                error = %e,
                "Completion bookkeeping failed; requesting redelivery"
            );
            return JobOutcome::Retry {
                error: e.to_string(),
            };
        }

        info!(job_id = %payload.id, job = %payload.job, "✅ Job completed");
        let _ = self
            .client
            .events()
            .publish(
                events::JOB_SUCCEEDED,
                json!({ "job_id": payload.id, "job": payload.job }),
            )
            .await;
        JobOutcome::Success
    }

    async fn handle_failure(
        &self,
        payload: &JobPayload,
        attempt: u32,
        error: JobError,
    ) -> JobOutcome {
        if error.is_retryable() && attempt < self.max_retries {
            warn!(
                job_id = %payload.id,
                job = %payload.job,
                attempt,
                max_retries = self.max_retries,
                error = %error,
                "🔄 Job failed; will be redelivered"
            );
            let _ = self
                .client
                .events()
                .publish(
                    events::JOB_RETRYING,
                    json!({
                        "job_id": payload.id,
                        "job": payload.job,
                        "attempt": attempt,
                        "error": error.to_string(),
                    }),
                )
                .await;
            return JobOutcome::Retry {
                error: error.to_string(),
            };
        }

        // Permanent failure, or the retry budget ran out.
        if let Err(e) = self
            .seal_and_report(payload, CompletionOutcome::PermanentFailure)
            .await
        {
            warn!(
                job_id = %payload.id,
                error = %e,
                "Dead-job bookkeeping failed; requesting redelivery"
            );
            return JobOutcome::Retry {
                error: e.to_string(),
            };
        }

        error!(
            job_id = %payload.id,
            job = %payload.job,
            attempt,
            error = %error,
            "💀 Job finalized as dead"
        );
        let _ = self
            .client
            .events()
            .publish(
                events::JOB_DEAD,
                json!({
                    "job_id": payload.id,
                    "job": payload.job,
                    "attempt": attempt,
                    "error": error.to_string(),
                }),
            )
            .await;
        JobOutcome::Dead {
            error: error.to_string(),
        }
    }

    /// Seal the node (its child set is final once the body finished) and feed
    /// the outcome into completion propagation.
    async fn seal_and_report(
        &self,
        payload: &JobPayload,
        outcome: CompletionOutcome,
    ) -> crate::error::Result<()> {
        match self.client.repository().seal(payload.id).await {
            Ok(node) => {
                let _ = self
                    .client
                    .events()
                    .publish(
                        events::NODE_SEALED,
                        json!({
                            "node_id": payload.id,
                            "expected_children": node.expected_children,
                        }),
                    )
                    .await;
            }
            Err(BatchError::UnknownNode { .. }) => {
                debug!(job_id = %payload.id, "Node already reclaimed before sealing");
            }
            Err(e) => return Err(e.into()),
        }

        self.client.report_completion(payload.id, outcome).await
    }
}

impl std::fmt::Debug for JobProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobProcessor")
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}
