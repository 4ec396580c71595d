//! Reusable job handlers and hook recorders for integration tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use workbatch_core::batch::{BatchCallbacks, CallbackContext, ChildSummary};
use workbatch_core::job::{JobContext, JobError, JobHandler, JobPayload, JobResult};

/// One recorded hook delivery (or job execution), in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookRecord {
    pub hook: &'static str,
    /// Label of the node whose handler was notified (or executed).
    pub node: String,
    /// Label of the finished node the hook was told about, with its outcome.
    /// Empty for `perform` and `on_batch_complete` entries.
    pub subject: String,
}

/// Shared, ordered log of executions and hook deliveries.
#[derive(Clone, Default)]
pub struct HookLog {
    entries: Arc<Mutex<Vec<HookRecord>>>,
}

impl HookLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, hook: &'static str, node: impl Into<String>, subject: impl Into<String>) {
        self.entries.lock().push(HookRecord {
            hook,
            node: node.into(),
            subject: subject.into(),
        });
    }

    pub fn entries(&self) -> Vec<HookRecord> {
        self.entries.lock().clone()
    }

    /// Hook deliveries as compact strings like `child_complete(R<-B)`,
    /// excluding `perform` entries.
    pub fn hook_sequence(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|r| r.hook != "perform")
            .map(|r| {
                if r.subject.is_empty() {
                    format!("{}({})", r.hook, r.node)
                } else {
                    format!("{}({}<-{})", r.hook, r.node, r.subject)
                }
            })
            .collect()
    }

    /// Node labels in execution order.
    pub fn perform_sequence(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|r| r.hook == "perform")
            .map(|r| r.node.clone())
            .collect()
    }

    pub fn count(&self, hook: &'static str) -> usize {
        self.entries.lock().iter().filter(|r| r.hook == hook).count()
    }
}

/// Declarative batch tree: each node names itself, its children, and whether
/// its own execution permanently fails after registering them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeSpec {
    pub name: String,
    #[serde(default)]
    pub children: Vec<TreeSpec>,
    #[serde(default)]
    pub fail: bool,
}

impl TreeSpec {
    pub fn leaf(name: &str) -> Self {
        Self {
            name: name.to_string(),
            children: Vec::new(),
            fail: false,
        }
    }

    pub fn branch(name: &str, children: Vec<TreeSpec>) -> Self {
        Self {
            name: name.to_string(),
            children,
            fail: false,
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            children: Vec::new(),
            fail: true,
        }
    }

    pub fn with_failure(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Total nodes in this subtree, itself included.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(TreeSpec::node_count).sum::<usize>()
    }

    /// Nodes in this subtree whose own execution fails.
    pub fn failure_count(&self) -> usize {
        usize::from(self.fail)
            + self
                .children
                .iter()
                .map(TreeSpec::failure_count)
                .sum::<usize>()
    }

    pub fn to_args(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap()
    }
}

/// Human label for a node: the `TreeSpec` name when the payload carries one,
/// the job name otherwise.
pub fn node_label(payload: &JobPayload) -> String {
    serde_json::from_value::<TreeSpec>(payload.args.clone())
        .map(|spec| spec.name)
        .unwrap_or_else(|_| payload.job.clone())
}

/// Handler that materializes a [`TreeSpec`]: registers each child spec as
/// another `tree` job, then succeeds or permanently fails as directed.
/// Records executions and every hook delivery into its [`HookLog`].
pub struct TreeJob {
    log: HookLog,
    callbacks: TreeCallbacks,
}

impl TreeJob {
    pub fn new(log: HookLog) -> Self {
        Self {
            callbacks: TreeCallbacks { log: log.clone() },
            log,
        }
    }
}

#[async_trait]
impl JobHandler for TreeJob {
    async fn perform(&self, ctx: &JobContext) -> JobResult<()> {
        let spec: TreeSpec = ctx.args()?;
        self.log.push("perform", spec.name.clone(), "");

        for child in &spec.children {
            ctx.batch()
                .add("tree", child.to_args())
                .await
                .map_err(|e| JobError::retryable(e.to_string()))?;
        }

        if spec.fail {
            return Err(JobError::permanent(format!("{} blew up", spec.name)));
        }
        Ok(())
    }

    fn batch_callbacks(&self) -> Option<&dyn BatchCallbacks> {
        Some(&self.callbacks)
    }
}

pub struct TreeCallbacks {
    log: HookLog,
}

#[async_trait]
impl BatchCallbacks for TreeCallbacks {
    async fn on_child_complete(
        &self,
        ctx: &CallbackContext,
        child: &ChildSummary,
    ) -> JobResult<()> {
        self.log.push(
            "child_complete",
            node_label(&ctx.payload),
            format!("{}:{}", node_label(&child.payload), child.outcome),
        );
        Ok(())
    }

    async fn on_batch_node_complete(
        &self,
        ctx: &CallbackContext,
        descendant: &ChildSummary,
    ) -> JobResult<()> {
        self.log.push(
            "node_complete",
            node_label(&ctx.payload),
            format!("{}:{}", node_label(&descendant.payload), descendant.outcome),
        );
        Ok(())
    }

    async fn on_batch_complete(&self, ctx: &CallbackContext) -> JobResult<()> {
        self.log.push("batch_complete", node_label(&ctx.payload), "");
        Ok(())
    }
}

/// Succeeds immediately, no children, no hooks.
pub struct NoopJob;

#[async_trait]
impl JobHandler for NoopJob {
    async fn perform(&self, _ctx: &JobContext) -> JobResult<()> {
        Ok(())
    }
}

/// Fails retryably a fixed number of times, then succeeds.
pub struct FlakyJob {
    remaining: AtomicU32,
}

impl FlakyJob {
    pub fn failing_times(n: u32) -> Self {
        Self {
            remaining: AtomicU32::new(n),
        }
    }
}

#[async_trait]
impl JobHandler for FlakyJob {
    async fn perform(&self, _ctx: &JobContext) -> JobResult<()> {
        if self.remaining.fetch_sub(1, Ordering::SeqCst) > 0 {
            Err(JobError::retryable("transient failure"))
        } else {
            Ok(())
        }
    }
}

/// Always fails retryably; only a retry budget stops it.
pub struct AlwaysRetryJob;

#[async_trait]
impl JobHandler for AlwaysRetryJob {
    async fn perform(&self, _ctx: &JobContext) -> JobResult<()> {
        Err(JobError::retryable("never succeeds"))
    }
}
