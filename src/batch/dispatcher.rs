//! # Callback Dispatch
//!
//! Resolves batch lifecycle hooks against the job registry and delivers them.
//! Hook delivery is strictly contained: a failing hook in user code must never
//! wedge completion propagation, so hook errors are logged, published as
//! [`crate::constants::events::HOOK_FAILED`], and swallowed. Exactly-once delivery is not the dispatcher's job; the
//! propagator only calls in after winning a first-write-wins transition.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use crate::constants::events;
use crate::events::EventPublisher;
use crate::job::{JobId, JobPayload, JobRegistry, JobResult};

use super::node::{BatchNode, CompletionOutcome};

/// Identity of the node being notified, handed to every hook.
#[derive(Debug, Clone)]
pub struct CallbackContext {
    pub node_id: JobId,
    /// The notified node's own enqueue payload.
    pub payload: JobPayload,
}

impl CallbackContext {
    fn for_node(node: &BatchNode) -> Self {
        Self {
            node_id: node.id,
            payload: node.payload.clone(),
        }
    }
}

/// The finished node a hook is being told about.
#[derive(Debug, Clone)]
pub struct ChildSummary {
    pub node_id: JobId,
    pub payload: JobPayload,
    pub outcome: CompletionOutcome,
}

/// Batch lifecycle hooks for a job that spawns children.
///
/// Returned from [`crate::job::JobHandler::batch_callbacks`]; every method
/// defaults to a no-op so handlers implement only what they care about. Hooks
/// fire at most once per (node, hook) pair and their errors never affect
/// bookkeeping.
#[async_trait]
pub trait BatchCallbacks: Send + Sync {
    /// A direct child's subtree finished. Fires on the immediate parent only.
    async fn on_child_complete(
        &self,
        ctx: &CallbackContext,
        child: &ChildSummary,
    ) -> JobResult<()> {
        let _ = (ctx, child);
        Ok(())
    }

    /// A descendant's subtree finished. Fires on every ancestor, nearest
    /// first.
    async fn on_batch_node_complete(
        &self,
        ctx: &CallbackContext,
        descendant: &ChildSummary,
    ) -> JobResult<()> {
        let _ = (ctx, descendant);
        Ok(())
    }

    /// The whole tree rooted at this node finished successfully. Fires on the
    /// root only, and never for a dead root.
    async fn on_batch_complete(&self, ctx: &CallbackContext) -> JobResult<()> {
        let _ = ctx;
        Ok(())
    }
}

/// Resolves and invokes [`BatchCallbacks`] implementations.
#[derive(Clone)]
pub struct CallbackDispatcher {
    registry: Arc<JobRegistry>,
    events: EventPublisher,
}

impl CallbackDispatcher {
    pub fn new(registry: Arc<JobRegistry>, events: EventPublisher) -> Self {
        Self { registry, events }
    }

    /// Deliver `on_child_complete` to `parent` for a finished direct child.
    pub async fn notify_child_complete(&self, parent: &BatchNode, child: &ChildSummary) {
        let Some(handler) = self.resolve(parent) else {
            return;
        };
        let Some(callbacks) = handler.batch_callbacks() else {
            return;
        };
        let ctx = CallbackContext::for_node(parent);
        if let Err(e) = callbacks.on_child_complete(&ctx, child).await {
            self.report_hook_failure(parent, "on_child_complete", &e).await;
        }
    }

    /// Deliver `on_batch_node_complete` to `ancestor` for a finished
    /// descendant.
    pub async fn notify_node_complete(&self, ancestor: &BatchNode, descendant: &ChildSummary) {
        let Some(handler) = self.resolve(ancestor) else {
            return;
        };
        let Some(callbacks) = handler.batch_callbacks() else {
            return;
        };
        let ctx = CallbackContext::for_node(ancestor);
        if let Err(e) = callbacks.on_batch_node_complete(&ctx, descendant).await {
            self.report_hook_failure(ancestor, "on_batch_node_complete", &e)
                .await;
        }
    }

    /// Deliver `on_batch_complete` to a successfully finished root.
    pub async fn notify_batch_complete(&self, root: &BatchNode) {
        let Some(handler) = self.resolve(root) else {
            return;
        };
        let Some(callbacks) = handler.batch_callbacks() else {
            return;
        };
        let ctx = CallbackContext::for_node(root);
        if let Err(e) = callbacks.on_batch_complete(&ctx).await {
            self.report_hook_failure(root, "on_batch_complete", &e).await;
        }
    }

    /// Handler resolution for hook delivery. `None` when the node's handler
    /// is not registered in this process.
    fn resolve(&self, node: &BatchNode) -> Option<Arc<dyn crate::job::JobHandler>> {
        let handler = self.registry.get(&node.payload.job);
        if handler.is_none() {
            debug!(
                node_id = %node.id,
                job = %node.payload.job,
                "No handler registered for callback delivery"
            );
        }
        handler
    }

    async fn report_hook_failure(
        &self,
        node: &BatchNode,
        hook: &'static str,
        error: &crate::job::JobError,
    ) {
        warn!(
            node_id = %node.id,
            job = %node.payload.job,
            hook,
            error = %error,
            "⚠️ Batch callback failed; propagation continues"
        );
        let _ = self
            .events
            .publish(
                events::HOOK_FAILED,
                json!({
                    "node_id": node.id,
                    "job": node.payload.job,
                    "hook": hook,
                    "error": error.to_string(),
                }),
            )
            .await;
    }
}

impl std::fmt::Debug for CallbackDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackDispatcher")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
