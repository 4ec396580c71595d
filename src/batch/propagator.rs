//! # Completion Propagation
//!
//! Consumes terminal outcome reports from workers and turns them into node
//! transitions, ancestor notifications, and tree finalization. This is where
//! the exactly-once guarantee is enforced: all side effects of a node
//! finishing (callbacks, lifecycle events, parent counting) run only on the
//! propagation that wins the node's first-write-wins terminal transition.
//!
//! The cascade is iterative rather than recursive: completing a node may
//! complete its parent, whose completion may complete the grandparent, all the
//! way to the root. No store locks are held while hooks run; every mutation
//! finishes its compare-and-swap loop before dispatch begins.
//!
//! Reports for unknown nodes are tolerated silently. At-least-once delivery
//! means a duplicate report can arrive after the tree finished and was cleaned
//! up; erroring there would poison the worker's delivery envelope for no
//! benefit.

use std::collections::HashSet;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::CleanupPolicy;
use crate::constants::events;
use crate::events::EventPublisher;
use crate::job::JobId;

use super::dispatcher::{CallbackDispatcher, ChildSummary};
use super::node::{BatchNode, CompletionOutcome, NodeState};
use super::repository::BatchNodeRepository;
use super::{BatchError, BatchResult};

/// Drives completion detection and upward propagation for batch trees.
#[derive(Clone)]
pub struct CompletionPropagator {
    repository: BatchNodeRepository,
    dispatcher: CallbackDispatcher,
    events: EventPublisher,
    cleanup: CleanupPolicy,
}

impl CompletionPropagator {
    pub fn new(
        repository: BatchNodeRepository,
        dispatcher: CallbackDispatcher,
        events: EventPublisher,
        cleanup: CleanupPolicy,
    ) -> Self {
        Self {
            repository,
            dispatcher,
            events,
            cleanup,
        }
    }

    /// Accept a worker's terminal outcome report for `node_id`.
    ///
    /// Idempotent: duplicate reports (redelivered executions, crash-retry of
    /// the reporting step) re-run the same path and fall out at the
    /// first-write-wins gates without side effects. A report for a node whose
    /// tree was already cleaned up is a no-op.
    pub async fn report_completion(
        &self,
        node_id: JobId,
        outcome: CompletionOutcome,
    ) -> BatchResult<()> {
        // Seal defensively. The worker seals before reporting on the normal
        // path, but a crash-retried report must converge on its own.
        if let Err(e) = self.repository.seal(node_id).await {
            return self.tolerate_unknown(node_id, e);
        }

        let node = match self.repository.mark_self_done(node_id).await {
            Ok((node, first)) => {
                if !first {
                    debug!(node_id = %node_id, %outcome, "Duplicate completion report");
                }
                node
            }
            Err(e) => return self.tolerate_unknown(node_id, e),
        };

        match outcome {
            CompletionOutcome::PermanentFailure => {
                self.cascade_from(node_id, NodeState::Dead).await
            }
            CompletionOutcome::Success => {
                if node.is_complete() {
                    self.cascade_from(node_id, NodeState::Complete).await
                } else {
                    debug!(
                        node_id = %node_id,
                        expected = node.expected_children,
                        completed = node.completed_children,
                        "Node done but waiting on children"
                    );
                    Ok(())
                }
            }
        }
    }

    /// Finalize `start_id` into `target` and walk completion upward.
    ///
    /// Each loop iteration finalizes one node: it attempts the terminal
    /// transition, and on a win delivers notifications and counts the node on
    /// its parent. If that count makes the parent complete, the parent becomes
    /// the next node to finalize.
    async fn cascade_from(&self, start_id: JobId, start_state: NodeState) -> BatchResult<()> {
        let mut current_id = start_id;
        let mut target = start_state;

        loop {
            let (node, won) = self.repository.try_transition(current_id, target).await?;
            if !won {
                debug!(
                    node_id = %current_id,
                    state = %node.state,
                    "Terminal transition already applied elsewhere"
                );
                return Ok(());
            }

            self.publish_terminal_event(&node, target).await;
            let summary = ChildSummary {
                node_id: node.id,
                payload: node.payload.clone(),
                outcome: match target {
                    NodeState::Dead => CompletionOutcome::PermanentFailure,
                    _ => CompletionOutcome::Success,
                },
            };
            self.notify_ancestors(&node, &summary).await?;

            let Some(parent_id) = node.parent_id else {
                self.finalize_root(&node, target).await?;
                return Ok(());
            };

            let parent = match self.repository.record_child_complete(parent_id).await {
                Ok(parent) => parent,
                Err(BatchError::UnknownNode { .. }) => {
                    warn!(
                        node_id = %node.id,
                        parent_id = %parent_id,
                        "Parent record gone; abandoning upward propagation"
                    );
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            if parent.is_complete() && parent.state == NodeState::Open {
                current_id = parent_id;
                target = NodeState::Complete;
                continue;
            }
            return Ok(());
        }
    }

    /// Deliver completion hooks up the ancestor chain: `on_child_complete` on
    /// the immediate parent, then `on_batch_node_complete` on every ancestor,
    /// nearest first.
    async fn notify_ancestors(&self, node: &BatchNode, summary: &ChildSummary) -> BatchResult<()> {
        let mut seen: HashSet<JobId> = HashSet::from([node.id]);
        let mut next = node.parent_id;
        let mut immediate = true;

        while let Some(ancestor_id) = next {
            if !seen.insert(ancestor_id) {
                warn!(
                    node_id = %ancestor_id,
                    "Parent chain cycle detected; stopping notification walk"
                );
                break;
            }
            let Some(ancestor) = self.repository.fetch(ancestor_id).await? else {
                debug!(
                    node_id = %ancestor_id,
                    "Ancestor record gone; stopping notification walk"
                );
                break;
            };

            if immediate {
                self.dispatcher
                    .notify_child_complete(&ancestor, summary)
                    .await;
                immediate = false;
            }
            self.dispatcher.notify_node_complete(&ancestor, summary).await;
            next = ancestor.parent_id;
        }
        Ok(())
    }

    /// Side effects of the root's terminal transition: batch completion
    /// callback and lifecycle event for successful trees, then record
    /// cleanup. A dead root finalizes the tree without the completion
    /// callback, and its records are left for TTL expiry since descendants
    /// may still be executing.
    async fn finalize_root(&self, root: &BatchNode, target: NodeState) -> BatchResult<()> {
        if target != NodeState::Complete {
            info!(root_id = %root.id, job = %root.payload.job, "💀 Batch root died");
            return Ok(());
        }

        info!(root_id = %root.id, job = %root.payload.job, "🎉 Batch tree completed");
        self.dispatcher.notify_batch_complete(root).await;
        let _ = self
            .events
            .publish(
                events::BATCH_COMPLETED,
                json!({
                    "root_id": root.id,
                    "job": root.payload.job,
                }),
            )
            .await;

        match self.cleanup {
            CleanupPolicy::Immediate => {
                let removed = self.repository.delete_subtree(root.id).await?;
                let _ = self
                    .events
                    .publish(
                        events::BATCH_CLEANED_UP,
                        json!({
                            "root_id": root.id,
                            "removed": removed,
                        }),
                    )
                    .await;
            }
            CleanupPolicy::ExpireAfter { seconds } => {
                self.repository
                    .expire_subtree(root.id, Duration::from_secs(seconds))
                    .await?;
            }
        }
        Ok(())
    }

    async fn publish_terminal_event(&self, node: &BatchNode, target: NodeState) {
        let name = match target {
            NodeState::Dead => events::NODE_DEAD,
            _ => events::NODE_COMPLETED,
        };
        let _ = self
            .events
            .publish(
                name,
                json!({
                    "node_id": node.id,
                    "root_id": node.root_id,
                    "parent_id": node.parent_id,
                    "job": node.payload.job,
                }),
            )
            .await;
    }

    /// Map "node record is gone" onto a successful no-op; everything else
    /// stays an error.
    fn tolerate_unknown(&self, node_id: JobId, error: BatchError) -> BatchResult<()> {
        match error {
            BatchError::UnknownNode { .. } => {
                debug!(
                    node_id = %node_id,
                    "Completion report for unknown node; tree already finalized"
                );
                Ok(())
            }
            other => Err(other),
        }
    }
}

impl std::fmt::Debug for CompletionPropagator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionPropagator")
            .field("cleanup", &self.cleanup)
            .finish_non_exhaustive()
    }
}
