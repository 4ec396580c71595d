//! # Batch Node Repository
//!
//! All store access for batch nodes goes through this type. Each node lives as
//! one versioned JSON record, and every mutation runs a read-modify-write loop
//! over [`KeyedStore::compare_and_swap`]: read the record, apply the change,
//! swap against the version that was read, retry on conflict. That serializes
//! concurrent mutations per node, which is what makes child registration
//! linearizable with sealing and makes terminal transitions first-write-wins.
//!
//! Per-tree progress gauges are plain atomic counters keyed under the root id.
//! They are advisory: a crash between a record swap and its gauge bump can
//! undercount, so nothing correctness-critical reads them.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace};

use crate::constants::keys;
use crate::job::{JobId, JobPayload};
use crate::store::{CasOutcome, KeyedStore, VersionedValue};

use super::node::{BatchNode, NodeState};
use super::progress::BatchProgress;
use super::{BatchError, BatchResult};

/// Store-backed repository for [`BatchNode`] records and progress gauges.
#[derive(Clone)]
pub struct BatchNodeRepository {
    store: Arc<dyn KeyedStore>,
    key_prefix: String,
    node_ttl: Option<Duration>,
}

impl BatchNodeRepository {
    /// Create a repository with the default key prefix and node TTL.
    pub fn new(store: Arc<dyn KeyedStore>) -> Self {
        Self::with_settings(
            store,
            keys::DEFAULT_PREFIX,
            Some(Duration::from_secs(
                crate::constants::defaults::NODE_TTL_SECS,
            )),
        )
    }

    /// Create a repository with an explicit key prefix and TTL. `None`
    /// disables expiry stamping entirely.
    pub fn with_settings(
        store: Arc<dyn KeyedStore>,
        key_prefix: impl Into<String>,
        node_ttl: Option<Duration>,
    ) -> Self {
        Self {
            store,
            key_prefix: key_prefix.into(),
            node_ttl,
        }
    }

    /// Store key holding the record for `id`.
    pub fn node_key(&self, id: JobId) -> String {
        format!("{}:{}:{}", self.key_prefix, keys::NODE_SEGMENT, id)
    }

    fn gauge_key(&self, root_id: JobId, gauge: &str) -> String {
        format!(
            "{}:{}:{}:{}",
            self.key_prefix,
            keys::GAUGE_SEGMENT,
            root_id,
            gauge
        )
    }

    /// Create the record for a freshly enqueued job.
    ///
    /// Roots anchor a new tree; children resolve their root through the
    /// parent's record, which must already exist. Creating the same id twice
    /// fails with [`BatchError::DuplicateNode`].
    pub async fn create_node(&self, payload: &JobPayload) -> BatchResult<BatchNode> {
        let root_id = match payload.parent_id {
            None => payload.id,
            Some(parent_id) => match self.fetch(parent_id).await? {
                Some(parent) => parent.root_id,
                None => return Err(BatchError::UnknownParent { parent_id }),
            },
        };

        let node = BatchNode::new(payload.clone(), root_id);
        let key = self.node_key(node.id);
        let encoded = serde_json::to_string(&node)?;

        if !self.store.put_if_absent(&key, &encoded).await? {
            return Err(BatchError::DuplicateNode { node_id: node.id });
        }
        if let Some(ttl) = self.node_ttl {
            self.store.expire(&key, ttl).await?;
        }
        self.bump_gauge(root_id, keys::GAUGE_TOTAL, 1).await?;

        debug!(
            node_id = %node.id,
            parent_id = ?node.parent_id,
            root_id = %root_id,
            "📦 Created batch node"
        );
        Ok(node)
    }

    /// Read a node record. Returns `None` for unknown, expired, or cleaned-up
    /// nodes.
    pub async fn fetch(&self, id: JobId) -> BatchResult<Option<BatchNode>> {
        match self.store.get(&self.node_key(id)).await? {
            None => Ok(None),
            Some(raw) => Ok(Some(self.decode(id, &raw)?)),
        }
    }

    /// Register `child_id` as an expected child of `parent_id`.
    ///
    /// Fails with [`BatchError::SealedParent`] once the parent has sealed;
    /// the compare-and-swap loop guarantees a registration and a seal cannot
    /// interleave.
    pub async fn register_child(
        &self,
        parent_id: JobId,
        child_id: JobId,
    ) -> BatchResult<BatchNode> {
        let result = self
            .mutate(parent_id, |parent| {
                if parent.sealed {
                    return Err(BatchError::SealedParent { parent_id });
                }
                parent.expected_children += 1;
                parent.children.push(child_id);
                Ok(true)
            })
            .await;

        match result {
            Ok((parent, _)) => {
                trace!(
                    parent_id = %parent_id,
                    child_id = %child_id,
                    expected = parent.expected_children,
                    "Registered child"
                );
                Ok(parent)
            }
            Err(BatchError::UnknownNode { node_id }) => {
                Err(BatchError::UnknownParent { parent_id: node_id })
            }
            Err(e) => Err(e),
        }
    }

    /// Seal a node: no further children may be registered. Idempotent.
    pub async fn seal(&self, id: JobId) -> BatchResult<BatchNode> {
        let (node, changed) = self
            .mutate(id, |node| {
                if node.sealed {
                    return Ok(false);
                }
                node.sealed = true;
                Ok(true)
            })
            .await?;
        if changed {
            debug!(
                node_id = %id,
                expected_children = node.expected_children,
                "🔒 Sealed batch node"
            );
        }
        Ok(node)
    }

    /// Record that the node's own job reported a terminal outcome. Returns
    /// the updated record and whether this call was the first to set the
    /// flag.
    pub async fn mark_self_done(&self, id: JobId) -> BatchResult<(BatchNode, bool)> {
        self.mutate(id, |node| {
            if node.self_done {
                return Ok(false);
            }
            node.self_done = true;
            Ok(true)
        })
        .await
    }

    /// Count one more completed child subtree on `parent_id` and return the
    /// updated record.
    pub async fn record_child_complete(&self, parent_id: JobId) -> BatchResult<BatchNode> {
        let (parent, _) = self
            .mutate(parent_id, |parent| {
                if parent.completed_children >= parent.expected_children {
                    return Err(BatchError::CounterOverflow { node_id: parent_id });
                }
                parent.completed_children += 1;
                Ok(true)
            })
            .await?;
        Ok(parent)
    }

    /// Move a node out of [`NodeState::Open`] into a terminal state.
    ///
    /// First write wins: returns the record plus whether this call performed
    /// the transition. Losing callers see `false` and must not re-run
    /// completion side effects.
    pub async fn try_transition(
        &self,
        id: JobId,
        to: NodeState,
    ) -> BatchResult<(BatchNode, bool)> {
        debug_assert!(to.is_terminal(), "transition target must be terminal");
        let (node, won) = self
            .mutate(id, |node| {
                if node.state.is_terminal() {
                    return Ok(false);
                }
                node.state = to;
                Ok(true)
            })
            .await?;

        if won {
            self.bump_gauge(node.root_id, keys::GAUGE_DONE, 1).await?;
            if to == NodeState::Dead {
                self.bump_gauge(node.root_id, keys::GAUGE_DEAD, 1).await?;
            }
            debug!(node_id = %id, state = %to, "Batch node reached terminal state");
        }
        Ok((node, won))
    }

    /// Advisory progress counters for the tree rooted at `root_id`.
    pub async fn progress(&self, root_id: JobId) -> BatchResult<BatchProgress> {
        let read = |gauge: &'static str| {
            let key = self.gauge_key(root_id, gauge);
            async move {
                let value = self.store.get_counter(&key).await?.unwrap_or(0);
                BatchResult::Ok(value.max(0) as u64)
            }
        };
        Ok(BatchProgress {
            total: read(keys::GAUGE_TOTAL).await?,
            done: read(keys::GAUGE_DONE).await?,
            dead: read(keys::GAUGE_DEAD).await?,
        })
    }

    /// Delete every record in the tree rooted at `root_id`, plus the tree's
    /// gauges. Returns how many keys were removed.
    pub async fn delete_subtree(&self, root_id: JobId) -> BatchResult<u64> {
        let ids = self.collect_subtree_ids(root_id).await?;
        let mut doomed: Vec<String> = ids.iter().map(|id| self.node_key(*id)).collect();
        for gauge in [keys::GAUGE_TOTAL, keys::GAUGE_DONE, keys::GAUGE_DEAD] {
            doomed.push(self.gauge_key(root_id, gauge));
        }

        let removed = self.store.delete(&doomed).await?;
        info!(
            root_id = %root_id,
            nodes = ids.len(),
            removed,
            "🧹 Deleted batch tree records"
        );
        Ok(removed)
    }

    /// Stamp `ttl` on every record in the tree rooted at `root_id` and on its
    /// gauges. Returns how many keys were stamped.
    pub async fn expire_subtree(&self, root_id: JobId, ttl: Duration) -> BatchResult<u64> {
        let ids = self.collect_subtree_ids(root_id).await?;
        let mut stamped = 0u64;
        for id in &ids {
            if self.store.expire(&self.node_key(*id), ttl).await? {
                stamped += 1;
            }
        }
        for gauge in [keys::GAUGE_TOTAL, keys::GAUGE_DONE, keys::GAUGE_DEAD] {
            if self.store.expire(&self.gauge_key(root_id, gauge), ttl).await? {
                stamped += 1;
            }
        }
        info!(root_id = %root_id, stamped, "Scheduled batch tree expiry");
        Ok(stamped)
    }

    /// Ids of every live record in the subtree under `root_id`, in preorder.
    /// Records that already expired are silently skipped.
    async fn collect_subtree_ids(&self, root_id: JobId) -> BatchResult<Vec<JobId>> {
        let mut ids = Vec::new();
        let mut seen = HashSet::new();
        let mut frontier = vec![root_id];

        while let Some(id) = frontier.pop() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(node) = self.fetch(id).await? {
                frontier.extend(node.children.iter().rev().copied());
                ids.push(id);
            }
        }
        Ok(ids)
    }

    async fn bump_gauge(&self, root_id: JobId, gauge: &str, delta: i64) -> BatchResult<()> {
        let key = self.gauge_key(root_id, gauge);
        self.store.incr(&key, delta).await?;
        if let Some(ttl) = self.node_ttl {
            self.store.expire(&key, ttl).await?;
        }
        Ok(())
    }

    /// Read-modify-write loop. `apply` mutates the record and returns whether
    /// a write is needed; `false` short-circuits with the record as read. The
    /// returned flag says whether this call wrote.
    async fn mutate<F>(&self, id: JobId, mut apply: F) -> BatchResult<(BatchNode, bool)>
    where
        F: FnMut(&mut BatchNode) -> BatchResult<bool>,
    {
        let key = self.node_key(id);
        loop {
            let Some(current) = self.store.get(&key).await? else {
                return Err(BatchError::UnknownNode { node_id: id });
            };
            let mut node = self.decode(id, &current)?;

            if !apply(&mut node)? {
                return Ok((node, false));
            }

            let encoded = serde_json::to_string(&node)?;
            match self
                .store
                .compare_and_swap(&key, current.version, &encoded)
                .await?
            {
                CasOutcome::Swapped(_) => return Ok((node, true)),
                CasOutcome::Conflict => {
                    trace!(node_id = %id, "Node record contended, retrying");
                    tokio::task::yield_now().await;
                }
                CasOutcome::Missing => return Err(BatchError::UnknownNode { node_id: id }),
            }
        }
    }

    fn decode(&self, id: JobId, raw: &VersionedValue) -> BatchResult<BatchNode> {
        serde_json::from_str(&raw.value).map_err(|e| BatchError::CorruptNode {
            node_id: id,
            message: e.to_string(),
        })
    }
}

impl std::fmt::Debug for BatchNodeRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchNodeRepository")
            .field("key_prefix", &self.key_prefix)
            .field("node_ttl", &self.node_ttl)
            .finish_non_exhaustive()
    }
}
