//! # Batch Node Records
//!
//! The per-job record that batch completion tracking is built on. A node is
//! created when its job is enqueued, mutated while the job runs (child
//! registration, sealing, child counting), and moved to exactly one terminal
//! state when its subtree finishes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::job::{JobId, JobPayload};

/// Lifecycle state of a batch node.
///
/// `Open` is the only non-terminal state. The transition out of `Open` is
/// first-write-wins, which gives completion detection its exactly-once
/// property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Completion not yet decided.
    Open,
    /// The node's own work and every descendant finished successfully.
    Complete,
    /// The node's own work failed permanently.
    Dead,
}

impl NodeState {
    /// Check if this state is terminal (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeState::Complete | NodeState::Dead)
    }
}

impl Default for NodeState {
    fn default() -> Self {
        NodeState::Open
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeState::Open => "open",
            NodeState::Complete => "complete",
            NodeState::Dead => "dead",
        };
        write!(f, "{s}")
    }
}

impl FromStr for NodeState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(NodeState::Open),
            "complete" => Ok(NodeState::Complete),
            "dead" => Ok(NodeState::Dead),
            _ => Err(format!("Invalid node state: {s}")),
        }
    }
}

/// Terminal outcome of one job execution, as reported by a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionOutcome {
    /// The job body finished without error.
    Success,
    /// The job failed and will never be retried again.
    PermanentFailure,
}

impl CompletionOutcome {
    /// The node state this outcome finalizes to.
    pub fn terminal_state(&self) -> NodeState {
        match self {
            CompletionOutcome::Success => NodeState::Complete,
            CompletionOutcome::PermanentFailure => NodeState::Dead,
        }
    }
}

impl fmt::Display for CompletionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompletionOutcome::Success => "success",
            CompletionOutcome::PermanentFailure => "permanent_failure",
        };
        write!(f, "{s}")
    }
}

/// One job's record in a batch tree.
///
/// Stored as a single JSON document under one store key so that every field
/// moves atomically through compare-and-swap. Invariants maintained by the
/// repository:
///
/// - `expected_children` only grows, and only while `sealed` is false
/// - `completed_children` only grows and never exceeds `expected_children`
/// - `sealed` and `self_done` never revert once set
/// - `state` leaves [`NodeState::Open`] at most once
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchNode {
    pub id: JobId,
    pub parent_id: Option<JobId>,
    /// Root of the tree this node belongs to; equals `id` for roots.
    pub root_id: JobId,
    /// Children registered so far.
    pub expected_children: u32,
    /// Children whose subtrees reached a terminal state.
    pub completed_children: u32,
    /// Registration order of child ids; used for subtree walks.
    pub children: Vec<JobId>,
    /// No further children may be registered.
    pub sealed: bool,
    /// The node's own job reported a terminal outcome.
    pub self_done: bool,
    pub state: NodeState,
    /// Payload of the job this node tracks, kept for callback delivery.
    pub payload: JobPayload,
    pub created_at: DateTime<Utc>,
}

impl BatchNode {
    /// Create an open node for `payload`, attached to the tree rooted at
    /// `root_id`.
    pub fn new(payload: JobPayload, root_id: JobId) -> Self {
        Self {
            id: payload.id,
            parent_id: payload.parent_id,
            root_id,
            expected_children: 0,
            completed_children: 0,
            children: Vec::new(),
            sealed: false,
            self_done: false,
            state: NodeState::Open,
            created_at: Utc::now(),
            payload,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Completion check: the node is complete once no more children can
    /// appear (`sealed`), its own work is done, and every registered child's
    /// subtree finished.
    pub fn is_complete(&self) -> bool {
        self.sealed && self.self_done && self.completed_children == self.expected_children
    }
}
