//! # Batch Completion Tracking
//!
//! ## Overview
//!
//! The bookkeeping core of the crate. Every enqueued job owns a node in a
//! batch tree; jobs spawned from inside a running job become children of that
//! job's node. This module detects, exactly once, the moment a node's whole
//! subtree has finished, and walks completion upward until the root's tree is
//! done.
//!
//! ## Key Components
//!
//! - [`BatchNode`](node::BatchNode): the per-job record (counters, seal flag,
//!   terminal state) stored as a single versioned document
//! - [`BatchNodeRepository`](repository::BatchNodeRepository): all store
//!   access; linearizes mutations through compare-and-swap retry loops
//! - [`CompletionPropagator`](propagator::CompletionPropagator): consumes
//!   completion reports and cascades terminal states toward the root
//! - [`CallbackDispatcher`](dispatcher::CallbackDispatcher): resolves handler
//!   hooks and contains their failures
//! - [`BatchHandle`](handle::BatchHandle): the in-job API for spawning
//!   children
//! - [`BatchProgress`](progress::BatchProgress): advisory per-tree counters
//!
//! ## Concurrency Model
//!
//! A node is one record behind one key. Registration, sealing, child counting,
//! and terminal transitions all go through versioned compare-and-swap, so any
//! interleaving of concurrent workers serializes per node. Terminal
//! transitions are first-write-wins, which is what makes completion detection
//! (and therefore every callback) fire at most once per node.

pub mod dispatcher;
pub mod handle;
pub mod node;
pub mod progress;
pub mod propagator;
pub mod repository;

pub use dispatcher::{BatchCallbacks, CallbackContext, CallbackDispatcher, ChildSummary};
pub use handle::BatchHandle;
pub use node::{BatchNode, CompletionOutcome, NodeState};
pub use progress::BatchProgress;
pub use propagator::CompletionPropagator;
pub use repository::BatchNodeRepository;

use thiserror::Error;

use crate::job::JobId;
use crate::queue::QueueError;
use crate::store::StoreError;

/// Errors surfaced by batch bookkeeping.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("batch node {node_id} already exists")]
    DuplicateNode { node_id: JobId },

    #[error("unknown batch node: {node_id}")]
    UnknownNode { node_id: JobId },

    #[error("unknown parent node: {parent_id}")]
    UnknownParent { parent_id: JobId },

    #[error("parent node {parent_id} is sealed and accepts no further children")]
    SealedParent { parent_id: JobId },

    #[error("completed_children would exceed expected_children on node {node_id}")]
    CounterOverflow { node_id: JobId },

    #[error("batch node {node_id} record is corrupt: {message}")]
    CorruptNode { node_id: JobId, message: String },

    #[error("node serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

/// Result type alias for batch operations
pub type BatchResult<T> = Result<T, BatchError>;
