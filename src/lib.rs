#![allow(clippy::doc_markdown)] // Allow technical terms like Redis, JSON in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Workbatch Core
//!
//! Client and runtime core for a distributed job queue with hierarchical
//! batch completion tracking.
//!
//! ## Overview
//!
//! Jobs enqueued here form trees: any running job can register child jobs
//! into its batch, children can register grandchildren, and the runtime
//! detects the exact moment each subtree (and finally the whole tree) has
//! settled. Completion detection is exactly-once even though job execution
//! is at-least-once: retried runs, duplicate deliveries, and concurrent
//! sibling completions all converge on a single winner per terminal
//! transition.
//!
//! ## Architecture
//!
//! Every job owns one versioned record in a [`store::KeyedStore`]. All
//! bookkeeping goes through compare-and-swap on that record, so no locks
//! are held across workers and any process can drive a batch forward.
//! When a job finishes, the [`batch::CompletionPropagator`] seals its
//! record, walks completion upward through its ancestors, and fires
//! lifecycle hooks at most once per node.
//!
//! ## Module Organization
//!
//! - [`client`] - Entry point assembling store, queue, registry, and events
//! - [`batch`] - Node records, CAS repository, completion propagation, hooks
//! - [`job`] - Job payloads, handler trait, handler registry
//! - [`store`] - Versioned key-value store trait with memory and Redis backends
//! - [`queue`] - Queue backend trait and in-process queue
//! - [`worker`] - Delivery-side processor and a local polling worker
//! - [`events`] - Broadcast channel for lifecycle events
//! - [`config`] - YAML configuration with environment overlays
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use workbatch_core::client::WorkbatchClient;
//! use workbatch_core::config::WorkbatchConfig;
//! use workbatch_core::job::{JobContext, JobHandler, JobRegistry, JobResult};
//! use workbatch_core::queue::{MemoryQueue, QueueBackend};
//! use workbatch_core::store::MemoryStore;
//! use workbatch_core::worker::LocalWorker;
//!
//! struct ResizeImage;
//!
//! #[async_trait]
//! impl JobHandler for ResizeImage {
//!     async fn perform(&self, ctx: &JobContext) -> JobResult<()> {
//!         let source: String = ctx.args()?;
//!         println!("resizing {source}");
//!         // Spawn follow-up work into the same batch:
//!         // ctx.batch().add("upload_thumbnail", serde_json::json!(source)).await?;
//!         Ok(())
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let registry = Arc::new(JobRegistry::new());
//! registry.register("resize_image", Arc::new(ResizeImage));
//!
//! let queue = Arc::new(MemoryQueue::new());
//! let client = Arc::new(WorkbatchClient::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::clone(&queue) as Arc<dyn QueueBackend>,
//!     registry,
//!     WorkbatchConfig::default(),
//! ));
//!
//! let root = client.enqueue("resize_image", serde_json::json!("cover.png")).await.unwrap();
//! println!("enqueued batch root {root}");
//!
//! let worker = LocalWorker::new(Arc::clone(&client), queue);
//! let processed = worker.drain().await;
//! assert_eq!(processed, 1);
//! # });
//! ```
//!
//! ## Testing
//!
//! The in-memory store and queue make the whole pipeline runnable inside
//! plain `#[tokio::test]` functions:
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # All tests
//! ```

pub mod batch;
pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod job;
pub mod logging;
pub mod queue;
pub mod store;
pub mod worker;

pub use batch::{
    BatchCallbacks, BatchHandle, BatchNode, BatchProgress, CallbackContext, ChildSummary,
    CompletionOutcome, NodeState,
};
pub use client::WorkbatchClient;
pub use config::{CleanupPolicy, ConfigManager, WorkbatchConfig};
pub use error::{Result, WorkbatchError};
pub use events::EventPublisher;
pub use job::{JobContext, JobError, JobHandler, JobId, JobPayload, JobRegistry, JobResult};
pub use queue::{MemoryQueue, QueueBackend};
pub use store::{KeyedStore, MemoryStore};
pub use worker::{JobOutcome, JobProcessor, LocalWorker};
