//! # Worker Runtime
//!
//! Delivery-side execution: [`JobProcessor`](processor::JobProcessor) turns
//! one delivered payload into handler execution plus completion bookkeeping,
//! and [`LocalWorker`](local::LocalWorker) drives a process-local queue
//! through the processor for tests and single-process deployments.
//!
//! The processor is transport-agnostic on purpose: a deployment receiving
//! deliveries over HTTP, gRPC, or a message bus feeds payloads into
//! [`JobProcessor::process`] and maps the returned
//! [`JobOutcome`](processor::JobOutcome) onto its envelope's ack/retry
//! vocabulary.

pub mod local;
pub mod processor;

pub use local::LocalWorker;
pub use processor::{JobOutcome, JobProcessor};
