//! # Lifecycle Events
//!
//! Broadcast-based event stream for job and batch lifecycle transitions.
//! Components publish named events (see [`crate::constants::events`]) with a
//! JSON context; observers subscribe to the same channel to drive metrics,
//! audit trails, or test assertions. Publishing never blocks progress: with no
//! subscribers the event is dropped.

pub mod publisher;

pub use publisher::{EventPublisher, PublishError, PublishedEvent};
