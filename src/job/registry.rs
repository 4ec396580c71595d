//! # Job Handler Registry
//!
//! Maps registered job names to [`JobHandler`] implementations. Lookup happens
//! on every delivery, so the registry is lock-free for reads and safe to share
//! across worker tasks behind an `Arc`.
//!
//! An unregistered name at delivery time is not fatal: the processor treats it
//! as retryable, which tolerates rolling deployments where producers learn a
//! new job name before every worker does.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use super::JobHandler;

/// Thread-safe name-to-handler map.
#[derive(Default)]
pub struct JobRegistry {
    handlers: DashMap<String, Arc<dyn JobHandler>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any previous registration.
    pub fn register(&self, name: impl Into<String>, handler: Arc<dyn JobHandler>) {
        let name = name.into();
        info!(job = %name, handler = handler.handler_name(), "📝 Registered job handler");
        self.handlers.insert(name, handler);
    }

    /// Resolve a handler by registered name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn JobHandler>> {
        let handler = self.handlers.get(name).map(|entry| Arc::clone(entry.value()));
        if handler.is_none() {
            debug!(job = %name, "No handler registered for job name");
        }
        handler
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered job names, unordered.
    pub fn names(&self) -> Vec<String> {
        self.handlers
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}
