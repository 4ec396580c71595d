//! # Configuration System
//!
//! ## Overview
//!
//! Typed configuration for the batch runtime: store key layout and record
//! expiry, queue routing and payload limits, and worker retry/concurrency
//! settings. Everything has a sensible default, so `WorkbatchConfig::default()`
//! is a working development configuration; deployments load YAML with
//! environment-specific overrides through [`ConfigManager`](loader::ConfigManager).
//!
//! Backends are deliberately not configured here. The store and queue are
//! injected as trait objects at client construction, so configuration carries
//! tuning values only, never connection secrets.

pub mod loader;

pub use loader::ConfigManager;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::constants::defaults;

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found. Searched: {searched_paths:?}")]
    ConfigFileNotFound { searched_paths: Vec<PathBuf> },

    #[error("Failed to read configuration file {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML in {path}: {message}")]
    InvalidYaml { path: String, message: String },

    #[error("Invalid configuration value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn config_file_not_found(searched_paths: Vec<PathBuf>) -> Self {
        Self::ConfigFileNotFound { searched_paths }
    }

    pub fn file_read_error(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_yaml(path: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self::InvalidYaml {
            path: path.into(),
            message: error.to_string(),
        }
    }

    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// What happens to a tree's records once its root completes successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CleanupPolicy {
    /// Delete every record and gauge as the final step of batch completion.
    Immediate,
    /// Keep records readable for `seconds` after completion, then let the
    /// store expire them.
    ExpireAfter { seconds: u64 },
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        CleanupPolicy::Immediate
    }
}

/// Store key layout and record lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Prefix for every key this crate writes.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Backstop TTL stamped on node records at creation, in seconds. `null`
    /// disables expiry entirely, which leaves abandoned trees behind forever.
    #[serde(default = "default_node_ttl_seconds")]
    pub node_ttl_seconds: Option<u64>,

    #[serde(default)]
    pub cleanup: CleanupPolicy,
}

impl StoreConfig {
    pub fn node_ttl(&self) -> Option<Duration> {
        self.node_ttl_seconds.map(Duration::from_secs)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            node_ttl_seconds: default_node_ttl_seconds(),
            cleanup: CleanupPolicy::default(),
        }
    }
}

/// Queue routing and submission limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue used when a job is enqueued without an explicit queue name.
    #[serde(default = "default_queue_name")]
    pub default_queue: String,

    /// Serialized payload size limit enforced before submission.
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_queue: default_queue_name(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

/// Worker retry budget and local execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Deliveries allowed per job before a retryable failure is finalized as
    /// permanent.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Concurrent executions for the local worker loop.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Idle poll interval for the local worker loop, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            concurrency: default_concurrency(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Root configuration for the batch runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkbatchConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

impl WorkbatchConfig {
    /// Validate cross-field constraints after loading.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.store.key_prefix.is_empty() {
            return Err(ConfigError::invalid_value(
                "store.key_prefix",
                &self.store.key_prefix,
                "must not be empty",
            ));
        }
        if self.store.key_prefix.chars().any(char::is_whitespace) {
            return Err(ConfigError::invalid_value(
                "store.key_prefix",
                &self.store.key_prefix,
                "must not contain whitespace",
            ));
        }
        if let CleanupPolicy::ExpireAfter { seconds } = self.store.cleanup {
            if seconds == 0 {
                return Err(ConfigError::invalid_value(
                    "store.cleanup.seconds",
                    seconds.to_string(),
                    "must be positive; use mode 'immediate' for instant cleanup",
                ));
            }
        }
        if self.queue.default_queue.is_empty() {
            return Err(ConfigError::invalid_value(
                "queue.default_queue",
                &self.queue.default_queue,
                "must not be empty",
            ));
        }
        if self.queue.max_payload_bytes == 0 {
            return Err(ConfigError::invalid_value(
                "queue.max_payload_bytes",
                "0",
                "must be positive",
            ));
        }
        if self.worker.concurrency == 0 {
            return Err(ConfigError::invalid_value(
                "worker.concurrency",
                "0",
                "must be at least 1",
            ));
        }
        if self.worker.poll_interval_ms == 0 {
            return Err(ConfigError::invalid_value(
                "worker.poll_interval_ms",
                "0",
                "must be positive",
            ));
        }
        Ok(())
    }
}

fn default_key_prefix() -> String {
    crate::constants::keys::DEFAULT_PREFIX.to_string()
}

fn default_node_ttl_seconds() -> Option<u64> {
    Some(defaults::NODE_TTL_SECS)
}

fn default_queue_name() -> String {
    defaults::QUEUE_NAME.to_string()
}

fn default_max_payload_bytes() -> usize {
    defaults::MAX_PAYLOAD_BYTES
}

fn default_max_retries() -> u32 {
    defaults::MAX_RETRIES
}

fn default_concurrency() -> usize {
    defaults::WORKER_CONCURRENCY
}

fn default_poll_interval_ms() -> u64 {
    defaults::POLL_INTERVAL_MS
}
