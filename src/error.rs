//! Crate-level error type.
//!
//! Each subsystem carries its own error enum ([`BatchError`], [`StoreError`],
//! [`QueueError`], [`JobError`], [`ConfigError`]); this module aggregates them
//! for APIs that cross subsystem boundaries, chiefly [`crate::WorkbatchClient`].

use thiserror::Error;

use crate::batch::BatchError;
use crate::config::ConfigError;
use crate::job::JobError;
use crate::queue::QueueError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum WorkbatchError {
    #[error("Batch error: {0}")]
    Batch(#[from] BatchError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, WorkbatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_errors_convert() {
        let store_err = StoreError::connection("refused");
        let err: WorkbatchError = store_err.into();
        assert!(matches!(err, WorkbatchError::Store(_)));
        assert!(format!("{err}").contains("refused"));

        let job_err = JobError::permanent("bad input");
        let err: WorkbatchError = job_err.into();
        assert!(matches!(err, WorkbatchError::Job(_)));
    }

    #[test]
    fn test_nested_batch_error_display() {
        let err: WorkbatchError = BatchError::UnknownNode {
            node_id: uuid::Uuid::nil(),
        }
        .into();
        let display = format!("{err}");
        assert!(display.contains("Batch error"));
        assert!(display.contains("unknown batch node"));
    }
}
