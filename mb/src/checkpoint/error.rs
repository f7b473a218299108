//! Checkpoint error types

use thiserror::Error;

use crate::db::AdminError;
use crate::executor::ExecutorError;
use crate::project::StepKind;
use crate::store::StoreError;

/// Errors that can occur while naming, discovering, restoring or writing checkpoints
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Malformed checkpoint identifier '{identifier}': {reason}")]
    MalformedIdentifier { identifier: String, reason: &'static str },

    #[error("Checkpoint {checkpoint} belongs to source '{source_name}', which is not in the pipeline definition")]
    UnknownCheckpointSource { checkpoint: String, source_name: String },

    #[error("{kind} step '{step}' failed: {source}")]
    StepExecutionFailure {
        kind: StepKind,
        step: String,
        #[source]
        source: ExecutorError,
    },

    #[error("Storage backend unavailable: {0}")]
    StorageBackendUnavailable(#[source] BackendError),
}

/// The collaborator call that failed underneath a storage error
#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Database(#[from] AdminError),

    #[error(transparent)]
    Filesystem(#[from] StoreError),
}

impl CheckpointError {
    pub(crate) fn malformed(identifier: impl Into<String>, reason: &'static str) -> Self {
        CheckpointError::MalformedIdentifier {
            identifier: identifier.into(),
            reason,
        }
    }
}

impl From<AdminError> for CheckpointError {
    fn from(err: AdminError) -> Self {
        CheckpointError::StorageBackendUnavailable(BackendError::Database(err))
    }
}

impl From<StoreError> for CheckpointError {
    fn from(err: StoreError) -> Self {
        CheckpointError::StorageBackendUnavailable(BackendError::Filesystem(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_source_message() {
        let err = CheckpointError::UnknownCheckpointSource {
            checkpoint: "biotestmine:uniprot".to_string(),
            source_name: "uniprot".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("biotestmine:uniprot"));
        assert!(msg.contains("'uniprot'"));
    }

    #[test]
    fn test_step_failure_names_step() {
        let err = CheckpointError::StepExecutionFailure {
            kind: StepKind::Source,
            step: "homologene".to_string(),
            source: ExecutorError::Failed {
                task: "integrate".to_string(),
                step: "homologene".to_string(),
                code: Some(1),
            },
        };

        let msg = err.to_string();
        assert!(msg.starts_with("source step 'homologene' failed"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_malformed_message() {
        let err = CheckpointError::malformed("nodelimiter", "missing ':' delimiter");
        assert_eq!(
            err.to_string(),
            "Malformed checkpoint identifier 'nodelimiter': missing ':' delimiter"
        );
    }

    #[test]
    fn test_admin_error_becomes_storage_unavailable() {
        let err: CheckpointError = AdminError::Unreachable("connection refused".to_string()).into();
        assert!(matches!(
            err,
            CheckpointError::StorageBackendUnavailable(BackendError::Database(_))
        ));
        assert!(err.to_string().contains("connection refused"));
    }
}
