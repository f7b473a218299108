//! Checkpoint/resume subsystem
//!
//! A checkpoint is a snapshot of the working database taken after a flagged
//! source step succeeds. It is stored either as a sibling database or as a
//! `pg_dump` file. On restart, the latest checkpoint is restored and the
//! build resumes at the source after it.

mod discovery;
mod error;
mod maintenance;
mod naming;
mod resume;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::project::{PipelineDefinition, PipelineStep};

pub use discovery::{discover_db_checkpoint, discover_fs_checkpoint};
pub use error::{BackendError, CheckpointError};
pub use maintenance::{CheckpointStatus, clear_checkpoints, find_stray_checkpoints, list_checkpoints};
pub use naming::{
    DB_CHECKPOINT_DELIMITER, FS_CHECKPOINT_ACTION, FS_CHECKPOINT_EXTENSION, FS_PARTIAL_SUFFIX, FsCheckpointParts,
    MAX_DB_IDENTIFIER_LEN, check_db_identifier_len, is_valid_source_name, make_db_checkpoint_name,
    make_fs_checkpoint_filename, make_fs_checkpoint_path, make_fs_partial_path, split_db_checkpoint_name,
    split_fs_checkpoint_path,
};
pub use resume::{peek_resume_position, restore, restore_from_database, restore_from_filesystem};

/// Where checkpoints are persisted for a build; exactly one is active per run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "store", rename_all = "kebab-case")]
pub enum StorageTarget {
    /// Checkpoints are copies of the live database named `{live}:{source}`
    #[default]
    Database,

    /// Checkpoints are `pg_dump` files under `dir`
    Filesystem { dir: PathBuf },
}

impl StorageTarget {
    /// Compute where the checkpoint for `step` lives under this target
    pub fn locate(&self, live_db: &str, step: &PipelineStep) -> CheckpointLocation {
        match self {
            StorageTarget::Database => CheckpointLocation::Database(make_db_checkpoint_name(live_db, step)),
            StorageTarget::Filesystem { dir } => CheckpointLocation::File(make_fs_checkpoint_path(dir, step)),
        }
    }
}

impl fmt::Display for StorageTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageTarget::Database => write!(f, "database"),
            StorageTarget::Filesystem { dir } => write!(f, "filesystem ({})", dir.display()),
        }
    }
}

/// A concrete checkpoint artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointLocation {
    Database(String),
    File(PathBuf),
}

impl fmt::Display for CheckpointLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointLocation::Database(name) => write!(f, "database {}", name),
            CheckpointLocation::File(path) => write!(f, "file {}", path.display()),
        }
    }
}

/// Index of the first source step to (re-)execute, in `[0, sources.len()]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResumePosition(usize);

impl ResumePosition {
    /// No checkpoint: run every source
    pub const START: ResumePosition = ResumePosition(0);

    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Resume after the source at `index`
    pub fn after(index: usize) -> Self {
        Self(index + 1)
    }

    pub fn index(self) -> usize {
        self.0
    }

    pub fn is_start(self) -> bool {
        self.0 == 0
    }

    /// True when every source is already covered by the checkpoint
    pub fn is_complete(self, pipeline: &PipelineDefinition) -> bool {
        self.0 >= pipeline.sources().len()
    }

    /// The source step execution continues with, if any
    pub fn next_step(self, pipeline: &PipelineDefinition) -> Option<&PipelineStep> {
        pipeline.sources().get(self.0)
    }
}

impl fmt::Display for ResumePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolve the resume position after a checkpoint of `source_name`
pub(crate) fn position_after(
    pipeline: &PipelineDefinition,
    checkpoint: &CheckpointLocation,
    source_name: &str,
) -> Result<ResumePosition, CheckpointError> {
    pipeline
        .source_index(source_name)
        .map(ResumePosition::after)
        .ok_or_else(|| CheckpointError::UnknownCheckpointSource {
            checkpoint: checkpoint.to_string(),
            source_name: source_name.to_string(),
        })
}
