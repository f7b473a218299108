//! MineBuild - checkpointed, resumable data-integration pipeline runner
//!
//! MineBuild drives an integration pipeline: an ordered list of source
//! integration steps followed by an ordered list of postprocess steps, each one
//! an external build invocation against a PostgreSQL working database. Flagged
//! source steps are checkpointed after they succeed, and an interrupted build
//! picks up after the latest checkpoint instead of starting over.
//!
//! # Core Concepts
//!
//! - **Checkpoint naming**: a pipeline position maps to an artifact name and back
//! - **Discovery**: the latest checkpoint is the last source (in pipeline order) with an artifact
//! - **Resume**: restoring a checkpoint yields the index of the next source to run
//! - **Sequential driver**: one step at a time, any failure aborts the build
//!
//! # Modules
//!
//! - [`project`] - Pipeline definition (sources and postprocesses)
//! - [`checkpoint`] - Naming, discovery, resume and maintenance of checkpoints
//! - [`driver`] - Sequential execution of pipeline steps
//! - [`db`] - Database administration (PostgreSQL client tools)
//! - [`executor`] - Build step execution (Gradle)
//! - [`store`] - Filesystem checkpoint store
//! - [`observer`] - Run lifecycle events
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod checkpoint;
pub mod cli;
pub mod command;
pub mod config;
pub mod db;
pub mod driver;
pub mod executor;
pub mod observer;
pub mod project;
pub mod store;

// In-memory collaborators (only available in test builds or with the test-utils feature)
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export commonly used types
pub use checkpoint::{
    CheckpointError, CheckpointLocation, CheckpointStatus, FsCheckpointParts, ResumePosition, StorageTarget,
    clear_checkpoints, discover_db_checkpoint, discover_fs_checkpoint, find_stray_checkpoints, list_checkpoints,
    make_db_checkpoint_name,
    make_fs_checkpoint_path, peek_resume_position, restore, restore_from_database, restore_from_filesystem,
    split_db_checkpoint_name, split_fs_checkpoint_path,
};
pub use command::{CommandError, CommandOutput, CommandRunner, Invocation};
pub use config::{Config, DatabasesConfig, DbConfig, GradleConfig};
pub use db::{AdminError, DatabaseAdmin, PgAdmin};
pub use driver::{BuildOptions, BuildSummary, PipelineDriver};
pub use executor::{ExecutorError, GradleExecutor, StepExecutor};
pub use observer::{LogObserver, RunEvent, RunObserver};
pub use project::{PipelineDefinition, PipelineStep, ProjectError, StepKind};
pub use store::{CheckpointStore, LocalCheckpointStore, StoreError};
