//! Run lifecycle events
//!
//! Components report what they do through an injected [`RunObserver`]
//! rather than a process-wide logger. [`LogObserver`] forwards every event
//! to `tracing`.

use tracing::{error, info, warn};

use crate::checkpoint::{CheckpointLocation, ResumePosition};
use crate::project::StepKind;

/// Something observable that happened during a build
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    // === Resume ===
    /// The live database was reset to an empty baseline
    LiveDatabaseWiped { database: String },
    /// Discovery found a checkpoint to restore
    CheckpointFound { location: CheckpointLocation },
    /// Discovery found nothing, the build starts from the first source
    NoCheckpointFound,
    /// A checkpoint of a source that is not in the pipeline, never restored
    StrayCheckpointIgnored { location: CheckpointLocation },
    /// A checkpoint was restored into the live database
    CheckpointRestored {
        location: CheckpointLocation,
        source: String,
        position: ResumePosition,
    },

    // === Steps ===
    StepStarted {
        kind: StepKind,
        name: String,
        index: usize,
        total: usize,
    },
    StepCompleted { kind: StepKind, name: String },
    StepFailed {
        kind: StepKind,
        name: String,
        message: String,
    },

    // === Checkpoints ===
    CheckpointWritten { source: String, location: CheckpointLocation },
    CheckpointDeleted { location: CheckpointLocation },

    /// Every remaining step ran successfully
    BuildCompleted { sources_run: usize, postprocesses_run: usize },
}

impl RunEvent {
    /// Short name of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            RunEvent::LiveDatabaseWiped { .. } => "live_database_wiped",
            RunEvent::CheckpointFound { .. } => "checkpoint_found",
            RunEvent::NoCheckpointFound => "no_checkpoint_found",
            RunEvent::StrayCheckpointIgnored { .. } => "stray_checkpoint_ignored",
            RunEvent::CheckpointRestored { .. } => "checkpoint_restored",
            RunEvent::StepStarted { .. } => "step_started",
            RunEvent::StepCompleted { .. } => "step_completed",
            RunEvent::StepFailed { .. } => "step_failed",
            RunEvent::CheckpointWritten { .. } => "checkpoint_written",
            RunEvent::CheckpointDeleted { .. } => "checkpoint_deleted",
            RunEvent::BuildCompleted { .. } => "build_completed",
        }
    }
}

/// Receives run events as they happen
pub trait RunObserver {
    fn notify(&self, event: &RunEvent);
}

/// Observer that writes every event to the tracing log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl RunObserver for LogObserver {
    fn notify(&self, event: &RunEvent) {
        match event {
            RunEvent::LiveDatabaseWiped { database } => info!("Wiped database {}", database),
            RunEvent::CheckpointFound { location } => info!("Found checkpoint {}", location),
            RunEvent::NoCheckpointFound => info!("No checkpoint found, starting from the first source"),
            RunEvent::StrayCheckpointIgnored { location } => {
                warn!("Ignoring checkpoint {} of a source that is not in the project", location)
            }
            RunEvent::CheckpointRestored { source, position, .. } => {
                info!("Resuming after source {} (position {})", source, position)
            }
            RunEvent::StepStarted {
                kind,
                name,
                index,
                total,
            } => info!("Running {} {} ({}/{})", kind, name, index + 1, total),
            RunEvent::StepCompleted { kind, name } => info!("Finished {} {}", kind, name),
            RunEvent::StepFailed { kind, name, message } => error!("{} {} failed: {}", kind, name, message),
            RunEvent::CheckpointWritten { source, location } => {
                info!("Checkpointed at source {} to {}", source, location)
            }
            RunEvent::CheckpointDeleted { location } => warn!("Deleted checkpoint {}", location),
            RunEvent::BuildCompleted {
                sources_run,
                postprocesses_run,
            } => info!(
                "Build complete: {} sources and {} postprocesses run",
                sources_run, postprocesses_run
            ),
        }
    }
}
