//! Resume controller
//!
//! Turns the result of discovery into a restore action against the live
//! database plus the position the driver continues from.
//!
//! The two targets differ in when the live database is wiped: filesystem
//! restores always wipe first (a dump is restored into an empty database),
//! database restores only wipe when there is nothing to copy back.

use std::path::Path;
use tracing::{debug, info};

use super::discovery::{discover_db_checkpoint, discover_fs_checkpoint};
use super::maintenance::find_stray_checkpoints;
use super::naming::{split_db_checkpoint_name, split_fs_checkpoint_path};
use super::{CheckpointError, CheckpointLocation, ResumePosition, StorageTarget, position_after};
use crate::db::DatabaseAdmin;
use crate::observer::{RunEvent, RunObserver};
use crate::project::PipelineDefinition;
use crate::store::CheckpointStore;

/// Restore the latest checkpoint database into `live_db`
///
/// With a checkpoint, the live database is replaced by a copy of it and the
/// build resumes after its source. Without one, the live database is wiped
/// and the build starts at the first source.
pub fn restore_from_database(
    pipeline: &PipelineDefinition,
    live_db: &str,
    admin: &dyn DatabaseAdmin,
    observer: &dyn RunObserver,
) -> Result<ResumePosition, CheckpointError> {
    debug!(%live_db, "restore_from_database: called");

    let Some(checkpoint) = discover_db_checkpoint(pipeline, live_db, |name| admin.exists(name))? else {
        observer.notify(&RunEvent::NoCheckpointFound);
        admin.wipe(live_db)?;
        observer.notify(&RunEvent::LiveDatabaseWiped {
            database: live_db.to_string(),
        });
        return Ok(ResumePosition::START);
    };

    let location = CheckpointLocation::Database(checkpoint.clone());
    observer.notify(&RunEvent::CheckpointFound {
        location: location.clone(),
    });

    // Resolve the position before touching the live database
    let (_, source) = split_db_checkpoint_name(&checkpoint)?;
    let position = position_after(pipeline, &location, source)?;

    admin.drop_if_exists(live_db)?;
    admin.copy(&checkpoint, live_db)?;

    info!("Restored {} into {}, resuming after source {}", checkpoint, live_db, source);
    observer.notify(&RunEvent::CheckpointRestored {
        location,
        source: source.to_string(),
        position,
    });
    Ok(position)
}

/// Restore the latest checkpoint dump under `dir` into `live_db`
///
/// The live database is always wiped first, whether or not a dump is found.
pub fn restore_from_filesystem(
    pipeline: &PipelineDefinition,
    dir: &Path,
    live_db: &str,
    admin: &dyn DatabaseAdmin,
    store: &dyn CheckpointStore,
    observer: &dyn RunObserver,
) -> Result<ResumePosition, CheckpointError> {
    debug!(?dir, %live_db, "restore_from_filesystem: called");

    admin.wipe(live_db)?;
    observer.notify(&RunEvent::LiveDatabaseWiped {
        database: live_db.to_string(),
    });

    let Some(path) = discover_fs_checkpoint(pipeline, dir, |p| store.exists(p))? else {
        observer.notify(&RunEvent::NoCheckpointFound);
        return Ok(ResumePosition::START);
    };

    let location = CheckpointLocation::File(path.clone());
    observer.notify(&RunEvent::CheckpointFound {
        location: location.clone(),
    });

    let parts = split_fs_checkpoint_path(&path)?;
    let position = position_after(pipeline, &location, &parts.source)?;

    admin.restore_dump(live_db, &path)?;

    info!(
        "Restored {} into {}, resuming after source {}",
        path.display(),
        live_db,
        parts.source
    );
    observer.notify(&RunEvent::CheckpointRestored {
        location,
        source: parts.source,
        position,
    });
    Ok(position)
}

/// Restore from whichever target is active for this build
///
/// Checkpoints of sources no longer in the pipeline are reported as
/// [`RunEvent::StrayCheckpointIgnored`] first.
pub fn restore(
    target: &StorageTarget,
    pipeline: &PipelineDefinition,
    live_db: &str,
    admin: &dyn DatabaseAdmin,
    store: &dyn CheckpointStore,
    observer: &dyn RunObserver,
) -> Result<ResumePosition, CheckpointError> {
    for location in find_stray_checkpoints(target, pipeline, live_db, admin, store)? {
        observer.notify(&RunEvent::StrayCheckpointIgnored { location });
    }

    match target {
        StorageTarget::Database => restore_from_database(pipeline, live_db, admin, observer),
        StorageTarget::Filesystem { dir } => restore_from_filesystem(pipeline, dir, live_db, admin, store, observer),
    }
}

/// Work out where a build would resume without restoring anything
pub fn peek_resume_position(
    target: &StorageTarget,
    pipeline: &PipelineDefinition,
    live_db: &str,
    admin: &dyn DatabaseAdmin,
    store: &dyn CheckpointStore,
) -> Result<(ResumePosition, Option<CheckpointLocation>), CheckpointError> {
    debug!(%target, %live_db, "peek_resume_position: called");
    match target {
        StorageTarget::Database => match discover_db_checkpoint(pipeline, live_db, |name| admin.exists(name))? {
            Some(checkpoint) => {
                let location = CheckpointLocation::Database(checkpoint.clone());
                let (_, source) = split_db_checkpoint_name(&checkpoint)?;
                let position = position_after(pipeline, &location, source)?;
                Ok((position, Some(location)))
            }
            None => Ok((ResumePosition::START, None)),
        },
        StorageTarget::Filesystem { dir } => match discover_fs_checkpoint(pipeline, dir, |p| store.exists(p))? {
            Some(path) => {
                let parts = split_fs_checkpoint_path(&path)?;
                let location = CheckpointLocation::File(path);
                let position = position_after(pipeline, &location, &parts.source)?;
                Ok((position, Some(location)))
            }
            None => Ok((ResumePosition::START, None)),
        },
    }
}
