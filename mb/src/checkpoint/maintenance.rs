//! Listing and clearing the checkpoints of a pipeline

use tracing::{debug, info};

use super::naming::{DB_CHECKPOINT_DELIMITER, split_db_checkpoint_name, split_fs_checkpoint_path};
use super::{CheckpointError, CheckpointLocation, StorageTarget};
use crate::db::DatabaseAdmin;
use crate::observer::{RunEvent, RunObserver};
use crate::project::PipelineDefinition;
use crate::store::CheckpointStore;

/// Whether the checkpoint artifact for one source is present
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointStatus {
    pub source: String,
    pub index: usize,
    pub location: CheckpointLocation,
    pub present: bool,
}

fn artifact_exists(
    location: &CheckpointLocation,
    admin: &dyn DatabaseAdmin,
    store: &dyn CheckpointStore,
) -> Result<bool, CheckpointError> {
    Ok(match location {
        CheckpointLocation::Database(name) => admin.exists(name)?,
        CheckpointLocation::File(path) => store.exists(path)?,
    })
}

/// Report, for every source in pipeline order, whether its checkpoint exists
///
/// Sources without the checkpoint flag are included too; a leftover artifact
/// from an earlier project file still counts for discovery.
pub fn list_checkpoints(
    target: &StorageTarget,
    pipeline: &PipelineDefinition,
    live_db: &str,
    admin: &dyn DatabaseAdmin,
    store: &dyn CheckpointStore,
) -> Result<Vec<CheckpointStatus>, CheckpointError> {
    debug!(%target, %live_db, "list_checkpoints: called");
    pipeline
        .sources()
        .iter()
        .enumerate()
        .map(|(index, step)| {
            let location = target.locate(live_db, step);
            let present = artifact_exists(&location, admin, store)?;
            Ok(CheckpointStatus {
                source: step.name.clone(),
                index,
                location,
                present,
            })
        })
        .collect()
}

/// Checkpoint artifacts of `live_db` that belong to no source of the pipeline
///
/// Discovery only looks for the pipeline's own sources, so these are never
/// restored; they are left over from sources since removed from the project.
pub fn find_stray_checkpoints(
    target: &StorageTarget,
    pipeline: &PipelineDefinition,
    live_db: &str,
    admin: &dyn DatabaseAdmin,
    store: &dyn CheckpointStore,
) -> Result<Vec<CheckpointLocation>, CheckpointError> {
    debug!(%target, %live_db, "find_stray_checkpoints: called");
    let owned = |source: Option<&str>| source.is_some_and(|s| pipeline.source_index(s).is_some());

    let stray = match target {
        StorageTarget::Database => {
            let prefix = format!("{}{}", live_db, DB_CHECKPOINT_DELIMITER);
            admin
                .list_databases()?
                .into_iter()
                .filter(|name| name.starts_with(&prefix))
                .filter(|name| !owned(split_db_checkpoint_name(name).ok().map(|(_, source)| source)))
                .map(CheckpointLocation::Database)
                .collect()
        }
        StorageTarget::Filesystem { dir } => store
            .list_checkpoint_files(dir)?
            .into_iter()
            .filter(|path| {
                let parts = split_fs_checkpoint_path(path).ok();
                !owned(parts.as_ref().map(|p| p.source.as_str()))
            })
            .map(CheckpointLocation::File)
            .collect(),
    };
    Ok(stray)
}

/// Delete every checkpoint artifact of the pipeline that exists
///
/// Returns the number of artifacts removed.
pub fn clear_checkpoints(
    target: &StorageTarget,
    pipeline: &PipelineDefinition,
    live_db: &str,
    admin: &dyn DatabaseAdmin,
    store: &dyn CheckpointStore,
    observer: &dyn RunObserver,
) -> Result<usize, CheckpointError> {
    debug!(%target, %live_db, "clear_checkpoints: called");

    let mut removed = 0;
    for status in list_checkpoints(target, pipeline, live_db, admin, store)? {
        if !status.present {
            continue;
        }
        match &status.location {
            CheckpointLocation::Database(name) => {
                admin.terminate_backends()?;
                admin.drop_if_exists(name)?;
            }
            CheckpointLocation::File(path) => store.delete(path)?,
        }
        observer.notify(&RunEvent::CheckpointDeleted {
            location: status.location,
        });
        removed += 1;
    }

    info!("Cleared {} checkpoint(s) from {}", removed, target);
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::PipelineStep;
    use crate::testing::{AdminCall, FakeAdmin, FakeStore, RecordingObserver};
    use std::path::PathBuf;

    fn pipeline() -> PipelineDefinition {
        PipelineDefinition::new(
            vec![
                PipelineStep::source("a").checkpointed(),
                PipelineStep::source("b"),
                PipelineStep::source("c").checkpointed(),
            ],
            vec![PipelineStep::postprocess("do-sources")],
        )
        .unwrap()
    }

    #[test]
    fn test_list_reports_every_source() {
        let admin = FakeAdmin::with_databases(["mine", "mine:c"]);
        let store = FakeStore::default();

        let statuses = list_checkpoints(&StorageTarget::Database, &pipeline(), "mine", &admin, &store).unwrap();

        assert_eq!(statuses.len(), 3);
        let present: Vec<_> = statuses.iter().filter(|s| s.present).map(|s| s.source.as_str()).collect();
        assert_eq!(present, vec!["c"]);
        assert_eq!(statuses[2].index, 2);
        assert_eq!(statuses[0].location, CheckpointLocation::Database("mine:a".to_string()));
    }

    #[test]
    fn test_clear_drops_only_existing_databases() {
        let admin = FakeAdmin::with_databases(["mine", "mine:a", "mine:c"]);
        let store = FakeStore::default();
        let observer = RecordingObserver::default();

        let removed =
            clear_checkpoints(&StorageTarget::Database, &pipeline(), "mine", &admin, &store, &observer).unwrap();

        assert_eq!(removed, 2);
        assert_eq!(
            admin.mutations(),
            vec![
                AdminCall::DropIfExists("mine:a".to_string()),
                AdminCall::DropIfExists("mine:c".to_string()),
            ]
        );
        assert_eq!(admin.databases(), vec!["mine".to_string()]);
        assert_eq!(observer.event_types(), vec!["checkpoint_deleted", "checkpoint_deleted"]);
    }

    #[test]
    fn test_clear_deletes_only_existing_files() {
        let dir = PathBuf::from("dumps");
        let admin = FakeAdmin::with_databases(["mine"]);
        let store = FakeStore::with_files([dir.join("integrate_b.pgdump"), dir.join("notes.txt")]);
        let target = StorageTarget::Filesystem { dir: dir.clone() };

        let removed =
            clear_checkpoints(&target, &pipeline(), "mine", &admin, &store, &RecordingObserver::default()).unwrap();

        assert_eq!(removed, 1);
        assert_eq!(store.deleted(), vec![dir.join("integrate_b.pgdump")]);
        assert_eq!(store.files(), vec![dir.join("notes.txt")]);
        assert!(admin.mutations().is_empty());
    }

    #[test]
    fn test_clear_with_nothing_present() {
        let admin = FakeAdmin::with_databases(["mine"]);
        let removed = clear_checkpoints(
            &StorageTarget::Database,
            &pipeline(),
            "mine",
            &admin,
            &FakeStore::default(),
            &RecordingObserver::default(),
        )
        .unwrap();

        assert_eq!(removed, 0);
        assert!(admin.mutations().is_empty());
    }

    #[test]
    fn test_stray_databases() {
        let admin = FakeAdmin::with_databases(["mine", "mine:a", "mine:zfin", "mine:a:b", "other:zfin", "minex:zfin"]);

        let stray =
            find_stray_checkpoints(&StorageTarget::Database, &pipeline(), "mine", &admin, &FakeStore::default())
                .unwrap();

        assert_eq!(
            stray,
            vec![
                CheckpointLocation::Database("mine:a:b".to_string()),
                CheckpointLocation::Database("mine:zfin".to_string()),
            ]
        );
    }

    #[test]
    fn test_stray_files() {
        let dir = PathBuf::from("dumps");
        let store = FakeStore::with_files([
            dir.join("integrate_a.pgdump"),
            dir.join("integrate_zfin.pgdump"),
            dir.join("integrate_c.pgdump.partial"),
            PathBuf::from("elsewhere/integrate_zfin.pgdump"),
        ]);
        let target = StorageTarget::Filesystem { dir: dir.clone() };

        let stray =
            find_stray_checkpoints(&target, &pipeline(), "mine", &FakeAdmin::with_databases(["mine"]), &store).unwrap();

        assert_eq!(stray, vec![CheckpointLocation::File(dir.join("integrate_zfin.pgdump"))]);
    }

    #[test]
    fn test_list_propagates_unreachable_server() {
        let err = list_checkpoints(
            &StorageTarget::Database,
            &pipeline(),
            "mine",
            &FakeAdmin::unreachable(),
            &FakeStore::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CheckpointError::StorageBackendUnavailable(_)));
    }
}
