//! Checkpoint discovery
//!
//! Sources are scanned in reverse pipeline order and the first one with a
//! persisted artifact wins. This finds the latest checkpoint without
//! timestamps, provided earlier checkpoints are never kept around after a
//! later one was written and then removed.

use std::path::{Path, PathBuf};
use tracing::debug;

use super::naming::{make_db_checkpoint_name, make_fs_checkpoint_path, split_db_checkpoint_name, split_fs_checkpoint_path};
use crate::project::PipelineDefinition;

/// Find the latest checkpoint database of `live_db`
///
/// `exists` is queried once per candidate, latest source first.
pub fn discover_db_checkpoint<F, E>(
    pipeline: &PipelineDefinition,
    live_db: &str,
    mut exists: F,
) -> Result<Option<String>, E>
where
    F: FnMut(&str) -> Result<bool, E>,
{
    debug!(%live_db, "discover_db_checkpoint: called");
    for step in pipeline.sources().iter().rev() {
        let name = make_db_checkpoint_name(live_db, step);
        if !exists(&name)? {
            continue;
        }
        match split_db_checkpoint_name(&name) {
            Ok((_, source)) if source == step.name => {
                debug!(%name, "discover_db_checkpoint: found");
                return Ok(Some(name));
            }
            Ok(_) => debug!(%name, "discover_db_checkpoint: source does not round-trip, skipping"),
            Err(e) => debug!(%name, %e, "discover_db_checkpoint: unparseable, skipping"),
        }
    }
    debug!("discover_db_checkpoint: none found");
    Ok(None)
}

/// Find the latest checkpoint dump under `dir`
pub fn discover_fs_checkpoint<F, E>(
    pipeline: &PipelineDefinition,
    dir: &Path,
    mut exists: F,
) -> Result<Option<PathBuf>, E>
where
    F: FnMut(&Path) -> Result<bool, E>,
{
    debug!(?dir, "discover_fs_checkpoint: called");
    for step in pipeline.sources().iter().rev() {
        let path = make_fs_checkpoint_path(dir, step);
        if !exists(&path)? {
            continue;
        }
        match split_fs_checkpoint_path(&path) {
            Ok(parts) if parts.source == step.name => {
                debug!(?path, "discover_fs_checkpoint: found");
                return Ok(Some(path));
            }
            Ok(_) => debug!(?path, "discover_fs_checkpoint: source does not round-trip, skipping"),
            Err(e) => debug!(?path, %e, "discover_fs_checkpoint: unparseable, skipping"),
        }
    }
    debug!("discover_fs_checkpoint: none found");
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::PipelineStep;
    use std::collections::HashSet;
    use std::convert::Infallible;

    fn pipeline() -> PipelineDefinition {
        PipelineDefinition::new(
            vec![PipelineStep::source("a"), PipelineStep::source("b"), PipelineStep::source("c")],
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn test_db_discovery_picks_latest() {
        let existing: HashSet<&str> = ["mine:a", "mine:b"].into_iter().collect();
        let found = discover_db_checkpoint(&pipeline(), "mine", |n| Ok::<_, Infallible>(existing.contains(n))).unwrap();
        assert_eq!(found.as_deref(), Some("mine:b"));
    }

    #[test]
    fn test_db_discovery_scans_in_reverse_and_stops() {
        let mut queried = Vec::new();
        let found = discover_db_checkpoint(&pipeline(), "mine", |n| {
            queried.push(n.to_string());
            Ok::<_, Infallible>(n == "mine:b")
        })
        .unwrap();
        assert_eq!(found.as_deref(), Some("mine:b"));
        assert_eq!(queried, vec!["mine:c", "mine:b"]);
    }

    #[test]
    fn test_db_discovery_ignores_other_databases() {
        let found = discover_db_checkpoint(&pipeline(), "mine", |n| Ok::<_, Infallible>(n == "othermine:c")).unwrap();
        assert_eq!(found, None);
    }

    #[test]
    fn test_db_discovery_none() {
        let found = discover_db_checkpoint(&pipeline(), "mine", |_| Ok::<_, Infallible>(false)).unwrap();
        assert_eq!(found, None);
    }

    #[test]
    fn test_db_discovery_propagates_predicate_error() {
        let result = discover_db_checkpoint(&pipeline(), "mine", |_| Err::<bool, _>("server down"));
        assert_eq!(result, Err("server down"));
    }

    #[test]
    fn test_db_discovery_skips_names_that_do_not_round_trip() {
        // A live database name containing ':' produces names that cannot be split back
        let found = discover_db_checkpoint(&pipeline(), "my:mine", |_| Ok::<_, Infallible>(true)).unwrap();
        assert_eq!(found, None);
    }

    #[test]
    fn test_fs_discovery_picks_latest() {
        let dir = Path::new("dumpdir");
        let existing: HashSet<PathBuf> = [dir.join("integrate_a.pgdump"), dir.join("integrate_b.pgdump")]
            .into_iter()
            .collect();
        let found = discover_fs_checkpoint(&pipeline(), dir, |p| Ok::<_, Infallible>(existing.contains(p))).unwrap();
        assert_eq!(found, Some(dir.join("integrate_b.pgdump")));
    }

    #[test]
    fn test_fs_discovery_on_real_directory() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(temp.path().join("integrate_a.pgdump"), b"dump").unwrap();

        let found =
            discover_fs_checkpoint(&pipeline(), temp.path(), |p| Ok::<_, Infallible>(p.is_file())).unwrap();
        assert_eq!(found, Some(temp.path().join("integrate_a.pgdump")));
    }

    #[test]
    fn test_fs_discovery_none() {
        let found = discover_fs_checkpoint(&pipeline(), Path::new("dumpdir"), |_| Ok::<_, Infallible>(false)).unwrap();
        assert_eq!(found, None);
    }
}
