//! Checkpoint naming
//!
//! Maps a source step to the name of its checkpoint artifact and back:
//!
//! ```text
//! database:   {live_db}:{source}             e.g. biotestmine:go-annotation
//! filesystem: {dir}/integrate_{source}.pgdump e.g. dumpdir/integrate_go-annotation.pgdump
//! ```
//!
//! Both forms only round-trip for source names drawn from `[A-Za-z0-9-]`,
//! which the pipeline definition enforces at load time.

use std::path::{Path, PathBuf};

use super::CheckpointError;
use crate::project::PipelineStep;

/// Separator between the live database name and the source name
pub const DB_CHECKPOINT_DELIMITER: char = ':';

/// Action prefix of checkpoint dump filenames
pub const FS_CHECKPOINT_ACTION: &str = "integrate";

/// Extension of checkpoint dump filenames
pub const FS_CHECKPOINT_EXTENSION: &str = "pgdump";

/// Suffix of a dump that is still being written
pub const FS_PARTIAL_SUFFIX: &str = "partial";

/// Longest identifier PostgreSQL keeps (NAMEDATALEN - 1); longer names are truncated
pub const MAX_DB_IDENTIFIER_LEN: usize = 63;

/// Components of a filesystem checkpoint path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsCheckpointParts {
    pub dir: PathBuf,
    pub action: String,
    pub source: String,
    pub extension: String,
}

/// Check a source name against the reserved character set
pub fn is_valid_source_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

pub fn make_db_checkpoint_name(live_db: &str, step: &PipelineStep) -> String {
    format!("{}{}{}", live_db, DB_CHECKPOINT_DELIMITER, step.name)
}

/// Reject a database name the server would silently truncate
pub fn check_db_identifier_len(name: &str) -> Result<(), CheckpointError> {
    if name.len() > MAX_DB_IDENTIFIER_LEN {
        return Err(CheckpointError::malformed(
            name,
            "longer than 63 bytes, PostgreSQL would truncate it",
        ));
    }
    Ok(())
}

/// Split a checkpoint database name into (live database, source name)
pub fn split_db_checkpoint_name(id: &str) -> Result<(&str, &str), CheckpointError> {
    let mut parts = id.split(DB_CHECKPOINT_DELIMITER);
    let (Some(db), Some(source)) = (parts.next(), parts.next()) else {
        return Err(CheckpointError::malformed(id, "missing ':' delimiter"));
    };
    if parts.next().is_some() {
        return Err(CheckpointError::malformed(id, "more than one ':' delimiter"));
    }
    if db.is_empty() {
        return Err(CheckpointError::malformed(id, "empty database segment"));
    }
    if source.is_empty() {
        return Err(CheckpointError::malformed(id, "empty source segment"));
    }
    Ok((db, source))
}

pub fn make_fs_checkpoint_filename(step: &PipelineStep) -> String {
    format!("{}_{}.{}", FS_CHECKPOINT_ACTION, step.name, FS_CHECKPOINT_EXTENSION)
}

pub fn make_fs_checkpoint_path(dir: &Path, step: &PipelineStep) -> PathBuf {
    dir.join(make_fs_checkpoint_filename(step))
}

/// Path a dump is written to before it is moved to `path`
pub fn make_fs_partial_path(path: &Path) -> PathBuf {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".");
    partial.push(FS_PARTIAL_SUFFIX);
    PathBuf::from(partial)
}

/// Split a checkpoint path into (dir, action, source, extension)
///
/// The filename is split on the first `_` into action and remainder, and the
/// remainder on `.` into source and extension.
pub fn split_fs_checkpoint_path(path: &Path) -> Result<FsCheckpointParts, CheckpointError> {
    let display = path.display().to_string();
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| CheckpointError::malformed(&display, "no UTF-8 filename"))?;

    let (action, remainder) = filename
        .split_once('_')
        .ok_or_else(|| CheckpointError::malformed(&display, "missing '_' after action"))?;

    let mut pieces = remainder.split('.');
    let (Some(source), Some(extension), None) = (pieces.next(), pieces.next(), pieces.next()) else {
        return Err(CheckpointError::malformed(&display, "expected exactly one '.' after source"));
    };
    if action.is_empty() || source.is_empty() || extension.is_empty() {
        return Err(CheckpointError::malformed(&display, "empty filename segment"));
    }

    Ok(FsCheckpointParts {
        dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
        action: action.to_string(),
        source: source.to_string(),
        extension: extension.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_make_db_checkpoint_name() {
        let step = PipelineStep::source("go-annotation");
        assert_eq!(make_db_checkpoint_name("biotestmine", &step), "biotestmine:go-annotation");
    }

    #[test]
    fn test_split_db_checkpoint_name() {
        assert_eq!(
            split_db_checkpoint_name("biotestmine:go-annotation").unwrap(),
            ("biotestmine", "go-annotation")
        );
    }

    #[test]
    fn test_split_db_checkpoint_name_rejects_malformed() {
        for bad in ["biotestmine", "biotestmine:", ":uniprot", "a:b:c", ""] {
            let err = split_db_checkpoint_name(bad).unwrap_err();
            assert!(
                matches!(err, CheckpointError::MalformedIdentifier { .. }),
                "{bad:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_identifier_length_limit() {
        let live = "biotestmine_release_2026_10_integration_build_humanmine";
        let name = make_db_checkpoint_name(live, &PipelineStep::source("go-annotation"));
        assert!(name.len() > MAX_DB_IDENTIFIER_LEN);
        assert!(matches!(
            check_db_identifier_len(&name).unwrap_err(),
            CheckpointError::MalformedIdentifier { .. }
        ));

        let exact = "a".repeat(MAX_DB_IDENTIFIER_LEN);
        assert!(check_db_identifier_len(&exact).is_ok());
    }

    #[test]
    fn test_partial_path_is_not_a_checkpoint_name() {
        let path = PathBuf::from("dumpdir/integrate_go-annotation.pgdump");
        let partial = make_fs_partial_path(&path);

        assert_eq!(partial, PathBuf::from("dumpdir/integrate_go-annotation.pgdump.partial"));
        assert!(split_fs_checkpoint_path(&partial).is_err());
    }

    #[test]
    fn test_make_fs_checkpoint_path() {
        let step = PipelineStep::source("go-annotation");
        assert_eq!(
            make_fs_checkpoint_path(Path::new("dumpdir"), &step),
            PathBuf::from("dumpdir/integrate_go-annotation.pgdump")
        );
    }

    #[test]
    fn test_split_fs_checkpoint_path() {
        let parts = split_fs_checkpoint_path(Path::new("dumpdir/integrate_go-annotation.pgdump")).unwrap();
        assert_eq!(
            parts,
            FsCheckpointParts {
                dir: PathBuf::from("dumpdir"),
                action: "integrate".to_string(),
                source: "go-annotation".to_string(),
                extension: "pgdump".to_string(),
            }
        );
    }

    #[test]
    fn test_split_fs_checkpoint_path_rejects_malformed() {
        for bad in [
            "dumpdir/integrate-go.pgdump",
            "dumpdir/integrate_.pgdump",
            "dumpdir/integrate_go",
            "dumpdir/integrate_go.tar.gz",
            "dumpdir/_go.pgdump",
        ] {
            assert!(split_fs_checkpoint_path(Path::new(bad)).is_err(), "{bad} should be malformed");
        }
    }

    #[test]
    fn test_source_name_validation() {
        assert!(is_valid_source_name("go-annotation"));
        assert!(is_valid_source_name("uniprot9606"));
        assert!(!is_valid_source_name(""));
        assert!(!is_valid_source_name("go_annotation"));
        assert!(!is_valid_source_name("go.annotation"));
        assert!(!is_valid_source_name("go:annotation"));
    }

    proptest! {
        #[test]
        fn test_db_name_round_trip(db in "[a-z][a-z0-9_-]{0,20}", source in "[A-Za-z0-9-]{1,24}") {
            let step = PipelineStep::source(source.clone());
            let name = make_db_checkpoint_name(&db, &step);
            let (db_back, source_back) = split_db_checkpoint_name(&name).unwrap();
            prop_assert_eq!(db_back, db.as_str());
            prop_assert_eq!(source_back, source.as_str());
        }

        #[test]
        fn test_fs_path_round_trip(dir in "[a-z]{1,8}(/[a-z_]{1,8}){0,2}", source in "[A-Za-z0-9-]{1,24}") {
            let step = PipelineStep::source(source.clone());
            let path = make_fs_checkpoint_path(Path::new(&dir), &step);
            let parts = split_fs_checkpoint_path(&path).unwrap();
            prop_assert_eq!(parts.dir, PathBuf::from(&dir));
            prop_assert_eq!(parts.action, FS_CHECKPOINT_ACTION);
            prop_assert_eq!(parts.source, source);
            prop_assert_eq!(parts.extension, FS_CHECKPOINT_EXTENSION);
        }
    }
}
