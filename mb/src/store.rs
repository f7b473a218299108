//! Filesystem checkpoint store

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::checkpoint::{FS_CHECKPOINT_ACTION, FS_CHECKPOINT_EXTENSION};

/// Errors accessing checkpoint files
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Storage for checkpoint dump files
pub trait CheckpointStore {
    /// Check whether a checkpoint file is present
    fn exists(&self, path: &Path) -> Result<bool, StoreError>;

    /// Remove a checkpoint file
    fn delete(&self, path: &Path) -> Result<(), StoreError>;

    /// Move a finished dump into place, replacing any file at `to`
    fn rename(&self, from: &Path, to: &Path) -> Result<(), StoreError>;

    /// Make sure the checkpoint directory exists before a dump is written into it
    fn ensure_dir(&self, dir: &Path) -> Result<(), StoreError>;

    /// Every checkpoint-shaped file in `dir`, sorted by name
    fn list_checkpoint_files(&self, dir: &Path) -> Result<Vec<PathBuf>, StoreError>;
}

/// Checkpoint store on the local filesystem
///
/// In dry-run mode nothing is written or removed, and no checkpoint is
/// reported as present, so a dry run always plans a build from the first source.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalCheckpointStore {
    dry_run: bool,
}

impl LocalCheckpointStore {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }
}

impl CheckpointStore for LocalCheckpointStore {
    fn exists(&self, path: &Path) -> Result<bool, StoreError> {
        if self.dry_run {
            debug!(?path, "LocalCheckpointStore::exists: dry-run, reporting absent");
            return Ok(false);
        }
        match fs::metadata(path) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    fn delete(&self, path: &Path) -> Result<(), StoreError> {
        if self.dry_run {
            info!("[dry-run] rm {}", path.display());
            return Ok(());
        }
        debug!(?path, "LocalCheckpointStore::delete: called");
        fs::remove_file(path).map_err(|e| StoreError::io(path, e))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), StoreError> {
        if self.dry_run {
            info!("[dry-run] mv {} {}", from.display(), to.display());
            return Ok(());
        }
        debug!(?from, ?to, "LocalCheckpointStore::rename: called");
        fs::rename(from, to).map_err(|e| StoreError::io(to, e))
    }

    fn ensure_dir(&self, dir: &Path) -> Result<(), StoreError> {
        if self.dry_run {
            return Ok(());
        }
        fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))
    }

    fn list_checkpoint_files(&self, dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(dir, e)),
        };

        let prefix = format!("{}_", FS_CHECKPOINT_ACTION);
        let suffix = format!(".{}", FS_CHECKPOINT_EXTENSION);
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(dir, e))?;
            let path = entry.path();
            let file_name = entry.file_name();
            if path.is_file()
                && let Some(name) = file_name.to_str()
                && name.starts_with(&prefix)
                && name.ends_with(&suffix)
            {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_exists_and_delete() {
        let temp = TempDir::new().unwrap();
        let store = LocalCheckpointStore::default();
        let path = temp.path().join("integrate_uniprot.pgdump");

        assert!(!store.exists(&path).unwrap());
        fs::write(&path, b"dump").unwrap();
        assert!(store.exists(&path).unwrap());

        store.delete(&path).unwrap();
        assert!(!store.exists(&path).unwrap());
    }

    #[test]
    fn test_directory_is_not_a_checkpoint() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("integrate_uniprot.pgdump");
        fs::create_dir(&path).unwrap();

        assert!(!LocalCheckpointStore::default().exists(&path).unwrap());
    }

    #[test]
    fn test_delete_missing_is_error() {
        let temp = TempDir::new().unwrap();
        let err = LocalCheckpointStore::default()
            .delete(&temp.path().join("integrate_x.pgdump"))
            .unwrap_err();
        assert!(err.to_string().contains("integrate_x.pgdump"));
    }

    #[test]
    fn test_dry_run_delete_keeps_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("integrate_uniprot.pgdump");
        fs::write(&path, b"dump").unwrap();

        LocalCheckpointStore::new(true).delete(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_dry_run_reports_nothing_present() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("integrate_uniprot.pgdump");
        fs::write(&path, b"dump").unwrap();

        assert!(!LocalCheckpointStore::new(true).exists(&path).unwrap());
        assert!(LocalCheckpointStore::new(false).exists(&path).unwrap());
    }

    #[test]
    fn test_rename_replaces_existing() {
        let temp = TempDir::new().unwrap();
        let partial = temp.path().join("integrate_uniprot.pgdump.partial");
        let path = temp.path().join("integrate_uniprot.pgdump");
        fs::write(&path, b"old").unwrap();
        fs::write(&partial, b"new").unwrap();

        LocalCheckpointStore::default().rename(&partial, &path).unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"new");
        assert!(!partial.exists());
    }

    #[test]
    fn test_list_checkpoint_files() {
        let temp = TempDir::new().unwrap();
        for name in [
            "integrate_b.pgdump",
            "integrate_a.pgdump",
            "notes.txt",
            "integrate_c.sql",
            "integrate_d.pgdump.partial",
        ] {
            fs::write(temp.path().join(name), b"x").unwrap();
        }

        let files = LocalCheckpointStore::default().list_checkpoint_files(temp.path()).unwrap();
        assert_eq!(
            files,
            vec![
                temp.path().join("integrate_a.pgdump"),
                temp.path().join("integrate_b.pgdump")
            ]
        );
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let temp = TempDir::new().unwrap();
        let files = LocalCheckpointStore::default()
            .list_checkpoint_files(&temp.path().join("absent"))
            .unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_ensure_dir_creates_nested() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("dumps").join("biotestmine");
        LocalCheckpointStore::default().ensure_dir(&dir).unwrap();
        assert!(dir.is_dir());
    }
}
