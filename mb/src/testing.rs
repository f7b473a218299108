//! In-memory collaborators for exercising the pipeline without PostgreSQL or Gradle
//!
//! [`FakeAdmin`] keeps a set of database names and a set of dump files;
//! [`FakeAdmin::checkpoint_store`] hands out a [`FakeStore`] over the same
//! files, so dumps written by the driver are visible to discovery and dumps
//! seeded with [`FakeAdmin::with_files`] can be restored.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::checkpoint::{FS_CHECKPOINT_ACTION, FS_CHECKPOINT_EXTENSION};
use crate::db::{AdminError, DatabaseAdmin};
use crate::executor::{ExecutorError, StepExecutor};
use crate::observer::{RunEvent, RunObserver};
use crate::project::StepKind;
use crate::store::{CheckpointStore, StoreError};

type SharedFiles = Rc<RefCell<BTreeSet<PathBuf>>>;

/// A call made against [`FakeAdmin`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCall {
    Exists(String),
    ListDatabases,
    DropIfExists(String),
    Copy(String, String),
    Wipe(String),
    RestoreDump(String, PathBuf),
    DumpTo(String, PathBuf),
    TerminateBackends,
}

/// Database admin backed by a set of database names
#[derive(Debug, Default)]
pub struct FakeAdmin {
    databases: RefCell<BTreeSet<String>>,
    files: SharedFiles,
    calls: RefCell<Vec<AdminCall>>,
    failing: Option<AdminCall>,
    unreachable: bool,
}

impl FakeAdmin {
    pub fn with_databases<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            databases: RefCell::new(names.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    /// Seed dump files, visible through [`FakeAdmin::checkpoint_store`]
    pub fn with_files<I>(self, paths: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        self.files.borrow_mut().extend(paths);
        self
    }

    /// Every call fails as if the server were down
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Default::default()
        }
    }

    /// Fail exactly when `call` is made
    pub fn failing_on(mut self, call: AdminCall) -> Self {
        self.failing = Some(call);
        self
    }

    /// A checkpoint store sharing this admin's dump files
    pub fn checkpoint_store(&self) -> FakeStore {
        FakeStore {
            files: Rc::clone(&self.files),
            deleted: RefCell::default(),
        }
    }

    pub fn calls(&self) -> Vec<AdminCall> {
        self.calls.borrow().clone()
    }

    /// Calls other than lookups and backend termination
    pub fn mutations(&self) -> Vec<AdminCall> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| {
                !matches!(
                    c,
                    AdminCall::Exists(_) | AdminCall::ListDatabases | AdminCall::TerminateBackends
                )
            })
            .cloned()
            .collect()
    }

    pub fn databases(&self) -> Vec<String> {
        self.databases.borrow().iter().cloned().collect()
    }

    pub fn has_database(&self, name: &str) -> bool {
        self.databases.borrow().contains(name)
    }

    pub fn has_file(&self, path: &Path) -> bool {
        self.files.borrow().contains(path)
    }

    fn record(&self, call: AdminCall) -> Result<(), AdminError> {
        self.calls.borrow_mut().push(call.clone());
        if self.unreachable {
            return Err(AdminError::Unreachable("connection refused".to_string()));
        }
        if self.failing.as_ref() == Some(&call) {
            return Err(AdminError::Failed {
                operation: "fake",
                database: format!("{:?}", call),
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn missing(operation: &'static str, database: &str) -> AdminError {
        AdminError::Failed {
            operation,
            database: database.to_string(),
            message: "does not exist".to_string(),
        }
    }
}

impl DatabaseAdmin for FakeAdmin {
    fn exists(&self, db: &str) -> Result<bool, AdminError> {
        self.record(AdminCall::Exists(db.to_string()))?;
        Ok(self.has_database(db))
    }

    fn list_databases(&self) -> Result<Vec<String>, AdminError> {
        self.record(AdminCall::ListDatabases)?;
        Ok(self.databases())
    }

    fn drop_if_exists(&self, db: &str) -> Result<(), AdminError> {
        self.record(AdminCall::DropIfExists(db.to_string()))?;
        self.databases.borrow_mut().remove(db);
        Ok(())
    }

    fn copy(&self, src: &str, dst: &str) -> Result<(), AdminError> {
        self.record(AdminCall::Copy(src.to_string(), dst.to_string()))?;
        if !self.has_database(src) {
            return Err(Self::missing("copy", src));
        }
        if !self.databases.borrow_mut().insert(dst.to_string()) {
            return Err(AdminError::Failed {
                operation: "copy",
                database: dst.to_string(),
                message: "already exists".to_string(),
            });
        }
        Ok(())
    }

    fn wipe(&self, db: &str) -> Result<(), AdminError> {
        self.record(AdminCall::Wipe(db.to_string()))?;
        self.databases.borrow_mut().insert(db.to_string());
        Ok(())
    }

    fn restore_dump(&self, db: &str, path: &Path) -> Result<(), AdminError> {
        self.record(AdminCall::RestoreDump(db.to_string(), path.to_path_buf()))?;
        if !self.has_file(path) {
            return Err(Self::missing("restore", &path.display().to_string()));
        }
        Ok(())
    }

    fn dump_to(&self, db: &str, path: &Path) -> Result<(), AdminError> {
        self.record(AdminCall::DumpTo(db.to_string(), path.to_path_buf()))?;
        if !self.has_database(db) {
            return Err(Self::missing("dump", db));
        }
        self.files.borrow_mut().insert(path.to_path_buf());
        Ok(())
    }

    fn terminate_backends(&self) -> Result<(), AdminError> {
        self.record(AdminCall::TerminateBackends)
    }
}

/// Checkpoint store backed by a set of paths
#[derive(Debug, Default)]
pub struct FakeStore {
    files: SharedFiles,
    deleted: RefCell<Vec<PathBuf>>,
}

impl FakeStore {
    pub fn with_files<I>(paths: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        Self {
            files: Rc::new(RefCell::new(paths.into_iter().collect())),
            deleted: RefCell::default(),
        }
    }

    pub fn deleted(&self) -> Vec<PathBuf> {
        self.deleted.borrow().clone()
    }

    pub fn files(&self) -> Vec<PathBuf> {
        self.files.borrow().iter().cloned().collect()
    }
}

impl CheckpointStore for FakeStore {
    fn exists(&self, path: &Path) -> Result<bool, StoreError> {
        Ok(self.files.borrow().contains(path))
    }

    fn delete(&self, path: &Path) -> Result<(), StoreError> {
        self.files.borrow_mut().remove(path);
        self.deleted.borrow_mut().push(path.to_path_buf());
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), StoreError> {
        let mut files = self.files.borrow_mut();
        if !files.remove(from) {
            return Err(StoreError::Io {
                path: from.to_path_buf(),
                source: io::Error::from(io::ErrorKind::NotFound),
            });
        }
        files.insert(to.to_path_buf());
        Ok(())
    }

    fn ensure_dir(&self, _dir: &Path) -> Result<(), StoreError> {
        Ok(())
    }

    fn list_checkpoint_files(&self, dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
        let prefix = format!("{}_", FS_CHECKPOINT_ACTION);
        let suffix = format!(".{}", FS_CHECKPOINT_EXTENSION);
        Ok(self
            .files
            .borrow()
            .iter()
            .filter(|p| p.parent() == Some(dir))
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(&suffix))
            })
            .cloned()
            .collect())
    }
}

/// Step executor that records what it ran and can fail on one step
#[derive(Debug, Default)]
pub struct FakeExecutor {
    runs: RefCell<Vec<(StepKind, String)>>,
    failing: Option<(StepKind, String)>,
}

impl FakeExecutor {
    pub fn failing_on(kind: StepKind, name: impl Into<String>) -> Self {
        Self {
            failing: Some((kind, name.into())),
            ..Default::default()
        }
    }

    /// Every step run so far, in order
    pub fn runs(&self) -> Vec<(StepKind, String)> {
        self.runs.borrow().clone()
    }

    /// Names of the steps of one kind run so far
    pub fn names(&self, kind: StepKind) -> Vec<String> {
        self.runs
            .borrow()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, n)| n.clone())
            .collect()
    }

    fn run(&self, kind: StepKind, name: &str) -> Result<(), ExecutorError> {
        self.runs.borrow_mut().push((kind, name.to_string()));
        match &self.failing {
            Some((k, n)) if *k == kind && n == name => Err(ExecutorError::Failed {
                task: match kind {
                    StepKind::Source => "integrate".to_string(),
                    StepKind::Postprocess => "postprocess".to_string(),
                },
                step: name.to_string(),
                code: Some(1),
            }),
            _ => Ok(()),
        }
    }
}

impl StepExecutor for FakeExecutor {
    fn run_source_integration(&self, name: &str) -> Result<(), ExecutorError> {
        self.run(StepKind::Source, name)
    }

    fn run_postprocess(&self, name: &str) -> Result<(), ExecutorError> {
        self.run(StepKind::Postprocess, name)
    }
}

/// Observer that keeps every event
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: RefCell<Vec<RunEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<RunEvent> {
        self.events.borrow().clone()
    }

    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.borrow().iter().map(RunEvent::event_type).collect()
    }
}

impl RunObserver for RecordingObserver {
    fn notify(&self, event: &RunEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}
