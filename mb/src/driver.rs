//! Sequential pipeline driver
//!
//! Runs source steps from the resume position, checkpointing the live database
//! after each flagged source, then runs every postprocess step. One step runs
//! at a time and the first failure ends the build; recovery is a re-run, which
//! resumes after the latest checkpoint.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::checkpoint::{
    CheckpointError, CheckpointLocation, ResumePosition, StorageTarget, check_db_identifier_len, clear_checkpoints,
    make_fs_partial_path, restore,
};
use crate::db::DatabaseAdmin;
use crate::executor::StepExecutor;
use crate::observer::{RunEvent, RunObserver};
use crate::project::{PipelineDefinition, PipelineStep, StepKind};
use crate::store::CheckpointStore;

/// Options for a full build
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Delete existing checkpoints and build every source from scratch
    pub no_resume: bool,
}

/// What a build did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub resumed_at: ResumePosition,
    pub sources_run: Vec<String>,
    pub postprocesses_run: Vec<String>,
    pub checkpoints_written: usize,
}

/// Drives one build against a live database
pub struct PipelineDriver<'a> {
    pipeline: &'a PipelineDefinition,
    live_db: &'a str,
    target: &'a StorageTarget,
    executor: &'a dyn StepExecutor,
    admin: &'a dyn DatabaseAdmin,
    store: &'a dyn CheckpointStore,
    observer: &'a dyn RunObserver,
}

impl<'a> PipelineDriver<'a> {
    pub fn new(
        pipeline: &'a PipelineDefinition,
        live_db: &'a str,
        target: &'a StorageTarget,
        executor: &'a dyn StepExecutor,
        admin: &'a dyn DatabaseAdmin,
        store: &'a dyn CheckpointStore,
        observer: &'a dyn RunObserver,
    ) -> Self {
        Self {
            pipeline,
            live_db,
            target,
            executor,
            admin,
            store,
            observer,
        }
    }

    /// Full build: restore, then every remaining source, then every postprocess
    pub fn run(&self, options: BuildOptions) -> Result<BuildSummary, CheckpointError> {
        debug!(?options, live_db = %self.live_db, target = %self.target, "PipelineDriver::run: called");

        if options.no_resume {
            info!("Building from scratch, clearing existing checkpoints");
            clear_checkpoints(
                self.target,
                self.pipeline,
                self.live_db,
                self.admin,
                self.store,
                self.observer,
            )?;
        }

        let resumed_at = restore(
            self.target,
            self.pipeline,
            self.live_db,
            self.admin,
            self.store,
            self.observer,
        )?;
        if resumed_at.is_complete(self.pipeline) {
            info!("Every source is covered by the latest checkpoint");
        }

        let sources_run = self.run_sources_from(resumed_at)?;
        let postprocesses_run = self.run_postprocess_from(0)?;

        let checkpoints_written = sources_run
            .iter()
            .filter(|name| self.pipeline.source(name).is_some_and(|s| s.checkpoint))
            .count();

        self.observer.notify(&RunEvent::BuildCompleted {
            sources_run: sources_run.len(),
            postprocesses_run: postprocesses_run.len(),
        });

        Ok(BuildSummary {
            resumed_at,
            sources_run,
            postprocesses_run,
            checkpoints_written,
        })
    }

    /// Run every source at or after `resume`, checkpointing flagged ones
    ///
    /// Returns the names of the sources run, in order.
    pub fn run_sources_from(&self, resume: ResumePosition) -> Result<Vec<String>, CheckpointError> {
        debug!(%resume, "PipelineDriver::run_sources_from: called");
        let sources = self.pipeline.sources();
        let mut ran = Vec::new();

        for (index, step) in sources.iter().enumerate().skip(resume.index()) {
            self.run_step(step, index, sources.len())?;
            if step.checkpoint {
                self.write_checkpoint(step)?;
            }
            ran.push(step.name.clone());
        }
        Ok(ran)
    }

    /// Run every postprocess at or after `start`
    pub fn run_postprocess_from(&self, start: usize) -> Result<Vec<String>, CheckpointError> {
        debug!(start, "PipelineDriver::run_postprocess_from: called");
        let postprocesses = self.pipeline.postprocesses();
        let mut ran = Vec::new();

        for (index, step) in postprocesses.iter().enumerate().skip(start) {
            self.run_step(step, index, postprocesses.len())?;
            ran.push(step.name.clone());
        }
        Ok(ran)
    }

    /// Snapshot the live database as the checkpoint for `step`
    ///
    /// Dumps are written next to their final path with a `.partial` suffix
    /// and renamed into place only once `pg_dump` succeeds, so discovery never
    /// sees a truncated dump.
    pub fn write_checkpoint(&self, step: &PipelineStep) -> Result<CheckpointLocation, CheckpointError> {
        debug!(step = %step.name, "PipelineDriver::write_checkpoint: called");
        let location = self.target.locate(self.live_db, step);

        match &location {
            CheckpointLocation::Database(name) => {
                check_db_identifier_len(name)?;
                // createdb -T needs the template free of other sessions
                self.admin.terminate_backends()?;
                self.admin.drop_if_exists(name)?;
                self.admin.copy(self.live_db, name)?;
            }
            CheckpointLocation::File(path) => {
                if let Some(dir) = path.parent() {
                    self.store.ensure_dir(dir)?;
                }
                let partial = make_fs_partial_path(path);
                if let Err(e) = self.admin.dump_to(self.live_db, &partial) {
                    self.discard_partial(&partial);
                    return Err(e.into());
                }
                self.store.rename(&partial, path)?;
            }
        }

        self.observer.notify(&RunEvent::CheckpointWritten {
            source: step.name.clone(),
            location: location.clone(),
        });
        Ok(location)
    }

    fn discard_partial(&self, partial: &Path) {
        debug!(?partial, "PipelineDriver::discard_partial: called");
        let removed = match self.store.exists(partial) {
            Ok(true) => self.store.delete(partial),
            Ok(false) => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(e) = removed {
            warn!("Could not remove partial dump {}: {}", partial.display(), e);
        }
    }

    fn run_step(&self, step: &PipelineStep, index: usize, total: usize) -> Result<(), CheckpointError> {
        self.observer.notify(&RunEvent::StepStarted {
            kind: step.kind,
            name: step.name.clone(),
            index,
            total,
        });

        self.admin.terminate_backends()?;
        let result = match step.kind {
            StepKind::Source => self.executor.run_source_integration(&step.name),
            StepKind::Postprocess => self.executor.run_postprocess(&step.name),
        };

        if let Err(e) = result {
            self.observer.notify(&RunEvent::StepFailed {
                kind: step.kind,
                name: step.name.clone(),
                message: e.to_string(),
            });
            return Err(CheckpointError::StepExecutionFailure {
                kind: step.kind,
                step: step.name.clone(),
                source: e,
            });
        }

        self.observer.notify(&RunEvent::StepCompleted {
            kind: step.kind,
            name: step.name.clone(),
        });
        Ok(())
    }
}
