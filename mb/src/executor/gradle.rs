//! Gradle-based step executor

use std::path::{Path, PathBuf};
use tracing::debug;

use super::{ExecutorError, StepExecutor};
use crate::command::{CommandRunner, Invocation};
use crate::config::GradleConfig;

/// Runs `<program> integrate -Psource=<name>` and `<program> postprocess -Pprocess=<name>`
/// inside the mine directory
pub struct GradleExecutor {
    mine_dir: PathBuf,
    config: GradleConfig,
    runner: CommandRunner,
}

impl GradleExecutor {
    pub fn new(mine_dir: impl AsRef<Path>, config: GradleConfig, runner: CommandRunner) -> Self {
        let mine_dir = mine_dir.as_ref().to_path_buf();
        debug!(?mine_dir, program = %config.program, "GradleExecutor::new: called");
        Self {
            mine_dir,
            config,
            runner,
        }
    }

    fn invocation(&self, task: &str, property: &str, name: &str) -> Invocation {
        Invocation::new(&self.config.program)
            .arg(task)
            .arg(format!("-P{}={}", property, name))
            .args(self.config.extra_args.iter().cloned())
            .current_dir(&self.mine_dir)
    }

    fn run(&self, task: &str, property: &str, name: &str) -> Result<(), ExecutorError> {
        let code = self.runner.status(&self.invocation(task, property, name))?;
        if code == Some(0) {
            return Ok(());
        }
        Err(ExecutorError::Failed {
            task: task.to_string(),
            step: name.to_string(),
            code,
        })
    }
}

impl StepExecutor for GradleExecutor {
    fn run_source_integration(&self, name: &str) -> Result<(), ExecutorError> {
        self.run("integrate", "source", name)
    }

    fn run_postprocess(&self, name: &str) -> Result<(), ExecutorError> {
        self.run("postprocess", "process", name)
    }
}
