//! Build step execution
//!
//! Each pipeline step is one blocking external build invocation. The result
//! is pass/fail only.

mod gradle;

use thiserror::Error;

use crate::command::CommandError;

pub use gradle::GradleExecutor;

/// Errors that can occur while running a build step
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("{task} for '{step}' {}", describe_exit(.code))]
    Failed { task: String, step: String, code: Option<i32> },

    #[error(transparent)]
    Command(#[from] CommandError),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with code {}", code),
        None => "was killed by a signal".to_string(),
    }
}

/// Runs individual pipeline steps
pub trait StepExecutor {
    /// Integrate one source into the live database
    fn run_source_integration(&self, name: &str) -> Result<(), ExecutorError>;

    /// Run one postprocess against the live database
    fn run_postprocess(&self, name: &str) -> Result<(), ExecutorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_message() {
        let err = ExecutorError::Failed {
            task: "integrate".to_string(),
            step: "uniprot".to_string(),
            code: Some(1),
        };
        assert_eq!(err.to_string(), "integrate for 'uniprot' exited with code 1");

        let err = ExecutorError::Failed {
            task: "postprocess".to_string(),
            step: "do-sources".to_string(),
            code: None,
        };
        assert_eq!(err.to_string(), "postprocess for 'do-sources' was killed by a signal");
    }
}
