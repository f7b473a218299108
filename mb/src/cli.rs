//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// MineBuild - checkpointed, resumable data-integration builds
#[derive(Parser)]
#[command(
    name = "mb",
    about = "Run a data-integration pipeline, resuming from the latest checkpoint",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Log external commands instead of running them
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Project file, overriding the configured one
    #[arg(short, long, global = true, value_name = "FILE")]
    pub project: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build the pipeline, resuming after the latest checkpoint
    Build {
        /// Delete existing checkpoints and start from the first source
        #[arg(long)]
        no_resume: bool,
    },

    /// Inspect or remove checkpoints
    Checkpoints {
        #[command(subcommand)]
        command: CheckpointsCommand,
    },

    /// Show where a build would resume, without restoring anything
    ResumePoint,

    /// List the pipeline steps in order
    Steps,
}

/// Checkpoint subcommands
#[derive(Debug, Subcommand)]
pub enum CheckpointsCommand {
    /// Show which sources have a checkpoint
    List,

    /// Delete every checkpoint of the pipeline
    Clear,
}
