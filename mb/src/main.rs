//! MineBuild - checkpointed, resumable data-integration pipeline runner
//!
//! CLI entry point for building a mine and managing its checkpoints.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use minebuild::cli::{CheckpointsCommand, Cli, Command};
use minebuild::config::Config;
use minebuild::{
    BuildOptions, CommandRunner, GradleExecutor, LocalCheckpointStore, LogObserver, PgAdmin, PipelineDefinition,
    PipelineDriver, clear_checkpoints, find_stray_checkpoints, list_checkpoints, peek_resume_position,
};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("minebuild")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("minebuild.log"))
        .context("Failed to open log file")?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(log_file)
                .with_ansi(false),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

/// External collaborators for one invocation
struct Backends {
    admin: PgAdmin,
    executor: GradleExecutor,
    store: LocalCheckpointStore,
}

impl Backends {
    fn new(config: &Config, dry_run: bool) -> Self {
        let runner = CommandRunner::new(dry_run);
        Self {
            admin: PgAdmin::from_config(&config.databases, runner),
            executor: GradleExecutor::new(&config.mine_dir, config.gradle.clone(), runner),
            store: LocalCheckpointStore::new(dry_run),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    let project_path = cli.project.clone().unwrap_or_else(|| config.project_path());
    let pipeline = PipelineDefinition::load(&project_path)
        .with_context(|| format!("Failed to load project {}", project_path.display()))?;

    debug!(command = ?cli.command, "main: dispatching command");
    if let Command::Steps = cli.command {
        return cmd_steps(&pipeline);
    }

    config.validate().context("Invalid configuration")?;
    config
        .validate_checkpoint_names(&pipeline)
        .context("Invalid configuration")?;
    let backends = Backends::new(&config, cli.dry_run);

    match cli.command {
        Command::Build { no_resume } => {
            debug!(no_resume, "main: matched Build command");
            cmd_build(&config, &pipeline, &backends, BuildOptions { no_resume })
        }
        Command::Checkpoints { command } => match command {
            CheckpointsCommand::List => {
                debug!("main: matched CheckpointsCommand::List");
                cmd_checkpoints_list(&config, &pipeline, &backends)
            }
            CheckpointsCommand::Clear => {
                debug!("main: matched CheckpointsCommand::Clear");
                cmd_checkpoints_clear(&config, &pipeline, &backends)
            }
        },
        Command::ResumePoint => {
            debug!("main: matched ResumePoint command");
            cmd_resume_point(&config, &pipeline, &backends)
        }
        Command::Steps => cmd_steps(&pipeline),
    }
}

/// Run the build
fn cmd_build(config: &Config, pipeline: &PipelineDefinition, backends: &Backends, options: BuildOptions) -> Result<()> {
    let live_db = config.databases.production.name.as_str();
    info!("Building {} with {} checkpoints", live_db, config.checkpoints);

    let driver = PipelineDriver::new(
        pipeline,
        live_db,
        &config.checkpoints,
        &backends.executor,
        &backends.admin,
        &backends.store,
        &LogObserver,
    );
    let summary = driver.run(options).context("Build failed")?;

    println!("{}", "Build complete".green().bold());
    if summary.resumed_at.is_start() {
        println!("  Started from the first source");
    } else {
        println!("  Resumed at source {}", summary.resumed_at);
    }
    println!("  Sources run:       {}", summary.sources_run.len());
    println!("  Postprocesses run: {}", summary.postprocesses_run.len());
    println!("  Checkpoints:       {}", summary.checkpoints_written);
    Ok(())
}

/// Print the pipeline steps in order
fn cmd_steps(pipeline: &PipelineDefinition) -> Result<()> {
    println!("{}", "Sources:".bold());
    for (index, step) in pipeline.sources().iter().enumerate() {
        let marker = if step.checkpoint { "*".cyan().to_string() } else { " ".to_string() };
        match &step.source_type {
            Some(source_type) => println!("  {:>3} {} {} ({})", index, marker, step.name, source_type.dimmed()),
            None => println!("  {:>3} {} {}", index, marker, step.name),
        }
    }

    println!("{}", "Postprocesses:".bold());
    for (index, step) in pipeline.postprocesses().iter().enumerate() {
        println!("  {:>3}   {}", index, step.name);
    }
    Ok(())
}

/// Show where a build would resume
fn cmd_resume_point(config: &Config, pipeline: &PipelineDefinition, backends: &Backends) -> Result<()> {
    let live_db = config.databases.production.name.as_str();
    let (position, location) =
        peek_resume_position(&config.checkpoints, pipeline, live_db, &backends.admin, &backends.store)
            .context("Failed to find resume point")?;

    match location {
        None => println!("No checkpoint found, a build starts at the first source"),
        Some(location) => {
            println!("Latest checkpoint: {}", location.to_string().green());
            match position.next_step(pipeline) {
                Some(step) => println!("A build resumes at source {} ({})", position, step.name.bold()),
                None => println!("Every source is covered, a build runs only the postprocesses"),
            }
        }
    }
    Ok(())
}

/// Show which sources have a checkpoint
fn cmd_checkpoints_list(config: &Config, pipeline: &PipelineDefinition, backends: &Backends) -> Result<()> {
    let live_db = config.databases.production.name.as_str();
    let statuses = list_checkpoints(&config.checkpoints, pipeline, live_db, &backends.admin, &backends.store)
        .context("Failed to list checkpoints")?;

    println!("Checkpoints ({}):", config.checkpoints);
    for status in &statuses {
        let mark = if status.present {
            "present".green().to_string()
        } else {
            "-".dimmed().to_string()
        };
        println!("  {:>3} {:<30} {}", status.index, status.source, mark);
    }

    let stray = find_stray_checkpoints(&config.checkpoints, pipeline, live_db, &backends.admin, &backends.store)
        .context("Failed to look for stray checkpoints")?;
    if !stray.is_empty() {
        println!("{}", "Not in the pipeline:".yellow());
        for location in stray {
            println!("  {}", location);
        }
    }
    Ok(())
}

/// Delete every checkpoint of the pipeline
fn cmd_checkpoints_clear(config: &Config, pipeline: &PipelineDefinition, backends: &Backends) -> Result<()> {
    let live_db = config.databases.production.name.as_str();
    let removed = clear_checkpoints(
        &config.checkpoints,
        pipeline,
        live_db,
        &backends.admin,
        &backends.store,
        &LogObserver,
    )
    .context("Failed to clear checkpoints")?;

    println!("Removed {} checkpoint(s)", removed);
    Ok(())
}
