//! MineBuild configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::checkpoint::{
    DB_CHECKPOINT_DELIMITER, MAX_DB_IDENTIFIER_LEN, StorageTarget, check_db_identifier_len, make_db_checkpoint_name,
};
use crate::project::PipelineDefinition;

/// Main MineBuild configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Directory the build steps run in (contains the Gradle wrapper)
    #[serde(rename = "mine-dir")]
    pub mine_dir: PathBuf,

    /// Project file listing sources and postprocesses, relative to `mine-dir`
    pub project: PathBuf,

    /// Build step executor configuration
    pub gradle: GradleConfig,

    /// Where checkpoints are stored
    pub checkpoints: StorageTarget,

    /// Database connections per role
    pub databases: DatabasesConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: None,
            mine_dir: PathBuf::from("."),
            project: PathBuf::from("project.yml"),
            gradle: GradleConfig::default(),
            checkpoints: StorageTarget::default(),
            databases: DatabasesConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration before touching any database
    pub fn validate(&self) -> Result<()> {
        let production = &self.databases.production;
        if production.name.is_empty() {
            return Err(eyre::eyre!("databases.production.name is not set"));
        }
        if production.name.contains(DB_CHECKPOINT_DELIMITER) {
            return Err(eyre::eyre!(
                "databases.production.name '{}' must not contain '{}'",
                production.name,
                DB_CHECKPOINT_DELIMITER
            ));
        }
        if production.name.len() > MAX_DB_IDENTIFIER_LEN {
            return Err(eyre::eyre!(
                "databases.production.name '{}' is longer than {} bytes",
                production.name,
                MAX_DB_IDENTIFIER_LEN
            ));
        }
        if let StorageTarget::Filesystem { dir } = &self.checkpoints
            && dir.as_os_str().is_empty()
        {
            return Err(eyre::eyre!("checkpoints.dir must be set for filesystem checkpoints"));
        }
        Ok(())
    }

    /// Check that every checkpoint database name of `pipeline` fits in a PostgreSQL identifier
    ///
    /// Only database checkpoints are named after the live database; dump file
    /// names have no such limit.
    pub fn validate_checkpoint_names(&self, pipeline: &PipelineDefinition) -> Result<()> {
        if self.checkpoints != StorageTarget::Database {
            return Ok(());
        }
        let live_db = &self.databases.production.name;
        for step in pipeline.sources() {
            let name = make_db_checkpoint_name(live_db, step);
            check_db_identifier_len(&name).with_context(|| {
                format!(
                    "source '{}' cannot be checkpointed as a database, use a shorter production name or filesystem checkpoints",
                    step.name
                )
            })?;
        }
        Ok(())
    }

    /// Project file path, resolved against the mine directory
    pub fn project_path(&self) -> PathBuf {
        if self.project.is_absolute() {
            self.project.clone()
        } else {
            self.mine_dir.join(&self.project)
        }
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .minebuild.yml
        let local_config = PathBuf::from(".minebuild.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/minebuild/minebuild.yml
        if let Some(user_config) = Self::user_config_path()
            && user_config.exists()
        {
            match Self::load_from_file(&user_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    ///
    /// Errors are swallowed; the full load reports them once logging works.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates = match config_path {
            Some(path) => vec![path.clone()],
            None => [Some(PathBuf::from(".minebuild.yml")), Self::user_config_path()]
                .into_iter()
                .flatten()
                .collect(),
        };

        candidates
            .iter()
            .find(|p| p.exists())
            .and_then(|p| fs::read_to_string(p).ok())
            .and_then(|content| serde_yaml::from_str::<Config>(&content).ok())
            .and_then(|config| config.log_level)
    }

    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("minebuild").join("minebuild.yml"))
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Build step executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GradleConfig {
    /// Program to run, relative to the mine directory
    pub program: String,

    /// Arguments appended to every invocation
    #[serde(rename = "extra-args")]
    pub extra_args: Vec<String>,
}

impl Default for GradleConfig {
    fn default() -> Self {
        Self {
            program: "./gradlew".to_string(),
            extra_args: vec!["--stacktrace".to_string(), "--no-daemon".to_string()],
        }
    }
}

/// Database connections, one per role
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabasesConfig {
    /// The live working database the pipeline integrates into
    pub production: DbConfig,

    #[serde(rename = "common-tgt-items")]
    pub common_tgt_items: Option<DbConfig>,

    pub userprofile: Option<DbConfig>,

    /// Terminate other connections to these databases before each step
    #[serde(rename = "terminate-backends")]
    pub terminate_backends: bool,
}

impl Default for DatabasesConfig {
    fn default() -> Self {
        Self {
            production: DbConfig::default(),
            common_tgt_items: None,
            userprofile: None,
            terminate_backends: true,
        }
    }
}

impl DatabasesConfig {
    /// Every configured role, production first
    pub fn roles(&self) -> Vec<(&'static str, &DbConfig)> {
        let mut roles = vec![("production", &self.production)];
        if let Some(db) = &self.common_tgt_items {
            roles.push(("common-tgt-items", db));
        }
        if let Some(db) = &self.userprofile {
            roles.push(("userprofile", db));
        }
        roles
    }
}

/// Connection settings for one database
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DbConfig {
    /// Server as `host` or `host:port`
    pub server: String,

    /// Database name
    pub name: String,

    pub user: String,

    pub password: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            server: "localhost".to_string(),
            name: String::new(),
            user: "postgres".to_string(),
            password: String::new(),
        }
    }
}

impl DbConfig {
    pub fn host(&self) -> &str {
        self.server.split_once(':').map_or(self.server.as_str(), |(host, _)| host)
    }

    pub fn port(&self) -> Option<&str> {
        self.server.split_once(':').map(|(_, port)| port)
    }
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("server", &self.server)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"(hidden)")
            .finish()
    }
}
