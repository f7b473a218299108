//! PostgreSQL administration through psql, createdb, dropdb, pg_dump and pg_restore

use std::path::Path;
use tracing::{debug, info};

use super::{AdminError, DatabaseAdmin};
use crate::command::{CommandOutput, CommandRunner, Invocation};
use crate::config::{DatabasesConfig, DbConfig};

/// Database admin that shells out to the PostgreSQL client tools
///
/// Every tool connects with the production role's server and user; the
/// password is passed through `PGPASSWORD`.
pub struct PgAdmin {
    connection: DbConfig,
    others: Vec<DbConfig>,
    terminate_backends: bool,
    runner: CommandRunner,
}

impl PgAdmin {
    pub fn new(connection: DbConfig, runner: CommandRunner) -> Self {
        debug!(?connection, "PgAdmin::new: called");
        Self {
            connection,
            others: Vec::new(),
            terminate_backends: true,
            runner,
        }
    }

    /// Build from the configured roles; backends are terminated on all of them
    pub fn from_config(databases: &DatabasesConfig, runner: CommandRunner) -> Self {
        let others = databases
            .roles()
            .into_iter()
            .skip(1)
            .map(|(_, db)| db.clone())
            .collect();
        Self {
            connection: databases.production.clone(),
            others,
            terminate_backends: databases.terminate_backends,
            runner,
        }
    }

    fn invocation(&self, server: &DbConfig, program: &str) -> Invocation {
        let mut inv = Invocation::new(program).args(["-h", server.host()]);
        if let Some(port) = server.port() {
            inv = inv.args(["-p", port]);
        }
        inv = inv.args(["-U", server.user.as_str()]);
        if !server.password.is_empty() {
            inv = inv.env("PGPASSWORD", server.password.as_str());
        }
        inv
    }

    fn run_checked(&self, operation: &'static str, database: &str, inv: Invocation) -> Result<CommandOutput, AdminError> {
        let output = self.runner.output(&inv)?;
        if output.success() {
            return Ok(output);
        }
        let message = output.stderr.trim().to_string();
        debug!(operation, %database, %message, "PgAdmin::run_checked: failed");
        if is_connection_failure(&message) {
            return Err(AdminError::Unreachable(message));
        }
        Err(AdminError::Failed {
            operation,
            database: database.to_string(),
            message,
        })
    }
}

impl DatabaseAdmin for PgAdmin {
    fn exists(&self, db: &str) -> Result<bool, AdminError> {
        debug!(%db, "PgAdmin::exists: called");
        Ok(self.list_databases()?.iter().any(|name| name == db))
    }

    fn list_databases(&self) -> Result<Vec<String>, AdminError> {
        let inv = self.invocation(&self.connection, "psql").arg("-lqt");
        let output = self.run_checked("list databases", &self.connection.name, inv)?;
        Ok(parse_database_list(&output.stdout))
    }

    fn drop_if_exists(&self, db: &str) -> Result<(), AdminError> {
        debug!(%db, "PgAdmin::drop_if_exists: called");
        let inv = self.invocation(&self.connection, "dropdb").args(["--if-exists", db]);
        self.run_checked("dropdb", db, inv)?;
        Ok(())
    }

    fn copy(&self, src: &str, dst: &str) -> Result<(), AdminError> {
        info!("Copying database {} to {}", src, dst);
        let inv = self.invocation(&self.connection, "createdb").args(["-T", src, dst]);
        self.run_checked("createdb", dst, inv)?;
        Ok(())
    }

    fn wipe(&self, db: &str) -> Result<(), AdminError> {
        info!("Wiping database {}", db);
        self.drop_if_exists(db)?;
        let inv = self.invocation(&self.connection, "createdb").arg(db);
        self.run_checked("createdb", db, inv)?;
        Ok(())
    }

    fn restore_dump(&self, db: &str, path: &Path) -> Result<(), AdminError> {
        info!("Restoring {} into {}", path.display(), db);
        let inv = self
            .invocation(&self.connection, "pg_restore")
            .args(["-d", db])
            .arg(path.to_string_lossy());
        self.run_checked("pg_restore", db, inv)?;
        Ok(())
    }

    fn dump_to(&self, db: &str, path: &Path) -> Result<(), AdminError> {
        info!("Dumping {} to {}", db, path.display());
        let inv = self
            .invocation(&self.connection, "pg_dump")
            .args(["-Fc", "-f"])
            .arg(path.to_string_lossy())
            .arg(db);
        self.run_checked("pg_dump", db, inv)?;
        Ok(())
    }

    fn terminate_backends(&self) -> Result<(), AdminError> {
        if !self.terminate_backends {
            debug!("PgAdmin::terminate_backends: disabled");
            return Ok(());
        }
        for server in std::iter::once(&self.connection).chain(self.others.iter()) {
            debug!(db = %server.name, "PgAdmin::terminate_backends: terminating");
            let inv = self
                .invocation(server, "psql")
                .args(["-d", "postgres", "-q", "-c"])
                .arg(terminate_backends_sql(&server.name));
            self.run_checked("terminate backends", &server.name, inv)?;
        }
        Ok(())
    }
}

/// Database names from `psql -lqt` output (first column of each row)
pub fn parse_database_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split('|').next())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// SQL that disconnects every other session on `db`
pub fn terminate_backends_sql(db: &str) -> String {
    format!(
        "SELECT pg_terminate_backend(pid) FROM pg_stat_activity WHERE datname = '{}' AND pid <> pg_backend_pid();",
        db.replace('\'', "''")
    )
}

fn is_connection_failure(stderr: &str) -> bool {
    const MARKERS: [&str; 4] = [
        "could not connect",
        "Connection refused",
        "could not translate host name",
        "connection to server",
    ];
    MARKERS.iter().any(|m| stderr.contains(m))
}
