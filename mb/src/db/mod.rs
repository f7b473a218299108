//! Database administration
//!
//! The checkpoint core only needs a handful of whole-database operations;
//! [`PgAdmin`] provides them through the PostgreSQL client tools.

mod postgres;

use std::path::Path;
use thiserror::Error;

use crate::command::CommandError;

pub use postgres::{PgAdmin, parse_database_list, terminate_backends_sql};

/// Errors that can occur during database administration
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("Database server unreachable: {0}")]
    Unreachable(String),

    #[error("{operation} failed for {database}: {message}")]
    Failed {
        operation: &'static str,
        database: String,
        message: String,
    },

    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Whole-database operations against the server holding the live database
pub trait DatabaseAdmin {
    /// Check whether a database with this exact name exists
    fn exists(&self, db: &str) -> Result<bool, AdminError>;

    /// Names of every database on the server
    fn list_databases(&self) -> Result<Vec<String>, AdminError>;

    /// Drop a database, doing nothing if it is absent
    fn drop_if_exists(&self, db: &str) -> Result<(), AdminError>;

    /// Create `dst` as a copy of `src`; `dst` must not exist
    fn copy(&self, src: &str, dst: &str) -> Result<(), AdminError>;

    /// Reset a database to an empty baseline, creating it if needed
    fn wipe(&self, db: &str) -> Result<(), AdminError>;

    /// Load a dump file into an (empty) database
    fn restore_dump(&self, db: &str, path: &Path) -> Result<(), AdminError>;

    /// Write a dump of a database to a file
    fn dump_to(&self, db: &str, path: &Path) -> Result<(), AdminError>;

    /// Close other connections left open on the configured databases
    fn terminate_backends(&self) -> Result<(), AdminError>;
}
