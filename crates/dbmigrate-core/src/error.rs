use std::path::PathBuf;

use thiserror::Error;

/// Core error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database failed to connect: {0}")]
    Connection(String),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Version ledger error: {0}")]
    Ledger(String),

    #[error("Migration {version} ({name}) failed: {source}")]
    Migration {
        version: i64,
        name: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
}

impl MigrateError {
    /// Version of the unit that failed, if this is a migration failure.
    pub fn failed_version(&self) -> Option<i64> {
        match self {
            MigrateError::Migration { version, .. } => Some(*version),
            _ => None,
        }
    }
}

/// Errors raised while reading the migration directory.
///
/// All of these abort the run before any database interaction.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Migration directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("Malformed migration filename {}: {reason}", path.display())]
    MalformedFilename { path: PathBuf, reason: String },

    #[error(
        "Duplicate migration version {version}: {} and {}",
        first.display(),
        second.display()
    )]
    DuplicateVersion {
        version: i64,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias using MigrateError.
pub type Result<T> = std::result::Result<T, MigrateError>;
