use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MigrateError;

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    #[serde(alias = "postgresql", alias = "pg")]
    Postgres,
    #[serde(alias = "sqlite3")]
    Sqlite,
}

impl Driver {
    pub fn as_str(&self) -> &'static str {
        match self {
            Driver::Postgres => "postgres",
            Driver::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Driver {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Driver::Postgres),
            "sqlite" | "sqlite3" => Ok(Driver::Sqlite),
            other => Err(MigrateError::Config(format!(
                "Unsupported database driver '{}' (expected postgres or sqlite)",
                other
            ))),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Backend to connect to.
    pub driver: Driver,

    /// Full connection URL. Takes precedence over the discrete fields below.
    #[serde(default)]
    pub url: Option<String>,

    /// Server host (postgres only).
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port (postgres only).
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Database name. For sqlite this is the file name, resolved against
    /// `<datadir>/database` unless absolute.
    #[serde(default = "default_database")]
    pub database: String,

    /// Postgres SSL mode (disable, prefer, require, ...).
    #[serde(default = "default_sslmode")]
    pub sslmode: String,

    /// Maximum open connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Connections kept open while idle.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Maximum lifetime of a pooled connection in seconds.
    #[serde(default = "default_max_lifetime")]
    pub max_lifetime_secs: u64,

    /// Pool checkout timeout in seconds.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

impl DatabaseConfig {
    /// Minimal configuration for the given driver.
    pub fn new(driver: Driver) -> Self {
        Self {
            driver,
            url: None,
            host: default_host(),
            port: default_port(),
            username: None,
            password: None,
            database: default_database(),
            sslmode: default_sslmode(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            max_lifetime_secs: default_max_lifetime(),
            acquire_timeout_secs: default_acquire_timeout(),
        }
    }

    /// Location of the sqlite database file.
    pub fn sqlite_path(&self, data_dir: &Path) -> PathBuf {
        let file = Path::new(&self.database);
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            data_dir.join("database").join(file)
        }
    }

    /// Human-readable connection target, without credentials.
    pub fn display_target(&self, data_dir: &Path) -> String {
        if self.url.is_some() {
            return format!("{} (url)", self.driver);
        }
        match self.driver {
            Driver::Postgres => format!("{}:{}/{}", self.host, self.port, self.database),
            Driver::Sqlite => self.sqlite_path(data_dir).display().to_string(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_database() -> String {
    "dbmigrate".to_string()
}

fn default_sslmode() -> String {
    "disable".to_string()
}

fn default_max_connections() -> u32 {
    2
}

fn default_min_connections() -> u32 {
    1
}

fn default_max_lifetime() -> u64 {
    60 * 60
}

fn default_acquire_timeout() -> u64 {
    30
}
