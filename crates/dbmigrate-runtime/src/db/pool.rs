use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::debug;

use dbmigrate_core::config::{DatabaseConfig, Driver};
use dbmigrate_core::error::{MigrateError, Result};

use super::connection::Connection;

/// Connection provider for one of the supported backends.
///
/// The driver is resolved exactly once, when the pool is built; everything
/// downstream dispatches on the variant.
#[derive(Clone)]
pub enum Database {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl Database {
    /// Create a new connection pool from configuration.
    ///
    /// `data_dir` anchors relative sqlite database paths.
    pub async fn from_config(config: &DatabaseConfig, data_dir: &Path) -> Result<Self> {
        let max_connections = config.max_connections.max(1);
        let min_connections = config.min_connections.min(max_connections);
        let max_lifetime = Duration::from_secs(config.max_lifetime_secs);
        let acquire_timeout = Duration::from_secs(config.acquire_timeout_secs);

        match config.driver {
            Driver::Postgres => {
                let options = postgres_options(config)?;
                let pool = PgPoolOptions::new()
                    .max_connections(max_connections)
                    .min_connections(min_connections)
                    .max_lifetime(max_lifetime)
                    .acquire_timeout(acquire_timeout)
                    .connect_with(options)
                    .await
                    .map_err(|e| MigrateError::Connection(e.to_string()))?;
                debug!("Postgres pool ready (max {} connections)", max_connections);
                Ok(Database::Postgres(pool))
            }
            Driver::Sqlite => {
                let options = sqlite_options(config, data_dir)?;
                let pool = SqlitePoolOptions::new()
                    .max_connections(max_connections)
                    .min_connections(min_connections)
                    .max_lifetime(max_lifetime)
                    .acquire_timeout(acquire_timeout)
                    .connect_with(options)
                    .await
                    .map_err(|e| MigrateError::Connection(e.to_string()))?;
                debug!("Sqlite pool ready (max {} connections)", max_connections);
                Ok(Database::Sqlite(pool))
            }
        }
    }

    /// Backend behind this pool.
    pub fn driver(&self) -> Driver {
        match self {
            Database::Postgres(_) => Driver::Postgres,
            Database::Sqlite(_) => Driver::Sqlite,
        }
    }

    /// Check out a connection for exclusive use.
    ///
    /// The connection returns to the pool when dropped.
    pub async fn acquire(&self) -> Result<Connection> {
        match self {
            Database::Postgres(pool) => pool
                .acquire()
                .await
                .map(Connection::Postgres)
                .map_err(|e| MigrateError::Connection(e.to_string())),
            Database::Sqlite(pool) => pool
                .acquire()
                .await
                .map(Connection::Sqlite)
                .map_err(|e| MigrateError::Connection(e.to_string())),
        }
    }

    /// Close all connections gracefully.
    pub async fn close(&self) {
        match self {
            Database::Postgres(pool) => pool.close().await,
            Database::Sqlite(pool) => pool.close().await,
        }
    }
}

fn postgres_options(config: &DatabaseConfig) -> Result<PgConnectOptions> {
    if let Some(url) = &config.url {
        return PgConnectOptions::from_str(url)
            .map_err(|e| MigrateError::Config(format!("Invalid postgres url: {}", e)));
    }

    let ssl_mode = PgSslMode::from_str(&config.sslmode).map_err(|e| {
        MigrateError::Config(format!("Invalid sslmode '{}': {}", config.sslmode, e))
    })?;

    let mut options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .database(&config.database)
        .ssl_mode(ssl_mode);
    if let Some(username) = &config.username {
        options = options.username(username);
    }
    if let Some(password) = &config.password {
        options = options.password(password);
    }
    Ok(options)
}

fn sqlite_options(config: &DatabaseConfig, data_dir: &Path) -> Result<SqliteConnectOptions> {
    if let Some(url) = &config.url {
        return SqliteConnectOptions::from_str(url)
            .map(|options| options.create_if_missing(true))
            .map_err(|e| MigrateError::Config(format!("Invalid sqlite url: {}", e)));
    }

    let path = config.sqlite_path(data_dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            MigrateError::Connection(format!(
                "Failed to create database directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    Ok(SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true))
}
