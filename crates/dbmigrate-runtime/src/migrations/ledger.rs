//! Version ledger stored inside the target database.
//!
//! One row per applied migration; the current version is the highest
//! recorded one, or 0 when nothing has been applied yet.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use dbmigrate_core::config::Driver;
use dbmigrate_core::error::{MigrateError, Result};

use super::store::MigrationUnit;
use crate::db::{Connection, Transaction};

/// Name of the ledger table.
pub const LEDGER_TABLE: &str = "schema_version";

/// Advisory lock key held by a running engine ("DBMIG" in hex).
const MIGRATION_LOCK_ID: i64 = 0x44424D4947;

/// A recorded migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub version: i64,
    pub name: String,
    pub checksum: String,
    pub applied_at: DateTime<Utc>,
    pub execution_time_ms: i64,
}

fn create_table_sql(driver: Driver) -> String {
    match driver {
        Driver::Postgres => format!(
            r#"
            CREATE TABLE IF NOT EXISTS {LEDGER_TABLE} (
                version BIGINT PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                checksum VARCHAR(64) NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                execution_time_ms BIGINT NOT NULL DEFAULT 0
            )
            "#
        ),
        Driver::Sqlite => format!(
            r#"
            CREATE TABLE IF NOT EXISTS {LEDGER_TABLE} (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                checksum TEXT NOT NULL,
                applied_at TEXT NOT NULL,
                execution_time_ms INTEGER NOT NULL DEFAULT 0
            )
            "#
        ),
    }
}

fn table_exists_sql(driver: Driver) -> String {
    match driver {
        Driver::Postgres => format!(
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = '{LEDGER_TABLE}'"
        ),
        Driver::Sqlite => format!(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '{LEDGER_TABLE}'"
        ),
    }
}

fn insert_sql(driver: Driver) -> String {
    match driver {
        Driver::Postgres => format!(
            "INSERT INTO {LEDGER_TABLE} (version, name, checksum, applied_at, execution_time_ms) \
             VALUES ($1, $2, $3, $4, $5)"
        ),
        Driver::Sqlite => format!(
            "INSERT INTO {LEDGER_TABLE} (version, name, checksum, applied_at, execution_time_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5)"
        ),
    }
}

fn select_applied_sql() -> String {
    format!(
        "SELECT version, name, checksum, applied_at, execution_time_ms \
         FROM {LEDGER_TABLE} ORDER BY version ASC"
    )
}

fn current_version_sql() -> String {
    format!("SELECT MAX(version) FROM {LEDGER_TABLE}")
}

/// Create the ledger table if it does not exist yet.
pub async fn ensure_table(conn: &mut Connection) -> Result<()> {
    let sql = create_table_sql(conn.driver());
    conn.execute(&sql)
        .await
        .map_err(|e| MigrateError::Ledger(format!("Failed to create {}: {}", LEDGER_TABLE, e)))?;
    Ok(())
}

/// Whether the ledger table exists. Never writes.
pub async fn exists(conn: &mut Connection) -> Result<bool> {
    let sql = table_exists_sql(conn.driver());
    let count = conn
        .query_scalar(&sql)
        .await
        .map_err(|e| MigrateError::Ledger(format!("Failed to inspect {}: {}", LEDGER_TABLE, e)))?;
    Ok(count.unwrap_or(0) > 0)
}

/// Latest applied version, creating the ledger on first use.
///
/// A fresh database reports 0.
pub async fn current_version(conn: &mut Connection) -> Result<i64> {
    ensure_table(conn).await?;

    let version = conn
        .query_scalar(&current_version_sql())
        .await
        .map_err(|e| MigrateError::Ledger(format!("Failed to read current version: {}", e)))?;
    let version = version.unwrap_or(0);
    debug!("Ledger at version {}", version);
    Ok(version)
}

/// All recorded migrations in ascending version order.
///
/// Returns an empty list when the ledger table does not exist.
pub async fn applied(conn: &mut Connection) -> Result<Vec<LedgerEntry>> {
    if !exists(conn).await? {
        return Ok(Vec::new());
    }

    type Row = (i64, String, String, DateTime<Utc>, i64);
    let sql = select_applied_sql();
    let rows: Vec<Row> = match conn {
        Connection::Postgres(c) => sqlx::query_as::<_, Row>(&sql).fetch_all(&mut **c).await,
        Connection::Sqlite(c) => sqlx::query_as::<_, Row>(&sql).fetch_all(&mut **c).await,
    }
    .map_err(|e| MigrateError::Ledger(format!("Failed to fetch applied migrations: {}", e)))?;

    Ok(rows
        .into_iter()
        .map(
            |(version, name, checksum, applied_at, execution_time_ms)| LedgerEntry {
                version,
                name,
                checksum,
                applied_at,
                execution_time_ms,
            },
        )
        .collect())
}

/// Record `unit` as applied inside the unit's own transaction.
///
/// The row only becomes visible when the transaction commits, so the ledger
/// never gets ahead of the schema.
pub async fn advance(tx: &mut Transaction<'_>, unit: &MigrationUnit, elapsed: Duration) -> Result<()> {
    let sql = insert_sql(tx.driver());
    let applied_at = Utc::now();
    let elapsed_ms = i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX);

    let result = match tx {
        Transaction::Postgres(t) => sqlx::query(&sql)
            .bind(unit.version)
            .bind(&unit.name)
            .bind(&unit.checksum)
            .bind(applied_at)
            .bind(elapsed_ms)
            .execute(&mut **t)
            .await
            .map(|_| ()),
        Transaction::Sqlite(t) => sqlx::query(&sql)
            .bind(unit.version)
            .bind(&unit.name)
            .bind(&unit.checksum)
            .bind(applied_at)
            .bind(elapsed_ms)
            .execute(&mut **t)
            .await
            .map(|_| ()),
    };

    result.map_err(|e| {
        MigrateError::Ledger(format!(
            "Failed to record migration {} ({}): {}",
            unit.version, unit.name, e
        ))
    })
}

/// Take the cross-process migration lock.
///
/// Postgres uses a session-level advisory lock on this connection and blocks
/// until it is granted. Sqlite relies on its own file lock and the ledger's
/// primary key, so this is a no-op there.
pub async fn lock(conn: &mut Connection) -> Result<()> {
    if let Connection::Postgres(c) = conn {
        debug!("Acquiring migration lock...");
        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(MIGRATION_LOCK_ID)
            .execute(&mut **c)
            .await
            .map_err(|e| MigrateError::Ledger(format!("Failed to acquire migration lock: {}", e)))?;
        debug!("Migration lock acquired");
    }
    Ok(())
}

/// Release the lock taken by [`lock`].
pub async fn unlock(conn: &mut Connection) -> Result<()> {
    if let Connection::Postgres(c) = conn {
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(MIGRATION_LOCK_ID)
            .execute(&mut **c)
            .await
            .map_err(|e| MigrateError::Ledger(format!("Failed to release migration lock: {}", e)))?;
        debug!("Migration lock released");
    }
    Ok(())
}
