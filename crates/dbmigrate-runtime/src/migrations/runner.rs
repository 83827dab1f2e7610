//! Migration engine.
//!
//! Applies pending units one transaction at a time and records each in the
//! version ledger inside that same transaction.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use dbmigrate_core::error::{MigrateError, Result};

use super::ledger::{self, LedgerEntry};
use super::logger::{MigrationLogger, TracingLogger};
use super::sql::split_sql_statements;
use super::store::{MigrationSet, MigrationUnit};
use crate::db::Connection;

/// Runs migrations against an exclusively owned connection.
pub struct MigrationRunner {
    logger: Arc<dyn MigrationLogger>,
}

impl Default for MigrationRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationRunner {
    /// Runner reporting through `tracing`.
    pub fn new() -> Self {
        Self::with_logger(Arc::new(TracingLogger))
    }

    pub fn with_logger(logger: Arc<dyn MigrationLogger>) -> Self {
        Self { logger }
    }

    /// Apply every unit newer than the ledger's current version.
    ///
    /// Returns how many units were applied. Stops at the first failing unit;
    /// units committed before it stay applied.
    pub async fn run(&self, conn: &mut Connection, migrations: &MigrationSet) -> Result<usize> {
        ledger::lock(conn).await?;

        let result = self.run_inner(conn, migrations).await;

        // Always release lock, even on error
        if let Err(e) = ledger::unlock(conn).await {
            warn!("Failed to release migration lock: {}", e);
        }

        result
    }

    async fn run_inner(&self, conn: &mut Connection, migrations: &MigrationSet) -> Result<usize> {
        let current = ledger::current_version(conn).await?;

        if current > 0 {
            let applied = ledger::applied(conn).await?;
            self.report_drift(&applied, migrations);
        }

        let pending = migrations.pending(current);
        if pending.is_empty() {
            self.logger.info(&format!(
                "No migrations to be run, current version: {}",
                current
            ));
            return Ok(0);
        }

        debug!(
            "{} pending migrations after version {}",
            pending.len(),
            current
        );

        for unit in pending {
            self.apply(conn, unit).await?;
        }

        self.logger.info(&format!(
            "Migration complete. Current version: {}",
            migrations.latest_version()
        ));
        Ok(pending.len())
    }

    async fn apply(&self, conn: &mut Connection, unit: &MigrationUnit) -> Result<()> {
        let statements = split_sql_statements(&unit.up_sql);
        debug!(
            "Applying migration {} ({}): {} statements",
            unit.version,
            unit.name,
            statements.len()
        );

        let start = Instant::now();
        let mut tx = conn.begin().await?;

        for (idx, statement) in statements.iter().enumerate() {
            if let Err(source) = tx.execute(statement).await {
                if let Err(e) = tx.rollback().await {
                    warn!("Failed to roll back migration {}: {}", unit.version, e);
                }
                return Err(self.unit_failed(unit, &format!("statement {}", idx + 1), source));
            }
        }

        if let Err(e) = ledger::advance(&mut tx, unit, start.elapsed()).await {
            if let Err(rollback) = tx.rollback().await {
                warn!("Failed to roll back migration {}: {}", unit.version, rollback);
            }
            self.logger.error(&e.to_string());
            return Err(e);
        }

        // Deferred constraints are checked here, so commit can fail too.
        if let Err(source) = tx.commit().await {
            return Err(self.unit_failed(unit, "commit", source));
        }

        self.logger.info(&format!(
            "Applied migration {} ({})",
            unit.version, unit.name
        ));
        Ok(())
    }

    fn unit_failed(&self, unit: &MigrationUnit, stage: &str, source: sqlx::Error) -> MigrateError {
        self.logger.error(&format!(
            "Migration {} ({}) failed at {}: {}",
            unit.version, unit.name, stage, source
        ));
        MigrateError::Migration {
            version: unit.version,
            name: unit.name.clone(),
            source,
        }
    }

    /// Warn about applied files that changed on disk since they ran.
    fn report_drift(&self, applied: &[LedgerEntry], migrations: &MigrationSet) {
        for entry in applied {
            match migrations.get(entry.version) {
                Some(unit) if unit.checksum != entry.checksum => {
                    self.logger.error(&format!(
                        "Warning: migration {} ({}) has changed since it was applied",
                        entry.version, unit.name
                    ));
                }
                Some(_) => {}
                None => debug!(
                    "Applied migration {} ({}) has no file",
                    entry.version, entry.name
                ),
            }
        }
    }

    /// Compare the ledger with the migration set without writing anything.
    pub async fn status(
        &self,
        conn: &mut Connection,
        migrations: &MigrationSet,
    ) -> Result<MigrationStatus> {
        let applied = ledger::applied(conn).await?;
        Ok(MigrationStatus::compute(&applied, migrations))
    }
}

/// Snapshot of the ledger against the files on disk.
#[derive(Debug, Clone, Default)]
pub struct MigrationStatus {
    /// Highest applied version, 0 when nothing is applied.
    pub current_version: i64,
    pub applied: Vec<AppliedMigration>,
    /// Units newer than the current version, in application order.
    pub pending: Vec<MigrationSummary>,
    /// Units at or below the current version that were never applied.
    pub skipped: Vec<MigrationSummary>,
}

impl MigrationStatus {
    pub fn compute(applied: &[LedgerEntry], migrations: &MigrationSet) -> Self {
        let current_version = applied.iter().map(|e| e.version).max().unwrap_or(0);

        let applied_migrations = applied
            .iter()
            .map(|entry| {
                let unit = migrations.get(entry.version);
                let state = match unit {
                    None => AppliedState::Missing,
                    Some(u) if u.checksum != entry.checksum => AppliedState::Modified,
                    Some(_) => AppliedState::Verified,
                };
                AppliedMigration {
                    version: entry.version,
                    name: entry.name.clone(),
                    applied_at: entry.applied_at,
                    execution_time_ms: entry.execution_time_ms,
                    has_down: unit.map(|u| u.has_down()).unwrap_or(false),
                    state,
                }
            })
            .collect();

        let skipped = migrations
            .iter()
            .filter(|u| u.version <= current_version)
            .filter(|u| !applied.iter().any(|e| e.version == u.version))
            .map(MigrationSummary::from)
            .collect();

        let pending = migrations
            .pending(current_version)
            .iter()
            .map(MigrationSummary::from)
            .collect();

        Self {
            current_version,
            applied: applied_migrations,
            pending,
            skipped,
        }
    }

    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }
}

/// A ledger row joined with its file, if any.
#[derive(Debug, Clone)]
pub struct AppliedMigration {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
    pub execution_time_ms: i64,
    pub has_down: bool,
    pub state: AppliedState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppliedState {
    /// File present with the recorded checksum.
    Verified,
    /// File present but edited after it was applied.
    Modified,
    /// No file with this version anymore.
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSummary {
    pub version: i64,
    pub name: String,
    pub has_down: bool,
}

impl From<&MigrationUnit> for MigrationSummary {
    fn from(unit: &MigrationUnit) -> Self {
        Self {
            version: unit.version,
            name: unit.name.clone(),
            has_down: unit.has_down(),
        }
    }
}
