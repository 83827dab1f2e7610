use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use console::style;
use tracing::debug;

use dbmigrate_core::config::MigrateConfig;
use dbmigrate_runtime::migrations::{AppliedState, MigrationLogger, MigrationStatus};
use dbmigrate_runtime::{Database, MigrationRunner, MigrationSet};

use super::ConsoleLogger;

/// Apply pending migrations, or report their status.
pub struct MigrateCommand {
    pub config: MigrateConfig,
    pub data_dir: PathBuf,
    pub migration_dir: PathBuf,
    pub status_only: bool,
}

impl MigrateCommand {
    pub async fn execute(self) -> Result<()> {
        let logger: Arc<dyn MigrationLogger> = Arc::new(ConsoleLogger::new());

        if self.status_only {
            let status = self.status().await?;
            print_status(&status);
            return Ok(());
        }

        self.run(logger).await?;
        println!();
        Ok(())
    }

    /// Apply every pending migration, returning how many were applied.
    pub async fn run(&self, logger: Arc<dyn MigrationLogger>) -> Result<usize> {
        // Bad files are fatal before any database work.
        let migrations = MigrationSet::load(&self.migration_dir)?;
        debug!(
            "Found {} migrations in {}",
            migrations.len(),
            self.migration_dir.display()
        );

        let db = self.connect().await?;
        let runner = MigrationRunner::with_logger(logger);

        let result = async {
            let mut conn = db.acquire().await?;
            runner.run(&mut conn, &migrations).await
        }
        .await;

        db.close().await;
        Ok(result?)
    }

    /// Compare the ledger with the migration directory. Never writes.
    pub async fn status(&self) -> Result<MigrationStatus> {
        let migrations = MigrationSet::load(&self.migration_dir)?;

        let db = self.connect().await?;
        let runner = MigrationRunner::new();

        let result = async {
            let mut conn = db.acquire().await?;
            runner.status(&mut conn, &migrations).await
        }
        .await;

        db.close().await;
        Ok(result?)
    }

    async fn connect(&self) -> Result<Database> {
        let db = Database::from_config(&self.config.database, &self.data_dir).await?;
        println!(
            "  {} Connected to: {}",
            style("✓").green(),
            style(self.config.database.display_target(&self.data_dir)).cyan()
        );
        Ok(db)
    }
}

fn print_status(status: &MigrationStatus) {
    println!();

    if status.applied.is_empty() && status.pending.is_empty() && status.skipped.is_empty() {
        println!("  {} No migrations found", style("ℹ").blue());
        println!();
        return;
    }

    if !status.applied.is_empty() {
        println!("  {} Applied:", style("✓").green());
        for m in &status.applied {
            let down_marker = if m.has_down {
                style("↓").green().to_string()
            } else {
                style("-").dim().to_string()
            };
            let note = match m.state {
                AppliedState::Verified => String::new(),
                AppliedState::Modified => style(" (modified)").yellow().to_string(),
                AppliedState::Missing => style(" (file missing)").red().to_string(),
            };
            println!(
                "    {} {} {} {} ({}, {}ms){}",
                down_marker,
                m.version,
                style(&m.name).cyan(),
                style("at").dim(),
                m.applied_at.format("%Y-%m-%d %H:%M:%S"),
                m.execution_time_ms,
                note
            );
        }
    }

    if !status.skipped.is_empty() {
        println!();
        println!(
            "  {} Skipped (older than version {}, never applied):",
            style("!").yellow(),
            status.current_version
        );
        for m in &status.skipped {
            println!("    {} {} {}", style("→").dim(), m.version, style(&m.name).yellow());
        }
    }

    if !status.pending.is_empty() {
        println!();
        println!("  {} Pending:", style("○").yellow());
        for m in &status.pending {
            println!("    {} {} {}", style("→").dim(), m.version, style(&m.name).yellow());
        }
    }

    println!();
    println!(
        "  {} Current version {}: {} applied, {} pending",
        style("ℹ").blue(),
        status.current_version,
        status.applied.len(),
        status.pending.len()
    );
    println!();

    // Legend
    println!(
        "  {} = has down migration, {} = no down migration",
        style("↓").green(),
        style("-").dim()
    );
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbmigrate_core::config::Driver;
    use dbmigrate_core::error::MigrateError;
    use dbmigrate_runtime::migrations::RecordingLogger;
    use std::fs;
    use tempfile::TempDir;

    fn command(dir: &TempDir) -> MigrateCommand {
        let migration_dir = dir.path().join("migrations");
        fs::create_dir_all(&migration_dir).unwrap();
        MigrateCommand {
            config: MigrateConfig::with_driver(Driver::Sqlite),
            data_dir: dir.path().to_path_buf(),
            migration_dir,
            status_only: false,
        }
    }

    #[tokio::test]
    async fn test_run_against_sqlite_file() {
        let dir = TempDir::new().unwrap();
        let cmd = command(&dir);
        fs::write(
            cmd.migration_dir.join("1_init.sql"),
            "-- up\nCREATE TABLE t (id INTEGER PRIMARY KEY);\n-- down\nDROP TABLE t;\n",
        )
        .unwrap();
        fs::write(
            cmd.migration_dir.join("2_add_col.sql"),
            "-- up\nALTER TABLE t ADD COLUMN label TEXT;\n",
        )
        .unwrap();

        let logger = Arc::new(RecordingLogger::new());
        assert_eq!(cmd.run(logger.clone()).await.unwrap(), 2);
        assert!(dir.path().join("database").join("dbmigrate").exists());

        assert_eq!(cmd.run(logger.clone()).await.unwrap(), 0);

        let status = cmd.status().await.unwrap();
        assert_eq!(status.current_version, 2);
        assert!(status.is_up_to_date());
    }

    #[tokio::test]
    async fn test_failed_unit_surfaces_as_error() {
        let dir = TempDir::new().unwrap();
        let cmd = command(&dir);
        fs::write(cmd.migration_dir.join("1_init.sql"), "CREATE TABLE t (id INTEGER);").unwrap();
        fs::write(
            cmd.migration_dir.join("2_add_col.sql"),
            "ALTER TABLE missing ADD COLUMN label TEXT;",
        )
        .unwrap();

        let err = cmd.run(Arc::new(RecordingLogger::new())).await.unwrap_err();
        let err = err.downcast::<MigrateError>().unwrap();
        assert_eq!(err.failed_version(), Some(2));

        let status = cmd.status().await.unwrap();
        assert_eq!(status.current_version, 1);
        assert_eq!(status.pending.len(), 1);
    }

    #[tokio::test]
    async fn test_bad_directory_fails_before_connecting() {
        let dir = TempDir::new().unwrap();
        let mut cmd = command(&dir);
        cmd.migration_dir = dir.path().join("nope");

        let err = cmd.run(Arc::new(RecordingLogger::new())).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
        assert!(!dir.path().join("database").exists());
    }
}
