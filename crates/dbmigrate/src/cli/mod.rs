mod create;
mod logger;
mod migrate;

pub use create::CreateCommand;
pub use logger::ConsoleLogger;
pub use migrate::MigrateCommand;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use console::style;
use tracing_subscriber::EnvFilter;

use dbmigrate_core::config::{
    default_config_path, default_data_dir, LoggingConfig, MigrateConfig, DEFAULT_MIGRATION_DIR,
};

/// Apply versioned SQL migrations to PostgreSQL or SQLite.
#[derive(Parser, Debug)]
#[command(name = "dbmigrate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (defaults to <datadir>/config.toml).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Base directory for the default config and sqlite database files.
    #[arg(long)]
    pub datadir: Option<PathBuf>,

    /// Create a new migration stub with this name and exit.
    ///
    /// The config file is not read: the stub goes to --migrationdir, or to
    /// ./migrations when that flag is absent.
    #[arg(long, value_name = "NAME", conflicts_with = "status")]
    pub create: Option<String>,

    /// Migration directory (overrides the config file).
    #[arg(long)]
    pub migrationdir: Option<PathBuf>,

    /// Show applied, pending and skipped migrations without applying anything.
    #[arg(long)]
    pub status: bool,

    /// Enable debug logging.
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        // Load .env if present
        dotenvy::dotenv().ok();

        print_banner();

        let data_dir = self.datadir.clone().unwrap_or_else(default_data_dir);

        if let Some(name) = self.create {
            init_tracing(&LoggingConfig::default(), self.verbose);
            let dir = stub_dir(self.migrationdir);
            return CreateCommand { name, dir }.execute();
        }

        let config_path = self
            .config
            .unwrap_or_else(|| default_config_path(&data_dir));
        if !config_path.exists() {
            anyhow::bail!("Configuration file not found: {}", config_path.display());
        }
        let config = MigrateConfig::from_file(&config_path)?;
        init_tracing(&config.logging, self.verbose);

        let migration_dir = self
            .migrationdir
            .unwrap_or_else(|| config.migrations.dir.clone());

        MigrateCommand {
            config,
            data_dir,
            migration_dir,
            status_only: self.status,
        }
        .execute()
        .await
    }
}

/// Directory for `--create`, which never consults the config file.
fn stub_dir(migrationdir: Option<PathBuf>) -> PathBuf {
    migrationdir.unwrap_or_else(|| PathBuf::from(DEFAULT_MIGRATION_DIR))
}

fn print_banner() {
    println!();
    println!(
        "  {}  v{}",
        style("dbmigrate").bold().cyan(),
        env!("CARGO_PKG_VERSION")
    );
    println!();
}

/// Install the global subscriber. `RUST_LOG` wins over config and flags.
fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    // A subscriber may already be installed (tests); keep it.
    let _ = if logging.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_defaults() {
        let cli = Cli::try_parse_from(["dbmigrate"]).unwrap();
        assert!(cli.config.is_none());
        assert!(cli.create.is_none());
        assert!(!cli.status);
        assert!(!cli.verbose);
    }

    #[test]
    fn test_cli_parse_create() {
        let cli = Cli::try_parse_from([
            "dbmigrate",
            "--create",
            "add users",
            "--migrationdir",
            "db/migrations",
        ])
        .unwrap();
        assert_eq!(cli.create.as_deref(), Some("add users"));
        assert_eq!(cli.migrationdir, Some(PathBuf::from("db/migrations")));
    }

    #[test]
    fn test_cli_parse_paths() {
        let cli = Cli::try_parse_from([
            "dbmigrate",
            "--config",
            "/etc/dbmigrate.toml",
            "--datadir",
            "/var/lib/dbmigrate",
            "--status",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/dbmigrate.toml")));
        assert_eq!(cli.datadir, Some(PathBuf::from("/var/lib/dbmigrate")));
        assert!(cli.status);
    }

    #[test]
    fn test_stub_dir_ignores_config() {
        let cli = Cli::try_parse_from(["dbmigrate", "--config", "custom.toml", "--create", "x"])
            .unwrap();
        assert_eq!(stub_dir(cli.migrationdir), PathBuf::from("migrations"));
        assert_eq!(
            stub_dir(Some(PathBuf::from("db/migrations"))),
            PathBuf::from("db/migrations")
        );
    }

    #[test]
    fn test_create_conflicts_with_status() {
        assert!(Cli::try_parse_from(["dbmigrate", "--create", "x", "--status"]).is_err());
    }
}
