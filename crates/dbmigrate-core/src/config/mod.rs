mod database;
mod logging;

pub use database::{DatabaseConfig, Driver};
pub use logging::LoggingConfig;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{MigrateError, Result};

/// Default migration directory, relative to the working directory.
pub const DEFAULT_MIGRATION_DIR: &str = "migrations";

/// Root configuration for dbmigrate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrateConfig {
    /// Database configuration.
    pub database: DatabaseConfig,

    /// Migration file configuration.
    #[serde(default)]
    pub migrations: MigrationsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl MigrateConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MigrateError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let content = substitute_env_vars(content);

        toml::from_str(&content)
            .map_err(|e| MigrateError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Configuration for the given driver with every other setting defaulted.
    pub fn with_driver(driver: Driver) -> Self {
        Self {
            database: DatabaseConfig::new(driver),
            migrations: MigrationsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Migration file configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationsConfig {
    /// Directory holding `<version>_<name>.sql` files.
    #[serde(default = "default_migration_dir")]
    pub dir: PathBuf,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            dir: default_migration_dir(),
        }
    }
}

fn default_migration_dir() -> PathBuf {
    PathBuf::from(DEFAULT_MIGRATION_DIR)
}

/// Default base directory for file-backed resources (`~/.dbmigrate`).
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".dbmigrate"))
        .unwrap_or_else(|| PathBuf::from(".dbmigrate"))
}

/// Default config file location inside the data directory.
pub fn default_config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.toml")
}

/// Substitute environment variables in the format ${VAR_NAME}.
fn substitute_env_vars(content: &str) -> String {
    let mut result = content.to_string();
    let re = match regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}") {
        Ok(re) => re,
        Err(_) => return result,
    };

    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        } else {
            tracing::debug!("Environment variable {} not set, leaving placeholder", var_name);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
            [database]
            driver = "sqlite"
        "#;

        let config = MigrateConfig::parse_toml(toml).unwrap();
        assert_eq!(config.database.driver, Driver::Sqlite);
        assert_eq!(config.migrations.dir, PathBuf::from("migrations"));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [database]
            driver = "postgres"
            host = "10.0.0.5"
            port = 5433
            username = "gct"
            password = "hunter2"
            database = "market"
            sslmode = "require"
            max_connections = 4

            [migrations]
            dir = "db/migrations"

            [logging]
            level = "debug"
            json_format = true
        "#;

        let config = MigrateConfig::parse_toml(toml).unwrap();
        assert_eq!(config.database.port, 5433);
        assert_eq!(config.database.password.as_deref(), Some("hunter2"));
        assert_eq!(config.database.max_connections, 4);
        assert_eq!(config.migrations.dir, PathBuf::from("db/migrations"));
        assert!(config.logging.json_format);
    }

    #[test]
    fn test_missing_driver_is_config_error() {
        let err = MigrateConfig::parse_toml("[database]\nhost = \"x\"\n").unwrap_err();
        assert!(matches!(err, MigrateError::Config(_)));
    }

    #[test]
    fn test_unknown_driver_rejected() {
        let err = MigrateConfig::parse_toml("[database]\ndriver = \"oracle\"\n").unwrap_err();
        assert!(matches!(err, MigrateError::Config(_)));
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("DBMIGRATE_TEST_PASSWORD", "s3cret");

        let toml = r#"
            [database]
            driver = "postgres"
            password = "${DBMIGRATE_TEST_PASSWORD}"
        "#;

        let config = MigrateConfig::parse_toml(toml).unwrap();
        assert_eq!(config.database.password.as_deref(), Some("s3cret"));

        std::env::remove_var("DBMIGRATE_TEST_PASSWORD");
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[database]\ndriver = \"sqlite\"\ndatabase = \"x.db\"\n").unwrap();

        let config = MigrateConfig::from_file(&path).unwrap();
        assert_eq!(config.database.database, "x.db");

        let missing = MigrateConfig::from_file(dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(missing, MigrateError::Config(_)));
    }

    #[test]
    fn test_default_config_path() {
        assert_eq!(
            default_config_path(Path::new("/data")),
            PathBuf::from("/data/config.toml")
        );
    }
}
