use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::debug;

use dbmigrate_core::error::{LoadError, MigrateError, Result};

use super::store::{is_migration_file, parse_filename, MIGRATION_EXTENSION};

/// Content of a freshly created migration file.
pub const STUB_TEMPLATE: &str = "-- up\n-- down\n";

/// Creates empty, correctly named migration files.
pub struct StubGenerator {
    output_dir: PathBuf,
}

impl StubGenerator {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Create a stub named after `name`, versioned by the current time.
    pub fn create(&self, name: &str) -> Result<PathBuf> {
        self.create_at(name, Utc::now())
    }

    /// Create a stub as if the clock read `now`.
    ///
    /// The version is the Unix timestamp of `now`, bumped past the highest
    /// existing version so new stubs always sort last.
    pub fn create_at(&self, name: &str, now: DateTime<Utc>) -> Result<PathBuf> {
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(MigrateError::InvalidArgument(format!(
                "Migration name '{}' has no usable characters",
                name
            )));
        }

        std::fs::create_dir_all(&self.output_dir)?;

        let next = self.latest_version()?.checked_add(1).ok_or_else(|| {
            MigrateError::InvalidArgument(format!(
                "No version left after {} in {}",
                i64::MAX,
                self.output_dir.display()
            ))
        })?;
        let version = now.timestamp().max(next);
        let path = self
            .output_dir
            .join(format!("{}_{}.{}", version, slug, MIGRATION_EXTENSION));

        // create_new refuses to clobber an existing file.
        let mut file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        file.write_all(STUB_TEMPLATE.as_bytes())?;

        debug!("Created migration stub {}", path.display());
        Ok(path)
    }

    /// Highest version among well-formed files in the output directory.
    ///
    /// Malformed files are ignored here; loading reports them.
    fn latest_version(&self) -> Result<i64> {
        let read_err = |source| {
            MigrateError::Load(LoadError::Read {
                path: self.output_dir.clone(),
                source,
            })
        };

        let mut latest = 0;
        for entry in std::fs::read_dir(&self.output_dir).map_err(read_err)? {
            let path = entry.map_err(read_err)?.path();
            if !is_migration_file(&path) {
                continue;
            }
            if let Ok((version, _)) = parse_filename(&path) {
                latest = latest.max(version);
            }
        }
        Ok(latest)
    }
}

/// Lower-case `name` and collapse every run of other characters to `_`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_sep = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::MigrationSet;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::TempDir;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("add users"), "add_users");
        assert_eq!(slugify("  Add--Users Table! "), "add_users_table");
        assert_eq!(slugify("v2_index"), "v2_index");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_create_writes_template() {
        let dir = TempDir::new().unwrap();
        let generator = StubGenerator::new(dir.path());

        let path = generator.create_at("add users", at(1_700_000_000)).unwrap();

        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "1700000000_add_users.sql"
        );
        assert_eq!(fs::read_to_string(&path).unwrap(), STUB_TEMPLATE);
    }

    #[test]
    fn test_create_makes_missing_directory() {
        let dir = TempDir::new().unwrap();
        let generator = StubGenerator::new(dir.path().join("nested/migrations"));

        let path = generator.create_at("init", at(10)).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_rapid_creates_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let generator = StubGenerator::new(dir.path());

        let first = generator.create_at("one", at(500)).unwrap();
        let second = generator.create_at("two", at(500)).unwrap();
        let third = generator.create_at("one", at(500)).unwrap();

        assert!(first.ends_with("500_one.sql"));
        assert!(second.ends_with("501_two.sql"));
        assert!(third.ends_with("502_one.sql"));
        assert_eq!(MigrationSet::load(dir.path()).unwrap().len(), 3);
    }

    #[test]
    fn test_version_follows_existing_future_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("9000_later.sql"), "").unwrap();
        fs::write(dir.path().join("README.md"), "").unwrap();
        fs::write(dir.path().join("bogus.sql"), "").unwrap();

        let path = StubGenerator::new(dir.path())
            .create_at("next", at(100))
            .unwrap();
        assert!(path.ends_with("9001_next.sql"));
    }

    #[test]
    fn test_exhausted_version_space_is_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(format!("{}_big.sql", i64::MAX)), "").unwrap();

        let err = StubGenerator::new(dir.path())
            .create_at("next", at(100))
            .unwrap_err();
        assert!(matches!(err, MigrateError::InvalidArgument(_)));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_stub_parses_as_empty_unit() {
        let dir = TempDir::new().unwrap();
        StubGenerator::new(dir.path())
            .create_at("empty", at(1))
            .unwrap();

        let set = MigrationSet::load(dir.path()).unwrap();
        let unit = set.get(1).unwrap();
        assert_eq!(unit.name, "empty");
        assert!(unit.up_sql.trim().is_empty());
        assert!(!unit.has_down());
    }

    #[test]
    fn test_blank_name_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = StubGenerator::new(dir.path())
            .create_at("  ?? ", at(1))
            .unwrap_err();
        assert!(matches!(err, MigrateError::InvalidArgument(_)));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
