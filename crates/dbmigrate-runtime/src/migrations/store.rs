//! Migration file store.
//!
//! Reads a directory of `<version>_<name>.sql` files and parses each into a
//! [`MigrationUnit`]. The resulting [`MigrationSet`] is sorted by version and
//! free of duplicates; that order is the only valid application order.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

use dbmigrate_core::error::LoadError;

/// File extension of migration files.
pub const MIGRATION_EXTENSION: &str = "sql";

/// A single versioned change script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationUnit {
    /// Version taken from the filename prefix.
    pub version: i64,
    /// Slug taken from the filename.
    pub name: String,
    /// Forward statements.
    pub up_sql: String,
    /// Reverse statements. Parsed, never executed.
    pub down_sql: Option<String>,
    /// Source file, empty for programmatic units.
    pub path: PathBuf,
    /// SHA-256 of the forward script.
    pub checksum: String,
}

impl MigrationUnit {
    pub fn new(version: i64, name: impl Into<String>, up_sql: impl Into<String>) -> Self {
        let up_sql = up_sql.into();
        Self {
            version,
            name: name.into(),
            checksum: checksum(&up_sql),
            up_sql,
            down_sql: None,
            path: PathBuf::new(),
        }
    }

    /// Parse a migration file's name and content.
    pub fn parse(path: &Path, content: &str) -> Result<Self, LoadError> {
        let (version, name) = parse_filename(path)?;
        let (up_sql, down_sql) = parse_sections(content);

        Ok(Self {
            version,
            name,
            checksum: checksum(&up_sql),
            up_sql,
            down_sql,
            path: path.to_path_buf(),
        })
    }

    pub fn has_down(&self) -> bool {
        self.down_sql.is_some()
    }
}

/// Split a filename of the form `<version>_<name>.sql` into its parts.
pub fn parse_filename(path: &Path) -> Result<(i64, String), LoadError> {
    let malformed = |reason: &str| LoadError::MalformedFilename {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| malformed("filename is not valid UTF-8"))?;

    let (version, name) = stem
        .split_once('_')
        .ok_or_else(|| malformed("expected <version>_<name>"))?;

    if version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed("version prefix must be a decimal integer"));
    }
    let version: i64 = version
        .parse()
        .map_err(|_| malformed("version prefix is out of range"))?;
    if version == 0 {
        return Err(malformed("version must be greater than zero"));
    }
    if name.is_empty() {
        return Err(malformed("missing name after version"));
    }

    Ok((version, name.to_string()))
}

/// Section a marker line switches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Up,
    Down,
}

/// Recognise `-- up` / `-- down` marker lines.
///
/// The comment must consist of exactly that one word, so `-- update users`
/// stays an ordinary comment.
fn marker(line: &str) -> Option<Section> {
    let rest = line.trim().strip_prefix("--")?;
    let mut words = rest.split_whitespace();
    let word = words.next()?;
    if words.next().is_some() {
        return None;
    }
    if word.eq_ignore_ascii_case("up") {
        Some(Section::Up)
    } else if word.eq_ignore_ascii_case("down") {
        Some(Section::Down)
    } else {
        None
    }
}

/// Split file content into forward and reverse scripts.
///
/// Text before the first marker belongs to the forward script, so a file
/// without markers is forward-only.
pub fn parse_sections(content: &str) -> (String, Option<String>) {
    let mut up = Vec::new();
    let mut down = Vec::new();
    let mut section = Section::Up;
    let mut saw_down = false;

    for line in content.lines() {
        if let Some(next) = marker(line) {
            section = next;
            saw_down |= next == Section::Down;
            continue;
        }
        match section {
            Section::Up => up.push(line),
            Section::Down => down.push(line),
        }
    }

    let up_sql = up.join("\n").trim().to_string();
    let down_sql = down.join("\n").trim().to_string();
    let down_sql = if saw_down && !down_sql.is_empty() {
        Some(down_sql)
    } else {
        None
    };

    (up_sql, down_sql)
}

/// Hex-encoded SHA-256 of a script.
pub fn checksum(sql: &str) -> String {
    let digest = Sha256::digest(sql.as_bytes());
    format!("{:x}", digest)
}

/// An ordered, duplicate-free sequence of migration units.
#[derive(Debug, Clone, Default)]
pub struct MigrationSet {
    units: Vec<MigrationUnit>,
}

impl MigrationSet {
    /// Sort units by version, rejecting duplicates.
    pub fn new(mut units: Vec<MigrationUnit>) -> Result<Self, LoadError> {
        units.sort_by(|a, b| a.version.cmp(&b.version).then_with(|| a.path.cmp(&b.path)));

        if let Some(pair) = units.windows(2).find(|w| w[0].version == w[1].version) {
            return Err(LoadError::DuplicateVersion {
                version: pair[0].version,
                first: pair[0].path.clone(),
                second: pair[1].path.clone(),
            });
        }

        Ok(Self { units })
    }

    /// Load every migration file in `dir`.
    pub fn load(dir: &Path) -> Result<Self, LoadError> {
        if !dir.is_dir() {
            return Err(LoadError::DirectoryNotFound(dir.to_path_buf()));
        }

        let read_err = |source| LoadError::Read {
            path: dir.to_path_buf(),
            source,
        };

        let mut units = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(read_err)? {
            let path = entry.map_err(read_err)?.path();
            if !is_migration_file(&path) {
                continue;
            }

            let content = std::fs::read_to_string(&path).map_err(|source| LoadError::Read {
                path: path.clone(),
                source,
            })?;
            units.push(MigrationUnit::parse(&path, &content)?);
        }

        let set = Self::new(units)?;
        debug!("Loaded {} migrations from {}", set.len(), dir.display());
        Ok(set)
    }

    pub fn units(&self) -> &[MigrationUnit] {
        &self.units
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MigrationUnit> {
        self.units.iter()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Highest version in the set, 0 when empty.
    pub fn latest_version(&self) -> i64 {
        self.units.last().map(|u| u.version).unwrap_or(0)
    }

    pub fn get(&self, version: i64) -> Option<&MigrationUnit> {
        self.units
            .binary_search_by_key(&version, |u| u.version)
            .ok()
            .map(|idx| &self.units[idx])
    }

    /// Units with a version strictly greater than `current`, in order.
    pub fn pending(&self, current: i64) -> &[MigrationUnit] {
        let start = self.units.partition_point(|u| u.version <= current);
        &self.units[start..]
    }
}

impl<'a> IntoIterator for &'a MigrationSet {
    type Item = &'a MigrationUnit;
    type IntoIter = std::slice::Iter<'a, MigrationUnit>;

    fn into_iter(self) -> Self::IntoIter {
        self.units.iter()
    }
}

/// Load user migrations from a directory.
///
/// Migrations should be named like:
/// - `1_init.sql`
/// - `1700000000_add_orders.sql`
pub fn load_migrations_from_dir(dir: &Path) -> Result<MigrationSet, LoadError> {
    MigrationSet::load(dir)
}

/// Whether a directory entry is a migration candidate.
///
/// Hidden files, directories and other extensions are skipped.
pub(crate) fn is_migration_file(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false);
    let is_sql = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(MIGRATION_EXTENSION))
        .unwrap_or(false);

    !hidden && is_sql && path.is_file()
}
