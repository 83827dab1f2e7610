mod generator;
mod ledger;
mod logger;
mod runner;
mod sql;
mod store;

pub use generator::{slugify, StubGenerator, STUB_TEMPLATE};
pub use ledger::{LedgerEntry, LEDGER_TABLE};
pub use logger::{LogLevel, LogLine, MigrationLogger, RecordingLogger, TracingLogger};
pub use runner::{
    AppliedMigration, AppliedState, MigrationRunner, MigrationStatus, MigrationSummary,
};
pub use sql::split_sql_statements;
pub use store::{
    checksum, load_migrations_from_dir, parse_filename, parse_sections, MigrationSet,
    MigrationUnit, MIGRATION_EXTENSION,
};
