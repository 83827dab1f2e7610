pub mod db;
pub mod migrations;

pub use db::{Connection, Database, Transaction};
pub use migrations::{
    MigrationLogger, MigrationRunner, MigrationSet, MigrationStatus, MigrationUnit, StubGenerator,
};
