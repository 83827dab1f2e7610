pub mod config;
pub mod error;

pub use config::{DatabaseConfig, Driver, MigrateConfig};
pub use error::{LoadError, MigrateError, Result};
