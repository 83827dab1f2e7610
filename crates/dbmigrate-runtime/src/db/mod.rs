mod connection;
mod pool;

pub use connection::{Connection, Transaction};
pub use pool::Database;
