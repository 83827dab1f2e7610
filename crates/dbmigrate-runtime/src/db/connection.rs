use sqlx::pool::PoolConnection;
use sqlx::{Postgres, Sqlite};

use dbmigrate_core::config::Driver;

/// Dispatch the same body over both backend variants.
macro_rules! dispatch {
    ($value:expr, $inner:ident => $body:expr) => {
        match $value {
            Self::Postgres($inner) => $body,
            Self::Sqlite($inner) => $body,
        }
    };
}

/// An exclusively owned database connection.
///
/// Exposes the small capability set the migration engine needs: statement
/// execution, scalar queries and transactions.
pub enum Connection {
    Postgres(PoolConnection<Postgres>),
    Sqlite(PoolConnection<Sqlite>),
}

impl Connection {
    /// Backend this connection talks to.
    pub fn driver(&self) -> Driver {
        match self {
            Connection::Postgres(_) => Driver::Postgres,
            Connection::Sqlite(_) => Driver::Sqlite,
        }
    }

    /// Execute a single parameterless statement outside any transaction.
    pub async fn execute(&mut self, sql: &str) -> sqlx::Result<u64> {
        dispatch!(self, conn => sqlx::query(sql)
            .execute(&mut **conn)
            .await
            .map(|r| r.rows_affected()))
    }

    /// Run a query returning a single nullable integer.
    pub async fn query_scalar(&mut self, sql: &str) -> sqlx::Result<Option<i64>> {
        dispatch!(self, conn => sqlx::query_scalar::<_, Option<i64>>(sql)
            .fetch_one(&mut **conn)
            .await)
    }

    /// Begin a transaction borrowing this connection.
    ///
    /// Dropping the returned transaction without committing rolls it back.
    pub async fn begin(&mut self) -> sqlx::Result<Transaction<'_>> {
        match self {
            Connection::Postgres(conn) => {
                let tx = sqlx::Connection::begin(&mut **conn).await?;
                Ok(Transaction::Postgres(tx))
            }
            Connection::Sqlite(conn) => {
                let tx = sqlx::Connection::begin(&mut **conn).await?;
                Ok(Transaction::Sqlite(tx))
            }
        }
    }
}

/// An open transaction on a [`Connection`].
pub enum Transaction<'c> {
    Postgres(sqlx::Transaction<'c, Postgres>),
    Sqlite(sqlx::Transaction<'c, Sqlite>),
}

impl Transaction<'_> {
    pub fn driver(&self) -> Driver {
        match self {
            Transaction::Postgres(_) => Driver::Postgres,
            Transaction::Sqlite(_) => Driver::Sqlite,
        }
    }

    /// Execute a single parameterless statement inside the transaction.
    pub async fn execute(&mut self, sql: &str) -> sqlx::Result<u64> {
        dispatch!(self, tx => sqlx::query(sql)
            .execute(&mut **tx)
            .await
            .map(|r| r.rows_affected()))
    }

    pub async fn commit(self) -> sqlx::Result<()> {
        dispatch!(self, tx => tx.commit().await)
    }

    pub async fn rollback(self) -> sqlx::Result<()> {
        dispatch!(self, tx => tx.rollback().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use dbmigrate_core::config::DatabaseConfig;
    use tempfile::TempDir;

    async fn sqlite_db(dir: &TempDir) -> Database {
        let config = DatabaseConfig::new(Driver::Sqlite);
        Database::from_config(&config, dir.path()).await.unwrap()
    }

    #[tokio::test]
    async fn test_execute_and_query_scalar() {
        let dir = TempDir::new().unwrap();
        let db = sqlite_db(&dir).await;
        let mut conn = db.acquire().await.unwrap();

        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)").await.unwrap();
        let inserted = conn.execute("INSERT INTO t (id) VALUES (1), (2)").await.unwrap();
        assert_eq!(inserted, 2);

        let max = conn.query_scalar("SELECT MAX(id) FROM t").await.unwrap();
        assert_eq!(max, Some(2));

        let none = conn.query_scalar("SELECT MAX(id) FROM t WHERE id > 5").await.unwrap();
        assert_eq!(none, None);
    }

    #[tokio::test]
    async fn test_transaction_rollback_discards_changes() {
        let dir = TempDir::new().unwrap();
        let db = sqlite_db(&dir).await;
        let mut conn = db.acquire().await.unwrap();
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)").await.unwrap();

        let mut tx = conn.begin().await.unwrap();
        assert_eq!(tx.driver(), Driver::Sqlite);
        tx.execute("INSERT INTO t (id) VALUES (1)").await.unwrap();
        tx.rollback().await.unwrap();

        let count = conn.query_scalar("SELECT COUNT(*) FROM t").await.unwrap();
        assert_eq!(count, Some(0));

        let mut tx = conn.begin().await.unwrap();
        tx.execute("INSERT INTO t (id) VALUES (1)").await.unwrap();
        tx.commit().await.unwrap();

        let count = conn.query_scalar("SELECT COUNT(*) FROM t").await.unwrap();
        assert_eq!(count, Some(1));
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let dir = TempDir::new().unwrap();
        let db = sqlite_db(&dir).await;
        let mut conn = db.acquire().await.unwrap();
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)").await.unwrap();

        {
            let mut tx = conn.begin().await.unwrap();
            tx.execute("INSERT INTO t (id) VALUES (1)").await.unwrap();
        }

        let count = conn.query_scalar("SELECT COUNT(*) FROM t").await.unwrap();
        assert_eq!(count, Some(0));
    }
}
