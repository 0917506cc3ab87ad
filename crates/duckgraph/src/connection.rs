//! DuckDB connection management
//!
//! The store owns exactly one long-lived connection. It sits behind a mutex
//! and is only reachable through [`GraphConnection::with_sql`], which hands out
//! a [`Sql`] wrapper that logs statements when `debug_sql` is enabled.

use crate::config::StoreConfig;
use crate::error::{GraphError, GraphResult};
use duckdb::{Appender, Connection, Params, Row, Statement};
use parking_lot::Mutex;
use std::path::Path;
use tracing::{debug, info};

/// Thread-safe wrapper around the store's single connection
pub struct GraphConnection {
    conn: Mutex<Connection>,
    debug_sql: bool,
}

impl GraphConnection {
    /// Open (or create) the database file at `path`
    pub fn open(path: &Path, config: &StoreConfig) -> GraphResult<Self> {
        info!(path = ?path, "Opening DuckDB connection");

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                GraphError::Connection(format!("Failed to create directory: {}", e))
            })?;
        }

        let conn = Connection::open(path)
            .map_err(|e| GraphError::Connection(format!("Failed to open {:?}: {}", path, e)))?;
        Self::configure(conn, config)
    }

    /// Open a private in-memory database
    pub fn memory(config: &StoreConfig) -> GraphResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| GraphError::Connection(format!("Failed to open in-memory db: {}", e)))?;
        Self::configure(conn, config)
    }

    fn configure(conn: Connection, config: &StoreConfig) -> GraphResult<Self> {
        let graph_conn = Self {
            conn: Mutex::new(conn),
            debug_sql: config.debug_sql,
        };

        graph_conn.with_sql(|sql| {
            for setting in config.engine_settings() {
                sql.execute_batch(&setting)?;
            }
            Ok(())
        })?;

        Ok(graph_conn)
    }

    /// Execute a closure with the connection
    pub fn with_sql<F, T>(&self, f: F) -> GraphResult<T>
    where
        F: FnOnce(&Sql<'_>) -> GraphResult<T>,
    {
        let conn = self.conn.lock();
        let sql = Sql {
            conn: &conn,
            debug_sql: self.debug_sql,
        };
        f(&sql)
    }

    /// Close the connection, reporting engine errors instead of dropping them
    pub fn close(self) -> GraphResult<()> {
        self.conn
            .into_inner()
            .close()
            .map_err(|(_, e)| GraphError::Connection(format!("Failed to close connection: {}", e)))
    }
}

/// Borrowed connection handed to [`GraphConnection::with_sql`] closures
pub struct Sql<'c> {
    conn: &'c Connection,
    debug_sql: bool,
}

impl<'c> Sql<'c> {
    /// Raw connection, bypassing statement logging
    pub fn connection(&self) -> &'c Connection {
        self.conn
    }

    pub fn execute<P: Params>(&self, sql: &str, params: P) -> GraphResult<usize> {
        self.trace(sql);
        Ok(self.conn.execute(sql, params)?)
    }

    pub fn execute_batch(&self, sql: &str) -> GraphResult<()> {
        self.trace(sql);
        Ok(self.conn.execute_batch(sql)?)
    }

    pub fn prepare(&self, sql: &str) -> GraphResult<Statement<'c>> {
        self.trace(sql);
        Ok(self.conn.prepare(sql)?)
    }

    pub fn query_row<T, P, F>(&self, sql: &str, params: P, f: F) -> GraphResult<T>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> duckdb::Result<T>,
    {
        self.trace(sql);
        Ok(self.conn.query_row(sql, params, f)?)
    }

    /// Bulk-append rows to `table`
    pub fn appender(&self, table: &str) -> GraphResult<Appender<'c>> {
        if self.debug_sql {
            debug!(target: "duckgraph::sql", table, "APPEND");
        }
        Ok(self.conn.appender(table)?)
    }

    fn trace(&self, sql: &str) {
        if self.debug_sql {
            debug!(target: "duckgraph::sql", "{}", sql.trim());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_connection() {
        let conn = GraphConnection::memory(&StoreConfig::default()).unwrap();

        let result: i64 = conn
            .with_sql(|sql| sql.query_row("SELECT 1 + 1", [], |row| row.get(0)))
            .unwrap();
        assert_eq!(result, 2);
    }

    #[test]
    fn test_file_connection_creates_parent() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("nested").join("graph.duckdb");

        let conn = GraphConnection::open(&db_path, &StoreConfig::default()).unwrap();
        conn.with_sql(|sql| sql.execute_batch("CREATE TABLE t (x INTEGER);"))
            .unwrap();
        conn.close().unwrap();

        assert!(db_path.exists());
    }

    #[test]
    fn test_engine_settings_applied() {
        let config = StoreConfig::new().with_threads(1);
        let conn = GraphConnection::memory(&config).unwrap();

        let threads: i64 = conn
            .with_sql(|sql| {
                sql.query_row("SELECT current_setting('threads')", [], |row| row.get(0))
            })
            .unwrap();
        assert_eq!(threads, 1);
    }

    #[test]
    fn test_debug_sql_does_not_change_results() {
        let conn = GraphConnection::memory(&StoreConfig::new().with_debug_sql(true)).unwrap();
        let changed = conn
            .with_sql(|sql| {
                sql.execute_batch("CREATE TABLE t (x INTEGER);")?;
                sql.execute("INSERT INTO t VALUES (?)", [5])
            })
            .unwrap();
        assert_eq!(changed, 1);
    }
}
