//! Batch-mode row buffer
//!
//! While the store is in batch mode, rows for newly created nodes and edges
//! (and properties set on them before anything else touches them) are kept
//! here and written with DuckDB appenders, which is far cheaper than one
//! prepared INSERT per row. The buffer must be flushed before any statement
//! that could observe or conflict with its rows.

use crate::codec;
use crate::connection::Sql;
use crate::error::GraphResult;
use crate::schema::{TABLE_EDGES, TABLE_NODES, TABLE_PROPERTIES};
use crate::value::PropertyValue;
use duckdb::types::Value as SqlValue;
use duckdb::ToSql;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
struct PendingEdge {
    id: i64,
    from: i64,
    to: i64,
    label: String,
}

/// Rows waiting to be appended
#[derive(Debug, Default)]
pub struct BatchBuffer {
    nodes: Vec<(i64, String)>,
    edges: Vec<PendingEdge>,
    edge_index: HashMap<(i64, i64, String), i64>,
    pending_ids: HashSet<i64>,
    properties: BTreeMap<(i64, String), PropertyValue>,
}

impl BatchBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffered rows across all tables
    pub fn len(&self) -> usize {
        self.nodes.len() + self.edges.len() + self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the element was created in this batch and not yet flushed
    pub fn is_pending(&self, id: i64) -> bool {
        self.pending_ids.contains(&id)
    }

    pub fn push_node(&mut self, id: i64, label: &str) {
        self.nodes.push((id, label.to_string()));
        self.pending_ids.insert(id);
    }

    pub fn push_edge(&mut self, id: i64, from: i64, to: i64, label: &str) {
        self.edge_index.insert((from, to, label.to_string()), id);
        self.edges.push(PendingEdge {
            id,
            from,
            to,
            label: label.to_string(),
        });
        self.pending_ids.insert(id);
    }

    /// Id of a buffered edge with the same endpoints and label
    pub fn find_edge(&self, from: i64, to: i64, label: &str) -> Option<i64> {
        self.edge_index
            .get(&(from, to, label.to_string()))
            .copied()
    }

    /// Set or overwrite a property of a pending element
    pub fn put_property(&mut self, id: i64, name: &str, value: PropertyValue) {
        self.properties.insert((id, name.to_string()), value);
    }

    pub fn remove_property(&mut self, id: i64, name: &str) {
        self.properties.remove(&(id, name.to_string()));
    }

    /// Append every buffered row, then clear the buffer
    pub fn flush(&mut self, sql: &Sql<'_>) -> GraphResult<usize> {
        let rows = self.len();
        if rows == 0 {
            return Ok(0);
        }

        if !self.nodes.is_empty() {
            let mut appender = sql.appender(TABLE_NODES)?;
            for (id, label) in &self.nodes {
                appender.append_row(duckdb::params![id, label])?;
            }
            appender.flush()?;
        }

        if !self.edges.is_empty() {
            let mut appender = sql.appender(TABLE_EDGES)?;
            for edge in &self.edges {
                appender.append_row(duckdb::params![edge.id, edge.from, edge.to, edge.label])?;
            }
            appender.flush()?;
        }

        if !self.properties.is_empty() {
            let mut appender = sql.appender(TABLE_PROPERTIES)?;
            for ((id, name), value) in &self.properties {
                let mut row = vec![SqlValue::BigInt(*id), SqlValue::Text(name.clone())];
                row.extend(codec::encode_columns(value)?);
                let params: Vec<&dyn ToSql> = row.iter().map(|v| v as &dyn ToSql).collect();
                appender.append_row(params.as_slice())?;
            }
            appender.flush()?;
        }

        debug!(rows, "Flushed batch buffer");
        self.clear();
        Ok(rows)
    }

    /// Drop every buffered row without writing it
    pub fn discard(&mut self) -> usize {
        let rows = self.len();
        self.clear();
        rows
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.edge_index.clear();
        self.pending_ids.clear();
        self.properties.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::connection::GraphConnection;
    use crate::schema;

    fn setup() -> GraphConnection {
        let conn = GraphConnection::memory(&StoreConfig::default()).unwrap();
        conn.with_sql(schema::ensure_schema).unwrap();
        conn
    }

    fn count(conn: &GraphConnection, table: &str) -> i64 {
        conn.with_sql(|sql| {
            sql.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
        })
        .unwrap()
    }

    #[test]
    fn test_flush_appends_all_tables() {
        let conn = setup();
        let mut buffer = BatchBuffer::new();
        buffer.push_node(1, "A");
        buffer.push_node(2, "B");
        buffer.push_edge(3, 1, 2, "rel");
        buffer.put_property(1, "k", PropertyValue::Long(42));
        buffer.put_property(3, "w", PropertyValue::Double(0.5));
        assert_eq!(buffer.len(), 5);

        let written = conn.with_sql(|sql| buffer.flush(sql)).unwrap();
        assert_eq!(written, 5);
        assert!(buffer.is_empty());
        assert!(!buffer.is_pending(1));

        assert_eq!(count(&conn, TABLE_NODES), 2);
        assert_eq!(count(&conn, TABLE_EDGES), 1);
        assert_eq!(count(&conn, TABLE_PROPERTIES), 2);
    }

    #[test]
    fn test_property_overwrite_keeps_one_row() {
        let conn = setup();
        let mut buffer = BatchBuffer::new();
        buffer.push_node(1, "A");
        buffer.put_property(1, "k", PropertyValue::String("hello".into()));
        buffer.put_property(1, "k", PropertyValue::Double(2.75));
        conn.with_sql(|sql| buffer.flush(sql)).unwrap();

        let (string, double): (Option<String>, Option<f64>) = conn
            .with_sql(|sql| {
                sql.query_row(
                    "SELECT value_string, value_double FROM properties WHERE elem_id = 1",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
            })
            .unwrap();
        assert_eq!(string, None);
        assert_eq!(double, Some(2.75));
    }

    #[test]
    fn test_find_edge_and_remove_property() {
        let mut buffer = BatchBuffer::new();
        buffer.push_edge(7, 1, 2, "rel");
        assert_eq!(buffer.find_edge(1, 2, "rel"), Some(7));
        assert_eq!(buffer.find_edge(2, 1, "rel"), None);

        buffer.put_property(7, "k", PropertyValue::Boolean(true));
        buffer.remove_property(7, "k");
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_discard() {
        let mut buffer = BatchBuffer::new();
        buffer.push_node(1, "A");
        buffer.put_property(1, "k", PropertyValue::Integer(1));
        assert_eq!(buffer.discard(), 2);
        assert!(buffer.is_empty());
    }
}
