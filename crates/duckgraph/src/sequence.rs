//! Identifier allocation backed by an engine sequence
//!
//! Every created node and edge takes one value from the sequence. Values are
//! never cached or handed out in blocks, and never reused after deletes.

use crate::connection::Sql;
use crate::error::{GraphError, GraphResult};

/// Allocates element identifiers from a named DuckDB sequence
#[derive(Debug, Clone)]
pub struct SequenceAllocator {
    next_sql: String,
}

impl SequenceAllocator {
    pub fn new(sequence: &str) -> Self {
        Self {
            next_sql: format!("SELECT nextval('{}')", sequence),
        }
    }

    /// Take the next value from the sequence
    pub fn next_value(&self, sql: &Sql<'_>) -> GraphResult<i64> {
        sql.query_row(&self.next_sql, [], |row| row.get::<_, i64>(0))
            .map_err(|e| GraphError::InvalidOperation(format!("Failed to allocate id: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::connection::GraphConnection;
    use crate::schema;

    #[test]
    fn test_values_strictly_increase() {
        let conn = GraphConnection::memory(&StoreConfig::default()).unwrap();
        let ids = SequenceAllocator::new(schema::SEQUENCE_ELEMENTS);

        let values = conn
            .with_sql(|sql| {
                schema::ensure_schema(sql)?;
                (0..5).map(|_| ids.next_value(sql)).collect::<GraphResult<Vec<_>>>()
            })
            .unwrap();

        assert!(values.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_missing_sequence_fails() {
        let conn = GraphConnection::memory(&StoreConfig::default()).unwrap();
        let ids = SequenceAllocator::new("missing_seq");

        let result = conn.with_sql(|sql| ids.next_value(sql));
        assert!(matches!(result, Err(GraphError::InvalidOperation(_))));
    }
}
