//! Schema management
//!
//! DuckDB offers no catalog API through the driver that this store relies on,
//! so existence is detected by probing the node table and treating any error
//! as "absent". A version record written next to the graph tables lets a later
//! open tell a compatible store from one written by another layout.

use crate::codec;
use crate::connection::Sql;
use crate::error::{GraphError, GraphResult};
use tracing::{debug, info};

/// Schema version - increment when making schema changes
pub const SCHEMA_VERSION: i32 = 1;

pub const TABLE_NODES: &str = "nodes";
pub const TABLE_EDGES: &str = "edges";
pub const TABLE_PROPERTIES: &str = "properties";
pub const TABLE_SCHEMA_VERSION: &str = "schema_version";

/// Identifier sequence shared by nodes and edges
pub const SEQUENCE_ELEMENTS: &str = "elems_seq";

/// Create the schema on a fresh store, or check the recorded version
pub fn ensure_schema(sql: &Sql<'_>) -> GraphResult<()> {
    if table_exists(sql, TABLE_NODES) {
        let found = recorded_version(sql);
        debug!(?found, expected = SCHEMA_VERSION, "Found existing graph schema");

        if found != Some(SCHEMA_VERSION) {
            return Err(GraphError::IncompatibleSchema {
                found,
                expected: SCHEMA_VERSION,
            });
        }
        return Ok(());
    }

    info!(version = SCHEMA_VERSION, "Creating graph schema");
    create_schema(sql).map_err(|e| GraphError::Schema(format!("Failed to create schema: {}", e)))
}

/// Check for a table with a bounded read; any engine error means "absent"
pub fn table_exists(sql: &Sql<'_>, table: &str) -> bool {
    sql.execute_batch(&format!("SELECT 1 FROM {} LIMIT 1;", table))
        .is_ok()
}

fn recorded_version(sql: &Sql<'_>) -> Option<i32> {
    sql.query_row(
        &format!("SELECT MAX(version) FROM {}", TABLE_SCHEMA_VERSION),
        [],
        |row| row.get::<_, Option<i32>>(0),
    )
    .ok()
    .flatten()
}

fn create_schema(sql: &Sql<'_>) -> GraphResult<()> {
    sql.execute_batch(&format!("CREATE SEQUENCE {};", SEQUENCE_ELEMENTS))?;

    sql.execute_batch(&format!(
        "CREATE TABLE {} (
            id BIGINT PRIMARY KEY,
            label VARCHAR NOT NULL
        );",
        TABLE_NODES
    ))?;
    create_index(sql, TABLE_NODES, "label", &["label"])?;

    sql.execute_batch(&format!(
        "CREATE TABLE {} (
            id BIGINT PRIMARY KEY,
            from_node_id BIGINT NOT NULL,
            to_node_id BIGINT NOT NULL,
            label VARCHAR NOT NULL,
            UNIQUE (from_node_id, to_node_id, label)
        );",
        TABLE_EDGES
    ))?;
    create_index(sql, TABLE_EDGES, "outgoing", &["from_node_id", "label"])?;
    create_index(sql, TABLE_EDGES, "incoming", &["to_node_id", "label"])?;

    sql.execute_batch(&format!(
        "CREATE TABLE {} (
            elem_id BIGINT NOT NULL,
            name VARCHAR NOT NULL,
            {},
            PRIMARY KEY (elem_id, name)
        );",
        TABLE_PROPERTIES,
        codec::table_columns()
    ))?;
    create_index(sql, TABLE_PROPERTIES, "elemid", &["elem_id"])?;

    sql.execute_batch(&format!(
        "CREATE TABLE {} (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT current_timestamp
        );",
        TABLE_SCHEMA_VERSION
    ))?;
    sql.execute(
        &format!("INSERT INTO {} (version) VALUES (?)", TABLE_SCHEMA_VERSION),
        [SCHEMA_VERSION],
    )?;

    info!("Graph schema created");
    Ok(())
}

fn create_index(sql: &Sql<'_>, table: &str, suffix: &str, keys: &[&str]) -> GraphResult<()> {
    sql.execute_batch(&format!(
        "CREATE INDEX {table}_{suffix} ON {table} ({});",
        keys.join(", ")
    ))
}
