//! Graph store façade
//!
//! [`GraphStore`] owns the connection, the transaction controller and the
//! batch buffer. Every statement goes through [`GraphStore::read`] or
//! [`GraphStore::write`], which flush buffered batch rows first so reads
//! always see earlier writes.
//!
//! Locks are always taken connection first, then batch buffer or mode.

use crate::batch::BatchBuffer;
use crate::config::StoreConfig;
use crate::connection::{GraphConnection, Sql};
use crate::edge::Edge;
use crate::element::{ElementId, PropertyMap};
use crate::error::{GraphError, GraphResult};
use crate::node::Node;
use crate::query::{edge_row, NodeQuery, EDGE_COLUMNS};
use crate::schema::{self, TABLE_EDGES, TABLE_NODES, TABLE_PROPERTIES};
use crate::sequence::SequenceAllocator;
use crate::transaction::{Transaction, TransactionController, TxState};
use crate::value::PropertyValue;
use duckdb::params;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Name reported by [`GraphStore::human_readable_name`]
pub const HUMAN_READABLE_NAME: &str = "DuckDB Graph Database";

/// Name of the scratch directory inside the storage folder
pub const TEMP_DIR_NAME: &str = "temp";

/// How mutations reach the tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Every mutation is a statement inside the open transaction
    Transactional,
    /// New rows are buffered and appended in bulk
    Batch,
}

/// Row counts of the graph tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GraphStats {
    pub nodes: u64,
    pub edges: u64,
    pub properties: u64,
}

/// A property graph stored in DuckDB tables
pub struct GraphStore {
    conn: GraphConnection,
    tx: TransactionController,
    ids: SequenceAllocator,
    batch: Mutex<BatchBuffer>,
    mode: Mutex<Mode>,
    config: StoreConfig,
    folder: Option<PathBuf>,
}

impl GraphStore {
    /// Open the store in `folder`, creating the folder and schema if needed
    ///
    /// The store opens with a transaction already running.
    pub fn open(folder: impl AsRef<Path>, config: StoreConfig) -> GraphResult<Self> {
        config.validate()?;

        // The connection creates the folder as the database file's parent
        let folder = folder.as_ref().to_path_buf();
        let conn = GraphConnection::open(&folder.join(&config.database_file), &config)?;
        let store = Self::init(conn, config, Some(folder))?;
        info!(path = ?store.folder, "Graph store opened");
        Ok(store)
    }

    /// Open a private in-memory store with no storage folder
    pub fn open_in_memory(config: StoreConfig) -> GraphResult<Self> {
        config.validate()?;
        let conn = GraphConnection::memory(&config)?;
        Self::init(conn, config, None)
    }

    fn init(conn: GraphConnection, config: StoreConfig, folder: Option<PathBuf>) -> GraphResult<Self> {
        // Schema DDL runs in autocommit so it is visible before the first transaction
        let tx = conn.with_sql(|sql| {
            schema::ensure_schema(sql)?;
            TransactionController::start(sql)
        })?;

        Ok(Self {
            conn,
            tx,
            ids: SequenceAllocator::new(schema::SEQUENCE_ELEMENTS),
            batch: Mutex::new(BatchBuffer::new()),
            mode: Mutex::new(Mode::Transactional),
            config,
            folder,
        })
    }

    /// Close the connection
    ///
    /// Uncommitted work, including batch rows never flushed, is discarded.
    pub fn shutdown(self) -> GraphResult<()> {
        let dropped = self.batch.lock().discard();
        if dropped > 0 {
            warn!(rows = dropped, "Discarding unflushed batch rows on shutdown");
        }
        if self.tx.is_active() {
            debug!("Shutting down with an open transaction");
        }

        self.conn.close()?;
        info!(path = ?self.folder, "Graph store shut down");
        Ok(())
    }

    /// Shut down, then remove the storage folder and everything in it
    pub fn delete(self) -> GraphResult<()> {
        let folder = self.folder.clone();
        self.shutdown()?;

        if let Some(folder) = folder {
            std::fs::remove_dir_all(&folder)?;
            info!(path = ?folder, "Deleted graph store");
        }
        Ok(())
    }

    /// Storage folder, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.folder.as_deref()
    }

    /// Scratch directory inside the storage folder; not created here
    pub fn temp_dir(&self) -> Option<PathBuf> {
        self.folder.as_ref().map(|folder| folder.join(TEMP_DIR_NAME))
    }

    pub fn human_readable_name(&self) -> &'static str {
        HUMAN_READABLE_NAME
    }

    /// Mutations are always transactional, batch mode included
    pub fn is_transactional(&self) -> bool {
        true
    }

    pub fn current_mode(&self) -> Mode {
        *self.mode.lock()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn transaction_state(&self) -> TxState {
        self.tx.state()
    }

    // ---- transactions and modes ----

    /// Leave batch mode if needed, begin a transaction and return its handle
    pub fn begin_transaction(&self) -> GraphResult<Transaction<'_>> {
        if self.current_mode() == Mode::Batch {
            self.exit_batch_mode()?;
        }
        self.begin()?;
        Ok(Transaction::new(self))
    }

    pub(crate) fn begin(&self) -> GraphResult<()> {
        self.conn.with_sql(|sql| self.tx.begin(sql))
    }

    /// Flush buffered rows and commit; failures are logged
    ///
    /// A failed flush rolls the whole transaction back instead, so rows
    /// appended before the failure are never committed on their own.
    pub(crate) fn commit(&self) {
        let result = self.conn.with_sql(|sql| {
            match self.flush_pending(sql) {
                Ok(()) => self.tx.success(sql),
                Err(e) => {
                    error!(error = %e, "Failed to flush batch rows, rolling back instead of committing");
                    self.tx.failure(sql);
                }
            }
            Ok(())
        });
        if let Err(e) = result {
            error!(error = %e, "Commit failed");
        }
    }

    /// Drop buffered rows and roll back; failures are logged
    pub(crate) fn rollback(&self) {
        let result = self.conn.with_sql(|sql| {
            let dropped = self.batch.lock().discard();
            if dropped > 0 {
                debug!(rows = dropped, "Discarded batch rows on rollback");
            }
            self.tx.failure(sql);
            Ok(())
        });
        if let Err(e) = result {
            error!(error = %e, "Rollback failed");
        }
    }

    /// Start buffering new rows for bulk appends
    pub fn enter_batch_mode(&self) {
        let mut mode = self.mode.lock();
        if *mode != Mode::Batch {
            *mode = Mode::Batch;
            info!("Entered batch mode");
        }
    }

    /// Flush buffered rows and return to per-statement writes
    pub fn exit_batch_mode(&self) -> GraphResult<()> {
        {
            let mut mode = self.mode.lock();
            if *mode == Mode::Transactional {
                return Ok(());
            }
            *mode = Mode::Transactional;
        }

        self.conn.with_sql(|sql| self.flush_pending(sql))?;
        info!("Exited batch mode");
        Ok(())
    }

    // ---- statement access ----

    /// Run read statements after flushing buffered rows
    pub(crate) fn read<F, T>(&self, f: F) -> GraphResult<T>
    where
        F: FnOnce(&Sql<'_>) -> GraphResult<T>,
    {
        self.conn.with_sql(|sql| {
            self.flush_pending(sql)?;
            f(sql)
        })
    }

    /// Run mutating statements inside a transaction, beginning one if needed
    pub(crate) fn write<F, T>(&self, f: F) -> GraphResult<T>
    where
        F: FnOnce(&Sql<'_>) -> GraphResult<T>,
    {
        self.conn.with_sql(|sql| {
            self.flush_pending(sql)?;
            self.tx.begin(sql)?;
            f(sql)
        })
    }

    /// Run arbitrary statements on the store's connection
    ///
    /// Buffered batch rows are flushed first. The closure shares the store's
    /// transaction; committing or rolling back from here desynchronizes it.
    pub fn with_connection<F, T>(&self, f: F) -> GraphResult<T>
    where
        F: FnOnce(&Sql<'_>) -> GraphResult<T>,
    {
        self.read(f)
    }

    /// Buffer a property write for an element created in the current batch
    ///
    /// Returns `false` when the element is not buffered and the write must go
    /// to the properties table.
    pub(crate) fn buffer_property(
        &self,
        id: ElementId,
        name: &str,
        value: Option<&PropertyValue>,
    ) -> GraphResult<bool> {
        if self.current_mode() != Mode::Batch {
            return Ok(false);
        }

        {
            let mut batch = self.batch.lock();
            if !batch.is_pending(id) {
                return Ok(false);
            }
            match value {
                Some(value) => batch.put_property(id, name, value.clone()),
                None => batch.remove_property(id, name),
            }
        }

        self.flush_if_full()?;
        Ok(true)
    }

    fn flush_pending(&self, sql: &Sql<'_>) -> GraphResult<()> {
        let mut batch = self.batch.lock();
        if batch.is_empty() {
            return Ok(());
        }

        if let Err(e) = batch.flush(sql) {
            let dropped = batch.discard();
            warn!(rows = dropped, "Dropped batch rows after failed flush");
            return Err(e);
        }
        Ok(())
    }

    fn flush_if_full(&self) -> GraphResult<()> {
        let full = self.batch.lock().len() >= self.config.batch_flush_threshold;
        if full {
            self.conn.with_sql(|sql| self.flush_pending(sql))?;
        }
        Ok(())
    }

    // ---- element creation ----

    /// Create a node with `label`, then set each of `properties` on it
    ///
    /// If a property fails the node row stays in the open transaction; call
    /// `failure()` on the transaction to undo it.
    pub fn create_node(&self, label: &str, properties: &PropertyMap) -> GraphResult<Node<'_>> {
        let id = if self.current_mode() == Mode::Batch {
            let id = self.conn.with_sql(|sql| {
                self.tx.begin(sql)?;
                self.ids.next_value(sql)
            })?;
            self.batch.lock().push_node(id, label);
            id
        } else {
            self.write(|sql| {
                let id = self.ids.next_value(sql)?;
                sql.execute(
                    &format!("INSERT INTO {} (id, label) VALUES (?, ?)", TABLE_NODES),
                    params![id, label],
                )?;
                Ok(id)
            })?
        };

        let node = Node::new(self, id);
        node.element().apply_properties(properties)?;
        self.flush_if_full()?;
        Ok(node)
    }

    /// Create an edge from `start` to `end`, or return the existing one
    ///
    /// At most one edge exists per (start, end, label). When it already exists
    /// the given properties are set on it, overwriting values of the same name.
    pub fn create_relationship(
        &self,
        start: &Node<'_>,
        end: &Node<'_>,
        label: &str,
        properties: &PropertyMap,
    ) -> GraphResult<Edge<'_>> {
        let (from, to) = (start.id(), end.id());

        let id = if self.current_mode() == Mode::Batch {
            let buffered = self.batch.lock().find_edge(from, to, label);
            match buffered {
                Some(id) => id,
                None => {
                    // Buffered edges were checked above, so the table lookup needs no flush
                    let (id, created) = self.conn.with_sql(|sql| {
                        self.tx.begin(sql)?;
                        match find_edge(sql, from, to, label)? {
                            Some(id) => Ok((id, false)),
                            None => Ok((self.ids.next_value(sql)?, true)),
                        }
                    })?;
                    if created {
                        self.batch.lock().push_edge(id, from, to, label);
                    }
                    id
                }
            }
        } else {
            self.write(|sql| {
                if let Some(id) = find_edge(sql, from, to, label)? {
                    debug!(edge = id, label, "Edge already exists");
                    return Ok(id);
                }

                let id = self.ids.next_value(sql)?;
                sql.execute(
                    &format!(
                        "INSERT INTO {} (id, from_node_id, to_node_id, label) VALUES (?, ?, ?, ?)",
                        TABLE_EDGES
                    ),
                    params![id, from, to, label],
                )?;
                Ok(id)
            })?
        };

        let edge = Edge::new(self, id, label.to_string(), from, to);
        edge.element().apply_properties(properties)?;
        self.flush_if_full()?;
        Ok(edge)
    }

    // ---- lookups ----

    /// Handle for node `id`; the node is not checked for existence
    pub fn node(&self, id: ElementId) -> Node<'_> {
        Node::new(self, id)
    }

    /// Handle for a node id given in decimal text
    pub fn node_by_str(&self, id: &str) -> GraphResult<Node<'_>> {
        let id = id
            .trim()
            .parse::<ElementId>()
            .map_err(|e| GraphError::InvalidOperation(format!("Invalid node id '{}': {}", id, e)))?;
        Ok(self.node(id))
    }

    /// Edge `id`, if it exists
    pub fn edge(&self, id: ElementId) -> GraphResult<Option<Edge<'_>>> {
        let row = self.read(|sql| {
            let mut stmt = sql.prepare(&format!(
                "SELECT {} FROM {} WHERE id = ?",
                EDGE_COLUMNS, TABLE_EDGES
            ))?;
            let mut rows = stmt.query([id])?;
            match rows.next()? {
                Some(row) => Ok(Some(edge_row(row)?)),
                None => Ok(None),
            }
        })?;

        Ok(row.map(|(id, label, start, end)| Edge::new(self, id, label, start, end)))
    }

    /// Nodes carrying `label`
    pub fn all_nodes(&self, label: &str) -> NodeQuery<'_> {
        NodeQuery::new(self, label)
    }

    /// Row counts of the node, edge and property tables
    pub fn stats(&self) -> GraphResult<GraphStats> {
        self.read(|sql| {
            let count = |table: &str| -> GraphResult<u64> {
                let n: i64 = sql.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?;
                Ok(n as u64)
            };

            Ok(GraphStats {
                nodes: count(TABLE_NODES)?,
                edges: count(TABLE_EDGES)?,
                properties: count(TABLE_PROPERTIES)?,
            })
        })
    }

    // ---- index lookups owned by the indexing layer ----

    pub fn node_index_exists(&self, name: &str) -> GraphResult<bool> {
        Err(GraphError::Unsupported(format!(
            "node index '{}' lookup is provided by the indexing layer",
            name
        )))
    }

    pub fn node_index_names(&self) -> GraphResult<Vec<String>> {
        Err(GraphError::Unsupported(
            "node index listing is provided by the indexing layer".into(),
        ))
    }

    pub fn known_metamodel_uris(&self) -> GraphResult<Vec<String>> {
        Err(GraphError::Unsupported(
            "metamodel index is provided by the indexing layer".into(),
        ))
    }
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore")
            .field("folder", &self.folder)
            .field("mode", &self.current_mode())
            .field("transaction", &self.tx.state())
            .finish()
    }
}

/// Id of the edge with these endpoints and label
fn find_edge(sql: &Sql<'_>, from: ElementId, to: ElementId, label: &str) -> GraphResult<Option<ElementId>> {
    let mut stmt = sql.prepare(&format!(
        "SELECT id FROM {} WHERE from_node_id = ? AND to_node_id = ? AND label = ?",
        TABLE_EDGES
    ))?;
    let mut rows = stmt.query(params![from, to, label])?;
    match rows.next()? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> GraphStore {
        GraphStore::open_in_memory(StoreConfig::default()).unwrap()
    }

    fn props(entries: &[(&str, PropertyValue)]) -> PropertyMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_opens_active_and_transactional() {
        let store = store();
        assert_eq!(store.transaction_state(), TxState::Active);
        assert_eq!(store.current_mode(), Mode::Transactional);
        assert!(store.is_transactional());
        assert!(store.path().is_none());
        assert!(store.temp_dir().is_none());
    }

    #[test]
    fn test_create_node_with_properties() {
        let store = store();
        let node = store
            .create_node("Person", &props(&[("name", "ada".into()), ("age", 36i32.into())]))
            .unwrap();

        assert_eq!(node.property("name").unwrap(), Some(PropertyValue::String("ada".into())));
        assert_eq!(node.property("age").unwrap(), Some(PropertyValue::Integer(36)));
    }

    #[test]
    fn test_ids_are_unique_across_kinds() {
        let store = store();
        let empty = PropertyMap::new();
        let a = store.create_node("X", &empty).unwrap();
        let b = store.create_node("X", &empty).unwrap();
        let e = store.create_relationship(&a, &b, "rel", &empty).unwrap();

        assert!(a.id() < b.id());
        assert!(b.id() < e.id());
    }

    #[test]
    fn test_relationship_dedupe_applies_properties() {
        let store = store();
        let empty = PropertyMap::new();
        let a = store.create_node("X", &empty).unwrap();
        let b = store.create_node("Y", &empty).unwrap();

        let first = store
            .create_relationship(&a, &b, "rel", &props(&[("w", 1i32.into())]))
            .unwrap();
        let second = store
            .create_relationship(&a, &b, "rel", &props(&[("w", 2i32.into()), ("x", true.into())]))
            .unwrap();

        assert_eq!(first.id(), second.id());
        assert_eq!(store.stats().unwrap().edges, 1);
        assert_eq!(first.property("w").unwrap(), Some(PropertyValue::Integer(2)));
        assert_eq!(first.property("x").unwrap(), Some(PropertyValue::Boolean(true)));

        // Different label is a different edge
        let other = store.create_relationship(&a, &b, "other", &empty).unwrap();
        assert_ne!(other.id(), first.id());
    }

    #[test]
    fn test_edge_lookup() {
        let store = store();
        let empty = PropertyMap::new();
        let a = store.create_node("X", &empty).unwrap();
        let b = store.create_node("Y", &empty).unwrap();
        let edge = store.create_relationship(&a, &b, "rel", &empty).unwrap();

        let found = store.edge(edge.id()).unwrap().unwrap();
        assert_eq!(found, edge);
        assert!(store.edge(a.id()).unwrap().is_none());
    }

    #[test]
    fn test_node_by_str() {
        let store = store();
        let node = store.create_node("X", &PropertyMap::new()).unwrap();

        assert_eq!(store.node_by_str(&node.id().to_string()).unwrap(), node);
        assert!(matches!(
            store.node_by_str("not-a-number"),
            Err(GraphError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_all_nodes() {
        let store = GraphStore::open_in_memory(StoreConfig::default().with_page_size(2)).unwrap();
        let empty = PropertyMap::new();
        let ids: Vec<_> = (0..5)
            .map(|_| store.create_node("Type", &empty).unwrap().id())
            .collect();
        store.create_node("Other", &empty).unwrap();

        let query = store.all_nodes("Type");
        assert_eq!(query.count().unwrap(), 5);
        assert_eq!(query.single().unwrap().map(|n| n.id()), Some(ids[0]));

        let scanned: Vec<_> = query.iter().map(|n| n.unwrap().id()).collect();
        assert_eq!(scanned, ids);
        assert!(store.all_nodes("Missing").single().unwrap().is_none());
    }

    #[test]
    fn test_rollback_discards_and_next_write_begins() {
        let store = store();
        let empty = PropertyMap::new();
        let tx = store.begin_transaction().unwrap();
        store.create_node("X", &empty).unwrap();
        tx.failure();
        assert_eq!(store.transaction_state(), TxState::Inactive);
        assert_eq!(store.stats().unwrap().nodes, 0);

        store.create_node("X", &empty).unwrap();
        assert_eq!(store.transaction_state(), TxState::Active);
        tx.success();
        assert_eq!(store.stats().unwrap().nodes, 1);
    }

    #[test]
    fn test_batch_mode_buffers_until_read() {
        let store = store();
        store.enter_batch_mode();
        assert_eq!(store.current_mode(), Mode::Batch);

        let a = store
            .create_node("X", &props(&[("k", 1i64.into())]))
            .unwrap();
        let b = store.create_node("Y", &PropertyMap::new()).unwrap();
        let e1 = store
            .create_relationship(&a, &b, "rel", &PropertyMap::new())
            .unwrap();
        let e2 = store
            .create_relationship(&a, &b, "rel", &PropertyMap::new())
            .unwrap();
        assert_eq!(e1.id(), e2.id());
        assert_eq!(store.batch.lock().len(), 4);

        // Reads flush first
        assert_eq!(a.property("k").unwrap(), Some(PropertyValue::Long(1)));
        assert!(store.batch.lock().is_empty());
        assert_eq!(a.outgoing().to_vec().unwrap(), vec![e1]);

        // Edge uniqueness also holds against flushed rows
        let e3 = store
            .create_relationship(&a, &b, "rel", &PropertyMap::new())
            .unwrap();
        assert_eq!(e3.id(), e2.id());

        store.exit_batch_mode().unwrap();
        assert_eq!(store.current_mode(), Mode::Transactional);
    }

    #[test]
    fn test_batch_threshold_flushes() {
        let config = StoreConfig::default().with_batch_flush_threshold(3);
        let store = GraphStore::open_in_memory(config).unwrap();
        store.enter_batch_mode();

        for _ in 0..3 {
            store.create_node("X", &PropertyMap::new()).unwrap();
        }
        assert!(store.batch.lock().is_empty());
    }

    #[test]
    fn test_failed_flush_rolls_back_on_commit() {
        let store = store();
        store.begin_transaction().unwrap().success();

        store.enter_batch_mode();
        let node = store
            .create_node("X", &props(&[("k", 1i32.into())]))
            .unwrap();

        // Occupy the buffered property's key without flushing the buffer
        store
            .conn
            .with_sql(|sql| {
                sql.execute(
                    "INSERT INTO properties (elem_id, name, value_long) VALUES (?, 'k', 7)",
                    [node.id()],
                )
            })
            .unwrap();

        store.commit();

        assert_eq!(store.transaction_state(), TxState::Inactive);
        assert!(store.batch.lock().is_empty());
        let stats = store.stats().unwrap();
        assert_eq!(stats.nodes, 0);
        assert_eq!(stats.properties, 0);

        // The store keeps working after the rollback
        store.exit_batch_mode().unwrap();
        store.create_node("Y", &PropertyMap::new()).unwrap();
        store.commit();
        assert_eq!(store.stats().unwrap().nodes, 1);
    }

    #[test]
    fn test_open_creates_missing_folders() {
        let dir = tempfile::TempDir::new().unwrap();
        let folder = dir.path().join("a").join("b");

        let store = GraphStore::open(&folder, StoreConfig::default()).unwrap();
        assert!(folder.join(crate::config::DEFAULT_DATABASE_FILE).exists());
        store.shutdown().unwrap();
    }

    #[test]
    fn test_begin_transaction_exits_batch_mode() {
        let store = store();
        store.enter_batch_mode();
        store.create_node("X", &PropertyMap::new()).unwrap();

        let tx = store.begin_transaction().unwrap();
        assert_eq!(store.current_mode(), Mode::Transactional);
        assert!(tx.is_active());
        assert!(store.batch.lock().is_empty());
        tx.close();
    }

    #[test]
    fn test_rollback_discards_batch_rows() {
        let store = store();
        store.enter_batch_mode();
        store.create_node("X", &PropertyMap::new()).unwrap();

        store.rollback();
        assert!(store.batch.lock().is_empty());
        assert_eq!(store.stats().unwrap().nodes, 0);
    }

    #[test]
    fn test_index_lookups_are_unsupported() {
        let store = store();
        assert!(matches!(store.node_index_exists("idx"), Err(GraphError::Unsupported(_))));
        assert!(matches!(store.node_index_names(), Err(GraphError::Unsupported(_))));
        assert!(matches!(store.known_metamodel_uris(), Err(GraphError::Unsupported(_))));
    }

    #[test]
    fn test_debug_output() {
        let store = store();
        let rendered = format!("{:?}", store);
        assert!(rendered.contains("Transactional"));
        assert!(rendered.contains("Active"));
    }
}
