//! Lazy edge and node sequences
//!
//! A query value describes what to fetch; each call to `iter()` starts a new
//! scan. Scans read keyset pages (`id > last ORDER BY id LIMIT n`) so no
//! statement or cursor outlives a single page fetch, and dropping an iterator
//! early leaves nothing open on the connection.

use crate::connection::Sql;
use crate::edge::Edge;
use crate::element::ElementId;
use crate::error::GraphResult;
use crate::node::Node;
use crate::schema::{TABLE_EDGES, TABLE_NODES};
use crate::store::GraphStore;
use duckdb::types::Value as SqlValue;
use duckdb::{params_from_iter, Row};
use std::collections::VecDeque;

/// Which endpoint of an edge the queried node sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The node is the start of the edge
    Outgoing,
    /// The node is the end of the edge
    Incoming,
    /// Outgoing edges first, then incoming ones
    Both,
}

impl Direction {
    fn endpoint_columns(self) -> &'static [&'static str] {
        match self {
            Self::Outgoing => &["from_node_id"],
            Self::Incoming => &["to_node_id"],
            Self::Both => &["from_node_id", "to_node_id"],
        }
    }
}

/// Filter applied in the WHERE clause before the keyset condition
#[derive(Debug, Clone)]
struct Filter {
    clause: String,
    params: Vec<SqlValue>,
}

impl Filter {
    fn new(column: &str, value: SqlValue) -> Self {
        Self {
            clause: format!("{} = ?", column),
            params: vec![value],
        }
    }

    fn and_label(mut self, label: Option<&str>) -> Self {
        if let Some(label) = label {
            self.clause.push_str(" AND label = ?");
            self.params.push(SqlValue::Text(label.to_string()));
        }
        self
    }

    fn count(&self, sql: &Sql<'_>, table: &str) -> GraphResult<u64> {
        let count: i64 = sql.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE {}", table, self.clause),
            params_from_iter(self.params.iter()),
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn page<T>(
        &self,
        sql: &Sql<'_>,
        table: &str,
        columns: &str,
        after: ElementId,
        limit: usize,
        map: impl Fn(&Row<'_>) -> duckdb::Result<T>,
    ) -> GraphResult<Vec<T>> {
        let mut stmt = sql.prepare(&format!(
            "SELECT {} FROM {} WHERE {} AND id > ? ORDER BY id LIMIT {}",
            columns, table, self.clause, limit
        ))?;

        let mut params = self.params.clone();
        params.push(SqlValue::BigInt(after));
        let mut rows = stmt.query(params_from_iter(params))?;

        let mut page = Vec::with_capacity(limit);
        while let Some(row) = rows.next()? {
            page.push(map(row)?);
        }
        Ok(page)
    }
}

/// Raw edge row: id, label, start id, end id
pub(crate) type EdgeRow = (ElementId, String, ElementId, ElementId);

pub(crate) const EDGE_COLUMNS: &str = "id, label, from_node_id, to_node_id";

pub(crate) fn edge_row(row: &Row<'_>) -> duckdb::Result<EdgeRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

/// Edges touching one node, optionally restricted to one label
#[derive(Debug, Clone)]
pub struct EdgeQuery<'g> {
    store: &'g GraphStore,
    node: ElementId,
    direction: Direction,
    label: Option<String>,
}

impl<'g> EdgeQuery<'g> {
    pub(crate) fn new(
        store: &'g GraphStore,
        node: ElementId,
        direction: Direction,
        label: Option<&str>,
    ) -> Self {
        Self {
            store,
            node,
            direction,
            label: label.map(str::to_string),
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    fn filters(&self) -> VecDeque<Filter> {
        self.direction
            .endpoint_columns()
            .iter()
            .map(|column| {
                Filter::new(column, SqlValue::BigInt(self.node)).and_label(self.label.as_deref())
            })
            .collect()
    }

    /// Start a new scan
    pub fn iter(&self) -> EdgeIter<'g> {
        EdgeIter {
            store: self.store,
            filters: self.filters(),
            after: ElementId::MIN,
            buffer: VecDeque::new(),
            page_size: self.store.config().page_size,
        }
    }

    /// Number of matching edges; a self-loop counts once per direction
    pub fn count(&self) -> GraphResult<u64> {
        let filters = self.filters();
        self.store.read(|sql| {
            filters
                .iter()
                .map(|filter| filter.count(sql, TABLE_EDGES))
                .sum()
        })
    }

    /// Run the scan to completion
    pub fn to_vec(&self) -> GraphResult<Vec<Edge<'g>>> {
        self.iter().collect()
    }
}

impl<'g> IntoIterator for &EdgeQuery<'g> {
    type Item = GraphResult<Edge<'g>>;
    type IntoIter = EdgeIter<'g>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// One scan over an [`EdgeQuery`]
pub struct EdgeIter<'g> {
    store: &'g GraphStore,
    filters: VecDeque<Filter>,
    after: ElementId,
    buffer: VecDeque<Edge<'g>>,
    page_size: usize,
}

impl<'g> EdgeIter<'g> {
    fn fetch(&mut self) -> GraphResult<()> {
        while self.buffer.is_empty() {
            let Some(filter) = self.filters.front() else {
                return Ok(());
            };

            let page = self.store.read(|sql| {
                filter.page(sql, TABLE_EDGES, EDGE_COLUMNS, self.after, self.page_size, edge_row)
            })?;

            if page.len() < self.page_size {
                self.filters.pop_front();
                self.after = ElementId::MIN;
            } else if let Some((id, ..)) = page.last() {
                self.after = *id;
            }

            self.buffer.extend(
                page.into_iter()
                    .map(|(id, label, start, end)| Edge::new(self.store, id, label, start, end)),
            );
        }
        Ok(())
    }
}

impl<'g> Iterator for EdgeIter<'g> {
    type Item = GraphResult<Edge<'g>>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Err(e) = self.fetch() {
            self.filters.clear();
            self.buffer.clear();
            return Some(Err(e));
        }
        self.buffer.pop_front().map(Ok)
    }
}

/// Nodes carrying one label
#[derive(Debug, Clone)]
pub struct NodeQuery<'g> {
    store: &'g GraphStore,
    label: String,
}

impl<'g> NodeQuery<'g> {
    pub(crate) fn new(store: &'g GraphStore, label: &str) -> Self {
        Self {
            store,
            label: label.to_string(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn filter(&self) -> Filter {
        Filter::new("label", SqlValue::Text(self.label.clone()))
    }

    /// Number of nodes with this label
    pub fn count(&self) -> GraphResult<u64> {
        let filter = self.filter();
        self.store.read(|sql| filter.count(sql, TABLE_NODES))
    }

    /// Lowest-id node with this label, if any
    pub fn single(&self) -> GraphResult<Option<Node<'g>>> {
        let filter = self.filter();
        let page = self.store.read(|sql| {
            filter.page(sql, TABLE_NODES, "id", ElementId::MIN, 1, |row| row.get::<_, i64>(0))
        })?;
        Ok(page.first().map(|id| Node::new(self.store, *id)))
    }

    /// Start a new scan
    pub fn iter(&self) -> NodeIter<'g> {
        NodeIter {
            store: self.store,
            filter: Some(self.filter()),
            after: ElementId::MIN,
            buffer: VecDeque::new(),
            page_size: self.store.config().page_size,
        }
    }

    pub fn to_vec(&self) -> GraphResult<Vec<Node<'g>>> {
        self.iter().collect()
    }
}

impl<'g> IntoIterator for &NodeQuery<'g> {
    type Item = GraphResult<Node<'g>>;
    type IntoIter = NodeIter<'g>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// One scan over a [`NodeQuery`]
pub struct NodeIter<'g> {
    store: &'g GraphStore,
    filter: Option<Filter>,
    after: ElementId,
    buffer: VecDeque<ElementId>,
    page_size: usize,
}

impl<'g> Iterator for NodeIter<'g> {
    type Item = GraphResult<Node<'g>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() {
            let filter = self.filter.as_ref()?;
            let page = self.store.read(|sql| {
                filter.page(sql, TABLE_NODES, "id", self.after, self.page_size, |row| {
                    row.get::<_, i64>(0)
                })
            });

            match page {
                Ok(page) => {
                    if page.len() < self.page_size {
                        self.filter = None;
                    } else if let Some(id) = page.last() {
                        self.after = *id;
                    }
                    self.buffer.extend(page);
                }
                Err(e) => {
                    self.filter = None;
                    return Some(Err(e));
                }
            }
        }

        self.buffer
            .pop_front()
            .map(|id| Ok(Node::new(self.store, id)))
    }
}
