//! Node handles

use crate::element::{self, delete_properties, Element, ElementId};
use crate::error::GraphResult;
use crate::query::{Direction, EdgeQuery};
use crate::schema::{TABLE_EDGES, TABLE_NODES};
use crate::store::GraphStore;
use crate::value::PropertyValue;
use duckdb::params;
use std::collections::BTreeSet;
use tracing::debug;

/// A node in the graph, addressed by id
///
/// Handles are cheap to copy and hold no node state; the label, properties
/// and edges are read from the store on every call.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Node<'g> {
    element: Element<'g>,
}

impl<'g> Node<'g> {
    pub(crate) fn new(store: &'g GraphStore, id: ElementId) -> Self {
        Self {
            element: Element::new(store, id),
        }
    }

    pub fn id(&self) -> ElementId {
        self.element.id()
    }

    /// Property access for this node
    pub fn element(&self) -> Element<'g> {
        self.element
    }

    pub fn store(&self) -> &'g GraphStore {
        self.element.store()
    }

    /// The node's label, `None` if the node does not exist
    pub fn label(&self) -> GraphResult<Option<String>> {
        self.store().read(|sql| {
            let mut stmt = sql.prepare(&format!("SELECT label FROM {} WHERE id = ?", TABLE_NODES))?;
            let mut rows = stmt.query([self.id()])?;
            match rows.next()? {
                Some(row) => Ok(Some(row.get(0)?)),
                None => Ok(None),
            }
        })
    }

    pub fn exists(&self) -> GraphResult<bool> {
        self.store()
            .read(|sql| element::row_exists(sql, TABLE_NODES, self.id()))
    }

    pub fn property_keys(&self) -> GraphResult<BTreeSet<String>> {
        self.element.property_keys()
    }

    pub fn property(&self, name: &str) -> GraphResult<Option<PropertyValue>> {
        self.element.property(name)
    }

    pub fn set_property(&self, name: &str, value: impl Into<PropertyValue>) -> GraphResult<()> {
        self.element.set_property(name, value)
    }

    pub fn put_property(&self, name: &str, value: Option<PropertyValue>) -> GraphResult<()> {
        self.element.put_property(name, value)
    }

    pub fn remove_property(&self, name: &str) -> GraphResult<()> {
        self.element.remove_property(name)
    }

    /// Edges starting at this node
    pub fn outgoing(&self) -> EdgeQuery<'g> {
        EdgeQuery::new(self.store(), self.id(), Direction::Outgoing, None)
    }

    /// Edges ending at this node
    pub fn incoming(&self) -> EdgeQuery<'g> {
        EdgeQuery::new(self.store(), self.id(), Direction::Incoming, None)
    }

    /// Outgoing edges followed by incoming edges
    pub fn edges(&self) -> EdgeQuery<'g> {
        EdgeQuery::new(self.store(), self.id(), Direction::Both, None)
    }

    pub fn outgoing_with_type(&self, label: &str) -> EdgeQuery<'g> {
        EdgeQuery::new(self.store(), self.id(), Direction::Outgoing, Some(label))
    }

    pub fn incoming_with_type(&self, label: &str) -> EdgeQuery<'g> {
        EdgeQuery::new(self.store(), self.id(), Direction::Incoming, Some(label))
    }

    pub fn edges_with_type(&self, label: &str) -> EdgeQuery<'g> {
        EdgeQuery::new(self.store(), self.id(), Direction::Both, Some(label))
    }

    /// Delete the node, its properties, and every edge touching it
    ///
    /// Incident edges and their properties go first so no edge is left
    /// pointing at a missing node.
    pub fn delete(self) -> GraphResult<()> {
        let id = self.id();
        self.store().write(|sql| {
            let mut stmt = sql.prepare(&format!(
                "SELECT id FROM {edges} WHERE from_node_id = ? \
                 UNION SELECT id FROM {edges} WHERE to_node_id = ?",
                edges = TABLE_EDGES
            ))?;
            let mut rows = stmt.query(params![id, id])?;
            let mut incident = Vec::new();
            while let Some(row) = rows.next()? {
                incident.push(row.get::<_, i64>(0)?);
            }

            for edge_id in &incident {
                delete_properties(sql, *edge_id)?;
                sql.execute(&format!("DELETE FROM {} WHERE id = ?", TABLE_EDGES), [*edge_id])?;
            }

            delete_properties(sql, id)?;
            sql.execute(&format!("DELETE FROM {} WHERE id = ?", TABLE_NODES), [id])?;

            debug!(node = id, edges = incident.len(), "Deleted node");
            Ok(())
        })
    }
}

impl std::fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node").field("id", &self.id()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::element::PropertyMap;

    fn store() -> GraphStore {
        GraphStore::open_in_memory(StoreConfig::default().with_page_size(2)).unwrap()
    }

    #[test]
    fn test_label_and_exists() {
        let store = store();
        let node = store.create_node("Person", &PropertyMap::new()).unwrap();

        assert_eq!(node.label().unwrap().as_deref(), Some("Person"));
        assert!(node.exists().unwrap());

        let ghost = store.node(node.id() + 1000);
        assert_eq!(ghost.label().unwrap(), None);
        assert!(!ghost.exists().unwrap());
    }

    #[test]
    fn test_directional_queries() {
        let store = store();
        let empty = PropertyMap::new();
        let a = store.create_node("X", &empty).unwrap();
        let b = store.create_node("X", &empty).unwrap();
        let c = store.create_node("X", &empty).unwrap();

        store.create_relationship(&a, &b, "knows", &empty).unwrap();
        store.create_relationship(&a, &c, "knows", &empty).unwrap();
        store.create_relationship(&a, &c, "likes", &empty).unwrap();
        store.create_relationship(&c, &a, "knows", &empty).unwrap();

        assert_eq!(a.outgoing().to_vec().unwrap().len(), 3);
        assert_eq!(a.incoming().to_vec().unwrap().len(), 1);
        assert_eq!(a.outgoing_with_type("knows").to_vec().unwrap().len(), 2);
        assert_eq!(a.incoming_with_type("likes").to_vec().unwrap().len(), 0);

        // Outgoing prefix, then incoming suffix
        let all: Vec<_> = a.edges_with_type("knows").to_vec().unwrap();
        assert_eq!(all.len(), 3);
        assert!(all[..2].iter().all(|e| e.start_id() == a.id()));
        assert_eq!(all[2].end_id(), a.id());
        assert_eq!(a.edges_with_type("knows").count().unwrap(), 3);
    }

    #[test]
    fn test_query_is_restartable() {
        let store = store();
        let empty = PropertyMap::new();
        let hub = store.create_node("Hub", &empty).unwrap();
        for _ in 0..5 {
            let spoke = store.create_node("Spoke", &empty).unwrap();
            store.create_relationship(&hub, &spoke, "to", &empty).unwrap();
        }

        let query = hub.outgoing();
        let first: Vec<_> = query.iter().map(|e| e.unwrap().id()).collect();
        let second: Vec<_> = query.iter().map(|e| e.unwrap().id()).collect();
        assert_eq!(first.len(), 5);
        assert_eq!(first, second);

        // Early termination leaves the store usable
        let taken: Vec<_> = query.iter().take(1).collect();
        assert_eq!(taken.len(), 1);
        assert_eq!(hub.property_keys().unwrap().len(), 0);
    }

    #[test]
    fn test_delete_cascades_to_edges() {
        let store = store();
        let empty = PropertyMap::new();
        let a = store.create_node("X", &empty).unwrap();
        let b = store.create_node("Y", &empty).unwrap();
        let edge = store.create_relationship(&a, &b, "rel", &empty).unwrap();
        edge.set_property("w", 1i32).unwrap();
        a.set_property("k", 1i32).unwrap();

        a.delete().unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.nodes, 1);
        assert_eq!(stats.edges, 0);
        assert_eq!(stats.properties, 0);
        assert!(b.incoming().to_vec().unwrap().is_empty());
    }

    #[test]
    fn test_delete_self_loop() {
        let store = store();
        let empty = PropertyMap::new();
        let a = store.create_node("X", &empty).unwrap();
        store.create_relationship(&a, &a, "self", &empty).unwrap();

        assert_eq!(a.edges().count().unwrap(), 2);
        a.delete().unwrap();
        assert_eq!(store.stats().unwrap().edges, 0);
    }
}
