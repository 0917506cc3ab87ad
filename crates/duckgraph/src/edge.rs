//! Edge handles

use crate::element::{delete_properties, Element, ElementId};
use crate::error::GraphResult;
use crate::node::Node;
use crate::schema::TABLE_EDGES;
use crate::store::GraphStore;
use crate::value::PropertyValue;
use std::collections::BTreeSet;

/// A labeled, directed edge between two nodes
///
/// Label and endpoints never change after creation, so the handle keeps them;
/// properties are always read from the store.
#[derive(Clone, PartialEq, Eq)]
pub struct Edge<'g> {
    element: Element<'g>,
    label: String,
    start: ElementId,
    end: ElementId,
}

impl<'g> Edge<'g> {
    pub(crate) fn new(
        store: &'g GraphStore,
        id: ElementId,
        label: String,
        start: ElementId,
        end: ElementId,
    ) -> Self {
        Self {
            element: Element::new(store, id),
            label,
            start,
            end,
        }
    }

    pub fn id(&self) -> ElementId {
        self.element.id()
    }

    /// Property access for this edge
    pub fn element(&self) -> Element<'g> {
        self.element
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn start_id(&self) -> ElementId {
        self.start
    }

    pub fn end_id(&self) -> ElementId {
        self.end
    }

    pub fn start_node(&self) -> Node<'g> {
        Node::new(self.element.store(), self.start)
    }

    pub fn end_node(&self) -> Node<'g> {
        Node::new(self.element.store(), self.end)
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

    /// Delete the edge and its properties
    pub fn delete(self) -> GraphResult<()> {
        let id = self.id();
        self.element.store().write(|sql| {
            delete_properties(sql, id)?;
            sql.execute(&format!("DELETE FROM {} WHERE id = ?", TABLE_EDGES), [id])?;
            Ok(())
        })
    }
}

impl std::fmt::Debug for Edge<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Edge")
            .field("id", &self.id())
            .field("label", &self.label)
            .field("start", &self.start)
            .field("end", &self.end)
            .finish()
    }
}
