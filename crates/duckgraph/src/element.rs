//! Property storage shared by nodes and edges
//!
//! [`Element`] is the property-bearing part of a node or edge handle: an id
//! plus the store it lives in. It carries no cached state; every call goes to
//! the properties table.

use crate::codec::{self, ValueKind};
use crate::connection::Sql;
use crate::error::{GraphError, GraphResult};
use crate::schema::TABLE_PROPERTIES;
use crate::store::GraphStore;
use crate::value::PropertyValue;
use duckdb::params;
use std::collections::{BTreeMap, BTreeSet};

/// Property map used when creating elements
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// Identifier shared by nodes and edges
pub type ElementId = i64;

/// Property access for one node or edge
#[derive(Clone, Copy)]
pub struct Element<'g> {
    store: &'g GraphStore,
    id: ElementId,
}

impl<'g> Element<'g> {
    pub(crate) fn new(store: &'g GraphStore, id: ElementId) -> Self {
        Self { store, id }
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn store(&self) -> &'g GraphStore {
        self.store
    }

    /// Names of all properties set on this element
    ///
    /// Empty if the element has none or does not exist.
    pub fn property_keys(&self) -> GraphResult<BTreeSet<String>> {
        self.store.read(|sql| {
            let mut stmt = sql.prepare(&format!(
                "SELECT DISTINCT name FROM {} WHERE elem_id = ?",
                TABLE_PROPERTIES
            ))?;
            let mut rows = stmt.query([self.id])?;

            let mut keys = BTreeSet::new();
            while let Some(row) = rows.next()? {
                keys.insert(row.get::<_, String>(0)?);
            }
            Ok(keys)
        })
    }

    /// Current value of a property, `None` if it is not set
    pub fn property(&self, name: &str) -> GraphResult<Option<PropertyValue>> {
        self.store.read(|sql| {
            let mut stmt = sql.prepare(&format!(
                "SELECT {} FROM {} WHERE elem_id = ? AND name = ?",
                codec::query_columns(),
                TABLE_PROPERTIES
            ))?;
            let mut rows = stmt.query(params![self.id, name])?;

            match rows.next()? {
                Some(row) => codec::decode_row(row, 0),
                None => Ok(None),
            }
        })
    }

    /// Set a property, replacing any previous value and kind
    pub fn set_property(&self, name: &str, value: impl Into<PropertyValue>) -> GraphResult<()> {
        self.put_property(name, Some(value.into()))
    }

    /// Set a property, or remove it when `value` is `None` or JSON `null`
    ///
    /// JSON payloads are reclassified first, so a JSON number or string is
    /// stored under its own kind rather than as a blob.
    pub fn put_property(&self, name: &str, value: Option<PropertyValue>) -> GraphResult<()> {
        let value = match value.and_then(PropertyValue::normalize) {
            Some(value) => value,
            None => return self.remove_property(name),
        };

        if self.store.buffer_property(self.id, name, Some(&value))? {
            return Ok(());
        }

        self.store.write(|sql| upsert_property(sql, self.id, name, &value))
    }

    /// Remove a property; removing an unset property is not an error
    pub fn remove_property(&self, name: &str) -> GraphResult<()> {
        if self.store.buffer_property(self.id, name, None)? {
            return Ok(());
        }

        self.store.write(|sql| {
            sql.execute(
                &format!("DELETE FROM {} WHERE elem_id = ? AND name = ?", TABLE_PROPERTIES),
                params![self.id, name],
            )?;
            Ok(())
        })
    }

    /// Apply a map of properties
    ///
    /// Every property is attempted. A single failure is returned as
    /// [`GraphError::PropertyWrite`], several as [`GraphError::PropertyWrites`].
    pub(crate) fn apply_properties(&self, properties: &PropertyMap) -> GraphResult<()> {
        let mut failures: Vec<GraphError> = properties
            .iter()
            .filter_map(|(name, value)| {
                self.put_property(name, Some(value.clone()))
                    .err()
                    .map(|e| GraphError::PropertyWrite {
                        element: self.id,
                        name: name.clone(),
                        source: Box::new(e),
                    })
            })
            .collect();

        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            _ => Err(GraphError::PropertyWrites {
                element: self.id,
                failures,
            }),
        }
    }
}

impl PartialEq for Element<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && std::ptr::eq(self.store, other.store)
    }
}

impl Eq for Element<'_> {}

impl std::fmt::Debug for Element<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Element").field("id", &self.id).finish()
    }
}

/// Update the existing row for `(id, name)`, inserting only if none matched
///
/// The update writes the value's own column and clears the other value
/// columns, so a row never holds more than one non-null value.
fn upsert_property(sql: &Sql<'_>, id: ElementId, name: &str, value: &PropertyValue) -> GraphResult<()> {
    let kind = ValueKind::of(value);
    let encoded = codec::encode(value)?;

    let assignments = ValueKind::ALL
        .iter()
        .map(|k| {
            if *k == kind {
                format!("{} = ?", k.column_name())
            } else {
                format!("{} = NULL", k.column_name())
            }
        })
        .collect::<Vec<_>>()
        .join(", ");

    let updated = sql.execute(
        &format!(
            "UPDATE {} SET {} WHERE elem_id = ? AND name = ?",
            TABLE_PROPERTIES, assignments
        ),
        params![encoded, id, name],
    )?;

    if updated == 0 {
        sql.execute(
            &format!(
                "INSERT INTO {} (elem_id, name, {}) VALUES (?, ?, ?)",
                TABLE_PROPERTIES,
                kind.column_name()
            ),
            params![id, name, encoded],
        )?;
    }
    Ok(())
}

/// Delete every property row owned by `id`
pub(crate) fn delete_properties(sql: &Sql<'_>, id: ElementId) -> GraphResult<usize> {
    sql.execute(
        &format!("DELETE FROM {} WHERE elem_id = ?", TABLE_PROPERTIES),
        [id],
    )
}

/// Whether a row with `id` exists in `table`
pub(crate) fn row_exists(sql: &Sql<'_>, table: &str, id: ElementId) -> GraphResult<bool> {
    let mut stmt = sql.prepare(&format!("SELECT 1 FROM {} WHERE id = ?", table))?;
    let mut rows = stmt.query([id])?;
    Ok(rows.next()?.is_some())
}
