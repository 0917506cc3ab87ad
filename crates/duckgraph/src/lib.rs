//! Property graph storage on DuckDB
//!
//! This crate stores a directed, labeled property graph in three DuckDB
//! tables (nodes, edges and properties) and exposes node/edge handles,
//! typed properties and explicit transaction control.
//!
//! ## Features
//!
//! - **Typed properties**: booleans, integers, floats, strings and JSON
//!   objects in one properties table, one column per value kind
//! - **Unique edges**: at most one edge per (start, end, label)
//! - **Lazy traversal**: restartable, keyset-paged edge and node sequences
//! - **Batch mode**: new rows buffered and bulk-appended with the DuckDB appender
//! - **Schema versioning**: stores written by another layout are refused
//!
//! ## Usage
//!
//! ```rust,no_run
//! use duckgraph::{GraphStore, PropertyMap, StoreConfig};
//!
//! let store = GraphStore::open("./graph-store", StoreConfig::default())?;
//! let tx = store.begin_transaction()?;
//!
//! let a = store.create_node("X", &PropertyMap::new())?;
//! let b = store.create_node("Y", &PropertyMap::new())?;
//! store.create_relationship(&a, &b, "rel", &PropertyMap::new())?;
//! a.set_property("k", 42i32)?;
//!
//! tx.success();
//! store.shutdown()?;
//! # Ok::<(), duckgraph::GraphError>(())
//! ```

pub mod batch;
pub mod codec;
pub mod config;
pub mod connection;
pub mod edge;
pub mod element;
pub mod error;
pub mod node;
pub mod query;
pub mod schema;
pub mod sequence;
pub mod store;
pub mod transaction;
pub mod value;

// Re-exports
pub use config::StoreConfig;
pub use edge::Edge;
pub use element::{Element, ElementId, PropertyMap};
pub use error::{GraphError, GraphResult};
pub use node::Node;
pub use query::{Direction, EdgeQuery, NodeQuery};
pub use store::{GraphStats, GraphStore, Mode};
pub use transaction::{Transaction, TxState};
pub use value::PropertyValue;
