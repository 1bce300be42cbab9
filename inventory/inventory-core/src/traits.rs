//! Graph store interfaces consumed by the inventory core.
//!
//! The engine never talks to a concrete database. Everything above this
//! module is written against [`GraphStore`] and [`GraphTransaction`], which
//! expose the primitive vertex/edge operations the query planner compiles
//! traversals into. Each request opens its own transaction; the store is
//! expected to surface write-write collisions on commit as
//! [`InventoryError::StorageConflict`](crate::error::InventoryError::StorageConflict).

use crate::error::Result;
use crate::types::{vertex_props, Direction, EdgeId, EdgeRecord, Value, VertexId};
use std::collections::BTreeMap;

/// A unit of work against a property-graph store.
pub trait GraphTransaction: Send {
    /// Identifier used in log lines
    fn id(&self) -> &str;

    /// Allocate a new vertex with no properties
    fn add_vertex(&mut self) -> Result<VertexId>;

    /// Remove a vertex together with all of its incident edges
    fn remove_vertex(&mut self, vertex: VertexId) -> Result<()>;

    /// Whether the vertex is visible in this transaction
    fn vertex_exists(&self, vertex: VertexId) -> bool;

    /// Read a single vertex property
    fn property(&self, vertex: VertexId, key: &str) -> Result<Option<Value>>;

    /// Read every property of a vertex
    fn properties(&self, vertex: VertexId) -> Result<BTreeMap<String, Value>>;

    /// Write (replace) a vertex property
    fn set_property(&mut self, vertex: VertexId, key: &str, value: Value) -> Result<()>;

    /// Remove a vertex property if present
    fn remove_property(&mut self, vertex: VertexId, key: &str) -> Result<()>;

    /// Create an edge `out -> in`
    fn add_edge(
        &mut self,
        label: &str,
        out_vertex: VertexId,
        in_vertex: VertexId,
        properties: BTreeMap<String, Value>,
    ) -> Result<EdgeId>;

    /// Remove an edge
    fn remove_edge(&mut self, edge: EdgeId) -> Result<()>;

    /// Edges incident to `vertex` in the given direction, optionally filtered by label
    fn edges(
        &self,
        vertex: VertexId,
        direction: Direction,
        label: Option<&str>,
    ) -> Result<Vec<EdgeRecord>>;

    /// Vertices whose property `key` equals `value` (multi-valued properties match any element)
    fn find_vertices(&self, key: &str, value: &Value) -> Result<Vec<VertexId>>;

    /// Every vertex visible in this transaction
    fn vertices(&self) -> Result<Vec<VertexId>>;

    /// Make the transaction's writes durable
    fn commit(self: Box<Self>) -> Result<()>;

    /// Discard the transaction's writes
    fn rollback(self: Box<Self>);

    /// The node-type tag of a vertex, if it carries a readable one
    fn node_type(&self, vertex: VertexId) -> Result<Option<String>> {
        Ok(self
            .property(vertex, vertex_props::NODE_TYPE)?
            .and_then(|v| v.as_str().map(str::to_string)))
    }
}

/// Factory for transactions.
pub trait GraphStore: Send + Sync {
    /// Open a new transaction that sees the latest committed state
    fn begin(&self) -> Result<Box<dyn GraphTransaction>>;
}
