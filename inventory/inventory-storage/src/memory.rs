//! In-memory transactional property graph.
//!
//! Every transaction works on a private copy of the committed state. On
//! commit the vertices it wrote are checked against the committed stamps;
//! if another transaction wrote any of them first, the commit fails with
//! [`InventoryError::StorageConflict`] and nothing is applied. Writing an
//! edge counts as writing both endpoints.

use inventory_core::error::{InventoryError, Result};
use inventory_core::traits::{GraphStore, GraphTransaction};
use inventory_core::types::{Direction, EdgeId, EdgeRecord, Value, VertexId};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct GraphState {
    vertices: BTreeMap<VertexId, BTreeMap<String, Value>>,
    edges: BTreeMap<EdgeId, EdgeRecord>,
    /// Commit counter per vertex, kept after deletion
    stamps: HashMap<VertexId, u64>,
}

#[derive(Debug, Default)]
struct Shared {
    state: RwLock<GraphState>,
    next_vertex: AtomicU64,
    next_edge: AtomicU64,
    injected_conflicts: AtomicU32,
    commits: AtomicU64,
}

/// Shared handle to an in-memory graph; clones see the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGraph {
    shared: Arc<Shared>,
}

/// Counts of committed graph elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GraphStats {
    pub vertices: usize,
    pub edges: usize,
    pub commits: u64,
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` commits fail with a storage conflict
    pub fn inject_conflicts(&self, count: u32) {
        self.shared.injected_conflicts.store(count, Ordering::SeqCst);
    }

    pub fn stats(&self) -> GraphStats {
        let state = self.shared.state.read();
        GraphStats {
            vertices: state.vertices.len(),
            edges: state.edges.len(),
            commits: self.shared.commits.load(Ordering::SeqCst),
        }
    }

    /// Open a transaction with its concrete type.
    ///
    /// The transaction works on a full copy of the graph taken here, so
    /// opening one costs time and memory proportional to the graph size.
    /// Fine for tests and the CLI's scratch graph, not for large inventories.
    pub fn transaction(&self) -> MemoryTransaction {
        let state = self.shared.state.read().clone();
        MemoryTransaction {
            id: Uuid::new_v4().to_string(),
            shared: self.shared.clone(),
            state,
            written: HashSet::new(),
            added_edges: HashSet::new(),
            removed_edges: HashSet::new(),
        }
    }
}

impl GraphStore for InMemoryGraph {
    fn begin(&self) -> Result<Box<dyn GraphTransaction>> {
        let tx = self.transaction();
        trace!("Transaction {} opened", tx.id);
        Ok(Box::new(tx))
    }
}

/// Unit of work against an [`InMemoryGraph`].
#[derive(Debug)]
pub struct MemoryTransaction {
    id: String,
    shared: Arc<Shared>,
    state: GraphState,
    written: HashSet<VertexId>,
    added_edges: HashSet<EdgeId>,
    removed_edges: HashSet<EdgeId>,
}

impl MemoryTransaction {
    fn vertex_mut(&mut self, vertex: VertexId) -> Result<&mut BTreeMap<String, Value>> {
        let props = self
            .state
            .vertices
            .get_mut(&vertex)
            .ok_or_else(|| InventoryError::not_found("vertex", vertex.to_string()))?;
        self.written.insert(vertex);
        Ok(props)
    }

    fn vertex_ref(&self, vertex: VertexId) -> Result<&BTreeMap<String, Value>> {
        self.state
            .vertices
            .get(&vertex)
            .ok_or_else(|| InventoryError::not_found("vertex", vertex.to_string()))
    }

    fn detach_edge(&mut self, edge: EdgeId) -> Option<EdgeRecord> {
        let record = self.state.edges.remove(&edge)?;
        self.written.insert(record.out_vertex);
        self.written.insert(record.in_vertex);
        if !self.added_edges.remove(&edge) {
            self.removed_edges.insert(edge);
        }
        Some(record)
    }
}

fn matches_value(stored: &Value, expected: &Value) -> bool {
    stored == expected
        || matches!(stored, Value::Array(items) if items.iter().any(|i| i == expected))
}

impl GraphTransaction for MemoryTransaction {
    fn id(&self) -> &str {
        &self.id
    }

    fn add_vertex(&mut self) -> Result<VertexId> {
        let id = VertexId(self.shared.next_vertex.fetch_add(1, Ordering::SeqCst) + 1);
        self.state.vertices.insert(id, BTreeMap::new());
        self.written.insert(id);
        Ok(id)
    }

    fn remove_vertex(&mut self, vertex: VertexId) -> Result<()> {
        self.vertex_ref(vertex)?;
        let incident: Vec<EdgeId> = self
            .state
            .edges
            .values()
            .filter(|e| e.out_vertex == vertex || e.in_vertex == vertex)
            .map(|e| e.id)
            .collect();
        for edge in incident {
            self.detach_edge(edge);
        }
        self.state.vertices.remove(&vertex);
        self.written.insert(vertex);
        Ok(())
    }

    fn vertex_exists(&self, vertex: VertexId) -> bool {
        self.state.vertices.contains_key(&vertex)
    }

    fn property(&self, vertex: VertexId, key: &str) -> Result<Option<Value>> {
        Ok(self.vertex_ref(vertex)?.get(key).cloned())
    }

    fn properties(&self, vertex: VertexId) -> Result<BTreeMap<String, Value>> {
        Ok(self.vertex_ref(vertex)?.clone())
    }

    fn set_property(&mut self, vertex: VertexId, key: &str, value: Value) -> Result<()> {
        self.vertex_mut(vertex)?.insert(key.to_string(), value);
        Ok(())
    }

    fn remove_property(&mut self, vertex: VertexId, key: &str) -> Result<()> {
        let props = self.vertex_mut(vertex)?;
        props.remove(key);
        Ok(())
    }

    fn add_edge(
        &mut self,
        label: &str,
        out_vertex: VertexId,
        in_vertex: VertexId,
        properties: BTreeMap<String, Value>,
    ) -> Result<EdgeId> {
        self.vertex_ref(out_vertex)?;
        self.vertex_ref(in_vertex)?;
        let id = EdgeId(self.shared.next_edge.fetch_add(1, Ordering::SeqCst) + 1);
        self.state.edges.insert(
            id,
            EdgeRecord {
                id,
                label: label.to_string(),
                out_vertex,
                in_vertex,
                properties,
            },
        );
        self.written.insert(out_vertex);
        self.written.insert(in_vertex);
        self.added_edges.insert(id);
        Ok(id)
    }

    fn remove_edge(&mut self, edge: EdgeId) -> Result<()> {
        self.detach_edge(edge)
            .map(|_| ())
            .ok_or_else(|| InventoryError::not_found("edge", edge.to_string()))
    }

    fn edges(
        &self,
        vertex: VertexId,
        direction: Direction,
        label: Option<&str>,
    ) -> Result<Vec<EdgeRecord>> {
        self.vertex_ref(vertex)?;
        Ok(self
            .state
            .edges
            .values()
            .filter(|e| match direction {
                Direction::Out => e.out_vertex == vertex,
                Direction::In => e.in_vertex == vertex,
                Direction::Both => e.out_vertex == vertex || e.in_vertex == vertex,
            })
            .filter(|e| label.is_none_or(|l| e.label == l))
            .cloned()
            .collect())
    }

    fn find_vertices(&self, key: &str, value: &Value) -> Result<Vec<VertexId>> {
        Ok(self
            .state
            .vertices
            .iter()
            .filter(|(_, props)| props.get(key).is_some_and(|v| matches_value(v, value)))
            .map(|(id, _)| *id)
            .collect())
    }

    fn vertices(&self) -> Result<Vec<VertexId>> {
        Ok(self.state.vertices.keys().copied().collect())
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let tx = *self;
        let injected = tx
            .shared
            .injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if injected.is_ok() {
            warn!("Transaction {} failed with an injected conflict", tx.id);
            return Err(InventoryError::conflict(format!(
                "injected conflict on transaction {}",
                tx.id
            )));
        }
        if tx.written.is_empty() {
            trace!("Transaction {} committed without writes", tx.id);
            return Ok(());
        }

        let mut state = tx.shared.state.write();
        if let Some(vertex) = tx
            .written
            .iter()
            .find(|v| state.stamps.get(v) != tx.state.stamps.get(v))
        {
            return Err(InventoryError::conflict(format!(
                "vertex {} was modified concurrently (transaction {})",
                vertex, tx.id
            )));
        }

        for edge in &tx.removed_edges {
            state.edges.remove(edge);
        }
        for edge in &tx.added_edges {
            if let Some(record) = tx.state.edges.get(edge) {
                state.edges.insert(*edge, record.clone());
            }
        }
        for vertex in &tx.written {
            match tx.state.vertices.get(vertex) {
                Some(props) => {
                    state.vertices.insert(*vertex, props.clone());
                }
                None => {
                    state.vertices.remove(vertex);
                }
            }
            *state.stamps.entry(*vertex).or_insert(0) += 1;
        }
        tx.shared.commits.fetch_add(1, Ordering::SeqCst);
        debug!(
            "Transaction {} committed ({} vertices written)",
            tx.id,
            tx.written.len()
        );
        Ok(())
    }

    fn rollback(self: Box<Self>) {
        trace!("Transaction {} rolled back", self.id);
    }
}
