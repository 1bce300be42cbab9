//! Executes traversal plans against a graph transaction.

use inventory_core::edges::{is_parent_edge_of, side_of, EdgeFlag};
use inventory_core::error::Result;
use inventory_core::traits::GraphTransaction;
use inventory_core::types::{edge_props, Direction, VertexId};
use inventory_query::{QueryStep, TraversalPlan};
use std::collections::{HashSet, VecDeque};
use tracing::{trace, warn};

/// Graph traversals the serializer depends on.
pub trait GraphQueryExecutor: Send + Sync {
    /// Vertices matched by a plan, in discovery order without duplicates
    fn execute(&self, tx: &dyn GraphTransaction, plan: &TraversalPlan) -> Result<Vec<VertexId>>;

    /// Vertices matched by the part of a plan before its boundary
    fn execute_ancestor_plan(
        &self,
        tx: &dyn GraphTransaction,
        plan: &TraversalPlan,
    ) -> Result<Vec<VertexId>> {
        self.execute(tx, &plan.ancestor_plan())
    }

    /// Ancestors of a vertex over tree edges, nearest first
    fn find_parents(&self, tx: &dyn GraphTransaction, vertex: VertexId) -> Result<Vec<VertexId>>;

    /// The vertex plus every vertex reachable through `delete-other-v` flags
    fn find_deletable(&self, tx: &dyn GraphTransaction, vertex: VertexId) -> Result<Vec<VertexId>>;

    /// Neighbours over edges matching the optional label and node type
    fn find_related_vertices(
        &self,
        tx: &dyn GraphTransaction,
        vertex: VertexId,
        direction: Direction,
        label: Option<&str>,
        node_type: Option<&str>,
    ) -> Result<Vec<VertexId>>;
}

/// Straightforward frontier-based plan interpreter.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanExecutor;

impl PlanExecutor {
    pub fn new() -> Self {
        Self
    }

    fn apply(
        &self,
        tx: &dyn GraphTransaction,
        frontier: Vec<VertexId>,
        step: &QueryStep,
    ) -> Result<Vec<VertexId>> {
        let mut next = Vec::new();
        match step {
            QueryStep::PropertyEquals { key, value } => {
                for v in frontier {
                    if tx
                        .property(v, key)?
                        .is_some_and(|stored| QueryStep::value_matches(&stored, value))
                    {
                        next.push(v);
                    }
                }
            }
            QueryStep::NodeType { types } => {
                for v in frontier {
                    if tx.node_type(v)?.is_some_and(|t| types.contains(&t)) {
                        next.push(v);
                    }
                }
            }
            QueryStep::EdgeHop { label, direction } => {
                let mut seen = HashSet::new();
                for v in frontier {
                    for edge in tx.edges(v, *direction, Some(label.as_str()))? {
                        let other = edge.other(v);
                        if seen.insert(other) {
                            next.push(other);
                        }
                    }
                }
            }
        }
        Ok(next)
    }
}

impl GraphQueryExecutor for PlanExecutor {
    fn execute(&self, tx: &dyn GraphTransaction, plan: &TraversalPlan) -> Result<Vec<VertexId>> {
        let mut steps = plan.steps.iter();
        // An equality filter up front can use the store's lookup instead of a scan.
        let mut frontier = match plan.steps.first() {
            Some(QueryStep::PropertyEquals { key, value }) => {
                steps.next();
                tx.find_vertices(key, value)?
            }
            Some(_) => tx.vertices()?,
            None => return Ok(Vec::new()),
        };
        for step in steps {
            if frontier.is_empty() {
                break;
            }
            frontier = self.apply(tx, frontier, step)?;
        }
        trace!("Plan {} matched {} vertices", plan, frontier.len());
        Ok(frontier)
    }

    fn find_parents(&self, tx: &dyn GraphTransaction, vertex: VertexId) -> Result<Vec<VertexId>> {
        let mut parents = Vec::new();
        let mut seen = HashSet::from([vertex]);
        let mut current = vertex;
        loop {
            let parent_edges: Vec<_> = tx
                .edges(current, Direction::Both, None)?
                .into_iter()
                .filter(|e| is_parent_edge_of(e, current))
                .collect();
            let Some(edge) = parent_edges.first() else {
                break;
            };
            if parent_edges.len() > 1 {
                warn!("Vertex {} has {} parent edges", current, parent_edges.len());
            }
            let parent = edge.other(current);
            if !seen.insert(parent) {
                warn!("Parent cycle through vertex {}", parent);
                break;
            }
            parents.push(parent);
            current = parent;
        }
        Ok(parents)
    }

    fn find_deletable(&self, tx: &dyn GraphTransaction, vertex: VertexId) -> Result<Vec<VertexId>> {
        let mut order = vec![vertex];
        let mut seen = HashSet::from([vertex]);
        let mut queue = VecDeque::from([vertex]);
        while let Some(current) = queue.pop_front() {
            for edge in tx.edges(current, Direction::Both, None)? {
                let flag = EdgeFlag::from_edge(&edge, edge_props::DELETE_OTHER_V);
                if !flag.covers(side_of(&edge, current)) {
                    continue;
                }
                let other = edge.other(current);
                if seen.insert(other) {
                    order.push(other);
                    queue.push_back(other);
                }
            }
        }
        Ok(order)
    }

    fn find_related_vertices(
        &self,
        tx: &dyn GraphTransaction,
        vertex: VertexId,
        direction: Direction,
        label: Option<&str>,
        node_type: Option<&str>,
    ) -> Result<Vec<VertexId>> {
        let mut related = Vec::new();
        for edge in tx.edges(vertex, direction, label)? {
            let other = edge.other(vertex);
            if related.contains(&other) {
                continue;
            }
            if let Some(wanted) = node_type {
                if tx.node_type(other)?.as_deref() != Some(wanted) {
                    continue;
                }
            }
            related.push(other);
        }
        Ok(related)
    }
}
