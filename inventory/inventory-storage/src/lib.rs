//! Graph persistence for the inventory engine.
//!
//! This crate provides the transactional in-memory graph store, the plan
//! executor, the graph serializer that maps introspected objects onto
//! vertices and edges, and the engine that wraps every request in a
//! retried unit of work.

pub mod engine;
pub mod executor;
pub mod hooks;
pub mod memory;
pub mod retry;
pub mod serializer;

pub use engine::InventoryEngine;
pub use executor::{GraphQueryExecutor, PlanExecutor};
pub use hooks::{MutationAction, MutationContext, MutationHooks, MutationKind, MutationOutcome};
pub use memory::{GraphStats, InMemoryGraph, MemoryTransaction};
pub use retry::RetryPolicy;
pub use serializer::{GraphSerializer, WriteAction};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::engine::InventoryEngine;
    pub use crate::executor::{GraphQueryExecutor, PlanExecutor};
    pub use crate::hooks::{MutationAction, MutationHooks, MutationOutcome};
    pub use crate::memory::InMemoryGraph;
    pub use crate::serializer::GraphSerializer;
}
