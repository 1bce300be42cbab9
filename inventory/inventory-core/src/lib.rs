//! Core types and abstractions for the inventory graph engine.
//!
//! This crate provides the schema registry, the introspection object model,
//! the edge rule engine, the graph store traits, and the error, config and
//! logging plumbing shared by every other inventory crate.

pub mod config;
pub mod edges;
pub mod error;
pub mod introspection;
pub mod logging;
pub mod schema;
pub mod traits;
pub mod types;

pub use config::{ConfigProfile, EngineConfig, UNBOUNDED_DEPTH};
pub use error::{ErrorCategory, InventoryError, Result};
pub use traits::*;
pub use types::*;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{ConfigProfile, EngineConfig, UNBOUNDED_DEPTH};
    pub use crate::edges::{DeleteSemantic, EdgeFlag, EdgeRule, EdgeRules, EdgeType, Multiplicity};
    pub use crate::error::{ErrorCategory, InventoryError, Result};
    pub use crate::introspection::{Introspector, MarshalFormat, ModelLoader, ModelType};
    pub use crate::schema::{NamingTable, NodeType, SchemaCatalog, SchemaRegistry};
    pub use crate::traits::*;
    pub use crate::types::*;
}
