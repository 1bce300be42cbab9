//! Schema registry: versioned node type declarations.

pub mod catalog;
pub mod document;
pub mod fixtures;
pub mod model;
pub mod naming;
pub mod registry;

pub use catalog::SchemaCatalog;
pub use document::{NodeTypeDocument, PropertyDocument, SchemaDocument};
pub use model::{
    DeleteSemantic, NodeType, PropertyDef, PropertyKind, PropertyMetadata, ScalarType, Visibility,
};
pub use naming::NamingTable;
pub use registry::SchemaRegistry;
