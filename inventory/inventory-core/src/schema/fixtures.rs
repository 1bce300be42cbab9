//! Bundled sample schema versions.
//!
//! `v1` models a small slice of a network inventory (servers, interfaces,
//! locations, networks, VNFs, customers). `v2` adds required properties with
//! defaults so write-through defaulting can be exercised.

use crate::edges::EdgeRules;
use crate::schema::catalog::SchemaCatalog;
use crate::schema::registry::SchemaRegistry;
use std::sync::Arc;

pub const V1_JSON: &str = include_str!("../../schemas/v1.json");
pub const V2_JSON: &str = include_str!("../../schemas/v2.json");

/// The bundled `v1` registry
///
/// # Panics
///
/// Panics if the bundled document is invalid, which is a build defect.
pub fn registry_v1() -> Arc<SchemaRegistry> {
    Arc::new(SchemaRegistry::from_json(V1_JSON).expect("bundled v1 schema is valid"))
}

/// The bundled `v2` registry
///
/// # Panics
///
/// Panics if the bundled document is invalid, which is a build defect.
pub fn registry_v2() -> Arc<SchemaRegistry> {
    Arc::new(SchemaRegistry::from_json(V2_JSON).expect("bundled v2 schema is valid"))
}

/// Catalog holding both bundled versions
///
/// # Panics
///
/// Panics if the bundled documents are invalid, which is a build defect.
pub fn catalog() -> SchemaCatalog {
    SchemaCatalog::from_json_documents([V1_JSON, V2_JSON]).expect("bundled schemas are valid")
}

/// Edge rules of a bundled registry
///
/// # Panics
///
/// Panics if the bundled rules are invalid, which is a build defect.
pub fn edge_rules(registry: &Arc<SchemaRegistry>) -> Arc<EdgeRules> {
    Arc::new(EdgeRules::from_registry(registry.clone()).expect("bundled edge rules are valid"))
}
