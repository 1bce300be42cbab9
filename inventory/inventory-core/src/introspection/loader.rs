//! Factory for introspected objects of one schema version.

use crate::error::{InventoryError, Result};
use crate::introspection::document::DocumentObject;
use crate::introspection::dynamic::DynamicObject;
use crate::introspection::{Introspector, MarshalFormat, ModelType};
use crate::schema::{NamingTable, NodeType, SchemaRegistry};
use crate::types::Value;
use std::sync::Arc;
use tracing::debug;

/// Produces [`Introspector`] objects backed by the configured [`ModelType`].
///
/// Cheap to clone; every object it creates carries a copy.
#[derive(Debug, Clone)]
pub struct ModelLoader {
    registry: Arc<SchemaRegistry>,
    model_type: ModelType,
    naming: Arc<NamingTable>,
    uri_prefix: Option<String>,
}

impl ModelLoader {
    pub fn new(registry: Arc<SchemaRegistry>, model_type: ModelType) -> Self {
        Self {
            registry,
            model_type,
            naming: Arc::new(NamingTable::default()),
            uri_prefix: None,
        }
    }

    /// Use a custom naming table for identifier-style field names
    pub fn with_naming(mut self, naming: NamingTable) -> Self {
        self.naming = Arc::new(naming);
        self
    }

    /// Prefix every synthesized uri, e.g. `/aai/v1`
    pub fn with_uri_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let trimmed = prefix.trim_end_matches('/');
        self.uri_prefix = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
        self
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn model_type(&self) -> ModelType {
        self.model_type
    }

    pub fn naming(&self) -> &NamingTable {
        &self.naming
    }

    pub fn uri_prefix(&self) -> Option<&str> {
        self.uri_prefix.as_deref()
    }

    pub fn version(&self) -> &str {
        self.registry.version()
    }

    /// Resolve a type by wire name, falling back to identifier form (`PInterface`)
    pub fn resolve_type(&self, name: &str) -> Result<Arc<NodeType>> {
        if let Some(node_type) = self.registry.get(name) {
            return Ok(node_type.clone());
        }
        let wire = self.naming.to_wire(name);
        self.registry.node_type(&wire).map_err(|_| InventoryError::UnknownType(name.to_string()))
    }

    /// An empty object of the named type
    pub fn introspector(&self, type_name: &str) -> Result<Box<dyn Introspector>> {
        let node_type = self.resolve_type(type_name)?;
        Ok(self.empty(node_type))
    }

    /// Wrap a JSON object as an object of the named type
    pub fn from_value(&self, type_name: &str, value: Value) -> Result<Box<dyn Introspector>> {
        let node_type = self.resolve_type(type_name)?;
        match self.model_type {
            ModelType::Dynamic => Ok(Box::new(DynamicObject::from_value(self.clone(), node_type, value)?)),
            ModelType::Document => Ok(Box::new(DocumentObject::from_value(self.clone(), node_type, value)?)),
        }
    }

    /// Decode an encoded object of the named type
    pub fn unmarshal(
        &self,
        type_name: &str,
        input: &str,
        format: MarshalFormat,
    ) -> Result<Box<dyn Introspector>> {
        let value: Value = match format {
            MarshalFormat::Json | MarshalFormat::JsonPretty => serde_json::from_str(input)?,
            MarshalFormat::Yaml => serde_yaml::from_str(input).map_err(|e| {
                InventoryError::invalid_input(format!("YAML decoding failed: {}", e))
            })?,
        };
        debug!("Unmarshalling {} as {} object", type_name, self.model_type);
        self.from_value(type_name, value)
    }

    /// Map an incoming field name to a declared property name.
    ///
    /// Accepts the property name itself, its storage alias, or an
    /// identifier-style spelling of it.
    pub(crate) fn resolve_field(&self, node_type: &NodeType, field: &str) -> Option<String> {
        if node_type.has_property(field) {
            return Some(field.to_string());
        }
        if let Some(def) = node_type.property_by_storage_name(field) {
            return Some(def.name.clone());
        }
        let wire = self.naming.to_wire(field);
        node_type.has_property(&wire).then_some(wire)
    }

    fn empty(&self, node_type: Arc<NodeType>) -> Box<dyn Introspector> {
        match self.model_type {
            ModelType::Dynamic => Box::new(DynamicObject::new(self.clone(), node_type)),
            ModelType::Document => Box::new(DocumentObject::new(self.clone(), node_type)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fixtures;
    use serde_json::json;

    #[test]
    fn test_resolve_identifier_type_names() {
        let loader = ModelLoader::new(fixtures::registry_v1(), ModelType::Dynamic);
        assert_eq!(loader.resolve_type("PInterface").unwrap().name, "p-interface");
        assert_eq!(loader.resolve_type("pserver").unwrap().name, "pserver");
        assert!(matches!(
            loader.resolve_type("Nothing").unwrap_err(),
            InventoryError::UnknownType(_)
        ));
    }

    #[test]
    fn test_both_backends_behind_one_interface() {
        let registry = fixtures::registry_v1();
        for model_type in [ModelType::Dynamic, ModelType::Document] {
            let loader = ModelLoader::new(registry.clone(), model_type);
            let obj = loader
                .from_value("pserver", json!({"hostname": "h1", "number-of-cpus": 8}))
                .unwrap();
            assert_eq!(obj.name(), "pserver");
            assert_eq!(obj.get("hostname"), Some(json!("h1")));
            assert_eq!(obj.keys(), vec!["hostname"]);
            assert_eq!(obj.uri().unwrap(), "/pservers/pserver/h1");
        }
    }

    #[test]
    fn test_uri_prefix() {
        let loader = ModelLoader::new(fixtures::registry_v1(), ModelType::Dynamic)
            .with_uri_prefix("/aai/v1/");
        let obj = loader.from_value("complex", json!({"physical-location-id": "clli 1"})).unwrap();
        assert_eq!(obj.uri().unwrap(), "/aai/v1/complexes/complex/clli%201");
        let container = loader.introspector("pservers").unwrap();
        assert_eq!(container.uri().unwrap(), "/aai/v1/pservers");
    }

    #[test]
    fn test_unmarshal_yaml() {
        let loader = ModelLoader::new(fixtures::registry_v1(), ModelType::Dynamic);
        let obj = loader
            .unmarshal("pserver", "hostname: h2\nin-maint: true\n", MarshalFormat::Yaml)
            .unwrap();
        assert_eq!(obj.get("in-maint"), Some(json!(true)));
    }
}
