//! Raw document backend.

use crate::error::{InventoryError, Result};
use crate::introspection::{coerce_property, json_type_name, Introspector, ModelLoader};
use crate::schema::NodeType;
use crate::types::Value;
use serde_json::Map;
use std::sync::Arc;

/// Object backed by the JSON document it was decoded from.
///
/// Declared fields are renamed to their wire names on the way in. Fields the
/// schema doesn't know are kept as-is and written back out by `to_value`,
/// but are invisible to `get`.
#[derive(Debug, Clone)]
pub struct DocumentObject {
    loader: ModelLoader,
    node_type: Arc<NodeType>,
    document: Map<String, Value>,
}

impl DocumentObject {
    pub fn new(loader: ModelLoader, node_type: Arc<NodeType>) -> Self {
        Self {
            loader,
            node_type,
            document: Map::new(),
        }
    }

    pub fn from_value(loader: ModelLoader, node_type: Arc<NodeType>, value: Value) -> Result<Self> {
        let map = match value {
            Value::Object(map) => map,
            other => {
                return Err(InventoryError::invalid_input(format!(
                    "expected an object for '{}', got {}",
                    node_type.name,
                    json_type_name(&other)
                )));
            }
        };
        let mut document = Map::with_capacity(map.len());
        for (field, value) in map {
            let name = loader.resolve_field(&node_type, &field).unwrap_or(field);
            document.insert(name, value);
        }
        Ok(Self {
            loader,
            node_type,
            document,
        })
    }

    /// Fields present in the document that the schema does not declare
    pub fn unknown_fields(&self) -> Vec<&str> {
        self.document
            .keys()
            .filter(|k| !self.node_type.has_property(k))
            .map(String::as_str)
            .collect()
    }
}

impl Introspector for DocumentObject {
    fn node_type(&self) -> &NodeType {
        &self.node_type
    }

    fn loader(&self) -> &ModelLoader {
        &self.loader
    }

    fn get(&self, name: &str) -> Option<Value> {
        if !self.node_type.has_property(name) {
            return None;
        }
        self.document.get(name).filter(|v| !v.is_null()).cloned()
    }

    fn set(&mut self, name: &str, value: Value) -> Result<()> {
        let def = self
            .node_type
            .property(name)
            .ok_or_else(|| InventoryError::property_not_found(&self.node_type.name, name))?;
        let value = coerce_property(&self.node_type, def, value)?;
        if value.is_null() {
            self.document.remove(name);
        } else {
            self.document.insert(name.to_string(), value);
        }
        Ok(())
    }

    fn to_value(&self) -> Value {
        Value::Object(self.document.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspection::ModelType;
    use crate::schema::fixtures;
    use serde_json::json;

    fn loader() -> ModelLoader {
        ModelLoader::new(fixtures::registry_v1(), ModelType::Document)
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let obj = loader()
            .from_value("complex", json!({"physical-location-id": "c1", "x-vendor-tag": 7}))
            .unwrap();
        assert_eq!(obj.get("x-vendor-tag"), None);
        let copy = obj.clone_deep().unwrap();
        assert_eq!(copy.to_value()["x-vendor-tag"], json!(7));
    }

    #[test]
    fn test_set_still_validates() {
        let mut obj = loader().introspector("complex").unwrap();
        obj.set("elevation", json!("12.5")).unwrap();
        assert_eq!(obj.get("elevation"), Some(json!(12.5)));
        assert!(obj.set("elevation", json!("high")).is_err());
        assert!(matches!(
            obj.set("x-vendor-tag", json!(1)).unwrap_err(),
            InventoryError::PropertyNotFound { .. }
        ));
    }

    #[test]
    fn test_identifier_fields_are_renamed() {
        let obj = DocumentObject::from_value(
            loader(),
            fixtures::registry_v1().node_type("complex").unwrap(),
            json!({"physicalLocationId": "c9", "extra": true}),
        )
        .unwrap();
        assert_eq!(obj.get("physical-location-id"), Some(json!("c9")));
        assert_eq!(obj.unknown_fields(), vec!["extra"]);
    }
}
