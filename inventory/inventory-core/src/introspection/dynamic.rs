//! Schema-normalized object backend.

use crate::error::{InventoryError, Result};
use crate::introspection::{coerce_property, json_type_name, Introspector, ModelLoader};
use crate::schema::{NodeType, PropertyDef, PropertyKind};
use crate::types::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Object holding only declared properties, each already coerced to its
/// declared type. Nested complex values are normalized recursively.
#[derive(Debug, Clone)]
pub struct DynamicObject {
    loader: ModelLoader,
    node_type: Arc<NodeType>,
    values: BTreeMap<String, Value>,
}

impl DynamicObject {
    pub fn new(loader: ModelLoader, node_type: Arc<NodeType>) -> Self {
        Self {
            loader,
            node_type,
            values: BTreeMap::new(),
        }
    }

    /// Build from a JSON object; undeclared fields are rejected
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
        let mut obj = Self::new(loader, node_type);
        for (field, value) in map {
            let name = obj
                .loader
                .resolve_field(&obj.node_type, &field)
                .ok_or_else(|| InventoryError::property_not_found(&obj.node_type.name, &field))?;
            obj.set(&name, value)?;
        }
        Ok(obj)
    }

    fn normalize(&self, def: &PropertyDef, value: Value) -> Result<Value> {
        let value = coerce_property(&self.node_type, def, value)?;
        match (def.kind, value) {
            (PropertyKind::Complex, value @ Value::Object(_)) => self.normalize_nested(def, value),
            (PropertyKind::ComplexList, Value::Array(items)) => items
                .into_iter()
                .map(|item| self.normalize_nested(def, item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            (_, value) => Ok(value),
        }
    }

    fn normalize_nested(&self, def: &PropertyDef, value: Value) -> Result<Value> {
        let target = self.loader.resolve_type(&def.target)?;
        Ok(Self::from_value(self.loader.clone(), target, value)?.to_value())
    }
}

impl Introspector for DynamicObject {
    fn node_type(&self) -> &NodeType {
        &self.node_type
    }

    fn loader(&self) -> &ModelLoader {
        &self.loader
    }

    fn get(&self, name: &str) -> Option<Value> {
        self.values.get(name).cloned()
    }

    fn set(&mut self, name: &str, value: Value) -> Result<()> {
        let def = self
            .node_type
            .property(name)
            .ok_or_else(|| InventoryError::property_not_found(&self.node_type.name, name))?
            .clone();
        let value = self.normalize(&def, value)?;
        if value.is_null() {
            self.values.remove(name);
        } else {
            self.values.insert(def.name, value);
        }
        Ok(())
    }

    fn to_value(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}
