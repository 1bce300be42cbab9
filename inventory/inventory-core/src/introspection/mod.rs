//! Schema-driven object model.
//!
//! Upper layers manipulate resources exclusively through the
//! [`Introspector`] trait. Which backing representation is used is decided
//! once, by the [`ModelType`] of the [`ModelLoader`] that produced the object.

pub mod document;
pub mod dynamic;
pub mod loader;
pub mod walker;

pub use document::DocumentObject;
pub use dynamic::DynamicObject;
pub use loader::ModelLoader;
pub use walker::{DefaultsApplier, IntrospectorWalker, WalkVisitor};

use crate::error::{InventoryError, Result};
use crate::schema::{NodeType, PropertyDef, PropertyKind, PropertyMetadata};
use crate::types::{value_to_string, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Backing representation of introspected objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    /// Schema-normalized property map; unknown fields are rejected
    #[default]
    Dynamic,
    /// Raw JSON document; unknown fields are carried verbatim
    Document,
}

impl FromStr for ModelType {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "dynamic" => Ok(Self::Dynamic),
            "document" => Ok(Self::Document),
            _ => Err(InventoryError::config(format!("Invalid model type: {}", s))),
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dynamic => write!(f, "dynamic"),
            Self::Document => write!(f, "document"),
        }
    }
}

/// Output encoding for [`Introspector::marshal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarshalFormat {
    #[default]
    Json,
    JsonPretty,
    Yaml,
}

/// Uniform view over one resource instance.
///
/// `get` on an undeclared name returns `None`, while `set` on the same name
/// fails with [`InventoryError::PropertyNotFound`]. Callers rely on both.
pub trait Introspector: Send + Sync + fmt::Debug {
    /// Schema declaration of the wrapped type
    fn node_type(&self) -> &NodeType;

    /// Loader that produced this object
    fn loader(&self) -> &ModelLoader;

    /// Value of a declared property
    fn get(&self, name: &str) -> Option<Value>;

    /// Write a declared property, coercing the value to the declared type.
    /// Writing `Null` clears the property.
    fn set(&mut self, name: &str, value: Value) -> Result<()>;

    /// The whole object as a JSON value
    fn to_value(&self) -> Value;

    /// Wire name of the wrapped type
    fn name(&self) -> &str {
        &self.node_type().name
    }

    fn properties(&self) -> Vec<String> {
        self.node_type().property_names().map(str::to_string).collect()
    }

    fn keys(&self) -> Vec<String> {
        self.node_type().keys.clone()
    }

    fn required_properties(&self) -> Vec<String> {
        self.node_type().required.clone()
    }

    fn is_container(&self) -> bool {
        self.node_type().is_container()
    }

    fn is_abstract(&self) -> bool {
        self.node_type().is_abstract
    }

    fn is_complex(&self, name: &str) -> bool {
        self.node_type().property(name).is_some_and(PropertyDef::is_complex)
    }

    fn is_list(&self, name: &str) -> bool {
        self.node_type().property(name).is_some_and(PropertyDef::is_list)
    }

    fn metadata(&self, name: &str) -> Option<&PropertyMetadata> {
        self.node_type().property(name).map(|p| &p.metadata)
    }

    /// Key names paired with their rendered values; every key must be set
    fn key_values(&self) -> Result<Vec<(String, String)>> {
        self.node_type()
            .keys
            .iter()
            .map(|key| {
                self.get(key)
                    .as_ref()
                    .and_then(value_to_string)
                    .map(|v| (key.clone(), v))
                    .ok_or_else(|| {
                        InventoryError::invalid_input(format!(
                            "key '{}' of '{}' is not set",
                            key,
                            self.name()
                        ))
                    })
            })
            .collect()
    }

    /// Path of this object relative to its parent resource.
    ///
    /// Containers render as `/<container>`, resources as
    /// `/<container>/<type>/<key>...` with every key percent-encoded.
    fn uri(&self) -> Result<String> {
        let prefix = self.loader().uri_prefix().unwrap_or("");
        if self.is_container() {
            return Ok(format!("{}/{}", prefix, self.name()));
        }
        let mut uri = prefix.to_string();
        if let Some(container) = self.loader().registry().container_of(self.name()) {
            uri.push('/');
            uri.push_str(&container.name);
        }
        uri.push('/');
        uri.push_str(self.name());
        for (_, value) in self.key_values()? {
            uri.push('/');
            uri.push_str(&urlencoding::encode(&value));
        }
        Ok(uri)
    }

    /// Encode the object, omitting internal-visibility properties
    fn marshal(&self, format: MarshalFormat) -> Result<String> {
        let registry = self.loader().registry();
        let mut value = self.to_value();
        strip_internal(registry, self.node_type(), &mut value);
        match format {
            MarshalFormat::Json => Ok(serde_json::to_string(&value)?),
            MarshalFormat::JsonPretty => Ok(serde_json::to_string_pretty(&value)?),
            MarshalFormat::Yaml => serde_yaml::to_string(&value)
                .map_err(|e| InventoryError::internal(format!("YAML encoding failed: {}", e))),
        }
    }

    /// Independent copy produced by a full encode/decode round trip
    fn clone_deep(&self) -> Result<Box<dyn Introspector>> {
        let encoded = serde_json::to_string(&self.to_value())?;
        self.loader()
            .unmarshal(self.name(), &encoded, MarshalFormat::Json)
    }

    /// A complex singular property wrapped as an object of its target type
    fn child(&self, name: &str) -> Result<Option<Box<dyn Introspector>>> {
        let def = complex_property(self.node_type(), name, PropertyKind::Complex)?;
        match self.get(name) {
            Some(value @ Value::Object(_)) => {
                Ok(Some(self.loader().from_value(&def.target, value)?))
            }
            _ => Ok(None),
        }
    }

    /// Items of a complex list property, each wrapped as an object
    fn children(&self, name: &str) -> Result<Vec<Box<dyn Introspector>>> {
        let def = complex_property(self.node_type(), name, PropertyKind::ComplexList)?;
        match self.get(name) {
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|item| self.loader().from_value(&def.target, item))
                .collect(),
            _ => Ok(Vec::new()),
        }
    }

    fn set_child(&mut self, name: &str, child: &dyn Introspector) -> Result<()> {
        self.set(name, child.to_value())
    }

    fn set_children(&mut self, name: &str, children: &[Box<dyn Introspector>]) -> Result<()> {
        let items = children.iter().map(|c| c.to_value()).collect();
        self.set(name, Value::Array(items))
    }
}

fn complex_property<'a>(
    node_type: &'a NodeType,
    name: &str,
    kind: PropertyKind,
) -> Result<&'a PropertyDef> {
    match node_type.property(name) {
        Some(def) if def.kind == kind => Ok(def),
        Some(def) => Err(InventoryError::TypeMismatch {
            node_type: node_type.name.clone(),
            property: name.to_string(),
            expected: format!("{:?}", kind),
            found: format!("{:?}", def.kind),
        }),
        None => Err(InventoryError::property_not_found(&node_type.name, name)),
    }
}

/// JSON type name used in mismatch messages
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Coerce a value to a property's declared shape.
///
/// Scalars go through [`ScalarType::coerce`](crate::schema::ScalarType::coerce);
/// a single scalar written to a scalar list becomes a one-element list.
/// Complex values are only shape-checked here.
pub fn coerce_property(node_type: &NodeType, def: &PropertyDef, value: Value) -> Result<Value> {
    let mismatch = |found: &Value| InventoryError::TypeMismatch {
        node_type: node_type.name.clone(),
        property: def.name.clone(),
        expected: match def.kind {
            PropertyKind::Scalar => def.target.clone(),
            PropertyKind::ScalarList => format!("list of {}", def.target),
            PropertyKind::Complex => def.target.clone(),
            PropertyKind::ComplexList => format!("list of {}", def.target),
        },
        found: json_type_name(found).to_string(),
    };

    if value.is_null() {
        return Ok(Value::Null);
    }
    match def.kind {
        PropertyKind::Scalar => {
            let scalar = def.scalar.ok_or_else(|| mismatch(&value))?;
            if value.is_array() || value.is_object() {
                return Err(mismatch(&value));
            }
            scalar.coerce(&value).ok_or_else(|| mismatch(&value))
        }
        PropertyKind::ScalarList => {
            let scalar = def.scalar.ok_or_else(|| mismatch(&value))?;
            let items = match value {
                Value::Array(items) => items,
                Value::Object(_) => return Err(mismatch(&value)),
                single => vec![single],
            };
            items
                .into_iter()
                .map(|item| {
                    if item.is_array() || item.is_object() {
                        return Err(mismatch(&item));
                    }
                    scalar.coerce(&item).ok_or_else(|| mismatch(&item))
                })
                .collect::<Result<Vec<_>>>()
                .map(Value::Array)
        }
        PropertyKind::Complex => match value {
            Value::Object(_) => Ok(value),
            other => Err(mismatch(&other)),
        },
        PropertyKind::ComplexList => match value {
            Value::Array(items) if items.iter().all(Value::is_object) => Ok(Value::Array(items)),
            other => Err(mismatch(&other)),
        },
    }
}

/// Remove internal-visibility properties from an encoded object, recursively
fn strip_internal(
    registry: &crate::schema::SchemaRegistry,
    node_type: &NodeType,
    value: &mut Value,
) {
    let Value::Object(map) = value else {
        return;
    };
    for def in &node_type.properties {
        if def.is_internal() {
            map.remove(&def.name);
            continue;
        }
        if !def.is_complex() {
            continue;
        }
        let Some(target) = registry.get(&def.target) else {
            continue;
        };
        match map.get_mut(&def.name) {
            Some(Value::Array(items)) => {
                for item in items {
                    strip_internal(registry, target, item);
                }
            }
            Some(nested @ Value::Object(_)) => strip_internal(registry, target, nested),
            _ => {}
        }
    }
}
