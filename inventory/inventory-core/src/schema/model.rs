//! Node type and property definitions.

use crate::types::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Scalar value types a property may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    String,
    Integer,
    Long,
    Boolean,
    Float,
    Double,
}

impl ScalarType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "long" => Some(Self::Long),
            "boolean" => Some(Self::Boolean),
            "float" => Some(Self::Float),
            "double" => Some(Self::Double),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Long => "long",
            Self::Boolean => "boolean",
            Self::Float => "float",
            Self::Double => "double",
        }
    }

    /// Convert `value` into this scalar type, or `None` when no conversion exists.
    ///
    /// Strings are parsed into numbers and booleans; numbers and booleans are
    /// rendered into strings; integers are range-checked.
    pub fn coerce(&self, value: &Value) -> Option<Value> {
        match (self, value) {
            (_, Value::Null) => Some(Value::Null),
            (Self::String, Value::String(_)) => Some(value.clone()),
            (Self::String, Value::Number(n)) => Some(Value::String(n.to_string())),
            (Self::String, Value::Bool(b)) => Some(Value::String(b.to_string())),
            (Self::Boolean, Value::Bool(_)) => Some(value.clone()),
            (Self::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            (Self::Integer, _) => Self::as_i64(value)
                .filter(|n| i32::try_from(*n).is_ok())
                .map(Value::from),
            (Self::Long, _) => Self::as_i64(value).map(Value::from),
            (Self::Float | Self::Double, Value::Number(n)) => n.as_f64().map(Value::from),
            (Self::Float | Self::Double, Value::String(s)) => {
                s.trim().parse::<f64>().ok().map(Value::from)
            }
            _ => None,
        }
    }

    fn as_i64(value: &Value) -> Option<i64> {
        match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PropertyKind {
    Scalar,
    ScalarList,
    Complex,
    ComplexList,
}

impl PropertyKind {
    pub fn is_complex(&self) -> bool {
        matches!(self, Self::Complex | Self::ComplexList)
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Self::ScalarList | Self::ComplexList)
    }
}

/// Whether a property is exposed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Internal,
}

/// Per-property metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyMetadata {
    /// Name the property is stored under when it differs from the logical name
    pub db_alias: Option<String>,
    pub visibility: Visibility,
    pub indexed: bool,
    pub unique: bool,
    pub description: Option<String>,
}

/// A declared property of a node type.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDef {
    pub name: String,
    pub kind: PropertyKind,
    /// Scalar type name for scalar kinds, node type name for complex kinds
    pub target: String,
    pub scalar: Option<ScalarType>,
    pub default: Option<Value>,
    pub metadata: PropertyMetadata,
}

impl PropertyDef {
    pub fn is_complex(&self) -> bool {
        self.kind.is_complex()
    }

    pub fn is_list(&self) -> bool {
        self.kind.is_list()
    }

    /// Property name used on the stored vertex
    pub fn storage_name(&self) -> &str {
        self.metadata.db_alias.as_deref().unwrap_or(&self.name)
    }

    pub fn is_internal(&self) -> bool {
        self.metadata.visibility == Visibility::Internal
    }
}

/// What deleting a vertex of a given type is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeleteSemantic {
    /// Delete the vertex and every dependent reachable through tree edges
    CascadeToChildren,
    /// Refuse when the vertex has any edge other than the one to its parent
    ErrorIfAnyEdges,
    /// Refuse when any in-edge exists, unless the only in-edge is the parent edge
    ErrorIfAnyInEdgesUnlessSoleParent,
    /// Delete only this vertex; refuse when a dependent child exists
    ThisNodeOnly,
}

impl DeleteSemantic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CascadeToChildren => "cascade-to-children",
            Self::ErrorIfAnyEdges => "error-if-any-edges",
            Self::ErrorIfAnyInEdgesUnlessSoleParent => "error-if-any-in-edges-unless-sole-parent",
            Self::ThisNodeOnly => "this-node-only",
        }
    }
}

impl fmt::Display for DeleteSemantic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared resource type. Immutable once its schema version is loaded.
#[derive(Debug, Clone)]
pub struct NodeType {
    pub name: String,
    pub namespace: Option<String>,
    pub container: bool,
    pub is_abstract: bool,
    pub inheritors: Vec<String>,
    pub keys: Vec<String>,
    pub alternate_keys: Vec<String>,
    pub required: Vec<String>,
    pub properties: Vec<PropertyDef>,
    pub delete_semantic: Option<DeleteSemantic>,
    pub name_props: Vec<String>,
    pub dependent_on: Vec<String>,
    pub description: Option<String>,
    index: HashMap<String, usize>,
}

impl NodeType {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        namespace: Option<String>,
        is_abstract: bool,
        inheritors: Vec<String>,
        keys: Vec<String>,
        alternate_keys: Vec<String>,
        required: Vec<String>,
        properties: Vec<PropertyDef>,
        delete_semantic: Option<DeleteSemantic>,
        name_props: Vec<String>,
        dependent_on: Vec<String>,
        description: Option<String>,
    ) -> Self {
        let index = properties
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name.clone(), i))
            .collect();
        let container =
            properties.len() == 1 && properties[0].kind == PropertyKind::ComplexList;
        Self {
            name,
            namespace,
            container,
            is_abstract,
            inheritors,
            keys,
            alternate_keys,
            required,
            properties,
            delete_semantic,
            name_props,
            dependent_on,
            description,
            index,
        }
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.index.get(name).map(|&i| &self.properties[i])
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|p| p.name.as_str())
    }

    /// True iff the type has exactly one property and it is a list of complex values
    pub fn is_container(&self) -> bool {
        self.container
    }

    /// The list property of a container type
    pub fn container_item(&self) -> Option<&PropertyDef> {
        if self.container {
            self.properties.first()
        } else {
            None
        }
    }

    pub fn is_key(&self, name: &str) -> bool {
        self.keys.iter().any(|k| k == name)
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|k| k == name)
    }

    /// Find a property by its stored (aliased) name
    pub fn property_by_storage_name(&self, stored: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.storage_name() == stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_coercion() {
        assert_eq!(ScalarType::Integer.coerce(&json!("12")), Some(json!(12)));
        assert_eq!(ScalarType::Long.coerce(&json!(" 9000000000 ")), Some(json!(9_000_000_000i64)));
        assert_eq!(ScalarType::Integer.coerce(&json!(9_000_000_000i64)), None);
        assert_eq!(ScalarType::Boolean.coerce(&json!("TRUE")), Some(json!(true)));
        assert_eq!(ScalarType::Boolean.coerce(&json!("yes")), None);
        assert_eq!(ScalarType::String.coerce(&json!(5)), Some(json!("5")));
        assert_eq!(ScalarType::Double.coerce(&json!("1.5")), Some(json!(1.5)));
        assert_eq!(ScalarType::Integer.coerce(&json!({"a": 1})), None);
        assert_eq!(ScalarType::String.coerce(&json!(["a"])), None);
    }

    #[test]
    fn test_delete_semantic_wire_names() {
        let s: DeleteSemantic =
            serde_json::from_str("\"error-if-any-in-edges-unless-sole-parent\"").unwrap();
        assert_eq!(s, DeleteSemantic::ErrorIfAnyInEdgesUnlessSoleParent);
        assert_eq!(s.to_string(), "error-if-any-in-edges-unless-sole-parent");
    }
}
