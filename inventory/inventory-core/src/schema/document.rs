//! Serialized form of a schema version.
//!
//! A schema document is a JSON file listing node types and edge rules:
//!
//! ```json
//! {
//!   "version": "v1",
//!   "root": "inventory",
//!   "relationship-container": "relationship-list",
//!   "node-types": [
//!     { "name": "pserver", "keys": ["hostname"], "delete-semantic": "cascade-to-children",
//!       "properties": [ { "name": "hostname", "type": "string" } ] }
//!   ],
//!   "edge-rules": [
//!     { "from": "pserver", "to": "complex", "label": "locatedIn",
//!       "direction": "out", "multiplicity": "many-to-one" }
//!   ]
//! }
//! ```

use crate::edges::EdgeRule;
use crate::schema::model::{DeleteSemantic, Visibility};
use crate::types::Value;
use serde::{Deserialize, Serialize};

fn default_relationship_container() -> String {
    "relationship-list".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SchemaDocument {
    pub version: String,
    pub root: String,
    #[serde(default = "default_relationship_container")]
    pub relationship_container: String,
    pub node_types: Vec<NodeTypeDocument>,
    #[serde(default)]
    pub edge_rules: Vec<EdgeRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NodeTypeDocument {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default)]
    pub inheritors: Vec<String>,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub alternate_keys: Vec<String>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub properties: Vec<PropertyDocument>,
    #[serde(default)]
    pub delete_semantic: Option<DeleteSemantic>,
    #[serde(default)]
    pub name_props: Vec<String>,
    #[serde(default)]
    pub dependent_on: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PropertyDocument {
    pub name: String,
    /// Scalar type name, `complex`, or `list`
    #[serde(rename = "type")]
    pub type_name: String,
    /// Target node type (complex) or element type (list)
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub db_alias: Option<String>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub indexed: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub description: Option<String>,
}

impl SchemaDocument {
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
