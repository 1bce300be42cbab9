//! Core graph types shared by every inventory component.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Property value as stored on vertices and carried by introspectors.
pub use serde_json::Value;

/// Reserved vertex property names stamped by the serializer.
pub mod vertex_props {
    pub const NODE_TYPE: &str = "node-type";
    pub const RESOURCE_VERSION: &str = "resource-version";
    pub const CREATED_TS: &str = "created-ts";
    pub const LAST_MOD_TS: &str = "last-mod-ts";
    pub const SOURCE_OF_TRUTH: &str = "source-of-truth";
    pub const LAST_MOD_SOURCE_OF_TRUTH: &str = "last-mod-source-of-truth";
    pub const VERTEX_URI: &str = "vertex-uri";

    /// Bookkeeping properties never copied back into an object's schema fields
    pub const RESERVED: &[&str] = &[
        NODE_TYPE,
        CREATED_TS,
        LAST_MOD_TS,
        SOURCE_OF_TRUTH,
        LAST_MOD_SOURCE_OF_TRUTH,
        VERTEX_URI,
    ];
}

/// Reserved edge property names stamped from edge rules.
pub mod edge_props {
    pub const CONTAINS_OTHER_V: &str = "contains-other-v";
    pub const DELETE_OTHER_V: &str = "delete-other-v";
    pub const PREVENT_DELETE: &str = "prevent-delete";
    pub const PRIVATE: &str = "private";
}

/// Identifier of a vertex inside a graph store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VertexId(pub u64);

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Identifier of an edge inside a graph store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(pub u64);

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Edge traversal direction relative to a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Out,
    In,
    Both,
}

impl Direction {
    /// The opposite direction; `Both` is its own opposite
    pub fn opposite(self) -> Self {
        match self {
            Self::Out => Self::In,
            Self::In => Self::Out,
            Self::Both => Self::Both,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Out => "OUT",
            Self::In => "IN",
            Self::Both => "BOTH",
        };
        f.write_str(s)
    }
}

/// Snapshot of a stored edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub id: EdgeId,
    pub label: String,
    pub out_vertex: VertexId,
    pub in_vertex: VertexId,
    pub properties: BTreeMap<String, Value>,
}

impl EdgeRecord {
    /// The endpoint opposite to `vertex`
    pub fn other(&self, vertex: VertexId) -> VertexId {
        if self.out_vertex == vertex {
            self.in_vertex
        } else {
            self.out_vertex
        }
    }

    /// String-valued edge property
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }
}

/// Opaque optimistic-concurrency token stamped on every vertex.
///
/// Tokens are millisecond timestamps rendered as strings. A freshly minted
/// token is always strictly greater than the one it replaces, so two
/// mutations within the same millisecond still produce distinct tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceVersion(String);

impl ResourceVersion {
    /// Mint a token for a brand new vertex
    pub fn initial() -> Self {
        Self(Utc::now().timestamp_millis().to_string())
    }

    /// Mint the token that replaces `previous`
    pub fn next_after(previous: Option<&str>) -> Self {
        let now = Utc::now().timestamp_millis();
        let floor = previous
            .and_then(|p| p.parse::<i64>().ok())
            .map(|p| p + 1)
            .unwrap_or(i64::MIN);
        Self(now.max(floor).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourceVersion {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for ResourceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Render a scalar value the way it appears in paths and relationship data.
pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_version_strictly_increases() {
        let first = ResourceVersion::initial();
        let second = ResourceVersion::next_after(Some(first.as_str()));
        let third = ResourceVersion::next_after(Some(second.as_str()));

        let a: i64 = first.as_str().parse().unwrap();
        let b: i64 = second.as_str().parse().unwrap();
        let c: i64 = third.as_str().parse().unwrap();
        assert!(b > a);
        assert!(c > b);
    }

    #[test]
    fn test_resource_version_tolerates_foreign_tokens() {
        let next = ResourceVersion::next_after(Some("not-a-number"));
        assert!(next.as_str().parse::<i64>().is_ok());
    }

    #[test]
    fn test_edge_other_endpoint() {
        let edge = EdgeRecord {
            id: EdgeId(1),
            label: "has".into(),
            out_vertex: VertexId(1),
            in_vertex: VertexId(2),
            properties: BTreeMap::new(),
        };
        assert_eq!(edge.other(VertexId(1)), VertexId(2));
        assert_eq!(edge.other(VertexId(2)), VertexId(1));
    }

    #[test]
    fn test_value_to_string() {
        assert_eq!(value_to_string(&Value::from("a b")), Some("a b".to_string()));
        assert_eq!(value_to_string(&Value::from(42)), Some("42".to_string()));
        assert_eq!(value_to_string(&Value::Bool(true)), Some("true".to_string()));
        assert_eq!(value_to_string(&Value::Null), None);
    }
}
