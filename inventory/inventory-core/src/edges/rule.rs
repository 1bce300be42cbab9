//! Edge rule definitions.

use crate::types::{edge_props, Direction, EdgeRecord, Value, VertexId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Whether an edge is structural (parent/child) or a cross reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeType {
    Tree,
    Cousin,
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tree => "tree",
            Self::Cousin => "cousin",
        })
    }
}

/// Declared multiplicity, read as `<out side>-to-<in side>` of the stored edge.
///
/// `OneToMany` means one out-vertex may reach many in-vertices but each
/// in-vertex has at most one such neighbour; `ManyToOne` is the converse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Multiplicity {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl Multiplicity {
    /// The in-vertex may have at most one such edge
    pub fn limits_in(&self) -> bool {
        matches!(self, Self::OneToOne | Self::OneToMany)
    }

    /// The out-vertex may have at most one such edge
    pub fn limits_out(&self) -> bool {
        matches!(self, Self::OneToOne | Self::ManyToOne)
    }
}

impl fmt::Display for Multiplicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OneToOne => "one-to-one",
            Self::OneToMany => "one-to-many",
            Self::ManyToOne => "many-to-one",
            Self::ManyToMany => "many-to-many",
        })
    }
}

/// Side of a stored edge a flag applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeFlag {
    #[default]
    None,
    Out,
    In,
    Both,
}

impl EdgeFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Out => "OUT",
            Self::In => "IN",
            Self::Both => "BOTH",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "NONE" => Some(Self::None),
            "OUT" => Some(Self::Out),
            "IN" => Some(Self::In),
            "BOTH" => Some(Self::Both),
            _ => None,
        }
    }

    /// Whether the flag names the given side of the edge
    pub fn covers(&self, side: Direction) -> bool {
        match (self, side) {
            (Self::Both, _) => true,
            (Self::Out, Direction::Out) | (Self::In, Direction::In) => true,
            _ => false,
        }
    }

    /// Read a flag stamped on a stored edge; absent or unreadable means `None`
    pub fn from_edge(edge: &EdgeRecord, key: &str) -> Self {
        edge.property_str(key).and_then(Self::parse).unwrap_or(Self::None)
    }
}

/// The side `vertex` occupies on `edge`.
pub fn side_of(edge: &EdgeRecord, vertex: VertexId) -> Direction {
    if edge.out_vertex == vertex {
        Direction::Out
    } else {
        Direction::In
    }
}

/// Whether `edge` makes `vertex` a dependent of the vertex on the other side.
pub fn is_parent_edge_of(edge: &EdgeRecord, vertex: VertexId) -> bool {
    let contains = EdgeFlag::from_edge(edge, edge_props::CONTAINS_OTHER_V);
    contains != EdgeFlag::None && contains.covers(side_of(edge, vertex).opposite())
}

/// Whether `edge` makes the other endpoint a dependent of `vertex`.
pub fn is_child_edge_of(edge: &EdgeRecord, vertex: VertexId) -> bool {
    let contains = EdgeFlag::from_edge(edge, edge_props::CONTAINS_OTHER_V);
    contains != EdgeFlag::None && contains.covers(side_of(edge, vertex))
}

/// Whether the edge was stamped from a tree rule
pub fn is_tree_edge(edge: &EdgeRecord) -> bool {
    EdgeFlag::from_edge(edge, edge_props::CONTAINS_OTHER_V) != EdgeFlag::None
}

/// Whether the edge is hidden from relationship listings
pub fn is_private_edge(edge: &EdgeRecord) -> bool {
    edge.properties
        .get(edge_props::PRIVATE)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn default_direction() -> Direction {
    Direction::Out
}

/// Relationship rule between an unordered pair of node types.
///
/// `from`/`to` reflect the order the rule was looked up in. Multiplicity
/// and the flags describe the stored edge (its out-vertex and in-vertex),
/// so they are identical whichever order the pair is queried in; only
/// `direction` changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EdgeRule {
    pub from: String,
    pub to: String,
    pub label: String,
    /// `Out` stores the edge `from -> to`, `In` stores it `to -> from`
    #[serde(default = "default_direction")]
    pub direction: Direction,
    pub multiplicity: Multiplicity,
    /// Side of the stored edge that owns the other endpoint
    #[serde(default)]
    pub contains_other_v: EdgeFlag,
    /// Side of the stored edge whose deletion also deletes the other endpoint
    #[serde(default)]
    pub delete_other_v: EdgeFlag,
    /// Side of the stored edge that cannot be deleted while the edge exists
    #[serde(default)]
    pub prevent_delete: EdgeFlag,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub description: Option<String>,
}

impl EdgeRule {
    pub fn edge_type(&self) -> EdgeType {
        if self.contains_other_v == EdgeFlag::None {
            EdgeType::Cousin
        } else {
            EdgeType::Tree
        }
    }

    pub fn is_tree(&self) -> bool {
        self.edge_type() == EdgeType::Tree
    }

    /// The same rule viewed from the other end of the pair
    pub fn flipped(&self) -> Self {
        Self {
            from: self.to.clone(),
            to: self.from.clone(),
            direction: self.direction.opposite(),
            ..self.clone()
        }
    }

    /// Order `(from_vertex, to_vertex)` into `(out, in)` of the stored edge
    pub fn stored_endpoints(&self, from_vertex: VertexId, to_vertex: VertexId) -> (VertexId, VertexId) {
        match self.direction {
            Direction::In => (to_vertex, from_vertex),
            _ => (from_vertex, to_vertex),
        }
    }

    /// Node types of the stored edge's `(out, in)` endpoints
    pub fn stored_types(&self) -> (&str, &str) {
        match self.direction {
            Direction::In => (&self.to, &self.from),
            _ => (&self.from, &self.to),
        }
    }

    /// Properties stamped on an edge created from this rule
    pub fn edge_properties(&self) -> BTreeMap<String, Value> {
        let mut props = BTreeMap::new();
        props.insert(
            edge_props::CONTAINS_OTHER_V.to_string(),
            Value::from(self.contains_other_v.as_str()),
        );
        props.insert(
            edge_props::DELETE_OTHER_V.to_string(),
            Value::from(self.delete_other_v.as_str()),
        );
        props.insert(
            edge_props::PREVENT_DELETE.to_string(),
            Value::from(self.prevent_delete.as_str()),
        );
        props.insert(edge_props::PRIVATE.to_string(), Value::Bool(self.private));
        props
    }

    /// The side of the stored edge a vertex of type `node_type` sits on
    pub fn stored_side_of(&self, node_type: &str) -> Direction {
        let (out_type, _) = self.stored_types();
        if out_type == node_type {
            Direction::Out
        } else {
            Direction::In
        }
    }
}
