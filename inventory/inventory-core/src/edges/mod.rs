//! Edge rule engine.
//!
//! Rules are declared once per unordered pair of node types. Looking a pair
//! up in reverse returns the same rule with its direction inverted.

pub mod rule;
pub mod rules;

pub use crate::schema::DeleteSemantic;
pub use rule::{
    is_child_edge_of, is_parent_edge_of, is_private_edge, is_tree_edge, side_of, EdgeFlag,
    EdgeRule, EdgeType, Multiplicity,
};
pub use rules::EdgeRules;
