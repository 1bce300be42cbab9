//! Traversal plans compiled from paths and relationship descriptors.

use inventory_core::types::{value_to_string, Direction, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One primitive step of a traversal.
///
/// Filters narrow the current frontier; a hop replaces the frontier with
/// the neighbours reached over edges with the given label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "kebab-case")]
pub enum QueryStep {
    /// Keep vertices whose property equals the value
    PropertyEquals { key: String, value: Value },
    /// Keep vertices whose node type is one of `types`
    NodeType { types: Vec<String> },
    /// Follow edges labelled `label` leaving the frontier in `direction`
    EdgeHop { label: String, direction: Direction },
}

impl QueryStep {
    /// Whether a stored property satisfies a `PropertyEquals` value.
    ///
    /// Path keys arrive as strings, so values compare by their rendered form
    /// when the JSON types differ. Multi-valued properties match any element.
    pub fn value_matches(stored: &Value, expected: &Value) -> bool {
        if stored == expected {
            return true;
        }
        if let Value::Array(items) = stored {
            return items.iter().any(|item| Self::value_matches(item, expected));
        }
        match (value_to_string(stored), value_to_string(expected)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for QueryStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PropertyEquals { key, value } => write!(f, "has({}, {})", key, value),
            Self::NodeType { types } => write!(f, "type({})", types.join("|")),
            Self::EdgeHop { label, direction } => write!(f, "{}({})", direction, label),
        }
    }
}

/// An ordered list of steps plus facts about what they resolve to.
///
/// A plan starts from every vertex of the graph. The optional boundary marks
/// the prefix of steps that resolves the parent of the final resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraversalPlan {
    pub steps: Vec<QueryStep>,
    pub boundary: Option<usize>,
    pub result_type: Option<String>,
    pub parent_result_type: Option<String>,
    pub container_type: Option<String>,
}

impl TraversalPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the result has a parent that must be resolved first
    pub fn is_dependent(&self) -> bool {
        self.parent_result_type.is_some()
    }

    /// The steps before the boundary, resolving the parent resource.
    ///
    /// Without a boundary the ancestor plan is empty.
    pub fn ancestor_plan(&self) -> TraversalPlan {
        let end = self.boundary.unwrap_or(0).min(self.steps.len());
        TraversalPlan {
            steps: self.steps[..end].to_vec(),
            boundary: None,
            result_type: self.parent_result_type.clone(),
            parent_result_type: None,
            container_type: None,
        }
    }
}

impl fmt::Display for TraversalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("g.V()")?;
        for (i, step) in self.steps.iter().enumerate() {
            if self.boundary == Some(i) {
                f.write_str(" |")?;
            }
            write!(f, ".{}", step)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> TraversalPlan {
        TraversalPlan {
            steps: vec![
                QueryStep::PropertyEquals {
                    key: "hostname".into(),
                    value: json!("h1"),
                },
                QueryStep::NodeType {
                    types: vec!["pserver".into()],
                },
                QueryStep::EdgeHop {
                    label: "has".into(),
                    direction: Direction::Out,
                },
                QueryStep::PropertyEquals {
                    key: "interface-name".into(),
                    value: json!("eth0"),
                },
            ],
            boundary: Some(2),
            result_type: Some("p-interface".into()),
            parent_result_type: Some("pserver".into()),
            container_type: None,
        }
    }

    #[test]
    fn test_ancestor_plan_stops_at_boundary() {
        let plan = sample();
        let ancestor = plan.ancestor_plan();
        assert_eq!(ancestor.len(), 2);
        assert_eq!(ancestor.result_type.as_deref(), Some("pserver"));
        assert!(!ancestor.is_dependent());
        assert!(plan.is_dependent());
        assert!(TraversalPlan::new().ancestor_plan().is_empty());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            sample().to_string(),
            "g.V().has(hostname, \"h1\").type(pserver) |.OUT(has).has(interface-name, \"eth0\")"
        );
    }

    #[test]
    fn test_value_matches_across_json_types() {
        assert!(QueryStep::value_matches(&json!(42), &json!("42")));
        assert!(QueryStep::value_matches(&json!(true), &json!("true")));
        assert!(QueryStep::value_matches(&json!(["a", "b"]), &json!("b")));
        assert!(!QueryStep::value_matches(&json!("a"), &json!("b")));
        assert!(!QueryStep::value_matches(&json!(null), &json!("null")));
    }
}
