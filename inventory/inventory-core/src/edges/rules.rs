//! Edge rule table and edge creation.

use crate::edges::rule::{EdgeRule, EdgeType};
use crate::error::{InventoryError, Result};
use crate::schema::{DeleteSemantic, SchemaRegistry};
use crate::traits::GraphTransaction;
use crate::types::{Direction, EdgeId, EdgeRecord, VertexId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Relationship rules of one schema version, keyed by unordered type pair.
#[derive(Debug)]
pub struct EdgeRules {
    registry: Arc<SchemaRegistry>,
    rules: HashMap<(String, String), EdgeRule>,
}

impl EdgeRules {
    /// Index the rules declared by a schema version
    pub fn from_registry(registry: Arc<SchemaRegistry>) -> Result<Self> {
        let rules = registry.edge_rules().to_vec();
        Self::from_definitions(registry, rules)
    }

    /// Index an explicit rule list against a registry
    pub fn from_definitions(registry: Arc<SchemaRegistry>, rules: Vec<EdgeRule>) -> Result<Self> {
        let mut table = HashMap::with_capacity(rules.len());
        for rule in rules {
            for end in [&rule.from, &rule.to] {
                if !registry.has_type(end) {
                    return Err(InventoryError::schema(format!(
                        "edge rule '{}' references unknown type '{}'",
                        rule.label, end
                    )));
                }
            }
            if table.contains_key(&(rule.to.clone(), rule.from.clone())) {
                return Err(InventoryError::schema(format!(
                    "edge rule for pair ({}, {}) declared more than once",
                    rule.from, rule.to
                )));
            }
            let key = (rule.from.clone(), rule.to.clone());
            if table.insert(key, rule).is_some() {
                return Err(InventoryError::schema("edge rule declared more than once"));
            }
        }
        Ok(Self {
            registry,
            rules: table,
        })
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Rules in their declared orientation
    pub fn rules(&self) -> impl Iterator<Item = &EdgeRule> {
        self.rules.values()
    }

    /// The rule for a pair; looking up `(b, a)` for a rule declared `(a, b)`
    /// returns the same rule with its direction inverted
    pub fn rule_for(&self, a: &str, b: &str) -> Result<EdgeRule> {
        if let Some(rule) = self.rules.get(&(a.to_string(), b.to_string())) {
            return Ok(rule.clone());
        }
        if let Some(rule) = self.rules.get(&(b.to_string(), a.to_string())) {
            return Ok(rule.flipped());
        }
        debug!("No edge rule between {} and {}", a, b);
        Err(InventoryError::NoEdgeRule {
            from: a.to_string(),
            to: b.to_string(),
        })
    }

    /// The rule for a pair, required to be of the requested kind
    pub fn rule_for_kind(&self, edge_type: EdgeType, a: &str, b: &str) -> Result<EdgeRule> {
        let rule = self.rule_for(a, b)?;
        if rule.edge_type() != edge_type {
            return Err(InventoryError::EdgeKindMismatch {
                from: a.to_string(),
                to: b.to_string(),
                declared: rule.edge_type().to_string(),
                requested: edge_type.to_string(),
            });
        }
        Ok(rule)
    }

    pub fn has_rule(&self, a: &str, b: &str) -> bool {
        self.rules.contains_key(&(a.to_string(), b.to_string()))
            || self.rules.contains_key(&(b.to_string(), a.to_string()))
    }

    /// Every rule involving `node_type`, oriented so that `from == node_type`
    pub fn rules_touching(&self, node_type: &str) -> Vec<EdgeRule> {
        let mut touching: Vec<EdgeRule> = self
            .rules
            .values()
            .filter_map(|r| {
                if r.from == node_type {
                    Some(r.clone())
                } else if r.to == node_type {
                    Some(r.flipped())
                } else {
                    None
                }
            })
            .collect();
        touching.sort_by(|a, b| a.to.cmp(&b.to));
        touching
    }

    /// Tree rules under which `node_type` owns the other endpoint
    pub fn tree_children(&self, node_type: &str) -> Vec<EdgeRule> {
        self.rules_touching(node_type)
            .into_iter()
            .filter(|r| r.is_tree() && r.contains_other_v.covers(r.stored_side_of(&r.from)))
            .collect()
    }

    /// Delete semantic declared for a concrete type
    pub fn delete_semantic_for(&self, node_type: &str) -> Result<DeleteSemantic> {
        self.registry
            .node_type(node_type)?
            .delete_semantic
            .ok_or_else(|| {
                InventoryError::schema(format!("no delete semantic declared for '{}'", node_type))
            })
    }

    /// Create an edge of the requested kind between two vertices.
    ///
    /// The rule is resolved from the vertices' stored node types. The edge is
    /// stored in the rule's direction, refused if it already exists or if it
    /// would break the rule's multiplicity, and stamped with the rule flags.
    pub fn add_edge(
        &self,
        tx: &mut dyn GraphTransaction,
        edge_type: EdgeType,
        a: VertexId,
        b: VertexId,
    ) -> Result<EdgeId> {
        let a_type = require_node_type(&*tx, a)?;
        let b_type = require_node_type(&*tx, b)?;
        let rule = self.rule_for_kind(edge_type, &a_type, &b_type)?;
        let (out_vertex, in_vertex) = rule.stored_endpoints(a, b);

        if self.find_edge(&*tx, &rule, out_vertex, in_vertex)?.is_some() {
            let (out_type, in_type) = rule.stored_types();
            return Err(InventoryError::EdgeExists {
                label: rule.label.clone(),
                out_type: out_type.to_string(),
                in_type: in_type.to_string(),
            });
        }
        self.validate_multiplicity(&*tx, &rule, out_vertex, in_vertex)?;

        let id = tx.add_edge(&rule.label, out_vertex, in_vertex, rule.edge_properties())?;
        debug!(
            "Added {} edge '{}' {} -> {} ({})",
            rule.edge_type(),
            rule.label,
            out_vertex,
            in_vertex,
            id
        );
        Ok(id)
    }

    /// Existing edge `out -> in` carrying the rule's label
    pub fn find_edge(
        &self,
        tx: &dyn GraphTransaction,
        rule: &EdgeRule,
        out_vertex: VertexId,
        in_vertex: VertexId,
    ) -> Result<Option<EdgeRecord>> {
        Ok(tx
            .edges(out_vertex, Direction::Out, Some(&rule.label))?
            .into_iter()
            .find(|e| e.in_vertex == in_vertex))
    }

    /// Check that adding `out -> in` under `rule` respects its multiplicity.
    ///
    /// Counts are taken live from the transaction, restricted to edges with
    /// the same label whose far endpoint has the same node type.
    pub fn validate_multiplicity(
        &self,
        tx: &dyn GraphTransaction,
        rule: &EdgeRule,
        out_vertex: VertexId,
        in_vertex: VertexId,
    ) -> Result<()> {
        let (out_type, in_type) = rule.stored_types();

        let violation = if rule.multiplicity.limits_in()
            && count_neighbours(tx, in_vertex, Direction::In, &rule.label, out_type)? > 0
        {
            true
        } else {
            rule.multiplicity.limits_out()
                && count_neighbours(tx, out_vertex, Direction::Out, &rule.label, in_type)? > 0
        };

        if violation {
            return Err(InventoryError::Cardinality {
                label: rule.label.clone(),
                out_type: out_type.to_string(),
                in_type: in_type.to_string(),
                multiplicity: rule.multiplicity.to_string(),
            });
        }
        Ok(())
    }
}

fn require_node_type(tx: &dyn GraphTransaction, vertex: VertexId) -> Result<String> {
    tx.node_type(vertex)?
        .ok_or_else(|| InventoryError::DamagedVertex(vertex.to_string()))
}

fn count_neighbours(
    tx: &dyn GraphTransaction,
    vertex: VertexId,
    direction: Direction,
    label: &str,
    neighbour_type: &str,
) -> Result<usize> {
    let mut count = 0;
    for edge in tx.edges(vertex, direction, Some(label))? {
        let other = edge.other(vertex);
        if tx.node_type(other)?.as_deref() == Some(neighbour_type) {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edges::rule::Multiplicity;
    use crate::schema::fixtures;

    fn rules() -> Arc<EdgeRules> {
        fixtures::edge_rules(&fixtures::registry_v1())
    }

    #[test]
    fn test_rule_lookup_both_orders() {
        let rules = rules();
        let forward = rules.rule_for("pserver", "complex").unwrap();
        let reverse = rules.rule_for("complex", "pserver").unwrap();
        assert_eq!(forward.label, "locatedIn");
        assert_eq!(forward.direction, Direction::Out);
        assert_eq!(reverse.direction, Direction::In);
        assert_eq!(reverse.multiplicity, Multiplicity::ManyToOne);
        assert_eq!(forward.stored_types(), reverse.stored_types());
    }

    #[test]
    fn test_one_to_one_limits_both_ends() {
        let rules = rules();
        for (a, b) in [("vpe", "l3-network"), ("l3-network", "vpe")] {
            let rule = rules.rule_for(a, b).unwrap();
            assert_eq!(rule.label, "gatewayFor");
            assert_eq!(rule.multiplicity, Multiplicity::OneToOne);
            assert!(rule.multiplicity.limits_in());
            assert!(rule.multiplicity.limits_out());
        }
    }

    #[test]
    fn test_missing_rule() {
        let err = rules().rule_for("pserver", "customer").unwrap_err();
        assert!(matches!(err, InventoryError::NoEdgeRule { .. }));
        assert!(!rules().has_rule("pserver", "customer"));
    }

    #[test]
    fn test_cousin_request_on_tree_rule_rejected() {
        let rules = rules();
        let err = rules
            .rule_for_kind(EdgeType::Cousin, "pserver", "p-interface")
            .unwrap_err();
        assert!(matches!(err, InventoryError::EdgeKindMismatch { .. }));
        assert!(rules.rule_for_kind(EdgeType::Tree, "p-interface", "pserver").is_ok());
        assert!(rules.rule_for_kind(EdgeType::Tree, "pserver", "complex").is_err());
    }

    #[test]
    fn test_tree_children() {
        let rules = rules();
        let children: Vec<String> = rules
            .tree_children("pserver")
            .into_iter()
            .map(|r| r.to)
            .collect();
        assert_eq!(children, vec!["p-interface"]);
        assert!(rules.tree_children("p-interface").is_empty());
    }

    #[test]
    fn test_delete_semantics() {
        let rules = rules();
        assert_eq!(
            rules.delete_semantic_for("complex").unwrap(),
            DeleteSemantic::ErrorIfAnyInEdgesUnlessSoleParent
        );
        assert_eq!(rules.delete_semantic_for("vce").unwrap(), DeleteSemantic::ThisNodeOnly);
        assert!(rules.delete_semantic_for("pservers").is_err());
        assert!(rules.delete_semantic_for("no-such-type").is_err());
    }
}
