use super::{GraphSerializer, WriteAction};
use inventory_core::edges::{
    is_child_edge_of, is_parent_edge_of, side_of, DeleteSemantic, EdgeFlag, EdgeType,
};
use inventory_core::error::{InventoryError, Result};
use inventory_core::traits::GraphTransaction;
use inventory_core::types::{edge_props, Direction, EdgeId, EdgeRecord, VertexId};
use inventory_query::RelationshipDescriptor;
use std::collections::HashSet;
use tracing::{debug, info};

impl GraphSerializer {
    /// Delete the resource at `vertex` according to its delete semantic.
    ///
    /// Returns the number of vertices removed, dependents included.
    pub fn delete(
        &self,
        tx: &mut dyn GraphTransaction,
        vertex: VertexId,
        supplied_version: Option<&str>,
        uri: &str,
    ) -> Result<usize> {
        let stored = self.stored_version(&*tx, vertex)?;
        self.verify_resource_version(WriteAction::Delete, uri, stored.as_deref(), supplied_version)?;

        let (semantic, doomed) = self.removal_set(&*tx, vertex)?;
        for v in doomed.iter().rev() {
            tx.remove_vertex(*v)?;
        }
        info!("Deleted {} ({} vertices, {})", uri, doomed.len(), semantic);
        Ok(doomed.len())
    }

    /// Vertices that go when `vertex` is removed, parents before their
    /// dependents.
    ///
    /// Fails with `DeleteBlocked` when the delete semantic of the vertex's
    /// type or a prevent-delete edge forbids the removal.
    pub(crate) fn removal_set(
        &self,
        tx: &dyn GraphTransaction,
        vertex: VertexId,
    ) -> Result<(DeleteSemantic, Vec<VertexId>)> {
        let type_name = self.stored_type_name(tx, vertex)?;
        let semantic = self.rules.delete_semantic_for(&type_name)?;
        let edges = tx.edges(vertex, Direction::Both, None)?;
        let offending = match semantic {
            DeleteSemantic::CascadeToChildren => None,
            DeleteSemantic::ErrorIfAnyEdges => edges.iter().find(|e| !is_parent_edge_of(e, vertex)),
            DeleteSemantic::ErrorIfAnyInEdgesUnlessSoleParent => edges
                .iter()
                .find(|e| side_of(e, vertex) == Direction::In && !is_parent_edge_of(e, vertex)),
            DeleteSemantic::ThisNodeOnly => edges.iter().find(|e| is_child_edge_of(e, vertex)),
        };
        if let Some(edge) = offending {
            return Err(self.blocked(tx, &type_name, semantic, vertex, edge, "is still attached"));
        }

        let doomed = match semantic {
            DeleteSemantic::ThisNodeOnly => vec![vertex],
            _ => self.executor.find_deletable(tx, vertex)?,
        };
        let doomed_set: HashSet<_> = doomed.iter().copied().collect();
        for v in &doomed {
            for edge in tx.edges(*v, Direction::Both, None)? {
                if doomed_set.contains(&edge.other(*v)) {
                    continue;
                }
                let prevent = EdgeFlag::from_edge(&edge, edge_props::PREVENT_DELETE);
                if prevent.covers(side_of(&edge, *v)) {
                    return Err(self.blocked(tx, &type_name, semantic, *v, &edge, "prevents deletion"));
                }
            }
        }

        Ok((semantic, doomed))
    }

    /// Add the cousin edge a relationship describes.
    ///
    /// An edge that already exists is left as is.
    pub fn create_edge(
        &self,
        tx: &mut dyn GraphTransaction,
        vertex: VertexId,
        descriptor: &RelationshipDescriptor,
    ) -> Result<EdgeId> {
        let target = self.resolve_relationship(&*tx, descriptor)?;
        let rule = self.cousin_rule(&*tx, vertex, target, descriptor.relationship_label.as_deref())?;
        let (out_vertex, in_vertex) = rule.stored_endpoints(vertex, target);
        if let Some(edge) = self.rules.find_edge(&*tx, &rule, out_vertex, in_vertex)? {
            debug!("'{}' edge {} already present", rule.label, edge.id);
            return Ok(edge.id);
        }
        self.rules.add_edge(tx, EdgeType::Cousin, vertex, target)
    }

    /// Remove the cousin edge a relationship describes
    pub fn delete_edge(
        &self,
        tx: &mut dyn GraphTransaction,
        vertex: VertexId,
        descriptor: &RelationshipDescriptor,
    ) -> Result<()> {
        let target = self.resolve_relationship(&*tx, descriptor)?;
        let rule = self.cousin_rule(&*tx, vertex, target, descriptor.relationship_label.as_deref())?;
        let (out_vertex, in_vertex) = rule.stored_endpoints(vertex, target);
        let edge = self
            .rules
            .find_edge(&*tx, &rule, out_vertex, in_vertex)?
            .ok_or_else(|| {
                InventoryError::not_found(
                    "relationship",
                    format!("{} {} -> {}", rule.label, out_vertex, in_vertex),
                )
            })?;
        tx.remove_edge(edge.id)?;
        debug!("Removed '{}' edge {}", rule.label, edge.id);
        Ok(())
    }

    fn blocked(
        &self,
        tx: &dyn GraphTransaction,
        type_name: &str,
        semantic: DeleteSemantic,
        vertex: VertexId,
        edge: &EdgeRecord,
        reason: &str,
    ) -> InventoryError {
        let other = edge.other(vertex);
        let other_type = tx.node_type(other).ok().flatten().unwrap_or_else(|| "unknown".to_string());
        InventoryError::DeleteBlocked {
            node_type: type_name.to_string(),
            semantic: semantic.to_string(),
            message: format!("'{}' edge to {} {} {}", edge.label, other_type, other, reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::serializer;
    use super::*;
    use crate::memory::InMemoryGraph;
    use inventory_core::traits::GraphStore;
    use inventory_core::types::Value;
    use serde_json::json;

    fn write(s: &GraphSerializer, tx: &mut dyn GraphTransaction, node_type: &str, body: Value) -> VertexId {
        let obj = s.loader().from_value(node_type, body).unwrap();
        let v = s.create_vertex(tx, obj.as_ref()).unwrap();
        s.serialize(tx, v, obj.as_ref(), "/test").unwrap();
        v
    }

    fn complex_body() -> Value {
        json!({"physical-location-id": "c1", "physical-location-type": "dc", "street1": "1 Main", "city": "Springfield"})
    }

    #[test]
    fn test_cascade_removes_dependents() {
        let s = serializer();
        let graph = InMemoryGraph::new();
        let mut tx = graph.begin().unwrap();
        let pserver = write(
            &s,
            tx.as_mut(),
            "pserver",
            json!({"hostname": "h1", "p-interfaces": {"p-interface": [{"interface-name": "eth0"}, {"interface-name": "eth1"}]}}),
        );
        let rv = s.stored_version(tx.as_ref(), pserver).unwrap();
        assert_eq!(s.delete(tx.as_mut(), pserver, rv.as_deref(), "/h1").unwrap(), 3);
        assert!(tx.vertices().unwrap().is_empty());
    }

    #[test]
    fn test_version_required_for_delete() {
        let s = serializer();
        let graph = InMemoryGraph::new();
        let mut tx = graph.begin().unwrap();
        let pserver = write(&s, tx.as_mut(), "pserver", json!({"hostname": "h1"}));
        assert!(matches!(
            s.delete(tx.as_mut(), pserver, None, "/h1"),
            Err(InventoryError::VersionMissing { .. })
        ));
        assert!(tx.vertex_exists(pserver));
    }

    #[test]
    fn test_in_edge_blocks_complex() {
        let s = serializer();
        let graph = InMemoryGraph::new();
        let mut tx = graph.begin().unwrap();
        let complex = write(&s, tx.as_mut(), "complex", complex_body());
        let pserver = write(&s, tx.as_mut(), "pserver", json!({"hostname": "h1"}));
        s.rules().add_edge(tx.as_mut(), EdgeType::Cousin, pserver, complex).unwrap();

        let rv = s.stored_version(tx.as_ref(), complex).unwrap();
        let err = s.delete(tx.as_mut(), complex, rv.as_deref(), "/c1").unwrap_err();
        assert!(matches!(err, InventoryError::DeleteBlocked { ref semantic, .. } if semantic == "error-if-any-in-edges-unless-sole-parent"));

        // The out-edge on the pserver side does not block it.
        let rv = s.stored_version(tx.as_ref(), pserver).unwrap();
        assert_eq!(s.delete(tx.as_mut(), pserver, rv.as_deref(), "/h1").unwrap(), 1);
        assert!(tx.vertex_exists(complex));
    }

    #[test]
    fn test_sole_parent_edge_does_not_block() {
        let s = serializer();
        let graph = InMemoryGraph::new();
        let mut tx = graph.begin().unwrap();
        let pserver = write(
            &s,
            tx.as_mut(),
            "pserver",
            json!({"hostname": "h1", "p-interfaces": {"p-interface": [{"interface-name": "eth0"}]}}),
        );
        let eth0 = tx.edges(pserver, Direction::Out, Some("has")).unwrap()[0].in_vertex;
        assert_eq!(
            s.rules().delete_semantic_for("p-interface").unwrap(),
            DeleteSemantic::ErrorIfAnyInEdgesUnlessSoleParent
        );

        let rv = s.stored_version(tx.as_ref(), eth0).unwrap();
        assert_eq!(s.delete(tx.as_mut(), eth0, rv.as_deref(), "/h1/eth0").unwrap(), 1);
        assert!(!tx.vertex_exists(eth0));
        assert!(tx.vertex_exists(pserver));
        assert!(tx.edges(pserver, Direction::Both, None).unwrap().is_empty());
    }

    #[test]
    fn test_this_node_only_refuses_with_children() {
        let s = serializer();
        let graph = InMemoryGraph::new();
        let mut tx = graph.begin().unwrap();
        let vce = write(
            &s,
            tx.as_mut(),
            "vce",
            json!({"vnf-id": "v1", "vnf-name": "edge", "vnf-type": "vce", "port-groups": {"port-group": [{"interface-id": "pg1"}]}}),
        );
        let rv = s.stored_version(tx.as_ref(), vce).unwrap();
        assert!(matches!(
            s.delete(tx.as_mut(), vce, rv.as_deref(), "/v1"),
            Err(InventoryError::DeleteBlocked { .. })
        ));
    }

    #[test]
    fn test_prevent_delete_flag() {
        let s = serializer();
        let graph = InMemoryGraph::new();
        let mut tx = graph.begin().unwrap();
        let network = write(
            &s,
            tx.as_mut(),
            "l3-network",
            json!({"network-id": "n1", "network-name": "net"}),
        );
        let vnf = write(
            &s,
            tx.as_mut(),
            "generic-vnf",
            json!({"vnf-id": "g1", "vnf-name": "fw", "vnf-type": "firewall", "vf-modules": {"vf-module": [{"vf-module-id": "m1"}]}}),
        );
        let module = tx.edges(vnf, Direction::Out, Some("has")).unwrap()[0].in_vertex;
        s.rules().add_edge(tx.as_mut(), EdgeType::Cousin, module, network).unwrap();

        let rv = s.stored_version(tx.as_ref(), network).unwrap();
        let err = s.delete(tx.as_mut(), network, rv.as_deref(), "/n1").unwrap_err();
        assert!(matches!(err, InventoryError::DeleteBlocked { .. }));
        assert!(tx.vertex_exists(network));

        // Deleting the vnf cascades through the module and frees the network.
        let rv = s.stored_version(tx.as_ref(), vnf).unwrap();
        assert_eq!(s.delete(tx.as_mut(), vnf, rv.as_deref(), "/g1").unwrap(), 2);
        let rv = s.stored_version(tx.as_ref(), network).unwrap();
        assert_eq!(s.delete(tx.as_mut(), network, rv.as_deref(), "/n1").unwrap(), 1);
    }

    #[test]
    fn test_create_and_delete_edge() {
        let s = serializer();
        let graph = InMemoryGraph::new();
        let mut tx = graph.begin().unwrap();
        write(&s, tx.as_mut(), "complex", complex_body());
        let pserver = write(&s, tx.as_mut(), "pserver", json!({"hostname": "h1"}));
        let descriptor = RelationshipDescriptor::new("complex").with_data("complex", "physical-location-id", "c1");

        let first = s.create_edge(tx.as_mut(), pserver, &descriptor).unwrap();
        let again = s.create_edge(tx.as_mut(), pserver, &descriptor).unwrap();
        assert_eq!(first, again);

        let wrong_label = descriptor.clone().with_label("runsOn");
        assert!(matches!(
            s.create_edge(tx.as_mut(), pserver, &wrong_label),
            Err(InventoryError::Referential { .. })
        ));

        s.delete_edge(tx.as_mut(), pserver, &descriptor).unwrap();
        assert!(matches!(
            s.delete_edge(tx.as_mut(), pserver, &descriptor),
            Err(InventoryError::NotFound { .. })
        ));
    }
}
