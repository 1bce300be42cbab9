use super::GraphSerializer;
use inventory_core::edges::{is_child_edge_of, is_private_edge, is_tree_edge};
use inventory_core::error::{InventoryError, Result};
use inventory_core::introspection::Introspector;
use inventory_core::schema::PropertyKind;
use inventory_core::traits::GraphTransaction;
use inventory_core::types::{value_to_string, Direction, Value, VertexId};
use inventory_query::RelationshipDescriptor;
use std::collections::HashSet;
use tracing::{debug, info, warn};

impl GraphSerializer {
    /// Build the object stored at `vertex`.
    ///
    /// `depth` bounds how many levels of dependent children are expanded;
    /// 0 yields the resource's own properties and relationships only.
    pub fn hydrate(
        &self,
        tx: &mut dyn GraphTransaction,
        vertex: VertexId,
        depth: u32,
    ) -> Result<Box<dyn Introspector>> {
        let type_name = self.stored_type_name(&*tx, vertex)?;
        let mut obj = self.loader.introspector(&type_name)?;
        self.hydrate_into(tx, vertex, obj.as_mut(), depth)?;
        Ok(obj)
    }

    /// Refresh `obj` from `vertex`, returning whether anything changed
    pub fn hydrate_into(
        &self,
        tx: &mut dyn GraphTransaction,
        vertex: VertexId,
        obj: &mut dyn Introspector,
        depth: u32,
    ) -> Result<bool> {
        let before = obj.to_value();
        let mut visited = HashSet::new();
        self.hydrate_vertex(tx, vertex, obj, depth, &mut visited)?;
        let changed = obj.to_value() != before;
        if !changed {
            debug!("Vertex {} already matches its {} object", vertex, obj.name());
        }
        Ok(changed)
    }

    fn hydrate_vertex(
        &self,
        tx: &mut dyn GraphTransaction,
        vertex: VertexId,
        obj: &mut dyn Introspector,
        depth: u32,
        visited: &mut HashSet<VertexId>,
    ) -> Result<()> {
        visited.insert(vertex);
        let registry = self.registry().clone();
        let node_type = registry.node_type(obj.name())?;
        let stored = tx.properties(vertex)?;

        for def in &node_type.properties {
            let relationship = registry.is_relationship_type(&def.target);
            match def.kind {
                PropertyKind::Complex if relationship => {
                    let relationships = self.relationships_of(tx, vertex)?;
                    if relationships.is_empty() {
                        obj.set(&def.name, Value::Null)?;
                    } else {
                        let list = self.wrap_items(&def.target, relationships)?;
                        obj.set_child(&def.name, list.as_ref())?;
                    }
                }
                PropertyKind::Complex | PropertyKind::ComplexList
                    if registry.get(&def.target).is_some_and(|t| t.is_container() || !t.keys.is_empty()) =>
                {
                    if depth == 0 {
                        continue;
                    }
                    let target = registry.node_type(&def.target)?;
                    let item_type = target.container_item().map_or(target.name.clone(), |i| i.target.clone());
                    let items = self.hydrate_children(tx, vertex, &item_type, depth - 1, visited)?;
                    if items.is_empty() {
                        obj.set(&def.name, Value::Null)?;
                    } else if target.is_container() {
                        let container = self.wrap_items(&target.name, items)?;
                        obj.set_child(&def.name, container.as_ref())?;
                    } else {
                        obj.set_children(&def.name, &items)?;
                    }
                }
                _ => match stored.get(def.storage_name()) {
                    Some(value) => obj.set(&def.name, value.clone())?,
                    None if obj.get(&def.name).is_some() => obj.set(&def.name, Value::Null)?,
                    None => {}
                },
            }
        }
        Ok(())
    }

    /// Hydrated tree children of `parent` whose type is `item_type` or one
    /// of its inheritors
    fn hydrate_children(
        &self,
        tx: &mut dyn GraphTransaction,
        parent: VertexId,
        item_type: &str,
        depth: u32,
        visited: &mut HashSet<VertexId>,
    ) -> Result<Vec<Box<dyn Introspector>>> {
        let accepted = self.registry().inheritors(item_type);
        let mut items = Vec::new();
        for edge in tx.edges(parent, Direction::Both, None)? {
            if !is_child_edge_of(&edge, parent) {
                continue;
            }
            let child = edge.other(parent);
            if visited.contains(&child) {
                debug!("Vertex {} already hydrated, not expanding it again", child);
                continue;
            }
            if !tx.vertex_exists(child) {
                continue;
            }
            match tx.node_type(child)? {
                Some(t) if accepted.contains(&t) => {
                    let mut item = self.loader.introspector(&t)?;
                    self.hydrate_vertex(tx, child, item.as_mut(), depth, visited)?;
                    items.push(item);
                }
                Some(_) => {}
                None => self.damaged(tx, child)?,
            }
        }
        Ok(items)
    }

    /// Relationship objects for every public cousin edge of `vertex`
    fn relationships_of(
        &self,
        tx: &mut dyn GraphTransaction,
        vertex: VertexId,
    ) -> Result<Vec<Box<dyn Introspector>>> {
        let mut relationships = Vec::new();
        for edge in tx.edges(vertex, Direction::Both, None)? {
            if is_tree_edge(&edge) || is_private_edge(&edge) {
                continue;
            }
            let other = edge.other(vertex);
            if !tx.vertex_exists(other) {
                // removed by damaged-vertex cleanup earlier in this walk
                continue;
            }
            let Some(other_type) = tx.node_type(other)? else {
                self.damaged(tx, other)?;
                continue;
            };
            if !self.registry().has_type(&other_type) {
                debug!(
                    "Related {} vertex {} is not part of schema {}",
                    other_type,
                    other,
                    self.loader.version()
                );
                continue;
            }
            match self.describe_vertex(&*tx, other, &other_type, &edge.label) {
                Ok(descriptor) => relationships.push(descriptor.to_introspector(&self.loader)?),
                Err(InventoryError::DamagedVertex(id)) => {
                    warn!("Skipping relationship to {}: ancestor {} is damaged", other, id);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(relationships)
    }

    /// Descriptor pointing at a stored vertex, with data for every keyed
    /// level of its path
    pub fn describe_vertex(
        &self,
        tx: &dyn GraphTransaction,
        vertex: VertexId,
        type_name: &str,
        label: &str,
    ) -> Result<RelationshipDescriptor> {
        let mut descriptor = RelationshipDescriptor::new(type_name)
            .with_label(label)
            .with_link(self.link_for_vertex(tx, vertex)?);

        let mut chain = self.executor.find_parents(tx, vertex)?;
        chain.reverse();
        chain.push(vertex);
        for v in chain {
            let node_type = self.stored_type(tx, v)?;
            for (key, value) in self.vertex_keys(tx, v, &node_type)? {
                descriptor.push_data(&node_type.name, &key, value);
            }
        }

        let node_type = self.registry().node_type(type_name)?;
        for name in &node_type.name_props {
            let storage = node_type.property(name).map_or(name.as_str(), |def| def.storage_name());
            if let Some(value) = tx.property(vertex, storage)?.as_ref().and_then(value_to_string) {
                descriptor.push_property(type_name, name, value);
            }
        }
        Ok(descriptor)
    }

    fn wrap_items(&self, container: &str, items: Vec<Box<dyn Introspector>>) -> Result<Box<dyn Introspector>> {
        let mut wrapper = self.loader.introspector(container)?;
        let item = wrapper.node_type().container_item().map(|i| i.name.clone()).ok_or_else(|| {
            InventoryError::schema(format!("'{}' declares no item type", container))
        })?;
        wrapper.set_children(&item, &items)?;
        Ok(wrapper)
    }

    /// Skip a vertex without a node type, removing it and the dependents it
    /// would cascade to when cleanup is enabled
    fn damaged(&self, tx: &mut dyn GraphTransaction, vertex: VertexId) -> Result<()> {
        warn!("Skipping damaged vertex {}: no node type", vertex);
        if self.options.cleanup_damaged_vertices && tx.vertex_exists(vertex) {
            let doomed = self.executor.find_deletable(&*tx, vertex)?;
            for v in doomed.iter().rev() {
                tx.remove_vertex(*v)?;
            }
            info!("Removed damaged vertex {} ({} vertices)", vertex, doomed.len());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::serializer;
    use super::*;
    use crate::memory::InMemoryGraph;
    use inventory_core::config::{SerializerConfig, UNBOUNDED_DEPTH};
    use inventory_core::edges::EdgeType;
    use inventory_core::traits::GraphStore;
    use inventory_core::types::vertex_props;
    use serde_json::json;

    fn write(s: &GraphSerializer, tx: &mut dyn GraphTransaction, node_type: &str, body: Value, uri: &str) -> VertexId {
        let obj = s.loader().from_value(node_type, body).unwrap();
        let v = s.create_vertex(tx, obj.as_ref()).unwrap();
        s.serialize(tx, v, obj.as_ref(), uri).unwrap();
        v
    }

    fn pserver_body() -> Value {
        json!({
            "hostname": "h1",
            "number-of-cpus": 4,
            "p-interfaces": {"p-interface": [{"interface-name": "eth0"}]}
        })
    }

    #[test]
    fn test_hydrate_depth() {
        let s = serializer();
        let graph = InMemoryGraph::new();
        let mut tx = graph.begin().unwrap();
        let v = write(&s, tx.as_mut(), "pserver", pserver_body(), "/cloud-infrastructure/pservers/pserver/h1");

        let shallow = s.hydrate(tx.as_mut(), v, 0).unwrap();
        assert_eq!(shallow.get("hostname"), Some(json!("h1")));
        assert_eq!(shallow.get("number-of-cpus"), Some(json!(4)));
        assert!(shallow.get("resource-version").is_some());
        assert!(shallow.get("p-interfaces").is_none());

        let deep = s.hydrate(tx.as_mut(), v, 1).unwrap();
        let interfaces = deep.child("p-interfaces").unwrap().unwrap();
        let items = interfaces.children("p-interface").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].get("interface-name"), Some(json!("eth0")));
        assert_eq!(items[0].get("in-maint"), Some(json!(false)));
    }

    #[test]
    fn test_hydrate_into_reports_changes() {
        let s = serializer();
        let graph = InMemoryGraph::new();
        let mut tx = graph.begin().unwrap();
        let v = write(&s, tx.as_mut(), "pserver", pserver_body(), "/cloud-infrastructure/pservers/pserver/h1");

        let mut obj = s.hydrate(tx.as_mut(), v, 0).unwrap();
        assert!(!s.hydrate_into(tx.as_mut(), v, obj.as_mut(), 0).unwrap());
        tx.set_property(v, "number-of-cpus", json!(16)).unwrap();
        assert!(s.hydrate_into(tx.as_mut(), v, obj.as_mut(), 0).unwrap());
        assert_eq!(obj.get("number-of-cpus"), Some(json!(16)));
    }

    #[test]
    fn test_relationships_described_from_both_ends() {
        let s = serializer();
        let graph = InMemoryGraph::new();
        let mut tx = graph.begin().unwrap();
        let complex = write(
            &s,
            tx.as_mut(),
            "complex",
            json!({"physical-location-id": "c1", "complex-name": "Main DC", "physical-location-type": "dc", "street1": "1 Main", "city": "Springfield"}),
            "/cloud-infrastructure/complexes/complex/c1",
        );
        let pserver = write(&s, tx.as_mut(), "pserver", pserver_body(), "/cloud-infrastructure/pservers/pserver/h1");
        s.rules().add_edge(tx.as_mut(), EdgeType::Cousin, pserver, complex).unwrap();

        let obj = s.hydrate(tx.as_mut(), pserver, 0).unwrap();
        let list = obj.child("relationship-list").unwrap().unwrap();
        let rels = list.children("relationship").unwrap();
        assert_eq!(rels.len(), 1);
        let descriptor = RelationshipDescriptor::from_introspector(rels[0].as_ref()).unwrap();
        assert_eq!(descriptor.related_to, "complex");
        assert_eq!(descriptor.relationship_label.as_deref(), Some("locatedIn"));
        assert_eq!(
            descriptor.link(),
            Some("/inventory/v1/cloud-infrastructure/complexes/complex/c1")
        );
        assert_eq!(descriptor.relationship_data[0].relationship_key, "complex.physical-location-id");
        assert_eq!(descriptor.related_to_property[0].property_value, "Main DC");

        let back = s.hydrate(tx.as_mut(), complex, 0).unwrap();
        let list = back.child("relationship-list").unwrap().unwrap();
        let descriptor =
            RelationshipDescriptor::from_introspector(list.children("relationship").unwrap()[0].as_ref()).unwrap();
        assert_eq!(descriptor.related_to, "pserver");
        assert_eq!(descriptor.relationship_data[0].relationship_value, "h1");
    }

    #[test]
    fn test_dependent_relationship_data_includes_ancestors() {
        let s = serializer();
        let graph = InMemoryGraph::new();
        let mut tx = graph.begin().unwrap();
        let pserver = write(&s, tx.as_mut(), "pserver", pserver_body(), "/cloud-infrastructure/pservers/pserver/h1");
        let eth0 = tx
            .edges(pserver, Direction::Out, Some("has"))
            .unwrap()
            .first()
            .map(|e| e.in_vertex)
            .unwrap();
        let link = write(
            &s,
            tx.as_mut(),
            "physical-link",
            json!({"link-name": "l1"}),
            "/network/physical-links/physical-link/l1",
        );
        s.rules().add_edge(tx.as_mut(), EdgeType::Cousin, link, eth0).unwrap();

        let descriptor = s.describe_vertex(tx.as_ref(), eth0, "p-interface", "linksTo").unwrap();
        let keys: Vec<_> = descriptor
            .relationship_data
            .iter()
            .map(|d| d.relationship_key.as_str())
            .collect();
        assert_eq!(keys, vec!["pserver.hostname", "p-interface.interface-name"]);
    }

    #[test]
    fn test_damaged_neighbour_skipped_and_cleaned() {
        let graph = InMemoryGraph::new();
        for cleanup in [false, true] {
            let s = serializer().with_options(SerializerConfig {
                cleanup_damaged_vertices: cleanup,
                ..SerializerConfig::default()
            });
            let mut tx = graph.begin().unwrap();
            let pserver = write(&s, tx.as_mut(), "pserver", pserver_body(), "/cloud-infrastructure/pservers/pserver/h1");
            let ghost = tx.add_vertex().unwrap();
            tx.add_edge("locatedIn", pserver, ghost, Default::default()).unwrap();

            let obj = s.hydrate(tx.as_mut(), pserver, 0).unwrap();
            assert!(obj.get("relationship-list").is_none());
            assert_eq!(tx.vertex_exists(ghost), !cleanup);
            assert!(tx.property(pserver, vertex_props::NODE_TYPE).unwrap().is_some());
            tx.rollback();
        }
    }

    #[test]
    fn test_damaged_cleanup_takes_dependents_along() {
        let graph = InMemoryGraph::new();
        for cleanup in [false, true] {
            let s = serializer().with_options(SerializerConfig {
                cleanup_damaged_vertices: cleanup,
                ..SerializerConfig::default()
            });
            let mut tx = graph.begin().unwrap();
            let complex = write(
                &s,
                tx.as_mut(),
                "complex",
                json!({"physical-location-id": "c1", "physical-location-type": "dc", "street1": "1 Main", "city": "Springfield"}),
                "/cloud-infrastructure/complexes/complex/c1",
            );
            let pserver = write(&s, tx.as_mut(), "pserver", pserver_body(), "/cloud-infrastructure/pservers/pserver/h1");
            let eth0 = tx.edges(pserver, Direction::Out, Some("has")).unwrap()[0].in_vertex;
            s.rules().add_edge(tx.as_mut(), EdgeType::Cousin, pserver, complex).unwrap();
            tx.remove_property(pserver, vertex_props::NODE_TYPE).unwrap();

            let obj = s.hydrate(tx.as_mut(), complex, UNBOUNDED_DEPTH).unwrap();
            assert!(obj.get("relationship-list").is_none());
            assert_eq!(tx.vertex_exists(pserver), !cleanup);
            assert_eq!(tx.vertex_exists(eth0), !cleanup);
            assert!(tx.vertex_exists(complex));
            tx.rollback();
        }
    }

    #[test]
    fn test_cousin_cycle_hydrates_each_neighbour_once() {
        let s = serializer();
        let graph = InMemoryGraph::new();
        let mut tx = graph.begin().unwrap();
        let complex = write(
            &s,
            tx.as_mut(),
            "complex",
            json!({"physical-location-id": "c1", "physical-location-type": "dc", "street1": "1 Main", "city": "Springfield"}),
            "/cloud-infrastructure/complexes/complex/c1",
        );
        let h1 = write(&s, tx.as_mut(), "pserver", pserver_body(), "/cloud-infrastructure/pservers/pserver/h1");
        let h2 = write(
            &s,
            tx.as_mut(),
            "pserver",
            json!({"hostname": "h2"}),
            "/cloud-infrastructure/pservers/pserver/h2",
        );
        s.rules().add_edge(tx.as_mut(), EdgeType::Cousin, h1, complex).unwrap();
        s.rules().add_edge(tx.as_mut(), EdgeType::Cousin, h2, complex).unwrap();
        // closes h1 -> c1 <- h2 -> h1
        tx.add_edge("runsOn", h2, h1, Default::default()).unwrap();

        let related = |obj: &dyn Introspector| -> Vec<(String, String)> {
            let list = obj.child("relationship-list").unwrap().unwrap();
            let mut found: Vec<_> = list
                .children("relationship")
                .unwrap()
                .iter()
                .map(|r| {
                    let d = RelationshipDescriptor::from_introspector(r.as_ref()).unwrap();
                    (d.related_to.clone(), d.relationship_data[0].relationship_value.clone())
                })
                .collect();
            found.sort();
            found
        };

        let obj = s.hydrate(tx.as_mut(), h1, UNBOUNDED_DEPTH).unwrap();
        assert_eq!(
            related(obj.as_ref()),
            vec![("complex".to_string(), "c1".to_string()), ("pserver".to_string(), "h2".to_string())]
        );
        let items = obj.child("p-interfaces").unwrap().unwrap().children("p-interface").unwrap();
        assert_eq!(items.len(), 1);

        let obj = s.hydrate(tx.as_mut(), complex, UNBOUNDED_DEPTH).unwrap();
        assert_eq!(
            related(obj.as_ref()),
            vec![("pserver".to_string(), "h1".to_string()), ("pserver".to_string(), "h2".to_string())]
        );

        let obj = s.hydrate(tx.as_mut(), h2, UNBOUNDED_DEPTH).unwrap();
        assert_eq!(
            related(obj.as_ref()),
            vec![("complex".to_string(), "c1".to_string()), ("pserver".to_string(), "h1".to_string())]
        );
    }
}
