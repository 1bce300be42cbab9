use super::GraphSerializer;
use inventory_core::edges::{is_child_edge_of, is_private_edge, is_tree_edge, EdgeType};
use inventory_core::error::{InventoryError, Result};
use inventory_core::introspection::{coerce_property, DefaultsApplier, Introspector, IntrospectorWalker};
use inventory_core::schema::{NodeType, PropertyKind};
use inventory_core::traits::GraphTransaction;
use inventory_core::types::{vertex_props, Direction, EdgeId, Value, VertexId};
use inventory_query::RelationshipDescriptor;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

impl GraphSerializer {
    /// Write `obj` onto `vertex`, reconciling dependents and relationships.
    ///
    /// Scalar properties absent from `obj` are removed from the vertex. A
    /// child container or relationship list absent from `obj` leaves the
    /// stored children or edges untouched; a present one, even empty,
    /// replaces them.
    pub fn serialize(
        &self,
        tx: &mut dyn GraphTransaction,
        vertex: VertexId,
        obj: &dyn Introspector,
        uri: &str,
    ) -> Result<()> {
        let defaulted;
        let obj = if self.options.apply_defaults {
            let mut copy = obj.clone_deep()?;
            let mut applier = DefaultsApplier::new(self.latest.clone());
            IntrospectorWalker::new(&mut applier).walk(copy.as_mut())?;
            if applier.applied() > 0 {
                debug!("Applied {} defaults to {}", applier.applied(), uri);
            }
            defaulted = copy;
            defaulted.as_ref()
        } else {
            obj
        };
        self.write_object(tx, vertex, obj, uri)
    }

    fn write_object(
        &self,
        tx: &mut dyn GraphTransaction,
        vertex: VertexId,
        obj: &dyn Introspector,
        uri: &str,
    ) -> Result<()> {
        validate_required(obj)?;
        let registry = self.registry().clone();
        let node_type = registry.node_type(obj.name())?;

        for def in &node_type.properties {
            if def.name == vertex_props::RESOURCE_VERSION
                || vertex_props::RESERVED.contains(&def.name.as_str())
            {
                continue;
            }
            match def.kind {
                PropertyKind::Scalar | PropertyKind::ScalarList => {
                    match obj.get(&def.name).filter(|v| !v.is_null()) {
                        Some(value) => {
                            let value = coerce_property(&node_type, def, value)?;
                            tx.set_property(vertex, def.storage_name(), value)?;
                        }
                        None => tx.remove_property(vertex, def.storage_name())?,
                    }
                }
                PropertyKind::Complex if registry.is_relationship_type(&def.target) => {
                    if let Some(list) = obj.child(&def.name)? {
                        self.reconcile_relationships(tx, vertex, &node_type, list.as_ref())?;
                    }
                }
                PropertyKind::Complex | PropertyKind::ComplexList => {
                    let target = registry.node_type(&def.target)?;
                    if let Some(item) = target.container_item() {
                        if let Some(container) = obj.child(&def.name)? {
                            let item_type = registry.node_type(&item.target)?;
                            let items = container.children(&item.name)?;
                            self.reconcile_dependents(tx, vertex, uri, &item_type, &items)?;
                        }
                    } else if def.kind == PropertyKind::ComplexList && !target.keys.is_empty() {
                        if obj.get(&def.name).is_some() {
                            let items = obj.children(&def.name)?;
                            self.reconcile_dependents(tx, vertex, uri, &target, &items)?;
                        }
                    } else {
                        // Keyless complex values are stored inline.
                        match obj.get(&def.name).filter(|v| !v.is_null()) {
                            Some(value) => tx.set_property(vertex, def.storage_name(), value)?,
                            None => tx.remove_property(vertex, def.storage_name())?,
                        }
                    }
                }
            }
        }
        tx.set_property(vertex, vertex_props::VERTEX_URI, Value::from(uri))?;
        Ok(())
    }

    /// Make the tree children of `parent` of one type match `items` by key
    fn reconcile_dependents(
        &self,
        tx: &mut dyn GraphTransaction,
        parent: VertexId,
        parent_uri: &str,
        item_type: &Arc<NodeType>,
        items: &[Box<dyn Introspector>],
    ) -> Result<()> {
        let existing = self.tree_children(tx, parent, &item_type.name)?;
        let mut kept = HashSet::new();

        for item in items {
            let keys = item.key_values()?;
            let child_uri = format!("{}{}", parent_uri, self.segment(item_type, &keys));
            let matched = existing.iter().find(|(_, k)| *k == keys).map(|(v, _)| *v);
            let child = match matched {
                Some(child) => child,
                None => {
                    let child = self.create_vertex(tx, item.as_ref())?;
                    self.rules.add_edge(tx, EdgeType::Tree, parent, child)?;
                    child
                }
            };
            if !kept.insert(child) {
                return Err(InventoryError::invalid_input(format!(
                    "'{}' is listed more than once under {}",
                    child_uri, parent_uri
                )));
            }
            match matched {
                Some(child) => {
                    let before = vertex_state(&*tx, child)?;
                    self.write_object(tx, child, item.as_ref(), &child_uri)?;
                    if vertex_state(&*tx, child)? != before {
                        self.touch_vertex(tx, child)?;
                    }
                }
                None => self.write_object(tx, child, item.as_ref(), &child_uri)?,
            }
        }

        // Dropped dependents go the way a DELETE of them would, refusals included.
        for (child, keys) in existing {
            if kept.contains(&child) {
                continue;
            }
            let (semantic, doomed) = self.removal_set(&*tx, child)?;
            info!(
                "Removing {} {:?} under {} ({} vertices, {})",
                item_type.name,
                keys,
                parent_uri,
                doomed.len(),
                semantic
            );
            for v in doomed.iter().rev() {
                tx.remove_vertex(*v)?;
            }
        }
        Ok(())
    }

    /// Tree children of `parent` with the given node type, with their keys
    fn tree_children(
        &self,
        tx: &mut dyn GraphTransaction,
        parent: VertexId,
        type_name: &str,
    ) -> Result<Vec<(VertexId, Vec<(String, String)>)>> {
        let node_type = self.registry().node_type(type_name)?;
        let mut children = Vec::new();
        for edge in tx.edges(parent, Direction::Both, None)? {
            if !is_child_edge_of(&edge, parent) {
                continue;
            }
            let child = edge.other(parent);
            match tx.node_type(child)? {
                Some(t) if t == type_name => {
                    children.push((child, self.vertex_keys(&*tx, child, &node_type)?));
                }
                Some(_) => {}
                None => warn!("Skipping damaged child vertex {} of {}", child, parent),
            }
        }
        Ok(children)
    }

    /// Make the cousin edges of `vertex` match a relationship list
    fn reconcile_relationships(
        &self,
        tx: &mut dyn GraphTransaction,
        vertex: VertexId,
        node_type: &NodeType,
        list: &dyn Introspector,
    ) -> Result<()> {
        let item = list.node_type().container_item().ok_or_else(|| {
            InventoryError::schema(format!("'{}' declares no item type", list.name()))
        })?;
        let mut desired = Vec::new();
        for relationship in list.children(&item.name)? {
            let descriptor = RelationshipDescriptor::from_introspector(relationship.as_ref())?;
            let target = self.resolve_relationship(&*tx, &descriptor)?;
            self.cousin_rule(&*tx, vertex, target, descriptor.relationship_label.as_deref())?;
            if !desired.contains(&target) {
                desired.push(target);
            }
        }

        let existing: Vec<_> = tx
            .edges(vertex, Direction::Both, None)?
            .into_iter()
            .filter(|e| !is_tree_edge(e) && !is_private_edge(e))
            .collect();
        // Removals go first so a replaced many-to-one target fits its rule.
        for edge in &existing {
            if !desired.contains(&edge.other(vertex)) {
                debug!("Removing '{}' edge {} of {}", edge.label, edge.id, node_type.name);
                tx.remove_edge(edge.id)?;
            }
        }
        for target in desired {
            if existing.iter().all(|e| e.other(vertex) != target) {
                self.rules.add_edge(tx, EdgeType::Cousin, vertex, target)?;
            }
        }
        Ok(())
    }
}

/// Stored properties and incident edges of a vertex
fn vertex_state(
    tx: &dyn GraphTransaction,
    vertex: VertexId,
) -> Result<(BTreeMap<String, Value>, Vec<EdgeId>)> {
    let mut edges: Vec<EdgeId> = tx
        .edges(vertex, Direction::Both, None)?
        .into_iter()
        .map(|e| e.id)
        .collect();
    edges.sort();
    Ok((tx.properties(vertex)?, edges))
}

fn validate_required(obj: &dyn Introspector) -> Result<()> {
    let node_type = obj.node_type();
    for name in &node_type.required {
        let scalar = node_type.property(name).is_some_and(|def| !def.is_complex());
        if scalar && obj.get(name).is_none_or(|v| v.is_null()) {
            return Err(InventoryError::invalid_input(format!(
                "'{}' is missing required property '{}'",
                obj.name(),
                name
            )));
        }
    }
    Ok(())
}
