//! Compiles resolved paths and relationship descriptors into traversal plans.

use crate::path::{KeyBindings, PathResolver, PathStep, PathStepKind, PathVisitor, UriPath};
use crate::plan::{QueryStep, TraversalPlan};
use crate::relationship::RelationshipDescriptor;
use inventory_core::edges::{EdgeRules, EdgeType};
use inventory_core::error::{InventoryError, Result};
use inventory_core::schema::{NodeType, SchemaRegistry};
use inventory_core::types::Value;
use std::sync::Arc;
use tracing::debug;

/// Accumulates traversal steps.
///
/// A resource step emits one key filter per key and a node-type filter;
/// moving to a dependent resource first hops over the tree edge from the
/// previous resource. The boundary is re-marked before every such hop, so
/// it ends up in front of the last one.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    rules: Arc<EdgeRules>,
    registry: Arc<SchemaRegistry>,
    uri_prefix: Option<String>,
    plan: TraversalPlan,
    current: Option<Arc<NodeType>>,
}

impl QueryBuilder {
    pub fn new(rules: Arc<EdgeRules>) -> Self {
        let registry = rules.registry().clone();
        Self {
            rules,
            registry,
            uri_prefix: None,
            plan: TraversalPlan::new(),
            current: None,
        }
    }

    /// Version prefix stripped from `related-link` values
    pub fn with_uri_prefix(mut self, prefix: Option<String>) -> Self {
        self.uri_prefix = prefix;
        self
    }

    /// Compile a request path
    pub fn from_path(mut self, uri: &UriPath) -> Result<Self> {
        let resolver = PathResolver::new(self.registry.clone());
        resolver.parse(uri, &mut self)?;
        debug!("Compiled {} into {}", uri, self.plan);
        Ok(self)
    }

    /// Compile steps already produced by a [`PathResolver`]
    pub fn from_path_steps(mut self, steps: &[PathStep]) -> Result<Self> {
        for step in steps {
            match step.kind {
                PathStepKind::Namespace => self.process_namespace(&step.node_type)?,
                PathStepKind::Container { is_final } => {
                    self.process_container(&step.node_type, &step.keys, is_final)?
                }
                PathStepKind::Resource => self.process_resource(&step.node_type, &step.keys)?,
            }
        }
        Ok(self)
    }

    /// Compile a relationship descriptor.
    ///
    /// A non-empty `related-link` wins over `relationship-data`. Otherwise the
    /// data is grouped by type and walked down the target's ancestry, hopping
    /// through any intermediate levels the data leaves out.
    pub fn from_relationship(self, descriptor: &RelationshipDescriptor) -> Result<Self> {
        if let Some(link) = descriptor.link() {
            let uri = UriPath::parse(link, self.uri_prefix.as_deref())?;
            let built = self.from_path(&uri)?;
            if built.result_type() != Some(descriptor.related_to.as_str()) {
                return Err(InventoryError::referential(
                    &descriptor.related_to,
                    link,
                    format!(
                        "related-link resolves to '{}'",
                        built.result_type().unwrap_or("nothing")
                    ),
                ));
            }
            return Ok(built);
        }
        self.from_relationship_data(descriptor)
    }

    fn from_relationship_data(mut self, descriptor: &RelationshipDescriptor) -> Result<Self> {
        let target = self.registry.node_type(&descriptor.related_to)?;
        let groups = descriptor.key_groups()?;
        let referential =
            |msg: String| InventoryError::referential(&descriptor.related_to, "", msg);
        if target.keys.is_empty() {
            return Err(referential("target type declares no keys".to_string()));
        }

        let target_keys = groups
            .iter()
            .find(|(t, _)| *t == target.name)
            .map(|(_, keys)| keys)
            .ok_or_else(|| referential("no relationship-data for the target type".to_string()))?;
        if let Some(missing) = target.keys.iter().find(|k| target_keys.get(k).is_none()) {
            return Err(referential(format!("missing key '{}.{}'", target.name, missing)));
        }

        let chain: Vec<Arc<NodeType>> = match self.registry.canonical_chain(&target.name) {
            Some(names) => names
                .iter()
                .filter_map(|n| self.registry.get(n).cloned())
                .filter(|t| !t.keys.is_empty())
                .collect(),
            None => vec![target.clone()],
        };
        if let Some((stray, _)) = groups
            .iter()
            .find(|(t, _)| !chain.iter().any(|c| c.name == *t))
        {
            return Err(referential(format!(
                "relationship-data for '{}' is not part of the ancestry of '{}'",
                stray, target.name
            )));
        }

        let start = chain
            .iter()
            .position(|t| groups.iter().any(|(g, _)| *g == t.name))
            .unwrap_or(chain.len() - 1);
        let empty = KeyBindings::new();
        for node_type in &chain[start..] {
            let keys = groups
                .iter()
                .find(|(g, _)| *g == node_type.name)
                .map(|(_, k)| k)
                .unwrap_or(&empty);
            self.add_resource(node_type, keys)?;
        }
        debug!("Compiled relationship to {} into {}", target.name, self.plan);
        Ok(self)
    }

    /// Filter on a declared property, coercing the raw value to its type
    pub fn has_property(&mut self, node_type: &NodeType, name: &str, raw: &str) -> Result<&mut Self> {
        let def = node_type
            .property(name)
            .ok_or_else(|| InventoryError::property_not_found(&node_type.name, name))?;
        let value = match def.scalar {
            Some(scalar) => scalar.coerce(&Value::from(raw)).ok_or_else(|| {
                InventoryError::TypeMismatch {
                    node_type: node_type.name.clone(),
                    property: name.to_string(),
                    expected: scalar.to_string(),
                    found: format!("'{}'", raw),
                }
            })?,
            None => Value::from(raw),
        };
        self.plan.steps.push(QueryStep::PropertyEquals {
            key: def.storage_name().to_string(),
            value,
        });
        Ok(self)
    }

    /// Filter on node type; abstract types match any of their inheritors
    pub fn has_type(&mut self, name: &str) -> &mut Self {
        self.plan.steps.push(QueryStep::NodeType {
            types: self.registry.inheritors(name),
        });
        self
    }

    /// Hop from `from` vertices to their `to` children over the tree edge
    pub fn hop(&mut self, from: &str, to: &str) -> Result<&mut Self> {
        let rule = self.rules.rule_for_kind(EdgeType::Tree, from, to)?;
        self.plan.steps.push(QueryStep::EdgeHop {
            label: rule.label,
            direction: rule.direction,
        });
        Ok(self)
    }

    /// Mark the current position as the parent boundary
    pub fn mark_boundary(&mut self) -> &mut Self {
        self.plan.boundary = Some(self.plan.steps.len());
        self
    }

    fn add_resource(&mut self, node_type: &Arc<NodeType>, keys: &KeyBindings) -> Result<()> {
        self.enter(node_type)?;
        for (key, value) in keys.iter() {
            self.has_property(node_type, key, value)?;
        }
        self.has_type(&node_type.name);
        self.current = Some(node_type.clone());
        self.plan.result_type = Some(node_type.name.clone());
        self.plan.container_type = None;
        Ok(())
    }

    /// Hop down from the current resource, if any, to `node_type`
    fn enter(&mut self, node_type: &NodeType) -> Result<()> {
        if let Some(parent) = self.current.clone() {
            self.mark_boundary();
            self.hop(&parent.name, &node_type.name)?;
            self.plan.parent_result_type = Some(parent.name.clone());
        }
        Ok(())
    }

    pub fn plan(&self) -> &TraversalPlan {
        &self.plan
    }

    pub fn into_plan(self) -> TraversalPlan {
        self.plan
    }

    /// Plan resolving the parent of the final resource
    pub fn ancestor_plan(&self) -> TraversalPlan {
        self.plan.ancestor_plan()
    }

    pub fn result_type(&self) -> Option<&str> {
        self.plan.result_type.as_deref()
    }

    pub fn parent_result_type(&self) -> Option<&str> {
        self.plan.parent_result_type.as_deref()
    }

    /// Container named by the final path segment, if the path ends on one
    pub fn container_type(&self) -> Option<&str> {
        self.plan.container_type.as_deref()
    }

    pub fn is_dependent(&self) -> bool {
        self.plan.is_dependent()
    }
}

impl PathVisitor for QueryBuilder {
    fn process_resource(&mut self, node_type: &Arc<NodeType>, keys: &KeyBindings) -> Result<()> {
        self.add_resource(node_type, keys)
    }

    fn process_container(
        &mut self,
        node_type: &Arc<NodeType>,
        filters: &KeyBindings,
        is_final: bool,
    ) -> Result<()> {
        if !is_final {
            return Ok(());
        }
        let item_name = node_type
            .container_item()
            .map(|p| p.target.clone())
            .ok_or_else(|| {
                InventoryError::schema(format!("container '{}' declares no item type", node_type.name))
            })?;
        let item = self.registry.node_type(&item_name)?;
        self.enter(&item)?;
        for (key, value) in filters.iter() {
            self.has_property(&item, key, value)?;
        }
        self.has_type(&item.name);
        self.plan.result_type = Some(item.name.clone());
        self.plan.container_type = Some(node_type.name.clone());
        Ok(())
    }
}
