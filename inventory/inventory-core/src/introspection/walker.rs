//! Depth-first traversal of an object and its nested complex values.

use crate::error::Result;
use crate::introspection::Introspector;
use crate::schema::SchemaRegistry;
use std::sync::Arc;
use tracing::trace;

/// Callback invoked once per object reached by an [`IntrospectorWalker`].
pub trait WalkVisitor {
    /// `depth` is 0 for the root object
    fn visit(&mut self, obj: &mut dyn Introspector, depth: usize) -> Result<()>;
}

/// Visits an object and then every nested complex value, writing each
/// visited child back into its parent so visitors may mutate freely.
pub struct IntrospectorWalker<'v, V: WalkVisitor> {
    visitor: &'v mut V,
    skip_relationships: bool,
}

impl<'v, V: WalkVisitor> IntrospectorWalker<'v, V> {
    pub fn new(visitor: &'v mut V) -> Self {
        Self {
            visitor,
            skip_relationships: true,
        }
    }

    /// Also descend into relationship lists
    pub fn include_relationships(mut self) -> Self {
        self.skip_relationships = false;
        self
    }

    pub fn walk(&mut self, obj: &mut dyn Introspector) -> Result<()> {
        self.walk_at(obj, 0)
    }

    fn walk_at(&mut self, obj: &mut dyn Introspector, depth: usize) -> Result<()> {
        trace!("Walking {} at depth {}", obj.name(), depth);
        self.visitor.visit(obj, depth)?;

        let registry = obj.loader().registry().clone();
        let complex: Vec<(String, bool)> = obj
            .node_type()
            .properties
            .iter()
            .filter(|p| p.is_complex())
            .filter(|p| !(self.skip_relationships && registry.is_relationship_type(&p.target)))
            .map(|p| (p.name.clone(), p.is_list()))
            .collect();

        for (name, is_list) in complex {
            if is_list {
                let mut items = obj.children(&name)?;
                if items.is_empty() {
                    continue;
                }
                for item in items.iter_mut() {
                    self.walk_at(item.as_mut(), depth + 1)?;
                }
                obj.set_children(&name, &items)?;
            } else if let Some(mut child) = obj.child(&name)? {
                self.walk_at(child.as_mut(), depth + 1)?;
                obj.set_child(&name, child.as_ref())?;
            }
        }
        Ok(())
    }
}

/// Fills missing required properties from the defaults declared by a schema
/// version, which need not be the version the object was loaded with.
pub struct DefaultsApplier {
    registry: Arc<SchemaRegistry>,
    applied: usize,
}

impl DefaultsApplier {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self {
            registry,
            applied: 0,
        }
    }

    /// Number of properties filled so far
    pub fn applied(&self) -> usize {
        self.applied
    }
}

impl WalkVisitor for DefaultsApplier {
    fn visit(&mut self, obj: &mut dyn Introspector, _depth: usize) -> Result<()> {
        let Some(latest) = self.registry.get(obj.name()).cloned() else {
            return Ok(());
        };
        for def in &latest.properties {
            let Some(default) = &def.default else {
                continue;
            };
            if !latest.is_required(&def.name) || obj.get(&def.name).is_some() {
                continue;
            }
            // The object's own version may not declare the property yet.
            if obj.node_type().has_property(&def.name) {
                obj.set(&def.name, default.clone())?;
                self.applied += 1;
            }
        }
        Ok(())
    }
}
