//! Resource path resolution.
//!
//! A path is a sequence of type names and key values:
//!
//! ```text
//! /cloud-infrastructure/pservers/pserver/<hostname>/p-interfaces/p-interface/<interface-name>
//! ```
//!
//! Each segment naming a keyed type consumes as many following segments as
//! the type declares keys. The resolver validates the sequence against the
//! schema's declared containment and reports each resolved step to a
//! [`PathVisitor`].

use inventory_core::error::{InventoryError, Result};
use inventory_core::schema::{NodeType, SchemaRegistry};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Ordered key/value bindings for one path step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyBindings {
    entries: Vec<(String, String)>,
}

impl KeyBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, String)> for KeyBindings {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut bindings = Self::new();
        for (k, v) in iter {
            bindings.insert(k, v);
        }
        bindings
    }
}

/// A request path split into raw segments and decoded query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriPath {
    raw: String,
    segments: Vec<String>,
    query: KeyBindings,
}

impl UriPath {
    /// Parse a path, stripping `version_prefix` (e.g. `/aai/v14`) when present.
    ///
    /// Segments stay percent-encoded until they are consumed as keys, so an
    /// encoded `/` inside a key never splits it.
    pub fn parse(input: &str, version_prefix: Option<&str>) -> Result<Self> {
        let (path, query) = match input.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (input, None),
        };

        let mut path = path.trim();
        if let Some(prefix) = version_prefix.map(|p| p.trim_end_matches('/')) {
            if !prefix.is_empty() {
                if let Some(rest) = path.strip_prefix(prefix) {
                    if rest.is_empty() || rest.starts_with('/') {
                        path = rest;
                    }
                }
            }
        }

        let segments: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if segments.is_empty() {
            return Err(InventoryError::malformed_path(input, "path has no segments"));
        }

        let mut bindings = KeyBindings::new();
        for pair in query.unwrap_or("").split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            bindings.insert(decode(input, key)?, decode(input, value)?);
        }

        Ok(Self {
            raw: format!("/{}", segments.join("/")),
            segments,
            query: bindings,
        })
    }

    /// Path without prefix or query string
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn query(&self) -> &KeyBindings {
        &self.query
    }

    /// Same path with a different query string
    pub fn with_query(mut self, query: KeyBindings) -> Self {
        self.query = query;
        self
    }
}

impl fmt::Display for UriPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn decode(path: &str, raw: &str) -> Result<String> {
    let raw = raw.replace('+', " ");
    urlencoding::decode(&raw)
        .map(|s| s.into_owned())
        .map_err(|e| InventoryError::malformed_path(path, format!("invalid percent-encoding: {}", e)))
}

/// Receives one callback per resolved path step.
pub trait PathVisitor {
    /// A keyed resource; `keys` come from path segments or query parameters
    fn process_resource(&mut self, node_type: &Arc<NodeType>, keys: &KeyBindings) -> Result<()>;

    /// A container. `filters` is only populated on the final segment.
    fn process_container(
        &mut self,
        node_type: &Arc<NodeType>,
        filters: &KeyBindings,
        is_final: bool,
    ) -> Result<()>;

    /// A bare namespace or grouping segment
    fn process_namespace(&mut self, _node_type: &Arc<NodeType>) -> Result<()> {
        Ok(())
    }
}

/// One resolved path step.
#[derive(Debug, Clone)]
pub struct PathStep {
    pub node_type: Arc<NodeType>,
    pub kind: PathStepKind,
    pub keys: KeyBindings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStepKind {
    Namespace,
    Container { is_final: bool },
    Resource,
}

/// Collects resolved steps into a list.
#[derive(Debug, Default)]
pub struct StepCollector {
    pub steps: Vec<PathStep>,
}

impl PathVisitor for StepCollector {
    fn process_resource(&mut self, node_type: &Arc<NodeType>, keys: &KeyBindings) -> Result<()> {
        self.steps.push(PathStep {
            node_type: node_type.clone(),
            kind: PathStepKind::Resource,
            keys: keys.clone(),
        });
        Ok(())
    }

    fn process_container(
        &mut self,
        node_type: &Arc<NodeType>,
        filters: &KeyBindings,
        is_final: bool,
    ) -> Result<()> {
        self.steps.push(PathStep {
            node_type: node_type.clone(),
            kind: PathStepKind::Container { is_final },
            keys: filters.clone(),
        });
        Ok(())
    }

    fn process_namespace(&mut self, node_type: &Arc<NodeType>) -> Result<()> {
        self.steps.push(PathStep {
            node_type: node_type.clone(),
            kind: PathStepKind::Namespace,
            keys: KeyBindings::new(),
        });
        Ok(())
    }
}

/// Validates paths against one schema version.
#[derive(Debug, Clone)]
pub struct PathResolver {
    registry: Arc<SchemaRegistry>,
}

impl PathResolver {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Resolve a path into its steps
    pub fn resolve(&self, uri: &UriPath) -> Result<Vec<PathStep>> {
        let mut collector = StepCollector::default();
        self.parse(uri, &mut collector)?;
        Ok(collector.steps)
    }

    /// Walk a path, validating each segment and reporting it to `visitor`
    pub fn parse(&self, uri: &UriPath, visitor: &mut dyn PathVisitor) -> Result<()> {
        let path = uri.as_str();
        let segments = uri.segments();
        let mut previous: Option<Arc<NodeType>> = None;
        let mut i = 0;

        while i < segments.len() {
            let name = decode(path, &segments[i])?;
            let node_type = self.registry.get(&name).cloned().ok_or_else(|| {
                InventoryError::UnresolvableSegment {
                    path: path.to_string(),
                    segment: name.clone(),
                }
            })?;
            self.validate_position(path, previous.as_deref(), &node_type)?;
            let is_last = i == segments.len() - 1;
            trace!("Resolved segment {} as {}", i, node_type.name);

            if node_type.is_container() {
                let filters = if is_last {
                    self.filters_for(&node_type, uri.query())
                } else {
                    KeyBindings::new()
                };
                visitor.process_container(&node_type, &filters, is_last)?;
                i += 1;
            } else if !node_type.keys.is_empty() {
                let key_count = node_type.keys.len();
                let mut keys = KeyBindings::new();
                if is_last && !uri.query().is_empty() {
                    for (key, value) in uri.query().iter() {
                        if node_type.has_property(key) {
                            keys.insert(key, value);
                        }
                    }
                    i += 1;
                } else {
                    if i + key_count >= segments.len() {
                        return Err(InventoryError::malformed_path(
                            path,
                            format!(
                                "'{}' needs {} key segment(s): {}",
                                node_type.name,
                                key_count,
                                node_type.keys.join(", ")
                            ),
                        ));
                    }
                    for (offset, key) in node_type.keys.iter().enumerate() {
                        keys.insert(key.clone(), decode(path, &segments[i + 1 + offset])?);
                    }
                    i += 1 + key_count;
                }
                visitor.process_resource(&node_type, &keys)?;
            } else {
                visitor.process_namespace(&node_type)?;
                i += 1;
            }
            previous = Some(node_type);
        }
        Ok(())
    }

    fn validate_position(
        &self,
        path: &str,
        previous: Option<&NodeType>,
        node_type: &NodeType,
    ) -> Result<()> {
        match previous {
            None => {
                let name = node_type.name.as_str();
                let valid = node_type.is_abstract
                    || self.registry.is_namespace(name)
                    || self
                        .registry
                        .namespaces()
                        .iter()
                        .any(|ns| self.registry.is_child_of(name, ns));
                if !valid {
                    return Err(InventoryError::InvalidNamespaceStart {
                        path: path.to_string(),
                        node_type: node_type.name.clone(),
                    });
                }
            }
            Some(parent) => {
                if !self.registry.is_child_of(&node_type.name, &parent.name) {
                    return Err(InventoryError::InvalidPath {
                        path: path.to_string(),
                        node_type: node_type.name.clone(),
                        parent: parent.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Query parameters naming properties of the container's item type
    fn filters_for(&self, container: &NodeType, query: &KeyBindings) -> KeyBindings {
        let Some(item) = container
            .container_item()
            .and_then(|p| self.registry.get(&p.target))
        else {
            return KeyBindings::new();
        };
        query
            .iter()
            .filter(|(k, _)| item.has_property(k))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}
