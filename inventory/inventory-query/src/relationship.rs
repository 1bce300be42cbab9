//! Relationship descriptors: the wire form of a cousin edge.
//!
//! ```json
//! {
//!   "related-to": "complex",
//!   "relationship-label": "locatedIn",
//!   "related-link": "/cloud-infrastructure/complexes/complex/clli1",
//!   "relationship-data": [
//!     {"relationship-key": "complex.physical-location-id", "relationship-value": "clli1"}
//!   ],
//!   "related-to-property": [
//!     {"property-key": "complex.complex-name", "property-value": "Main"}
//!   ]
//! }
//! ```

use crate::path::{KeyBindings, PathResolver, PathVisitor, UriPath};
use inventory_core::error::{InventoryError, Result};
use inventory_core::introspection::{Introspector, ModelLoader};
use inventory_core::schema::NodeType;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RelationshipData {
    /// `<type>.<key>`
    pub relationship_key: String,
    pub relationship_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RelatedToProperty {
    /// `<type>.<property>`
    pub property_key: String,
    pub property_value: String,
}

/// Identifies the target resource of a relationship.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RelationshipDescriptor {
    pub related_to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_link: Option<String>,
    #[serde(default)]
    pub relationship_data: Vec<RelationshipData>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_to_property: Vec<RelatedToProperty>,
}

impl RelationshipDescriptor {
    pub fn new(related_to: impl Into<String>) -> Self {
        Self {
            related_to: related_to.into(),
            ..Self::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.relationship_label = Some(label.into());
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.related_link = Some(link.into());
        self
    }

    pub fn with_data(mut self, node_type: &str, key: &str, value: impl Into<String>) -> Self {
        self.push_data(node_type, key, value);
        self
    }

    pub fn push_data(&mut self, node_type: &str, key: &str, value: impl Into<String>) {
        self.relationship_data.push(RelationshipData {
            relationship_key: format!("{}.{}", node_type, key),
            relationship_value: value.into(),
        });
    }

    pub fn push_property(&mut self, node_type: &str, property: &str, value: impl Into<String>) {
        self.related_to_property.push(RelatedToProperty {
            property_key: format!("{}.{}", node_type, property),
            property_value: value.into(),
        });
    }

    /// The link, if present and non-empty
    pub fn link(&self) -> Option<&str> {
        self.related_link.as_deref().filter(|l| !l.trim().is_empty())
    }

    /// Relationship data grouped by node type, in first-seen order
    pub fn key_groups(&self) -> Result<Vec<(String, KeyBindings)>> {
        let mut groups: Vec<(String, KeyBindings)> = Vec::new();
        for data in &self.relationship_data {
            let (node_type, key) = data.relationship_key.split_once('.').ok_or_else(|| {
                InventoryError::referential(
                    &self.related_to,
                    self.link().unwrap_or(""),
                    format!(
                        "relationship key '{}' is not of the form <type>.<key>",
                        data.relationship_key
                    ),
                )
            })?;
            match groups.iter_mut().find(|(t, _)| t == node_type) {
                Some((_, bindings)) => bindings.insert(key, data.relationship_value.clone()),
                None => {
                    let mut bindings = KeyBindings::new();
                    bindings.insert(key, data.relationship_value.clone());
                    groups.push((node_type.to_string(), bindings));
                }
            }
        }
        Ok(groups)
    }

    /// Read a descriptor from a relationship object
    pub fn from_introspector(obj: &dyn Introspector) -> Result<Self> {
        Ok(serde_json::from_value(obj.to_value())?)
    }

    /// Build a relationship object of the loader's schema version
    pub fn to_introspector(&self, loader: &ModelLoader) -> Result<Box<dyn Introspector>> {
        let registry = loader.registry();
        let container = registry.node_type(registry.relationship_container())?;
        let item = container.container_item().ok_or_else(|| {
            InventoryError::schema(format!(
                "relationship container '{}' declares no item type",
                container.name
            ))
        })?;
        loader.from_value(&item.target, serde_json::to_value(self)?)
    }
}

/// Path visitor producing the descriptor that points at the path's resource.
#[derive(Debug, Default)]
pub struct RelationshipBuilder {
    link_prefix: Option<String>,
    related_to: Option<String>,
    data: Vec<RelationshipData>,
    ends_on_container: bool,
}

impl RelationshipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix prepended to `related-link`
    pub fn with_link_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into().trim_end_matches('/').to_string();
        self.link_prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }

    /// Resolve `uri` and describe the resource it names
    pub fn build(
        mut self,
        resolver: &PathResolver,
        uri: &UriPath,
        label: Option<String>,
    ) -> Result<RelationshipDescriptor> {
        resolver.parse(uri, &mut self)?;
        let related_to = match (self.related_to, self.ends_on_container) {
            (Some(t), false) => t,
            _ => {
                return Err(InventoryError::malformed_path(
                    uri.as_str(),
                    "a relationship must point at a single resource",
                ))
            }
        };
        Ok(RelationshipDescriptor {
            related_to,
            relationship_label: label,
            related_link: Some(format!(
                "{}{}",
                self.link_prefix.unwrap_or_default(),
                uri.as_str()
            )),
            relationship_data: self.data,
            related_to_property: Vec::new(),
        })
    }
}

impl PathVisitor for RelationshipBuilder {
    fn process_resource(&mut self, node_type: &Arc<NodeType>, keys: &KeyBindings) -> Result<()> {
        for (key, value) in keys.iter() {
            self.data.push(RelationshipData {
                relationship_key: format!("{}.{}", node_type.name, key),
                relationship_value: value.to_string(),
            });
        }
        self.related_to = Some(node_type.name.clone());
        self.ends_on_container = false;
        Ok(())
    }

    fn process_container(
        &mut self,
        _node_type: &Arc<NodeType>,
        _filters: &KeyBindings,
        is_final: bool,
    ) -> Result<()> {
        self.ends_on_container = is_final;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inventory_core::introspection::ModelType;
    use inventory_core::schema::fixtures;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let descriptor = RelationshipDescriptor::new("complex")
            .with_label("locatedIn")
            .with_data("complex", "physical-location-id", "clli1");
        let value = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(
            value,
            json!({
                "related-to": "complex",
                "relationship-label": "locatedIn",
                "relationship-data": [
                    {"relationship-key": "complex.physical-location-id", "relationship-value": "clli1"}
                ]
            })
        );
        let back: RelationshipDescriptor = serde_json::from_value(value).unwrap();
        assert_eq!(back, descriptor);
    }

    #[test]
    fn test_key_groups_preserve_order() {
        let descriptor = RelationshipDescriptor::new("p-interface")
            .with_data("pserver", "hostname", "h1")
            .with_data("p-interface", "interface-name", "eth0");
        let groups = descriptor.key_groups().unwrap();
        assert_eq!(groups[0].0, "pserver");
        assert_eq!(groups[1].1.get("interface-name"), Some("eth0"));

        let mut bad = RelationshipDescriptor::new("complex");
        bad.relationship_data.push(RelationshipData {
            relationship_key: "no-dot".into(),
            relationship_value: "x".into(),
        });
        assert!(bad.key_groups().is_err());
    }

    #[test]
    fn test_builder_from_path() {
        let resolver = PathResolver::new(fixtures::registry_v1());
        let uri = UriPath::parse(
            "/cloud-infrastructure/pservers/pserver/h1/p-interfaces/p-interface/eth0",
            None,
        )
        .unwrap();
        let descriptor = RelationshipBuilder::new()
            .with_link_prefix("/aai/v1/")
            .build(&resolver, &uri, None)
            .unwrap();
        assert_eq!(descriptor.related_to, "p-interface");
        assert_eq!(
            descriptor.link(),
            Some("/aai/v1/cloud-infrastructure/pservers/pserver/h1/p-interfaces/p-interface/eth0")
        );
        assert_eq!(descriptor.relationship_data.len(), 2);
        assert_eq!(descriptor.relationship_data[0].relationship_key, "pserver.hostname");

        let container = UriPath::parse("/cloud-infrastructure/pservers", None).unwrap();
        assert!(RelationshipBuilder::new().build(&resolver, &container, None).is_err());
    }

    #[test]
    fn test_introspector_round_trip() {
        let loader = ModelLoader::new(fixtures::registry_v1(), ModelType::Dynamic);
        let descriptor = RelationshipDescriptor::new("complex")
            .with_link("/cloud-infrastructure/complexes/complex/c1")
            .with_data("complex", "physical-location-id", "c1");
        let obj = descriptor.to_introspector(&loader).unwrap();
        assert_eq!(obj.name(), "relationship");
        assert_eq!(RelationshipDescriptor::from_introspector(obj.as_ref()).unwrap(), descriptor);
    }

    #[test]
    fn test_empty_link_is_ignored() {
        let descriptor = RelationshipDescriptor::new("complex").with_link("  ");
        assert_eq!(descriptor.link(), None);
    }
}
