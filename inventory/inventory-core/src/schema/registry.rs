//! One immutable schema version.

use crate::edges::EdgeRule;
use crate::error::{InventoryError, Result};
use crate::schema::document::{NodeTypeDocument, PropertyDocument, SchemaDocument};
use crate::schema::model::{NodeType, PropertyDef, PropertyKind, PropertyMetadata, ScalarType};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Every node type of a schema version, with the parent/child indexes
/// derived from complex properties.
#[derive(Debug)]
pub struct SchemaRegistry {
    version: String,
    root: String,
    relationship_container: String,
    relationship_item: Option<String>,
    types: HashMap<String, Arc<NodeType>>,
    order: Vec<String>,
    children: HashMap<String, Vec<String>>,
    parents: HashMap<String, Vec<String>>,
    edge_rules: Vec<EdgeRule>,
}

impl SchemaRegistry {
    /// Parse and validate a JSON schema document
    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_document(SchemaDocument::from_json(json)?)
    }

    /// Build and validate a registry from a parsed document
    pub fn from_document(doc: SchemaDocument) -> Result<Self> {
        let declared: HashSet<&str> = doc.node_types.iter().map(|t| t.name.as_str()).collect();
        if declared.len() != doc.node_types.len() {
            return Err(InventoryError::schema(format!(
                "schema {} declares a node type more than once",
                doc.version
            )));
        }
        if !declared.contains(doc.root.as_str()) {
            return Err(InventoryError::schema(format!(
                "root type '{}' is not declared",
                doc.root
            )));
        }

        let mut types = HashMap::new();
        let mut order = Vec::with_capacity(doc.node_types.len());
        for def in &doc.node_types {
            let node_type = build_node_type(def, &declared)?;
            order.push(node_type.name.clone());
            types.insert(node_type.name.clone(), Arc::new(node_type));
        }

        let relationship_item = types
            .get(&doc.relationship_container)
            .and_then(|t| t.container_item())
            .map(|p| p.target.clone());

        let mut registry = Self {
            version: doc.version,
            root: doc.root,
            relationship_container: doc.relationship_container,
            relationship_item,
            types,
            order,
            children: HashMap::new(),
            parents: HashMap::new(),
            edge_rules: doc.edge_rules,
        };
        registry.index_hierarchy();
        registry.validate()?;

        info!(
            "Loaded schema {} with {} node types and {} edge rules",
            registry.version,
            registry.order.len(),
            registry.edge_rules.len()
        );
        Ok(registry)
    }

    fn index_hierarchy(&mut self) {
        for name in &self.order {
            let node_type = &self.types[name];
            for prop in node_type.properties.iter().filter(|p| p.is_complex()) {
                if self.is_relationship_type(&prop.target) {
                    continue;
                }
                self.children
                    .entry(name.clone())
                    .or_default()
                    .push(prop.target.clone());
                self.parents
                    .entry(prop.target.clone())
                    .or_default()
                    .push(name.clone());
            }
        }
    }

    fn validate(&self) -> Result<()> {
        for name in &self.order {
            let node_type = &self.types[name];

            for inheritor in &node_type.inheritors {
                match self.types.get(inheritor) {
                    Some(t) if !t.is_abstract => {}
                    Some(_) => {
                        return Err(InventoryError::schema(format!(
                            "abstract type '{}' lists abstract inheritor '{}'",
                            name, inheritor
                        )));
                    }
                    None => {
                        return Err(InventoryError::schema(format!(
                            "abstract type '{}' lists unknown inheritor '{}'",
                            name, inheritor
                        )));
                    }
                }
            }
            if node_type.is_abstract && node_type.inheritors.is_empty() {
                return Err(InventoryError::schema(format!(
                    "abstract type '{}' has no inheritors",
                    name
                )));
            }

            let is_resource = !node_type.is_abstract && !node_type.keys.is_empty();
            if is_resource && node_type.delete_semantic.is_none() {
                return Err(InventoryError::schema(format!(
                    "node type '{}' does not declare a delete semantic",
                    name
                )));
            }
        }

        let mut seen_pairs = HashSet::new();
        for rule in &self.edge_rules {
            for end in [&rule.from, &rule.to] {
                if !self.types.contains_key(end) {
                    return Err(InventoryError::schema(format!(
                        "edge rule '{}' references unknown type '{}'",
                        rule.label, end
                    )));
                }
            }
            if rule.direction == crate::types::Direction::Both {
                return Err(InventoryError::schema(format!(
                    "edge rule {} -> {} must be directed",
                    rule.from, rule.to
                )));
            }
            let pair = unordered(&rule.from, &rule.to);
            if !seen_pairs.insert(pair) {
                return Err(InventoryError::schema(format!(
                    "edge rule for pair ({}, {}) declared more than once",
                    rule.from, rule.to
                )));
            }
        }
        debug!("Schema {} validated", self.version);
        Ok(())
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Name of the distinguished relationship container type
    pub fn relationship_container(&self) -> &str {
        &self.relationship_container
    }

    /// Whether `name` is the relationship container or its item type
    pub fn is_relationship_type(&self, name: &str) -> bool {
        name == self.relationship_container || self.relationship_item.as_deref() == Some(name)
    }

    pub fn node_type(&self, name: &str) -> Result<Arc<NodeType>> {
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| InventoryError::UnknownType(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&Arc<NodeType>> {
        self.types.get(name)
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Node types in declaration order
    pub fn node_types(&self) -> impl Iterator<Item = &Arc<NodeType>> {
        self.order.iter().map(move |n| &self.types[n])
    }

    /// Keyed, concrete resource types
    pub fn concrete_types(&self) -> impl Iterator<Item = &Arc<NodeType>> {
        self.node_types()
            .filter(|t| !t.is_abstract && !t.is_container() && !t.keys.is_empty())
    }

    /// Top-level namespaces (declared children of the root type)
    pub fn namespaces(&self) -> &[String] {
        self.children_of(&self.root)
    }

    pub fn is_namespace(&self, name: &str) -> bool {
        self.namespaces().iter().any(|n| n == name)
    }

    /// Types reachable through one complex property of `name`
    pub fn children_of(&self, name: &str) -> &[String] {
        self.children.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Types declaring `name` as the target of a complex property
    pub fn parents_of(&self, name: &str) -> &[String] {
        self.parents.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_child_of(&self, child: &str, parent: &str) -> bool {
        self.children_of(parent).iter().any(|c| c == child)
    }

    /// Concrete inheritors of an abstract type; a concrete type is its own single inheritor
    pub fn inheritors(&self, name: &str) -> Vec<String> {
        match self.types.get(name) {
            Some(t) if t.is_abstract => t.inheritors.clone(),
            Some(t) => vec![t.name.clone()],
            None => Vec::new(),
        }
    }

    /// The unique ancestor chain from just below the root down to `name`,
    /// or `None` when the type is unreachable or reachable in more than one way.
    ///
    /// For `p-interface` this is
    /// `[cloud-infrastructure, pservers, pserver, p-interfaces, p-interface]`.
    pub fn canonical_chain(&self, name: &str) -> Option<Vec<String>> {
        let mut chain = vec![name.to_string()];
        let mut current = name;
        let mut guard = HashSet::new();
        loop {
            if !guard.insert(current.to_string()) {
                return None;
            }
            let parents = self.parents_of(current);
            match parents {
                [] => return None,
                [only] if only == &self.root => break,
                [only] => {
                    chain.push(only.clone());
                    current = only;
                }
                _ => return None,
            }
        }
        chain.reverse();
        Some(chain)
    }

    /// The container type directly holding `name`, if any
    pub fn container_of(&self, name: &str) -> Option<&Arc<NodeType>> {
        self.parents_of(name)
            .iter()
            .filter_map(|p| self.types.get(p))
            .find(|t| t.is_container())
    }

    /// Nearest keyed ancestor type of a dependent type
    pub fn parent_resource_of(&self, name: &str) -> Option<&Arc<NodeType>> {
        let chain = self.canonical_chain(name)?;
        chain
            .iter()
            .rev()
            .skip(1)
            .filter_map(|n| self.types.get(n))
            .find(|t| !t.keys.is_empty())
    }

    /// Raw edge rule declarations of this version
    pub fn edge_rules(&self) -> &[EdgeRule] {
        &self.edge_rules
    }
}

fn unordered(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

fn build_node_type(def: &NodeTypeDocument, declared: &HashSet<&str>) -> Result<NodeType> {
    let mut properties = Vec::with_capacity(def.properties.len());
    let mut seen = HashSet::new();
    for prop in &def.properties {
        if !seen.insert(prop.name.as_str()) {
            return Err(InventoryError::schema(format!(
                "property '{}' declared twice on '{}'",
                prop.name, def.name
            )));
        }
        properties.push(build_property(&def.name, prop, declared)?);
    }

    let by_name: HashMap<&str, &PropertyDef> =
        properties.iter().map(|p| (p.name.as_str(), p)).collect();
    for key in &def.keys {
        match by_name.get(key.as_str()) {
            Some(p) if p.kind == PropertyKind::Scalar => {}
            Some(_) => {
                return Err(InventoryError::schema(format!(
                    "key '{}' of '{}' is not a scalar property",
                    key, def.name
                )));
            }
            None => {
                return Err(InventoryError::schema(format!(
                    "key '{}' of '{}' is not a declared property",
                    key, def.name
                )));
            }
        }
    }
    for name in def.required.iter().chain(&def.name_props).chain(&def.alternate_keys) {
        if !by_name.contains_key(name.as_str()) {
            return Err(InventoryError::schema(format!(
                "'{}' listed on '{}' is not a declared property",
                name, def.name
            )));
        }
    }

    Ok(NodeType::new(
        def.name.clone(),
        def.namespace.clone(),
        def.is_abstract,
        def.inheritors.clone(),
        def.keys.clone(),
        def.alternate_keys.clone(),
        def.required.clone(),
        properties,
        def.delete_semantic,
        def.name_props.clone(),
        def.dependent_on.clone(),
        def.description.clone(),
    ))
}

fn build_property(
    owner: &str,
    doc: &PropertyDocument,
    declared: &HashSet<&str>,
) -> Result<PropertyDef> {
    let target_of = |doc: &PropertyDocument| {
        doc.target.clone().ok_or_else(|| {
            InventoryError::schema(format!(
                "property '{}.{}' of type '{}' needs a target",
                owner, doc.name, doc.type_name
            ))
        })
    };

    let (kind, target, scalar) = match doc.type_name.as_str() {
        "complex" => (PropertyKind::Complex, target_of(doc)?, None),
        "list" => {
            let target = target_of(doc)?;
            match ScalarType::from_name(&target) {
                Some(scalar) => (PropertyKind::ScalarList, target, Some(scalar)),
                None => (PropertyKind::ComplexList, target, None),
            }
        }
        other => match ScalarType::from_name(other) {
            Some(scalar) => (PropertyKind::Scalar, other.to_string(), Some(scalar)),
            None => {
                return Err(InventoryError::schema(format!(
                    "property '{}.{}' has unknown type '{}'",
                    owner, doc.name, other
                )));
            }
        },
    };

    if kind.is_complex() && !declared.contains(target.as_str()) {
        return Err(InventoryError::schema(format!(
            "property '{}.{}' targets unknown type '{}'",
            owner, doc.name, target
        )));
    }

    let default = match (&doc.default, scalar) {
        (Some(value), Some(scalar)) => Some(scalar.coerce(value).ok_or_else(|| {
            InventoryError::schema(format!(
                "default {} of '{}.{}' is not a valid {}",
                value, owner, doc.name, scalar
            ))
        })?),
        (Some(_), None) => {
            return Err(InventoryError::schema(format!(
                "complex property '{}.{}' cannot declare a default",
                owner, doc.name
            )));
        }
        (None, _) => None,
    };

    Ok(PropertyDef {
        name: doc.name.clone(),
        kind,
        target,
        scalar,
        default,
        metadata: PropertyMetadata {
            db_alias: doc.db_alias.clone(),
            visibility: doc.visibility,
            indexed: doc.indexed,
            unique: doc.unique,
            description: doc.description.clone(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fixtures;

    #[test]
    fn test_fixture_loads() {
        let registry = fixtures::registry_v1();
        assert_eq!(registry.version(), "v1");
        assert_eq!(registry.root(), "inventory");
        assert!(registry.has_type("pserver"));
        assert!(registry.node_type("pservers").unwrap().is_container());
        assert!(!registry.node_type("pserver").unwrap().is_container());
    }

    #[test]
    fn test_hierarchy_indexes() {
        let registry = fixtures::registry_v1();
        assert!(registry.is_namespace("cloud-infrastructure"));
        assert!(registry.is_child_of("pservers", "cloud-infrastructure"));
        assert!(registry.is_child_of("pserver", "pservers"));
        assert!(registry.is_child_of("p-interfaces", "pserver"));
        assert!(!registry.is_child_of("relationship-list", "pserver"));
        assert!(!registry.is_child_of("vnf", "pserver"));
        assert_eq!(registry.parents_of("p-interface").to_vec(), vec!["p-interfaces".to_string()]);
    }

    #[test]
    fn test_canonical_chain() {
        let registry = fixtures::registry_v1();
        assert_eq!(
            registry.canonical_chain("p-interface").unwrap(),
            vec!["cloud-infrastructure", "pservers", "pserver", "p-interfaces", "p-interface"]
        );
        assert!(registry.canonical_chain("vnf").is_none());
        assert_eq!(registry.parent_resource_of("p-interface").unwrap().name, "pserver");
        assert!(registry.parent_resource_of("pserver").is_none());
        assert_eq!(registry.container_of("pserver").unwrap().name, "pservers");
    }

    #[test]
    fn test_abstract_inheritors() {
        let registry = fixtures::registry_v1();
        let vnf = registry.node_type("vnf").unwrap();
        assert!(vnf.is_abstract);
        assert_eq!(registry.inheritors("vnf"), vec!["generic-vnf", "vce", "vpe"]);
        assert_eq!(registry.inheritors("pserver"), vec!["pserver"]);
    }

    #[test]
    fn test_defaults_are_coerced() {
        let registry = fixtures::registry_v1();
        let pserver = registry.node_type("pserver").unwrap();
        let in_maint = pserver.property("in-maint").unwrap();
        assert_eq!(in_maint.default, Some(serde_json::json!(false)));
        assert_eq!(pserver.property("ipv4-oam-address").unwrap().storage_name(), "ipv4-oam");
    }

    #[test]
    fn test_rejects_key_that_is_not_a_property() {
        let json = r#"{
            "version": "bad", "root": "r",
            "node-types": [
                {"name": "r", "properties": [{"name": "t", "type": "complex", "target": "t"}]},
                {"name": "t", "keys": ["id"], "delete-semantic": "cascade-to-children",
                 "properties": [{"name": "name", "type": "string"}]}
            ]
        }"#;
        let err = SchemaRegistry::from_json(json).unwrap_err();
        assert!(err.to_string().contains("key 'id'"));
    }

    #[test]
    fn test_rejects_missing_delete_semantic() {
        let json = r#"{
            "version": "bad", "root": "r",
            "node-types": [
                {"name": "r", "properties": [{"name": "t", "type": "complex", "target": "t"}]},
                {"name": "t", "keys": ["id"], "properties": [{"name": "id", "type": "string"}]}
            ]
        }"#;
        assert!(SchemaRegistry::from_json(json).is_err());
    }

    #[test]
    fn test_rejects_duplicate_rule_pair() {
        let json = r#"{
            "version": "bad", "root": "r",
            "node-types": [
                {"name": "r", "properties": [{"name": "a", "type": "complex", "target": "a"}]},
                {"name": "a", "keys": ["id"], "delete-semantic": "cascade-to-children",
                 "properties": [{"name": "id", "type": "string"}]},
                {"name": "b", "keys": ["id"], "delete-semantic": "cascade-to-children",
                 "properties": [{"name": "id", "type": "string"}]}
            ],
            "edge-rules": [
                {"from": "a", "to": "b", "label": "x", "multiplicity": "many-to-many"},
                {"from": "b", "to": "a", "label": "y", "multiplicity": "many-to-many"}
            ]
        }"#;
        let err = SchemaRegistry::from_json(json).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_rejects_bad_default() {
        let json = r#"{
            "version": "bad", "root": "r",
            "node-types": [
                {"name": "r", "properties": [
                    {"name": "flag", "type": "boolean", "default": "maybe"}
                ]}
            ]
        }"#;
        assert!(SchemaRegistry::from_json(json).is_err());
    }
}
