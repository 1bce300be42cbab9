//! Translation between introspected objects and graph vertices.
//!
//! The serializer owns every rule about how a resource is laid out in the
//! graph: bookkeeping properties, resource-version tokens, dependent
//! children reached over tree edges and relationships stored as cousin
//! edges. It never opens or commits transactions itself.

mod delete;
mod read;
mod write;

use crate::executor::GraphQueryExecutor;
use chrono::Utc;
use inventory_core::config::SerializerConfig;
use inventory_core::edges::{EdgeRule, EdgeRules, EdgeType};
use inventory_core::error::{InventoryError, Result};
use inventory_core::introspection::{Introspector, ModelLoader};
use inventory_core::schema::{NodeType, SchemaRegistry};
use inventory_core::traits::GraphTransaction;
use inventory_core::types::{value_to_string, vertex_props, ResourceVersion, Value, VertexId};
use inventory_query::{KeyBindings, QueryBuilder, QueryStep, RelationshipDescriptor};
use std::sync::Arc;
use tracing::debug;

/// Mutation a resource-version check guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAction {
    Create,
    Update,
    Delete,
}

/// Reads and writes resources of one schema version.
#[derive(Clone)]
pub struct GraphSerializer {
    loader: ModelLoader,
    latest: Arc<SchemaRegistry>,
    rules: Arc<EdgeRules>,
    executor: Arc<dyn GraphQueryExecutor>,
    options: SerializerConfig,
}

impl GraphSerializer {
    pub fn new(
        loader: ModelLoader,
        rules: Arc<EdgeRules>,
        executor: Arc<dyn GraphQueryExecutor>,
    ) -> Self {
        let latest = loader.registry().clone();
        Self {
            loader,
            latest,
            rules,
            executor,
            options: SerializerConfig::default(),
        }
    }

    /// Registry whose defaults fill missing required properties on write
    pub fn with_latest(mut self, latest: Arc<SchemaRegistry>) -> Self {
        self.latest = latest;
        self
    }

    pub fn with_options(mut self, options: SerializerConfig) -> Self {
        self.options = options;
        self
    }

    pub fn loader(&self) -> &ModelLoader {
        &self.loader
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        self.loader.registry()
    }

    pub fn rules(&self) -> &Arc<EdgeRules> {
        &self.rules
    }

    pub fn executor(&self) -> &Arc<dyn GraphQueryExecutor> {
        &self.executor
    }

    pub fn options(&self) -> &SerializerConfig {
        &self.options
    }

    /// Add a vertex for `obj` stamped with its node type, timestamps,
    /// attribution and a fresh resource-version token.
    pub fn create_vertex(&self, tx: &mut dyn GraphTransaction, obj: &dyn Introspector) -> Result<VertexId> {
        if obj.is_container() || obj.is_abstract() {
            return Err(InventoryError::invalid_input(format!(
                "'{}' cannot be stored as a vertex",
                obj.name()
            )));
        }
        let vertex = tx.add_vertex()?;
        let now = Value::from(Utc::now().timestamp_millis());
        let source = Value::from(self.options.source_of_truth.as_str());
        tx.set_property(vertex, vertex_props::NODE_TYPE, Value::from(obj.name()))?;
        tx.set_property(vertex, vertex_props::CREATED_TS, now.clone())?;
        tx.set_property(vertex, vertex_props::LAST_MOD_TS, now)?;
        tx.set_property(vertex, vertex_props::SOURCE_OF_TRUTH, source.clone())?;
        tx.set_property(vertex, vertex_props::LAST_MOD_SOURCE_OF_TRUTH, source)?;
        tx.set_property(
            vertex,
            vertex_props::RESOURCE_VERSION,
            Value::from(ResourceVersion::initial().as_str()),
        )?;
        debug!("Created {} vertex {}", obj.name(), vertex);
        Ok(vertex)
    }

    /// Record a modification: new timestamp, attribution and token
    pub fn touch_vertex(&self, tx: &mut dyn GraphTransaction, vertex: VertexId) -> Result<ResourceVersion> {
        let previous = self.stored_version(tx, vertex)?;
        let next = ResourceVersion::next_after(previous.as_deref());
        tx.set_property(vertex, vertex_props::LAST_MOD_TS, Value::from(Utc::now().timestamp_millis()))?;
        tx.set_property(
            vertex,
            vertex_props::LAST_MOD_SOURCE_OF_TRUTH,
            Value::from(self.options.source_of_truth.as_str()),
        )?;
        tx.set_property(vertex, vertex_props::RESOURCE_VERSION, Value::from(next.as_str()))?;
        Ok(next)
    }

    /// Token currently stored on a vertex
    pub fn stored_version(&self, tx: &dyn GraphTransaction, vertex: VertexId) -> Result<Option<String>> {
        Ok(tx
            .property(vertex, vertex_props::RESOURCE_VERSION)?
            .as_ref()
            .and_then(value_to_string))
    }

    /// Enforce optimistic concurrency for one mutation.
    ///
    /// Creates must not carry a token. Updates and deletes must carry the
    /// stored one, except for legacy vertices that never had a token.
    /// An empty token counts as no token.
    pub fn verify_resource_version(
        &self,
        action: WriteAction,
        uri: &str,
        stored: Option<&str>,
        supplied: Option<&str>,
    ) -> Result<()> {
        if !self.options.version_check {
            return Ok(());
        }
        let supplied = supplied.filter(|s| !s.is_empty());
        match action {
            WriteAction::Create => match supplied {
                Some(_) => Err(InventoryError::VersionPassedOnCreate { uri: uri.to_string() }),
                None => Ok(()),
            },
            WriteAction::Update | WriteAction::Delete => match (stored, supplied) {
                (None, _) => Ok(()),
                (Some(_), None) => Err(InventoryError::VersionMissing { uri: uri.to_string() }),
                (Some(stored), Some(supplied)) if stored == supplied => Ok(()),
                (Some(stored), Some(supplied)) => Err(InventoryError::VersionMismatch {
                    uri: uri.to_string(),
                    supplied: supplied.to_string(),
                    stored: stored.to_string(),
                }),
            },
        }
    }

    /// Canonical path of a stored vertex, without any uri prefix
    pub fn uri_for_vertex(&self, tx: &dyn GraphTransaction, vertex: VertexId) -> Result<String> {
        if let Some(Value::String(uri)) = tx.property(vertex, vertex_props::VERTEX_URI)? {
            return Ok(uri);
        }
        let mut chain = self.executor.find_parents(tx, vertex)?;
        chain.reverse();
        chain.push(vertex);

        let mut uri = String::new();
        for (i, v) in chain.iter().enumerate() {
            let node_type = self.stored_type(tx, *v)?;
            if i == 0 {
                if let Some(namespace) = self.namespace_of(&node_type.name) {
                    uri.push('/');
                    uri.push_str(&namespace);
                }
            }
            let keys = self.vertex_keys(tx, *v, &node_type)?;
            uri.push_str(&self.segment(&node_type, &keys));
        }
        Ok(uri)
    }

    /// Canonical path of a stored vertex as clients see it
    pub fn link_for_vertex(&self, tx: &dyn GraphTransaction, vertex: VertexId) -> Result<String> {
        let uri = self.uri_for_vertex(tx, vertex)?;
        Ok(format!("{}{}", self.loader.uri_prefix().unwrap_or(""), uri))
    }

    /// Copy path key bindings into `obj`; a conflicting body value is refused
    pub fn inject_keys_from_path(&self, obj: &mut dyn Introspector, keys: &KeyBindings) -> Result<()> {
        for (key, raw) in keys.iter() {
            let expected = Value::from(raw);
            match obj.get(key) {
                Some(existing) if !QueryStep::value_matches(&existing, &expected) => {
                    return Err(InventoryError::invalid_input(format!(
                        "'{}' of '{}' is '{}' in the body but '{}' in the path",
                        key,
                        obj.name(),
                        value_to_string(&existing).unwrap_or_default(),
                        raw
                    )));
                }
                Some(_) => {}
                None => obj.set(key, expected)?,
            }
        }
        Ok(())
    }

    /// The single vertex a relationship descriptor points at
    pub fn resolve_relationship(
        &self,
        tx: &dyn GraphTransaction,
        descriptor: &RelationshipDescriptor,
    ) -> Result<VertexId> {
        let plan = QueryBuilder::new(self.rules.clone())
            .with_uri_prefix(self.loader.uri_prefix().map(str::to_string))
            .from_relationship(descriptor)?
            .into_plan();
        let found = self.executor.execute(tx, &plan)?;
        let described = descriptor.link().unwrap_or(descriptor.related_to.as_str());
        match found.as_slice() {
            [vertex] => Ok(*vertex),
            [] => Err(InventoryError::referential(
                &descriptor.related_to,
                described,
                "related resource does not exist",
            )),
            many => Err(InventoryError::MultipleResults {
                node_type: descriptor.related_to.clone(),
                path: described.to_string(),
                count: many.len(),
            }),
        }
    }

    /// Cousin rule between two stored vertices, checked against a requested label
    pub(crate) fn cousin_rule(
        &self,
        tx: &dyn GraphTransaction,
        from: VertexId,
        to: VertexId,
        label: Option<&str>,
    ) -> Result<EdgeRule> {
        let from_type = self.stored_type_name(tx, from)?;
        let to_type = self.stored_type_name(tx, to)?;
        let rule = self.rules.rule_for_kind(EdgeType::Cousin, &from_type, &to_type)?;
        match label {
            Some(label) if label != rule.label => Err(InventoryError::referential(
                &to_type,
                self.uri_for_vertex(tx, to)?,
                format!(
                    "no '{}' relationship between '{}' and '{}', only '{}'",
                    label, from_type, to_type, rule.label
                ),
            )),
            _ => Ok(rule),
        }
    }

    pub(crate) fn stored_type_name(&self, tx: &dyn GraphTransaction, vertex: VertexId) -> Result<String> {
        tx.node_type(vertex)?
            .ok_or_else(|| InventoryError::DamagedVertex(vertex.to_string()))
    }

    pub(crate) fn stored_type(&self, tx: &dyn GraphTransaction, vertex: VertexId) -> Result<Arc<NodeType>> {
        let name = self.stored_type_name(tx, vertex)?;
        self.registry().node_type(&name)
    }

    /// Rendered key values of a stored vertex, in declaration order
    pub(crate) fn vertex_keys(
        &self,
        tx: &dyn GraphTransaction,
        vertex: VertexId,
        node_type: &NodeType,
    ) -> Result<Vec<(String, String)>> {
        let mut keys = Vec::with_capacity(node_type.keys.len());
        for key in &node_type.keys {
            let storage = node_type.property(key).map_or(key.as_str(), |def| def.storage_name());
            let value = tx
                .property(vertex, storage)?
                .as_ref()
                .and_then(value_to_string)
                .ok_or_else(|| {
                    InventoryError::internal(format!(
                        "{} vertex {} has no value for key '{}'",
                        node_type.name, vertex, key
                    ))
                })?;
            keys.push((key.clone(), value));
        }
        Ok(keys)
    }

    /// `/<container>/<type>/<key>...` for one resource
    pub(crate) fn segment(&self, node_type: &NodeType, keys: &[(String, String)]) -> String {
        let mut segment = String::new();
        if let Some(container) = self.registry().container_of(&node_type.name) {
            segment.push('/');
            segment.push_str(&container.name);
        }
        segment.push('/');
        segment.push_str(&node_type.name);
        for (_, value) in keys {
            segment.push('/');
            segment.push_str(&urlencoding::encode(value));
        }
        segment
    }

    /// Canonical path of a resource that has no parent resource
    pub(crate) fn top_level_uri(&self, obj: &dyn Introspector) -> Result<String> {
        let mut uri = String::new();
        if let Some(namespace) = self.namespace_of(obj.name()) {
            uri.push('/');
            uri.push_str(&namespace);
        }
        uri.push_str(&self.segment(obj.node_type(), &obj.key_values()?));
        Ok(uri)
    }

    fn namespace_of(&self, type_name: &str) -> Option<String> {
        let registry = self.registry();
        registry
            .canonical_chain(type_name)?
            .into_iter()
            .next()
            .filter(|first| registry.is_namespace(first))
    }
}

impl std::fmt::Debug for GraphSerializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphSerializer")
            .field("version", &self.loader.version())
            .field("latest", &self.latest.version())
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::executor::PlanExecutor;
    use crate::memory::InMemoryGraph;
    use inventory_core::introspection::ModelType;
    use inventory_core::schema::fixtures;
    use inventory_core::traits::GraphStore;
    use serde_json::json;

    pub(crate) fn serializer() -> GraphSerializer {
        let registry = fixtures::registry_v1();
        let rules = fixtures::edge_rules(&registry);
        let loader = ModelLoader::new(registry, ModelType::Dynamic).with_uri_prefix("/inventory/v1");
        GraphSerializer::new(loader, rules, Arc::new(PlanExecutor::new()))
    }

    #[test]
    fn test_create_vertex_stamps_bookkeeping() {
        let s = serializer();
        let graph = InMemoryGraph::new();
        let mut tx = graph.begin().unwrap();
        let obj = s.loader().from_value("pserver", json!({"hostname": "h1"})).unwrap();

        let v = s.create_vertex(tx.as_mut(), obj.as_ref()).unwrap();
        assert_eq!(tx.node_type(v).unwrap().as_deref(), Some("pserver"));
        assert!(tx.property(v, vertex_props::CREATED_TS).unwrap().is_some());
        assert_eq!(
            tx.property(v, vertex_props::SOURCE_OF_TRUTH).unwrap(),
            Some(json!("inventory"))
        );
        let first = s.stored_version(tx.as_ref(), v).unwrap().unwrap();
        let next = s.touch_vertex(tx.as_mut(), v).unwrap();
        assert!(next.as_str().parse::<i64>().unwrap() > first.parse::<i64>().unwrap());
    }

    #[test]
    fn test_create_vertex_rejects_containers() {
        let s = serializer();
        let graph = InMemoryGraph::new();
        let mut tx = graph.begin().unwrap();
        let container = s.loader().introspector("pservers").unwrap();
        assert!(s.create_vertex(tx.as_mut(), container.as_ref()).is_err());
    }

    #[test]
    fn test_verify_resource_version() {
        let s = serializer();
        let uri = "/cloud-infrastructure/pservers/pserver/h1";
        assert!(s.verify_resource_version(WriteAction::Create, uri, None, None).is_ok());
        assert!(matches!(
            s.verify_resource_version(WriteAction::Create, uri, None, Some("1")),
            Err(InventoryError::VersionPassedOnCreate { .. })
        ));
        assert!(matches!(
            s.verify_resource_version(WriteAction::Update, uri, Some("5"), None),
            Err(InventoryError::VersionMissing { .. })
        ));
        assert!(matches!(
            s.verify_resource_version(WriteAction::Delete, uri, Some("5"), Some("4")),
            Err(InventoryError::VersionMismatch { .. })
        ));
        assert!(s.verify_resource_version(WriteAction::Update, uri, Some("5"), Some("5")).is_ok());
        assert!(s.verify_resource_version(WriteAction::Update, uri, None, None).is_ok());

        let relaxed = serializer().with_options(SerializerConfig {
            version_check: false,
            ..SerializerConfig::default()
        });
        assert!(relaxed.verify_resource_version(WriteAction::Update, uri, Some("5"), None).is_ok());
    }

    #[test]
    fn test_empty_resource_version_is_missing() {
        let s = serializer();
        let uri = "/cloud-infrastructure/pservers/pserver/h1";
        assert!(s.verify_resource_version(WriteAction::Create, uri, None, Some("")).is_ok());
        assert!(matches!(
            s.verify_resource_version(WriteAction::Update, uri, Some("5"), Some("")),
            Err(InventoryError::VersionMissing { .. })
        ));
        assert!(matches!(
            s.verify_resource_version(WriteAction::Delete, uri, Some("5"), Some("")),
            Err(InventoryError::VersionMissing { .. })
        ));
        // vertices written before tokens existed accept any token
        assert!(s.verify_resource_version(WriteAction::Delete, uri, None, Some("")).is_ok());
        assert!(s.verify_resource_version(WriteAction::Update, uri, None, Some("7")).is_ok());
    }

    #[test]
    fn test_uri_for_vertex_walks_parents() {
        let s = serializer();
        let graph = InMemoryGraph::new();
        let mut tx = graph.begin().unwrap();
        let pserver = s
            .create_vertex(tx.as_mut(), s.loader().from_value("pserver", json!({"hostname": "h 1"})).unwrap().as_ref())
            .unwrap();
        tx.set_property(pserver, "hostname", json!("h 1")).unwrap();
        let iface = s
            .create_vertex(
                tx.as_mut(),
                s.loader().from_value("p-interface", json!({"interface-name": "eth0"})).unwrap().as_ref(),
            )
            .unwrap();
        tx.set_property(iface, "interface-name", json!("eth0")).unwrap();
        s.rules().add_edge(tx.as_mut(), EdgeType::Tree, pserver, iface).unwrap();

        assert_eq!(
            s.uri_for_vertex(tx.as_ref(), iface).unwrap(),
            "/cloud-infrastructure/pservers/pserver/h%201/p-interfaces/p-interface/eth0"
        );
        assert_eq!(
            s.link_for_vertex(tx.as_ref(), pserver).unwrap(),
            "/inventory/v1/cloud-infrastructure/pservers/pserver/h%201"
        );

        tx.set_property(pserver, vertex_props::VERTEX_URI, json!("/cached")).unwrap();
        assert_eq!(s.uri_for_vertex(tx.as_ref(), pserver).unwrap(), "/cached");
    }

    #[test]
    fn test_inject_keys_from_path() {
        let s = serializer();
        let keys: KeyBindings = [("hostname".to_string(), "h1".to_string())].into_iter().collect();

        let mut empty = s.loader().introspector("pserver").unwrap();
        s.inject_keys_from_path(empty.as_mut(), &keys).unwrap();
        assert_eq!(empty.get("hostname"), Some(json!("h1")));

        let mut conflicting = s.loader().from_value("pserver", json!({"hostname": "h2"})).unwrap();
        let err = s.inject_keys_from_path(conflicting.as_mut(), &keys).unwrap_err();
        assert!(matches!(err, InventoryError::InvalidInput(_)));
    }
}
