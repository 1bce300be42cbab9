//! Request-level entry points over a graph store.
//!
//! Every mutation runs as one unit of work: a fresh transaction per
//! attempt, hooks around the writes, commit on success, rollback on any
//! error, and bounded retry when the commit hits a storage conflict.

use crate::executor::{GraphQueryExecutor, PlanExecutor};
use crate::hooks::{MutationAction, MutationContext, MutationHooks, MutationKind, MutationOutcome};
use crate::retry::RetryPolicy;
use crate::serializer::{GraphSerializer, WriteAction};
use inventory_core::config::{EngineConfig, UNBOUNDED_DEPTH};
use inventory_core::edges::{EdgeRules, EdgeType};
use inventory_core::error::{InventoryError, Result};
use inventory_core::introspection::{Introspector, ModelLoader};
use inventory_core::schema::fixtures::{V1_JSON, V2_JSON};
use inventory_core::schema::SchemaCatalog;
use inventory_core::traits::{GraphStore, GraphTransaction};
use inventory_core::types::{value_to_string, vertex_props, Value, VertexId};
use inventory_query::{
    KeyBindings, PathResolver, PathStepKind, QueryBuilder, RelationshipDescriptor, TraversalPlan, UriPath,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Trailing segments addressing a resource's relationship list
const RELATIONSHIP_SUFFIX: &str = "/relationship-list/relationship";

/// Schema-governed inventory over one graph store.
pub struct InventoryEngine {
    catalog: Arc<SchemaCatalog>,
    store: Arc<dyn GraphStore>,
    config: EngineConfig,
    retry: RetryPolicy,
    hooks: Vec<Arc<dyn MutationHooks>>,
    serializers: HashMap<String, GraphSerializer>,
    default_version: String,
}

/// A request path routed to the serializer of its schema version
struct Routed<'a> {
    serializer: &'a GraphSerializer,
    path: UriPath,
    builder: QueryBuilder,
}

impl InventoryEngine {
    /// Build an engine over every version of `catalog`
    pub fn new(catalog: SchemaCatalog, store: Arc<dyn GraphStore>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let latest = catalog.latest()?;
        let executor: Arc<dyn GraphQueryExecutor> = Arc::new(PlanExecutor::new());
        let prefix = config.schema().namespace_prefix.clone().unwrap_or_default();
        let prefix = prefix.trim_end_matches('/');

        let mut serializers = HashMap::new();
        for version in catalog.versions() {
            let registry = catalog.version(version)?;
            let rules = Arc::new(EdgeRules::from_registry(registry.clone())?);
            let loader = ModelLoader::new(registry, config.schema().model_type)
                .with_uri_prefix(format!("{}/{}", prefix, version));
            let serializer = GraphSerializer::new(loader, rules, executor.clone())
                .with_latest(latest.clone())
                .with_options(config.serializer().clone());
            serializers.insert(version.to_string(), serializer);
        }

        let default_version = match &config.schema().default_version {
            Some(version) if serializers.contains_key(version) => version.clone(),
            Some(version) => {
                return Err(InventoryError::config(format!(
                    "default schema version '{}' is not loaded",
                    version
                )));
            }
            None => latest.version().to_string(),
        };
        info!(
            "Inventory engine ready: versions {:?}, default {}",
            catalog.versions(),
            default_version
        );

        Ok(Self {
            retry: RetryPolicy::from(config.retry()),
            catalog: Arc::new(catalog),
            store,
            config,
            hooks: Vec::new(),
            serializers,
            default_version,
        })
    }

    /// Build an engine from configured schema files, or the bundled
    /// schemas when none are configured
    pub async fn open(store: Arc<dyn GraphStore>, config: EngineConfig) -> Result<Self> {
        let catalog = if config.schema().schema_paths.is_empty() {
            SchemaCatalog::from_json_documents([V1_JSON, V2_JSON])?
        } else {
            SchemaCatalog::load_from_paths(&config.schema().schema_paths).await?
        };
        Self::new(catalog, store, config)
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn MutationHooks>) -> Self {
        self.hooks.push(hooks);
        self
    }

    pub fn catalog(&self) -> &Arc<SchemaCatalog> {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// Serializer for a schema version
    pub fn serializer(&self, version: &str) -> Result<&GraphSerializer> {
        self.serializers
            .get(version)
            .ok_or_else(|| InventoryError::not_found("schema version", version))
    }

    pub fn default_version(&self) -> &str {
        &self.default_version
    }

    /// Compile `path` without running it.
    ///
    /// Returns the schema version the path was routed to along with its plan.
    pub fn explain(&self, path: &str) -> Result<(String, TraversalPlan)> {
        let routed = self.route(path)?;
        let version = routed.serializer.registry().version().to_string();
        Ok((version, routed.builder.into_plan()))
    }

    /// Create or replace the resource at `path`.
    ///
    /// The token may be passed explicitly or as the body's
    /// `resource-version`; the explicit one wins.
    pub async fn put(
        &self,
        path: &str,
        body: &Value,
        resource_version: Option<&str>,
    ) -> Result<MutationOutcome> {
        let routed = self.route(path)?;
        if routed.builder.container_type().is_some() {
            return Err(InventoryError::invalid_input(format!("cannot PUT a container: {}", path)));
        }
        let node_type = result_type(&routed)?;
        let keys = final_keys(&routed)?;
        let supplied = resource_version.map(str::to_string).or_else(|| {
            body.get(vertex_props::RESOURCE_VERSION)
                .and_then(value_to_string)
        });

        self.retry
            .run(&format!("PUT {}", routed.path), |attempt| {
                let ctx = MutationContext {
                    kind: MutationKind::Put,
                    uri: routed.path.as_str(),
                    node_type,
                    body: Some(body),
                    attempt,
                };
                self.in_transaction(|tx| {
                    self.before(&ctx)?;
                    let outcome = self.put_once(tx, &routed, node_type, &keys, body, supplied.as_deref())?;
                    self.after(&ctx, &outcome)?;
                    Ok(outcome)
                })
            })
            .await
    }

    fn put_once(
        &self,
        tx: &mut dyn GraphTransaction,
        routed: &Routed<'_>,
        node_type: &str,
        keys: &KeyBindings,
        body: &Value,
        supplied: Option<&str>,
    ) -> Result<MutationOutcome> {
        let s = routed.serializer;
        let executor = s.executor();
        let mut obj = s.loader().from_value(node_type, body.clone())?;
        s.inject_keys_from_path(obj.as_mut(), keys)?;

        let found = executor.execute(&*tx, routed.builder.plan())?;
        let (vertex, uri, action) = match found.as_slice() {
            [] => {
                s.verify_resource_version(WriteAction::Create, routed.path.as_str(), None, supplied)?;
                let parent = if routed.builder.is_dependent() {
                    let parents = executor.execute_ancestor_plan(&*tx, routed.builder.plan())?;
                    Some(single(parents, routed.builder.parent_result_type().unwrap_or("parent"), &routed.path)?)
                } else {
                    None
                };
                let vertex = s.create_vertex(tx, obj.as_ref())?;
                let uri = match parent {
                    Some(parent) => {
                        s.rules().add_edge(tx, EdgeType::Tree, parent, vertex)?;
                        format!("{}{}", s.uri_for_vertex(&*tx, parent)?, s.segment(obj.node_type(), &obj.key_values()?))
                    }
                    None => s.top_level_uri(obj.as_ref())?,
                };
                (vertex, uri, MutationAction::Created)
            }
            [vertex] => {
                let stored = s.stored_version(&*tx, *vertex)?;
                s.verify_resource_version(WriteAction::Update, routed.path.as_str(), stored.as_deref(), supplied)?;
                s.touch_vertex(tx, *vertex)?;
                (*vertex, s.uri_for_vertex(&*tx, *vertex)?, MutationAction::Updated)
            }
            many => {
                return Err(InventoryError::MultipleResults {
                    node_type: node_type.to_string(),
                    path: routed.path.to_string(),
                    count: many.len(),
                });
            }
        };

        s.serialize(tx, vertex, obj.as_ref(), &uri)?;
        debug!("{} {} as vertex {}", action_verb(action), uri, vertex);
        Ok(MutationOutcome {
            action,
            uri: format!("{}{}", s.loader().uri_prefix().unwrap_or(""), uri),
            resource_version: s.stored_version(&*tx, vertex)?,
            removed: 0,
        })
    }

    /// Read the resource or container at `path`.
    ///
    /// `depth` falls back to the path's `depth` query parameter (`all` for
    /// unbounded), then to the configured default.
    pub async fn get(&self, path: &str, depth: Option<u32>) -> Result<Box<dyn Introspector>> {
        let routed = self.route(path)?;
        let depth = match depth {
            Some(depth) => depth,
            None => match routed.path.query().get("depth") {
                Some("all") => UNBOUNDED_DEPTH,
                Some(raw) => raw
                    .parse()
                    .map_err(|_| InventoryError::invalid_input(format!("invalid depth '{}'", raw)))?,
                None => self.config.serializer().default_depth,
            },
        };

        self.retry
            .run(&format!("GET {}", routed.path), |_| {
                self.in_transaction(|tx| self.get_once(tx, &routed, depth))
            })
            .await
    }

    fn get_once(
        &self,
        tx: &mut dyn GraphTransaction,
        routed: &Routed<'_>,
        depth: u32,
    ) -> Result<Box<dyn Introspector>> {
        let s = routed.serializer;
        let found = s.executor().execute(&*tx, routed.builder.plan())?;

        if let Some(container) = routed.builder.container_type() {
            let mut wrapper = s.loader().introspector(container)?;
            let item = wrapper
                .node_type()
                .container_item()
                .map(|i| i.name.clone())
                .ok_or_else(|| InventoryError::schema(format!("'{}' declares no item type", container)))?;
            let mut items = Vec::with_capacity(found.len());
            for vertex in found {
                items.push(s.hydrate(tx, vertex, depth)?);
            }
            if !items.is_empty() {
                wrapper.set_children(&item, &items)?;
            }
            return Ok(wrapper);
        }

        let vertex = single(found, result_type(routed)?, &routed.path)?;
        s.hydrate(tx, vertex, depth)
    }

    /// Delete the resource at `path` according to its delete semantic
    pub async fn delete(&self, path: &str, resource_version: Option<&str>) -> Result<MutationOutcome> {
        let routed = self.route(path)?;
        if routed.builder.container_type().is_some() {
            return Err(InventoryError::invalid_input(format!("cannot DELETE a container: {}", path)));
        }
        let node_type = result_type(&routed)?;
        final_keys(&routed)?;
        let supplied = resource_version
            .map(str::to_string)
            .or_else(|| routed.path.query().get(vertex_props::RESOURCE_VERSION).map(str::to_string));

        self.retry
            .run(&format!("DELETE {}", routed.path), |attempt| {
                let ctx = MutationContext {
                    kind: MutationKind::Delete,
                    uri: routed.path.as_str(),
                    node_type,
                    body: None,
                    attempt,
                };
                self.in_transaction(|tx| {
                    self.before(&ctx)?;
                    let s = routed.serializer;
                    let found = s.executor().execute(&*tx, routed.builder.plan())?;
                    let vertex = single(found, node_type, &routed.path)?;
                    let uri = s.link_for_vertex(&*tx, vertex)?;
                    let removed = s.delete(tx, vertex, supplied.as_deref(), &uri)?;
                    let outcome = MutationOutcome {
                        action: MutationAction::Deleted,
                        uri,
                        resource_version: None,
                        removed,
                    };
                    self.after(&ctx, &outcome)?;
                    Ok(outcome)
                })
            })
            .await
    }

    /// Add the relationship `descriptor` to the resource at `path`
    pub async fn put_relationship(
        &self,
        path: &str,
        descriptor: &RelationshipDescriptor,
    ) -> Result<MutationOutcome> {
        self.edit_relationship(MutationKind::PutRelationship, path, descriptor)
            .await
    }

    /// Remove the relationship `descriptor` from the resource at `path`
    pub async fn delete_relationship(
        &self,
        path: &str,
        descriptor: &RelationshipDescriptor,
    ) -> Result<MutationOutcome> {
        self.edit_relationship(MutationKind::DeleteRelationship, path, descriptor)
            .await
    }

    async fn edit_relationship(
        &self,
        kind: MutationKind,
        path: &str,
        descriptor: &RelationshipDescriptor,
    ) -> Result<MutationOutcome> {
        let routed = self.route(path.strip_suffix(RELATIONSHIP_SUFFIX).unwrap_or(path))?;
        if routed.builder.container_type().is_some() {
            return Err(InventoryError::invalid_input(format!(
                "containers have no relationships: {}",
                path
            )));
        }
        let node_type = result_type(&routed)?;
        final_keys(&routed)?;
        let body = serde_json::to_value(descriptor)?;

        self.retry
            .run(&format!("{} {}", kind, routed.path), |attempt| {
                let ctx = MutationContext {
                    kind,
                    uri: routed.path.as_str(),
                    node_type,
                    body: Some(&body),
                    attempt,
                };
                self.in_transaction(|tx| {
                    self.before(&ctx)?;
                    let s = routed.serializer;
                    let found = s.executor().execute(&*tx, routed.builder.plan())?;
                    let vertex = single(found, node_type, &routed.path)?;
                    if kind == MutationKind::PutRelationship {
                        s.create_edge(tx, vertex, descriptor)?;
                    } else {
                        s.delete_edge(tx, vertex, descriptor)?;
                    }
                    s.touch_vertex(tx, vertex)?;
                    let outcome = MutationOutcome {
                        action: MutationAction::Updated,
                        uri: s.link_for_vertex(&*tx, vertex)?,
                        resource_version: s.stored_version(&*tx, vertex)?,
                        removed: 0,
                    };
                    self.after(&ctx, &outcome)?;
                    Ok(outcome)
                })
            })
            .await
    }

    /// Pick the schema version a path addresses and compile the path
    fn route(&self, raw: &str) -> Result<Routed<'_>> {
        let prefix = self.config.schema().namespace_prefix.as_deref().unwrap_or("");
        let prefix = prefix.trim_end_matches('/');
        let path_only = raw.split('?').next().unwrap_or(raw);

        let versioned = path_only
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .and_then(|rest| rest.split('/').next())
            .and_then(|version| self.serializers.get(version).map(|s| (version, s)));

        let (serializer, path) = match versioned {
            Some((version, serializer)) => {
                let version_prefix = format!("{}/{}", prefix, version);
                (serializer, UriPath::parse(raw, Some(&version_prefix))?)
            }
            None => (self.serializer(&self.default_version)?, UriPath::parse(raw, None)?),
        };
        let builder = QueryBuilder::new(serializer.rules().clone())
            .with_uri_prefix(serializer.loader().uri_prefix().map(str::to_string))
            .from_path(&path)?;
        Ok(Routed {
            serializer,
            path,
            builder,
        })
    }

    /// Run `work` in a fresh transaction, committing only on success
    fn in_transaction<T>(&self, work: impl FnOnce(&mut dyn GraphTransaction) -> Result<T>) -> Result<T> {
        let mut tx = self.store.begin()?;
        match work(tx.as_mut()) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                debug!("Rolling back transaction {}: {}", tx.id(), e);
                tx.rollback();
                Err(e)
            }
        }
    }

    fn before(&self, ctx: &MutationContext<'_>) -> Result<()> {
        for hooks in &self.hooks {
            hooks.before_mutation(ctx)?;
        }
        Ok(())
    }

    fn after(&self, ctx: &MutationContext<'_>, outcome: &MutationOutcome) -> Result<()> {
        for hooks in &self.hooks {
            hooks.after_mutation(ctx, outcome)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for InventoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryEngine")
            .field("versions", &self.catalog.versions())
            .field("default_version", &self.default_version)
            .field("retry", &self.retry)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

fn result_type<'a>(routed: &'a Routed<'_>) -> Result<&'a str> {
    routed.builder.result_type().ok_or_else(|| {
        InventoryError::malformed_path(routed.path.as_str(), "path does not address a resource")
    })
}

/// Key bindings of the path's final resource step.
///
/// Mutations must name exactly one resource, so every key of the final
/// type has to be bound by the path or its query.
fn final_keys(routed: &Routed<'_>) -> Result<KeyBindings> {
    let steps = PathResolver::new(routed.serializer.registry().clone()).resolve(&routed.path)?;
    let step = match steps.last() {
        Some(step) if step.kind == PathStepKind::Resource => step,
        _ => {
            return Err(InventoryError::malformed_path(
                routed.path.as_str(),
                "path does not end on a resource",
            ))
        }
    };
    if let Some(missing) = step.node_type.keys.iter().find(|k| step.keys.get(k.as_str()).is_none()) {
        return Err(InventoryError::malformed_path(
            routed.path.as_str(),
            format!("key '{}' of '{}' is not bound", missing, step.node_type.name),
        ));
    }
    Ok(step.keys.clone())
}

fn single(found: Vec<VertexId>, node_type: &str, path: &UriPath) -> Result<VertexId> {
    match found.as_slice() {
        [vertex] => Ok(*vertex),
        [] => Err(InventoryError::not_found(node_type, path.as_str())),
        many => Err(InventoryError::MultipleResults {
            node_type: node_type.to_string(),
            path: path.to_string(),
            count: many.len(),
        }),
    }
}

fn action_verb(action: MutationAction) -> &'static str {
    match action {
        MutationAction::Created => "Created",
        MutationAction::Updated => "Updated",
        MutationAction::Deleted => "Deleted",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryGraph;
    use inventory_core::error::ErrorCategory;
    use serde_json::json;

    fn engine() -> InventoryEngine {
        let mut config = EngineConfig::default();
        config.retry_mut().initial_backoff_ms = 1;
        config.retry_mut().max_backoff_ms = 2;
        InventoryEngine::new(
            inventory_core::schema::fixtures::catalog(),
            Arc::new(InMemoryGraph::new()),
            config,
        )
        .unwrap()
    }

    #[test]
    fn test_explain_routes_by_version() {
        let engine = engine();
        let (version, plan) = engine.explain("/v1/cloud-infrastructure/pservers/pserver/h1").unwrap();
        assert_eq!(version, "v1");
        assert!(!plan.steps.is_empty());

        let (version, _) = engine.explain("/cloud-infrastructure/pservers").unwrap();
        assert_eq!(version, "v2");
        assert!(engine.explain("/cloud-infrastructure/nothing-here").is_err());
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let engine = engine();
        assert_eq!(engine.default_version(), "v2");
        let outcome = engine
            .put("/cloud-infrastructure/pservers/pserver/h1", &json!({"number-of-cpus": 2}), None)
            .await
            .unwrap();
        assert_eq!(outcome.action, MutationAction::Created);
        assert_eq!(outcome.uri, "/v2/cloud-infrastructure/pservers/pserver/h1");

        let obj = engine.get("/v1/cloud-infrastructure/pservers/pserver/h1", None).await.unwrap();
        assert_eq!(obj.loader().version(), "v1");
        assert_eq!(obj.get("hostname"), Some(json!("h1")));
        assert_eq!(obj.get("resource-version").and_then(|v| value_to_string(&v)), outcome.resource_version);
    }

    #[tokio::test]
    async fn test_put_container_rejected() {
        let engine = engine();
        let err = engine
            .put("/cloud-infrastructure/pservers", &json!({}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_get_depth_from_query() {
        let engine = engine();
        engine
            .put(
                "/cloud-infrastructure/pservers/pserver/h1",
                &json!({"p-interfaces": {"p-interface": [{"interface-name": "eth0"}]}}),
                None,
            )
            .await
            .unwrap();
        let shallow = engine
            .get("/cloud-infrastructure/pservers/pserver/h1?depth=0", None)
            .await
            .unwrap();
        assert!(shallow.get("p-interfaces").is_none());
        let deep = engine
            .get("/cloud-infrastructure/pservers/pserver/h1?depth=all", None)
            .await
            .unwrap();
        assert!(deep.get("p-interfaces").is_some());
        assert!(matches!(
            engine.get("/cloud-infrastructure/pservers/pserver/h1?depth=deep", None).await,
            Err(InventoryError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_mutations_need_every_key_bound() {
        let engine = engine();
        let h1 = "/cloud-infrastructure/pservers/pserver/h1";
        let created = engine.put(h1, &json!({"number-of-cpus": 2}), None).await.unwrap();

        let unkeyed = "/cloud-infrastructure/pservers/pserver?depth=1";
        let err = engine.put(unkeyed, &json!({"number-of-cpus": 8}), None).await.unwrap_err();
        assert!(matches!(err, InventoryError::MalformedPath { .. }));
        assert_eq!(err.category(), ErrorCategory::Path);

        let err = engine.delete(unkeyed, created.resource_version.as_deref()).await.unwrap_err();
        assert!(matches!(err, InventoryError::MalformedPath { .. }));

        let descriptor: RelationshipDescriptor = serde_json::from_value(json!({
            "related-to": "complex",
            "relationship-data": [
                {"relationship-key": "complex.physical-location-id", "relationship-value": "c1"}
            ]
        }))
        .unwrap();
        let err = engine.put_relationship(unkeyed, &descriptor).await.unwrap_err();
        assert!(matches!(err, InventoryError::MalformedPath { .. }));

        let obj = engine.get(h1, Some(0)).await.unwrap();
        assert_eq!(obj.get("number-of-cpus"), Some(json!(2)));
        assert_eq!(obj.get("resource-version").and_then(|v| value_to_string(&v)), created.resource_version);

        // a query that binds the key still names one resource
        let outcome = engine
            .put(
                "/cloud-infrastructure/pservers/pserver?hostname=h1",
                &json!({"number-of-cpus": 4}),
                created.resource_version.as_deref(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.action, MutationAction::Updated);
    }
}
