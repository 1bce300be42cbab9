//! Request scripts: an ordered list of inventory calls read from YAML or JSON.
//!
//! ```yaml
//! requests:
//!   - method: put
//!     path: /cloud-infrastructure/complexes/complex/c1
//!     body: {physical-location-type: dc, street1: 1 Main, city: Springfield}
//!   - method: get
//!     path: /cloud-infrastructure/complexes/complex/c1
//!     depth: 0
//!   - method: delete
//!     path: /cloud-infrastructure/complexes/complex/c9
//!     expect-error: true
//! ```

use anyhow::{Context, Result};
use inventory_core::introspection::{Introspector, MarshalFormat};
use inventory_core::types::Value;
use inventory_query::RelationshipDescriptor;
use inventory_storage::{InventoryEngine, MutationOutcome};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestScript {
    #[serde(default)]
    pub requests: Vec<ScriptRequest>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    Put,
    Get,
    Delete,
    PutRelationship,
    DeleteRelationship,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Put => "PUT",
            Self::Get => "GET",
            Self::Delete => "DELETE",
            Self::PutRelationship => "PUT relationship",
            Self::DeleteRelationship => "DELETE relationship",
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScriptRequest {
    pub method: Method,
    pub path: String,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub resource_version: Option<String>,
    #[serde(default)]
    pub depth: Option<u32>,
    /// The request is expected to be refused
    #[serde(default)]
    pub expect_error: bool,
}

/// What happened to one request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RequestReport {
    pub index: usize,
    pub method: Method,
    pub path: String,
    /// Whether the result matched `expect-error`
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<MutationOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RequestScript {
    /// Parse a script. JSON input is accepted as YAML.
    pub fn parse(input: &str) -> Result<Self> {
        serde_yaml::from_str(input).context("Failed to parse request script")
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content)
    }
}

enum Reply {
    Mutation(MutationOutcome),
    Object(Value),
}

/// Run every request in order. A failed request does not stop the ones after it.
pub async fn run_script(engine: &InventoryEngine, script: &RequestScript) -> Vec<RequestReport> {
    let mut reports = Vec::with_capacity(script.requests.len());
    for (index, request) in script.requests.iter().enumerate() {
        debug!("Request {}: {} {}", index, request.method, request.path);
        let result = execute(engine, request).await;
        let mut report = RequestReport {
            index,
            method: request.method,
            path: request.path.clone(),
            passed: result.is_err() == request.expect_error,
            outcome: None,
            object: None,
            error: None,
        };
        match result {
            Ok(Reply::Mutation(outcome)) => report.outcome = Some(outcome),
            Ok(Reply::Object(object)) => report.object = Some(object),
            Err(e) => report.error = Some(format!("{:#}", e)),
        }
        reports.push(report);
    }
    reports
}

async fn execute(engine: &InventoryEngine, request: &ScriptRequest) -> Result<Reply> {
    let path = request.path.as_str();
    let version = request.resource_version.as_deref();
    let reply = match request.method {
        Method::Put => {
            let body = request.body.clone().unwrap_or_else(|| Value::Object(Default::default()));
            Reply::Mutation(engine.put(path, &body, version).await?)
        }
        Method::Get => {
            let obj = engine.get(path, request.depth).await?;
            let encoded = obj.marshal(MarshalFormat::Json)?;
            Reply::Object(serde_json::from_str(&encoded)?)
        }
        Method::Delete => Reply::Mutation(engine.delete(path, version).await?),
        Method::PutRelationship => {
            Reply::Mutation(engine.put_relationship(path, &descriptor(request)?).await?)
        }
        Method::DeleteRelationship => {
            Reply::Mutation(engine.delete_relationship(path, &descriptor(request)?).await?)
        }
    };
    Ok(reply)
}

fn descriptor(request: &ScriptRequest) -> Result<RelationshipDescriptor> {
    let body = request
        .body
        .clone()
        .with_context(|| format!("{} {} needs a relationship body", request.method, request.path))?;
    serde_json::from_value(body).context("Invalid relationship body")
}

#[cfg(test)]
mod tests {
    use super::*;
    use inventory_core::config::EngineConfig;
    use inventory_core::schema::fixtures;
    use inventory_storage::{InMemoryGraph, MutationAction};
    use std::sync::Arc;

    const SCRIPT: &str = r#"
requests:
  - method: put
    path: /cloud-infrastructure/complexes/complex/c1
    body: {physical-location-type: dc, street1: 1 Main, city: Springfield}
  - method: put
    path: /cloud-infrastructure/pservers/pserver/h1
    body:
      number-of-cpus: 4
  - method: put-relationship
    path: /cloud-infrastructure/pservers/pserver/h1/relationship-list/relationship
    body:
      related-to: complex
      relationship-data:
        - {relationship-key: complex.physical-location-id, relationship-value: c1}
  - method: get
    path: /cloud-infrastructure/pservers/pserver/h1
    depth: 0
  - method: delete
    path: /cloud-infrastructure/complexes/complex/c1
    expect-error: true
"#;

    fn engine() -> InventoryEngine {
        let mut config = EngineConfig::default();
        config.serializer_mut().version_check = false;
        InventoryEngine::new(fixtures::catalog(), Arc::new(InMemoryGraph::new()), config).unwrap()
    }

    #[test]
    fn test_parse_script() {
        let script = RequestScript::parse(SCRIPT).unwrap();
        assert_eq!(script.requests.len(), 5);
        assert_eq!(script.requests[2].method, Method::PutRelationship);
        assert_eq!(script.requests[3].depth, Some(0));
        assert!(script.requests[4].expect_error);

        let json = r#"{"requests": [{"method": "get", "path": "/network"}]}"#;
        assert_eq!(RequestScript::parse(json).unwrap().requests[0].method, Method::Get);
        assert!(RequestScript::parse("requests: [{method: patch, path: /x}]").is_err());
    }

    #[tokio::test]
    async fn test_run_script() {
        let engine = engine();
        let script = RequestScript::parse(SCRIPT).unwrap();
        let reports = run_script(&engine, &script).await;

        assert!(reports.iter().all(|r| r.passed), "{:?}", reports);
        assert_eq!(reports[0].outcome.as_ref().unwrap().action, MutationAction::Created);
        assert_eq!(reports[2].outcome.as_ref().unwrap().action, MutationAction::Updated);

        let object = reports[3].object.as_ref().unwrap();
        assert_eq!(object["hostname"], "h1");
        assert_eq!(object["relationship-list"]["relationship"][0]["related-to"], "complex");
        assert!(reports[4].error.as_ref().unwrap().contains("complex"));
    }

    #[tokio::test]
    async fn test_relationship_without_body_fails() {
        let engine = engine();
        let script = RequestScript::parse(
            "requests:\n  - method: delete-relationship\n    path: /cloud-infrastructure/pservers/pserver/h1/relationship-list/relationship\n",
        )
        .unwrap();
        let reports = run_script(&engine, &script).await;
        assert!(!reports[0].passed);
        assert!(reports[0].error.as_ref().unwrap().contains("needs a relationship body"));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script.yaml");
        tokio::fs::write(&path, SCRIPT).await.unwrap();
        assert_eq!(RequestScript::load(&path).await.unwrap().requests.len(), 5);
        assert!(RequestScript::load(&dir.path().join("missing.yaml")).await.is_err());
    }
}
