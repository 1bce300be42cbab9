//! Command implementations

use crate::output::{self, OutputFormat};
use crate::script::{self, RequestScript};
use anyhow::{bail, Result};
use inventory_core::config::{ConfigProfile, EngineConfig};
use inventory_core::schema::{NodeType, PropertyKind, SchemaRegistry};
use inventory_storage::{InMemoryGraph, InventoryEngine};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Load the engine configuration.
///
/// Without a file the profile named by the environment is used, with
/// environment overrides applied on top.
pub async fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    if let Some(path) = path {
        return Ok(EngineConfig::load_from_path(path).await?);
    }
    let mut config = EngineConfig::with_profile(ConfigProfile::from_env());
    config.merge_env_vars()?;
    config.validate()?;
    Ok(config)
}

/// Open an engine over a fresh in-memory graph
pub async fn open_engine(config: EngineConfig) -> Result<InventoryEngine> {
    let engine = InventoryEngine::open(Arc::new(InMemoryGraph::new()), config).await?;
    info!(
        "Engine ready with schema versions {:?}, default {}",
        engine.catalog().versions(),
        engine.default_version()
    );
    Ok(engine)
}

fn registry<'a>(engine: &'a InventoryEngine, version: Option<&str>) -> Result<&'a Arc<SchemaRegistry>> {
    let version = version.unwrap_or(engine.default_version());
    Ok(engine.serializer(version)?.registry())
}

pub fn schema_versions(engine: &InventoryEngine, format: OutputFormat) -> Result<()> {
    let versions = engine.catalog().versions();
    match format {
        OutputFormat::Human => {
            for version in versions {
                if version == engine.default_version() {
                    output::success(format!("{} (default)", version));
                } else {
                    println!("  {}", version);
                }
            }
            Ok(())
        }
        _ => output::structured(
            format,
            &json!({"versions": versions, "default": engine.default_version()}),
        ),
    }
}

pub fn schema_types(engine: &InventoryEngine, version: Option<&str>, format: OutputFormat) -> Result<()> {
    let registry = registry(engine, version)?;
    let rules = engine.serializer(registry.version())?.rules();
    let mut types: Vec<&Arc<NodeType>> = registry.node_types().collect();
    types.sort_by(|a, b| a.name.cmp(&b.name));

    if format != OutputFormat::Human {
        let rows: Vec<_> = types
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "namespace": t.namespace,
                    "container": t.container,
                    "abstract": t.is_abstract,
                    "keys": t.keys,
                    "parents": registry.parents_of(&t.name),
                })
            })
            .collect();
        return output::structured(format, &rows);
    }

    let mut table = output::table(vec!["Type", "Namespace", "Keys", "Parents", "Delete semantic"]);
    for t in types {
        let semantic = if t.container || t.is_abstract || registry.is_namespace(&t.name) {
            "-".to_string()
        } else {
            rules
                .delete_semantic_for(&t.name)
                .map(|s| s.to_string())
                .unwrap_or_else(|_| "-".to_string())
        };
        let mut name = t.name.clone();
        if t.is_abstract {
            name.push_str(" (abstract)");
        } else if t.container {
            name.push_str(" (container)");
        }
        table.add_row(vec![
            name,
            t.namespace.clone().unwrap_or_default(),
            t.keys.join(", "),
            registry.parents_of(&t.name).join(", "),
            semantic,
        ]);
    }
    output::header(format!("Schema {}", registry.version()));
    println!("{table}");
    Ok(())
}

fn kind_name(kind: PropertyKind) -> &'static str {
    match kind {
        PropertyKind::Scalar => "scalar",
        PropertyKind::ScalarList => "scalar list",
        PropertyKind::Complex => "complex",
        PropertyKind::ComplexList => "complex list",
    }
}

pub fn schema_show(
    engine: &InventoryEngine,
    version: Option<&str>,
    node_type: &str,
    format: OutputFormat,
) -> Result<()> {
    let registry = registry(engine, version)?;
    let t = registry.node_type(node_type)?;

    if format != OutputFormat::Human {
        let properties: Vec<_> = t
            .properties
            .iter()
            .map(|p| {
                json!({
                    "name": p.name,
                    "kind": p.kind,
                    "type": p.target,
                    "key": t.is_key(&p.name),
                    "required": t.is_required(&p.name),
                    "default": p.default,
                    "storage-name": p.storage_name(),
                })
            })
            .collect();
        return output::structured(
            format,
            &json!({
                "name": t.name,
                "version": registry.version(),
                "keys": t.keys,
                "alternate-keys": t.alternate_keys,
                "name-props": t.name_props,
                "properties": properties,
            }),
        );
    }

    output::header(format!("{} ({})", t.name, registry.version()));
    if let Some(description) = &t.description {
        output::kv("description", description);
    }
    output::kv("keys", t.keys.join(", "));
    if let Some(chain) = registry.canonical_chain(&t.name) {
        output::kv("canonical path", chain.join(" / "));
    }
    let mut table = output::table(vec!["Property", "Kind", "Type", "Key", "Required", "Default"]);
    for p in &t.properties {
        table.add_row(vec![
            p.name.clone(),
            kind_name(p.kind).to_string(),
            p.target.clone(),
            if t.is_key(&p.name) { "yes" } else { "" }.to_string(),
            if t.is_required(&p.name) { "yes" } else { "" }.to_string(),
            p.default.as_ref().map(|d| d.to_string()).unwrap_or_default(),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub fn edge_rule(
    engine: &InventoryEngine,
    version: Option<&str>,
    a: &str,
    b: &str,
    format: OutputFormat,
) -> Result<()> {
    let registry = registry(engine, version)?;
    let rule = engine.serializer(registry.version())?.rules().rule_for(a, b)?;
    match format {
        OutputFormat::Human => {
            output::header(format!("{} -> {}", rule.from, rule.to));
            output::kv("label", &rule.label);
            output::kv("kind", rule.edge_type());
            output::kv("direction", format!("{:?}", rule.direction));
            output::kv("multiplicity", format!("{:?}", rule.multiplicity));
            output::kv("contains-other-v", rule.contains_other_v.as_str());
            output::kv("delete-other-v", rule.delete_other_v.as_str());
            output::kv("prevent-delete", rule.prevent_delete.as_str());
            if rule.private {
                output::kv("private", true);
            }
            Ok(())
        }
        _ => output::structured(format, &rule),
    }
}

pub fn explain(engine: &InventoryEngine, path: &str, format: OutputFormat) -> Result<()> {
    let (version, plan) = engine.explain(path)?;
    match format {
        OutputFormat::Human => {
            output::kv("version", &version);
            output::kv("result", plan.result_type.as_deref().unwrap_or("-"));
            if let Some(parent) = &plan.parent_result_type {
                output::kv("parent", parent);
            }
            if let Some(container) = &plan.container_type {
                output::kv("container", container);
            }
            println!("{}", plan);
            Ok(())
        }
        _ => output::structured(format, &json!({"version": version, "plan": plan})),
    }
}

/// Replay a request script and report every result.
///
/// Fails when any request did not behave as the script expected.
pub async fn run(engine: &InventoryEngine, path: &Path, format: OutputFormat) -> Result<()> {
    let script = RequestScript::load(path).await?;
    let reports = script::run_script(engine, &script).await;
    let failed = reports.iter().filter(|r| !r.passed).count();

    match format {
        OutputFormat::Human => {
            for report in &reports {
                let line = format!("{} {}", report.method, report.path);
                match (&report.error, report.passed) {
                    (Some(e), true) => output::success(format!("{} refused: {}", line, e)),
                    (Some(e), false) => output::error(format!("{}: {}", line, e)),
                    (None, true) => output::success(line),
                    (None, false) => output::error(format!("{}: expected an error", line)),
                }
                if let Some(object) = &report.object {
                    println!("{}", serde_json::to_string_pretty(object)?);
                }
            }
        }
        _ => output::structured(format, &reports)?,
    }

    if failed > 0 {
        bail!("{} of {} requests failed", failed, reports.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.toml");
        tokio::fs::write(&path, "[serializer]\ndefault_depth = 3\n").await.unwrap();
        let config = load_config(Some(&path)).await.unwrap();
        assert_eq!(config.serializer().default_depth, 3);

        tokio::fs::write(&path, "[retry]\nmax_attempts = 0\n").await.unwrap();
        assert!(load_config(Some(&path)).await.is_err());
    }

    #[tokio::test]
    async fn test_run_reports_failures() {
        let engine = open_engine(EngineConfig::default()).await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script.yaml");
        tokio::fs::write(
            &path,
            "requests:\n  - method: get\n    path: /cloud-infrastructure/pservers/pserver/h1\n",
        )
        .await
        .unwrap();
        let err = run(&engine, &path, OutputFormat::Json).await.unwrap_err();
        assert!(err.to_string().contains("1 of 1"));
    }

    #[tokio::test]
    async fn test_inspection_commands() {
        let engine = open_engine(EngineConfig::default()).await.unwrap();
        schema_types(&engine, Some("v1"), OutputFormat::Json).unwrap();
        schema_show(&engine, None, "pserver", OutputFormat::Yaml).unwrap();
        edge_rule(&engine, None, "pserver", "complex", OutputFormat::Human).unwrap();
        explain(&engine, "/cloud-infrastructure/pservers/pserver/h1", OutputFormat::Human).unwrap();
        assert!(schema_show(&engine, Some("v9"), "pserver", OutputFormat::Json).is_err());
    }
}
