//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::api::{self, AppState};
use crate::config::{Config, ServerConfig, build_api};
use crate::demo;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use trellis_core::{
    Capability, JsonApi, MemoryStore, QueryOptions, Resources, TrellisError, links::resource_path,
};

// =============================================================================
// DATA SOURCE
// =============================================================================

/// Where the served tables come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A TOML configuration file.
    Config(PathBuf),
    /// The built-in demo data set.
    Demo,
}

/// A loaded data source, ready to serve.
#[derive(Debug)]
pub struct Loaded {
    pub server: ServerConfig,
    pub store: Arc<MemoryStore>,
    pub api: JsonApi,
}

impl Source {
    /// Pick the source from the `--config` and `--demo` flags; exactly one is required.
    pub fn from_flags(config: Option<PathBuf>, demo: bool) -> Result<Self, TrellisError> {
        match (config, demo) {
            (Some(_), true) => Err(TrellisError::Config(
                "--config and --demo cannot be combined".to_string(),
            )),
            (Some(path), false) => Ok(Self::Config(path)),
            (None, true) => Ok(Self::Demo),
            (None, false) => Err(TrellisError::Config(
                "No data source: pass --config <file> or --demo".to_string(),
            )),
        }
    }

    /// Build the store and the engine.
    pub fn load(&self) -> Result<Loaded, TrellisError> {
        let (server, store) = match self {
            Self::Config(path) => {
                let config = Config::load(path)?;
                let store = config.build_store()?;
                (config.server, store)
            }
            Self::Demo => (ServerConfig::default(), demo::store()?),
        };
        let api = build_api(&store, &server.base_url)?;
        Ok(Loaded { server, store, api })
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), TrellisError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| TrellisError::Io(format!("Cannot serialize output: {}", e)))?;
    println!("{}", text);
    Ok(())
}

/// Resolve a resource type given by name or by collection path.
fn resolve_type(api: &JsonApi, name: &str) -> Result<String, TrellisError> {
    if api.registry().lookup(name).is_some() {
        return Ok(name.to_string());
    }
    api.registry()
        .lookup_path(name)
        .map(str::to_string)
        .ok_or_else(|| TrellisError::UnknownResourceType(name.to_string()))
}

fn include_pairs(include: Option<&str>) -> Vec<(String, String)> {
    include
        .map(|value| vec![("include".to_string(), value.to_string())])
        .unwrap_or_default()
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(
    source: &Source,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), TrellisError> {
    let Loaded {
        mut server, api, ..
    } = source.load()?;
    if let Some(host) = host {
        server.host = host;
    }
    if let Some(port) = port {
        server.port = port;
    }

    println!("Trellis JSON:API Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:      {}", server.host);
    println!("  Port:      {}", server.port);
    println!("  Base URL:  {}", server.base_url);
    println!("  Resources: {}", api.registry().len());
    println!();

    let state = AppState::new(api).with_body_limit(server.body_limit);
    api::run_server(&server.addr(), state).await
}

// =============================================================================
// RESOURCES COMMAND
// =============================================================================

#[derive(Debug, Serialize)]
struct ResourceSummary {
    #[serde(rename = "type")]
    resource_type: String,
    path: String,
    capabilities: Vec<&'static str>,
}

/// List every served resource type.
pub fn cmd_resources(source: &Source, json_mode: bool) -> Result<(), TrellisError> {
    let Loaded { api, .. } = source.load()?;

    let mut summaries = Vec::new();
    for resource_type in api.registry().resource_types() {
        let backend = api.backend(resource_type)?;
        summaries.push(ResourceSummary {
            resource_type: resource_type.to_string(),
            path: format!("/{}", resource_path(resource_type)),
            capabilities: backend.capabilities().iter().map(Capability::name).collect(),
        });
    }

    if json_mode {
        return print_json(&summaries);
    }

    println!("Resources:");
    for summary in &summaries {
        println!("  {:<16} {:<20} {}", summary.resource_type, summary.path, summary.capabilities.join(", "));
    }
    Ok(())
}

// =============================================================================
// CHECK COMMAND
// =============================================================================

#[derive(Debug, Serialize)]
struct TableCount {
    #[serde(rename = "type")]
    resource_type: String,
    rows: usize,
}

/// Validate the source and report row counts.
pub fn cmd_check(source: &Source, json_mode: bool) -> Result<(), TrellisError> {
    let Loaded { store, .. } = source.load()?;

    let counts = store
        .schemas()
        .map(|schema| {
            Ok(TableCount {
                resource_type: schema.resource_type.clone(),
                rows: store.count(&schema.resource_type)?,
            })
        })
        .collect::<Result<Vec<_>, TrellisError>>()?;

    if json_mode {
        return print_json(&counts);
    }

    println!("Configuration OK");
    for count in &counts {
        println!("  {:<16} {} rows", count.resource_type, count.rows);
    }
    Ok(())
}

// =============================================================================
// GET / LIST COMMANDS
// =============================================================================

/// Print one resource document.
pub async fn cmd_get(
    source: &Source,
    resource_type: &str,
    id: &str,
    include: Option<&str>,
) -> Result<(), TrellisError> {
    let Loaded { api, .. } = source.load()?;
    let resource_type = resolve_type(&api, resource_type)?;
    let options = QueryOptions::parse(include_pairs(include))?;
    let ctx = api.context();

    let backend = api.backend(&resource_type)?;
    let resource = backend.get_one(&ctx, id, &options).await?;
    let document = api
        .normalize_resource(&ctx, Resources::One(resource), &resource_type)
        .await?;
    print_json(&document)
}

/// Print a collection document.
pub async fn cmd_list(
    source: &Source,
    resource_type: &str,
    include: Option<&str>,
    filters: &[String],
) -> Result<(), TrellisError> {
    let Loaded { api, .. } = source.load()?;
    let resource_type = resolve_type(&api, resource_type)?;

    let mut pairs = include_pairs(include);
    for filter in filters {
        let (key, value) = filter.split_once('=').ok_or_else(|| {
            TrellisError::bad_request(
                "Invalid filter",
                Some(format!("Expected attribute=value, got \"{}\"", filter)),
            )
        })?;
        pairs.push((format!("filter.{}", key), value.to_string()));
    }
    let options = QueryOptions::parse(pairs)?;
    let ctx = api.context();

    let backend = api.backend(&resource_type)?;
    let resources = backend.index(&ctx, &options).await?;
    let document = api
        .normalize_resource(&ctx, Resources::Many(resources), &resource_type)
        .await?;
    print_json(&document)
}

// =============================================================================
// TESTS
// =============================================================================
