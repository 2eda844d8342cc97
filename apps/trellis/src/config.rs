//! # Configuration
//!
//! A TOML file declares the server settings, the resource tables and an
//! optional JSON seed file:
//!
//! ```toml
//! seed = "seed.json"
//!
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//! base_url = "/"
//!
//! [[resources]]
//! type = "User"
//! attributes = ["username"]
//!
//! [[resources.relationships]]
//! name = "Posts"
//! target = "Post"
//! kind = "has_many"
//! inverse = "User"
//! ```
//!
//! The seed file holds `{ "data": [ resource objects ] }`, inserted in order.
//! A relative seed path is resolved against the config file's directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use trellis_core::{
    JsonApi, MemoryStore, Registry, ResourceInput, TableSchema, TrellisError,
    primitives::DEFAULT_BASE_URL,
};

use crate::api::DEFAULT_BODY_LIMIT;

/// Maximum config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Maximum seed file size (100 MB).
const MAX_SEED_FILE_SIZE: u64 = 100 * 1024 * 1024;

// =============================================================================
// CONFIG TYPES
// =============================================================================

/// `[server]` settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
    /// Base URL of canonical links.
    pub base_url: String,
    /// Maximum request body size, in bytes.
    pub body_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            base_url: DEFAULT_BASE_URL.to_string(),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

impl ServerConfig {
    /// The `host:port` bind address.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// The whole configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server settings.
    pub server: ServerConfig,
    /// Table schemas, one per resource type.
    pub resources: Vec<TableSchema>,
    /// Optional JSON seed file.
    pub seed: Option<PathBuf>,
}

/// Seed file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub data: Vec<ResourceInput>,
}

// =============================================================================
// LOADING
// =============================================================================

fn read_limited(path: &Path, max_size: u64) -> Result<String, TrellisError> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        TrellisError::Io(format!("Cannot read '{}': {}", path.display(), e))
    })?;

    if metadata.len() > max_size {
        return Err(TrellisError::Config(format!(
            "File '{}' is {} bytes, maximum allowed is {} bytes",
            path.display(),
            metadata.len(),
            max_size
        )));
    }

    std::fs::read_to_string(path)
        .map_err(|e| TrellisError::Io(format!("Cannot read '{}': {}", path.display(), e)))
}

impl Config {
    /// Parse a configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self, TrellisError> {
        toml::from_str(contents)
            .map_err(|e| TrellisError::Config(format!("Invalid configuration: {}", e)))
    }

    /// Load a configuration file, resolving the seed path against its directory.
    pub fn load(path: &Path) -> Result<Self, TrellisError> {
        let contents = read_limited(path, MAX_CONFIG_FILE_SIZE)?;
        let mut config = Self::parse(&contents)?;

        if let Some(seed) = &config.seed
            && seed.is_relative()
        {
            let base = path.parent().unwrap_or(Path::new("."));
            config.seed = Some(base.join(seed));
        }

        tracing::debug!(
            path = %path.display(),
            resources = config.resources.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Read the seed file, if one is configured.
    pub fn load_seed(&self) -> Result<Seed, TrellisError> {
        let Some(path) = &self.seed else {
            return Ok(Seed::default());
        };
        let contents = read_limited(path, MAX_SEED_FILE_SIZE)?;
        serde_json::from_str(&contents).map_err(|e| {
            TrellisError::Config(format!("Invalid seed file '{}': {}", path.display(), e))
        })
    }

    /// Build the store: validate the schemas and insert the seed.
    pub fn build_store(&self) -> Result<Arc<MemoryStore>, TrellisError> {
        if self.resources.is_empty() {
            return Err(TrellisError::Config(
                "No resources declared: add at least one [[resources]] table".to_string(),
            ));
        }
        let store = Arc::new(MemoryStore::new(self.resources.clone())?);
        seed_store(&store, &self.load_seed()?)?;
        Ok(store)
    }
}

/// Insert every seed resource, in file order.
pub fn seed_store(store: &MemoryStore, seed: &Seed) -> Result<(), TrellisError> {
    for input in &seed.data {
        store.insert(input).map_err(|e| {
            TrellisError::Config(format!(
                "Cannot seed {}#{}: {}",
                input.resource_type,
                input.id.as_deref().unwrap_or("?"),
                e
            ))
        })?;
    }
    tracing::debug!(resources = seed.data.len(), "Seeded store");
    Ok(())
}

/// An engine serving every table of `store`.
pub fn build_api(store: &Arc<MemoryStore>, base_url: &str) -> Result<JsonApi, TrellisError> {
    let mut registry = Registry::new();
    store.register(&mut registry)?;
    Ok(JsonApi::new(registry, base_url))
}

// =============================================================================
// TESTS
// =============================================================================
