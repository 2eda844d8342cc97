//! # Shared Fixtures
//!
//! A graph of plain nodes served by a test backend. Nodes can declare to-one
//! and to-many edges to other nodes, optional latency on their pending
//! attribute and relationship futures, and linkage-only edges.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use trellis_core::{
    Attributes, Backend, Capabilities, Capability, Context, JsonApi, Linkage, Locator,
    QueryOptions, Registry, Related, RelationshipEntry, RelationshipLinker, Relationships,
    Resources, TrellisError,
};

// =============================================================================
// WORLD
// =============================================================================

#[derive(Debug, Clone)]
pub struct Edge {
    pub name: String,
    pub target: String,
    pub ids: Vec<String>,
    pub to_many: bool,
    pub expand: bool,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub resource_type: String,
    pub id: String,
    pub attributes: Vec<(String, Value)>,
    pub edges: Vec<Edge>,
    pub delay_ms: u64,
}

impl Node {
    pub fn new(resource_type: &str, id: &str) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            id: id.to_string(),
            attributes: Vec::new(),
            edges: Vec::new(),
            delay_ms: 0,
        }
    }

    pub fn attr(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attributes.push((name.to_string(), value.into()));
        self
    }

    pub fn to_one(mut self, name: &str, target: &str, id: Option<&str>) -> Self {
        self.edges.push(Edge {
            name: name.to_string(),
            target: target.to_string(),
            ids: id.map(str::to_string).into_iter().collect(),
            to_many: false,
            expand: true,
        });
        self
    }

    pub fn to_many(mut self, name: &str, target: &str, ids: &[&str]) -> Self {
        self.edges.push(Edge {
            name: name.to_string(),
            target: target.to_string(),
            ids: ids.iter().map(|id| id.to_string()).collect(),
            to_many: true,
            expand: true,
        });
        self
    }

    /// Emit the last declared edge as bare linkage.
    pub fn linkage_only(mut self) -> Self {
        if let Some(edge) = self.edges.last_mut() {
            edge.expand = false;
        }
        self
    }

    /// Delay the node's pending attribute and relationship futures.
    pub fn delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }
}

#[derive(Debug, Default)]
pub struct World {
    nodes: BTreeMap<(String, String), Node>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, node: Node) -> Self {
        self.nodes
            .insert((node.resource_type.clone(), node.id.clone()), node);
        self
    }

    pub fn get(&self, resource_type: &str, id: &str) -> Option<Node> {
        self.nodes
            .get(&(resource_type.to_string(), id.to_string()))
            .cloned()
    }

    pub fn one(&self, resource_type: &str, id: &str) -> Resources {
        Resources::optional(self.get(resource_type, id))
    }

    pub fn many(&self, resource_type: &str, ids: &[&str]) -> Resources {
        Resources::many(ids.iter().filter_map(|id| self.get(resource_type, id)))
    }
}

// =============================================================================
// BACKEND
// =============================================================================

pub struct GraphBackend {
    resource_type: String,
    world: Arc<World>,
    get_many_calls: Arc<AtomicUsize>,
}

impl GraphBackend {
    pub fn new(resource_type: &str, world: Arc<World>, calls: Arc<AtomicUsize>) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            world,
            get_many_calls: calls,
        }
    }
}

#[async_trait]
impl Backend for GraphBackend {
    type Resource = Node;

    fn resource_type(&self) -> &str {
        &self.resource_type
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::new()
            .with(Capability::GetOne)
            .with(Capability::GetMany)
    }

    fn id(&self, _ctx: &Context, node: &Node) -> String {
        node.id.clone()
    }

    fn attributes(&self, _ctx: &Context, node: &Node) -> Attributes {
        let mut attributes = Attributes::new();
        for (name, value) in &node.attributes {
            attributes.insert(name.clone(), value.clone());
        }
        if node.delay_ms > 0 {
            let delay = node.delay_ms;
            attributes.insert_with("latency", async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok(json!(delay))
            });
        }
        attributes
    }

    fn relationships(
        &self,
        _ctx: &Context,
        node: &Node,
        linker: &RelationshipLinker<'_>,
    ) -> Relationships {
        let mut relationships = Relationships::new();

        for edge in &node.edges {
            let link = linker.link_for(&edge.name);

            if !edge.expand {
                let mut locators = edge
                    .ids
                    .iter()
                    .map(|id| Locator::new(&edge.target, id))
                    .collect::<Vec<_>>();
                let linkage = if edge.to_many {
                    Some(Linkage::Many(locators))
                } else {
                    locators.pop().map(Linkage::One)
                };
                relationships.insert(
                    edge.name.clone(),
                    RelationshipEntry::linkage(linkage).with_link(link),
                );
                continue;
            }

            let world = Arc::clone(&self.world);
            let edge = edge.clone();
            let delay = node.delay_ms;
            relationships.insert_with(edge.name.clone(), async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                let nodes = edge
                    .ids
                    .iter()
                    .map(|id| {
                        world.get(&edge.target, id).ok_or_else(|| {
                            TrellisError::Storage(format!("dangling edge to {}#{}", edge.target, id))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let resources = if edge.to_many {
                    Resources::many(nodes)
                } else {
                    Resources::optional(nodes.into_iter().next())
                };
                Ok(RelationshipEntry::expand(Related::new(resources, edge.target)).with_link(link))
            });
        }

        relationships
    }

    async fn get_one(
        &self,
        _ctx: &Context,
        id: &str,
        _options: &QueryOptions,
    ) -> Result<Node, TrellisError> {
        self.world.get(&self.resource_type, id).ok_or_else(|| {
            TrellisError::not_found(
                "Resource not found",
                format!("Resource not found: {}", Locator::new(&self.resource_type, id)),
            )
        })
    }

    async fn get_many(
        &self,
        _ctx: &Context,
        ids: &[String],
        _options: &QueryOptions,
    ) -> Result<Vec<Node>, TrellisError> {
        self.get_many_calls.fetch_add(1, Ordering::SeqCst);
        let missing: Vec<String> = ids
            .iter()
            .filter(|id| self.world.get(&self.resource_type, id).is_none())
            .map(|id| Locator::new(&self.resource_type, id).to_string())
            .collect();
        if !missing.is_empty() {
            return Err(TrellisError::not_found(
                "Resources not found",
                format!("Resources not found: {}", missing.join(", ")),
            ));
        }
        Ok(ids
            .iter()
            .filter_map(|id| self.world.get(&self.resource_type, id))
            .collect())
    }
}

// =============================================================================
// ENGINE
// =============================================================================

/// An engine serving `types` from `world`, with a shared `get_many` counter.
pub fn engine(world: &Arc<World>, types: &[&str], base_url: &str) -> (JsonApi, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = Registry::new();
    for resource_type in types {
        registry
            .register(GraphBackend::new(
                resource_type,
                Arc::clone(world),
                Arc::clone(&calls),
            ))
            .expect("register");
    }
    (JsonApi::new(registry, base_url), calls)
}
