//! # Backend Capability Contract
//!
//! The interface any data source implements to take part in a document.
//!
//! A backend owns one resource type. It must be able to name a native
//! object's id, list its attributes and declare its relationships; every
//! other operation is an optional capability. Unimplemented capabilities
//! fail with `TrellisError::UnsupportedCapability`.
//!
//! ## Type Erasure
//!
//! Backends are written against their own native `Resource` type. The
//! registry stores them behind the object-safe `DynBackend` adapter, and
//! native values travel between backends as `AnyResource`. Handing a backend
//! a value it does not own fails with `TrellisError::ResourceMismatch`.

use crate::api::Context;
use crate::include::QueryOptions;
use crate::links::relationship_link;
use crate::{Linkage, Links, Locator, ResourceInput, TrellisError};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A type-erased backend-native resource.
pub type AnyResource = Arc<dyn Any + Send + Sync>;

/// Related resources fetched for a create request, keyed by relationship name.
pub type RelatedResources = BTreeMap<String, Vec<FetchedResource>>;

// =============================================================================
// CAPABILITIES
// =============================================================================

/// An optional backend operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    Index,
    GetOne,
    GetMany,
    Create,
    Update,
    Delete,
    RelationshipReplace,
    RelationshipAdd,
    RelationshipRemove,
}

impl Capability {
    /// Every capability, in declaration order.
    pub const ALL: [Capability; 9] = [
        Capability::Index,
        Capability::GetOne,
        Capability::GetMany,
        Capability::Create,
        Capability::Update,
        Capability::Delete,
        Capability::RelationshipReplace,
        Capability::RelationshipAdd,
        Capability::RelationshipRemove,
    ];

    /// The contract name of the capability.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::GetOne => "getOne",
            Self::GetMany => "getMany",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::RelationshipReplace => "relationshipReplace",
            Self::RelationshipAdd => "relationshipAdd",
            Self::RelationshipRemove => "relationshipRemove",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The set of optional operations a backend implements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities(BTreeSet<Capability>);

impl Capabilities {
    /// No optional capability.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every optional capability.
    #[must_use]
    pub fn all() -> Self {
        Capability::ALL.into_iter().collect()
    }

    /// Add a capability.
    #[must_use]
    pub fn with(mut self, capability: Capability) -> Self {
        self.0.insert(capability);
        self
    }

    /// Check whether a capability is supported.
    #[must_use]
    pub fn supports(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    /// Iterate supported capabilities in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Capability> for Capabilities {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn unsupported(resource_type: &str, capability: Capability) -> TrellisError {
    TrellisError::UnsupportedCapability {
        resource_type: resource_type.to_string(),
        capability,
    }
}

// =============================================================================
// RESOURCE CARDINALITY
// =============================================================================

/// Native resources in one of the three cardinalities the engine accepts.
#[derive(Clone, Default)]
pub enum Resources {
    /// Absent: normalizes to `null`.
    #[default]
    Null,
    /// A single object.
    One(AnyResource),
    /// An ordered collection.
    Many(Vec<AnyResource>),
}

impl Resources {
    /// Wrap a single native value.
    pub fn one<T: Send + Sync + 'static>(value: T) -> Self {
        Self::One(Arc::new(value))
    }

    /// Wrap an optional native value.
    pub fn optional<T: Send + Sync + 'static>(value: Option<T>) -> Self {
        value.map_or(Self::Null, Self::one)
    }

    /// Wrap a collection of native values.
    pub fn many<T, I>(values: I) -> Self
    where
        T: Send + Sync + 'static,
        I: IntoIterator<Item = T>,
    {
        Self::Many(
            values
                .into_iter()
                .map(|value| Arc::new(value) as AnyResource)
                .collect(),
        )
    }
}

impl fmt::Debug for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::One(_) => f.write_str("One(..)"),
            Self::Many(items) => write!(f, "Many({} items)", items.len()),
        }
    }
}

/// A native value fetched by locator.
#[derive(Clone)]
pub struct FetchedResource {
    /// The locator the value answers to.
    pub locator: Locator,
    /// The native value.
    pub resource: AnyResource,
}

impl fmt::Debug for FetchedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchedResource")
            .field("locator", &self.locator)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// ATTRIBUTES
// =============================================================================

/// A single attribute value, possibly still being computed.
pub enum AttributeValue {
    /// Already known.
    Ready(Value),
    /// Computed asynchronously.
    Pending(BoxFuture<'static, Result<Value, TrellisError>>),
}

impl AttributeValue {
    /// Wait for the value.
    pub async fn resolve(self) -> Result<Value, TrellisError> {
        match self {
            Self::Ready(value) => Ok(value),
            Self::Pending(future) => future.await,
        }
    }
}

/// The attributes a backend declares for one resource, in declaration order.
#[derive(Default)]
pub struct Attributes {
    entries: Vec<(String, AttributeValue)>,
}

impl Attributes {
    /// No attributes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a known value.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Add a known value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.entries
            .push((name.into(), AttributeValue::Ready(value.into())));
    }

    /// Add a value computed by `future`.
    pub fn insert_with<F>(&mut self, name: impl Into<String>, future: F)
    where
        F: Future<Output = Result<Value, TrellisError>> + Send + 'static,
    {
        self.entries
            .push((name.into(), AttributeValue::Pending(Box::pin(future))));
    }

    /// Number of declared attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether no attribute is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn into_entries(self) -> Vec<(String, AttributeValue)> {
        self.entries
    }
}

impl From<Map<String, Value>> for Attributes {
    fn from(map: Map<String, Value>) -> Self {
        map.into_iter().collect()
    }
}

impl FromIterator<(String, Value)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(name, value)| (name, AttributeValue::Ready(value)))
                .collect(),
        }
    }
}

// =============================================================================
// RELATIONSHIPS
// =============================================================================

/// Related native resources and the type of their backend.
///
/// Declaring a relationship with `Related` asks the engine to normalize the
/// related resources into `included` and reference them by locator.
#[derive(Debug, Clone)]
pub struct Related {
    /// Resource type of the related resources.
    pub resource_type: String,
    /// The related native resources.
    pub resources: Resources,
}

impl Related {
    /// Related resources of `resource_type`.
    #[must_use]
    pub fn new(resources: Resources, resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            resources,
        }
    }
}

/// How a relationship's `data` member is produced.
#[derive(Debug, Clone)]
pub enum RelationshipData {
    /// Normalize the related resources into `included`.
    Expand(Related),
    /// Emit this linkage as a bare reference.
    Linkage(Option<Linkage>),
}

/// A relationship declared by a backend.
#[derive(Debug, Clone)]
pub struct RelationshipEntry {
    /// The relationship data source.
    pub data: RelationshipData,
    /// The relationship's own links.
    pub links: Option<Links>,
}

impl RelationshipEntry {
    /// Expand related resources.
    #[must_use]
    pub fn expand(related: Related) -> Self {
        Self {
            data: RelationshipData::Expand(related),
            links: None,
        }
    }

    /// Reference resources by linkage only.
    #[must_use]
    pub fn linkage(linkage: Option<Linkage>) -> Self {
        Self {
            data: RelationshipData::Linkage(linkage),
            links: None,
        }
    }

    /// Attach the relationship's self link.
    #[must_use]
    pub fn with_link(mut self, self_link: impl Into<String>) -> Self {
        self.links = Some(Links::new(self_link));
        self
    }
}

/// A relationship entry still being loaded.
pub type PendingRelationship = BoxFuture<'static, Result<RelationshipEntry, TrellisError>>;

/// The relationships a backend declares for one resource, in declaration order.
#[derive(Default)]
pub struct Relationships {
    entries: Vec<(String, PendingRelationship)>,
}

impl Relationships {
    /// No relationships.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a relationship whose entry is already known.
    pub fn insert(&mut self, name: impl Into<String>, entry: RelationshipEntry) {
        self.entries
            .push((name.into(), Box::pin(futures::future::ready(Ok(entry)))));
    }

    /// Declare a relationship whose entry is loaded by `future`.
    pub fn insert_with<F>(&mut self, name: impl Into<String>, future: F)
    where
        F: Future<Output = Result<RelationshipEntry, TrellisError>> + Send + 'static,
    {
        self.entries.push((name.into(), Box::pin(future)));
    }

    /// Number of declared relationships.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether no relationship is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn into_entries(self) -> Vec<(String, PendingRelationship)> {
        self.entries
    }
}

/// Computes the canonical link of a relationship of the resource being
/// normalized.
#[derive(Debug, Clone, Copy)]
pub struct RelationshipLinker<'a> {
    self_link: &'a str,
}

impl<'a> RelationshipLinker<'a> {
    /// A linker for the resource whose self link is `self_link`.
    #[must_use]
    pub fn new(self_link: &'a str) -> Self {
        Self { self_link }
    }

    /// The owning resource's self link.
    #[must_use]
    pub fn self_link(&self) -> &str {
        self.self_link
    }

    /// The canonical link of `relationship`.
    #[must_use]
    pub fn link_for(&self, relationship: &str) -> String {
        relationship_link(self.self_link, relationship)
    }
}

// =============================================================================
// BACKEND TRAIT
// =============================================================================

/// A data source for one resource type.
///
/// Only `resource_type`, `id` and `attributes` are required. Backends that
/// implement an optional operation must also report it from `capabilities`,
/// which is what upstream routing consults.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// The backend-native object type.
    type Resource: Send + Sync + 'static;

    /// The resource type name served by this backend.
    fn resource_type(&self) -> &str;

    /// The optional operations this backend implements.
    fn capabilities(&self) -> Capabilities {
        Capabilities::new()
    }

    /// The string id of a native object.
    fn id(&self, ctx: &Context, resource: &Self::Resource) -> String;

    /// The public attributes of a native object.
    fn attributes(&self, ctx: &Context, resource: &Self::Resource) -> Attributes;

    /// The relationships of a native object.
    fn relationships(
        &self,
        _ctx: &Context,
        _resource: &Self::Resource,
        _linker: &RelationshipLinker<'_>,
    ) -> Relationships {
        Relationships::new()
    }

    /// List resources.
    async fn index(
        &self,
        _ctx: &Context,
        _options: &QueryOptions,
    ) -> Result<Vec<Self::Resource>, TrellisError> {
        Err(unsupported(self.resource_type(), Capability::Index))
    }

    /// Fetch one resource, failing with `NotFound` when it does not exist.
    async fn get_one(
        &self,
        _ctx: &Context,
        _id: &str,
        _options: &QueryOptions,
    ) -> Result<Self::Resource, TrellisError> {
        Err(unsupported(self.resource_type(), Capability::GetOne))
    }

    /// Fetch several resources, failing with `NotFound` if any is missing.
    async fn get_many(
        &self,
        _ctx: &Context,
        _ids: &[String],
        _options: &QueryOptions,
    ) -> Result<Vec<Self::Resource>, TrellisError> {
        Err(unsupported(self.resource_type(), Capability::GetMany))
    }

    /// Create a resource from input and already-fetched related resources.
    async fn create(
        &self,
        _ctx: &Context,
        _input: &ResourceInput,
        _related: &RelatedResources,
    ) -> Result<Self::Resource, TrellisError> {
        Err(unsupported(self.resource_type(), Capability::Create))
    }

    /// Update a resource's attributes.
    async fn update(
        &self,
        _ctx: &Context,
        _resource: &Self::Resource,
        _input: &ResourceInput,
    ) -> Result<Self::Resource, TrellisError> {
        Err(unsupported(self.resource_type(), Capability::Update))
    }

    /// Delete a resource.
    async fn delete(&self, _ctx: &Context, _resource: &Self::Resource) -> Result<(), TrellisError> {
        Err(unsupported(self.resource_type(), Capability::Delete))
    }

    /// Replace the members of a relationship.
    async fn relationship_replace(
        &self,
        _ctx: &Context,
        _resource: &Self::Resource,
        _relationship: &str,
        _related: &[FetchedResource],
    ) -> Result<(), TrellisError> {
        Err(unsupported(
            self.resource_type(),
            Capability::RelationshipReplace,
        ))
    }

    /// Add members to a to-many relationship.
    async fn relationship_add(
        &self,
        _ctx: &Context,
        _resource: &Self::Resource,
        _relationship: &str,
        _related: &[FetchedResource],
    ) -> Result<(), TrellisError> {
        Err(unsupported(self.resource_type(), Capability::RelationshipAdd))
    }

    /// Remove members from a to-many relationship.
    async fn relationship_remove(
        &self,
        _ctx: &Context,
        _resource: &Self::Resource,
        _relationship: &str,
        _related: &[FetchedResource],
    ) -> Result<(), TrellisError> {
        Err(unsupported(
            self.resource_type(),
            Capability::RelationshipRemove,
        ))
    }
}

// =============================================================================
// TYPE-ERASED BACKEND
// =============================================================================

/// Object-safe view of a `Backend`, operating on `AnyResource`.
#[async_trait]
pub trait DynBackend: Send + Sync {
    /// The resource type name served by this backend.
    fn resource_type(&self) -> &str;

    /// The optional operations this backend implements.
    fn capabilities(&self) -> Capabilities;

    /// The string id of a native object.
    fn id(&self, ctx: &Context, resource: &AnyResource) -> Result<String, TrellisError>;

    /// The public attributes of a native object.
    fn attributes(&self, ctx: &Context, resource: &AnyResource)
    -> Result<Attributes, TrellisError>;

    /// The relationships of a native object.
    fn relationships(
        &self,
        ctx: &Context,
        resource: &AnyResource,
        linker: &RelationshipLinker<'_>,
    ) -> Result<Relationships, TrellisError>;

    async fn index(
        &self,
        ctx: &Context,
        options: &QueryOptions,
    ) -> Result<Vec<AnyResource>, TrellisError>;

    async fn get_one(
        &self,
        ctx: &Context,
        id: &str,
        options: &QueryOptions,
    ) -> Result<AnyResource, TrellisError>;

    async fn get_many(
        &self,
        ctx: &Context,
        ids: &[String],
        options: &QueryOptions,
    ) -> Result<Vec<AnyResource>, TrellisError>;

    async fn create(
        &self,
        ctx: &Context,
        input: &ResourceInput,
        related: &RelatedResources,
    ) -> Result<AnyResource, TrellisError>;

    async fn update(
        &self,
        ctx: &Context,
        resource: &AnyResource,
        input: &ResourceInput,
    ) -> Result<AnyResource, TrellisError>;

    async fn delete(&self, ctx: &Context, resource: &AnyResource) -> Result<(), TrellisError>;

    async fn relationship_replace(
        &self,
        ctx: &Context,
        resource: &AnyResource,
        relationship: &str,
        related: &[FetchedResource],
    ) -> Result<(), TrellisError>;

    async fn relationship_add(
        &self,
        ctx: &Context,
        resource: &AnyResource,
        relationship: &str,
        related: &[FetchedResource],
    ) -> Result<(), TrellisError>;

    async fn relationship_remove(
        &self,
        ctx: &Context,
        resource: &AnyResource,
        relationship: &str,
        related: &[FetchedResource],
    ) -> Result<(), TrellisError>;
}

/// Adapter from a typed `Backend` to `DynBackend`.
pub(crate) struct Erased<B>(pub(crate) B);

impl<B: Backend> Erased<B> {
    fn native<'r>(&self, resource: &'r AnyResource) -> Result<&'r B::Resource, TrellisError> {
        (**resource)
            .downcast_ref::<B::Resource>()
            .ok_or_else(|| TrellisError::ResourceMismatch(self.0.resource_type().to_string()))
    }
}

fn erase<T: Send + Sync + 'static>(value: T) -> AnyResource {
    Arc::new(value)
}

#[async_trait]
impl<B: Backend> DynBackend for Erased<B> {
    fn resource_type(&self) -> &str {
        self.0.resource_type()
    }

    fn capabilities(&self) -> Capabilities {
        self.0.capabilities()
    }

    fn id(&self, ctx: &Context, resource: &AnyResource) -> Result<String, TrellisError> {
        Ok(self.0.id(ctx, self.native(resource)?))
    }

    fn attributes(
        &self,
        ctx: &Context,
        resource: &AnyResource,
    ) -> Result<Attributes, TrellisError> {
        Ok(self.0.attributes(ctx, self.native(resource)?))
    }

    fn relationships(
        &self,
        ctx: &Context,
        resource: &AnyResource,
        linker: &RelationshipLinker<'_>,
    ) -> Result<Relationships, TrellisError> {
        Ok(self.0.relationships(ctx, self.native(resource)?, linker))
    }

    async fn index(
        &self,
        ctx: &Context,
        options: &QueryOptions,
    ) -> Result<Vec<AnyResource>, TrellisError> {
        let resources = self.0.index(ctx, options).await?;
        Ok(resources.into_iter().map(erase).collect())
    }

    async fn get_one(
        &self,
        ctx: &Context,
        id: &str,
        options: &QueryOptions,
    ) -> Result<AnyResource, TrellisError> {
        self.0.get_one(ctx, id, options).await.map(erase)
    }

    async fn get_many(
        &self,
        ctx: &Context,
        ids: &[String],
        options: &QueryOptions,
    ) -> Result<Vec<AnyResource>, TrellisError> {
        let resources = self.0.get_many(ctx, ids, options).await?;
        Ok(resources.into_iter().map(erase).collect())
    }

    async fn create(
        &self,
        ctx: &Context,
        input: &ResourceInput,
        related: &RelatedResources,
    ) -> Result<AnyResource, TrellisError> {
        self.0.create(ctx, input, related).await.map(erase)
    }

    async fn update(
        &self,
        ctx: &Context,
        resource: &AnyResource,
        input: &ResourceInput,
    ) -> Result<AnyResource, TrellisError> {
        let native = self.native(resource)?;
        self.0.update(ctx, native, input).await.map(erase)
    }

    async fn delete(&self, ctx: &Context, resource: &AnyResource) -> Result<(), TrellisError> {
        let native = self.native(resource)?;
        self.0.delete(ctx, native).await
    }

    async fn relationship_replace(
        &self,
        ctx: &Context,
        resource: &AnyResource,
        relationship: &str,
        related: &[FetchedResource],
    ) -> Result<(), TrellisError> {
        let native = self.native(resource)?;
        self.0
            .relationship_replace(ctx, native, relationship, related)
            .await
    }

    async fn relationship_add(
        &self,
        ctx: &Context,
        resource: &AnyResource,
        relationship: &str,
        related: &[FetchedResource],
    ) -> Result<(), TrellisError> {
        let native = self.native(resource)?;
        self.0
            .relationship_add(ctx, native, relationship, related)
            .await
    }

    async fn relationship_remove(
        &self,
        ctx: &Context,
        resource: &AnyResource,
        relationship: &str,
        related: &[FetchedResource],
    ) -> Result<(), TrellisError> {
        let native = self.native(resource)?;
        self.0
            .relationship_remove(ctx, native, relationship, related)
            .await
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn capabilities_set_operations() {
        let caps = Capabilities::new()
            .with(Capability::GetOne)
            .with(Capability::Index);
        assert!(caps.supports(Capability::GetOne));
        assert!(!caps.supports(Capability::Delete));
        assert_eq!(
            caps.iter().collect::<Vec<_>>(),
            vec![Capability::Index, Capability::GetOne]
        );
        assert_eq!(Capabilities::all().iter().count(), Capability::ALL.len());
    }

    #[test]
    fn capability_names() {
        assert_eq!(Capability::RelationshipReplace.to_string(), "relationshipReplace");
        assert_eq!(Capability::GetMany.name(), "getMany");
    }

    #[test]
    fn attributes_keep_declaration_order() {
        let attributes = Attributes::new().with("b", 1).with("a", "x");
        let names: Vec<_> = attributes
            .into_entries()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn pending_attribute_resolves() {
        let mut attributes = Attributes::new();
        attributes.insert_with("answer", async { Ok(json!(42)) });
        let mut entries = attributes.into_entries();
        let (name, value) = entries.remove(0);
        assert_eq!(name, "answer");
        assert_eq!(value.resolve().await.expect("resolve"), json!(42));
    }

    #[test]
    fn linker_builds_relationship_links() {
        let linker = RelationshipLinker::new("/posts/postA");
        assert_eq!(linker.link_for("User"), "/posts/postA/User");
        assert_eq!(linker.self_link(), "/posts/postA");
    }

    #[test]
    fn resources_constructors() {
        assert!(matches!(Resources::optional::<u32>(None), Resources::Null));
        assert!(matches!(Resources::one(1u32), Resources::One(_)));
        match Resources::many(vec![1u32, 2, 3]) {
            Resources::Many(items) => assert_eq!(items.len(), 3),
            other => panic!("unexpected {:?}", other),
        }
    }
}
