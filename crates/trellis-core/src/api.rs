//! # Engine Handle
//!
//! `JsonApi` is the shared, immutable engine: the backend registry plus the
//! link builder. It is cheap to clone and is what request handlers hold.
//!
//! `Context` is the request-scoped value passed to every backend call. It
//! gives backends access to the engine so they can resolve other backends by
//! resource type.

use crate::backend::{DynBackend, FetchedResource, Resources};
use crate::fetch::Fetcher;
use crate::links::LinkBuilder;
use crate::normalize::Normalizer;
use crate::registry::Registry;
use crate::{Document, Locator, TrellisError};
use std::fmt;
use std::sync::Arc;

struct Inner {
    registry: Registry,
    links: LinkBuilder,
}

/// The normalization engine.
#[derive(Clone)]
pub struct JsonApi {
    inner: Arc<Inner>,
}

impl JsonApi {
    /// Create an engine over a fully populated registry.
    #[must_use]
    pub fn new(registry: Registry, base_url: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                links: LinkBuilder::new(base_url),
            }),
        }
    }

    /// The backend registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// The link builder.
    #[must_use]
    pub fn links(&self) -> &LinkBuilder {
        &self.inner.links
    }

    /// A fresh request context bound to this engine.
    #[must_use]
    pub fn context(&self) -> Context {
        Context::new(self.clone())
    }

    /// The backend for a resource type.
    ///
    /// Returns `TrellisError::UnknownResourceType` if none is registered.
    pub fn backend(&self, resource_type: &str) -> Result<Arc<dyn DynBackend>, TrellisError> {
        self.inner
            .registry
            .lookup(resource_type)
            .ok_or_else(|| TrellisError::UnknownResourceType(resource_type.to_string()))
    }

    /// Normalize native resources of `resource_type` into a document.
    ///
    /// Fails without a partial document if any backend call fails or any
    /// reached resource type is unregistered.
    pub async fn normalize_resource(
        &self,
        ctx: &Context,
        resources: Resources,
        resource_type: &str,
    ) -> Result<Document, TrellisError> {
        Normalizer::new(self, ctx).run(resources, resource_type).await
    }

    /// Fetch resources by locator across backends.
    ///
    /// Results are grouped by type in first-appearance order.
    pub async fn fetch_resources(
        &self,
        ctx: &Context,
        locators: &[Locator],
    ) -> Result<Vec<FetchedResource>, TrellisError> {
        Fetcher::new(self, ctx).fetch(locators).await
    }
}

impl fmt::Debug for JsonApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonApi")
            .field("registry", &self.inner.registry)
            .field("base_url", &self.inner.links.base_url())
            .finish()
    }
}

/// Request-scoped handle passed to backends.
#[derive(Clone)]
pub struct Context {
    api: JsonApi,
}

impl Context {
    /// A context bound to `api`.
    #[must_use]
    pub fn new(api: JsonApi) -> Self {
        Self { api }
    }

    /// The engine.
    #[must_use]
    pub fn api(&self) -> &JsonApi {
        &self.api
    }

    /// The backend registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        self.api.registry()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").finish_non_exhaustive()
    }
}
