//! # Backend Registry
//!
//! Maps resource-type names to their backends.
//!
//! The registry is filled during startup and then handed to `JsonApi` by
//! value, after which it is read-only. A type can be claimed by exactly one
//! backend; the second registration fails instead of replacing the first.

use crate::backend::{Backend, DynBackend, Erased};
use crate::links::resource_path;
use crate::TrellisError;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Resource type name to backend mapping.
#[derive(Default)]
pub struct Registry {
    backends: BTreeMap<String, Arc<dyn DynBackend>>,
    /// URL path segment → resource type.
    paths: BTreeMap<String, String>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under its declared resource type.
    ///
    /// # Errors
    ///
    /// - `BadRequest` if the resource type or its URL path segment is empty
    /// - `DuplicateResourceType` if the type is already registered
    /// - `Config` if another type maps to the same URL path segment
    pub fn register<B: Backend>(&mut self, backend: B) -> Result<(), TrellisError> {
        let resource_type = backend.resource_type().to_string();

        if resource_type.is_empty() {
            return Err(TrellisError::bad_request(
                "Invalid resource type",
                Some("Backends must declare a non-empty resource type".to_string()),
            ));
        }
        if self.backends.contains_key(&resource_type) {
            return Err(TrellisError::DuplicateResourceType(resource_type));
        }

        let path = resource_path(&resource_type);
        if path.is_empty() {
            return Err(TrellisError::bad_request(
                "Invalid resource type",
                Some(format!(
                    "Resource type \"{}\" has no alphanumeric characters",
                    resource_type
                )),
            ));
        }
        if let Some(existing) = self.paths.get(&path) {
            return Err(TrellisError::Config(format!(
                "Resource types \"{}\" and \"{}\" share the path \"{}\"",
                existing, resource_type, path
            )));
        }

        self.paths.insert(path, resource_type.clone());
        self.backends
            .insert(resource_type, Arc::new(Erased(backend)));
        Ok(())
    }

    /// The backend for a resource type.
    #[must_use]
    pub fn lookup(&self, resource_type: &str) -> Option<Arc<dyn DynBackend>> {
        self.backends.get(resource_type).cloned()
    }

    /// The resource type served under a URL path segment.
    #[must_use]
    pub fn lookup_path(&self, path: &str) -> Option<&str> {
        self.paths.get(path).map(String::as_str)
    }

    /// Registered resource types, sorted.
    pub fn resource_types(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }

    /// Number of registered backends.
    #[must_use]
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Check whether no backend is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("resource_types", &self.backends.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::api::Context;
    use crate::backend::Attributes;

    struct Named(&'static str);

    impl Backend for Named {
        type Resource = ();

        fn resource_type(&self) -> &str {
            self.0
        }

        fn id(&self, _ctx: &Context, _resource: &()) -> String {
            String::new()
        }

        fn attributes(&self, _ctx: &Context, _resource: &()) -> Attributes {
            Attributes::new()
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = Registry::new();
        registry.register(Named("User")).expect("register");
        registry.register(Named("BlogPost")).expect("register");

        assert_eq!(registry.len(), 2);
        assert!(registry.lookup("User").is_some());
        assert!(registry.lookup("Comment").is_none());
        assert_eq!(registry.lookup_path("blogPosts"), Some("BlogPost"));
        assert_eq!(
            registry.resource_types().collect::<Vec<_>>(),
            vec!["BlogPost", "User"]
        );
    }

    #[test]
    fn duplicate_type_is_rejected() {
        let mut registry = Registry::new();
        registry.register(Named("User")).expect("register");
        let err = registry.register(Named("User")).unwrap_err();
        assert!(matches!(err, TrellisError::DuplicateResourceType(t) if t == "User"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn empty_type_is_rejected() {
        let mut registry = Registry::new();
        assert!(matches!(
            registry.register(Named("")),
            Err(TrellisError::BadRequest { .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn type_without_path_is_rejected() {
        let mut registry = Registry::new();
        assert!(matches!(
            registry.register(Named("___")),
            Err(TrellisError::BadRequest { .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn colliding_paths_are_rejected() {
        let mut registry = Registry::new();
        registry.register(Named("user")).expect("register");
        assert!(matches!(
            registry.register(Named("User")),
            Err(TrellisError::Config(_))
        ));
    }
}
