//! # Resource Graph Normalizer
//!
//! Turns backend-native objects into a flat `{ data, included }` document.
//!
//! ## Algorithm
//!
//! ```text
//! push_into(resources, type, target)
//!   Null  → null linkage
//!   One   → discover ─► complete
//!   Many  → data:     discover every sibling ─► complete each new one, in order
//!           included: discover ─► complete, one sibling at a time
//!
//! discover:  id ─► self link ─► seen? ──yes──► reuse locator
//!                                  └─no──► placeholder appended to target
//! complete:  resolve attributes ∥ relationship entries
//!            ─► expand related resources into `included`, in declared order
//!            ─► fill the placeholder
//! ```
//!
//! ## Invariants
//!
//! - The self link is the identity: each resource is discovered once per
//!   document, which also terminates cycles
//! - A resource is placed in its list when discovered, so `data` keeps input
//!   order and `included` keeps discovery order
//! - Primary siblings are registered before any of them is expanded, so a
//!   primary resource referenced by an earlier one never moves into
//!   `included`; related siblings are expanded depth-first
//! - Any error aborts the whole document

use crate::api::{Context, JsonApi};
use crate::backend::{
    AnyResource, AttributeValue, DynBackend, RelationshipData, RelationshipLinker, Resources,
};
use crate::{Document, Linkage, Locator, PrimaryData, Relationship, Resource, TrellisError};
use futures::future::{BoxFuture, try_join, try_join_all};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// TRAVERSAL STATE
// =============================================================================

/// Mutable state of one normalization call.
#[derive(Default)]
struct Traversal {
    /// Self link → locator of every discovered resource.
    seen: BTreeMap<String, Locator>,
    data: Vec<Resource>,
    included: Vec<Resource>,
}

impl Traversal {
    fn list_mut(&mut self, target: Target) -> &mut Vec<Resource> {
        match target {
            Target::Data => &mut self.data,
            Target::Included => &mut self.included,
        }
    }
}

/// Which list a newly discovered resource is placed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Data,
    Included,
}

/// A discovered resource whose attributes and relationships are still due.
struct Pending {
    backend: Arc<dyn DynBackend>,
    resource: AnyResource,
    target: Target,
    index: usize,
    self_link: String,
}

enum Discovery {
    Seen(Locator),
    New(Locator, Pending),
}

// =============================================================================
// NORMALIZER
// =============================================================================

pub(crate) struct Normalizer<'a> {
    api: &'a JsonApi,
    ctx: &'a Context,
}

impl<'a> Normalizer<'a> {
    pub(crate) fn new(api: &'a JsonApi, ctx: &'a Context) -> Self {
        Self { api, ctx }
    }

    pub(crate) async fn run(
        &self,
        resources: Resources,
        resource_type: &str,
    ) -> Result<Document, TrellisError> {
        let mut traversal = Traversal::default();
        let single = matches!(resources, Resources::One(_));
        let linkage = self
            .push_into(&mut traversal, resources, resource_type, Target::Data)
            .await?;

        let data = match linkage {
            None => None,
            Some(_) if single => traversal
                .data
                .pop()
                .map(|resource| PrimaryData::One(Box::new(resource))),
            Some(_) => Some(PrimaryData::Many(traversal.data)),
        };

        tracing::debug!(
            resource_type,
            discovered = traversal.seen.len(),
            included = traversal.included.len(),
            "normalized document"
        );

        Ok(Document {
            data,
            included: traversal.included,
        })
    }

    /// Normalize resources into `target`, returning the linkage to them.
    fn push_into<'t>(
        &'t self,
        traversal: &'t mut Traversal,
        resources: Resources,
        resource_type: &'t str,
        target: Target,
    ) -> BoxFuture<'t, Result<Option<Linkage>, TrellisError>> {
        Box::pin(async move {
            match resources {
                Resources::Null => Ok(None),
                Resources::One(resource) => {
                    let locator =
                        match self.discover(traversal, resource, resource_type, target)? {
                            Discovery::Seen(locator) => locator,
                            Discovery::New(locator, pending) => {
                                self.complete(traversal, pending).await?;
                                locator
                            }
                        };
                    Ok(Some(Linkage::One(locator)))
                }
                Resources::Many(items) => {
                    let mut locators = Vec::with_capacity(items.len());
                    let mut fresh = Vec::new();
                    for resource in items {
                        match self.discover(traversal, resource, resource_type, target)? {
                            Discovery::Seen(locator) => locators.push(locator),
                            Discovery::New(locator, pending) => {
                                locators.push(locator);
                                // Only primary siblings are claimed up front.
                                if target == Target::Data {
                                    fresh.push(pending);
                                } else {
                                    self.complete(traversal, pending).await?;
                                }
                            }
                        }
                    }
                    for pending in fresh {
                        self.complete(traversal, pending).await?;
                    }
                    Ok(Some(Linkage::Many(locators)))
                }
            }
        })
    }

    /// Compute the identity of a resource and claim its slot if it is new.
    fn discover(
        &self,
        traversal: &mut Traversal,
        resource: AnyResource,
        resource_type: &str,
        target: Target,
    ) -> Result<Discovery, TrellisError> {
        let backend = self.api.backend(resource_type)?;
        let id = backend.id(self.ctx, &resource)?;
        let locator = Locator::new(backend.resource_type(), id);
        let self_link = self
            .api
            .links()
            .resource_link(&locator.resource_type, &locator.id);

        if let Some(existing) = traversal.seen.get(&self_link) {
            return Ok(Discovery::Seen(existing.clone()));
        }
        traversal.seen.insert(self_link.clone(), locator.clone());

        let list = traversal.list_mut(target);
        list.push(Resource::new(locator.clone(), self_link.clone()));
        let index = list.len() - 1;

        Ok(Discovery::New(
            locator,
            Pending {
                backend,
                resource,
                target,
                index,
                self_link,
            },
        ))
    }

    /// Resolve attributes and relationships of a discovered resource.
    async fn complete(
        &self,
        traversal: &mut Traversal,
        pending: Pending,
    ) -> Result<(), TrellisError> {
        let Pending {
            backend,
            resource,
            target,
            index,
            self_link,
        } = pending;

        let attributes = backend.attributes(self.ctx, &resource)?;
        let linker = RelationshipLinker::new(&self_link);
        let relationships = backend.relationships(self.ctx, &resource, &linker)?;

        let (attribute_names, attribute_values): (Vec<String>, Vec<AttributeValue>) =
            attributes.into_entries().into_iter().unzip();
        let (relationship_names, relationship_entries): (Vec<String>, Vec<_>) =
            relationships.into_entries().into_iter().unzip();

        let (values, entries) = try_join(
            try_join_all(attribute_values.into_iter().map(AttributeValue::resolve)),
            try_join_all(relationship_entries),
        )
        .await?;

        let attributes: Map<String, Value> = attribute_names.into_iter().zip(values).collect();

        let mut relationships = BTreeMap::new();
        for (name, entry) in relationship_names.into_iter().zip(entries) {
            let data = match entry.data {
                RelationshipData::Expand(related) => {
                    self.push_into(
                        traversal,
                        related.resources,
                        &related.resource_type,
                        Target::Included,
                    )
                    .await?
                }
                RelationshipData::Linkage(linkage) => linkage,
            };
            relationships.insert(
                name,
                Relationship {
                    data,
                    links: entry.links,
                },
            );
        }

        let slot = &mut traversal.list_mut(target)[index];
        slot.attributes = attributes;
        slot.relationships = relationships;
        Ok(())
    }
}
