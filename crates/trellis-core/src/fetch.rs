//! # Multi-Backend Resource Fetcher
//!
//! Resolves a list of locators spanning several resource types.
//!
//! ```text
//! [User#a, Post#1, User#b]  ──►  User: [a, b]  ──get_many──┐
//!                                Post: [1]     ──get_many──┴──►  [User#a, User#b, Post#1]
//! ```
//!
//! - Partitions keep first-appearance order of their type, ids keep request order
//! - Every type must be registered before any backend is called
//! - Per-type `get_many` calls run concurrently
//! - A missing id fails the whole fetch (no partial results)

use crate::api::{Context, JsonApi};
use crate::backend::{DynBackend, FetchedResource};
use crate::include::QueryOptions;
use crate::primitives::MAX_LOCATORS_PER_REQUEST;
use crate::{Locator, TrellisError};
use futures::future::try_join_all;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One `get_many` batch.
struct Partition {
    backend: Arc<dyn DynBackend>,
    ids: Vec<String>,
}

pub(crate) struct Fetcher<'a> {
    api: &'a JsonApi,
    ctx: &'a Context,
}

impl<'a> Fetcher<'a> {
    pub(crate) fn new(api: &'a JsonApi, ctx: &'a Context) -> Self {
        Self { api, ctx }
    }

    pub(crate) async fn fetch(
        &self,
        locators: &[Locator],
    ) -> Result<Vec<FetchedResource>, TrellisError> {
        if locators.len() > MAX_LOCATORS_PER_REQUEST {
            return Err(TrellisError::bad_request(
                "Too many resources",
                Some(format!(
                    "{} locators exceed the maximum of {}",
                    locators.len(),
                    MAX_LOCATORS_PER_REQUEST
                )),
            ));
        }

        let partitions = self.partition(locators)?;
        let options = QueryOptions::default();

        let batches = try_join_all(partitions.iter().map(|partition| {
            let options = &options;
            async move {
                let resources = partition
                    .backend
                    .get_many(self.ctx, &partition.ids, options)
                    .await?;
                resources
                    .into_iter()
                    .map(|resource| {
                        let id = partition.backend.id(self.ctx, &resource)?;
                        Ok(FetchedResource {
                            locator: Locator::new(partition.backend.resource_type(), id),
                            resource,
                        })
                    })
                    .collect::<Result<Vec<_>, TrellisError>>()
            }
        }))
        .await?;

        let fetched: Vec<FetchedResource> = batches.into_iter().flatten().collect();
        tracing::debug!(
            requested = locators.len(),
            fetched = fetched.len(),
            batches = partitions.len(),
            "fetched resources"
        );
        Ok(fetched)
    }

    /// Group ids by type and resolve every backend up front.
    ///
    /// Repeated locators are fetched once.
    fn partition(&self, locators: &[Locator]) -> Result<Vec<Partition>, TrellisError> {
        let mut partitions: Vec<Partition> = Vec::new();
        let mut index: BTreeMap<&str, usize> = BTreeMap::new();

        for locator in locators {
            let slot = match index.get(locator.resource_type.as_str()) {
                Some(&slot) => slot,
                None => {
                    let backend = self.api.backend(&locator.resource_type)?;
                    partitions.push(Partition {
                        backend,
                        ids: Vec::new(),
                    });
                    index.insert(&locator.resource_type, partitions.len() - 1);
                    partitions.len() - 1
                }
            };

            let ids = &mut partitions[slot].ids;
            if !ids.contains(&locator.id) {
                ids.push(locator.id.clone());
            }
        }

        Ok(partitions)
    }
}
