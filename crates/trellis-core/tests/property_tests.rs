//! # Property-Based Tests
//!
//! Invariants of the include-tree parser and the normalizer, checked with
//! proptest over generated inputs.

#![allow(clippy::unwrap_used, clippy::panic)]

mod common;

use common::{Node, World, engine};
use proptest::collection::vec;
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use trellis_core::{Document, QueryOptions};

fn relationship_name() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["A", "B", "C", "Posts", "User"]).prop_map(str::to_string)
}

fn include_path() -> impl Strategy<Value = Vec<String>> {
    vec(relationship_name(), 1..5)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("runtime")
}

fn all_resources(document: &Document) -> Vec<&trellis_core::Resource> {
    document.primary().chain(document.included.iter()).collect()
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// The include tree does not depend on the order of query pairs.
    #[test]
    fn include_tree_is_order_independent(paths in vec(include_path(), 1..8)) {
        let pairs: Vec<(String, String)> = paths
            .iter()
            .map(|path| ("include".to_string(), path.join(".")))
            .collect();

        let forward = QueryOptions::parse(pairs.iter().cloned()).expect("parse");
        let backward = QueryOptions::parse(pairs.iter().rev().cloned()).expect("parse");

        prop_assert_eq!(forward, backward);
    }

    /// Every parsed path is reachable in the tree, whichever key form was used.
    #[test]
    fn every_path_is_reachable(paths in vec(include_path(), 1..8)) {
        let pairs: Vec<(String, String)> = paths
            .iter()
            .map(|path| match path.split_last() {
                Some((last, prefix)) if !prefix.is_empty() => {
                    (format!("include.{}", prefix.join(".")), last.clone())
                }
                _ => ("include".to_string(), path.join(".")),
            })
            .collect();

        let options = QueryOptions::parse(pairs).expect("parse");

        for path in &paths {
            let mut node = &options.include;
            for name in path {
                node = node.get(name).expect("path segment");
            }
        }
        let deepest = paths.iter().map(Vec::len).max().unwrap_or(0);
        prop_assert_eq!(options.include.depth(), deepest);
    }

    /// Each resource appears once and every relationship locator resolves
    /// within the document.
    #[test]
    fn normalized_documents_are_deduplicated(
        edges in vec(vec(0usize..10, 0..4), 10),
        roots in vec(0usize..10, 1..6),
    ) {
        let names: Vec<String> = (0..edges.len()).map(|i| format!("n{}", i)).collect();
        let mut world = World::new();
        for (index, targets) in edges.iter().enumerate() {
            let ids: Vec<&str> = targets.iter().map(|t| names[*t].as_str()).collect();
            world = world.add(Node::new("Node", &names[index]).to_many("links", "Node", &ids));
        }
        let world = Arc::new(world);
        let (api, _) = engine(&world, &["Node"], "/");

        let root_ids: Vec<&str> = roots.iter().map(|r| names[*r].as_str()).collect();
        let document = runtime()
            .block_on(api.normalize_resource(&api.context(), world.many("Node", &root_ids), "Node"))
            .expect("normalize");

        let resources = all_resources(&document);
        let self_links: BTreeSet<&str> = resources
            .iter()
            .map(|r| r.links.self_link.as_str())
            .collect();
        prop_assert_eq!(self_links.len(), resources.len());

        for resource in &resources {
            for relationship in resource.relationships.values() {
                if let Some(linkage) = &relationship.data {
                    for locator in linkage.locators() {
                        prop_assert!(document.find(locator).is_some());
                    }
                }
            }
        }

        let mut expected = Vec::new();
        for id in &root_ids {
            if !expected.contains(id) {
                expected.push(*id);
            }
        }
        let primary: Vec<&str> = document.primary().map(|r| r.id.as_str()).collect();
        prop_assert_eq!(primary, expected);
    }
}
