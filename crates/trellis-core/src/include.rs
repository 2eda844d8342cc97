//! # Include-Tree Parser
//!
//! Turns flat query-string pairs into the nested include tree that bounds
//! relationship expansion, plus the pass-through filter map.
//!
//! ```text
//! include=Posts,Comments.Post   ─┐
//! include.Posts=Comments        ─┼─►  Posts ── Comments
//!                                │    Comments ── Post
//! filter.username=alice         ─┴─►  filter { username: alice }
//! ```
//!
//! - Repeated paths merge into the same subtree (union, never overwrite)
//! - Unknown top-level keys are ignored
//! - Empty relationship names are skipped

use crate::TrellisError;
use crate::primitives::{FILTER_KEY, INCLUDE_KEY, MAX_INCLUDE_DEPTH};
use serde::Serialize;
use std::collections::BTreeMap;

// =============================================================================
// INCLUDE TREE
// =============================================================================

/// A nested "what to include" specification.
///
/// Each key is a relationship name; its value is the include tree applied to
/// the related resources. A leaf is an empty tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct IncludeTree {
    children: BTreeMap<String, IncludeTree>,
}

impl IncludeTree {
    /// Create an empty include tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether nothing is included.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of relationships included at this level.
    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// The subtree for a relationship, if it is included.
    #[must_use]
    pub fn get(&self, relationship: &str) -> Option<&IncludeTree> {
        self.children.get(relationship)
    }

    /// Check whether a relationship is included at this level.
    #[must_use]
    pub fn contains(&self, relationship: &str) -> bool {
        self.children.contains_key(relationship)
    }

    /// Include a relationship at this level, returning its subtree.
    ///
    /// An existing subtree is kept as is.
    pub fn ensure(&mut self, relationship: impl Into<String>) -> &mut IncludeTree {
        self.children.entry(relationship.into()).or_default()
    }

    /// Walk a path of relationship names, creating missing nodes.
    pub fn insert_path<I, S>(&mut self, path: I) -> &mut IncludeTree
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        path.into_iter()
            .fold(self, |node, relationship| node.ensure(relationship))
    }

    /// Iterate the included relationships at this level, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &IncludeTree)> {
        self.children.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Length of the longest path in the tree.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.children
            .values()
            .map(|child| child.depth() + 1)
            .max()
            .unwrap_or(0)
    }
}

// =============================================================================
// QUERY OPTIONS
// =============================================================================

/// Parsed query options handed to backends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Relationships to expand.
    pub include: IncludeTree,
    /// `filter.<path>` values, verbatim. Their meaning belongs to backends.
    pub filter: BTreeMap<String, String>,
}

impl QueryOptions {
    /// Create empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Options that include exactly the given tree.
    #[must_use]
    pub fn with_include(include: IncludeTree) -> Self {
        Self {
            include,
            filter: BTreeMap::new(),
        }
    }

    /// Parse query-string pairs.
    ///
    /// Keys are `include`, `include.<rel>.<rel>...`, or `filter.<path>`;
    /// include values are comma-separated lists of (possibly dotted)
    /// relationship names appended to the key's path.
    ///
    /// Returns `TrellisError::BadRequest` when an include path is deeper than
    /// `MAX_INCLUDE_DEPTH`.
    pub fn parse<I, K, V>(pairs: I) -> Result<Self, TrellisError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut options = Self::default();

        for (key, value) in pairs {
            let key = key.as_ref();
            let value = value.as_ref();
            let mut segments = key.split('.');

            match segments.next() {
                Some(INCLUDE_KEY) => {
                    let prefix: Vec<&str> = segments
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .collect();
                    options.add_include(&prefix, value)?;
                }
                Some(FILTER_KEY) => {
                    let path = segments.collect::<Vec<_>>().join(".");
                    if !path.is_empty() {
                        options.filter.insert(path, value.to_string());
                    }
                }
                _ => {}
            }
        }

        Ok(options)
    }

    fn add_include(&mut self, prefix: &[&str], value: &str) -> Result<(), TrellisError> {
        for selector in value.split(',') {
            let names: Vec<&str> = selector
                .split('.')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect();

            if names.is_empty() {
                continue;
            }

            let depth = prefix.len() + names.len();
            if depth > MAX_INCLUDE_DEPTH {
                return Err(TrellisError::bad_request(
                    "Include path too deep",
                    Some(format!(
                        "Include path depth {} exceeds maximum {}",
                        depth, MAX_INCLUDE_DEPTH
                    )),
                ));
            }

            self.include
                .insert_path(prefix.iter().chain(names.iter()).copied());
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
