//! # Canonical Links
//!
//! Deterministic URL construction for resources and relationships.
//!
//! The resource self link is also the deduplication key of the normalizer,
//! so everything here must be a pure function of its inputs:
//!
//! ```text
//! base_url + "/" + pluralize(camel_case(type)) + "/" + id   (resource)
//! resource self link + "/" + relationship name             (relationship)
//! ```

use crate::primitives::DEFAULT_BASE_URL;

// =============================================================================
// LINK BUILDER
// =============================================================================

/// Builds canonical links from a configured base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkBuilder {
    base_url: String,
}

impl Default for LinkBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl LinkBuilder {
    /// Create a link builder rooted at `base_url`.
    ///
    /// An empty base URL is treated as `/`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let base_url = if base_url.is_empty() {
            DEFAULT_BASE_URL.to_string()
        } else {
            base_url
        };
        Self { base_url }
    }

    /// The configured base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The canonical self link of a resource.
    #[must_use]
    pub fn resource_link(&self, resource_type: &str, id: &str) -> String {
        join(
            &self.base_url,
            &format!("{}/{}", resource_path(resource_type), id),
        )
    }

    /// The canonical link of a resource collection.
    #[must_use]
    pub fn collection_link(&self, resource_type: &str) -> String {
        join(&self.base_url, &resource_path(resource_type))
    }
}

/// The canonical link of a relationship, given its owner's self link.
#[must_use]
pub fn relationship_link(resource_link: &str, relationship: &str) -> String {
    join(resource_link, relationship)
}

/// Append a relative path to a base, with exactly one `/` between them.
fn join(base: &str, path: &str) -> String {
    if base.ends_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

// =============================================================================
// PATH SEGMENTS
// =============================================================================

/// The URL path segment of a resource type: the plural of its camel case.
///
/// - `User` → `users`
/// - `BlogPost` → `blogPosts`
/// - `Category` → `categories`
#[must_use]
pub fn resource_path(resource_type: &str) -> String {
    let word = camel_case(resource_type);
    if word.is_empty() {
        return word;
    }
    pluralizer::pluralize(&word, 2, false)
}

/// Convert an identifier to lower camel case.
///
/// Words are split on non-alphanumeric characters and on case boundaries;
/// a run of capitals followed by a lowercase letter ends an acronym
/// (`HTTPRequest` → `httpRequest`).
#[must_use]
pub fn camel_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for (index, word) in split_words(input).iter().enumerate() {
        let lower = word.to_lowercase();
        if index == 0 {
            out.push_str(&lower);
        } else {
            let mut chars = lower.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str());
            }
        }
    }
    out
}

fn split_words(input: &str) -> Vec<String> {
    let chars: Vec<char> = input.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }

        if let Some(prev) = current.chars().last() {
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = (c.is_uppercase() && (prev.is_lowercase() || prev.is_ascii_digit()))
                || (c.is_uppercase() && prev.is_uppercase() && next_is_lower);
            if boundary {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }

    if !current.is_empty() {
        words.push(current);
    }
    words
}

// =============================================================================
// TESTS
// =============================================================================
