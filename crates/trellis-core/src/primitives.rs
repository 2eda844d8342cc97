//! # Engine Primitives
//!
//! Hardcoded runtime constants for the Trellis engine.
//!
//! These limits are compiled into the binary and are immutable at runtime.
//! They keep every recursive operation of the engine computationally bounded.

/// Base URL used for canonical links when none is configured.
///
/// With the default, a `User` with id `1` links to `/users/1`.
pub const DEFAULT_BASE_URL: &str = "/";

/// Maximum depth of an include path.
///
/// `include=a.b.c` has depth 3. Relationship expansion recursion is bounded
/// by the include tree, so this bounds the recursion depth of eagerly loaded
/// relationships.
pub const MAX_INCLUDE_DEPTH: usize = 16;

/// Maximum number of locators accepted in a single relationship payload.
///
/// Bodies naming more related resources than this are rejected before any
/// backend is asked to fetch them.
pub const MAX_LOCATORS_PER_REQUEST: usize = 1000;

/// Query-string key that introduces an include specification.
pub const INCLUDE_KEY: &str = "include";

/// Query-string key that introduces a filter specification.
pub const FILTER_KEY: &str = "filter";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn include_depth_is_bounded() {
        assert!(MAX_INCLUDE_DEPTH > 0);
        assert!(MAX_INCLUDE_DEPTH <= 64);
    }

    #[test]
    fn default_base_url_is_root() {
        assert_eq!(DEFAULT_BASE_URL, "/");
    }
}
