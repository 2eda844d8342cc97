//! # trellis-core
//!
//! The resource-graph normalization engine for Trellis.
//!
//! This crate turns backend-native objects into JSON:API style documents:
//! a flat `{ data, included }` graph of typed, identified resources,
//! deduplicated by canonical link and expanded on demand through an
//! include tree.
//!
//! ## Components
//!
//! - `backend`: the capability contract data sources implement
//! - `include`: query-string include trees and filters
//! - `registry`: resource type → backend mapping
//! - `fetch`: batched lookups by locator across backends
//! - `normalize`: the recursive normalizer
//! - `storage`: an in-memory relational reference backend
//!
//! ## Architectural Constraints
//!
//! - No HTTP and no network dependencies: callers hand in fetched objects
//! - Deterministic output: `data` keeps input order, `included` keeps
//!   discovery order
//! - Fail fast: an error anywhere aborts the whole document
//! - The registry is immutable once shared

// =============================================================================
// MODULES
// =============================================================================

pub mod api;
pub mod backend;
mod fetch;
pub mod include;
pub mod links;
mod normalize;
pub mod primitives;
pub mod registry;
pub mod storage;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Document, ErrorDocument, ErrorObject, Linkage, Links, Locator, PrimaryData, Relationship,
    RelationshipInput, Resource, ResourceInput, TrellisError,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use api::{Context, JsonApi};
pub use backend::{
    AnyResource, AttributeValue, Attributes, Backend, Capabilities, Capability, DynBackend,
    FetchedResource, PendingRelationship, Related, RelatedResources, RelationshipData,
    RelationshipEntry, RelationshipLinker, Relationships, Resources,
};
pub use include::{IncludeTree, QueryOptions};
pub use links::LinkBuilder;
pub use registry::Registry;

// =============================================================================
// RE-EXPORTS: Storage (from storage module)
// =============================================================================

pub use storage::{
    MemoryStore, RelationshipDef, RelationshipKind, Row, RowRelation, StoreBackend, TableSchema,
};
