//! # Core Type Definitions
//!
//! This module contains the wire-level types of the Trellis document format:
//! - Resource addressing (`Locator`, `Links`)
//! - Document nodes (`Resource`, `Relationship`, `Linkage`)
//! - Top-level documents (`Document`, `PrimaryData`, `ErrorDocument`)
//! - Inbound payloads handed to backends (`ResourceInput`, `RelationshipInput`)
//! - Error types (`TrellisError`)
//!
//! ## Wire Compatibility
//!
//! Every serialized shape here is consumed by JSON:API style clients:
//! - `type` and `self` are emitted under their reserved names
//! - `null` relationship data is emitted, never skipped
//! - optional `links`, `title` and `details` are skipped when absent

use crate::backend::Capability;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

// =============================================================================
// LOCATOR
// =============================================================================

/// A `(type, id)` reference to a resource, without its attributes.
///
/// Equality is structural: two locators are equal when both the type and
/// the id match.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Locator {
    /// The resource type name, as declared by its backend.
    #[serde(rename = "type")]
    pub resource_type: String,
    /// The resource id, always a string regardless of the native key type.
    pub id: String,
}

impl Locator {
    /// Create a new locator.
    #[must_use]
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}#{}>", self.resource_type, self.id)
    }
}

// =============================================================================
// LINKS
// =============================================================================

/// The `links` member of resources and relationships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Links {
    /// Canonical URL of the owning object.
    #[serde(rename = "self")]
    pub self_link: String,
}

impl Links {
    /// Create a links object pointing at `self_link`.
    #[must_use]
    pub fn new(self_link: impl Into<String>) -> Self {
        Self {
            self_link: self_link.into(),
        }
    }
}

// =============================================================================
// LINKAGE & RELATIONSHIP
// =============================================================================

/// Resource linkage: the `data` member of a relationship.
///
/// A to-one relationship carries a single locator, a to-many relationship a
/// list. An empty to-one relationship is represented by `None` at the
/// `Option<Linkage>` level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Linkage {
    /// To-one linkage.
    One(Locator),
    /// To-many linkage, possibly empty.
    Many(Vec<Locator>),
}

impl Linkage {
    /// Flatten the linkage into a list of locators.
    #[must_use]
    pub fn into_locators(self) -> Vec<Locator> {
        match self {
            Self::One(locator) => vec![locator],
            Self::Many(locators) => locators,
        }
    }

    /// Iterate the locators of this linkage.
    pub fn locators(&self) -> impl Iterator<Item = &Locator> {
        match self {
            Self::One(locator) => std::slice::from_ref(locator).iter(),
            Self::Many(locators) => locators.iter(),
        }
    }
}

/// A relationship object as emitted inside `Resource::relationships`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// Linkage to the related resource(s); `None` serializes as `null`.
    pub data: Option<Linkage>,
    /// The relationship's own canonical link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
}

// =============================================================================
// RESOURCE
// =============================================================================

/// A resource object: one node of the normalized document graph.
///
/// `links.self` is the identity of the node: two resources with the same
/// self link are the same node and appear at most once per document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// The resource type name.
    #[serde(rename = "type")]
    pub resource_type: String,
    /// The resource id.
    pub id: String,
    /// Canonical links.
    pub links: Links,
    /// Resolved attribute values, in the order the backend declared them.
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// Relationship payloads keyed by relationship name.
    #[serde(default)]
    pub relationships: BTreeMap<String, Relationship>,
}

impl Resource {
    /// Create a resource with no attributes and no relationships yet.
    #[must_use]
    pub fn new(locator: Locator, self_link: impl Into<String>) -> Self {
        Self {
            resource_type: locator.resource_type,
            id: locator.id,
            links: Links::new(self_link),
            attributes: Map::new(),
            relationships: BTreeMap::new(),
        }
    }

    /// The `(type, id)` locator of this resource.
    #[must_use]
    pub fn locator(&self) -> Locator {
        Locator::new(&self.resource_type, &self.id)
    }
}

// =============================================================================
// DOCUMENT
// =============================================================================

/// Primary data of a document: a single resource or an ordered collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryData {
    /// A single resource.
    One(Box<Resource>),
    /// A collection in source iteration order.
    Many(Vec<Resource>),
}

/// A complete normalized document: `{ data, included }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// The primary data; `None` serializes as `null`.
    pub data: Option<PrimaryData>,
    /// Every resource reached through relationships, each exactly once,
    /// in discovery order.
    #[serde(default)]
    pub included: Vec<Resource>,
}

impl Document {
    /// Iterate the primary resources (zero, one or many).
    pub fn primary(&self) -> impl Iterator<Item = &Resource> {
        let slice: &[Resource] = match &self.data {
            None => &[],
            Some(PrimaryData::One(resource)) => std::slice::from_ref(&**resource),
            Some(PrimaryData::Many(resources)) => resources,
        };
        slice.iter()
    }

    /// Find a resource by locator in either `data` or `included`.
    #[must_use]
    pub fn find(&self, locator: &Locator) -> Option<&Resource> {
        self.primary()
            .chain(self.included.iter())
            .find(|r| r.resource_type == locator.resource_type && r.id == locator.id)
    }
}

// =============================================================================
// ERROR DOCUMENT
// =============================================================================

/// A single entry of an error document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// HTTP status code, as a string.
    pub status: String,
    /// HTTP reason phrase.
    pub code: String,
    /// Short human readable summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Free-form diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// The error document: `{ "errors": [...] }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDocument {
    /// The reported errors.
    pub errors: Vec<ErrorObject>,
}

impl ErrorDocument {
    /// An error document with exactly one error.
    #[must_use]
    pub fn single(error: ErrorObject) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

// =============================================================================
// INBOUND PAYLOADS
// =============================================================================

/// Relationship member of an inbound resource object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipInput {
    /// The target linkage; `null` or a missing `data` clears a to-one relationship.
    #[serde(default)]
    pub data: Option<Linkage>,
}

/// An inbound resource object, as handed to `create` and `update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceInput {
    /// The declared resource type.
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Client-supplied id, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Attribute values to write.
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// Relationship linkage to write.
    #[serde(default)]
    pub relationships: BTreeMap<String, RelationshipInput>,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the Trellis engine and its backends.
///
/// - No partial documents: any error aborts the enclosing normalization or fetch
/// - Errors propagate unmodified to the request boundary
/// - The boundary maps them to an `ErrorDocument`
#[derive(Debug, Error)]
pub enum TrellisError {
    /// A resource or id does not exist.
    #[error("{}", .title.as_deref().unwrap_or("Not found"))]
    NotFound {
        title: Option<String>,
        details: Option<String>,
    },

    /// The input is malformed.
    #[error("{}", .title.as_deref().unwrap_or("Bad request"))]
    BadRequest {
        title: Option<String>,
        details: Option<String>,
    },

    /// A locator or include references a type with no registered backend.
    #[error("Invalid resource name, got \"{0}\"")]
    UnknownResourceType(String),

    /// Two backends claimed the same resource type.
    #[error("A backend is already registered for resource type \"{0}\"")]
    DuplicateResourceType(String),

    /// The operation is not implemented by the backend.
    #[error("Resource type \"{resource_type}\" does not support {capability}")]
    UnsupportedCapability {
        resource_type: String,
        capability: Capability,
    },

    /// The relationship cannot hold or accept the given resources.
    #[error("Unsupported operation on relationship ({relationship}): {reason}")]
    UnsupportedRelationshipCardinality {
        relationship: String,
        reason: String,
    },

    /// The backend does not know this relationship.
    #[error("Unknown relationship \"{relationship}\" on resource type \"{resource_type}\"")]
    UnknownRelationship {
        resource_type: String,
        relationship: String,
    },

    /// A backend was handed a native value it does not own.
    #[error("Backend for \"{0}\" received a resource of a foreign native type")]
    ResourceMismatch(String),

    /// A backend's storage failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid configuration or schema.
    #[error("Configuration error: {0}")]
    Config(String),

    /// File or socket I/O failed outside the engine.
    #[error("I/O error: {0}")]
    Io(String),
}

impl TrellisError {
    /// A `NotFound` error with title and details.
    pub fn not_found(title: impl Into<String>, details: impl Into<String>) -> Self {
        Self::NotFound {
            title: Some(title.into()),
            details: Some(details.into()),
        }
    }

    /// A `BadRequest` error with a title and optional details.
    pub fn bad_request(title: impl Into<String>, details: Option<String>) -> Self {
        Self::BadRequest {
            title: Some(title.into()),
            details,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn locator_display_uses_angle_notation() {
        assert_eq!(Locator::new("User", "userA").to_string(), "<User#userA>");
    }

    #[test]
    fn locator_serializes_type_key() {
        let value = serde_json::to_value(Locator::new("Post", "1")).expect("serialize");
        assert_eq!(value, json!({ "type": "Post", "id": "1" }));
    }

    #[test]
    fn empty_relationship_serializes_null_data() {
        let relationship = Relationship {
            data: None,
            links: None,
        };
        let value = serde_json::to_value(&relationship).expect("serialize");
        assert_eq!(value, json!({ "data": null }));
    }

    #[test]
    fn linkage_deserializes_one_or_many() {
        let one: Linkage = serde_json::from_value(json!({ "type": "User", "id": "a" })).expect("one");
        assert_eq!(one, Linkage::One(Locator::new("User", "a")));

        let many: Linkage = serde_json::from_value(json!([])).expect("many");
        assert_eq!(many, Linkage::Many(vec![]));
    }

    #[test]
    fn resource_input_defaults() {
        let input: ResourceInput =
            serde_json::from_value(json!({ "type": "User" })).expect("input");
        assert_eq!(input.id, None);
        assert!(input.attributes.is_empty());
        assert!(input.relationships.is_empty());
    }

    #[test]
    fn relationship_input_without_data_is_empty() {
        let input: ResourceInput = serde_json::from_value(json!({
            "type": "Comment",
            "relationships": { "Post": {} }
        }))
        .expect("input");
        assert_eq!(input.relationships["Post"].data, None);
    }

    #[test]
    fn error_object_skips_absent_members() {
        let error = ErrorObject {
            status: "404".to_string(),
            code: "Not Found".to_string(),
            title: None,
            details: None,
        };
        let value = serde_json::to_value(ErrorDocument::single(error)).expect("serialize");
        assert_eq!(value, json!({ "errors": [{ "status": "404", "code": "Not Found" }] }));
    }

    #[test]
    fn not_found_displays_title() {
        let error = TrellisError::not_found("Resource not found", "Resource not found: <User#x>");
        assert_eq!(error.to_string(), "Resource not found");
    }
}
