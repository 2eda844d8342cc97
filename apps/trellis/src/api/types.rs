//! # API Request/Response Types
//!
//! This module defines the JSON bodies of the HTTP API that are not already
//! part of the engine's document model.

use serde::{Deserialize, Serialize};
use trellis_core::{Linkage, Locator, ResourceInput, TrellisError};

/// Title of every body validation failure.
pub const INVALID_INPUT: &str = "Invalid input data";

fn invalid(details: impl Into<String>) -> TrellisError {
    TrellisError::bad_request(INVALID_INPUT, Some(details.into()))
}

fn validate_locator(path: &str, locator: &Locator) -> Result<(), TrellisError> {
    if locator.resource_type.is_empty() {
        return Err(invalid(format!("{}.type must not be empty", path)));
    }
    if locator.id.is_empty() {
        return Err(invalid(format!("{}.id must not be empty", path)));
    }
    Ok(())
}

fn validate_linkage(path: &str, linkage: Option<&Linkage>) -> Result<(), TrellisError> {
    match linkage {
        None => Ok(()),
        Some(Linkage::One(locator)) => validate_locator(path, locator),
        Some(Linkage::Many(locators)) => locators
            .iter()
            .enumerate()
            .try_for_each(|(index, locator)| validate_locator(&format!("{}[{}]", path, index), locator)),
    }
}

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// RESOURCE BODY
// =============================================================================

/// Body of create and update requests: `{ "data": { type, id?, attributes, relationships } }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceBody {
    pub data: ResourceInput,
}

impl ResourceBody {
    /// Validate a create body: `type` is required, `id` is optional.
    pub fn validate_create(&self) -> Result<(), TrellisError> {
        let data = &self.data;
        if data.resource_type.is_empty() {
            return Err(invalid("data.type must not be empty"));
        }
        if data.id.as_deref() == Some("") {
            return Err(invalid("data.id must not be empty"));
        }
        for (name, relationship) in &data.relationships {
            validate_linkage(
                &format!("data.relationships.{}.data", name),
                relationship.data.as_ref(),
            )?;
        }
        Ok(())
    }

    /// Validate an update body: both `type` and `id` are required.
    pub fn validate_update(&self) -> Result<(), TrellisError> {
        if self.data.id.is_none() {
            return Err(invalid("data should have required property 'id'"));
        }
        self.validate_create()
    }
}

// =============================================================================
// RELATIONSHIP BODY
// =============================================================================

/// Body of relationship mutations: a locator, a locator list, or `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipBody {
    #[serde(default)]
    pub data: Option<Linkage>,
}

impl RelationshipBody {
    /// Validate every locator of the body.
    pub fn validate(&self) -> Result<(), TrellisError> {
        validate_linkage("data", self.data.as_ref())
    }

    /// The named locators, in body order. `null` names none.
    #[must_use]
    pub fn locators(&self) -> Vec<Locator> {
        self.data
            .clone()
            .map(Linkage::into_locators)
            .unwrap_or_default()
    }
}

// =============================================================================
// TESTS
// =============================================================================
