//! # In-Memory Relational Store
//!
//! A reference backend keeping one table per resource type in memory.
//!
//! ## Associations
//!
//! ```text
//! Post.User      belongs_to  User   foreign key stored on the Post row
//! User.Posts     has_many    Post   Post rows whose `User` key is the user
//! User.Profile   has_one     Profile  first Profile row whose `User` key is the user
//! ```
//!
//! `has_one` and `has_many` always name their inverse `belongs_to`, so every
//! association is backed by exactly one foreign key.
//!
//! ## Reads
//!
//! Rows are returned as `Row` snapshots. Relationships named in the include
//! tree are loaded eagerly, recursively, into the snapshot; the backend
//! expands exactly those and omits the rest.
//!
//! ## Locking
//!
//! All tables share one `RwLock`. Guards are never held across an await.

use crate::api::Context;
use crate::backend::{
    AnyResource, Attributes, Backend, Capabilities, FetchedResource, Related, RelatedResources,
    RelationshipEntry, RelationshipLinker, Relationships, Resources,
};
use crate::include::{IncludeTree, QueryOptions};
use crate::registry::Registry;
use crate::{Linkage, Locator, ResourceInput, TrellisError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Filter key matching the row id instead of an attribute.
const ID_FILTER: &str = "id";

// =============================================================================
// SCHEMA
// =============================================================================

/// How a relationship is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    /// To-one, foreign key on the owning row.
    BelongsTo,
    /// To-one, foreign key on the target row.
    HasOne,
    /// To-many, foreign key on the target rows.
    HasMany,
}

impl RelationshipKind {
    /// Check whether the relationship holds a collection.
    #[must_use]
    pub fn is_to_many(self) -> bool {
        matches!(self, Self::HasMany)
    }
}

/// A relationship declared on a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipDef {
    /// Relationship name, as used in documents and include paths.
    pub name: String,
    /// Resource type of the related rows.
    pub target: String,
    /// Storage kind.
    pub kind: RelationshipKind,
    /// For `has_one` and `has_many`: the `belongs_to` relationship on the
    /// target table holding the foreign key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inverse: Option<String>,
}

impl RelationshipDef {
    /// A `belongs_to` relationship.
    #[must_use]
    pub fn belongs_to(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            kind: RelationshipKind::BelongsTo,
            inverse: None,
        }
    }

    /// A `has_one` relationship backed by `inverse` on the target table.
    #[must_use]
    pub fn has_one(
        name: impl Into<String>,
        target: impl Into<String>,
        inverse: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            kind: RelationshipKind::HasOne,
            inverse: Some(inverse.into()),
        }
    }

    /// A `has_many` relationship backed by `inverse` on the target table.
    #[must_use]
    pub fn has_many(
        name: impl Into<String>,
        target: impl Into<String>,
        inverse: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            kind: RelationshipKind::HasMany,
            inverse: Some(inverse.into()),
        }
    }
}

/// The declaration of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Resource type stored in this table.
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Public attribute names, in emission order.
    #[serde(default)]
    pub attributes: Vec<String>,
    /// Declared relationships.
    #[serde(default)]
    pub relationships: Vec<RelationshipDef>,
}

impl TableSchema {
    /// A table with no attributes and no relationships.
    #[must_use]
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: Vec::new(),
            relationships: Vec::new(),
        }
    }

    /// Add a public attribute.
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.push(name.into());
        self
    }

    /// Add a relationship.
    #[must_use]
    pub fn relationship(mut self, relationship: RelationshipDef) -> Self {
        self.relationships.push(relationship);
        self
    }

    /// Find a relationship by name.
    #[must_use]
    pub fn find_relationship(&self, name: &str) -> Option<&RelationshipDef> {
        self.relationships.iter().find(|def| def.name == name)
    }

    fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|attribute| attribute == name)
    }
}

fn validate_schemas(
    schemas: Vec<TableSchema>,
) -> Result<BTreeMap<String, TableSchema>, TrellisError> {
    let mut by_type = BTreeMap::new();

    for schema in schemas {
        if schema.resource_type.is_empty() {
            return Err(TrellisError::Config(
                "table schema with an empty resource type".to_string(),
            ));
        }
        let mut attributes = BTreeSet::new();
        for attribute in &schema.attributes {
            if attribute == ID_FILTER || !attributes.insert(attribute.as_str()) {
                return Err(TrellisError::Config(format!(
                    "invalid or duplicate attribute \"{}\" on \"{}\"",
                    attribute, schema.resource_type
                )));
            }
        }
        if by_type.contains_key(&schema.resource_type) {
            return Err(TrellisError::Config(format!(
                "table \"{}\" declared twice",
                schema.resource_type
            )));
        }
        by_type.insert(schema.resource_type.clone(), schema);
    }

    for schema in by_type.values() {
        let mut names = BTreeSet::new();
        for def in &schema.relationships {
            let label = format!("{}.{}", schema.resource_type, def.name);
            if !names.insert(def.name.as_str()) || schema.has_attribute(&def.name) {
                return Err(TrellisError::Config(format!(
                    "relationship {} is declared twice or shadows an attribute",
                    label
                )));
            }
            let target = by_type.get(&def.target).ok_or_else(|| {
                TrellisError::Config(format!(
                    "relationship {} targets unknown type \"{}\"",
                    label, def.target
                ))
            })?;

            match (def.kind, def.inverse.as_deref()) {
                (RelationshipKind::BelongsTo, None) => {}
                (RelationshipKind::BelongsTo, Some(_)) => {
                    return Err(TrellisError::Config(format!(
                        "belongs_to relationship {} cannot declare an inverse",
                        label
                    )));
                }
                (_, None) => {
                    return Err(TrellisError::Config(format!(
                        "relationship {} requires an inverse belongs_to",
                        label
                    )));
                }
                (_, Some(inverse)) => {
                    let valid = target.find_relationship(inverse).is_some_and(|back| {
                        back.kind == RelationshipKind::BelongsTo
                            && back.target == schema.resource_type
                    });
                    if !valid {
                        return Err(TrellisError::Config(format!(
                            "inverse of {} must be a belongs_to {}.{} targeting \"{}\"",
                            label, def.target, inverse, schema.resource_type
                        )));
                    }
                }
            }
        }
    }

    Ok(by_type)
}

// =============================================================================
// ROWS
// =============================================================================

/// A snapshot of a stored row, with the relationships loaded for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// The table's resource type.
    pub resource_type: String,
    /// The row id.
    pub id: String,
    /// Public attribute values, in schema order.
    pub attributes: Map<String, Value>,
    /// Relationships loaded through the include tree.
    pub relations: Vec<RowRelation>,
}

impl Row {
    /// The locator of this row.
    #[must_use]
    pub fn locator(&self) -> Locator {
        Locator::new(&self.resource_type, &self.id)
    }

    /// A loaded relationship by name.
    #[must_use]
    pub fn relation(&self, name: &str) -> Option<&RowRelation> {
        self.relations.iter().find(|relation| relation.name == name)
    }
}

/// A relationship loaded into a `Row`.
#[derive(Debug, Clone, PartialEq)]
pub struct RowRelation {
    /// Relationship name.
    pub name: String,
    /// Resource type of the related rows.
    pub target: String,
    /// Whether the relationship holds a collection.
    pub to_many: bool,
    /// Related rows, ordered by id.
    pub rows: Vec<Arc<Row>>,
}

#[derive(Debug, Default)]
struct StoredRow {
    attributes: Map<String, Value>,
    /// `belongs_to` relationship name → target id.
    foreign_keys: BTreeMap<String, String>,
}

impl StoredRow {
    fn points_to(&self, relationship: &str, id: &str) -> bool {
        self.foreign_keys
            .get(relationship)
            .is_some_and(|fk| fk == id)
    }
}

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<String, StoredRow>,
    next_id: u64,
}

impl Table {
    fn generate_id(&mut self) -> String {
        loop {
            self.next_id += 1;
            let id = self.next_id.to_string();
            if !self.rows.contains_key(&id) {
                return id;
            }
        }
    }
}

type Tables = BTreeMap<String, Table>;

fn missing_one(locator: &Locator) -> TrellisError {
    TrellisError::not_found(
        "Resource not found",
        format!("Resource not found: {}", locator),
    )
}

fn missing_many(locators: &[Locator]) -> TrellisError {
    let listed: Vec<String> = locators.iter().map(ToString::to_string).collect();
    TrellisError::not_found(
        "Resources not found",
        format!("Resources not found: {}", listed.join(", ")),
    )
}

fn table_mut<'t>(tables: &'t mut Tables, resource_type: &str) -> Result<&'t mut Table, TrellisError> {
    tables
        .get_mut(resource_type)
        .ok_or_else(|| TrellisError::UnknownResourceType(resource_type.to_string()))
}

/// Fail with `NotFound` unless every id exists in `resource_type`.
fn ensure_rows_exist(
    tables: &Tables,
    resource_type: &str,
    ids: &[String],
) -> Result<(), TrellisError> {
    let table = tables
        .get(resource_type)
        .ok_or_else(|| TrellisError::UnknownResourceType(resource_type.to_string()))?;
    let missing: Vec<Locator> = ids
        .iter()
        .filter(|id| !table.rows.contains_key(*id))
        .map(|id| Locator::new(resource_type, id))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(missing_many(&missing))
    }
}

/// Fail unless `locators` fit the cardinality and target type of `def`.
fn check_related(def: &RelationshipDef, locators: &[Locator]) -> Result<(), TrellisError> {
    if !def.kind.is_to_many() && locators.len() > 1 {
        return Err(TrellisError::UnsupportedRelationshipCardinality {
            relationship: def.name.clone(),
            reason: format!("expected at most 1 resource, got {}", locators.len()),
        });
    }
    if locators
        .iter()
        .any(|locator| locator.resource_type != def.target)
    {
        return Err(TrellisError::bad_request(
            "Invalid resource types",
            Some(format!(
                "Invalid resource types for the specified relationship ({}), expected \"{}\"",
                def.name, def.target
            )),
        ));
    }
    Ok(())
}

fn inverse_of(def: &RelationshipDef) -> Result<&str, TrellisError> {
    def.inverse.as_deref().ok_or_else(|| {
        TrellisError::Config(format!("relationship \"{}\" has no inverse", def.name))
    })
}

fn ids_of(locators: &[Locator]) -> Vec<String> {
    locators.iter().map(|locator| locator.id.clone()).collect()
}

fn matches_filter(id: &str, row: &StoredRow, key: &str, expected: &str) -> bool {
    if key == ID_FILTER {
        return id == expected;
    }
    match row.attributes.get(key) {
        Some(Value::String(value)) => value == expected,
        Some(Value::Null) | None => false,
        Some(other) => other.to_string() == expected,
    }
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// In-memory tables for a fixed set of resource types.
#[derive(Debug)]
pub struct MemoryStore {
    schemas: BTreeMap<String, TableSchema>,
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create empty tables for the given schemas.
    ///
    /// Returns `TrellisError::Config` if the schemas are inconsistent.
    pub fn new(schemas: impl IntoIterator<Item = TableSchema>) -> Result<Self, TrellisError> {
        let schemas = validate_schemas(schemas.into_iter().collect())?;
        let tables = schemas
            .keys()
            .map(|resource_type| (resource_type.clone(), Table::default()))
            .collect();
        Ok(Self {
            schemas,
            tables: RwLock::new(tables),
        })
    }

    /// Declared schemas, sorted by resource type.
    pub fn schemas(&self) -> impl Iterator<Item = &TableSchema> {
        self.schemas.values()
    }

    /// The schema of a resource type.
    #[must_use]
    pub fn schema(&self, resource_type: &str) -> Option<&TableSchema> {
        self.schemas.get(resource_type)
    }

    /// Number of rows stored for a resource type.
    pub fn count(&self, resource_type: &str) -> Result<usize, TrellisError> {
        let tables = self.read()?;
        tables
            .get(resource_type)
            .map(|table| table.rows.len())
            .ok_or_else(|| TrellisError::UnknownResourceType(resource_type.to_string()))
    }

    /// One backend per table.
    #[must_use]
    pub fn backends(self: &Arc<Self>) -> Vec<StoreBackend> {
        self.schemas
            .keys()
            .map(|resource_type| StoreBackend {
                store: Arc::clone(self),
                resource_type: resource_type.clone(),
            })
            .collect()
    }

    /// Register a backend for every table.
    pub fn register(self: &Arc<Self>, registry: &mut Registry) -> Result<(), TrellisError> {
        for backend in self.backends() {
            registry.register(backend)?;
        }
        Ok(())
    }

    /// Insert a row from a resource object, linking relationships by locator.
    ///
    /// Used for seeding: related rows must already exist.
    pub fn insert(&self, input: &ResourceInput) -> Result<Row, TrellisError> {
        let schema = self.schema_for(&input.resource_type)?;
        let links = input
            .relationships
            .iter()
            .map(|(name, relationship)| {
                let def = relationship_def(schema, name)?;
                let locators = relationship
                    .data
                    .clone()
                    .map(Linkage::into_locators)
                    .unwrap_or_default();
                Ok((def, locators))
            })
            .collect::<Result<Vec<_>, TrellisError>>()?;
        self.create_row(schema, input, links)
    }

    /// Read one row with the given relationships loaded.
    pub fn fetch(
        &self,
        resource_type: &str,
        id: &str,
        include: &IncludeTree,
    ) -> Result<Row, TrellisError> {
        self.schema_for(resource_type)?;
        let tables = self.read()?;
        self.snapshot(&tables, resource_type, id, include)
            .ok_or_else(|| missing_one(&Locator::new(resource_type, id)))
    }

    /// Read several rows in request order; fails if any is missing.
    pub fn fetch_many(
        &self,
        resource_type: &str,
        ids: &[String],
        include: &IncludeTree,
    ) -> Result<Vec<Row>, TrellisError> {
        self.schema_for(resource_type)?;
        let tables = self.read()?;

        let mut rows = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        for id in ids {
            match self.snapshot(&tables, resource_type, id, include) {
                Some(row) => rows.push(row),
                None => missing.push(Locator::new(resource_type, id)),
            }
        }

        if missing.is_empty() {
            Ok(rows)
        } else {
            Err(missing_many(&missing))
        }
    }

    /// Read every row matching the filter, ordered by id.
    pub fn list(
        &self,
        resource_type: &str,
        options: &QueryOptions,
    ) -> Result<Vec<Row>, TrellisError> {
        let schema = self.schema_for(resource_type)?;
        if let Some(key) = options
            .filter
            .keys()
            .find(|key| key.as_str() != ID_FILTER && !schema.has_attribute(key))
        {
            return Err(TrellisError::bad_request(
                "Invalid filter",
                Some(format!(
                    "Unknown attribute \"{}\" on resource type \"{}\"",
                    key, resource_type
                )),
            ));
        }

        let tables = self.read()?;
        let Some(table) = tables.get(resource_type) else {
            return Ok(Vec::new());
        };
        Ok(table
            .rows
            .iter()
            .filter(|(id, row)| {
                options
                    .filter
                    .iter()
                    .all(|(key, value)| matches_filter(id, row, key, value))
            })
            .filter_map(|(id, _)| self.snapshot(&tables, resource_type, id, &options.include))
            .collect())
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, TrellisError> {
        self.tables
            .read()
            .map_err(|_| TrellisError::Storage("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, TrellisError> {
        self.tables
            .write()
            .map_err(|_| TrellisError::Storage("memory store lock poisoned".to_string()))
    }

    fn schema_for(&self, resource_type: &str) -> Result<&TableSchema, TrellisError> {
        self.schemas
            .get(resource_type)
            .ok_or_else(|| TrellisError::UnknownResourceType(resource_type.to_string()))
    }

    fn snapshot(
        &self,
        tables: &Tables,
        resource_type: &str,
        id: &str,
        include: &IncludeTree,
    ) -> Option<Row> {
        let schema = self.schemas.get(resource_type)?;
        let stored = tables.get(resource_type)?.rows.get(id)?;

        let relations = include
            .iter()
            .filter_map(|(name, subtree)| {
                let def = schema.find_relationship(name)?;
                let rows = related_ids(tables, def, id, stored)
                    .iter()
                    .filter_map(|related| self.snapshot(tables, &def.target, related, subtree))
                    .map(Arc::new)
                    .collect();
                Some(RowRelation {
                    name: def.name.clone(),
                    target: def.target.clone(),
                    to_many: def.kind.is_to_many(),
                    rows,
                })
            })
            .collect();

        Some(Row {
            resource_type: schema.resource_type.clone(),
            id: id.to_string(),
            attributes: stored.attributes.clone(),
            relations,
        })
    }

    fn create_row(
        &self,
        schema: &TableSchema,
        input: &ResourceInput,
        links: Vec<(&RelationshipDef, Vec<Locator>)>,
    ) -> Result<Row, TrellisError> {
        if input.resource_type != schema.resource_type {
            return Err(TrellisError::bad_request(
                "Invalid resource type",
                Some(format!(
                    "Expected \"{}\", got \"{}\"",
                    schema.resource_type, input.resource_type
                )),
            ));
        }
        for (def, locators) in &links {
            check_related(def, locators)?;
        }

        let mut tables = self.write()?;
        for (def, locators) in &links {
            ensure_rows_exist(&tables, &def.target, &ids_of(locators))?;
        }

        let table = table_mut(&mut tables, &schema.resource_type)?;
        let id = match &input.id {
            Some(id) if table.rows.contains_key(id) => {
                return Err(TrellisError::bad_request(
                    "Resource already exists",
                    Some(format!(
                        "Resource already exists: {}",
                        Locator::new(&schema.resource_type, id)
                    )),
                ));
            }
            Some(id) => id.clone(),
            None => table.generate_id(),
        };

        let attributes = schema
            .attributes
            .iter()
            .map(|name| {
                let value = input.attributes.get(name).cloned().unwrap_or(Value::Null);
                (name.clone(), value)
            })
            .collect();
        table.rows.insert(
            id.clone(),
            StoredRow {
                attributes,
                foreign_keys: BTreeMap::new(),
            },
        );

        for (def, locators) in &links {
            apply_replace(&mut tables, &schema.resource_type, &id, def, &ids_of(locators))?;
        }

        self.snapshot(&tables, &schema.resource_type, &id, &IncludeTree::new())
            .ok_or_else(|| missing_one(&Locator::new(&schema.resource_type, &id)))
    }

    fn update_row(
        &self,
        resource_type: &str,
        id: &str,
        attributes: &Map<String, Value>,
    ) -> Result<Row, TrellisError> {
        let schema = self.schema_for(resource_type)?;
        let mut tables = self.write()?;
        let row = table_mut(&mut tables, resource_type)?
            .rows
            .get_mut(id)
            .ok_or_else(|| missing_one(&Locator::new(resource_type, id)))?;

        for name in &schema.attributes {
            if let Some(value) = attributes.get(name) {
                row.attributes.insert(name.clone(), value.clone());
            }
        }

        self.snapshot(&tables, resource_type, id, &IncludeTree::new())
            .ok_or_else(|| missing_one(&Locator::new(resource_type, id)))
    }

    fn delete_row(&self, resource_type: &str, id: &str) -> Result<(), TrellisError> {
        let mut tables = self.write()?;
        table_mut(&mut tables, resource_type)?
            .rows
            .remove(id)
            .ok_or_else(|| missing_one(&Locator::new(resource_type, id)))?;

        for schema in self.schemas.values() {
            for def in &schema.relationships {
                if def.kind != RelationshipKind::BelongsTo || def.target != resource_type {
                    continue;
                }
                for row in table_mut(&mut tables, &schema.resource_type)?.rows.values_mut() {
                    if row.points_to(&def.name, id) {
                        row.foreign_keys.remove(&def.name);
                    }
                }
            }
        }
        Ok(())
    }

    fn mutate_relationship(
        &self,
        resource_type: &str,
        id: &str,
        def: &RelationshipDef,
        locators: &[Locator],
        mutation: Mutation,
    ) -> Result<(), TrellisError> {
        check_related(def, locators)?;
        if mutation != Mutation::Replace && !def.kind.is_to_many() {
            return Err(TrellisError::UnsupportedRelationshipCardinality {
                relationship: def.name.clone(),
                reason: "only to-many relationships accept added or removed resources"
                    .to_string(),
            });
        }

        let ids = ids_of(locators);
        let mut tables = self.write()?;
        if !tables
            .get(resource_type)
            .is_some_and(|table| table.rows.contains_key(id))
        {
            return Err(missing_one(&Locator::new(resource_type, id)));
        }
        ensure_rows_exist(&tables, &def.target, &ids)?;

        match mutation {
            Mutation::Replace => apply_replace(&mut tables, resource_type, id, def, &ids),
            Mutation::Add => {
                let inverse = inverse_of(def)?;
                let target = table_mut(&mut tables, &def.target)?;
                for related in &ids {
                    if let Some(row) = target.rows.get_mut(related) {
                        row.foreign_keys.insert(inverse.to_string(), id.to_string());
                    }
                }
                Ok(())
            }
            Mutation::Remove => {
                let inverse = inverse_of(def)?;
                let target = table_mut(&mut tables, &def.target)?;
                for related in &ids {
                    if let Some(row) = target.rows.get_mut(related)
                        && row.points_to(inverse, id)
                    {
                        row.foreign_keys.remove(inverse);
                    }
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mutation {
    Replace,
    Add,
    Remove,
}

fn relationship_def<'s>(
    schema: &'s TableSchema,
    name: &str,
) -> Result<&'s RelationshipDef, TrellisError> {
    schema
        .find_relationship(name)
        .ok_or_else(|| TrellisError::UnknownRelationship {
            resource_type: schema.resource_type.clone(),
            relationship: name.to_string(),
        })
}

/// Ids of the rows related to `owner_id` through `def`, ordered by id.
fn related_ids(tables: &Tables, def: &RelationshipDef, owner_id: &str, owner: &StoredRow) -> Vec<String> {
    match def.kind {
        RelationshipKind::BelongsTo => owner
            .foreign_keys
            .get(&def.name)
            .cloned()
            .into_iter()
            .collect(),
        RelationshipKind::HasOne | RelationshipKind::HasMany => {
            let Some(inverse) = def.inverse.as_deref() else {
                return Vec::new();
            };
            let mut ids: Vec<String> = tables
                .get(&def.target)
                .map(|table| {
                    table
                        .rows
                        .iter()
                        .filter(|(_, row)| row.points_to(inverse, owner_id))
                        .map(|(id, _)| id.clone())
                        .collect()
                })
                .unwrap_or_default();
            if def.kind == RelationshipKind::HasOne {
                ids.truncate(1);
            }
            ids
        }
    }
}

/// Make `ids` the complete set of rows related to the owner through `def`.
fn apply_replace(
    tables: &mut Tables,
    owner_type: &str,
    owner_id: &str,
    def: &RelationshipDef,
    ids: &[String],
) -> Result<(), TrellisError> {
    match def.kind {
        RelationshipKind::BelongsTo => {
            let owner = table_mut(tables, owner_type)?
                .rows
                .get_mut(owner_id)
                .ok_or_else(|| missing_one(&Locator::new(owner_type, owner_id)))?;
            match ids.first() {
                Some(target) => {
                    owner.foreign_keys.insert(def.name.clone(), target.clone());
                }
                None => {
                    owner.foreign_keys.remove(&def.name);
                }
            }
        }
        RelationshipKind::HasOne | RelationshipKind::HasMany => {
            let inverse = inverse_of(def)?;
            let target = table_mut(tables, &def.target)?;
            for row in target.rows.values_mut() {
                if row.points_to(inverse, owner_id) {
                    row.foreign_keys.remove(inverse);
                }
            }
            for related in ids {
                if let Some(row) = target.rows.get_mut(related) {
                    row.foreign_keys
                        .insert(inverse.to_string(), owner_id.to_string());
                }
            }
        }
    }
    Ok(())
}

fn fetched_locators(related: &[FetchedResource]) -> Vec<Locator> {
    related.iter().map(|fetched| fetched.locator.clone()).collect()
}

// =============================================================================
// STORE BACKEND
// =============================================================================

/// The backend serving one table of a `MemoryStore`.
#[derive(Debug, Clone)]
pub struct StoreBackend {
    store: Arc<MemoryStore>,
    resource_type: String,
}

impl StoreBackend {
    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    fn schema(&self) -> Result<&TableSchema, TrellisError> {
        self.store.schema_for(&self.resource_type)
    }

    fn relationship(&self, name: &str) -> Result<&RelationshipDef, TrellisError> {
        relationship_def(self.schema()?, name)
    }

    /// Rows of other tables share the native type; refuse them here.
    fn own<'r>(&self, row: &'r Row) -> Result<&'r Row, TrellisError> {
        if row.resource_type == self.resource_type {
            Ok(row)
        } else {
            Err(TrellisError::ResourceMismatch(self.resource_type.clone()))
        }
    }

    fn mutate(
        &self,
        row: &Row,
        relationship: &str,
        related: &[FetchedResource],
        mutation: Mutation,
    ) -> Result<(), TrellisError> {
        let row = self.own(row)?;
        let def = self.relationship(relationship)?;
        self.store.mutate_relationship(
            &self.resource_type,
            &row.id,
            def,
            &fetched_locators(related),
            mutation,
        )
    }
}

#[async_trait]
impl Backend for StoreBackend {
    type Resource = Row;

    fn resource_type(&self) -> &str {
        &self.resource_type
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    fn id(&self, _ctx: &Context, row: &Row) -> String {
        row.id.clone()
    }

    fn attributes(&self, _ctx: &Context, row: &Row) -> Attributes {
        row.attributes.clone().into()
    }

    fn relationships(
        &self,
        _ctx: &Context,
        row: &Row,
        linker: &RelationshipLinker<'_>,
    ) -> Relationships {
        let mut relationships = Relationships::new();
        for relation in &row.relations {
            let resources = if relation.to_many {
                Resources::Many(relation.rows.iter().map(|r| Arc::clone(r) as AnyResource).collect())
            } else {
                relation
                    .rows
                    .first()
                    .map_or(Resources::Null, |r| Resources::One(Arc::clone(r) as AnyResource))
            };
            relationships.insert(
                relation.name.clone(),
                RelationshipEntry::expand(Related::new(resources, &relation.target))
                    .with_link(linker.link_for(&relation.name)),
            );
        }
        relationships
    }

    async fn index(&self, _ctx: &Context, options: &QueryOptions) -> Result<Vec<Row>, TrellisError> {
        self.store.list(&self.resource_type, options)
    }

    async fn get_one(
        &self,
        _ctx: &Context,
        id: &str,
        options: &QueryOptions,
    ) -> Result<Row, TrellisError> {
        self.store.fetch(&self.resource_type, id, &options.include)
    }

    async fn get_many(
        &self,
        _ctx: &Context,
        ids: &[String],
        options: &QueryOptions,
    ) -> Result<Vec<Row>, TrellisError> {
        self.store
            .fetch_many(&self.resource_type, ids, &options.include)
    }

    async fn create(
        &self,
        _ctx: &Context,
        input: &ResourceInput,
        related: &RelatedResources,
    ) -> Result<Row, TrellisError> {
        let schema = self.schema()?;
        let links = input
            .relationships
            .keys()
            .map(|name| {
                let def = relationship_def(schema, name)?;
                let locators = related
                    .get(name)
                    .map(|fetched| fetched_locators(fetched))
                    .unwrap_or_default();
                Ok((def, locators))
            })
            .collect::<Result<Vec<_>, TrellisError>>()?;
        self.store.create_row(schema, input, links)
    }

    async fn update(
        &self,
        _ctx: &Context,
        row: &Row,
        input: &ResourceInput,
    ) -> Result<Row, TrellisError> {
        let row = self.own(row)?;
        self.store
            .update_row(&self.resource_type, &row.id, &input.attributes)
    }

    async fn delete(&self, _ctx: &Context, row: &Row) -> Result<(), TrellisError> {
        let row = self.own(row)?;
        self.store.delete_row(&self.resource_type, &row.id)
    }

    async fn relationship_replace(
        &self,
        _ctx: &Context,
        row: &Row,
        relationship: &str,
        related: &[FetchedResource],
    ) -> Result<(), TrellisError> {
        self.mutate(row, relationship, related, Mutation::Replace)
    }

    async fn relationship_add(
        &self,
        _ctx: &Context,
        row: &Row,
        relationship: &str,
        related: &[FetchedResource],
    ) -> Result<(), TrellisError> {
        self.mutate(row, relationship, related, Mutation::Add)
    }

    async fn relationship_remove(
        &self,
        _ctx: &Context,
        row: &Row,
        relationship: &str,
        related: &[FetchedResource],
    ) -> Result<(), TrellisError> {
        self.mutate(row, relationship, related, Mutation::Remove)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schemas() -> Vec<TableSchema> {
        vec![
            TableSchema::new("User")
                .attribute("username")
                .relationship(RelationshipDef::has_many("Posts", "Post", "User")),
            TableSchema::new("Post")
                .attribute("name")
                .relationship(RelationshipDef::belongs_to("User", "User")),
        ]
    }

    fn input(value: Value) -> ResourceInput {
        serde_json::from_value(value).unwrap()
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new(schemas()).unwrap();
        for user in ["userA", "userB"] {
            store
                .insert(&input(json!({ "type": "User", "id": user, "attributes": { "username": user } })))
                .unwrap();
        }
        store
            .insert(&input(json!({
                "type": "Post", "id": "postA", "attributes": { "name": "Post A" },
                "relationships": { "User": { "data": { "type": "User", "id": "userA" } } }
            })))
            .unwrap();
        store
            .insert(&input(json!({ "type": "Post", "id": "postB", "attributes": { "name": "Post B" } })))
            .unwrap();
        store
    }

    fn include(path: &str) -> IncludeTree {
        QueryOptions::parse([("include", path)]).unwrap().include
    }

    fn related(row: &Row, name: &str) -> Vec<String> {
        row.relation(name)
            .unwrap()
            .rows
            .iter()
            .map(|r| r.id.clone())
            .collect()
    }

    #[test]
    fn schema_requires_known_targets() {
        let result = MemoryStore::new(vec![
            TableSchema::new("Post").relationship(RelationshipDef::belongs_to("User", "User")),
        ]);
        assert!(matches!(result, Err(TrellisError::Config(_))));
    }

    #[test]
    fn schema_requires_belongs_to_inverse() {
        let result = MemoryStore::new(vec![
            TableSchema::new("User")
                .relationship(RelationshipDef::has_many("Posts", "Post", "Author")),
            TableSchema::new("Post"),
        ]);
        assert!(matches!(result, Err(TrellisError::Config(_))));
    }

    #[test]
    fn schema_rejects_duplicate_tables() {
        let result = MemoryStore::new(vec![TableSchema::new("User"), TableSchema::new("User")]);
        assert!(matches!(result, Err(TrellisError::Config(_))));
    }

    #[test]
    fn missing_attributes_are_stored_as_null() {
        let store = seeded();
        let row = store
            .insert(&input(json!({ "type": "User", "id": "userC" })))
            .unwrap();
        assert_eq!(row.attributes.get("username"), Some(&Value::Null));
    }

    #[test]
    fn generated_ids_are_unique() {
        let store = seeded();
        let a = store.insert(&input(json!({ "type": "Post" }))).unwrap();
        let b = store.insert(&input(json!({ "type": "Post" }))).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.count("Post").unwrap(), 4);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let store = seeded();
        let result = store.insert(&input(json!({ "type": "User", "id": "userA" })));
        assert!(matches!(result, Err(TrellisError::BadRequest { .. })));
    }

    #[test]
    fn fetch_loads_only_included_relationships() {
        let store = seeded();
        let plain = store.fetch("User", "userA", &IncludeTree::new()).unwrap();
        assert!(plain.relations.is_empty());

        let with_posts = store.fetch("User", "userA", &include("Posts.User")).unwrap();
        assert_eq!(related(&with_posts, "Posts"), vec!["postA"]);
        let post = &with_posts.relation("Posts").unwrap().rows[0];
        assert_eq!(related(post, "User"), vec!["userA"]);
    }

    #[test]
    fn unknown_includes_are_skipped() {
        let store = seeded();
        let row = store.fetch("User", "userA", &include("Nope")).unwrap();
        assert!(row.relations.is_empty());
    }

    #[test]
    fn fetch_missing_row_reports_locator() {
        let store = seeded();
        match store.fetch("User", "ghost", &IncludeTree::new()) {
            Err(TrellisError::NotFound { title, details }) => {
                assert_eq!(title.as_deref(), Some("Resource not found"));
                assert_eq!(details.as_deref(), Some("Resource not found: <User#ghost>"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn fetch_many_is_all_or_nothing() {
        let store = seeded();
        let ids = vec!["userB".to_string(), "x".to_string(), "userA".to_string(), "y".to_string()];
        match store.fetch_many("User", &ids, &IncludeTree::new()) {
            Err(TrellisError::NotFound { details, .. }) => {
                assert_eq!(
                    details.as_deref(),
                    Some("Resources not found: <User#x>, <User#y>")
                );
            }
            other => panic!("unexpected {:?}", other),
        }

        let ids = vec!["userB".to_string(), "userA".to_string()];
        let rows = store.fetch_many("User", &ids, &IncludeTree::new()).unwrap();
        assert_eq!(rows[0].id, "userB");
        assert_eq!(rows[1].id, "userA");
    }

    #[test]
    fn list_filters_on_attributes() {
        let store = seeded();
        let options = QueryOptions::parse([("filter.username", "userB")]).unwrap();
        let rows = store.list("User", &options).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "userB");

        let bad = QueryOptions::parse([("filter.password", "x")]).unwrap();
        assert!(matches!(
            store.list("User", &bad),
            Err(TrellisError::BadRequest { .. })
        ));
    }

    #[test]
    fn update_merges_public_attributes() {
        let store = seeded();
        let mut attributes = Map::new();
        attributes.insert("username".to_string(), json!("renamed"));
        attributes.insert("secret".to_string(), json!("ignored"));
        let row = store.update_row("User", "userA", &attributes).unwrap();
        assert_eq!(row.attributes.get("username"), Some(&json!("renamed")));
        assert!(row.attributes.get("secret").is_none());
    }

    #[test]
    fn delete_clears_dangling_foreign_keys() {
        let store = seeded();
        store.delete_row("User", "userA").unwrap();
        let post = store.fetch("Post", "postA", &include("User")).unwrap();
        assert!(related(&post, "User").is_empty());
    }

    #[test]
    fn replace_to_one_rejects_many() {
        let store = seeded();
        let def = RelationshipDef::belongs_to("User", "User");
        let locators = vec![Locator::new("User", "userA"), Locator::new("User", "userB")];
        let result =
            store.mutate_relationship("Post", "postA", &def, &locators, Mutation::Replace);
        assert!(matches!(
            result,
            Err(TrellisError::UnsupportedRelationshipCardinality { .. })
        ));
    }

    #[test]
    fn replace_rejects_wrong_types() {
        let store = seeded();
        let def = RelationshipDef::belongs_to("User", "User");
        let locators = vec![Locator::new("Post", "postB")];
        let result =
            store.mutate_relationship("Post", "postA", &def, &locators, Mutation::Replace);
        assert!(matches!(result, Err(TrellisError::BadRequest { .. })));
    }

    #[test]
    fn has_many_replace_add_remove() {
        let store = seeded();
        let def = store
            .schema("User")
            .and_then(|s| s.find_relationship("Posts"))
            .cloned()
            .unwrap();

        store
            .mutate_relationship("User", "userA", &def, &[Locator::new("Post", "postB")], Mutation::Replace)
            .unwrap();
        let user = store.fetch("User", "userA", &include("Posts")).unwrap();
        assert_eq!(related(&user, "Posts"), vec!["postB"]);

        store
            .mutate_relationship("User", "userA", &def, &[Locator::new("Post", "postA")], Mutation::Add)
            .unwrap();
        let user = store.fetch("User", "userA", &include("Posts")).unwrap();
        assert_eq!(related(&user, "Posts"), vec!["postA", "postB"]);

        store
            .mutate_relationship("User", "userA", &def, &[Locator::new("Post", "postB")], Mutation::Remove)
            .unwrap();
        let user = store.fetch("User", "userA", &include("Posts")).unwrap();
        assert_eq!(related(&user, "Posts"), vec!["postA"]);
    }

    #[test]
    fn add_to_one_is_rejected() {
        let store = seeded();
        let def = RelationshipDef::belongs_to("User", "User");
        let result = store.mutate_relationship(
            "Post",
            "postB",
            &def,
            &[Locator::new("User", "userA")],
            Mutation::Add,
        );
        assert!(matches!(
            result,
            Err(TrellisError::UnsupportedRelationshipCardinality { .. })
        ));
    }

    #[test]
    fn schema_deserializes_from_toml_shape() {
        let schema: TableSchema = serde_json::from_value(json!({
            "type": "User",
            "attributes": ["username"],
            "relationships": [{ "name": "Posts", "target": "Post", "kind": "has_many", "inverse": "User" }]
        }))
        .unwrap();
        assert_eq!(
            schema.find_relationship("Posts").map(|d| d.kind),
            Some(RelationshipKind::HasMany)
        );
    }
}
