//! # API Endpoint Handlers
//!
//! Every handler resolves the backend for its `{collection}`, checks the
//! capability it needs, calls the backend through the type-erased contract
//! and answers with a normalized document.

use super::{
    AppState,
    error::ApiError,
    types::{HealthResponse, RelationshipBody, ResourceBody},
};
use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use futures::future::try_join_all;
use std::sync::Arc;
use trellis_core::{
    Capability, Context, Document, DynBackend, JsonApi, QueryOptions, RelatedResources,
    Resources, ResourceInput, TrellisError,
};

type QueryPairs = Query<Vec<(String, String)>>;

// =============================================================================
// SHARED STEPS
// =============================================================================

/// Re-read a resource with the request's options and normalize it.
async fn read_back(
    api: &JsonApi,
    ctx: &Context,
    backend: &Arc<dyn DynBackend>,
    id: &str,
    options: &QueryOptions,
) -> Result<Document, TrellisError> {
    let resource = backend.get_one(ctx, id, options).await?;
    api.normalize_resource(ctx, Resources::One(resource), backend.resource_type())
        .await
}

/// Fetch the resources named by each relationship of a create body.
async fn fetch_relationships(
    api: &JsonApi,
    ctx: &Context,
    input: &ResourceInput,
) -> Result<RelatedResources, TrellisError> {
    let fetches = input.relationships.iter().map(|(name, relationship)| async move {
        let locators = relationship
            .data
            .clone()
            .map(|linkage| linkage.into_locators())
            .unwrap_or_default();
        let fetched = api.fetch_resources(ctx, &locators).await?;
        Ok::<_, TrellisError>((name.clone(), fetched))
    });

    Ok(try_join_all(fetches).await?.into_iter().collect())
}

/// The route and the body must name the same resource type.
fn check_type(backend: &Arc<dyn DynBackend>, input: &ResourceInput) -> Result<(), TrellisError> {
    if input.resource_type != backend.resource_type() {
        return Err(TrellisError::bad_request(
            "Mismatching resource type",
            Some(format!(
                "Expected \"{}\", got \"{}\"",
                backend.resource_type(),
                input.resource_type
            )),
        ));
    }
    Ok(())
}

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// COLLECTION HANDLERS
// =============================================================================

/// `GET /{collection}`
pub async fn index_handler(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Query(query): QueryPairs,
) -> Result<Json<Document>, ApiError> {
    let backend = state.backend(&collection, Capability::Index)?;
    let options = QueryOptions::parse(query)?;
    let ctx = state.api.context();

    let resources = backend.index(&ctx, &options).await?;
    let document = state
        .api
        .normalize_resource(&ctx, Resources::Many(resources), backend.resource_type())
        .await?;

    Ok(Json(document))
}

/// `POST /{collection}`
///
/// Body relationships are fetched before the backend sees the input; the
/// created resource is re-read with the request's include tree.
pub async fn create_handler(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Query(query): QueryPairs,
    body: Result<Json<ResourceBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    let backend = state.backend(&collection, Capability::Create)?;
    let options = QueryOptions::parse(query)?;
    let Json(body) = body?;
    body.validate_create()?;
    check_type(&backend, &body.data)?;

    let ctx = state.api.context();
    let related = fetch_relationships(&state.api, &ctx, &body.data).await?;
    let created = backend.create(&ctx, &body.data, &related).await?;
    let id = backend.id(&ctx, &created)?;

    tracing::info!(resource_type = backend.resource_type(), id = %id, "Created resource");

    let document = read_back(&state.api, &ctx, &backend, &id, &options).await?;
    Ok((StatusCode::CREATED, Json(document)))
}

// =============================================================================
// RESOURCE HANDLERS
// =============================================================================

/// `GET /{collection}/{id}`
pub async fn get_handler(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    Query(query): QueryPairs,
) -> Result<Json<Document>, ApiError> {
    let backend = state.backend(&collection, Capability::GetOne)?;
    let options = QueryOptions::parse(query)?;
    let ctx = state.api.context();

    let document = read_back(&state.api, &ctx, &backend, &id, &options).await?;
    Ok(Json(document))
}

/// `PATCH /{collection}/{id}`
pub async fn update_handler(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    Query(query): QueryPairs,
    body: Result<Json<ResourceBody>, JsonRejection>,
) -> Result<Json<Document>, ApiError> {
    let backend = state.backend(&collection, Capability::Update)?;
    let options = QueryOptions::parse(query)?;
    let Json(body) = body?;
    body.validate_update()?;
    check_type(&backend, &body.data)?;

    if body.data.id.as_deref() != Some(id.as_str()) {
        return Err(TrellisError::bad_request(
            "Mismatching resource id",
            Some(format!("Expected \"{}\"", id)),
        )
        .into());
    }

    let ctx = state.api.context();
    let current = backend.get_one(&ctx, &id, &QueryOptions::new()).await?;
    let updated = backend.update(&ctx, &current, &body.data).await?;
    let id = backend.id(&ctx, &updated)?;

    let document = read_back(&state.api, &ctx, &backend, &id, &options).await?;
    Ok(Json(document))
}

/// `DELETE /{collection}/{id}`
pub async fn delete_handler(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let backend = state.backend(&collection, Capability::Delete)?;
    let ctx = state.api.context();

    let resource = backend.get_one(&ctx, &id, &QueryOptions::new()).await?;
    backend.delete(&ctx, &resource).await?;

    tracing::info!(resource_type = backend.resource_type(), id = %id, "Deleted resource");
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// RELATIONSHIP HANDLERS
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum Mutation {
    Replace,
    Add,
    Remove,
}

impl Mutation {
    fn capability(self) -> Capability {
        match self {
            Self::Replace => Capability::RelationshipReplace,
            Self::Add => Capability::RelationshipAdd,
            Self::Remove => Capability::RelationshipRemove,
        }
    }
}

/// Shared body of the three relationship routes.
///
/// The subject and the related resources are fetched concurrently; the
/// mutated relationship is always part of the returned document.
async fn mutate_relationship(
    state: AppState,
    (collection, id, relationship): (String, String, String),
    query: Vec<(String, String)>,
    body: Result<Json<RelationshipBody>, JsonRejection>,
    mutation: Mutation,
) -> Result<Json<Document>, ApiError> {
    let backend = state.backend(&collection, mutation.capability())?;
    let mut options = QueryOptions::parse(query)?;
    let Json(body) = body?;
    body.validate()?;
    options.include.ensure(relationship.clone());

    let ctx = state.api.context();
    let locators = body.locators();
    let subject_options = QueryOptions::new();
    let (subject, related) = futures::try_join!(
        backend.get_one(&ctx, &id, &subject_options),
        state.api.fetch_resources(&ctx, &locators),
    )?;

    match mutation {
        Mutation::Replace => {
            backend
                .relationship_replace(&ctx, &subject, &relationship, &related)
                .await?
        }
        Mutation::Add => {
            backend
                .relationship_add(&ctx, &subject, &relationship, &related)
                .await?
        }
        Mutation::Remove => {
            backend
                .relationship_remove(&ctx, &subject, &relationship, &related)
                .await?
        }
    }

    tracing::debug!(
        resource_type = backend.resource_type(),
        id = %id,
        relationship = %relationship,
        related = related.len(),
        "Mutated relationship"
    );

    let document = read_back(&state.api, &ctx, &backend, &id, &options).await?;
    Ok(Json(document))
}

/// `PATCH /{collection}/{id}/relationships/{relationship}`
pub async fn replace_relationship_handler(
    State(state): State<AppState>,
    Path(path): Path<(String, String, String)>,
    Query(query): QueryPairs,
    body: Result<Json<RelationshipBody>, JsonRejection>,
) -> Result<Json<Document>, ApiError> {
    mutate_relationship(state, path, query, body, Mutation::Replace).await
}

/// `POST /{collection}/{id}/relationships/{relationship}`
pub async fn add_relationship_handler(
    State(state): State<AppState>,
    Path(path): Path<(String, String, String)>,
    Query(query): QueryPairs,
    body: Result<Json<RelationshipBody>, JsonRejection>,
) -> Result<Json<Document>, ApiError> {
    mutate_relationship(state, path, query, body, Mutation::Add).await
}

/// `DELETE /{collection}/{id}/relationships/{relationship}`
pub async fn remove_relationship_handler(
    State(state): State<AppState>,
    Path(path): Path<(String, String, String)>,
    Query(query): QueryPairs,
    body: Result<Json<RelationshipBody>, JsonRejection>,
) -> Result<Json<Document>, ApiError> {
    mutate_relationship(state, path, query, body, Mutation::Remove).await
}
