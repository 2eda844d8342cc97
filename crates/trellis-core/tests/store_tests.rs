//! # Memory Store Tests
//!
//! The in-memory store driven through the type-erased backend contract, the
//! way request handlers use it.

#![allow(clippy::unwrap_used, clippy::panic)]

use serde_json::json;
use std::sync::Arc;
use trellis_core::{
    Capability, Document, JsonApi, Linkage, Locator, MemoryStore, QueryOptions, Registry,
    RelationshipDef, ResourceInput, Resources, TableSchema, TrellisError,
};

fn schemas() -> Vec<TableSchema> {
    vec![
        TableSchema::new("User")
            .attribute("username")
            .relationship(RelationshipDef::has_many("Posts", "Post", "User"))
            .relationship(RelationshipDef::has_many("Comments", "Comment", "User")),
        TableSchema::new("Post")
            .attribute("name")
            .attribute("text")
            .relationship(RelationshipDef::belongs_to("User", "User"))
            .relationship(RelationshipDef::has_many("Comments", "Comment", "Post")),
        TableSchema::new("Comment")
            .attribute("text")
            .relationship(RelationshipDef::belongs_to("User", "User"))
            .relationship(RelationshipDef::belongs_to("Post", "Post")),
    ]
}

fn input(value: serde_json::Value) -> ResourceInput {
    serde_json::from_value(value).unwrap()
}

fn setup() -> JsonApi {
    let store = Arc::new(MemoryStore::new(schemas()).unwrap());
    let seed = [
        json!({ "type": "User", "id": "userA", "attributes": { "username": "User A" } }),
        json!({ "type": "User", "id": "userB", "attributes": { "username": "User B" } }),
        json!({ "type": "User", "id": "userC", "attributes": { "username": "User C" } }),
        json!({ "type": "Post", "id": "postA", "attributes": { "name": "Post A" },
                "relationships": { "User": { "data": { "type": "User", "id": "userA" } } } }),
        json!({ "type": "Post", "id": "postB", "attributes": { "name": "Post B" },
                "relationships": { "User": { "data": { "type": "User", "id": "userB" } } } }),
        json!({ "type": "Post", "id": "postC", "attributes": { "name": "Post C" } }),
        json!({ "type": "Comment", "id": "commentA", "attributes": { "text": "Comment A" },
                "relationships": { "User": { "data": { "type": "User", "id": "userA" } },
                                   "Post": { "data": { "type": "Post", "id": "postA" } } } }),
        json!({ "type": "Comment", "id": "commentB", "attributes": { "text": "Comment B" },
                "relationships": { "User": { "data": { "type": "User", "id": "userA" } },
                                   "Post": { "data": { "type": "Post", "id": "postA" } } } }),
    ];
    for value in seed {
        store.insert(&input(value)).unwrap();
    }

    let mut registry = Registry::new();
    store.register(&mut registry).unwrap();
    JsonApi::new(registry, "/")
}

async fn get(api: &JsonApi, resource_type: &str, id: &str, include: &str) -> Document {
    let ctx = api.context();
    let options = QueryOptions::parse([("include", include)]).unwrap();
    let row = api
        .backend(resource_type)
        .unwrap()
        .get_one(&ctx, id, &options)
        .await
        .unwrap();
    api.normalize_resource(&ctx, Resources::One(row), resource_type)
        .await
        .unwrap()
}

fn relationship_data(document: &Document, name: &str) -> Option<Linkage> {
    document
        .primary()
        .next()
        .and_then(|r| r.relationships.get(name))
        .and_then(|r| r.data.clone())
}

async fn replace(api: &JsonApi, resource_type: &str, id: &str, name: &str, related: &[Locator]) {
    let ctx = api.context();
    let backend = api.backend(resource_type).unwrap();
    let subject = backend
        .get_one(&ctx, id, &QueryOptions::default())
        .await
        .unwrap();
    let fetched = api.fetch_resources(&ctx, related).await.unwrap();
    backend
        .relationship_replace(&ctx, &subject, name, &fetched)
        .await
        .unwrap();
}

#[tokio::test]
async fn store_backends_support_every_capability() {
    let api = setup();
    let backend = api.backend("Post").unwrap();
    for capability in Capability::ALL {
        assert!(backend.capabilities().supports(capability));
    }
}

#[tokio::test]
async fn resources_without_include_have_no_relationships() {
    let api = setup();
    let document = get(&api, "User", "userA", "").await;

    let value = serde_json::to_value(&document).unwrap();
    assert_eq!(value["data"]["attributes"], json!({ "username": "User A" }));
    assert_eq!(value["data"]["relationships"], json!({}));
    assert_eq!(value["included"], json!([]));
}

#[tokio::test]
async fn included_to_many_is_sorted_by_id() {
    let api = setup();
    let document = get(&api, "Post", "postA", "Comments,User").await;

    assert_eq!(
        relationship_data(&document, "Comments"),
        Some(Linkage::Many(vec![
            Locator::new("Comment", "commentA"),
            Locator::new("Comment", "commentB"),
        ]))
    );
    let included: Vec<String> = document
        .included
        .iter()
        .map(|r| r.locator().to_string())
        .collect();
    assert_eq!(
        included,
        vec!["<Comment#commentA>", "<Comment#commentB>", "<User#userA>"]
    );
}

#[tokio::test]
async fn nested_include_reaches_second_level() {
    let api = setup();
    let document = get(&api, "User", "userA", "Posts.Comments").await;

    let included: Vec<String> = document
        .included
        .iter()
        .map(|r| r.locator().to_string())
        .collect();
    assert_eq!(
        included,
        vec!["<Post#postA>", "<Comment#commentA>", "<Comment#commentB>"]
    );
}

#[tokio::test]
async fn replacing_to_many_with_nothing_clears_it() {
    let api = setup();
    replace(&api, "User", "userA", "Posts", &[]).await;

    let document = get(&api, "User", "userA", "Posts").await;
    assert_eq!(
        relationship_data(&document, "Posts"),
        Some(Linkage::Many(Vec::new()))
    );
    assert!(document.included.is_empty());
}

#[tokio::test]
async fn replacing_to_one_moves_the_link() {
    let api = setup();
    replace(&api, "Post", "postA", "User", &[Locator::new("User", "userB")]).await;

    let document = get(&api, "Post", "postA", "User").await;
    assert_eq!(
        relationship_data(&document, "User"),
        Some(Linkage::One(Locator::new("User", "userB")))
    );

    replace(&api, "Post", "postA", "User", &[]).await;
    let document = get(&api, "Post", "postA", "User").await;
    assert_eq!(relationship_data(&document, "User"), None);
}

#[tokio::test]
async fn create_links_fetched_relationships() {
    let api = setup();
    let ctx = api.context();
    let body = input(json!({
        "type": "Comment",
        "id": "commentNew",
        "relationships": { "Post": { "data": { "type": "Post", "id": "postC" } } }
    }));
    let fetched = api
        .fetch_resources(&ctx, &[Locator::new("Post", "postC")])
        .await
        .unwrap();
    let related = [("Post".to_string(), fetched)].into_iter().collect();

    api.backend("Comment")
        .unwrap()
        .create(&ctx, &body, &related)
        .await
        .unwrap();

    let document = get(&api, "Comment", "commentNew", "Post").await;
    assert_eq!(
        relationship_data(&document, "Post"),
        Some(Linkage::One(Locator::new("Post", "postC")))
    );
}

#[tokio::test]
async fn create_rejects_unknown_relationships() {
    let api = setup();
    let ctx = api.context();
    let body = input(json!({
        "type": "Comment",
        "relationships": { "Author": { "data": null } }
    }));

    let result = api
        .backend("Comment")
        .unwrap()
        .create(&ctx, &body, &Default::default())
        .await;

    assert!(matches!(
        result,
        Err(TrellisError::UnknownRelationship { relationship, .. }) if relationship == "Author"
    ));
}

#[tokio::test]
async fn delete_makes_resource_unreachable() {
    let api = setup();
    let ctx = api.context();
    let backend = api.backend("User").unwrap();
    let user = backend
        .get_one(&ctx, "userA", &QueryOptions::default())
        .await
        .unwrap();

    backend.delete(&ctx, &user).await.unwrap();

    match backend.get_one(&ctx, "userA", &QueryOptions::default()).await {
        Err(TrellisError::NotFound { title, details }) => {
            assert_eq!(title.as_deref(), Some("Resource not found"));
            assert_eq!(details.as_deref(), Some("Resource not found: <User#userA>"));
        }
        other => panic!("unexpected {:?}", other.map(|_| ())),
    }

    let document = get(&api, "Post", "postA", "User").await;
    assert_eq!(relationship_data(&document, "User"), None);
}

#[tokio::test]
async fn rows_of_other_tables_are_rejected() {
    let api = setup();
    let ctx = api.context();
    let comment = api
        .backend("Comment")
        .unwrap()
        .get_one(&ctx, "commentA", &QueryOptions::default())
        .await
        .unwrap();

    let fetched = api
        .fetch_resources(&ctx, &[Locator::new("Post", "postC")])
        .await
        .unwrap();
    let result = api
        .backend("User")
        .unwrap()
        .relationship_add(&ctx, &comment, "Posts", &fetched)
        .await;

    assert!(matches!(result, Err(TrellisError::ResourceMismatch(t)) if t == "User"));
}
