//! # Demo Data Set
//!
//! Users, posts and comments:
//!
//! ```text
//! User     Posts ──► Post      Comments ──► Comment
//!  └─ Comments ─────────────────────────────► Comment
//! Post.User, Comment.User, Comment.Post are belongs_to
//! ```
//!
//! `trellis --demo` serves these tables with the rows below.

use serde_json::{Value, json};
use std::sync::Arc;
use trellis_core::{MemoryStore, RelationshipDef, ResourceInput, TableSchema, TrellisError};

use crate::config::{Seed, seed_store};

/// The demo table schemas.
#[must_use]
pub fn schemas() -> Vec<TableSchema> {
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

fn to_one(resource_type: &str, id: &str) -> Value {
    json!({ "data": { "type": resource_type, "id": id } })
}

fn user(id: &str, username: &str) -> Value {
    json!({ "type": "User", "id": id, "attributes": { "username": username } })
}

fn post(id: &str, name: &str, owner: Option<&str>) -> Value {
    let mut value = json!({ "type": "Post", "id": id, "attributes": { "name": name } });
    if let Some(owner) = owner {
        value["relationships"] = json!({ "User": to_one("User", owner) });
    }
    value
}

fn comment(id: &str, text: &str, owner: Option<&str>, parent: Option<&str>) -> Value {
    let mut relationships = serde_json::Map::new();
    if let Some(owner) = owner {
        relationships.insert("User".to_string(), to_one("User", owner));
    }
    if let Some(parent) = parent {
        relationships.insert("Post".to_string(), to_one("Post", parent));
    }
    json!({
        "type": "Comment",
        "id": id,
        "attributes": { "text": text },
        "relationships": relationships,
    })
}

/// The demo rows, in insertion order.
pub fn seed() -> Result<Seed, TrellisError> {
    let rows = [
        user("userA", "User A"),
        user("userB", "User B"),
        user("userC", "User C"),
        post("postA", "Post A", Some("userA")),
        post("postB", "Post B", Some("userB")),
        post("postC", "Post C", None),
        comment("commentA", "Comment A", Some("userA"), Some("postA")),
        comment("commentB", "Comment B", Some("userA"), Some("postA")),
        comment("commentC", "Comment C", Some("userB"), Some("postA")),
        comment("commentD", "Comment D", Some("userA"), Some("postB")),
        comment("commentE", "Comment E", None, None),
    ];

    let data = rows
        .into_iter()
        .map(serde_json::from_value::<ResourceInput>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TrellisError::Config(format!("Invalid demo row: {}", e)))?;
    Ok(Seed { data })
}

/// A store holding the demo tables and rows.
pub fn store() -> Result<Arc<MemoryStore>, TrellisError> {
    let store = Arc::new(MemoryStore::new(schemas())?);
    seed_store(&store, &seed()?)?;
    Ok(store)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn demo_store_holds_every_row() {
        let store = store().unwrap();
        assert_eq!(store.count("User").unwrap(), 3);
        assert_eq!(store.count("Post").unwrap(), 3);
        assert_eq!(store.count("Comment").unwrap(), 5);
    }

    #[test]
    fn demo_rows_are_linked() {
        let store = store().unwrap();
        let mut include = trellis_core::IncludeTree::new();
        include.ensure("Comments");

        let user = store.fetch("User", "userA", &include).unwrap();
        let comments = user.relation("Comments").unwrap();
        let ids: Vec<&str> = comments.rows.iter().map(|row| row.id.as_str()).collect();
        assert_eq!(ids, vec!["commentA", "commentB", "commentD"]);
    }
}
