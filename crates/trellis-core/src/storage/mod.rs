//! # Storage
//!
//! Reference backends shipped with the engine.
//!
//! - `MemoryStore`: relational tables kept in memory, with belongs-to,
//!   has-one and has-many associations and eager include loading

pub mod memory;

pub use memory::{
    MemoryStore, RelationshipDef, RelationshipKind, Row, RowRelation, StoreBackend, TableSchema,
};
