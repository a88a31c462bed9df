//! QueryBridge Schema Discovery
//!
//! Introspects a relational data source on demand and produces a
//! normalized schema model: tables, columns with a small type taxonomy,
//! bounded sample rows, inferred relationships, and a vocabulary index
//! mapping business terms to schema elements.
//!
//! Discovery is read-only and partial-failure tolerant: one failing table
//! produces a warning, not an aborted schema.

pub mod discovery;
pub mod introspect;
pub mod schema;
pub mod synonyms;

pub use discovery::SchemaDiscovery;
pub use introspect::{
    connect_source, json_row, ForeignKey, MemoryBackend, PgExecutor, PgIntrospector,
    SchemaIntrospector, SqlExecutor,
};
pub use schema::{
    Column, ColumnRef, ColumnType, Relationship, RelationshipOrigin, SchemaMapping, SchemaModel,
    Table, VocabularyIndex,
};
pub use synonyms::SynonymDictionary;
