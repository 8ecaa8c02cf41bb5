//! linkage: relation metadata resolution and junction-table mutations.
//!
//! Given declarative metadata for entities and their relations (one-to-one,
//! one-to-many, many-to-one, many-to-many; owning or inverse side; single or
//! composite keys), linkage:
//!
//! - resolves a relation reference into a [`RelationDescriptor`]
//! - normalizes ids, key maps and records into [`KeyMap`]s
//! - sets and unsets foreign keys with one UPDATE
//! - adds and removes many-to-many links as junction rows
//! - reads the related keys of many-to-many relations
//! - flattens a cyclic object graph into its distinct records
//!
//! [`RelationRepository`] bundles all of this for one entity.
//!
//! # Consistency
//!
//! Batch operations dispatch their statements concurrently and wait for all of
//! them. A failure is reported after every statement has finished; statements
//! that succeeded are not rolled back. Pass a transaction handle with
//! [`RelationRepository::with_session`] when atomicity matters.

#[macro_use]
mod macros;

mod batch;
pub mod config;
pub mod graph;
pub mod ids;
pub mod keys;
pub mod mutator;
pub mod repository;
pub mod resolver;

pub use config::RelationConfig;
pub use graph::{EntityGraphFlattener, GraphNode};
pub use ids::RelationIdResolver;
pub use keys::{KeyExtractor, KeyInput, KeyMap};
pub use mutator::{JunctionRow, RelationMutator};
pub use repository::RelationRepository;
pub use resolver::{
    JunctionDescriptor, RelationDescriptor, RelationKind, RelationRef, RelationResolver,
};

pub use linkage_core::{
    ColumnMetadata, Connection, Cx, Dialect, EntityMetadata, Error, Field, JoinColumn,
    MetadataRegistry, Outcome, Record, RecordRef, RelationError, RelationErrorKind,
    RelationMetadata, RelationType, Result, Row, Value,
};
pub use linkage_pool::{Pool, PoolConfig, PoolStats, PooledConnection, SessionSource};
pub use linkage_query::{Condition, DeleteQuery, InsertStatement, SelectQuery, UpdateStatement};

/// Re-export core crates for advanced use.
pub use linkage_core;
pub use linkage_pool;
pub use linkage_query;
