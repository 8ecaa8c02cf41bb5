//! Core types and traits for linkage.
//!
//! This crate provides the foundations the relation engine builds on:
//!
//! - `Value` and `Row` for parameters and results
//! - `Connection` trait and `Dialect` for executing statements
//! - Declarative relation metadata (`EntityMetadata`, `RelationMetadata`, `MetadataRegistry`)
//! - Dynamic `Record`s whose relations may form cycles
//! - `Outcome` re-export from asupersync for cancel-correct operations
//! - `Cx` context for structured concurrency

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod connection;
pub mod dialect;
pub mod error;
pub mod metadata;
pub mod record;
pub mod row;
pub mod value;

pub use connection::Connection;
pub use dialect::Dialect;
pub use error::{
    ConfigError, Error, PoolError, PoolErrorKind, QueryError, QueryErrorKind, RelationError,
    RelationErrorKind, Result,
};
pub use metadata::{
    ColumnMetadata, EntityMetadata, JoinColumn, MetadataRegistry, PropertiesMap,
    RelationMetadata, RelationType, is_valid_property_path,
};
pub use record::{Field, Record, RecordRef};
pub use row::Row;
pub use value::Value;
