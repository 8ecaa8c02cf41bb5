//! Statement construction for linkage.
//!
//! `linkage-query` is the **statement layer**: small builders that turn a
//! table, column names and key values into parameterized SQL for a [`Dialect`].
//!
//! - [`Condition`]: column equalities combined with AND / OR
//! - [`InsertStatement`], [`UpdateStatement`], [`DeleteQuery`], [`SelectQuery`]
//!
//! The statements execute through the `Connection` trait from `linkage-core`.

pub mod builder;
pub mod clause;

pub use builder::{DeleteQuery, InsertStatement, SelectQuery, UpdateStatement};
pub use clause::Condition;
pub use linkage_core::Dialect;
