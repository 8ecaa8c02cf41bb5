//! Database connection trait.
//!
//! linkage never opens connections itself. It drives whatever implements
//! [`Connection`]: a plain connection, a transaction handle the caller has
//! already begun, or a connection checked out of a pool.
//!
//! All operations integrate with asupersync's structured concurrency via `Cx`
//! context for proper cancellation and timeout handling.

use crate::dialect::Dialect;
use crate::row::Row;
use crate::value::Value;
use asupersync::{Cx, Outcome};

/// A database connection capable of executing statements.
///
/// Implementations must be `Send + Sync`: the mutation engine issues several
/// statements against the same connection concurrently and waits for all of them.
/// Transaction scope belongs to the caller; pass the transaction handle itself
/// when the relation writes should join it.
///
/// # Example
///
/// ```rust,ignore
/// let rows = conn.query(&cx, "SELECT \"roleId\" FROM \"user_roles\" WHERE \"userId\" = $1", &[Value::BigInt(1)]).await?;
/// ```
pub trait Connection: Send + Sync {
    /// The SQL dialect statements must be rendered in.
    fn dialect(&self) -> Dialect {
        Dialect::default()
    }

    /// Execute a query and return all rows.
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, crate::Error>> + Send;

    /// Execute a statement (INSERT, UPDATE, DELETE) and return rows affected.
    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, crate::Error>> + Send;

    /// Execute an INSERT and return the last inserted ID.
    ///
    /// Junction tables usually have no generated key; drivers may return 0.
    fn insert(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<i64, crate::Error>> + Send;
}
