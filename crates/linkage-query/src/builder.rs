//! Statement builders for INSERT, UPDATE, DELETE and SELECT.
//!
//! Every identifier is quoted by the [`Dialect`]; every value is bound as a
//! parameter. UPDATE and DELETE refuse to run without a filter so a bad key can
//! never turn into a table-wide write.

use crate::clause::Condition;
use asupersync::{Cx, Outcome};
use linkage_core::{Connection, Dialect, Error, QueryError, QueryErrorKind, Row, Value};

fn unfiltered(statement: &str, table: &str) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Unsafe,
        sql: None,
        sqlstate: None,
        message: format!(
            "refusing to run {} on '{}' without a WHERE clause",
            statement, table
        ),
        source: None,
    })
}

/// INSERT of a single row.
#[derive(Debug, Clone)]
pub struct InsertStatement {
    table: String,
    columns: Vec<String>,
    values: Vec<Value>,
}

impl InsertStatement {
    /// Create a new INSERT into `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Add a column value.
    pub fn value(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.columns.push(column.into());
        self.values.push(value.into());
        self
    }

    /// Build the INSERT SQL and parameters with default dialect (Postgres).
    pub fn build(&self) -> (String, Vec<Value>) {
        self.build_with_dialect(Dialect::default())
    }

    /// Build the INSERT SQL and parameters with specific dialect.
    pub fn build_with_dialect(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let columns: Vec<_> = self
            .columns
            .iter()
            .map(|c| dialect.quote_identifier(c))
            .collect();
        let placeholders: Vec<_> = (1..=self.values.len())
            .map(|i| dialect.placeholder(i))
            .collect();

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            dialect.quote_identifier(&self.table),
            columns.join(", "),
            placeholders.join(", ")
        );

        (sql, self.values.clone())
    }

    /// Execute the INSERT and return rows affected.
    pub async fn execute<C: Connection>(&self, cx: &Cx, conn: &C) -> Outcome<u64, Error> {
        let (sql, params) = self.build_with_dialect(conn.dialect());
        tracing::trace!(sql = %sql, "Executing INSERT");
        conn.execute(cx, &sql, &params).await
    }
}

/// UPDATE of the rows matching a filter.
#[derive(Debug, Clone)]
pub struct UpdateStatement {
    table: String,
    set: Vec<(String, Value)>,
    filter: Option<Condition>,
}

impl UpdateStatement {
    /// Create a new UPDATE of `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            set: Vec::new(),
            filter: None,
        }
    }

    /// Assign a column.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.push((column.into(), value.into()));
        self
    }

    /// Add a WHERE condition, AND-ed with any existing one.
    pub fn filter(mut self, condition: Condition) -> Self {
        self.filter = Some(match self.filter {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    pub fn has_filter(&self) -> bool {
        self.filter.as_ref().is_some_and(|f| !f.is_empty())
    }

    /// Build the UPDATE SQL and parameters with default dialect (Postgres).
    pub fn build(&self) -> (String, Vec<Value>) {
        self.build_with_dialect(Dialect::default())
    }

    /// Build the UPDATE SQL and parameters with specific dialect.
    pub fn build_with_dialect(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut params = Vec::with_capacity(self.set.len());
        let mut set_clauses = Vec::with_capacity(self.set.len());

        for (column, value) in &self.set {
            params.push(value.clone());
            set_clauses.push(format!(
                "{} = {}",
                dialect.quote_identifier(column),
                dialect.placeholder(params.len())
            ));
        }

        let mut sql = format!(
            "UPDATE {} SET {}",
            dialect.quote_identifier(&self.table),
            set_clauses.join(", ")
        );

        if let Some(filter) = self.filter.as_ref().filter(|f| !f.is_empty()) {
            let where_sql = filter.build(dialect, &mut params);
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }

        (sql, params)
    }

    /// Execute the UPDATE and return rows affected.
    pub async fn execute<C: Connection>(&self, cx: &Cx, conn: &C) -> Outcome<u64, Error> {
        if !self.has_filter() {
            tracing::warn!(table = %self.table, "Skipping UPDATE without WHERE clause");
            return Outcome::Err(unfiltered("UPDATE", &self.table));
        }
        let (sql, params) = self.build_with_dialect(conn.dialect());
        tracing::trace!(sql = %sql, "Executing UPDATE");
        conn.execute(cx, &sql, &params).await
    }
}

/// DELETE of the rows matching a filter.
#[derive(Debug, Clone)]
pub struct DeleteQuery {
    table: String,
    filter: Option<Condition>,
}

impl DeleteQuery {
    /// Create a new DELETE from `table`.
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filter: None,
        }
    }

    /// Add a WHERE condition, AND-ed with any existing one.
    pub fn and_where(mut self, condition: Condition) -> Self {
        self.filter = Some(match self.filter {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    /// Add a WHERE condition, OR-ed with any existing one.
    pub fn or_where(mut self, condition: Condition) -> Self {
        self.filter = Some(match self.filter {
            Some(existing) => existing.or(condition),
            None => condition,
        });
        self
    }

    pub fn has_filter(&self) -> bool {
        self.filter.as_ref().is_some_and(|f| !f.is_empty())
    }

    /// Build the DELETE SQL and parameters with default dialect (Postgres).
    pub fn build(&self) -> (String, Vec<Value>) {
        self.build_with_dialect(Dialect::default())
    }

    /// Build the DELETE SQL and parameters with specific dialect.
    pub fn build_with_dialect(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut sql = format!("DELETE FROM {}", dialect.quote_identifier(&self.table));
        let mut params = Vec::new();

        if let Some(filter) = self.filter.as_ref().filter(|f| !f.is_empty()) {
            let where_sql = filter.build(dialect, &mut params);
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }

        (sql, params)
    }

    /// Execute the DELETE and return rows affected.
    pub async fn execute<C: Connection>(&self, cx: &Cx, conn: &C) -> Outcome<u64, Error> {
        if !self.has_filter() {
            tracing::warn!(table = %self.table, "Skipping DELETE without WHERE clause");
            return Outcome::Err(unfiltered("DELETE", &self.table));
        }
        let (sql, params) = self.build_with_dialect(conn.dialect());
        tracing::trace!(sql = %sql, "Executing DELETE");
        conn.execute(cx, &sql, &params).await
    }
}

/// SELECT of aliased columns from one aliased table.
#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
    columns: Vec<(String, String)>,
    table: Option<(String, String)>,
    filter: Option<Condition>,
}

impl SelectQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select `alias.column AS column_alias`, qualified by the FROM alias.
    pub fn select(mut self, column: impl Into<String>, column_alias: impl Into<String>) -> Self {
        self.columns.push((column.into(), column_alias.into()));
        self
    }

    /// Set the FROM table and its alias.
    pub fn from(mut self, table: impl Into<String>, alias: impl Into<String>) -> Self {
        self.table = Some((table.into(), alias.into()));
        self
    }

    /// Add a WHERE condition, AND-ed with any existing one.
    pub fn and_where(mut self, condition: Condition) -> Self {
        self.filter = Some(match self.filter {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    /// Build the SELECT SQL and parameters with default dialect (Postgres).
    pub fn build(&self) -> (String, Vec<Value>) {
        self.build_with_dialect(Dialect::default())
    }

    /// Build the SELECT SQL and parameters with specific dialect.
    pub fn build_with_dialect(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let qualifier = self.table.as_ref().map(|(_, alias)| alias.as_str());
        let columns: Vec<_> = self
            .columns
            .iter()
            .map(|(column, alias)| {
                let column = match qualifier {
                    Some(q) => dialect.quote_qualified(q, column),
                    None => dialect.quote_identifier(column),
                };
                format!("{} AS {}", column, dialect.quote_identifier(alias))
            })
            .collect();

        let mut sql = format!("SELECT {}", columns.join(", "));
        if let Some((table, alias)) = &self.table {
            sql.push_str(&format!(
                " FROM {} AS {}",
                dialect.quote_identifier(table),
                dialect.quote_identifier(alias)
            ));
        }

        let mut params = Vec::new();
        if let Some(filter) = self.filter.as_ref().filter(|f| !f.is_empty()) {
            let where_sql = filter.build(dialect, &mut params);
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }

        (sql, params)
    }

    /// Execute the SELECT and return all rows.
    pub async fn all<C: Connection>(&self, cx: &Cx, conn: &C) -> Outcome<Vec<Row>, Error> {
        let (sql, params) = self.build_with_dialect(conn.dialect());
        tracing::trace!(sql = %sql, "Executing SELECT");
        conn.query(cx, &sql, &params).await
    }
}
