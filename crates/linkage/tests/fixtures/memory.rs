//! An in-memory table store speaking the SQL linkage generates.
//!
//! Understands exactly the statement shapes the builders emit with the
//! Postgres dialect: single-row INSERT, UPDATE and DELETE filtered by OR-ed
//! groups of AND-ed equalities, and SELECT of aliased columns from one aliased
//! table. Every statement is recorded.

use linkage::{Connection, Cx, Error, Outcome, Row, Value};
use linkage::linkage_core::{QueryError, QueryErrorKind};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub type StoredRow = Vec<(String, Value)>;

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, Vec<StoredRow>>,
    statements: Vec<String>,
    fail_on: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryConnection {
    state: Arc<Mutex<State>>,
}

/// `"a"."b"` -> `["a", "b"]`
fn idents(sql: &str) -> Vec<String> {
    sql.split('"')
        .enumerate()
        .filter(|(i, _)| i % 2 == 1)
        .map(|(_, s)| s.to_string())
        .collect()
}

fn param(token: &str, params: &[Value]) -> Value {
    let index: usize = token
        .trim()
        .trim_start_matches('$')
        .parse()
        .expect("numbered placeholder");
    params[index - 1].clone()
}

/// Disjunction of conjunctions of `column = value`.
fn predicate(where_sql: &str, params: &[Value]) -> Vec<Vec<(String, Value)>> {
    where_sql
        .split(" OR ")
        .map(|group| {
            group
                .trim()
                .trim_start_matches('(')
                .trim_end_matches(')')
                .split(" AND ")
                .map(|eq| {
                    let (lhs, rhs) = eq.split_once(" = ").expect("equality");
                    let column = idents(lhs).pop().expect("column");
                    (column, param(rhs, params))
                })
                .collect()
        })
        .collect()
}

fn get<'r>(row: &'r StoredRow, column: &str) -> Option<&'r Value> {
    row.iter().find(|(c, _)| c == column).map(|(_, v)| v)
}

fn matches(row: &StoredRow, predicate: &[Vec<(String, Value)>]) -> bool {
    predicate
        .iter()
        .any(|group| group.iter().all(|(c, v)| get(row, c) == Some(v)))
}

impl MemoryConnection {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("state lock")
    }

    /// Seed a row directly.
    pub fn insert_row(&self, table: &str, row: &[(&str, Value)]) {
        let row = row.iter().map(|(c, v)| (c.to_string(), v.clone())).collect();
        self.state().tables.entry(table.to_string()).or_default().push(row);
    }

    pub fn rows(&self, table: &str) -> Vec<StoredRow> {
        self.state().tables.get(table).cloned().unwrap_or_default()
    }

    /// Values of `columns` for every row of `table`, sorted.
    pub fn pairs(&self, table: &str, columns: &[&str]) -> Vec<Vec<Value>> {
        let mut out: Vec<Vec<Value>> = self
            .rows(table)
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|c| get(row, c).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        out.sort_by_key(|values| format!("{values:?}"));
        out
    }

    pub fn statements(&self) -> Vec<String> {
        self.state().statements.clone()
    }

    pub fn clear_statements(&self) {
        self.state().statements.clear();
    }

    /// Fail every statement containing `needle`.
    pub fn fail_on(&self, needle: &str) {
        self.state().fail_on = Some(needle.to_string());
    }

    fn run(&self, sql: &str, params: &[Value]) -> Result<(u64, Vec<Row>), Error> {
        let mut state = self.state();
        state.statements.push(sql.to_string());
        if state.fail_on.as_deref().is_some_and(|n| sql.contains(n)) {
            return Err(Error::Query(QueryError {
                kind: QueryErrorKind::Constraint,
                sql: Some(sql.to_string()),
                sqlstate: None,
                message: "injected failure".to_string(),
                source: None,
            }));
        }

        if let Some(rest) = sql.strip_prefix("INSERT INTO ") {
            let names = idents(rest);
            let (table, columns) = names.split_first().expect("table");
            let row = columns.iter().cloned().zip(params.iter().cloned()).collect();
            state.tables.entry(table.clone()).or_default().push(row);
            return Ok((1, Vec::new()));
        }

        if let Some(rest) = sql.strip_prefix("DELETE FROM ") {
            let (table, where_sql) = rest.split_once(" WHERE ").expect("filtered delete");
            let predicate = predicate(where_sql, params);
            let rows = state.tables.entry(idents(table).remove(0)).or_default();
            let before = rows.len();
            rows.retain(|row| !matches(row, &predicate));
            return Ok(((before - rows.len()) as u64, Vec::new()));
        }

        if let Some(rest) = sql.strip_prefix("UPDATE ") {
            let (head, where_sql) = rest.split_once(" WHERE ").expect("filtered update");
            let (table, set_sql) = head.split_once(" SET ").expect("set clause");
            let assignments: Vec<(String, Value)> = set_sql
                .split(", ")
                .map(|a| {
                    let (lhs, rhs) = a.split_once(" = ").expect("assignment");
                    (idents(lhs).remove(0), param(rhs, params))
                })
                .collect();
            let predicate = predicate(where_sql, params);
            let rows = state.tables.entry(idents(table).remove(0)).or_default();
            let mut affected = 0;
            for row in rows.iter_mut().filter(|row| matches(row, &predicate)) {
                for (column, value) in &assignments {
                    match row.iter_mut().find(|(c, _)| c == column) {
                        Some(entry) => entry.1 = value.clone(),
                        None => row.push((column.clone(), value.clone())),
                    }
                }
                affected += 1;
            }
            return Ok((affected, Vec::new()));
        }

        if let Some(rest) = sql.strip_prefix("SELECT ") {
            let (columns_sql, from_sql) = rest.split_once(" FROM ").expect("from clause");
            let (table_sql, where_sql) = from_sql.split_once(" WHERE ").expect("filtered select");
            // `"alias"."column" AS "label"`
            let selected: Vec<(String, String)> = columns_sql
                .split(", ")
                .map(|c| {
                    let names = idents(c);
                    (names[1].clone(), names[2].clone())
                })
                .collect();
            let predicate = predicate(where_sql, params);
            let rows = state
                .tables
                .get(&idents(table_sql).remove(0))
                .cloned()
                .unwrap_or_default();
            let labels: Vec<String> = selected.iter().map(|(_, l)| l.clone()).collect();
            let out = rows
                .iter()
                .filter(|row| matches(row, &predicate))
                .map(|row| {
                    let values = selected
                        .iter()
                        .map(|(c, _)| get(row, c).cloned().unwrap_or(Value::Null))
                        .collect();
                    Row::new(labels.clone(), values)
                })
                .collect();
            return Ok((0, out));
        }

        panic!("unsupported statement: {sql}");
    }
}

#[allow(clippy::manual_async_fn)] // Mock trait impls must match trait signatures
impl Connection for MemoryConnection {
    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let result = self.run(sql, params).map(|(_, rows)| rows);
        async move {
            match result {
                Ok(rows) => Outcome::Ok(rows),
                Err(e) => Outcome::Err(e),
            }
        }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let result = self.run(sql, params).map(|(affected, _)| affected);
        async move {
            match result {
                Ok(n) => Outcome::Ok(n),
                Err(e) => Outcome::Err(e),
            }
        }
    }

    fn insert(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<i64, Error>> + Send {
        let result = self.run(sql, params).map(|_| 0);
        async move {
            match result {
                Ok(id) => Outcome::Ok(id),
                Err(e) => Outcome::Err(e),
            }
        }
    }
}
