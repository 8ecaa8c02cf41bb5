//! Relation mutations.
//!
//! Foreign-key relations are changed with one UPDATE on the table that holds
//! the foreign key. Many-to-many relations are changed by inserting and deleting
//! junction rows:
//!
//! - add: one INSERT per related key, all dispatched concurrently
//! - remove: one DELETE whose WHERE is an OR of per-key AND groups
//!
//! Nothing here opens or commits a transaction. A failure part-way through a
//! batch leaves the statements that already succeeded applied.

use crate::batch::{dispatch, settle};
use crate::config::RelationConfig;
use crate::keys::{KeyExtractor, KeyInput, KeyMap};
use crate::resolver::{JunctionDescriptor, RelationDescriptor};
use asupersync::{Cx, Outcome};
use linkage_core::{Connection, Error, JoinColumn, Result, Value};
use linkage_query::{Condition, DeleteQuery, InsertStatement, UpdateStatement};

/// One row of a junction table: a key for each side.
#[derive(Debug, Clone, PartialEq)]
pub struct JunctionRow {
    pub local: KeyMap,
    pub related: KeyMap,
}

fn column_value(key: &KeyMap, column: &JoinColumn) -> Value {
    key.get(&column.referenced.database_name)
        .cloned()
        .unwrap_or(Value::Null)
}

impl JunctionRow {
    /// INSERT writing this row, local columns first.
    pub fn insert_statement(&self, junction: &JunctionDescriptor) -> InsertStatement {
        let local = junction
            .local_columns()
            .iter()
            .map(|c| (c, column_value(&self.local, c)));
        let related = junction
            .related_columns()
            .iter()
            .map(|c| (c, column_value(&self.related, c)));
        local
            .chain(related)
            .fold(InsertStatement::new(&junction.table), |insert, (c, v)| {
                insert.value(&c.name, v)
            })
    }

    /// Predicate matching exactly this row, local columns first.
    pub fn match_condition(&self, junction: &JunctionDescriptor) -> Condition {
        let local = junction
            .local_columns()
            .iter()
            .map(|c| Condition::eq(&c.name, column_value(&self.local, c)));
        let related = junction
            .related_columns()
            .iter()
            .map(|c| Condition::eq(&c.name, column_value(&self.related, c)));
        Condition::all(local.chain(related))
    }
}

/// Build the junction rows linking `owner` to each of `related`.
///
/// Every key is extracted before anything is returned, so a malformed key
/// fails the whole batch before a statement is issued. Related keys with a
/// NULL component are dropped.
pub fn junction_rows(
    descriptor: &RelationDescriptor,
    owner: &KeyInput,
    related: &[KeyInput],
) -> Result<Vec<JunctionRow>> {
    descriptor.require_many_to_many()?;
    let owner_columns = descriptor.owner_key_columns();
    let related_columns = descriptor.related_key_columns();

    let local = KeyExtractor::new(&descriptor.entity, &owner_columns).extract_complete(owner)?;
    let related_keys = KeyExtractor::new(&descriptor.target, &related_columns).extract_all(related)?;

    let total = related_keys.len();
    let rows: Vec<_> = related_keys
        .into_iter()
        .filter(KeyMap::is_complete)
        .map(|related| JunctionRow {
            local: local.clone(),
            related,
        })
        .collect();
    if rows.len() < total {
        tracing::warn!(
            dropped = total - rows.len(),
            relation = %descriptor.property_path,
            "Dropping related keys with NULL components"
        );
    }
    Ok(rows)
}

/// Build the UPDATE that points `owner` at `related` (or clears it).
///
/// - owning side: the owner's row, addressed by its primary key, gets the
///   related key in its foreign-key columns
/// - inverse side: the related row, addressed by its primary key, gets the
///   owner key in its foreign-key columns
/// - inverse side with no related key: every row pointing at the owner is
///   cleared
///
/// A given related key must be complete. Clearing goes through `None` only.
pub fn foreign_key_update(
    descriptor: &RelationDescriptor,
    owner: &KeyInput,
    related: Option<&KeyInput>,
) -> Result<UpdateStatement> {
    descriptor.require_foreign_key()?;
    let owner_columns = descriptor.owner_key_columns();
    let related_columns = descriptor.related_key_columns();
    let owner_key = KeyExtractor::new(&descriptor.entity, &owner_columns).extract_complete(owner)?;
    let related_extractor = KeyExtractor::new(&descriptor.target, &related_columns);

    let mut update = UpdateStatement::new(descriptor.foreign_key_table());

    if descriptor.is_owning() {
        let related_key = related
            .map(|r| related_extractor.extract_complete(r))
            .transpose()?;
        for column in &descriptor.join_columns {
            let value = related_key
                .as_ref()
                .map_or(Value::Null, |k| column_value(k, column));
            update = update.set(&column.name, value);
        }
        for (column, value) in owner_key.iter() {
            update = update.filter(Condition::eq(column, value.clone()));
        }
        return Ok(update);
    }

    match related {
        Some(related) => {
            let related_key = related_extractor.extract_complete(related)?;
            for column in &descriptor.join_columns {
                update = update.set(&column.name, column_value(&owner_key, column));
            }
            for (column, value) in related_key.iter() {
                update = update.filter(Condition::eq(column, value.clone()));
            }
        }
        None => {
            for column in &descriptor.join_columns {
                update = update
                    .set(&column.name, Value::Null)
                    .filter(Condition::eq(&column.name, column_value(&owner_key, column)));
            }
        }
    }
    Ok(update)
}

/// Executes relation mutations on one connection.
pub struct RelationMutator<'a, C> {
    cx: &'a Cx,
    conn: &'a C,
    config: &'a RelationConfig,
}

impl<'a, C: Connection> RelationMutator<'a, C> {
    pub fn new(cx: &'a Cx, conn: &'a C, config: &'a RelationConfig) -> Self {
        Self { cx, conn, config }
    }

    /// Point `owner` at `related` through a foreign key; `None` unsets.
    ///
    /// Returns rows affected. Zero is not an error.
    #[tracing::instrument(level = "debug", skip_all, fields(relation = %descriptor.property_path))]
    pub async fn set_foreign_key(
        &self,
        descriptor: &RelationDescriptor,
        owner: &KeyInput,
        related: Option<&KeyInput>,
    ) -> Outcome<u64, Error> {
        let update = try_outcome!(foreign_key_update(descriptor, owner, related));
        let affected = outcome!(update.execute(self.cx, self.conn).await);
        tracing::debug!(
            affected,
            table = descriptor.foreign_key_table(),
            "Foreign key updated"
        );
        Outcome::Ok(affected)
    }

    /// Insert one junction row per related key.
    ///
    /// Returns the number of rows inserted. All inserts are awaited; the first
    /// failure is reported afterwards.
    #[tracing::instrument(level = "debug", skip_all, fields(relation = %descriptor.property_path))]
    pub async fn add_junction_rows(
        &self,
        descriptor: &RelationDescriptor,
        owner: &KeyInput,
        related: &[KeyInput],
    ) -> Outcome<usize, Error> {
        let junction = try_outcome!(descriptor.require_many_to_many());
        let rows = try_outcome!(junction_rows(descriptor, owner, related));
        if rows.is_empty() {
            return Outcome::Ok(0);
        }

        tracing::info!(
            count = rows.len(),
            junction = %junction.table,
            "Inserting junction rows"
        );

        let statements: Vec<_> = rows.iter().map(|r| r.insert_statement(junction)).collect();
        let pending: Vec<_> = statements
            .iter()
            .map(|insert| insert.execute(self.cx, self.conn))
            .collect();
        let inserted = outcome!(settle(dispatch(pending, self.config.max_in_flight).await));

        tracing::debug!(inserted = inserted.len(), "Junction inserts complete");
        Outcome::Ok(inserted.len())
    }

    /// Delete the junction rows linking `owner` to each related key.
    ///
    /// An empty key list issues no statement. Returns rows affected.
    #[tracing::instrument(level = "debug", skip_all, fields(relation = %descriptor.property_path))]
    pub async fn remove_junction_rows(
        &self,
        descriptor: &RelationDescriptor,
        owner: &KeyInput,
        related: &[KeyInput],
    ) -> Outcome<u64, Error> {
        let junction = try_outcome!(descriptor.require_many_to_many());
        if related.is_empty() {
            tracing::debug!("No related keys to remove");
            return Outcome::Ok(0);
        }
        let rows = try_outcome!(junction_rows(descriptor, owner, related));
        if rows.is_empty() {
            return Outcome::Ok(0);
        }

        let delete = rows.iter().fold(DeleteQuery::from(&junction.table), |delete, row| {
            delete.or_where(row.match_condition(junction))
        });
        let removed = outcome!(delete.execute(self.cx, self.conn).await);

        tracing::info!(
            requested = rows.len(),
            removed,
            junction = %junction.table,
            "Removed junction rows"
        );
        Outcome::Ok(removed)
    }

    /// Add and remove junction rows concurrently.
    ///
    /// The two halves are independent: if one fails the other is not undone.
    /// The add failure is reported when both fail.
    pub async fn add_and_remove(
        &self,
        descriptor: &RelationDescriptor,
        owner: &KeyInput,
        add: &[KeyInput],
        remove: &[KeyInput],
    ) -> Outcome<(usize, u64), Error> {
        let (added, removed) = futures::join!(
            self.add_junction_rows(descriptor, owner, add),
            self.remove_junction_rows(descriptor, owner, remove)
        );
        if let (Outcome::Err(add_err), Outcome::Err(remove_err)) = (&added, &removed) {
            tracing::warn!(
                add = %add_err,
                remove = %remove_err,
                "Both halves of add-and-remove failed"
            );
        }
        let added = outcome!(added);
        let removed = outcome!(removed);
        Outcome::Ok((added, removed))
    }
}
