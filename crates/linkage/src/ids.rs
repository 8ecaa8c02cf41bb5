//! Related-id lookup through junction tables.

use crate::batch::{dispatch, settle};
use crate::config::RelationConfig;
use crate::keys::{KeyExtractor, KeyInput, KeyMap};
use crate::resolver::{JunctionDescriptor, RelationDescriptor};
use asupersync::{Cx, Outcome};
use linkage_core::{Connection, Error, Result, Row, Value};
use linkage_query::{Condition, SelectQuery};

/// The SELECT returning the related keys of one local key.
pub fn related_keys_query(junction: &JunctionDescriptor, alias: &str, local: &KeyMap) -> SelectQuery {
    let query = junction
        .related_columns()
        .iter()
        .fold(SelectQuery::new(), |q, c| q.select(&c.name, &c.name))
        .from(&junction.table, alias);
    junction.local_columns().iter().fold(query, |q, c| {
        let value = local
            .get(&c.referenced.database_name)
            .cloned()
            .unwrap_or(Value::Null);
        q.and_where(Condition::qualified_eq(alias, &c.name, value))
    })
}

fn related_key(junction: &JunctionDescriptor, row: &Row) -> KeyMap {
    junction
        .related_columns()
        .iter()
        .map(|c| {
            let value = row.get_by_name(&c.name).cloned().unwrap_or(Value::Null);
            (c.referenced.database_name.clone(), value)
        })
        .collect()
}

/// Local keys to look up, with NULL-bearing keys dropped.
fn local_keys(descriptor: &RelationDescriptor, sources: &[KeyInput]) -> Result<Vec<KeyMap>> {
    let columns = descriptor.owner_key_columns();
    let keys = KeyExtractor::new(&descriptor.entity, &columns).extract_all(sources)?;
    let total = keys.len();
    let keys: Vec<_> = keys.into_iter().filter(KeyMap::is_complete).collect();
    if keys.len() < total {
        tracing::warn!(
            dropped = total - keys.len(),
            relation = %descriptor.property_path,
            "Dropping source keys with NULL components"
        );
    }
    Ok(keys)
}

/// Reads the related keys of many-to-many relations.
pub struct RelationIdResolver<'a, C> {
    cx: &'a Cx,
    conn: &'a C,
    config: &'a RelationConfig,
}

impl<'a, C: Connection> RelationIdResolver<'a, C> {
    pub fn new(cx: &'a Cx, conn: &'a C, config: &'a RelationConfig) -> Self {
        Self { cx, conn, config }
    }

    /// Related keys for each source, in source order.
    ///
    /// Sources whose key has a NULL component are skipped. Duplicates are
    /// returned as stored.
    #[tracing::instrument(level = "debug", skip_all, fields(relation = %descriptor.property_path))]
    pub async fn find_related_keys_by_source(
        &self,
        descriptor: &RelationDescriptor,
        sources: &[KeyInput],
    ) -> Outcome<Vec<(KeyMap, Vec<KeyMap>)>, Error> {
        let junction = try_outcome!(descriptor.require_many_to_many());
        let keys = try_outcome!(local_keys(descriptor, sources));
        if keys.is_empty() {
            tracing::debug!("No source keys to look up");
            return Outcome::Ok(Vec::new());
        }

        let queries: Vec<_> = keys
            .iter()
            .map(|key| related_keys_query(junction, &self.config.junction_alias, key))
            .collect();
        let pending: Vec<_> = queries
            .iter()
            .map(|q| async move {
                q.all(self.cx, self.conn)
                    .await
                    .map(|rows| rows.iter().map(|r| related_key(junction, r)).collect::<Vec<_>>())
            })
            .collect();
        let found = outcome!(settle(dispatch(pending, self.config.max_in_flight).await));

        tracing::debug!(
            sources = keys.len(),
            found = found.iter().map(Vec::len).sum::<usize>(),
            junction = %junction.table,
            "Loaded related keys"
        );
        Outcome::Ok(keys.into_iter().zip(found).collect())
    }

    /// Related keys of every source, concatenated in source order.
    pub async fn find_related_keys(
        &self,
        descriptor: &RelationDescriptor,
        sources: &[KeyInput],
    ) -> Outcome<Vec<KeyMap>, Error> {
        self.find_related_keys_by_source(descriptor, sources)
            .await
            .map(|groups| groups.into_iter().flat_map(|(_, related)| related).collect())
    }
}
