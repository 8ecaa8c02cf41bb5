//! Relation operations bound to one entity.
//!
//! [`RelationRepository`] resolves relation references against the entity's
//! metadata and runs each call either on the session it was given or on a
//! connection checked out of its [`SessionSource`] for that call alone.
//!
//! # Example
//!
//! ```rust,ignore
//! let repo = RelationRepository::new(&pool, &registry, "User")?;
//! repo.add_to_relation(&cx, "roles", 1_i64, &[10_i64.into(), 20_i64.into()]).await;
//! let roles = repo.find_relation_ids(&cx, "roles", &[1_i64.into()]).await;
//! ```

use crate::config::RelationConfig;
use crate::graph::{EntityGraphFlattener, GraphNode};
use crate::ids::RelationIdResolver;
use crate::keys::{KeyExtractor, KeyInput, KeyMap};
use crate::mutator::RelationMutator;
use crate::resolver::{RelationDescriptor, RelationRef, RelationResolver};
use asupersync::{Cx, Outcome};
use linkage_core::{EntityMetadata, Error, MetadataRegistry, RecordRef, Result};
use linkage_pool::SessionSource;
use linkage_query::{Condition, DeleteQuery};
use std::ops::Deref;

/// A connection for one call: borrowed from the caller or checked out.
enum Lease<'s, S: SessionSource + 's> {
    Borrowed(&'s S::Conn),
    Checked(S::Session<'s>),
}

impl<'s, S: SessionSource + 's> Deref for Lease<'s, S> {
    type Target = S::Conn;

    fn deref(&self) -> &S::Conn {
        match self {
            Lease::Borrowed(conn) => conn,
            Lease::Checked(session) => &**session,
        }
    }
}

/// Relation operations for one entity.
pub struct RelationRepository<'a, S: SessionSource> {
    source: &'a S,
    session: Option<&'a S::Conn>,
    registry: &'a MetadataRegistry,
    metadata: &'a EntityMetadata,
    config: RelationConfig,
}

impl<'a, S: SessionSource> RelationRepository<'a, S> {
    /// Bind to `entity`, which must be registered.
    pub fn new(source: &'a S, registry: &'a MetadataRegistry, entity: &str) -> Result<Self> {
        let metadata = registry.require(entity)?;
        Ok(Self {
            source,
            session: None,
            registry,
            metadata,
            config: RelationConfig::default(),
        })
    }

    /// Run every operation on `conn` instead of checking one out.
    ///
    /// Pass a transaction handle here to make relation writes part of it.
    pub fn with_session(mut self, conn: &'a S::Conn) -> Self {
        self.session = Some(conn);
        self
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: RelationConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn metadata(&self) -> &'a EntityMetadata {
        self.metadata
    }

    pub fn config(&self) -> &RelationConfig {
        &self.config
    }

    /// Resolve a relation of this entity.
    pub fn resolve(&self, relation: impl Into<RelationRef>) -> Result<RelationDescriptor> {
        RelationResolver::new(self.registry).resolve(self.metadata, &relation.into())
    }

    async fn lease(&self, cx: &Cx) -> Outcome<Lease<'a, S>, Error> {
        let source: &'a S = self.source;
        match self.session {
            Some(conn) => Outcome::Ok(Lease::Borrowed(conn)),
            None => source.acquire(cx).await.map(Lease::Checked),
        }
    }

    /// Point `owner`'s foreign-key relation at `related`.
    pub async fn set_relation(
        &self,
        cx: &Cx,
        relation: impl Into<RelationRef>,
        owner: impl Into<KeyInput>,
        related: impl Into<KeyInput>,
    ) -> Outcome<u64, Error> {
        let descriptor = try_outcome!(self.resolve(relation));
        let (owner, related) = (owner.into(), related.into());
        let conn = outcome!(self.lease(cx).await);
        RelationMutator::new(cx, &*conn, &self.config)
            .set_foreign_key(&descriptor, &owner, Some(&related))
            .await
    }

    /// Clear `owner`'s foreign-key relation.
    pub async fn unset_relation(
        &self,
        cx: &Cx,
        relation: impl Into<RelationRef>,
        owner: impl Into<KeyInput>,
    ) -> Outcome<u64, Error> {
        let descriptor = try_outcome!(self.resolve(relation));
        let owner = owner.into();
        let conn = outcome!(self.lease(cx).await);
        RelationMutator::new(cx, &*conn, &self.config)
            .set_foreign_key(&descriptor, &owner, None)
            .await
    }

    /// Point `related` at `owner` through the far side of a foreign-key relation.
    ///
    /// For `Hero.team` this sets the team's `heroes` to include a hero:
    /// `set_inverse_relation("team", team_id, hero_id)`.
    pub async fn set_inverse_relation(
        &self,
        cx: &Cx,
        relation: impl Into<RelationRef>,
        related: impl Into<KeyInput>,
        owner: impl Into<KeyInput>,
    ) -> Outcome<u64, Error> {
        let descriptor = try_outcome!(self.resolve(relation)).mirrored();
        let (related, owner) = (related.into(), owner.into());
        let conn = outcome!(self.lease(cx).await);
        RelationMutator::new(cx, &*conn, &self.config)
            .set_foreign_key(&descriptor, &related, Some(&owner))
            .await
    }

    /// Link `owner` to each of `related` through the junction table.
    pub async fn add_to_relation(
        &self,
        cx: &Cx,
        relation: impl Into<RelationRef>,
        owner: impl Into<KeyInput>,
        related: &[KeyInput],
    ) -> Outcome<usize, Error> {
        let descriptor = try_outcome!(self.resolve(relation));
        self.add(cx, &descriptor, owner.into(), related).await
    }

    /// Unlink `owner` from each of `related`.
    pub async fn remove_from_relation(
        &self,
        cx: &Cx,
        relation: impl Into<RelationRef>,
        owner: impl Into<KeyInput>,
        related: &[KeyInput],
    ) -> Outcome<u64, Error> {
        let descriptor = try_outcome!(self.resolve(relation));
        self.remove(cx, &descriptor, owner.into(), related).await
    }

    /// Link `add` and unlink `remove` concurrently.
    pub async fn add_and_remove_from_relation(
        &self,
        cx: &Cx,
        relation: impl Into<RelationRef>,
        owner: impl Into<KeyInput>,
        add: &[KeyInput],
        remove: &[KeyInput],
    ) -> Outcome<(usize, u64), Error> {
        let descriptor = try_outcome!(self.resolve(relation));
        self.add_and_remove(cx, &descriptor, owner.into(), add, remove)
            .await
    }

    /// Link one `related` entity to each of `owners`.
    pub async fn add_to_inverse_relation(
        &self,
        cx: &Cx,
        relation: impl Into<RelationRef>,
        related: impl Into<KeyInput>,
        owners: &[KeyInput],
    ) -> Outcome<usize, Error> {
        let descriptor = try_outcome!(self.resolve(relation)).mirrored();
        self.add(cx, &descriptor, related.into(), owners).await
    }

    /// Unlink one `related` entity from each of `owners`.
    pub async fn remove_from_inverse_relation(
        &self,
        cx: &Cx,
        relation: impl Into<RelationRef>,
        related: impl Into<KeyInput>,
        owners: &[KeyInput],
    ) -> Outcome<u64, Error> {
        let descriptor = try_outcome!(self.resolve(relation)).mirrored();
        self.remove(cx, &descriptor, related.into(), owners).await
    }

    /// Link `related` to `add` and unlink it from `remove`, concurrently.
    pub async fn add_and_remove_from_inverse_relation(
        &self,
        cx: &Cx,
        relation: impl Into<RelationRef>,
        related: impl Into<KeyInput>,
        add: &[KeyInput],
        remove: &[KeyInput],
    ) -> Outcome<(usize, u64), Error> {
        let descriptor = try_outcome!(self.resolve(relation)).mirrored();
        self.add_and_remove(cx, &descriptor, related.into(), add, remove)
            .await
    }

    async fn add(
        &self,
        cx: &Cx,
        descriptor: &RelationDescriptor,
        owner: KeyInput,
        related: &[KeyInput],
    ) -> Outcome<usize, Error> {
        let conn = outcome!(self.lease(cx).await);
        RelationMutator::new(cx, &*conn, &self.config)
            .add_junction_rows(descriptor, &owner, related)
            .await
    }

    async fn remove(
        &self,
        cx: &Cx,
        descriptor: &RelationDescriptor,
        owner: KeyInput,
        related: &[KeyInput],
    ) -> Outcome<u64, Error> {
        let conn = outcome!(self.lease(cx).await);
        RelationMutator::new(cx, &*conn, &self.config)
            .remove_junction_rows(descriptor, &owner, related)
            .await
    }

    async fn add_and_remove(
        &self,
        cx: &Cx,
        descriptor: &RelationDescriptor,
        owner: KeyInput,
        add: &[KeyInput],
        remove: &[KeyInput],
    ) -> Outcome<(usize, u64), Error> {
        let conn = outcome!(self.lease(cx).await);
        RelationMutator::new(cx, &*conn, &self.config)
            .add_and_remove(descriptor, &owner, add, remove)
            .await
    }

    /// Related keys of a many-to-many relation for every source.
    ///
    /// Keys are concatenated in source order and not deduplicated.
    pub async fn find_relation_ids(
        &self,
        cx: &Cx,
        relation: impl Into<RelationRef>,
        sources: &[KeyInput],
    ) -> Outcome<Vec<KeyMap>, Error> {
        let descriptor = try_outcome!(self.resolve(relation));
        try_outcome!(descriptor.require_many_to_many());
        if sources.is_empty() {
            return Outcome::Ok(Vec::new());
        }
        let conn = outcome!(self.lease(cx).await);
        RelationIdResolver::new(cx, &*conn, &self.config)
            .find_related_keys(&descriptor, sources)
            .await
    }

    /// Delete one row of this entity by primary key.
    pub async fn remove_by_id(&self, cx: &Cx, id: impl Into<KeyInput>) -> Outcome<u64, Error> {
        self.remove_by_ids(cx, &[id.into()]).await
    }

    /// Delete rows of this entity by primary key.
    ///
    /// An empty list, or one whose keys are all NULL, deletes nothing and
    /// issues no statement.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = %self.metadata.name))]
    pub async fn remove_by_ids(&self, cx: &Cx, ids: &[KeyInput]) -> Outcome<u64, Error> {
        let delete = try_outcome!(self.delete_by_ids(ids));
        let Some(delete) = delete else {
            tracing::debug!("No ids to remove");
            return Outcome::Ok(0);
        };
        let conn = outcome!(self.lease(cx).await);
        let removed = outcome!(delete.execute(cx, &*conn).await);
        tracing::info!(
            removed,
            table = %self.metadata.table_name,
            "Removed rows by id"
        );
        Outcome::Ok(removed)
    }

    fn delete_by_ids(&self, ids: &[KeyInput]) -> Result<Option<DeleteQuery>> {
        let columns = self.metadata.primary_columns();
        let keys = KeyExtractor::new(&self.metadata.name, &columns).extract_all(ids)?;
        let total = keys.len();
        let keys: Vec<_> = keys.into_iter().filter(KeyMap::is_complete).collect();
        if keys.len() < total {
            tracing::warn!(
                dropped = total - keys.len(),
                "Dropping ids with NULL components"
            );
        }
        if keys.is_empty() {
            return Ok(None);
        }
        let delete = keys.iter().fold(DeleteQuery::from(&self.metadata.table_name), |d, key| {
            d.or_where(Condition::all(
                key.iter().map(|(c, v)| Condition::eq(c, v.clone())),
            ))
        });
        Ok(Some(delete))
    }

    /// Every record reachable from `root`, root first.
    pub fn extract_objects(&self, root: &RecordRef) -> Result<Vec<GraphNode<'a>>> {
        EntityGraphFlattener::new(self.registry).flatten(root, self.metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::tests::registry;
    use linkage_core::{Connection, RelationErrorKind, Row, Value};
    use linkage_pool::{Pool, PoolConfig};

    struct NoopConnection;

    #[allow(clippy::manual_async_fn)]
    impl Connection for NoopConnection {
        fn query(
            &self,
            _cx: &Cx,
            _sql: &str,
            _params: &[Value],
        ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
            async { Outcome::Ok(Vec::new()) }
        }

        fn execute(
            &self,
            _cx: &Cx,
            _sql: &str,
            _params: &[Value],
        ) -> impl Future<Output = Outcome<u64, Error>> + Send {
            async { Outcome::Ok(0) }
        }

        fn insert(
            &self,
            _cx: &Cx,
            _sql: &str,
            _params: &[Value],
        ) -> impl Future<Output = Outcome<i64, Error>> + Send {
            async { Outcome::Ok(0) }
        }
    }

    fn pool() -> Pool<NoopConnection> {
        Pool::new(PoolConfig::new(1), || Ok(NoopConnection))
    }

    #[test]
    fn unknown_entity_is_not_found() {
        let registry = registry();
        let pool = pool();
        let err = RelationRepository::new(&pool, &registry, "Ghost")
            .err()
            .unwrap();
        assert_eq!(err.relation_kind(), Some(RelationErrorKind::NotFound));
    }

    #[test]
    fn composite_ids_delete_by_or_of_groups() {
        let registry = registry();
        let pool = pool();
        let repo = RelationRepository::new(&pool, &registry, "OrderItem").unwrap();
        let ids = [
            KeyMap::new().with("order_id", 7_i64).with("line_no", 1_i32).into(),
            KeyMap::new().with("orderId", 7_i64).with("lineNo", 2_i32).into(),
        ];
        let (sql, params) = repo.delete_by_ids(&ids).unwrap().unwrap().build();
        assert_eq!(
            sql,
            "DELETE FROM \"order_items\" WHERE (\"order_id\" = $1 AND \"line_no\" = $2) OR (\"order_id\" = $3 AND \"line_no\" = $4)"
        );
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn empty_ids_build_nothing() {
        let registry = registry();
        let pool = pool();
        let repo = RelationRepository::new(&pool, &registry, "User").unwrap();
        assert!(repo.delete_by_ids(&[]).unwrap().is_none());
        assert!(repo.delete_by_ids(&[Value::Null.into()]).unwrap().is_none());
    }

    #[test]
    fn bad_config_is_rejected() {
        let registry = registry();
        let pool = pool();
        let repo = RelationRepository::new(&pool, &registry, "User").unwrap();
        let err = repo
            .with_config(RelationConfig::new().junction_alias("x.y"))
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn accessor_and_path_resolve_alike() {
        let registry = registry();
        let pool = pool();
        let repo = RelationRepository::new(&pool, &registry, "User").unwrap();
        assert_eq!(
            repo.resolve("roles").unwrap(),
            repo.resolve(RelationRef::accessor(|p| p.path("roles"))).unwrap()
        );
    }
}
