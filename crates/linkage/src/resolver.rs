//! Relation resolution.
//!
//! Turns a relation reference on an entity into a [`RelationDescriptor`]: one
//! immutable value that already knows which side owns the relation, which
//! table holds the foreign key and, for many-to-many, which junction column
//! group belongs to which side. Everything downstream reads the descriptor and
//! never branches on ownership again.

use linkage_core::{
    ColumnMetadata, EntityMetadata, Error, JoinColumn, MetadataRegistry, PropertiesMap,
    RelationError, RelationMetadata, RelationType, Result, is_valid_property_path,
};
use std::fmt;
use std::sync::Arc;

type Accessor = Arc<dyn Fn(&PropertiesMap) -> String + Send + Sync>;

/// How a caller names a relation.
#[derive(Clone)]
pub enum RelationRef {
    /// A property path such as `"roles"` or `"profile.avatar"`.
    Path(String),
    /// A function picking the path out of the entity's properties map.
    Accessor(Accessor),
}

impl RelationRef {
    /// Reference by accessor, e.g. `RelationRef::accessor(|p| p.path("roles"))`.
    pub fn accessor(f: impl Fn(&PropertiesMap) -> String + Send + Sync + 'static) -> Self {
        RelationRef::Accessor(Arc::new(f))
    }

    /// The canonical property path this reference names on `entity`.
    pub fn resolve_path(&self, entity: &EntityMetadata) -> String {
        match self {
            RelationRef::Path(path) => path.clone(),
            RelationRef::Accessor(f) => f(&entity.properties_map()),
        }
    }
}

impl fmt::Debug for RelationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationRef::Path(path) => f.debug_tuple("Path").field(path).finish(),
            RelationRef::Accessor(_) => f.write_str("Accessor(..)"),
        }
    }
}

impl From<&str> for RelationRef {
    fn from(path: &str) -> Self {
        RelationRef::Path(path.to_string())
    }
}

impl From<String> for RelationRef {
    fn from(path: String) -> Self {
        RelationRef::Path(path)
    }
}

/// Relation kind with ownership folded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    OneToOneOwner,
    OneToOneInverse,
    ManyToOne,
    OneToMany,
    ManyToManyOwner,
    ManyToManyInverse,
}

impl RelationKind {
    pub fn is_many_to_many(self) -> bool {
        matches!(
            self,
            RelationKind::ManyToManyOwner | RelationKind::ManyToManyInverse
        )
    }

    /// Does the declaring entity hold the foreign key (or own the junction)?
    pub fn is_owner(self) -> bool {
        matches!(
            self,
            RelationKind::OneToOneOwner | RelationKind::ManyToOne | RelationKind::ManyToManyOwner
        )
    }

    fn mirrored(self) -> Self {
        match self {
            RelationKind::OneToOneOwner => RelationKind::OneToOneInverse,
            RelationKind::OneToOneInverse => RelationKind::OneToOneOwner,
            RelationKind::ManyToOne => RelationKind::OneToMany,
            RelationKind::OneToMany => RelationKind::ManyToOne,
            RelationKind::ManyToManyOwner => RelationKind::ManyToManyInverse,
            RelationKind::ManyToManyInverse => RelationKind::ManyToManyOwner,
        }
    }
}

/// A junction table and its two column groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JunctionDescriptor {
    pub table: String,
    /// Group 0 points at the owning entity, group 1 at its target.
    pub groups: [Vec<JoinColumn>; 2],
    /// Which group points at the entity the descriptor was resolved for.
    pub local_group: usize,
}

impl JunctionDescriptor {
    /// Junction columns pointing at the local entity.
    pub fn local_columns(&self) -> &[JoinColumn] {
        &self.groups[self.local_group]
    }

    /// Junction columns pointing at the related entity.
    pub fn related_columns(&self) -> &[JoinColumn] {
        &self.groups[1 - self.local_group]
    }
}

/// Fully resolved view of one relation, seen from its declaring entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDescriptor {
    /// Declaring entity.
    pub entity: String,
    pub property_path: String,
    pub kind: RelationKind,
    /// Target entity.
    pub target: String,
    /// Table of the declaring entity.
    pub owner_table: String,
    /// Table of the target entity.
    pub inverse_table: String,
    /// Foreign-key columns, or the local junction group for many-to-many.
    pub join_columns: Vec<JoinColumn>,
    /// The related junction group for many-to-many; empty otherwise.
    pub inverse_join_columns: Vec<JoinColumn>,
    pub owner_primary_columns: Vec<ColumnMetadata>,
    pub inverse_primary_columns: Vec<ColumnMetadata>,
    pub junction: Option<JunctionDescriptor>,
}

fn referenced(columns: &[JoinColumn]) -> Vec<ColumnMetadata> {
    columns.iter().map(|c| c.referenced.clone()).collect()
}

impl RelationDescriptor {
    pub fn is_owning(&self) -> bool {
        self.kind.is_owner()
    }

    fn unsupported(&self, message: &str) -> Error {
        Error::Relation(RelationError::unsupported_kind(
            self.entity.as_str(),
            &self.property_path,
            format!("{} ({:?})", message, self.kind),
        ))
    }

    /// The junction, or an unsupported-kind error for foreign-key relations.
    pub fn require_many_to_many(&self) -> Result<&JunctionDescriptor> {
        match &self.junction {
            Some(junction) if self.kind.is_many_to_many() => Ok(junction),
            _ => Err(self.unsupported("operation requires a many-to-many relation")),
        }
    }

    /// Fails with an unsupported-kind error for many-to-many relations.
    pub fn require_foreign_key(&self) -> Result<()> {
        if self.kind.is_many_to_many() {
            Err(self.unsupported("operation requires a foreign-key relation"))
        } else {
            Ok(())
        }
    }

    /// Table holding the foreign key of a foreign-key relation.
    pub fn foreign_key_table(&self) -> &str {
        if self.is_owning() {
            &self.owner_table
        } else {
            &self.inverse_table
        }
    }

    /// Columns identifying the declaring entity for this relation.
    ///
    /// Junction relations key by the referenced columns of the local group.
    /// Owning foreign keys address the owner row by primary key. Inverse
    /// foreign keys store the owner's referenced columns.
    pub fn owner_key_columns(&self) -> Vec<ColumnMetadata> {
        if self.kind.is_many_to_many() || !self.is_owning() {
            referenced(&self.join_columns)
        } else {
            self.owner_primary_columns.clone()
        }
    }

    /// Columns identifying the related entity for this relation.
    pub fn related_key_columns(&self) -> Vec<ColumnMetadata> {
        if self.kind.is_many_to_many() {
            referenced(&self.inverse_join_columns)
        } else if self.is_owning() {
            referenced(&self.join_columns)
        } else {
            self.inverse_primary_columns.clone()
        }
    }

    /// The same relation seen from the target entity.
    ///
    /// Used by the inverse operations, where one related entity is linked to
    /// many owners.
    pub fn mirrored(&self) -> RelationDescriptor {
        let junction = self.junction.as_ref().map(|j| JunctionDescriptor {
            table: j.table.clone(),
            groups: j.groups.clone(),
            local_group: 1 - j.local_group,
        });
        let (join_columns, inverse_join_columns) = if self.kind.is_many_to_many() {
            (self.inverse_join_columns.clone(), self.join_columns.clone())
        } else {
            (self.join_columns.clone(), Vec::new())
        };
        RelationDescriptor {
            entity: self.target.clone(),
            property_path: self.property_path.clone(),
            kind: self.kind.mirrored(),
            target: self.entity.clone(),
            owner_table: self.inverse_table.clone(),
            inverse_table: self.owner_table.clone(),
            join_columns,
            inverse_join_columns,
            owner_primary_columns: self.inverse_primary_columns.clone(),
            inverse_primary_columns: self.owner_primary_columns.clone(),
            junction,
        }
    }
}

/// Resolves relation references against a metadata registry.
#[derive(Debug, Clone, Copy)]
pub struct RelationResolver<'a> {
    registry: &'a MetadataRegistry,
}

impl<'a> RelationResolver<'a> {
    pub fn new(registry: &'a MetadataRegistry) -> Self {
        Self { registry }
    }

    /// Resolve a relation of a registered entity by entity name.
    pub fn resolve_on(&self, entity: &str, relation: &RelationRef) -> Result<RelationDescriptor> {
        let entity = self.registry.require(entity)?;
        self.resolve(entity, relation)
    }

    /// Resolve `relation` on `entity`.
    pub fn resolve(
        &self,
        entity: &EntityMetadata,
        relation: &RelationRef,
    ) -> Result<RelationDescriptor> {
        let path = relation.resolve_path(entity);
        if !is_valid_property_path(&path) {
            return Err(Error::Relation(RelationError::not_found(
                entity.name.as_str(),
                &path,
            )));
        }
        let declared = entity.find_relation(&path).ok_or_else(|| {
            Error::Relation(RelationError::not_found(entity.name.as_str(), &path))
        })?;
        let target = self.registry.require(&declared.target)?;

        let owner_primary_columns = entity.primary_columns();
        let inverse_primary_columns = target.primary_columns();

        let (kind, join_columns, inverse_join_columns, junction) =
            match (declared.relation_type, declared.is_owning()) {
                (RelationType::ManyToOne, _) => (
                    RelationKind::ManyToOne,
                    declared.join_columns.clone(),
                    Vec::new(),
                    None,
                ),
                (RelationType::OneToOne, true) => (
                    RelationKind::OneToOneOwner,
                    declared.join_columns.clone(),
                    Vec::new(),
                    None,
                ),
                (RelationType::OneToOne, false) => {
                    let owning = self.owning_side(entity, declared, target)?;
                    (
                        RelationKind::OneToOneInverse,
                        owning.join_columns.clone(),
                        Vec::new(),
                        None,
                    )
                }
                (RelationType::OneToMany, _) => {
                    let owning = self.owning_side(entity, declared, target)?;
                    (
                        RelationKind::OneToMany,
                        owning.join_columns.clone(),
                        Vec::new(),
                        None,
                    )
                }
                (RelationType::ManyToMany, true) => {
                    let junction = Self::junction(entity, declared, 0)?;
                    (
                        RelationKind::ManyToManyOwner,
                        declared.join_columns.clone(),
                        declared.inverse_join_columns.clone(),
                        Some(junction),
                    )
                }
                (RelationType::ManyToMany, false) => {
                    let owning = self.owning_side(entity, declared, target)?;
                    let junction = Self::junction(target, owning, 1)?;
                    (
                        RelationKind::ManyToManyInverse,
                        owning.inverse_join_columns.clone(),
                        owning.join_columns.clone(),
                        Some(junction),
                    )
                }
            };

        if join_columns.is_empty() {
            return Err(Error::Relation(RelationError::invalid_metadata(
                entity.name.as_str(),
                Some(&path),
                "relation resolves to no join columns",
            )));
        }

        tracing::trace!(
            entity = %entity.name,
            relation = %path,
            kind = ?kind,
            "Resolved relation"
        );

        Ok(RelationDescriptor {
            entity: entity.name.clone(),
            property_path: path,
            kind,
            target: target.name.clone(),
            owner_table: entity.table_name.clone(),
            inverse_table: target.table_name.clone(),
            join_columns,
            inverse_join_columns,
            owner_primary_columns,
            inverse_primary_columns,
            junction,
        })
    }

    /// The owning relation on `target` that `declared` mirrors.
    fn owning_side<'t>(
        &self,
        entity: &EntityMetadata,
        declared: &RelationMetadata,
        target: &'t EntityMetadata,
    ) -> Result<&'t RelationMetadata> {
        let invalid = |message: String| {
            Error::Relation(RelationError::invalid_metadata(
                entity.name.as_str(),
                Some(&declared.property_path),
                message,
            ))
        };
        let inverse_path = declared
            .inverse_side
            .as_deref()
            .ok_or_else(|| invalid("inverse relation does not name its owning side".to_string()))?;
        let owning = target
            .find_relation(inverse_path)
            .ok_or_else(|| invalid(format!("'{}.{}' does not exist", target.name, inverse_path)))?;
        if !owning.is_owning() {
            return Err(invalid(format!(
                "'{}.{}' is not an owning relation",
                target.name, inverse_path
            )));
        }
        Ok(owning)
    }

    fn junction(
        owner: &EntityMetadata,
        owning: &RelationMetadata,
        local_group: usize,
    ) -> Result<JunctionDescriptor> {
        let table = owning.junction_table.clone().ok_or_else(|| {
            Error::Relation(RelationError::invalid_metadata(
                owner.name.as_str(),
                Some(&owning.property_path),
                "many-to-many relation declares no junction table",
            ))
        })?;
        if owning.inverse_join_columns.is_empty() {
            return Err(Error::Relation(RelationError::invalid_metadata(
                owner.name.as_str(),
                Some(&owning.property_path),
                "many-to-many relation declares no inverse join columns",
            )));
        }
        Ok(JunctionDescriptor {
            table,
            groups: [
                owning.join_columns.clone(),
                owning.inverse_join_columns.clone(),
            ],
            local_group,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use linkage_core::RelationErrorKind;

    /// User <-> Role through user_roles, Team 1:N Hero, OrderItem N:1 Product
    /// with a composite OrderItem key, and a User 1:1 Profile.
    pub(crate) fn registry() -> MetadataRegistry {
        let id = || ColumnMetadata::named("id").primary();
        let tenant = || ColumnMetadata::named("tenant").primary();
        let slug = || ColumnMetadata::named("slug").primary();
        MetadataRegistry::new()
            .with(
                EntityMetadata::new("User", "users")
                    .column(id())
                    .relation(
                        RelationMetadata::many_to_many(
                            "roles",
                            "Role",
                            "user_roles",
                            vec![JoinColumn::new("userId", id())],
                            vec![JoinColumn::new("roleId", id())],
                        )
                        .inverse_side("users"),
                    )
                    .relation(RelationMetadata::one_to_one(
                        "profile",
                        "Profile",
                        vec![JoinColumn::new("profile_id", id())],
                    )),
            )
            .with(
                EntityMetadata::new("Role", "roles")
                    .column(id())
                    .relation(RelationMetadata::many_to_many_inverse("users", "User", "roles")),
            )
            .with(
                EntityMetadata::new("Profile", "profiles")
                    .column(id())
                    .relation(RelationMetadata::one_to_one_inverse("user", "User", "profile")),
            )
            .with(
                EntityMetadata::new("Team", "teams")
                    .column(id())
                    .relation(RelationMetadata::one_to_many("heroes", "Hero", "team")),
            )
            .with(
                EntityMetadata::new("Hero", "heroes")
                    .column(id())
                    .column(ColumnMetadata::named("team_id"))
                    .relation(RelationMetadata::many_to_one(
                        "team",
                        "Team",
                        vec![JoinColumn::new("team_id", id())],
                    )),
            )
            .with(
                EntityMetadata::new("Product", "products")
                    .column(ColumnMetadata::named("sku").primary()),
            )
            .with(
                EntityMetadata::new("OrderItem", "order_items")
                    .column(ColumnMetadata::new("orderId", "order_id").primary())
                    .column(ColumnMetadata::new("lineNo", "line_no").primary())
                    .relation(RelationMetadata::many_to_one(
                        "product",
                        "Product",
                        vec![JoinColumn::new(
                            "product_sku",
                            ColumnMetadata::named("sku").primary(),
                        )],
                    )),
            )
            .with(
                EntityMetadata::new("Order", "orders")
                    .column(tenant())
                    .column(id())
                    .relation(
                        RelationMetadata::many_to_many(
                            "tags",
                            "Tag",
                            "order_tags",
                            vec![
                                JoinColumn::new("order_tenant", tenant()),
                                JoinColumn::new("order_id", id()),
                            ],
                            vec![
                                JoinColumn::new("tag_tenant", tenant()),
                                JoinColumn::new("tag_slug", slug()),
                            ],
                        )
                        .inverse_side("orders"),
                    ),
            )
            .with(
                EntityMetadata::new("Tag", "tags")
                    .column(tenant())
                    .column(slug())
                    .relation(RelationMetadata::many_to_many_inverse("orders", "Order", "tags")),
            )
    }

    #[test]
    fn path_and_accessor_resolve_identically() {
        let registry = registry();
        let resolver = RelationResolver::new(&registry);
        let by_path = resolver.resolve_on("User", &"roles".into()).unwrap();
        let by_accessor = resolver
            .resolve_on("User", &RelationRef::accessor(|p| p.path("roles")))
            .unwrap();
        assert_eq!(by_path, by_accessor);
        assert_eq!(by_path.kind, RelationKind::ManyToManyOwner);
    }

    #[test]
    fn owner_junction_groups() {
        let registry = registry();
        let d = RelationResolver::new(&registry)
            .resolve_on("User", &"roles".into())
            .unwrap();
        let junction = d.require_many_to_many().unwrap();
        assert_eq!(junction.table, "user_roles");
        assert_eq!(junction.local_group, 0);
        assert_eq!(junction.local_columns()[0].name, "userId");
        assert_eq!(junction.related_columns()[0].name, "roleId");
        assert_eq!(d.join_columns[0].name, "userId");
        assert!(d.require_foreign_key().is_err());
    }

    #[test]
    fn inverse_junction_uses_owning_metadata() {
        let registry = registry();
        let d = RelationResolver::new(&registry)
            .resolve_on("Role", &"users".into())
            .unwrap();
        assert_eq!(d.kind, RelationKind::ManyToManyInverse);
        let junction = d.require_many_to_many().unwrap();
        assert_eq!(junction.table, "user_roles");
        assert_eq!(junction.local_group, 1);
        assert_eq!(junction.local_columns()[0].name, "roleId");
        assert_eq!(junction.related_columns()[0].name, "userId");
        assert_eq!(d.join_columns[0].name, "roleId");
        assert_eq!(d.inverse_join_columns[0].name, "userId");
    }

    #[test]
    fn mirrored_owner_matches_inverse() {
        let registry = registry();
        let resolver = RelationResolver::new(&registry);
        let owner = resolver.resolve_on("User", &"roles".into()).unwrap();
        let inverse = resolver.resolve_on("Role", &"users".into()).unwrap();
        let mirrored = owner.mirrored();
        assert_eq!(mirrored.kind, inverse.kind);
        assert_eq!(mirrored.junction, inverse.junction);
        assert_eq!(mirrored.join_columns, inverse.join_columns);
        assert_eq!(mirrored.owner_table, "roles");
    }

    #[test]
    fn one_to_many_resolves_through_many_to_one() {
        let registry = registry();
        let d = RelationResolver::new(&registry)
            .resolve_on("Team", &"heroes".into())
            .unwrap();
        assert_eq!(d.kind, RelationKind::OneToMany);
        assert_eq!(d.foreign_key_table(), "heroes");
        assert_eq!(d.join_columns[0].name, "team_id");
        assert_eq!(d.owner_key_columns()[0].database_name, "id");
        assert!(d.require_many_to_many().is_err());
    }

    #[test]
    fn composite_owner_key_columns() {
        let registry = registry();
        let d = RelationResolver::new(&registry)
            .resolve_on("OrderItem", &"product".into())
            .unwrap();
        assert_eq!(d.kind, RelationKind::ManyToOne);
        assert_eq!(d.foreign_key_table(), "order_items");
        let owner: Vec<_> = d
            .owner_key_columns()
            .into_iter()
            .map(|c| c.database_name)
            .collect();
        assert_eq!(owner, ["order_id", "line_no"]);
        assert_eq!(d.related_key_columns()[0].database_name, "sku");
    }

    #[test]
    fn one_to_one_sides() {
        let registry = registry();
        let resolver = RelationResolver::new(&registry);
        let owner = resolver.resolve_on("User", &"profile".into()).unwrap();
        let inverse = resolver.resolve_on("Profile", &"user".into()).unwrap();
        assert_eq!(owner.kind, RelationKind::OneToOneOwner);
        assert_eq!(inverse.kind, RelationKind::OneToOneInverse);
        assert_eq!(inverse.foreign_key_table(), "users");
    }

    #[test]
    fn unknown_relation_is_not_found() {
        let registry = registry();
        let resolver = RelationResolver::new(&registry);
        for path in ["groups", "roles; --", ""] {
            let err = resolver.resolve_on("User", &path.into()).unwrap_err();
            assert_eq!(err.relation_kind(), Some(RelationErrorKind::NotFound));
        }
        let err = resolver.resolve_on("Ghost", &"roles".into()).unwrap_err();
        assert_eq!(err.relation_kind(), Some(RelationErrorKind::NotFound));
    }
}
