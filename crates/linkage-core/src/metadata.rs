//! Declarative relation metadata.
//!
//! Entities, their columns and their relations are described once (in code or
//! loaded from JSON) and registered in a [`MetadataRegistry`]. The relation
//! engine only ever reads this model; it never mutates or caches it.
//!
//! Ownership follows the usual ORM rules:
//! - many-to-one is always the owning side (the foreign key lives on this entity)
//! - one-to-many is never owning; it names the many-to-one on the target
//! - one-to-one and many-to-many are owning when they declare join columns

use crate::error::{Error, RelationError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

/// A mapped column of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    /// Property name used on records (e.g. `"orderId"`).
    pub property_name: String,
    /// Column name in the table (e.g. `"order_id"`).
    pub database_name: String,
    /// Part of the primary key.
    #[serde(default)]
    pub is_primary: bool,
}

impl ColumnMetadata {
    pub fn new(property_name: impl Into<String>, database_name: impl Into<String>) -> Self {
        Self {
            property_name: property_name.into(),
            database_name: database_name.into(),
            is_primary: false,
        }
    }

    /// A column whose property and database names are the same.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(name.clone(), name)
    }

    /// Mark this column as part of the primary key.
    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }
}

/// One foreign-key column and the column it references.
///
/// `name` lives in the table that holds the foreign key (the owner's table for
/// many-to-one, the junction table for many-to-many). `referenced` is the column
/// of the entity being pointed at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinColumn {
    pub name: String,
    pub referenced: ColumnMetadata,
}

impl JoinColumn {
    pub fn new(name: impl Into<String>, referenced: ColumnMetadata) -> Self {
        Self {
            name: name.into(),
            referenced,
        }
    }
}

/// The cardinality of a relation as declared on one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl RelationType {
    /// The cardinality of the same relation declared on the other entity.
    pub fn counterpart(self) -> RelationType {
        match self {
            RelationType::OneToOne => RelationType::OneToOne,
            RelationType::OneToMany => RelationType::ManyToOne,
            RelationType::ManyToOne => RelationType::OneToMany,
            RelationType::ManyToMany => RelationType::ManyToMany,
        }
    }
}

/// A relation declared on an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationMetadata {
    /// Property path on the declaring entity (e.g. `"roles"` or `"profile.avatar"`).
    pub property_path: String,
    pub relation_type: RelationType,
    /// Name of the target entity.
    pub target: String,
    /// Property path of the matching relation on the target, if any.
    #[serde(default)]
    pub inverse_side: Option<String>,
    /// Owning side only: foreign-key columns (many-to-one, one-to-one) or the
    /// junction columns pointing at this entity (many-to-many).
    #[serde(default)]
    pub join_columns: Vec<JoinColumn>,
    /// Owning many-to-many only: junction columns pointing at the target.
    #[serde(default)]
    pub inverse_join_columns: Vec<JoinColumn>,
    /// Owning many-to-many only: the junction table.
    #[serde(default)]
    pub junction_table: Option<String>,
}

impl RelationMetadata {
    fn bare(property_path: &str, relation_type: RelationType, target: &str) -> Self {
        Self {
            property_path: property_path.to_string(),
            relation_type,
            target: target.to_string(),
            inverse_side: None,
            join_columns: Vec::new(),
            inverse_join_columns: Vec::new(),
            junction_table: None,
        }
    }

    /// Many-to-one holding `join_columns` on the declaring entity.
    pub fn many_to_one(property_path: &str, target: &str, join_columns: Vec<JoinColumn>) -> Self {
        Self {
            join_columns,
            ..Self::bare(property_path, RelationType::ManyToOne, target)
        }
    }

    /// One-to-many mirrored by the many-to-one `inverse_side` on `target`.
    pub fn one_to_many(property_path: &str, target: &str, inverse_side: &str) -> Self {
        Self::bare(property_path, RelationType::OneToMany, target).inverse_side(inverse_side)
    }

    /// Owning one-to-one holding `join_columns` on the declaring entity.
    pub fn one_to_one(property_path: &str, target: &str, join_columns: Vec<JoinColumn>) -> Self {
        Self {
            join_columns,
            ..Self::bare(property_path, RelationType::OneToOne, target)
        }
    }

    /// Inverse one-to-one mirrored by the owning one-to-one on `target`.
    pub fn one_to_one_inverse(property_path: &str, target: &str, inverse_side: &str) -> Self {
        Self::bare(property_path, RelationType::OneToOne, target).inverse_side(inverse_side)
    }

    /// Owning many-to-many through `junction_table`.
    pub fn many_to_many(
        property_path: &str,
        target: &str,
        junction_table: &str,
        join_columns: Vec<JoinColumn>,
        inverse_join_columns: Vec<JoinColumn>,
    ) -> Self {
        Self {
            join_columns,
            inverse_join_columns,
            junction_table: Some(junction_table.to_string()),
            ..Self::bare(property_path, RelationType::ManyToMany, target)
        }
    }

    /// Inverse many-to-many mirrored by the owning relation on `target`.
    pub fn many_to_many_inverse(property_path: &str, target: &str, inverse_side: &str) -> Self {
        Self::bare(property_path, RelationType::ManyToMany, target).inverse_side(inverse_side)
    }

    /// Set the property path of the matching relation on the target.
    pub fn inverse_side(mut self, inverse_side: &str) -> Self {
        self.inverse_side = Some(inverse_side.to_string());
        self
    }

    /// Does this side hold the foreign key (or define the junction table)?
    pub fn is_owning(&self) -> bool {
        match self.relation_type {
            RelationType::ManyToOne => true,
            RelationType::OneToMany => false,
            RelationType::OneToOne | RelationType::ManyToMany => !self.join_columns.is_empty(),
        }
    }

    pub fn is_many_to_many(&self) -> bool {
        self.relation_type == RelationType::ManyToMany
    }
}

/// Maps property names to their full property paths.
///
/// Accessor-style relation references receive this map and return the path of
/// the relation they mean, e.g. `|props| props.path("roles")`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertiesMap {
    paths: BTreeMap<String, String>,
}

impl PropertiesMap {
    /// Look up the full path of a property.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.paths.get(name).map(String::as_str)
    }

    /// The full path of a property, or the name itself when it is not mapped.
    pub fn path(&self, name: &str) -> String {
        self.get(name).unwrap_or(name).to_string()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// A mapped entity: its table, columns and relations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub name: String,
    pub table_name: String,
    #[serde(default)]
    pub columns: Vec<ColumnMetadata>,
    #[serde(default)]
    pub relations: Vec<RelationMetadata>,
}

impl EntityMetadata {
    pub fn new(name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table_name: table_name.into(),
            columns: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Add a column.
    pub fn column(mut self, column: ColumnMetadata) -> Self {
        self.columns.push(column);
        self
    }

    /// Add a relation.
    pub fn relation(mut self, relation: RelationMetadata) -> Self {
        self.relations.push(relation);
        self
    }

    /// Primary-key columns in declaration order.
    pub fn primary_columns(&self) -> Vec<ColumnMetadata> {
        self.columns.iter().filter(|c| c.is_primary).cloned().collect()
    }

    pub fn has_composite_key(&self) -> bool {
        self.columns.iter().filter(|c| c.is_primary).count() > 1
    }

    /// Find a relation by its property path.
    pub fn find_relation(&self, property_path: &str) -> Option<&RelationMetadata> {
        self.relations
            .iter()
            .find(|r| r.property_path == property_path)
    }

    /// Property name -> property path for every column and relation.
    ///
    /// A nested path (`"profile.avatar"`) is also reachable by its last segment.
    pub fn properties_map(&self) -> PropertiesMap {
        let mut paths = BTreeMap::new();
        let relation_paths = self.relations.iter().map(|r| r.property_path.as_str());
        let column_paths = self.columns.iter().map(|c| c.property_name.as_str());
        for path in column_paths.chain(relation_paths) {
            paths.insert(path.to_string(), path.to_string());
            if let Some((_, leaf)) = path.rsplit_once('.') {
                paths.entry(leaf.to_string()).or_insert_with(|| path.to_string());
            }
        }
        PropertiesMap { paths }
    }
}

fn property_path_regex() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$").ok())
        .as_ref()
}

/// Is `path` a syntactically valid (possibly dotted) property path?
pub fn is_valid_property_path(path: &str) -> bool {
    match property_path_regex() {
        Some(regex) => regex.is_match(path),
        None => {
            tracing::warn!(path = path, "property path pattern failed to compile");
            false
        }
    }
}

/// All known entities, keyed by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataRegistry {
    entities: HashMap<String, EntityMetadata>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity, replacing any previous entity of the same name.
    pub fn register(&mut self, entity: EntityMetadata) -> &mut Self {
        self.entities.insert(entity.name.clone(), entity);
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, entity: EntityMetadata) -> Self {
        self.register(entity);
        self
    }

    /// Load a registry from a JSON array of entities and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let entities: Vec<EntityMetadata> = serde_json::from_str(json)?;
        let registry = entities
            .into_iter()
            .fold(Self::new(), |registry, entity| registry.with(entity));
        registry.validate()?;
        tracing::debug!(entities = registry.len(), "Loaded relation metadata");
        Ok(registry)
    }

    pub fn entity(&self, name: &str) -> Option<&EntityMetadata> {
        self.entities.get(name)
    }

    /// Look up an entity, failing with a not-found relation error.
    pub fn require(&self, name: &str) -> Result<&EntityMetadata> {
        self.entities.get(name).ok_or_else(|| {
            Error::Relation(RelationError::new(
                crate::error::RelationErrorKind::NotFound,
                name,
                None,
                format!("entity '{}' is not registered", name),
            ))
        })
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Check that every relation is well formed.
    ///
    /// - property paths are valid identifiers
    /// - targets are registered
    /// - owning sides carry join columns, junction sides carry a junction table
    /// - inverse sides name an owning relation on their target, of the
    ///   matching cardinality
    pub fn validate(&self) -> Result<()> {
        for entity in self.entities.values() {
            for relation in &entity.relations {
                self.validate_relation(entity, relation)?;
            }
        }
        Ok(())
    }

    fn validate_relation(&self, entity: &EntityMetadata, relation: &RelationMetadata) -> Result<()> {
        let path = relation.property_path.as_str();
        let invalid = |message: String| {
            Error::Relation(RelationError::invalid_metadata(
                entity.name.as_str(),
                Some(path),
                message,
            ))
        };

        if !is_valid_property_path(path) {
            return Err(invalid(format!("'{}' is not a valid property path", path)));
        }
        let target = self
            .entity(&relation.target)
            .ok_or_else(|| invalid(format!("target entity '{}' is not registered", relation.target)))?;

        if relation.is_owning() {
            if relation.join_columns.is_empty() {
                return Err(invalid("owning relation declares no join columns".to_string()));
            }
            if relation.is_many_to_many()
                && (relation.junction_table.is_none() || relation.inverse_join_columns.is_empty())
            {
                return Err(invalid(
                    "owning many-to-many needs a junction table and inverse join columns"
                        .to_string(),
                ));
            }
            return Ok(());
        }

        let inverse_path = relation
            .inverse_side
            .as_deref()
            .ok_or_else(|| invalid("inverse relation does not name its owning side".to_string()))?;
        match target.find_relation(inverse_path) {
            Some(owner) if owner.relation_type != relation.relation_type.counterpart() => {
                Err(invalid(format!(
                    "'{}.{}' is {:?}, expected {:?}",
                    target.name,
                    inverse_path,
                    owner.relation_type,
                    relation.relation_type.counterpart()
                )))
            }
            Some(owner) if owner.is_owning() => Ok(()),
            Some(_) => Err(invalid(format!(
                "'{}.{}' is not an owning relation",
                target.name, inverse_path
            ))),
            None => Err(invalid(format!(
                "'{}.{}' does not exist",
                target.name, inverse_path
            ))),
        }
    }
}
