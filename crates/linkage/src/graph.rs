//! Entity graph flattening.
//!
//! Walks every relation reachable from a root record and returns each distinct
//! record once, paired with its metadata. Records are compared by identity, so
//! cyclic graphs terminate and two equal-valued records are still two nodes.

use linkage_core::record::identity;
use linkage_core::{EntityMetadata, MetadataRegistry, Record, RecordRef, Result};
use std::collections::{HashSet, VecDeque};

/// One record reached during flattening.
#[derive(Debug, Clone)]
pub struct GraphNode<'a> {
    pub metadata: &'a EntityMetadata,
    pub record: RecordRef,
}

/// Breadth-first flattener over a metadata registry.
#[derive(Debug, Clone, Copy)]
pub struct EntityGraphFlattener<'a> {
    registry: &'a MetadataRegistry,
}

impl<'a> EntityGraphFlattener<'a> {
    pub fn new(registry: &'a MetadataRegistry) -> Self {
        Self { registry }
    }

    /// Every record reachable from `root`, root first, in discovery order.
    ///
    /// Unset relations are skipped. A relation whose target entity is not
    /// registered fails with a not-found error.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = %root_metadata.name))]
    pub fn flatten(
        &self,
        root: &RecordRef,
        root_metadata: &'a EntityMetadata,
    ) -> Result<Vec<GraphNode<'a>>> {
        let mut visited: HashSet<*const Record> = HashSet::new();
        let mut queue = VecDeque::new();
        let mut nodes = Vec::new();

        visited.insert(identity(root));
        queue.push_back(GraphNode {
            metadata: root_metadata,
            record: RecordRef::clone(root),
        });

        while let Some(node) = queue.pop_front() {
            for relation in &node.metadata.relations {
                let related = node.record.related(&relation.property_path);
                if related.is_empty() {
                    continue;
                }
                let metadata = self.registry.require(&relation.target)?;
                for record in related {
                    if visited.insert(identity(&record)) {
                        queue.push_back(GraphNode { metadata, record });
                    }
                }
            }
            nodes.push(node);
        }

        tracing::debug!(nodes = nodes.len(), "Flattened entity graph");
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::tests::registry;
    use linkage_core::RelationErrorKind;

    fn entities(nodes: &[GraphNode<'_>]) -> Vec<String> {
        nodes.iter().map(|n| n.record.entity().to_string()).collect()
    }

    #[test]
    fn cycle_yields_each_record_once() {
        let registry = registry();
        let user = Record::new("User").with_value("id", 1_i64).into_ref();
        let role = Record::new("Role")
            .with_value("id", 10_i64)
            .with_many("users", vec![RecordRef::clone(&user)])
            .into_ref();
        user.set_many("roles", vec![RecordRef::clone(&role)]);

        let nodes = EntityGraphFlattener::new(&registry)
            .flatten(&user, registry.require("User").unwrap())
            .unwrap();
        assert_eq!(entities(&nodes), ["User", "Role"]);
        assert_eq!(nodes[1].metadata.name, "Role");

        // Break the Arc cycle.
        user.clear_relations();
    }

    #[test]
    fn equal_values_are_distinct_nodes() {
        let registry = registry();
        let heroes = vec![
            Record::new("Hero").with_value("id", 5_i64).into_ref(),
            Record::new("Hero").with_value("id", 5_i64).into_ref(),
        ];
        let team = Record::new("Team")
            .with_value("id", 1_i64)
            .with_many("heroes", heroes)
            .into_ref();
        let nodes = EntityGraphFlattener::new(&registry)
            .flatten(&team, registry.require("Team").unwrap())
            .unwrap();
        assert_eq!(entities(&nodes), ["Team", "Hero", "Hero"]);
    }

    #[test]
    fn discovery_order_is_breadth_first() {
        let registry = registry();
        let team = Record::new("Team").with_value("id", 1_i64).into_ref();
        let hero = Record::new("Hero")
            .with_value("id", 5_i64)
            .with_one("team", RecordRef::clone(&team))
            .into_ref();
        let profile = Record::new("Profile").with_value("id", 3_i64).into_ref();
        let role = Record::new("Role").with_value("id", 10_i64).into_ref();
        let user = Record::new("User")
            .with_value("id", 1_i64)
            .with_many("roles", vec![role])
            .with_one("profile", profile)
            .into_ref();
        team.set_many("heroes", vec![hero]);

        let nodes = EntityGraphFlattener::new(&registry)
            .flatten(&user, registry.require("User").unwrap())
            .unwrap();
        assert_eq!(entities(&nodes), ["User", "Role", "Profile"]);

        let nodes = EntityGraphFlattener::new(&registry)
            .flatten(&team, registry.require("Team").unwrap())
            .unwrap();
        assert_eq!(entities(&nodes), ["Team", "Hero"]);
        team.clear_relations();
    }

    #[test]
    fn unset_relations_are_skipped() {
        let registry = registry();
        let user = Record::new("User").with_value("id", 1_i64).into_ref();
        user.set_one("profile", None);
        let nodes = EntityGraphFlattener::new(&registry)
            .flatten(&user, registry.require("User").unwrap())
            .unwrap();
        assert_eq!(nodes.len(), 1);
    }

    #[test]
    fn unregistered_target_is_not_found() {
        let registry = MetadataRegistry::new().with(EntityMetadata::new("Note", "notes").relation(
            linkage_core::RelationMetadata::many_to_one(
                "author",
                "Author",
                vec![linkage_core::JoinColumn::new(
                    "author_id",
                    linkage_core::ColumnMetadata::named("id"),
                )],
            ),
        ));
        let author = Record::new("Author").into_ref();
        let note = Record::new("Note").with_one("author", author).into_ref();
        let err = EntityGraphFlattener::new(&registry)
            .flatten(&note, registry.require("Note").unwrap())
            .unwrap_err();
        assert_eq!(err.relation_kind(), Some(RelationErrorKind::NotFound));
    }
}
