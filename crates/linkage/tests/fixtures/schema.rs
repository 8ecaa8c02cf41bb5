//! Metadata used across the integration tests, loaded the way applications
//! load it: from JSON.

use linkage::MetadataRegistry;

const SCHEMA: &str = r#"[
  {
    "name": "User",
    "table_name": "users",
    "columns": [{ "property_name": "id", "database_name": "id", "is_primary": true }],
    "relations": [
      {
        "property_path": "roles",
        "relation_type": "many_to_many",
        "target": "Role",
        "inverse_side": "users",
        "junction_table": "user_roles",
        "join_columns": [
          { "name": "userId", "referenced": { "property_name": "id", "database_name": "id", "is_primary": true } }
        ],
        "inverse_join_columns": [
          { "name": "roleId", "referenced": { "property_name": "id", "database_name": "id", "is_primary": true } }
        ]
      }
    ]
  },
  {
    "name": "Role",
    "table_name": "roles",
    "columns": [{ "property_name": "id", "database_name": "id", "is_primary": true }],
    "relations": [
      { "property_path": "users", "relation_type": "many_to_many", "target": "User", "inverse_side": "roles" }
    ]
  },
  {
    "name": "Team",
    "table_name": "teams",
    "columns": [{ "property_name": "id", "database_name": "id", "is_primary": true }],
    "relations": [
      { "property_path": "heroes", "relation_type": "one_to_many", "target": "Hero", "inverse_side": "team" }
    ]
  },
  {
    "name": "Hero",
    "table_name": "heroes",
    "columns": [
      { "property_name": "id", "database_name": "id", "is_primary": true },
      { "property_name": "teamId", "database_name": "team_id" }
    ],
    "relations": [
      {
        "property_path": "team",
        "relation_type": "many_to_one",
        "target": "Team",
        "inverse_side": "heroes",
        "join_columns": [
          { "name": "team_id", "referenced": { "property_name": "id", "database_name": "id", "is_primary": true } }
        ]
      }
    ]
  },
  {
    "name": "Product",
    "table_name": "products",
    "columns": [{ "property_name": "sku", "database_name": "sku", "is_primary": true }]
  },
  {
    "name": "OrderItem",
    "table_name": "order_items",
    "columns": [
      { "property_name": "orderId", "database_name": "order_id", "is_primary": true },
      { "property_name": "lineNo", "database_name": "line_no", "is_primary": true }
    ],
    "relations": [
      {
        "property_path": "product",
        "relation_type": "many_to_one",
        "target": "Product",
        "join_columns": [
          { "name": "product_sku", "referenced": { "property_name": "sku", "database_name": "sku", "is_primary": true } }
        ]
      }
    ]
  },
  {
    "name": "Order",
    "table_name": "orders",
    "columns": [
      { "property_name": "tenant", "database_name": "tenant", "is_primary": true },
      { "property_name": "id", "database_name": "id", "is_primary": true }
    ],
    "relations": [
      {
        "property_path": "tags",
        "relation_type": "many_to_many",
        "target": "Tag",
        "inverse_side": "orders",
        "junction_table": "order_tags",
        "join_columns": [
          { "name": "order_tenant", "referenced": { "property_name": "tenant", "database_name": "tenant", "is_primary": true } },
          { "name": "order_id", "referenced": { "property_name": "id", "database_name": "id", "is_primary": true } }
        ],
        "inverse_join_columns": [
          { "name": "tag_tenant", "referenced": { "property_name": "tenant", "database_name": "tenant", "is_primary": true } },
          { "name": "tag_slug", "referenced": { "property_name": "slug", "database_name": "slug", "is_primary": true } }
        ]
      }
    ]
  },
  {
    "name": "Tag",
    "table_name": "tags",
    "columns": [
      { "property_name": "tenant", "database_name": "tenant", "is_primary": true },
      { "property_name": "slug", "database_name": "slug", "is_primary": true }
    ],
    "relations": [
      { "property_path": "orders", "relation_type": "many_to_many", "target": "Order", "inverse_side": "tags" }
    ]
  }
]"#;

pub fn registry() -> MetadataRegistry {
    MetadataRegistry::from_json(SCHEMA).expect("valid test schema")
}
