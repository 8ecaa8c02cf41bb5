//! Dynamic records.
//!
//! A [`Record`] is an instance of a registered entity whose shape is only known
//! at runtime: scalar values keyed by property name, plus populated relations
//! pointing at other records. Records are shared through [`RecordRef`] so that a
//! graph of records may contain cycles; identity is the allocation address.
//!
//! # Example
//!
//! ```
//! use linkage_core::record::Record;
//! use linkage_core::value::Value;
//!
//! let role = Record::new("Role").with_value("id", 10_i64).into_ref();
//! let user = Record::new("User")
//!     .with_value("id", 1_i64)
//!     .with_many("roles", vec![role.clone()])
//!     .into_ref();
//!
//! assert_eq!(user.get_value("id"), Some(Value::BigInt(1)));
//! assert_eq!(user.related("roles").len(), 1);
//! ```

use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Shared handle to a record.
pub type RecordRef = Arc<Record>;

/// One property of a record.
#[derive(Clone)]
pub enum Field {
    /// A scalar column value (NULL included).
    Value(Value),
    /// A populated to-one relation.
    One(RecordRef),
    /// A populated to-many relation.
    Many(Vec<RecordRef>),
}

/// A runtime instance of an entity.
pub struct Record {
    entity: String,
    fields: RwLock<BTreeMap<String, Field>>,
}

impl Record {
    /// Create an empty record of the given entity.
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            fields: RwLock::new(BTreeMap::new()),
        }
    }

    /// Set a scalar value.
    pub fn with_value(self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.write().insert(property.into(), Field::Value(value.into()));
        self
    }

    /// Populate a to-one relation.
    pub fn with_one(self, property: impl Into<String>, related: RecordRef) -> Self {
        self.write().insert(property.into(), Field::One(related));
        self
    }

    /// Populate a to-many relation.
    pub fn with_many(self, property: impl Into<String>, related: Vec<RecordRef>) -> Self {
        self.write().insert(property.into(), Field::Many(related));
        self
    }

    /// Wrap in a shared handle.
    pub fn into_ref(self) -> RecordRef {
        Arc::new(self)
    }

    /// Name of the entity this record belongs to.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    // Recover from poisoned locks: the map is never left half-written.
    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Field>> {
        self.fields.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Field>> {
        self.fields.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_value(&self, property: impl Into<String>, value: impl Into<Value>) {
        self.write().insert(property.into(), Field::Value(value.into()));
    }

    /// Set or clear a to-one relation.
    pub fn set_one(&self, property: impl Into<String>, related: Option<RecordRef>) {
        let field = match related {
            Some(r) => Field::One(r),
            None => Field::Value(Value::Null),
        };
        self.write().insert(property.into(), field);
    }

    pub fn set_many(&self, property: impl Into<String>, related: Vec<RecordRef>) {
        self.write().insert(property.into(), Field::Many(related));
    }

    /// Scalar value of a property.
    ///
    /// Returns `None` when the property is absent or holds a relation.
    pub fn get_value(&self, property: &str) -> Option<Value> {
        match self.read().get(property) {
            Some(Field::Value(v)) => Some(v.clone()),
            _ => None,
        }
    }

    /// Raw field of a property.
    pub fn field(&self, property: &str) -> Option<Field> {
        self.read().get(property).cloned()
    }

    /// Records referenced by a relation property, in order.
    ///
    /// Absent, NULL or scalar properties yield nothing.
    pub fn related(&self, property: &str) -> Vec<RecordRef> {
        match self.read().get(property) {
            Some(Field::One(r)) => vec![Arc::clone(r)],
            Some(Field::Many(rs)) => rs.clone(),
            _ => Vec::new(),
        }
    }

    /// Drop every populated relation, breaking reference cycles.
    pub fn clear_relations(&self) {
        self.write()
            .retain(|_, field| matches!(field, Field::Value(_)));
    }

    /// Property names currently set, in sorted order.
    pub fn properties(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }
}

/// Identity of a record: the address of its shared allocation.
pub fn identity(record: &RecordRef) -> *const Record {
    Arc::as_ptr(record)
}

impl fmt::Debug for Field {
    // Relations print the entity only; a full dump would recurse through cycles.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Value(v) => write!(f, "{:?}", v),
            Field::One(r) => write!(f, "One({}@{:p})", r.entity, Arc::as_ptr(r)),
            Field::Many(rs) => write!(f, "Many({} records)", rs.len()),
        }
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("entity", &self.entity)
            .field("fields", &*self.read())
            .finish()
    }
}
