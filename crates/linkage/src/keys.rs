//! Key extraction.
//!
//! Callers identify entities in three shapes: a bare scalar id, a composite-key
//! map, or a whole record. [`KeyExtractor`] normalizes all of them into a
//! [`KeyMap`] holding exactly the requested columns, in declaration order,
//! keyed by database column name.

use linkage_core::{ColumnMetadata, Error, RecordRef, RelationError, Result, Value};
use serde::{Deserialize, Serialize};

/// Column name -> value for one logical identifier, in column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyMap {
    entries: Vec<(String, Value)>,
}

impl KeyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single-column key.
    pub fn single(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new().with(column, value)
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    /// Set a column, replacing an existing value in place.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(c, _)| *c == column) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Non-empty with no NULL component.
    pub fn is_complete(&self) -> bool {
        !self.entries.is_empty() && self.entries.iter().all(|(_, v)| !v.is_null())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(c, v)| (c.as_str(), v))
    }

    /// Values in column order.
    pub fn values(&self) -> Vec<Value> {
        self.entries.iter().map(|(_, v)| v.clone()).collect()
    }
}

impl FromIterator<(String, Value)> for KeyMap {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut key = KeyMap::new();
        for (column, value) in iter {
            key.insert(column, value);
        }
        key
    }
}

/// Anything that identifies an entity.
#[derive(Debug, Clone)]
pub enum KeyInput {
    /// A bare id for a single-column key.
    Scalar(Value),
    /// A composite (or explicit single) key, by column or property name.
    Map(KeyMap),
    /// A record carrying the key columns as properties.
    Record(RecordRef),
}

impl From<Value> for KeyInput {
    fn from(v: Value) -> Self {
        KeyInput::Scalar(v)
    }
}

impl From<i64> for KeyInput {
    fn from(v: i64) -> Self {
        KeyInput::Scalar(Value::BigInt(v))
    }
}

impl From<i32> for KeyInput {
    fn from(v: i32) -> Self {
        KeyInput::Scalar(Value::Int(v))
    }
}

impl From<&str> for KeyInput {
    fn from(v: &str) -> Self {
        KeyInput::Scalar(Value::Text(v.to_string()))
    }
}

impl From<String> for KeyInput {
    fn from(v: String) -> Self {
        KeyInput::Scalar(Value::Text(v))
    }
}

impl From<KeyMap> for KeyInput {
    fn from(v: KeyMap) -> Self {
        KeyInput::Map(v)
    }
}

impl From<RecordRef> for KeyInput {
    fn from(v: RecordRef) -> Self {
        KeyInput::Record(v)
    }
}

impl From<&RecordRef> for KeyInput {
    fn from(v: &RecordRef) -> Self {
        KeyInput::Record(RecordRef::clone(v))
    }
}

/// Extracts keys for one set of columns of one entity.
#[derive(Debug, Clone, Copy)]
pub struct KeyExtractor<'a> {
    entity: &'a str,
    columns: &'a [ColumnMetadata],
}

impl<'a> KeyExtractor<'a> {
    pub fn new(entity: &'a str, columns: &'a [ColumnMetadata]) -> Self {
        Self { entity, columns }
    }

    fn malformed(&self, message: String) -> Error {
        Error::Relation(RelationError::malformed_key(self.entity, message))
    }

    fn column_list(&self) -> String {
        self.columns
            .iter()
            .map(|c| c.database_name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Normalize one input.
    ///
    /// A missing component is an error for composite keys; for single-column
    /// keys it yields a NULL component, which batch operations drop.
    pub fn extract(&self, input: &KeyInput) -> Result<KeyMap> {
        if self.columns.is_empty() {
            return Err(Error::Relation(RelationError::invalid_metadata(
                self.entity,
                None,
                "no key columns to extract",
            )));
        }
        let composite = self.columns.len() > 1;

        match input {
            KeyInput::Scalar(value) => {
                if composite {
                    return Err(self.malformed(format!(
                        "scalar {} given for composite key ({})",
                        value.type_name(),
                        self.column_list()
                    )));
                }
                Ok(KeyMap::single(
                    self.columns[0].database_name.clone(),
                    value.clone(),
                ))
            }
            KeyInput::Map(map) => self.collect(composite, |column| {
                map.get(&column.database_name)
                    .or_else(|| map.get(&column.property_name))
                    .cloned()
            }),
            KeyInput::Record(record) => {
                if record.entity() != self.entity {
                    return Err(self.malformed(format!(
                        "record of entity '{}' given where '{}' is expected",
                        record.entity(),
                        self.entity
                    )));
                }
                self.collect(composite, |column| record.get_value(&column.property_name))
            }
        }
    }

    fn collect(
        &self,
        composite: bool,
        mut lookup: impl FnMut(&ColumnMetadata) -> Option<Value>,
    ) -> Result<KeyMap> {
        let mut key = KeyMap::new();
        for column in self.columns {
            let value = match lookup(column) {
                Some(value) => value,
                None if composite => {
                    return Err(self.malformed(format!(
                        "missing '{}' for composite key ({})",
                        column.property_name,
                        self.column_list()
                    )));
                }
                None => Value::Null,
            };
            key.insert(column.database_name.clone(), value);
        }
        Ok(key)
    }

    /// Normalize a sequence of inputs, preserving order.
    pub fn extract_all(&self, inputs: &[KeyInput]) -> Result<Vec<KeyMap>> {
        inputs.iter().map(|input| self.extract(input)).collect()
    }

    /// Normalize one input and insist every component is present and non-NULL.
    pub fn extract_complete(&self, input: &KeyInput) -> Result<KeyMap> {
        let key = self.extract(input)?;
        if key.is_complete() {
            Ok(key)
        } else {
            Err(self.malformed(format!(
                "key ({}) has a NULL component",
                self.column_list()
            )))
        }
    }
}
