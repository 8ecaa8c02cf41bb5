//! Error types for linkage operations.

use std::fmt;

/// The primary error type for all linkage operations.
#[derive(Debug)]
pub enum Error {
    /// Statement execution errors, passed through from the driver untouched
    Query(QueryError),
    /// Pool errors
    Pool(PoolError),
    /// Relation resolution and key extraction errors
    Relation(RelationError),
    /// Configuration errors
    Config(ConfigError),
    /// Serialization/deserialization errors
    Serde(String),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub sqlstate: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Deadlock detected
    Deadlock,
    /// Serialization failure (retry may succeed)
    Serialization,
    /// Statement refused before reaching the database
    Unsafe,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct PoolError {
    pub kind: PoolErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolErrorKind {
    /// Pool exhausted (no available connections)
    Exhausted,
    /// Connection factory failed
    Factory,
}

/// Error raised while resolving a relation or normalizing keys for it.
#[derive(Debug, Clone)]
pub struct RelationError {
    pub kind: RelationErrorKind,
    /// Entity the relation was looked up on.
    pub entity: String,
    /// Relation path, when one was involved.
    pub relation: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationErrorKind {
    /// The reference does not name a declared relation (or entity).
    NotFound,
    /// The relation exists but its kind does not support the operation.
    UnsupportedKind,
    /// A key input is missing a component of a composite key, or has the wrong shape.
    MalformedKey,
    /// The metadata itself is inconsistent (missing inverse side, empty join columns).
    InvalidMetadata,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl RelationError {
    pub fn new(
        kind: RelationErrorKind,
        entity: impl Into<String>,
        relation: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            entity: entity.into(),
            relation: relation.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn not_found(entity: impl Into<String>, relation: &str) -> Self {
        let entity = entity.into();
        let message = format!("relation '{}' is not declared on entity '{}'", relation, entity);
        Self::new(RelationErrorKind::NotFound, entity, Some(relation), message)
    }

    pub fn unsupported_kind(
        entity: impl Into<String>,
        relation: &str,
        message: impl Into<String>,
    ) -> Self {
        Self::new(
            RelationErrorKind::UnsupportedKind,
            entity,
            Some(relation),
            message,
        )
    }

    pub fn malformed_key(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(RelationErrorKind::MalformedKey, entity, None, message)
    }

    pub fn invalid_metadata(
        entity: impl Into<String>,
        relation: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(RelationErrorKind::InvalidMetadata, entity, relation, message)
    }
}

impl Error {
    /// Is this a retryable error (deadlock, serialization failure, pool exhaustion)?
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Query(q) => matches!(
                q.kind,
                QueryErrorKind::Deadlock | QueryErrorKind::Serialization
            ),
            Error::Pool(p) => matches!(p.kind, PoolErrorKind::Exhausted),
            _ => false,
        }
    }

    /// The relation error kind, if this is a relation error.
    pub fn relation_kind(&self) -> Option<RelationErrorKind> {
        match self {
            Error::Relation(r) => Some(r.kind),
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Query(e) => {
                if let Some(sqlstate) = &e.sqlstate {
                    write!(f, "Query error (SQLSTATE {}): {}", sqlstate, e.message)
                } else {
                    write!(f, "Query error: {}", e.message)
                }
            }
            Error::Pool(e) => write!(f, "Pool error: {}", e.message),
            Error::Relation(e) => write!(f, "Relation error: {}", e),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Serde(msg) => write!(f, "Serialization error: {}", msg),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Pool(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Relation(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for RelationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            RelationErrorKind::NotFound => "not found",
            RelationErrorKind::UnsupportedKind => "unsupported relation kind",
            RelationErrorKind::MalformedKey => "malformed key",
            RelationErrorKind::InvalidMetadata => "invalid metadata",
        };
        write!(f, "{} ({}): {}", kind, self.entity, self.message)
    }
}

impl std::error::Error for RelationError {}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sqlstate) = &self.sqlstate {
            write!(f, "{} (SQLSTATE {})", self.message, sqlstate)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<PoolError> for Error {
    fn from(err: PoolError) -> Self {
        Error::Pool(err)
    }
}

impl From<RelationError> for Error {
    fn from(err: RelationError) -> Self {
        Error::Relation(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

/// Result type alias for linkage operations.
pub type Result<T> = std::result::Result<T, Error>;
