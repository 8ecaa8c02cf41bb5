//! Configuration for relation operations.

use linkage_core::{ConfigError, Error, Result, is_valid_property_path};

/// Tuning for relation operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationConfig {
    /// Alias given to the junction table in id lookups.
    pub junction_alias: String,
    /// Maximum statements in flight per batch; 0 means unbounded.
    pub max_in_flight: usize,
}

impl Default for RelationConfig {
    fn default() -> Self {
        Self {
            junction_alias: "junction".to_string(),
            max_in_flight: 0,
        }
    }
}

impl RelationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the junction table alias.
    pub fn junction_alias(mut self, alias: impl Into<String>) -> Self {
        self.junction_alias = alias.into();
        self
    }

    /// Cap the number of concurrent statements per batch.
    pub fn max_in_flight(mut self, n: usize) -> Self {
        self.max_in_flight = n;
        self
    }

    /// Check the configuration before use.
    pub fn validate(&self) -> Result<()> {
        if self.junction_alias.contains('.') || !is_valid_property_path(&self.junction_alias) {
            return Err(Error::Config(ConfigError {
                message: format!(
                    "junction alias '{}' is not a plain identifier",
                    self.junction_alias
                ),
                source: None,
            }));
        }
        Ok(())
    }
}
