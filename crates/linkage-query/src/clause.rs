//! WHERE conditions built from column equalities.

use linkage_core::{Dialect, Value};

/// A filter condition.
///
/// Relation predicates are always conjunctions/disjunctions of column equality
/// tests, so that is all this type models. Values are bound as parameters; column
/// names are quoted by the dialect at build time.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `[qualifier.]column = ?`
    Eq {
        qualifier: Option<String>,
        column: String,
        value: Value,
    },
    /// All of the nested conditions.
    And(Vec<Condition>),
    /// Any of the nested conditions.
    Or(Vec<Condition>),
}

impl Condition {
    /// `column = value`
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Eq {
            qualifier: None,
            column: column.into(),
            value: value.into(),
        }
    }

    /// `qualifier.column = value`
    pub fn qualified_eq(
        qualifier: impl Into<String>,
        column: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Condition::Eq {
            qualifier: Some(qualifier.into()),
            column: column.into(),
            value: value.into(),
        }
    }

    /// Conjunction of every condition.
    pub fn all(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Condition::And(conditions.into_iter().collect())
    }

    /// Disjunction of every condition.
    pub fn any(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Condition::Or(conditions.into_iter().collect())
    }

    /// Add an AND condition.
    pub fn and(self, other: Condition) -> Self {
        match self {
            Condition::And(mut parts) => {
                parts.push(other);
                Condition::And(parts)
            }
            cond => Condition::And(vec![cond, other]),
        }
    }

    /// Add an OR condition.
    pub fn or(self, other: Condition) -> Self {
        match self {
            Condition::Or(mut parts) => {
                parts.push(other);
                Condition::Or(parts)
            }
            cond => Condition::Or(vec![cond, other]),
        }
    }

    /// Does this condition constrain nothing?
    pub fn is_empty(&self) -> bool {
        match self {
            Condition::Eq { .. } => false,
            Condition::And(parts) | Condition::Or(parts) => parts.iter().all(Condition::is_empty),
        }
    }

    /// Render to SQL, appending bound values to `params`.
    ///
    /// Placeholders continue numbering after the values already in `params`.
    pub fn build(&self, dialect: Dialect, params: &mut Vec<Value>) -> String {
        self.render(dialect, params, false)
    }

    fn render(&self, dialect: Dialect, params: &mut Vec<Value>, nested: bool) -> String {
        match self {
            Condition::Eq {
                qualifier,
                column,
                value,
            } => {
                params.push(value.clone());
                let column = match qualifier {
                    Some(q) => dialect.quote_qualified(q, column),
                    None => dialect.quote_identifier(column),
                };
                format!("{} = {}", column, dialect.placeholder(params.len()))
            }
            Condition::And(parts) => Self::join(parts, " AND ", dialect, params, nested),
            Condition::Or(parts) => Self::join(parts, " OR ", dialect, params, nested),
        }
    }

    fn join(
        parts: &[Condition],
        separator: &str,
        dialect: Dialect,
        params: &mut Vec<Value>,
        nested: bool,
    ) -> String {
        let parts: Vec<_> = parts.iter().filter(|p| !p.is_empty()).collect();
        if let [single] = parts.as_slice() {
            return single.render(dialect, params, nested);
        }
        let rendered: Vec<_> = parts
            .iter()
            .map(|p| p.render(dialect, params, true))
            .collect();
        let sql = rendered.join(separator);
        if nested { format!("({})", sql) } else { sql }
    }
}
