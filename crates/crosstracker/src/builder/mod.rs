//! Compilation of a validated query into parametrized SQL.
//!
//! Every builder emits SQL text with positional `?` parameters listed in
//! textual order. Fragments are joined around the `artifact` (the
//! `tracker_artifact` row) and `changeset` (its last changeset) aliases.
//!
//! - [`field`]: per duck type `FROM`/`WHERE` strategies.
//! - [`metadata`]: `@metadata` conditions.
//! - [`relationship`]: `WITH PARENT`, `IS LINKED TO`, ...
//! - [`visibility`]: artifact level permissions.
//! - [`order_by`]: `ORDER BY` joins and sort value.
//! - [`select`]: one query per selected column.
//! - [`assembly`]: the id, count and select statements of a query.

pub mod assembly;
pub mod field;
pub mod metadata;
pub mod order_by;
pub mod relationship;
pub mod select;
pub mod visibility;

use chrono::{DateTime, FixedOffset};
use rusqlite::types::Value as SqlValue;

use crate::model::{Tracker, User};
use crate::types::TqlResult;
use crate::validation::Condition;

pub use assembly::{compile, CompiledQuery, SqlStatement};

/// What builders need to know about the call.
pub struct BuildContext<'a> {
    pub trackers: &'a [Tracker],
    pub user: &'a User,
    pub tz: FixedOffset,
    pub now: DateTime<FixedOffset>,
}

/// Hands out table aliases unique within one compiled query.
#[derive(Debug, Default)]
pub struct Aliases {
    next: usize,
}

impl Aliases {
    pub fn next(&mut self, prefix: &str) -> String {
        self.next += 1;
        format!("{prefix}_{}", self.next)
    }
}

/// Joins and condition contributed by one part of a `WHERE` clause.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParametrizedFromWhere {
    pub from: String,
    pub from_parameters: Vec<SqlValue>,
    pub condition: String,
    pub condition_parameters: Vec<SqlValue>,
}

impl ParametrizedFromWhere {
    /// A condition needing no join.
    pub fn condition(condition: String, parameters: Vec<SqlValue>) -> Self {
        Self {
            from: String::new(),
            from_parameters: Vec::new(),
            condition,
            condition_parameters: parameters,
        }
    }

    /// Combine parts with `AND` or `OR`, keeping their joins.
    fn combine(parts: Vec<Self>, operator: &str) -> Self {
        let mut combined = Self::default();
        let mut conditions = Vec::with_capacity(parts.len());
        for part in parts {
            if !part.from.is_empty() {
                combined.from.push_str(&part.from);
                combined.from.push('\n');
            }
            combined.from_parameters.extend(part.from_parameters);
            conditions.push(format!("({})", part.condition));
            combined.condition_parameters.extend(part.condition_parameters);
        }
        combined.condition = conditions.join(&format!(" {operator} "));
        combined
    }
}

/// `ORDER BY` joins and the expression sorted on.
#[derive(Debug, Clone, PartialEq)]
pub struct ParametrizedFromOrder {
    pub from: String,
    pub parameters: Vec<SqlValue>,
    pub order_value: String,
}

/// Columns and joins of one selected column.
#[derive(Debug, Clone, PartialEq)]
pub struct ParametrizedSelectFrom {
    pub select: String,
    pub from: String,
    pub parameters: Vec<SqlValue>,
    /// Ordering of multi-valued rows, if any.
    pub order: Option<String>,
}

/// `?, ?, ?`; `NULL` for an empty list so `IN (NULL)` matches nothing.
pub fn placeholders(count: usize) -> String {
    if count == 0 {
        return "NULL".to_string();
    }
    vec!["?"; count].join(", ")
}

pub fn integers(values: impl IntoIterator<Item = i64>) -> Vec<SqlValue> {
    values.into_iter().map(SqlValue::Integer).collect()
}

/// Compile a condition tree.
pub fn build_condition(
    condition: &Condition,
    ctx: &BuildContext<'_>,
    aliases: &mut Aliases,
) -> TqlResult<ParametrizedFromWhere> {
    match condition {
        Condition::Or(operands) | Condition::And(operands) => {
            let parts = operands
                .iter()
                .map(|c| build_condition(c, ctx, aliases))
                .collect::<TqlResult<Vec<_>>>()?;
            let operator = if matches!(condition, Condition::Or(_)) { "OR" } else { "AND" };
            Ok(ParametrizedFromWhere::combine(parts, operator))
        }
        Condition::Field(comparison) => field::from_where(comparison, ctx, aliases),
        Condition::Metadata(comparison) => metadata::from_where(comparison, ctx, aliases),
        Condition::Relationship(relationship) => Ok(relationship::from_where(relationship, aliases)),
    }
}

/// Render parameters for `explain` output.
pub fn parameter_to_json(value: &SqlValue) -> serde_json::Value {
    match value {
        SqlValue::Null => serde_json::Value::Null,
        SqlValue::Integer(n) => serde_json::json!(n),
        SqlValue::Real(n) => serde_json::json!(n),
        SqlValue::Text(s) => serde_json::json!(s),
        SqlValue::Blob(bytes) => serde_json::json!(format!("<{} bytes>", bytes.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_are_unique() {
        let mut aliases = Aliases::default();
        assert_eq!(aliases.next("CVDate"), "CVDate_1");
        assert_eq!(aliases.next("CVDate"), "CVDate_2");
        assert_eq!(aliases.next("CVList"), "CVList_3");
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(3), "?, ?, ?");
        assert_eq!(placeholders(0), "NULL");
    }

    #[test]
    fn test_combine_keeps_parameter_order() {
        let a = ParametrizedFromWhere {
            from: "LEFT JOIN a".to_string(),
            from_parameters: integers([1]),
            condition: "a.value = ?".to_string(),
            condition_parameters: integers([2]),
        };
        let b = ParametrizedFromWhere::condition("b = ?".to_string(), integers([3]));
        let combined = ParametrizedFromWhere::combine(vec![a, b], "OR");
        assert_eq!(combined.from, "LEFT JOIN a\n");
        assert_eq!(combined.condition, "(a.value = ?) OR (b = ?)");
        assert_eq!(combined.from_parameters, integers([1]));
        assert_eq!(combined.condition_parameters, integers([2, 3]));
    }
}
