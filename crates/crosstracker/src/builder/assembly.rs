//! Assembly of the statements of one query.

use rusqlite::types::Value as SqlValue;
use serde::Serialize;

use super::select::{self, SelectColumn};
use super::{build_condition, integers, order_by, parameter_to_json, placeholders, visibility};
use super::{Aliases, BuildContext, ParametrizedFromWhere};
use crate::tql::Direction;
use crate::types::{ArtifactId, TqlResult};
use crate::validation::ValidatedQuery;

const BASE_FROM: &str = "FROM tracker_artifact AS artifact
INNER JOIN tracker_changeset AS changeset ON changeset.id = artifact.last_changeset_id";

/// SQL text with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub parameters: Vec<SqlValue>,
}

impl SqlStatement {
    pub fn explain(&self) -> StatementExplanation {
        StatementExplanation {
            sql: self.sql.clone(),
            parameters: self.parameters.iter().map(parameter_to_json).collect(),
        }
    }
}

/// Serializable form of a statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementExplanation {
    pub sql: String,
    pub parameters: Vec<serde_json::Value>,
}

/// Statements of a compiled query.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    /// Page of matching ids; `LIMIT` and `OFFSET` are the last two parameters.
    pub ids: SqlStatement,
    /// Number of matching artifacts.
    pub count: SqlStatement,
    pub columns: Vec<SelectColumn>,
}

/// Serializable form of a compiled query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryExplanation {
    pub ids: StatementExplanation,
    pub count: StatementExplanation,
    /// Select statements, shown for an empty page.
    pub columns: Vec<ColumnExplanation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnExplanation {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    pub statement: StatementExplanation,
}

impl CompiledQuery {
    pub fn explain(&self) -> QueryExplanation {
        QueryExplanation {
            ids: self.ids.explain(),
            count: self.count.explain(),
            columns: self
                .columns
                .iter()
                .map(|column| ColumnExplanation {
                    name: column.name.clone(),
                    column_type: column.column_type.to_string(),
                    statement: column.statement(&[]).explain(),
                })
                .collect(),
        }
    }

    /// Select statements for the artifacts of a page.
    pub fn select_statements(&self, artifact_ids: &[ArtifactId]) -> Vec<(&SelectColumn, SqlStatement)> {
        self.columns
            .iter()
            .map(|column| (column, column.statement(artifact_ids)))
            .collect()
    }
}

/// Compile a validated query into its id, count and select statements.
pub fn compile(
    query: &ValidatedQuery,
    ctx: &BuildContext<'_>,
    limit: usize,
    offset: usize,
) -> TqlResult<CompiledQuery> {
    let mut aliases = Aliases::default();

    let condition = match &query.condition {
        Some(condition) => build_condition(condition, ctx, &mut aliases)?,
        None => ParametrizedFromWhere::condition("1 = 1".to_string(), Vec::new()),
    };
    let (order, direction) = match &query.order_by {
        Some(order) => (order_by::from_order(&order.subject, ctx, &mut aliases)?, order.direction),
        None => (order_by::default_order(), Direction::Descending),
    };
    let (visibility, visibility_parameters) = visibility::condition(ctx);
    let tracker_ids: Vec<_> = ctx.trackers.iter().map(|t| t.id).collect();

    let count_from = lines(&[BASE_FROM, &condition.from]);
    let from = lines(&[BASE_FROM, &condition.from, &order.from]);
    let filter = format!(
        "WHERE artifact.tracker_id IN ({})
    AND {visibility}
    AND ({})",
        placeholders(tracker_ids.len()),
        condition.condition
    );

    // Parameters in textual order: joins, tracker scope, visibility, condition.
    let mut filter_parameters = condition.from_parameters.clone();
    let mut count_parameters = condition.from_parameters.clone();
    filter_parameters.extend(order.parameters.iter().cloned());
    for parameters in [&mut filter_parameters, &mut count_parameters] {
        parameters.extend(integers(tracker_ids.iter().copied()));
        parameters.extend(visibility_parameters.iter().cloned());
        parameters.extend(condition.condition_parameters.iter().cloned());
    }

    let dir = direction.sql();
    let ids_sql = format!(
        "SELECT DISTINCT artifact.id AS id, {} AS order_value\n{from}\n{filter}\nORDER BY order_value {dir}, artifact.id {dir}\nLIMIT ? OFFSET ?",
        order.order_value
    );
    // Saturated: SQLite reads a negative OFFSET as 0.
    filter_parameters.push(SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
    filter_parameters.push(SqlValue::Integer(i64::try_from(offset).unwrap_or(i64::MAX)));

    let count_sql = format!("SELECT COUNT(DISTINCT artifact.id)\n{count_from}\n{filter}");

    let columns = query
        .select
        .iter()
        .map(|column| select::from_select(column, ctx, &mut aliases))
        .collect();

    let compiled = CompiledQuery {
        ids: SqlStatement {
            sql: ids_sql,
            parameters: filter_parameters,
        },
        count: SqlStatement {
            sql: count_sql,
            parameters: count_parameters,
        },
        columns,
    };
    tracing::debug!(
        "Compiled id query with {} parameter(s):\n{}",
        compiled.ids.parameters.len(),
        compiled.ids.sql
    );
    Ok(compiled)
}

fn lines(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|part| part.trim_end())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
