//! Semantic validation of a parsed query.
//!
//! [`validate`] resolves the `FROM` clause into trackers, every field name
//! into a [`DuckTypedField`] and every `@metadata` into [`Metadata`], then
//! checks each comparison against the rules of its subject. All faults of a
//! query are reported together.

pub mod comparison;
pub mod duck_typed;
pub mod from;
pub mod metadata;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::catalog::TrackerCatalog;
use crate::config::EngineConfig;
use crate::model::{Tracker, User};
use crate::tql::{
    Comparison, ComparisonValue, Direction, Expression, Operator, Query, Relationship,
    RelationshipTarget, Searchable,
};
use crate::types::{Faults, TqlError, TqlResult};

pub use comparison::{check_comparison, CheckContext, ComparisonRules, ValueRule};
pub use duck_typed::{semantic_fields, DuckType, DuckTypedField, ResolvedField};
pub use from::{resolve_trackers, QueryScope};
pub use metadata::Metadata;

/// Clause of a query, used in fault messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Clause {
    Select,
    Where,
    OrderBy,
}

impl std::fmt::Display for Clause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Clause::Select => write!(f, "SELECT"),
            Clause::Where => write!(f, "WHERE"),
            Clause::OrderBy => write!(f, "ORDER BY"),
        }
    }
}

/// A validation failure, displayed to the query author.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum Fault {
    #[error("The query must have a FROM clause.")]
    MissingFrom,

    #[error("@project only accepts 'self' or 'aggregated', '{value}' is not supported.")]
    InvalidProjectValue { value: String },

    #[error("FROM can restrict projects once and trackers once, {subject} repeats a restriction.")]
    DuplicatedFromCondition { subject: String },

    #[error("@project = '{value}' can only be used by a query attached to a project.")]
    ProjectContextRequired { value: String },

    #[error("No tracker matches the FROM clause, or you cannot see any of them.")]
    NoTrackerInScope,

    #[error("The query involves {count} trackers, the maximum is {max}.")]
    TooManyTrackers { count: usize, max: usize },

    #[error("The field '{name}' does not exist in the selected trackers or you cannot read it.")]
    FieldNotFound { name: String },

    #[error("The field '{name}' has incompatible types in the selected trackers.")]
    IncompatibleFieldTypes { name: String },

    #[error("The metadata '@{name}' does not exist.")]
    UnknownMetadata { name: String },

    #[error("@{name} cannot be used in {clause}.")]
    MetadataNotAllowed { name: String, clause: Clause },

    #[error("The operator {operator} is not supported for {subject}.")]
    OperatorNotSupported { subject: String, operator: Operator },

    #[error("{subject} cannot be compared to '' with {operator}.")]
    EmptyValueNotAllowed { subject: String, operator: Operator },

    #[error("{value} is not a valid date for {subject}, expected 'YYYY-MM-DD' or 'YYYY-MM-DD HH:MM'.")]
    InvalidDate { subject: String, value: String },

    #[error("{subject} has no time of day, {value} cannot be used.")]
    DateTimeOnDateField { subject: String, value: String },

    #[error("{value} is not a valid number for {subject}.")]
    InvalidNumber { subject: String, value: String },

    #[error("{value} is not a supported value for {subject}.")]
    UnsupportedValue { subject: String, value: String },

    #[error("@status can only be compared to OPEN().")]
    StatusOnlyAcceptsOpen,

    #[error("OPEN() cannot be used with {subject}, it only applies to @status.")]
    OpenNotAllowed { subject: String },

    #[error("NOW() cannot be used with {subject}, it only applies to dates.")]
    NowNotAllowed { subject: String },

    #[error("MYSELF() cannot be used with {subject}.")]
    MyselfNotAllowed { subject: String },

    #[error("MYSELF() cannot be used by anonymous users.")]
    MyselfForAnonymous,

    #[error("Comparison with BETWEEN() when the minimum value is greater than the maximum value is invalid.")]
    InvalidComparisonWithBetweenValuesMinGreaterThanMax { subject: String },

    #[error("ARTIFACT = {id} is invalid, artifact ids are positive integers.")]
    InvalidArtifactId { id: i64 },

    #[error("TRACKER = '' is invalid, a tracker short name is expected.")]
    EmptyTrackerName,

    #[error("WITH TYPE '' is invalid, a link type is expected.")]
    EmptyLinkType,

    #[error("Sorting by {subject} is not supported.")]
    OrderByNotSupported { subject: String },
}

impl Fault {
    /// Stable identifier of the fault kind.
    pub fn code(&self) -> &'static str {
        match self {
            Fault::MissingFrom => "missing_from",
            Fault::InvalidProjectValue { .. } => "invalid_project_value",
            Fault::DuplicatedFromCondition { .. } => "duplicated_from_condition",
            Fault::ProjectContextRequired { .. } => "project_context_required",
            Fault::NoTrackerInScope => "no_tracker_in_scope",
            Fault::TooManyTrackers { .. } => "too_many_trackers",
            Fault::FieldNotFound { .. } => "field_not_found",
            Fault::IncompatibleFieldTypes { .. } => "incompatible_field_types",
            Fault::UnknownMetadata { .. } => "unknown_metadata",
            Fault::MetadataNotAllowed { .. } => "metadata_not_allowed",
            Fault::OperatorNotSupported { .. } => "operator_not_supported",
            Fault::EmptyValueNotAllowed { .. } => "empty_value_not_allowed",
            Fault::InvalidDate { .. } => "invalid_date",
            Fault::DateTimeOnDateField { .. } => "date_time_on_date_field",
            Fault::InvalidNumber { .. } => "invalid_number",
            Fault::UnsupportedValue { .. } => "unsupported_value",
            Fault::StatusOnlyAcceptsOpen => "status_only_accepts_open",
            Fault::OpenNotAllowed { .. } => "open_not_allowed",
            Fault::NowNotAllowed { .. } => "now_not_allowed",
            Fault::MyselfNotAllowed { .. } => "myself_not_allowed",
            Fault::MyselfForAnonymous => "myself_for_anonymous",
            Fault::InvalidComparisonWithBetweenValuesMinGreaterThanMax { .. } => {
                "invalid_comparison_with_between_values_min_greater_than_max"
            }
            Fault::InvalidArtifactId { .. } => "invalid_artifact_id",
            Fault::EmptyTrackerName => "empty_tracker_name",
            Fault::EmptyLinkType => "empty_link_type",
            Fault::OrderByNotSupported { .. } => "order_by_not_supported",
        }
    }
}

// ── Validated tree ──

/// A searchable resolved against the trackers in scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolvedSearchable {
    Field(DuckTypedField),
    Metadata { metadata: Metadata },
}

impl ResolvedSearchable {
    /// Column name in results: the field name or `@metadata`.
    pub fn name(&self) -> String {
        match self {
            ResolvedSearchable::Field(field) => field.name.clone(),
            ResolvedSearchable::Metadata { metadata } => metadata.to_string(),
        }
    }

    pub fn column_type(&self) -> &'static str {
        match self {
            ResolvedSearchable::Field(field) => field.duck_type.column_type(),
            ResolvedSearchable::Metadata { metadata } => metadata.column_type(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldComparison {
    pub field: DuckTypedField,
    pub operator: Operator,
    pub value: ComparisonValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataComparison {
    pub metadata: Metadata,
    pub operator: Operator,
    pub value: ComparisonValue,
}

/// Condition tree whose every leaf passed validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Or(Vec<Condition>),
    And(Vec<Condition>),
    Field(FieldComparison),
    Metadata(MetadataComparison),
    Relationship(Relationship),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedOrder {
    pub subject: ResolvedSearchable,
    pub direction: Direction,
}

/// A query ready to be compiled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedQuery {
    pub trackers: Vec<Tracker>,
    /// Result columns; `@artifact` comes first.
    pub select: Vec<ResolvedSearchable>,
    pub condition: Option<Condition>,
    pub order_by: Option<ResolvedOrder>,
}

// ── Validation ──

/// Validate `query` for `user`, collecting every fault.
pub fn validate(
    query: &Query,
    scope: &QueryScope,
    user: &User,
    catalog: &dyn TrackerCatalog,
    config: &EngineConfig,
    now: DateTime<FixedOffset>,
) -> TqlResult<ValidatedQuery> {
    let trackers = match resolve_trackers(query.from.as_ref(), scope, user, catalog, config)? {
        Ok(trackers) => trackers,
        Err(faults) => return Err(TqlError::Invalid(Faults(faults))),
    };

    let validator = Validator {
        trackers: &trackers,
        ctx: CheckContext {
            user,
            tz: config.timezone(),
            now,
        },
    };
    let mut faults = Vec::new();

    let select = validator.select(&query.select, &mut faults);
    let condition = query
        .condition
        .as_ref()
        .and_then(|expression| validator.expression(expression, &mut faults));
    let order_by = query.order_by.as_ref().and_then(|order| {
        validator
            .order_subject(&order.searchable, &mut faults)
            .map(|subject| ResolvedOrder {
                subject,
                direction: order.direction,
            })
    });

    if !faults.is_empty() {
        tracing::debug!("Query rejected with {} fault(s)", faults.len());
        return Err(TqlError::Invalid(Faults(faults)));
    }

    Ok(ValidatedQuery {
        trackers,
        select,
        condition,
        order_by,
    })
}

struct Validator<'a> {
    trackers: &'a [Tracker],
    ctx: CheckContext<'a>,
}

impl Validator<'_> {
    fn resolve(&self, searchable: &Searchable, clause: Clause) -> Result<ResolvedSearchable, Fault> {
        match searchable {
            Searchable::Field(name) => {
                DuckTypedField::resolve(name, self.trackers, self.ctx.user).map(ResolvedSearchable::Field)
            }
            Searchable::Metadata(name) => {
                let metadata = Metadata::from_name(name).ok_or_else(|| Fault::UnknownMetadata {
                    name: name.clone(),
                })?;
                if !metadata.is_allowed_in(clause) {
                    return Err(Fault::MetadataNotAllowed {
                        name: name.clone(),
                        clause,
                    });
                }
                Ok(ResolvedSearchable::Metadata { metadata })
            }
        }
    }

    fn select(&self, searchables: &[Searchable], faults: &mut Vec<Fault>) -> Vec<ResolvedSearchable> {
        let mut columns = vec![ResolvedSearchable::Metadata {
            metadata: Metadata::Artifact,
        }];
        for searchable in searchables {
            match self.resolve(searchable, Clause::Select) {
                Ok(column) => {
                    if !columns.iter().any(|c| c.name() == column.name()) {
                        columns.push(column);
                    }
                }
                Err(fault) => faults.push(fault),
            }
        }
        columns
    }

    fn expression(&self, expression: &Expression, faults: &mut Vec<Fault>) -> Option<Condition> {
        match expression {
            Expression::Or(operands) => {
                let resolved: Vec<_> = operands.iter().filter_map(|e| self.expression(e, faults)).collect();
                (resolved.len() == operands.len()).then_some(Condition::Or(resolved))
            }
            Expression::And(operands) => {
                let resolved: Vec<_> = operands.iter().filter_map(|e| self.expression(e, faults)).collect();
                (resolved.len() == operands.len()).then_some(Condition::And(resolved))
            }
            Expression::Comparison(comparison) => self.comparison(comparison, faults),
            Expression::Relationship(relationship) => {
                let before = faults.len();
                check_relationship(relationship, faults);
                (faults.len() == before).then(|| Condition::Relationship(relationship.clone()))
            }
        }
    }

    fn comparison(&self, comparison: &Comparison, faults: &mut Vec<Fault>) -> Option<Condition> {
        let subject = comparison.searchable.to_string();
        let resolved = match self.resolve(&comparison.searchable, Clause::Where) {
            Ok(resolved) => resolved,
            Err(fault) => {
                faults.push(fault);
                return None;
            }
        };

        let rules = match &resolved {
            ResolvedSearchable::Field(field) => ComparisonRules::for_field(field),
            ResolvedSearchable::Metadata { metadata } => match ComparisonRules::for_metadata(*metadata) {
                Some(rules) => rules,
                None => {
                    faults.push(Fault::MetadataNotAllowed {
                        name: metadata.name().to_string(),
                        clause: Clause::Where,
                    });
                    return None;
                }
            },
        };

        let found = check_comparison(&subject, &rules, comparison.operator, &comparison.value, &self.ctx);
        if !found.is_empty() {
            faults.extend(found);
            return None;
        }

        Some(match resolved {
            ResolvedSearchable::Field(field) => Condition::Field(FieldComparison {
                field,
                operator: comparison.operator,
                value: comparison.value.clone(),
            }),
            ResolvedSearchable::Metadata { metadata } => Condition::Metadata(MetadataComparison {
                metadata,
                operator: comparison.operator,
                value: comparison.value.clone(),
            }),
        })
    }

    fn order_subject(&self, searchable: &Searchable, faults: &mut Vec<Fault>) -> Option<ResolvedSearchable> {
        let resolved = match self.resolve(searchable, Clause::OrderBy) {
            Ok(resolved) => resolved,
            Err(fault) => {
                faults.push(fault);
                return None;
            }
        };

        let sortable = match &resolved {
            ResolvedSearchable::Field(field) => !(field.duck_type.is_list() && field.is_multiple()),
            ResolvedSearchable::Metadata {
                metadata: Metadata::AssignedTo,
            } => {
                let contributors = semantic_fields(self.trackers, self.ctx.user, |t| t.contributor_field);
                !contributors.iter().any(|f| f.kind.is_multiple())
            }
            ResolvedSearchable::Metadata { .. } => true,
        };
        if !sortable {
            faults.push(Fault::OrderByNotSupported {
                subject: searchable.to_string(),
            });
            return None;
        }
        Some(resolved)
    }
}

fn check_relationship(relationship: &Relationship, faults: &mut Vec<Fault>) {
    match &relationship.target {
        RelationshipTarget::Artifact(id) if *id <= 0 => {
            faults.push(Fault::InvalidArtifactId { id: *id });
        }
        RelationshipTarget::Tracker(name) if name.trim().is_empty() => {
            faults.push(Fault::EmptyTrackerName);
        }
        _ => {}
    }
    if relationship.link_type.as_deref().is_some_and(|t| t.trim().is_empty()) {
        faults.push(Fault::EmptyLinkType);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_codes_are_snake_case() {
        let fault = Fault::OperatorNotSupported {
            subject: "@title".to_string(),
            operator: Operator::Between,
        };
        assert_eq!(fault.code(), "operator_not_supported");
        assert_eq!(fault.to_string(), "The operator BETWEEN() is not supported for @title.");
        let json = serde_json::to_value(&fault).unwrap();
        assert_eq!(json["code"], "operator_not_supported");
        assert_eq!(json["operator"], "between");
    }

    #[test]
    fn test_relationship_checks() {
        let mut faults = Vec::new();
        check_relationship(
            &Relationship {
                kind: crate::tql::RelationshipKind::LinkedTo,
                target: RelationshipTarget::Artifact(0),
                link_type: Some(String::new()),
            },
            &mut faults,
        );
        assert_eq!(
            faults,
            vec![Fault::InvalidArtifactId { id: 0 }, Fault::EmptyLinkType]
        );

        faults.clear();
        check_relationship(
            &Relationship {
                kind: crate::tql::RelationshipKind::WithParent,
                target: RelationshipTarget::Tracker(" ".to_string()),
                link_type: None,
            },
            &mut faults,
        );
        assert_eq!(faults, vec![Fault::EmptyTrackerName]);
    }

    #[test]
    fn test_clause_display() {
        assert_eq!(Clause::OrderBy.to_string(), "ORDER BY");
    }
}
