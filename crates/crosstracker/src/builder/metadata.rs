//! `WHERE` conditions on `@metadata`.
//!
//! Semantics (`@title`, `@description`, `@assigned_to`) reuse the field
//! strategies over the semantic fields the user can read. `@status` tests
//! the open values of the status semantic.

use super::field::{self, list_match};
use super::{integers, Aliases, BuildContext, ParametrizedFromWhere};
use crate::model::ListBind;
use crate::tql::{ComparisonValue, Operator};
use crate::types::{TqlError, TqlResult};
use crate::validation::{semantic_fields, Metadata, MetadataComparison};

pub fn from_where(
    comparison: &MetadataComparison,
    ctx: &BuildContext<'_>,
    aliases: &mut Aliases,
) -> TqlResult<ParametrizedFromWhere> {
    let (operator, value) = (comparison.operator, &comparison.value);
    match comparison.metadata {
        Metadata::Id => {
            let (condition, parameters) = field::numeric_condition("artifact.id", operator, value)?;
            Ok(ParametrizedFromWhere::condition(condition, parameters))
        }
        Metadata::SubmittedOn => {
            let (condition, parameters) =
                field::date_condition("artifact.submitted_on", operator, value, true, ctx)?;
            Ok(ParametrizedFromWhere::condition(condition, parameters))
        }
        Metadata::LastUpdateDate => {
            let (condition, parameters) =
                field::date_condition("changeset.submitted_on", operator, value, true, ctx)?;
            Ok(ParametrizedFromWhere::condition(condition, parameters))
        }
        Metadata::SubmittedBy => user_column("artifact.submitted_by", operator, value, ctx, aliases),
        Metadata::LastUpdateBy => user_column("changeset.submitted_by", operator, value, ctx, aliases),
        Metadata::Title | Metadata::Description => {
            let fields = semantic_fields(ctx.trackers, ctx.user, |t| {
                if comparison.metadata == Metadata::Title {
                    t.title_field
                } else {
                    t.description_field
                }
            });
            let field_ids: Vec<_> = fields.iter().map(|f| f.field_id).collect();
            let alias = aliases.next("CVText");
            let (condition, parameters) = field::text_condition(&format!("{alias}.value"), operator, value)?;
            Ok(ParametrizedFromWhere {
                from: field::value_join(&alias, &field::text_values(&field_ids)),
                from_parameters: integers(field_ids),
                condition,
                condition_parameters: parameters,
            })
        }
        Metadata::AssignedTo => {
            let fields = semantic_fields(ctx.trackers, ctx.user, |t| t.contributor_field);
            let field_ids: Vec<_> = fields.iter().map(|f| f.field_id).collect();
            field::list_condition(ListBind::Users, &field_ids, operator, value, ctx, aliases)
        }
        Metadata::Status => {
            let open = status_open(aliases);
            let condition = match operator {
                Operator::Equal => open,
                Operator::NotEqual => format!("NOT {open}"),
                _ => return Err(TqlError::Internal(format!("operator {operator} on @status"))),
            };
            Ok(ParametrizedFromWhere::condition(condition, Vec::new()))
        }
        Metadata::ProjectName | Metadata::TrackerName | Metadata::PrettyTitle | Metadata::Artifact => Err(
            TqlError::Internal(format!("{} cannot be compiled in WHERE", comparison.metadata)),
        ),
    }
}

/// Whether the artifact is open. Trackers without status semantic count
/// every artifact as open. Status field permissions are not applied.
pub fn status_open(aliases: &mut Aliases) -> String {
    let semantic = aliases.next("StatusSemantic");
    let value = aliases.next("StatusValue");
    format!(
        "(NOT EXISTS (SELECT 1 FROM tracker_semantic_status AS {semantic} WHERE {semantic}.tracker_id = artifact.tracker_id)
 OR EXISTS (SELECT 1 FROM tracker_changeset_value AS {value}
    INNER JOIN tracker_changeset_value_list AS {value}_list ON {value}_list.changeset_value_id = {value}.id
    INNER JOIN tracker_semantic_status AS {value}_open ON {value}_open.tracker_id = artifact.tracker_id
        AND {value}_open.field_id = {value}.field_id
        AND {value}_open.open_value_id = {value}_list.bindvalue_id
    WHERE {value}.changeset_id = artifact.last_changeset_id))"
    )
}

/// `@submitted_by` and `@last_update_by`: user names or `MYSELF()` against
/// a user id column.
fn user_column(
    column: &str,
    operator: Operator,
    value: &ComparisonValue,
    ctx: &BuildContext<'_>,
    aliases: &mut Aliases,
) -> TqlResult<ParametrizedFromWhere> {
    let alias = aliases.next("SubmitterUser");
    let Some((predicate, parameters)) = list_match(&alias, value, ctx)? else {
        return Err(TqlError::Internal(format!("empty value compared to {column}")));
    };
    let exists = format!(
        "EXISTS (SELECT 1 FROM (SELECT u.id AS id, u.user_name AS label FROM user AS u) AS {alias} WHERE {alias}.id = {column} AND ({predicate}))"
    );
    let condition = if matches!(operator, Operator::NotEqual | Operator::NotIn) {
        format!("NOT {exists}")
    } else {
        exists
    };
    Ok(ParametrizedFromWhere::condition(condition, parameters))
}
