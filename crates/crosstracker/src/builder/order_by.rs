//! `ORDER BY` joins and sort expressions.
//!
//! Only single valued subjects reach this builder; multi-valued lists are
//! rejected during validation.

use super::field;
use super::metadata::status_open;
use super::{integers, Aliases, BuildContext, ParametrizedFromOrder};
use crate::model::ListBind;
use crate::types::{FieldId, TqlError, TqlResult};
use crate::validation::{semantic_fields, DuckType, Metadata, ResolvedSearchable};

/// Sort value used when the query has no `ORDER BY`.
pub fn default_order() -> ParametrizedFromOrder {
    ParametrizedFromOrder {
        from: String::new(),
        parameters: Vec::new(),
        order_value: "artifact.id".to_string(),
    }
}

pub fn from_order(
    subject: &ResolvedSearchable,
    ctx: &BuildContext<'_>,
    aliases: &mut Aliases,
) -> TqlResult<ParametrizedFromOrder> {
    match subject {
        ResolvedSearchable::Field(field) => {
            let field_ids = field.field_ids();
            Ok(match field.duck_type {
                DuckType::Date => scalar(aliases.next("OrderDate"), &field::date_values(&field_ids), &field_ids),
                DuckType::Numeric => {
                    scalar(aliases.next("OrderNumeric"), &field::numeric_values(&field_ids), &field_ids)
                }
                DuckType::Text => scalar(aliases.next("OrderText"), &field::text_values(&field_ids), &field_ids),
                DuckType::StaticList => list(aliases.next("OrderList"), ListBind::Static, &field_ids),
                DuckType::UserList => list(aliases.next("OrderList"), ListBind::Users, &field_ids),
                DuckType::UserGroupList => list(aliases.next("OrderList"), ListBind::UserGroups, &field_ids),
            })
        }
        ResolvedSearchable::Metadata { metadata } => metadata_order(*metadata, ctx, aliases),
    }
}

fn scalar(alias: String, subquery: &str, field_ids: &[FieldId]) -> ParametrizedFromOrder {
    ParametrizedFromOrder {
        from: field::value_join(&alias, subquery),
        parameters: integers(field_ids.iter().copied()),
        order_value: format!("{alias}.value"),
    }
}

fn list(alias: String, bind: ListBind, field_ids: &[FieldId]) -> ParametrizedFromOrder {
    let (values, parameters) = field::list_values(bind, field_ids);
    let order_value = match bind {
        ListBind::Static => format!("{alias}.rank"),
        ListBind::Users | ListBind::UserGroups => format!("{alias}.label COLLATE NOCASE"),
    };
    ParametrizedFromOrder {
        from: field::value_join(&alias, &values),
        parameters,
        order_value,
    }
}

fn metadata_order(
    metadata: Metadata,
    ctx: &BuildContext<'_>,
    aliases: &mut Aliases,
) -> TqlResult<ParametrizedFromOrder> {
    let column = |order_value: &str| ParametrizedFromOrder {
        from: String::new(),
        parameters: Vec::new(),
        order_value: order_value.to_string(),
    };
    let user_name = |alias: String, id_column: &str| ParametrizedFromOrder {
        from: format!("LEFT JOIN user AS {alias} ON {alias}.id = {id_column}"),
        parameters: Vec::new(),
        order_value: format!("{alias}.user_name COLLATE NOCASE"),
    };

    Ok(match metadata {
        Metadata::Id => column("artifact.id"),
        Metadata::SubmittedOn => column("artifact.submitted_on"),
        Metadata::LastUpdateDate => column("changeset.submitted_on"),
        Metadata::SubmittedBy => user_name(aliases.next("OrderUser"), "artifact.submitted_by"),
        Metadata::LastUpdateBy => user_name(aliases.next("OrderUser"), "changeset.submitted_by"),
        Metadata::Title | Metadata::Description => {
            let fields = semantic_fields(ctx.trackers, ctx.user, |t| {
                if metadata == Metadata::Title {
                    t.title_field
                } else {
                    t.description_field
                }
            });
            let field_ids: Vec<_> = fields.iter().map(|f| f.field_id).collect();
            scalar(aliases.next("OrderText"), &field::text_values(&field_ids), &field_ids)
        }
        Metadata::AssignedTo => {
            let fields = semantic_fields(ctx.trackers, ctx.user, |t| t.contributor_field);
            let field_ids: Vec<_> = fields.iter().map(|f| f.field_id).collect();
            list(aliases.next("OrderList"), ListBind::Users, &field_ids)
        }
        // Open sorts above closed in descending order.
        Metadata::Status => column(&format!("CASE WHEN {} THEN 1 ELSE 0 END", status_open(aliases))),
        Metadata::ProjectName | Metadata::TrackerName | Metadata::PrettyTitle | Metadata::Artifact => {
            return Err(TqlError::Internal(format!("{metadata} cannot be compiled in ORDER BY")))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::User;
    use chrono::{FixedOffset, TimeZone};

    fn ctx(user: &User) -> BuildContext<'_> {
        let tz = FixedOffset::east_opt(0).unwrap();
        BuildContext {
            trackers: &[],
            user,
            tz,
            now: tz.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_status_order_is_an_open_flag() {
        let user = User::anonymous();
        let order = from_order(
            &ResolvedSearchable::Metadata {
                metadata: Metadata::Status,
            },
            &ctx(&user),
            &mut Aliases::default(),
        )
        .unwrap();
        assert!(order.order_value.starts_with("CASE WHEN (NOT EXISTS"));
        assert!(order.from.is_empty());
    }

    #[test]
    fn test_submitter_order_joins_users() {
        let user = User::anonymous();
        let order = from_order(
            &ResolvedSearchable::Metadata {
                metadata: Metadata::SubmittedBy,
            },
            &ctx(&user),
            &mut Aliases::default(),
        )
        .unwrap();
        assert_eq!(order.from, "LEFT JOIN user AS OrderUser_1 ON OrderUser_1.id = artifact.submitted_by");
        assert_eq!(order.order_value, "OrderUser_1.user_name COLLATE NOCASE");
    }
}
