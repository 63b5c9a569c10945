//! One `SELECT` per result column.
//!
//! Every statement returns `artifact_id` first, followed by the columns of
//! its [`RowShape`]. Scalar values are `LEFT JOIN`ed so each artifact of the
//! page yields a row; list values are `INNER JOIN`ed and yield one row per
//! value. Only fields the user can read are joined, so unreadable values
//! come back as `NULL` or no row at all.

use super::field;
use super::{integers, placeholders, Aliases, BuildContext, ParametrizedSelectFrom, SqlStatement};
use crate::model::{FieldKind, ListBind, Tracker};
use crate::types::{ArtifactId, FieldId, TrackerId};
use crate::validation::{semantic_fields, DuckType, DuckTypedField, Metadata, ResolvedSearchable};

/// Columns following `artifact_id` in the rows of a select statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowShape {
    /// Nothing more.
    Artifact,
    /// `with_time`, `value` (timestamp).
    Date,
    /// `value` (integer or real).
    Numeric,
    /// `value`, `format`.
    Text,
    /// `label`, `color`; one row per value.
    StaticList,
    /// `id`, `label` (user name), `real_name`, `avatar_url`; one row per value.
    UserList,
    /// `id`, `label`; one row per value.
    UserGroupList,
    /// `id`, `user_name`, `real_name`, `avatar_url`, `NULL` for anonymous.
    User,
    /// `public_name`, `icon`.
    Project,
    /// `name`, `color`.
    Tracker,
    /// `item_name`, `color`, `title`.
    PrettyTitle,
}

/// A result column and the fragment fetching it.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectColumn {
    pub name: String,
    pub column_type: &'static str,
    pub shape: RowShape,
    pub fragment: ParametrizedSelectFrom,
}

impl SelectColumn {
    /// Statement fetching the column for the artifacts of a page.
    pub fn statement(&self, artifact_ids: &[ArtifactId]) -> SqlStatement {
        let select = if self.fragment.select.is_empty() {
            String::new()
        } else {
            format!(", {}", self.fragment.select)
        };
        let mut sql = format!(
            "SELECT artifact.id AS artifact_id{select}
FROM tracker_artifact AS artifact
INNER JOIN tracker_changeset AS changeset ON changeset.id = artifact.last_changeset_id
{}
WHERE artifact.id IN ({})",
            self.fragment.from,
            placeholders(artifact_ids.len())
        );
        if let Some(order) = &self.fragment.order {
            sql.push_str(&format!("\nORDER BY artifact.id, {order}"));
        }
        let mut parameters = self.fragment.parameters.clone();
        parameters.extend(integers(artifact_ids.iter().copied()));
        SqlStatement { sql, parameters }
    }
}

pub fn from_select(column: &ResolvedSearchable, ctx: &BuildContext<'_>, aliases: &mut Aliases) -> SelectColumn {
    let (shape, fragment) = match column {
        ResolvedSearchable::Field(field) => field_select(field, aliases),
        ResolvedSearchable::Metadata { metadata } => metadata_select(*metadata, ctx, aliases),
    };
    SelectColumn {
        name: column.name(),
        column_type: column.column_type(),
        shape,
        fragment,
    }
}

fn field_select(field: &DuckTypedField, aliases: &mut Aliases) -> (RowShape, ParametrizedSelectFrom) {
    let field_ids = field.field_ids();
    match field.duck_type {
        DuckType::Date => {
            let with_time: Vec<TrackerId> = field
                .fields
                .iter()
                .filter(|f| matches!(f.kind, FieldKind::Date { with_time: true }))
                .map(|f| f.tracker_id)
                .collect();
            (RowShape::Date, date(aliases.next("SelectDate"), &field_ids, &with_time))
        }
        DuckType::Numeric => {
            let alias = aliases.next("SelectNumeric");
            (
                RowShape::Numeric,
                ParametrizedSelectFrom {
                    select: format!("{alias}.value AS value"),
                    from: field::value_join(&alias, &field::numeric_values(&field_ids)),
                    parameters: integers(field_ids),
                    order: None,
                },
            )
        }
        DuckType::Text => (RowShape::Text, text(aliases.next("SelectText"), &field_ids)),
        DuckType::StaticList => (RowShape::StaticList, list(aliases.next("SelectList"), ListBind::Static, &field_ids)),
        DuckType::UserList => (RowShape::UserList, list(aliases.next("SelectList"), ListBind::Users, &field_ids)),
        DuckType::UserGroupList => (
            RowShape::UserGroupList,
            list(aliases.next("SelectList"), ListBind::UserGroups, &field_ids),
        ),
    }
}

/// Dates flagged `with_time` for the trackers whose field keeps the time.
fn date(alias: String, field_ids: &[FieldId], trackers_with_time: &[TrackerId]) -> ParametrizedSelectFrom {
    let mut parameters = integers(trackers_with_time.iter().copied());
    parameters.extend(integers(field_ids.iter().copied()));
    ParametrizedSelectFrom {
        select: format!(
            "CASE WHEN artifact.tracker_id IN ({}) THEN 1 ELSE 0 END AS with_time, {alias}.value AS value",
            placeholders(trackers_with_time.len())
        ),
        from: field::value_join(&alias, &field::date_values(field_ids)),
        parameters,
        order: None,
    }
}

fn text(alias: String, field_ids: &[FieldId]) -> ParametrizedSelectFrom {
    ParametrizedSelectFrom {
        select: format!("{alias}.value AS value, {alias}.format AS format"),
        from: field::value_join(&alias, &field::text_values(field_ids)),
        parameters: integers(field_ids.iter().copied()),
        order: None,
    }
}

fn list(alias: String, bind: ListBind, field_ids: &[FieldId]) -> ParametrizedSelectFrom {
    let (values, parameters) = field::list_values(bind, field_ids);
    let (select, order) = match bind {
        ListBind::Static => (
            format!("{alias}.label AS label, {alias}.color AS color"),
            format!("{alias}.rank, {alias}.label"),
        ),
        ListBind::Users => (
            format!(
                "{alias}.id AS id, {alias}.label AS label, {alias}.real_name AS real_name, {alias}.avatar_url AS avatar_url"
            ),
            format!("{alias}.label COLLATE NOCASE"),
        ),
        ListBind::UserGroups => (
            format!("{alias}.id AS id, {alias}.label AS label"),
            format!("{alias}.label COLLATE NOCASE"),
        ),
    };
    ParametrizedSelectFrom {
        select,
        from: format!(
            "INNER JOIN (\n{values}\n) AS {alias} ON {alias}.changeset_id = artifact.last_changeset_id"
        ),
        parameters,
        order: Some(order),
    }
}

fn metadata_select(
    metadata: Metadata,
    ctx: &BuildContext<'_>,
    aliases: &mut Aliases,
) -> (RowShape, ParametrizedSelectFrom) {
    let plain = |select: &str| ParametrizedSelectFrom {
        select: select.to_string(),
        from: String::new(),
        parameters: Vec::new(),
        order: None,
    };
    let user = |alias: String, id_column: &str| ParametrizedSelectFrom {
        select: format!(
            "{alias}.id AS id, {alias}.user_name AS user_name, {alias}.real_name AS real_name, {alias}.avatar_url AS avatar_url"
        ),
        from: format!("LEFT JOIN user AS {alias} ON {alias}.id = {id_column}"),
        parameters: Vec::new(),
        order: None,
    };
    let semantic = |pick: fn(&Tracker) -> Option<FieldId>| -> Vec<FieldId> {
        semantic_fields(ctx.trackers, ctx.user, pick)
            .iter()
            .map(|f| f.field_id)
            .collect()
    };

    match metadata {
        Metadata::Artifact => (RowShape::Artifact, plain("")),
        Metadata::Id => (RowShape::Numeric, plain("artifact.id AS value")),
        Metadata::SubmittedOn => (RowShape::Date, plain("1 AS with_time, artifact.submitted_on AS value")),
        Metadata::LastUpdateDate => (RowShape::Date, plain("1 AS with_time, changeset.submitted_on AS value")),
        Metadata::SubmittedBy => (RowShape::User, user(aliases.next("SelectUser"), "artifact.submitted_by")),
        Metadata::LastUpdateBy => (RowShape::User, user(aliases.next("SelectUser"), "changeset.submitted_by")),
        Metadata::Title => (RowShape::Text, text(aliases.next("SelectText"), &semantic(|t| t.title_field))),
        Metadata::Description => (
            RowShape::Text,
            text(aliases.next("SelectText"), &semantic(|t| t.description_field)),
        ),
        Metadata::Status => (
            RowShape::StaticList,
            list(
                aliases.next("SelectList"),
                ListBind::Static,
                &semantic(|t| t.status.as_ref().map(|s| s.field_id)),
            ),
        ),
        Metadata::AssignedTo => (
            RowShape::UserList,
            list(aliases.next("SelectList"), ListBind::Users, &semantic(|t| t.contributor_field)),
        ),
        Metadata::ProjectName => {
            let alias = aliases.next("SelectProject");
            (
                RowShape::Project,
                ParametrizedSelectFrom {
                    select: format!("{alias}.public_name AS public_name, {alias}.icon AS icon"),
                    from: format!(
                        "INNER JOIN tracker AS {alias}_tracker ON {alias}_tracker.id = artifact.tracker_id
INNER JOIN project AS {alias} ON {alias}.id = {alias}_tracker.group_id"
                    ),
                    parameters: Vec::new(),
                    order: None,
                },
            )
        }
        Metadata::TrackerName => {
            let alias = aliases.next("SelectTracker");
            (
                RowShape::Tracker,
                ParametrizedSelectFrom {
                    select: format!("{alias}.name AS name, {alias}.color AS color"),
                    from: format!("INNER JOIN tracker AS {alias} ON {alias}.id = artifact.tracker_id"),
                    parameters: Vec::new(),
                    order: None,
                },
            )
        }
        Metadata::PrettyTitle => {
            let alias = aliases.next("SelectPrettyTitle");
            let title_ids = semantic(|t| t.title_field);
            (
                RowShape::PrettyTitle,
                ParametrizedSelectFrom {
                    select: format!(
                        "{alias}_tracker.item_name AS item_name, {alias}_tracker.color AS color, {alias}.value AS title"
                    ),
                    from: format!(
                        "INNER JOIN tracker AS {alias}_tracker ON {alias}_tracker.id = artifact.tracker_id\n{}",
                        field::value_join(&alias, &field::text_values(&title_ids))
                    ),
                    parameters: integers(title_ids),
                    order: None,
                },
            )
        }
    }
}
