//! `FROM`/`WHERE` strategies of duck typed fields.
//!
//! Scalar fields (date, numeric, text) are joined through a `LEFT JOIN` on a
//! subquery giving `(changeset_id, value)` for every field id sharing the
//! name, so artifacts without a value still reach the condition as `NULL`.
//! List fields are tested with `EXISTS` over `(changeset_id, id, label)`
//! since a changeset may hold several values of one list.
//!
//! The column level helpers are shared with `@metadata` conditions.

use rusqlite::types::Value as SqlValue;

use super::{integers, placeholders, Aliases, BuildContext, ParametrizedFromWhere};
use crate::datetime::{self, DateLiteral, TimestampRange};
use crate::model::{FieldKind, ListBind};
use crate::tql::{ComparisonValue, Operator, Value};
use crate::types::{FieldId, TqlError, TqlResult, TrackerId};
use crate::validation::{DuckType, FieldComparison};

pub fn from_where(
    comparison: &FieldComparison,
    ctx: &BuildContext<'_>,
    aliases: &mut Aliases,
) -> TqlResult<ParametrizedFromWhere> {
    let field = &comparison.field;
    let field_ids = field.field_ids();
    let (operator, value) = (comparison.operator, &comparison.value);

    match field.duck_type {
        DuckType::Date => {
            let alias = aliases.next("CVDate");
            let column = format!("{alias}.value");
            let trackers_with_time: Vec<TrackerId> = field
                .fields
                .iter()
                .filter(|f| matches!(f.kind, FieldKind::Date { with_time: true }))
                .map(|f| f.tracker_id)
                .collect();
            let uniform = trackers_with_time.is_empty() || trackers_with_time.len() == field.fields.len();
            let (condition, parameters) = if uniform {
                date_condition(&column, operator, value, !trackers_with_time.is_empty(), ctx)?
            } else {
                mixed_date_condition(&column, operator, value, &trackers_with_time, ctx)?
            };
            Ok(joined(value_join(&alias, &date_values(&field_ids)), &field_ids, condition, parameters))
        }
        DuckType::Numeric => {
            let alias = aliases.next("CVNumeric");
            let (condition, parameters) = numeric_condition(&format!("{alias}.value"), operator, value)?;
            Ok(joined(value_join(&alias, &numeric_values(&field_ids)), &field_ids, condition, parameters))
        }
        DuckType::Text => {
            let alias = aliases.next("CVText");
            let (condition, parameters) = text_condition(&format!("{alias}.value"), operator, value)?;
            Ok(joined(value_join(&alias, &text_values(&field_ids)), &field_ids, condition, parameters))
        }
        DuckType::StaticList => list_condition(ListBind::Static, &field_ids, operator, value, ctx, aliases),
        DuckType::UserList => list_condition(ListBind::Users, &field_ids, operator, value, ctx, aliases),
        DuckType::UserGroupList => {
            list_condition(ListBind::UserGroups, &field_ids, operator, value, ctx, aliases)
        }
    }
}

fn joined(from: String, field_ids: &[FieldId], condition: String, parameters: Vec<SqlValue>) -> ParametrizedFromWhere {
    ParametrizedFromWhere {
        from,
        from_parameters: integers(field_ids.iter().copied()),
        condition,
        condition_parameters: parameters,
    }
}

// ── Value subqueries ──

/// `LEFT JOIN` of a `(changeset_id, value)` subquery on the last changeset.
pub fn value_join(alias: &str, subquery: &str) -> String {
    format!("LEFT JOIN (\n{subquery}\n) AS {alias} ON {alias}.changeset_id = artifact.last_changeset_id")
}

/// Date values of `field_ids`; one parameter per field id.
pub fn date_values(field_ids: &[FieldId]) -> String {
    format!(
        "SELECT cv.changeset_id AS changeset_id, v.value AS value
FROM tracker_changeset_value AS cv
INNER JOIN tracker_changeset_value_date AS v ON v.changeset_value_id = cv.id
WHERE cv.field_id IN ({})",
        placeholders(field_ids.len())
    )
}

/// Integer and float values of `field_ids`; one parameter per field id.
pub fn numeric_values(field_ids: &[FieldId]) -> String {
    format!(
        "SELECT cv.changeset_id AS changeset_id, COALESCE(i.value, f.value) AS value
FROM tracker_changeset_value AS cv
LEFT JOIN tracker_changeset_value_int AS i ON i.changeset_value_id = cv.id
LEFT JOIN tracker_changeset_value_float AS f ON f.changeset_value_id = cv.id
WHERE cv.field_id IN ({})",
        placeholders(field_ids.len())
    )
}

/// Text values of `field_ids`; one parameter per field id.
pub fn text_values(field_ids: &[FieldId]) -> String {
    format!(
        "SELECT cv.changeset_id AS changeset_id, v.value AS value, v.body_format AS format
FROM tracker_changeset_value AS cv
INNER JOIN tracker_changeset_value_text AS v ON v.changeset_value_id = cv.id
WHERE cv.field_id IN ({})",
        placeholders(field_ids.len())
    )
}

/// Values of list fields as `(changeset_id, field_id, id, label, ...)`.
///
/// Closed and open list values are unioned; the field ids are bound twice.
/// Extra columns depend on the bind: `color, rank` for static values,
/// `real_name, avatar_url` for users.
pub fn list_values(bind: ListBind, field_ids: &[FieldId]) -> (String, Vec<SqlValue>) {
    let ids = placeholders(field_ids.len());
    let sql = match bind {
        ListBind::Static => format!(
            "SELECT cv.changeset_id AS changeset_id, cv.field_id AS field_id, sv.id AS id, sv.label AS label, sv.color AS color, sv.rank AS rank
FROM tracker_changeset_value AS cv
INNER JOIN tracker_changeset_value_list AS l ON l.changeset_value_id = cv.id
INNER JOIN tracker_field_list_bind_static_value AS sv ON sv.id = l.bindvalue_id
WHERE cv.field_id IN ({ids})
UNION ALL
SELECT cv.changeset_id, cv.field_id, sv.id, COALESCE(sv.label, ov.label), sv.color, COALESCE(sv.rank, 2147483647)
FROM tracker_changeset_value AS cv
INNER JOIN tracker_changeset_value_openlist AS ol ON ol.changeset_value_id = cv.id
LEFT JOIN tracker_field_list_bind_static_value AS sv ON sv.id = ol.bindvalue_id
LEFT JOIN tracker_field_openlist_value AS ov ON ov.id = ol.openvalue_id
WHERE cv.field_id IN ({ids})"
        ),
        ListBind::Users => format!(
            "SELECT cv.changeset_id AS changeset_id, cv.field_id AS field_id, u.id AS id, u.user_name AS label, u.real_name AS real_name, u.avatar_url AS avatar_url
FROM tracker_changeset_value AS cv
INNER JOIN tracker_changeset_value_list AS l ON l.changeset_value_id = cv.id
INNER JOIN user AS u ON u.id = l.bindvalue_id
WHERE cv.field_id IN ({ids})
UNION ALL
SELECT cv.changeset_id, cv.field_id, u.id, COALESCE(u.user_name, ov.label), u.real_name, u.avatar_url
FROM tracker_changeset_value AS cv
INNER JOIN tracker_changeset_value_openlist AS ol ON ol.changeset_value_id = cv.id
LEFT JOIN user AS u ON u.id = ol.bindvalue_id
LEFT JOIN tracker_field_openlist_value AS ov ON ov.id = ol.openvalue_id
WHERE cv.field_id IN ({ids})"
        ),
        ListBind::UserGroups => format!(
            "SELECT cv.changeset_id AS changeset_id, cv.field_id AS field_id, g.id AS id, g.name AS label
FROM tracker_changeset_value AS cv
INNER JOIN tracker_changeset_value_list AS l ON l.changeset_value_id = cv.id
INNER JOIN ugroup AS g ON g.id = l.bindvalue_id
WHERE cv.field_id IN ({ids})
UNION ALL
SELECT cv.changeset_id, cv.field_id, g.id, COALESCE(g.name, ov.label)
FROM tracker_changeset_value AS cv
INNER JOIN tracker_changeset_value_openlist AS ol ON ol.changeset_value_id = cv.id
LEFT JOIN ugroup AS g ON g.id = ol.bindvalue_id
LEFT JOIN tracker_field_openlist_value AS ov ON ov.id = ol.openvalue_id
WHERE cv.field_id IN ({ids})"
        ),
    };
    let mut parameters = integers(field_ids.iter().copied());
    parameters.extend(integers(field_ids.iter().copied()));
    (sql, parameters)
}

// ── Column conditions ──

fn unexpected(value: &Value) -> TqlError {
    TqlError::Internal(format!("unexpected value {value} reached the SQL builder"))
}

/// Timestamp range of a date value; `None` for `''`.
pub fn date_range(value: &Value, with_time: bool, ctx: &BuildContext<'_>) -> TqlResult<Option<TimestampRange>> {
    match value {
        Value::String(s) if s.is_empty() => Ok(None),
        Value::String(s) => DateLiteral::parse(s)
            .map(|literal| Some(datetime::literal_range(&literal, with_time, ctx.tz)))
            .ok_or_else(|| unexpected(value)),
        Value::CurrentDateTime(period) => datetime::now_range(ctx.now, period.as_ref(), with_time, ctx.tz)
            .map(Some)
            .ok_or_else(|| unexpected(value)),
        _ => Err(unexpected(value)),
    }
}

fn single(value: &ComparisonValue) -> TqlResult<&Value> {
    match value {
        ComparisonValue::Single(v) => Ok(v),
        _ => Err(TqlError::Internal("expected a single value".to_string())),
    }
}

/// Emptiness test used by `= ''` and `!= ''`.
fn empty_condition(column: &str, operator: Operator) -> String {
    if operator == Operator::NotEqual {
        format!("{column} IS NOT NULL")
    } else {
        format!("{column} IS NULL")
    }
}

/// Condition on a timestamp column.
pub fn date_condition(
    column: &str,
    operator: Operator,
    value: &ComparisonValue,
    with_time: bool,
    ctx: &BuildContext<'_>,
) -> TqlResult<(String, Vec<SqlValue>)> {
    if let ComparisonValue::Between { min, max } = value {
        let floor = date_range(min, with_time, ctx)?.ok_or_else(|| unexpected(min))?.floor;
        let ceil = date_range(max, with_time, ctx)?.ok_or_else(|| unexpected(max))?.ceil;
        return Ok((format!("{column} BETWEEN ? AND ?"), integers([floor, ceil])));
    }

    let Some(range) = date_range(single(value)?, with_time, ctx)? else {
        return Ok((empty_condition(column, operator), Vec::new()));
    };
    Ok(match operator {
        Operator::Equal => (format!("{column} BETWEEN ? AND ?"), integers([range.floor, range.ceil])),
        Operator::NotEqual => (
            format!("({column} IS NULL OR {column} NOT BETWEEN ? AND ?)"),
            integers([range.floor, range.ceil]),
        ),
        Operator::LesserThan => (format!("{column} < ?"), integers([range.floor])),
        Operator::LesserThanOrEqual => (format!("{column} <= ?"), integers([range.ceil])),
        Operator::GreaterThan => (format!("{column} > ?"), integers([range.ceil])),
        Operator::GreaterThanOrEqual => (format!("{column} >= ?"), integers([range.floor])),
        Operator::Between | Operator::In | Operator::NotIn => {
            return Err(TqlError::Internal(format!("operator {operator} on a date")))
        }
    })
}

/// Date condition for a name shared by datetime and date only fields: the
/// trackers keeping the time compare minutes, the others whole days.
fn mixed_date_condition(
    column: &str,
    operator: Operator,
    value: &ComparisonValue,
    trackers_with_time: &[TrackerId],
    ctx: &BuildContext<'_>,
) -> TqlResult<(String, Vec<SqlValue>)> {
    let (timed, timed_parameters) = date_condition(column, operator, value, true, ctx)?;
    let (daily, daily_parameters) = date_condition(column, operator, value, false, ctx)?;
    let trackers = placeholders(trackers_with_time.len());

    let mut parameters = integers(trackers_with_time.iter().copied());
    parameters.extend(timed_parameters);
    parameters.extend(integers(trackers_with_time.iter().copied()));
    parameters.extend(daily_parameters);
    Ok((
        format!(
            "((artifact.tracker_id IN ({trackers}) AND {timed}) OR (artifact.tracker_id NOT IN ({trackers}) AND {daily}))"
        ),
        parameters,
    ))
}

fn number(value: &Value) -> TqlResult<Option<SqlValue>> {
    match value {
        Value::Integer(n) => Ok(Some(SqlValue::Integer(*n))),
        Value::Float(n) => Ok(Some(SqlValue::Real(*n))),
        Value::String(s) if s.is_empty() => Ok(None),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(n) = s.parse::<i64>() {
                Ok(Some(SqlValue::Integer(n)))
            } else {
                s.parse::<f64>()
                    .map(|n| Some(SqlValue::Real(n)))
                    .map_err(|_| unexpected(value))
            }
        }
        _ => Err(unexpected(value)),
    }
}

/// Condition on a numeric column.
pub fn numeric_condition(
    column: &str,
    operator: Operator,
    value: &ComparisonValue,
) -> TqlResult<(String, Vec<SqlValue>)> {
    if let ComparisonValue::Between { min, max } = value {
        let min = number(min)?.ok_or_else(|| unexpected(min))?;
        let max = number(max)?.ok_or_else(|| unexpected(max))?;
        return Ok((format!("{column} BETWEEN ? AND ?"), vec![min, max]));
    }

    let Some(n) = number(single(value)?)? else {
        return Ok((empty_condition(column, operator), Vec::new()));
    };
    Ok(match operator {
        Operator::NotEqual => (format!("({column} IS NULL OR {column} <> ?)"), vec![n]),
        Operator::Equal
        | Operator::LesserThan
        | Operator::LesserThanOrEqual
        | Operator::GreaterThan
        | Operator::GreaterThanOrEqual => (format!("{column} {} ?", operator.sql()), vec![n]),
        Operator::Between | Operator::In | Operator::NotIn => {
            return Err(TqlError::Internal(format!("operator {operator} on a number")))
        }
    })
}

/// `%text%` with `LIKE` wildcards escaped by `\`.
pub fn contains_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Condition on a text column: `=` means "contains".
pub fn text_condition(
    column: &str,
    operator: Operator,
    value: &ComparisonValue,
) -> TqlResult<(String, Vec<SqlValue>)> {
    let text = match single(value)? {
        Value::String(s) => s,
        other => return Err(unexpected(other)),
    };
    let negated = operator == Operator::NotEqual;
    Ok(match (text.is_empty(), negated) {
        (true, false) => (format!("({column} IS NULL OR {column} = '')"), Vec::new()),
        (true, true) => (format!("({column} IS NOT NULL AND {column} <> '')"), Vec::new()),
        (false, false) => (
            format!("{column} LIKE ? ESCAPE '\\'"),
            vec![SqlValue::Text(contains_pattern(text))],
        ),
        (false, true) => (
            format!("({column} IS NULL OR {column} NOT LIKE ? ESCAPE '\\')"),
            vec![SqlValue::Text(contains_pattern(text))],
        ),
    })
}

/// Labels and `MYSELF()` of a list comparison, as `label IN (...) OR id = ?`.
///
/// Returns `None` for `''`.
pub fn list_match(
    alias: &str,
    value: &ComparisonValue,
    ctx: &BuildContext<'_>,
) -> TqlResult<Option<(String, Vec<SqlValue>)>> {
    let values = value.values();
    if values.iter().all(|v| v.is_empty_string()) {
        return Ok(None);
    }

    let mut labels = Vec::new();
    let mut myself = false;
    for v in values {
        match v {
            Value::String(s) if !s.is_empty() => labels.push(SqlValue::Text(s.clone())),
            Value::String(_) => {}
            Value::CurrentUser => myself = true,
            other => return Err(unexpected(other)),
        }
    }

    let mut predicates = Vec::new();
    if !labels.is_empty() {
        predicates.push(format!("{alias}.label COLLATE NOCASE IN ({})", placeholders(labels.len())));
    }
    let mut parameters = labels;
    if myself {
        predicates.push(format!("{alias}.id = ?"));
        parameters.push(SqlValue::Integer(ctx.user.id));
    }
    Ok(Some((predicates.join(" OR "), parameters)))
}

/// `EXISTS` test of list values of `field_ids`.
pub fn list_condition(
    bind: ListBind,
    field_ids: &[FieldId],
    operator: Operator,
    value: &ComparisonValue,
    ctx: &BuildContext<'_>,
    aliases: &mut Aliases,
) -> TqlResult<ParametrizedFromWhere> {
    let alias = aliases.next("CVList");
    let (values, mut parameters) = list_values(bind, field_ids);
    let negated = matches!(operator, Operator::NotEqual | Operator::NotIn);

    let exists = |predicate: Option<&str>| {
        let mut sql = format!(
            "EXISTS (SELECT 1 FROM (\n{values}\n) AS {alias} WHERE {alias}.changeset_id = artifact.last_changeset_id"
        );
        if let Some(predicate) = predicate {
            sql.push_str(&format!(" AND ({predicate})"));
        }
        sql.push(')');
        sql
    };

    let condition = match list_match(&alias, value, ctx)? {
        // `= ''` matches artifacts without any value.
        None if negated => exists(None),
        None => format!("NOT {}", exists(None)),
        Some((predicate, match_parameters)) => {
            parameters.extend(match_parameters);
            if negated {
                format!("NOT {}", exists(Some(&predicate)))
            } else {
                exists(Some(&predicate))
            }
        }
    };
    Ok(ParametrizedFromWhere::condition(condition, parameters))
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
            now: tz.with_ymd_and_hms(2024, 1, 10, 12, 30, 0).unwrap(),
        }
    }

    fn single_string(s: &str) -> ComparisonValue {
        ComparisonValue::Single(Value::String(s.to_string()))
    }

    #[test]
    fn test_date_equal_covers_the_whole_day() {
        let user = User::anonymous();
        let (sql, params) =
            date_condition("v", Operator::Equal, &single_string("2024-01-02"), false, &ctx(&user)).unwrap();
        assert_eq!(sql, "v BETWEEN ? AND ?");
        assert_eq!(params, integers([1_704_153_600, 1_704_239_999]));
    }

    #[test]
    fn test_date_strict_bounds() {
        let user = User::anonymous();
        let value = single_string("2024-01-02");
        let (sql, params) = date_condition("v", Operator::GreaterThan, &value, false, &ctx(&user)).unwrap();
        assert_eq!(sql, "v > ?");
        assert_eq!(params, integers([1_704_239_999]));
        let (sql, params) = date_condition("v", Operator::LesserThan, &value, false, &ctx(&user)).unwrap();
        assert_eq!(sql, "v < ?");
        assert_eq!(params, integers([1_704_153_600]));
    }

    #[test]
    fn test_date_empty() {
        let user = User::anonymous();
        let (sql, params) = date_condition("v", Operator::NotEqual, &single_string(""), true, &ctx(&user)).unwrap();
        assert_eq!(sql, "v IS NOT NULL");
        assert!(params.is_empty());
    }

    #[test]
    fn test_date_between_now() {
        let user = User::anonymous();
        let value = ComparisonValue::Between {
            min: Value::String("2024-01-01".to_string()),
            max: Value::CurrentDateTime(None),
        };
        let (_, params) = date_condition("v", Operator::Between, &value, false, &ctx(&user)).unwrap();
        assert_eq!(params, integers([1_704_067_200, 1_704_931_199]));
    }

    #[test]
    fn test_mixed_date_fields_compare_per_tracker() {
        use crate::validation::{DuckTypedField, FieldComparison, ResolvedField};

        let user = User::anonymous();
        let comparison = FieldComparison {
            field: DuckTypedField::from_semantic(
                "due_date",
                DuckType::Date,
                vec![
                    ResolvedField {
                        tracker_id: 1,
                        field_id: 10,
                        kind: FieldKind::Date { with_time: false },
                    },
                    ResolvedField {
                        tracker_id: 2,
                        field_id: 20,
                        kind: FieldKind::Date { with_time: true },
                    },
                ],
            ),
            operator: Operator::Equal,
            value: single_string("2024-01-02 10:30"),
        };
        let part = from_where(&comparison, &ctx(&user), &mut Aliases::default()).unwrap();
        assert_eq!(
            part.condition,
            "((artifact.tracker_id IN (?) AND CVDate_1.value BETWEEN ? AND ?) \
OR (artifact.tracker_id NOT IN (?) AND CVDate_1.value BETWEEN ? AND ?))"
        );
        // The minute for tracker 2, the whole day for tracker 1.
        assert_eq!(
            part.condition_parameters,
            integers([2, 1_704_191_400, 1_704_191_459, 2, 1_704_153_600, 1_704_239_999])
        );
        assert_eq!(part.from_parameters, integers([10, 20]));
    }

    #[test]
    fn test_numeric_from_string() {
        let (sql, params) = numeric_condition("v", Operator::GreaterThanOrEqual, &single_string("3.5")).unwrap();
        assert_eq!(sql, "v >= ?");
        assert_eq!(params, vec![SqlValue::Real(3.5)]);
    }

    #[test]
    fn test_text_contains_escapes_wildcards() {
        assert_eq!(contains_pattern("50%_a\\b"), "%50\\%\\_a\\\\b%");
        let (sql, params) = text_condition("v", Operator::Equal, &single_string("bug")).unwrap();
        assert_eq!(sql, "v LIKE ? ESCAPE '\\'");
        assert_eq!(params, vec![SqlValue::Text("%bug%".to_string())]);
    }

    #[test]
    fn test_list_in_with_myself() {
        let mut user = User::anonymous();
        user.id = 7;
        let value = ComparisonValue::List(vec![Value::String("alice".to_string()), Value::CurrentUser]);
        let (predicate, params) = list_match("l", &value, &ctx(&user)).unwrap().unwrap();
        assert_eq!(predicate, "l.label COLLATE NOCASE IN (?) OR l.id = ?");
        assert_eq!(params, vec![SqlValue::Text("alice".to_string()), SqlValue::Integer(7)]);
    }

    #[test]
    fn test_list_empty_is_not_exists() {
        let user = User::anonymous();
        let mut aliases = Aliases::default();
        let part = list_condition(
            ListBind::Static,
            &[10],
            Operator::Equal,
            &single_string(""),
            &ctx(&user),
            &mut aliases,
        )
        .unwrap();
        assert!(part.condition.starts_with("NOT EXISTS"));
        assert_eq!(part.condition_parameters, integers([10, 10]));
    }
}
