//! Comparison rules: which operators and values each subject accepts.

use chrono::{DateTime, FixedOffset};

use super::duck_typed::{DuckType, DuckTypedField};
use super::metadata::Metadata;
use super::Fault;
use crate::datetime::{self, DateLiteral};
use crate::model::User;
use crate::tql::{ComparisonValue, Operator, Value};

const ORDERED: &[Operator] = &[
    Operator::Equal,
    Operator::NotEqual,
    Operator::LesserThan,
    Operator::LesserThanOrEqual,
    Operator::GreaterThan,
    Operator::GreaterThanOrEqual,
    Operator::Between,
];
const EQUALITY: &[Operator] = &[Operator::Equal, Operator::NotEqual];
const LIST: &[Operator] = &[
    Operator::Equal,
    Operator::NotEqual,
    Operator::In,
    Operator::NotIn,
];

/// What the right-hand side of a comparison may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueRule {
    /// Date literals and `NOW()`.
    Date { with_time: bool },
    /// Numbers, or strings holding one.
    Numeric { integers_only: bool },
    Text,
    /// Labels, plus `MYSELF()` for user bound lists.
    List { accepts_myself: bool },
    /// User names or `MYSELF()`.
    UserNames,
    /// `OPEN()` only.
    Status,
}

#[derive(Debug, Clone, Copy)]
pub struct ComparisonRules {
    pub operators: &'static [Operator],
    pub values: ValueRule,
    /// Whether `''` may be used with `=` and `!=`.
    pub allows_empty: bool,
}

impl ComparisonRules {
    pub fn for_field(field: &DuckTypedField) -> Self {
        match field.duck_type {
            DuckType::Date => Self {
                operators: ORDERED,
                values: ValueRule::Date {
                    with_time: field.with_time(),
                },
                allows_empty: true,
            },
            DuckType::Numeric => Self {
                operators: ORDERED,
                values: ValueRule::Numeric {
                    integers_only: false,
                },
                allows_empty: true,
            },
            DuckType::Text => Self {
                operators: EQUALITY,
                values: ValueRule::Text,
                allows_empty: true,
            },
            DuckType::StaticList | DuckType::UserGroupList => Self {
                operators: LIST,
                values: ValueRule::List {
                    accepts_myself: false,
                },
                allows_empty: true,
            },
            DuckType::UserList => Self {
                operators: LIST,
                values: ValueRule::List {
                    accepts_myself: true,
                },
                allows_empty: true,
            },
        }
    }

    /// `None` for metadata that cannot appear in `WHERE`.
    pub fn for_metadata(metadata: Metadata) -> Option<Self> {
        let rules = match metadata {
            Metadata::Id => Self {
                operators: ORDERED,
                values: ValueRule::Numeric {
                    integers_only: true,
                },
                allows_empty: false,
            },
            Metadata::SubmittedOn | Metadata::LastUpdateDate => Self {
                operators: ORDERED,
                values: ValueRule::Date { with_time: true },
                allows_empty: false,
            },
            Metadata::SubmittedBy | Metadata::LastUpdateBy => Self {
                operators: LIST,
                values: ValueRule::UserNames,
                allows_empty: false,
            },
            Metadata::AssignedTo => Self {
                operators: LIST,
                values: ValueRule::List {
                    accepts_myself: true,
                },
                allows_empty: true,
            },
            Metadata::Title | Metadata::Description => Self {
                operators: EQUALITY,
                values: ValueRule::Text,
                allows_empty: true,
            },
            Metadata::Status => Self {
                operators: EQUALITY,
                values: ValueRule::Status,
                allows_empty: false,
            },
            Metadata::ProjectName
            | Metadata::TrackerName
            | Metadata::PrettyTitle
            | Metadata::Artifact => return None,
        };
        Some(rules)
    }
}

/// What comparison checks need to know about the call.
pub struct CheckContext<'a> {
    pub user: &'a User,
    pub tz: FixedOffset,
    pub now: DateTime<FixedOffset>,
}

/// Every fault of one comparison.
pub fn check_comparison(
    subject: &str,
    rules: &ComparisonRules,
    operator: Operator,
    value: &ComparisonValue,
    ctx: &CheckContext<'_>,
) -> Vec<Fault> {
    if !rules.operators.contains(&operator) {
        return vec![Fault::OperatorNotSupported {
            subject: subject.to_string(),
            operator,
        }];
    }

    let mut faults: Vec<Fault> = value
        .values()
        .into_iter()
        .filter_map(|v| check_value(subject, rules, operator, v, ctx))
        .collect();

    if let ComparisonValue::Between { min, max } = value {
        if faults.is_empty() {
            let bounds = (
                sort_key(rules.values, min, ctx),
                sort_key(rules.values, max, ctx),
            );
            if let (Some(min), Some(max)) = bounds {
                if min.is_after(max) {
                    faults.push(Fault::InvalidComparisonWithBetweenValuesMinGreaterThanMax {
                        subject: subject.to_string(),
                    });
                }
            }
        }
    }

    faults
}

fn check_value(
    subject: &str,
    rules: &ComparisonRules,
    operator: Operator,
    value: &Value,
    ctx: &CheckContext<'_>,
) -> Option<Fault> {
    let subject_owned = || subject.to_string();

    if rules.values == ValueRule::Status {
        return (*value != Value::StatusOpen).then_some(Fault::StatusOnlyAcceptsOpen);
    }

    match value {
        Value::StatusOpen => Some(Fault::OpenNotAllowed {
            subject: subject_owned(),
        }),
        Value::CurrentUser => match rules.values {
            ValueRule::List {
                accepts_myself: true,
            }
            | ValueRule::UserNames => ctx.user.is_anonymous().then_some(Fault::MyselfForAnonymous),
            _ => Some(Fault::MyselfNotAllowed {
                subject: subject_owned(),
            }),
        },
        Value::CurrentDateTime(period) => match rules.values {
            ValueRule::Date { with_time } => {
                datetime::now_range(ctx.now, period.as_ref(), with_time, ctx.tz)
                    .is_none()
                    .then(|| Fault::InvalidDate {
                        subject: subject_owned(),
                        value: value.to_string(),
                    })
            }
            _ => Some(Fault::NowNotAllowed {
                subject: subject_owned(),
            }),
        },
        Value::String(s) if s.is_empty() => {
            let equality = matches!(operator, Operator::Equal | Operator::NotEqual);
            (!rules.allows_empty || !equality).then(|| Fault::EmptyValueNotAllowed {
                subject: subject_owned(),
                operator,
            })
        }
        Value::String(s) => match rules.values {
            ValueRule::Date { with_time } => match DateLiteral::parse(s) {
                None => Some(Fault::InvalidDate {
                    subject: subject_owned(),
                    value: value.to_string(),
                }),
                Some(literal) if literal.has_time && !with_time => {
                    Some(Fault::DateTimeOnDateField {
                        subject: subject_owned(),
                        value: value.to_string(),
                    })
                }
                Some(_) => None,
            },
            ValueRule::Numeric { integers_only } => {
                let valid = if integers_only {
                    s.trim().parse::<i64>().is_ok()
                } else {
                    s.trim().parse::<f64>().is_ok_and(f64::is_finite)
                };
                (!valid).then(|| Fault::InvalidNumber {
                    subject: subject_owned(),
                    value: value.to_string(),
                })
            }
            ValueRule::Text | ValueRule::List { .. } | ValueRule::UserNames | ValueRule::Status => None,
        },
        Value::Integer(_) | Value::Float(_) => match rules.values {
            ValueRule::Numeric {
                integers_only: true,
            } if matches!(value, Value::Float(_)) => Some(Fault::InvalidNumber {
                subject: subject_owned(),
                value: value.to_string(),
            }),
            ValueRule::Numeric { .. } => None,
            ValueRule::Date { .. } => Some(Fault::InvalidDate {
                subject: subject_owned(),
                value: value.to_string(),
            }),
            _ => Some(Fault::UnsupportedValue {
                subject: subject_owned(),
                value: value.to_string(),
            }),
        },
    }
}

/// Comparable position of a valid `BETWEEN` bound.
#[derive(Debug, Clone, Copy, PartialEq)]
enum SortKey {
    Integer(i64),
    Float(f64),
}

impl SortKey {
    /// Exact for two integers, floating point as soon as a float is involved.
    fn is_after(self, other: SortKey) -> bool {
        match (self, other) {
            (SortKey::Integer(a), SortKey::Integer(b)) => a > b,
            (a, b) => a.as_f64() > b.as_f64(),
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            SortKey::Integer(n) => n as f64,
            SortKey::Float(n) => n,
        }
    }
}

fn sort_key(rule: ValueRule, value: &Value, ctx: &CheckContext<'_>) -> Option<SortKey> {
    match (rule, value) {
        (ValueRule::Date { with_time }, Value::String(s)) => {
            let literal = DateLiteral::parse(s)?;
            Some(SortKey::Integer(datetime::literal_range(&literal, with_time, ctx.tz).floor))
        }
        (ValueRule::Date { with_time }, Value::CurrentDateTime(period)) => {
            datetime::now_range(ctx.now, period.as_ref(), with_time, ctx.tz).map(|r| SortKey::Integer(r.floor))
        }
        (ValueRule::Numeric { .. }, Value::Integer(n)) => Some(SortKey::Integer(*n)),
        (ValueRule::Numeric { .. }, Value::Float(n)) => Some(SortKey::Float(*n)),
        (ValueRule::Numeric { .. }, Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .map(SortKey::Integer)
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(SortKey::Float))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datetime::{Period, PeriodUnit};
    use chrono::TimeZone;

    fn ctx(user: &User) -> CheckContext<'_> {
        let tz = FixedOffset::east_opt(0).unwrap();
        CheckContext {
            user,
            tz,
            now: tz.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap(),
        }
    }

    fn registered() -> User {
        let mut user = User::anonymous();
        user.id = 42;
        user.user_name = "alice".to_string();
        user
    }

    fn date_rules(with_time: bool) -> ComparisonRules {
        ComparisonRules {
            operators: ORDERED,
            values: ValueRule::Date { with_time },
            allows_empty: true,
        }
    }

    fn s(v: &str) -> Value {
        Value::String(v.to_string())
    }

    #[test]
    fn test_between_min_greater_than_max_on_dates() {
        let user = registered();
        let faults = check_comparison(
            "due_date",
            &date_rules(false),
            Operator::Between,
            &ComparisonValue::Between {
                min: s("2024-02-01"),
                max: s("2024-01-01"),
            },
            &ctx(&user),
        );
        assert_eq!(
            faults,
            vec![Fault::InvalidComparisonWithBetweenValuesMinGreaterThanMax {
                subject: "due_date".to_string()
            }]
        );
        assert_eq!(
            faults[0].to_string(),
            "Comparison with BETWEEN() when the minimum value is greater than the maximum value is invalid."
        );
    }

    #[test]
    fn test_between_with_now_periods() {
        let user = registered();
        let later = Value::CurrentDateTime(Some(Period {
            amount: 1,
            unit: PeriodUnit::Week,
        }));
        let ok = check_comparison(
            "due_date",
            &date_rules(false),
            Operator::Between,
            &ComparisonValue::Between {
                min: Value::CurrentDateTime(None),
                max: later.clone(),
            },
            &ctx(&user),
        );
        assert!(ok.is_empty());
        let reversed = check_comparison(
            "due_date",
            &date_rules(false),
            Operator::Between,
            &ComparisonValue::Between {
                min: later,
                max: s("2024-06-15"),
            },
            &ctx(&user),
        );
        assert_eq!(reversed.len(), 1);
    }

    #[test]
    fn test_between_on_metadata_id() {
        let user = registered();
        let rules = ComparisonRules::for_metadata(Metadata::Id).unwrap();
        let faults = check_comparison(
            "@id",
            &rules,
            Operator::Between,
            &ComparisonValue::Between {
                min: Value::Integer(10),
                max: Value::Integer(2),
            },
            &ctx(&user),
        );
        assert!(matches!(
            faults.as_slice(),
            [Fault::InvalidComparisonWithBetweenValuesMinGreaterThanMax { .. }]
        ));
    }

    #[test]
    fn test_between_on_integers_beyond_float_precision() {
        let user = registered();
        let rules = ComparisonRules::for_metadata(Metadata::Id).unwrap();
        let check = |min: i64, max: i64| {
            check_comparison(
                "@id",
                &rules,
                Operator::Between,
                &ComparisonValue::Between {
                    min: Value::Integer(min),
                    max: Value::Integer(max),
                },
                &ctx(&user),
            )
        };
        let base = 1_i64 << 53;
        assert_eq!(check(base + 1, base).len(), 1);
        assert!(check(base, base + 1).is_empty());
        assert_eq!(check(i64::MAX, i64::MAX - 1).len(), 1);
    }

    #[test]
    fn test_between_not_supported_on_text() {
        let user = registered();
        let rules = ComparisonRules::for_metadata(Metadata::Title).unwrap();
        let faults = check_comparison(
            "@title",
            &rules,
            Operator::Between,
            &ComparisonValue::Between {
                min: s("b"),
                max: s("a"),
            },
            &ctx(&user),
        );
        assert!(matches!(
            faults.as_slice(),
            [Fault::OperatorNotSupported { .. }]
        ));
    }

    #[test]
    fn test_empty_value_only_with_equality() {
        let user = registered();
        let equal = check_comparison(
            "due_date",
            &date_rules(false),
            Operator::Equal,
            &ComparisonValue::Single(s("")),
            &ctx(&user),
        );
        assert!(equal.is_empty());
        let lesser = check_comparison(
            "due_date",
            &date_rules(false),
            Operator::LesserThan,
            &ComparisonValue::Single(s("")),
            &ctx(&user),
        );
        assert!(matches!(
            lesser.as_slice(),
            [Fault::EmptyValueNotAllowed { .. }]
        ));
    }

    #[test]
    fn test_datetime_literal_on_date_field() {
        let user = registered();
        let faults = check_comparison(
            "due_date",
            &date_rules(false),
            Operator::Equal,
            &ComparisonValue::Single(s("2024-01-01 10:00")),
            &ctx(&user),
        );
        assert!(matches!(
            faults.as_slice(),
            [Fault::DateTimeOnDateField { .. }]
        ));
        let faults = check_comparison(
            "due_date",
            &date_rules(true),
            Operator::Equal,
            &ComparisonValue::Single(s("2024-01-01 10:00")),
            &ctx(&user),
        );
        assert!(faults.is_empty());
    }

    #[test]
    fn test_status_only_accepts_open() {
        let user = registered();
        let rules = ComparisonRules::for_metadata(Metadata::Status).unwrap();
        assert!(check_comparison(
            "@status",
            &rules,
            Operator::NotEqual,
            &ComparisonValue::Single(Value::StatusOpen),
            &ctx(&user)
        )
        .is_empty());
        assert_eq!(
            check_comparison(
                "@status",
                &rules,
                Operator::Equal,
                &ComparisonValue::Single(s("Open")),
                &ctx(&user)
            ),
            vec![Fault::StatusOnlyAcceptsOpen]
        );
    }

    #[test]
    fn test_myself() {
        let user = registered();
        let rules = ComparisonRules::for_metadata(Metadata::SubmittedBy).unwrap();
        let value = ComparisonValue::List(vec![Value::CurrentUser, s("bob")]);
        assert!(check_comparison("@submitted_by", &rules, Operator::In, &value, &ctx(&user)).is_empty());

        let anonymous = User::anonymous();
        assert_eq!(
            check_comparison("@submitted_by", &rules, Operator::In, &value, &ctx(&anonymous)),
            vec![Fault::MyselfForAnonymous]
        );

        let static_list = ComparisonRules {
            operators: LIST,
            values: ValueRule::List {
                accepts_myself: false,
            },
            allows_empty: true,
        };
        assert!(matches!(
            check_comparison("category", &static_list, Operator::Equal, &ComparisonValue::Single(Value::CurrentUser), &ctx(&user)).as_slice(),
            [Fault::MyselfNotAllowed { .. }]
        ));
    }

    #[test]
    fn test_numeric_values() {
        let user = registered();
        let rules = ComparisonRules::for_metadata(Metadata::Id).unwrap();
        assert!(matches!(
            check_comparison("@id", &rules, Operator::Equal, &ComparisonValue::Single(Value::Float(1.5)), &ctx(&user)).as_slice(),
            [Fault::InvalidNumber { .. }]
        ));
        assert!(matches!(
            check_comparison("@id", &rules, Operator::Equal, &ComparisonValue::Single(s("")), &ctx(&user)).as_slice(),
            [Fault::EmptyValueNotAllowed { .. }]
        ));
        assert!(check_comparison("@id", &rules, Operator::GreaterThan, &ComparisonValue::Single(s("12")), &ctx(&user)).is_empty());
    }

    #[test]
    fn test_list_rejects_ordered_operators_and_now() {
        let user = registered();
        let rules = ComparisonRules::for_metadata(Metadata::AssignedTo).unwrap();
        assert!(matches!(
            check_comparison("@assigned_to", &rules, Operator::LesserThan, &ComparisonValue::Single(s("a")), &ctx(&user)).as_slice(),
            [Fault::OperatorNotSupported { .. }]
        ));
        assert!(matches!(
            check_comparison("@assigned_to", &rules, Operator::Equal, &ComparisonValue::Single(Value::CurrentDateTime(None)), &ctx(&user)).as_slice(),
            [Fault::NowNotAllowed { .. }]
        ));
        assert!(matches!(
            check_comparison("@assigned_to", &rules, Operator::In, &ComparisonValue::List(vec![s("")]), &ctx(&user)).as_slice(),
            [Fault::EmptyValueNotAllowed { .. }]
        ));
    }
}
