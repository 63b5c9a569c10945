//! TQL expression tree.

use serde::{Deserialize, Serialize};

use crate::datetime::Period;

/// A parsed TQL query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub select: Vec<Searchable>,
    pub from: Option<FromClause>,
    pub condition: Option<Expression>,
    pub order_by: Option<OrderBy>,
}

/// Something a query can refer to: a duck-typed field or an `@metadata`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Searchable {
    Field(String),
    Metadata(String),
}

impl Searchable {
    pub fn name(&self) -> &str {
        match self {
            Searchable::Field(name) | Searchable::Metadata(name) => name,
        }
    }
}

impl std::fmt::Display for Searchable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Searchable::Field(name) => write!(f, "{name}"),
            Searchable::Metadata(name) => write!(f, "@{name}"),
        }
    }
}

/// `FROM` clause: one or two conditions joined by `AND`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FromClause {
    pub conditions: Vec<FromCondition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FromSubject {
    /// `@project`, with `'self'` or `'aggregated'`.
    Project,
    /// `@project.name`
    ProjectName,
    /// `@tracker.name`
    TrackerName,
}

impl FromSubject {
    pub fn from_metadata(name: &str) -> Option<Self> {
        match name {
            "project" => Some(FromSubject::Project),
            "project.name" => Some(FromSubject::ProjectName),
            "tracker.name" => Some(FromSubject::TrackerName),
            _ => None,
        }
    }

    /// Whether the subject restricts projects (as opposed to trackers).
    pub fn is_project(&self) -> bool {
        matches!(self, FromSubject::Project | FromSubject::ProjectName)
    }
}

impl std::fmt::Display for FromSubject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FromSubject::Project => write!(f, "@project"),
            FromSubject::ProjectName => write!(f, "@project.name"),
            FromSubject::TrackerName => write!(f, "@tracker.name"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FromOperand {
    Equal(String),
    In(Vec<String>),
}

impl FromOperand {
    pub fn values(&self) -> &[String] {
        match self {
            FromOperand::Equal(value) => std::slice::from_ref(value),
            FromOperand::In(values) => values,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FromCondition {
    pub subject: FromSubject,
    pub operand: FromOperand,
}

/// Boolean condition of the `WHERE` clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expression {
    Or(Vec<Expression>),
    And(Vec<Expression>),
    Comparison(Comparison),
    Relationship(Relationship),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equal,
    NotEqual,
    LesserThan,
    LesserThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Between,
    In,
    NotIn,
}

impl Operator {
    /// The SQL operator for simple binary comparisons.
    pub fn sql(&self) -> &'static str {
        match self {
            Operator::Equal => "=",
            Operator::NotEqual => "<>",
            Operator::LesserThan => "<",
            Operator::LesserThanOrEqual => "<=",
            Operator::GreaterThan => ">",
            Operator::GreaterThanOrEqual => ">=",
            Operator::Between => "BETWEEN",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Operator::Equal => "=",
            Operator::NotEqual => "!=",
            Operator::LesserThan => "<",
            Operator::LesserThanOrEqual => "<=",
            Operator::GreaterThan => ">",
            Operator::GreaterThanOrEqual => ">=",
            Operator::Between => "BETWEEN()",
            Operator::In => "IN()",
            Operator::NotIn => "NOT IN()",
        };
        write!(f, "{s}")
    }
}

/// A literal or function on the right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    /// `NOW()` with an optional offset.
    CurrentDateTime(Option<Period>),
    /// `OPEN()`
    StatusOpen,
    /// `MYSELF()`
    CurrentUser,
}

impl Value {
    /// `''`
    pub fn is_empty_string(&self) -> bool {
        matches!(self, Value::String(s) if s.is_empty())
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::String(s) => write!(f, "'{s}'"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Float(n) => write!(f, "{n}"),
            Value::CurrentDateTime(None) => write!(f, "NOW()"),
            Value::CurrentDateTime(Some(period)) => write!(f, "NOW() {period}"),
            Value::StatusOpen => write!(f, "OPEN()"),
            Value::CurrentUser => write!(f, "MYSELF()"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonValue {
    Single(Value),
    Between { min: Value, max: Value },
    List(Vec<Value>),
}

impl ComparisonValue {
    pub fn values(&self) -> Vec<&Value> {
        match self {
            ComparisonValue::Single(value) => vec![value],
            ComparisonValue::Between { min, max } => vec![min, max],
            ComparisonValue::List(values) => values.iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub searchable: Searchable,
    pub operator: Operator,
    pub value: ComparisonValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    WithParent,
    WithoutParent,
    WithChildren,
    WithoutChildren,
    LinkedFrom,
    NotLinkedFrom,
    LinkedTo,
    NotLinkedTo,
}

impl RelationshipKind {
    /// `IS [NOT] LINKED FROM/TO`, the only forms accepting `WITH TYPE`.
    pub fn is_link(&self) -> bool {
        matches!(
            self,
            RelationshipKind::LinkedFrom
                | RelationshipKind::NotLinkedFrom
                | RelationshipKind::LinkedTo
                | RelationshipKind::NotLinkedTo
        )
    }

    pub fn is_negated(&self) -> bool {
        matches!(
            self,
            RelationshipKind::WithoutParent
                | RelationshipKind::WithoutChildren
                | RelationshipKind::NotLinkedFrom
                | RelationshipKind::NotLinkedTo
        )
    }
}

impl std::fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RelationshipKind::WithParent => "WITH PARENT",
            RelationshipKind::WithoutParent => "WITHOUT PARENT",
            RelationshipKind::WithChildren => "WITH CHILDREN",
            RelationshipKind::WithoutChildren => "WITHOUT CHILDREN",
            RelationshipKind::LinkedFrom => "IS LINKED FROM",
            RelationshipKind::NotLinkedFrom => "IS NOT LINKED FROM",
            RelationshipKind::LinkedTo => "IS LINKED TO",
            RelationshipKind::NotLinkedTo => "IS NOT LINKED TO",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipTarget {
    Any,
    Artifact(i64),
    /// Tracker short name.
    Tracker(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub kind: RelationshipKind,
    pub target: RelationshipTarget,
    pub link_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

impl Direction {
    pub fn sql(&self) -> &'static str {
        match self {
            Direction::Ascending => "ASC",
            Direction::Descending => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub searchable: Searchable,
    pub direction: Direction,
}
