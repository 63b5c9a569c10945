//! Recursive descent parser for TQL.
//!
//! Grammar (keywords are case-insensitive):
//! ```text
//! query          := SELECT selectables [FROM from] [WHERE expression] [ORDER BY searchable [ASC|DESC]]
//! selectables    := searchable (',' searchable)*
//! from           := from_condition [AND from_condition]
//! from_condition := ('@project' | '@project.name' | '@tracker.name') ('=' string | IN '(' string (',' string)* ')')
//! expression     := and_expr (OR and_expr)*
//! and_expr       := term (AND term)*
//! term           := '(' expression ')' | relationship | comparison
//! comparison     := searchable op value | searchable BETWEEN '(' value ',' value ')'
//!                 | searchable [NOT] IN '(' value (',' value)* ')'
//! value          := string | number | NOW() [('+'|'-') period] | OPEN() | MYSELF()
//! relationship   := (WITH | WITHOUT) (PARENT | CHILDREN) [target]
//!                 | IS [NOT] LINKED (FROM | TO) [target] [WITH TYPE string]
//! target         := ARTIFACT '=' integer | TRACKER '=' string
//! ```

use super::ast::{
    Comparison, ComparisonValue, Direction, Expression, FromClause, FromCondition, FromOperand,
    FromSubject, Operator, OrderBy, Query, Relationship, RelationshipKind, RelationshipTarget,
    Searchable, Value,
};
use super::lexer::{tokenize, Token, TokenKind};
use crate::datetime::Period;
use crate::types::SyntaxError;

type ParseResult<T> = Result<T, SyntaxError>;

/// Parse a TQL query into its expression tree.
pub fn parse(input: &str) -> ParseResult<Query> {
    let tokens = tokenize(input)?;
    let mut pos = 0;

    if matches!(tokens[0].kind, TokenKind::Eof) {
        return Err(error_at(&tokens[0], "Query is empty"));
    }

    // SELECT
    expect_keyword(&tokens, &mut pos, "SELECT")?;
    let select = parse_selectables(&tokens, &mut pos)?;

    // Optional FROM
    let from = if peek_keyword(&tokens, pos, "FROM") {
        pos += 1;
        Some(parse_from(&tokens, &mut pos)?)
    } else {
        None
    };

    // Optional WHERE
    let condition = if peek_keyword(&tokens, pos, "WHERE") {
        pos += 1;
        Some(parse_expression(&tokens, &mut pos)?)
    } else {
        None
    };

    // Optional ORDER BY
    let order_by = if peek_keyword(&tokens, pos, "ORDER") {
        pos += 1;
        expect_keyword(&tokens, &mut pos, "BY")?;
        Some(parse_order_by(&tokens, &mut pos)?)
    } else {
        None
    };

    let last = current(&tokens, pos);
    if !matches!(last.kind, TokenKind::Eof) {
        return Err(error_at(last, format!("Unexpected {}", last.kind)));
    }

    Ok(Query {
        select,
        from,
        condition,
        order_by,
    })
}

// ── Parser helpers ──

fn current(tokens: &[Token], pos: usize) -> &Token {
    // The token list always ends with Eof.
    tokens.get(pos).unwrap_or_else(|| &tokens[tokens.len() - 1])
}

fn error_at(token: &Token, message: impl Into<String>) -> SyntaxError {
    SyntaxError {
        message: message.into(),
        location: token.location,
    }
}

fn peek_keyword(tokens: &[Token], pos: usize, keyword: &str) -> bool {
    tokens.get(pos).is_some_and(|t| t.is_keyword(keyword))
}

fn peek_kind(tokens: &[Token], pos: usize, kind: &TokenKind) -> bool {
    tokens.get(pos).is_some_and(|t| &t.kind == kind)
}

fn expect_keyword(tokens: &[Token], pos: &mut usize, keyword: &str) -> ParseResult<()> {
    let token = current(tokens, *pos);
    if token.is_keyword(keyword) {
        *pos += 1;
        return Ok(());
    }
    Err(error_at(
        token,
        format!("Expected {keyword} but found {}", token.kind),
    ))
}

fn expect(tokens: &[Token], pos: &mut usize, kind: TokenKind) -> ParseResult<()> {
    let token = current(tokens, *pos);
    if token.kind == kind {
        *pos += 1;
        return Ok(());
    }
    Err(error_at(
        token,
        format!("Expected {kind} but found {}", token.kind),
    ))
}

fn expect_string(tokens: &[Token], pos: &mut usize) -> ParseResult<String> {
    let token = current(tokens, *pos);
    match &token.kind {
        TokenKind::String(s) => {
            *pos += 1;
            Ok(s.clone())
        }
        other => Err(error_at(token, format!("Expected a string but found {other}"))),
    }
}

// ── SELECT / ORDER BY ──

fn parse_searchable(tokens: &[Token], pos: &mut usize) -> ParseResult<Searchable> {
    let token = current(tokens, *pos);
    let searchable = match &token.kind {
        TokenKind::Metadata(name) => Searchable::Metadata(name.clone()),
        TokenKind::Word(name) => Searchable::Field(name.clone()),
        other => {
            return Err(error_at(
                token,
                format!("Expected a field or @metadata but found {other}"),
            ))
        }
    };
    *pos += 1;
    Ok(searchable)
}

fn parse_selectables(tokens: &[Token], pos: &mut usize) -> ParseResult<Vec<Searchable>> {
    let mut selectables = vec![parse_searchable(tokens, pos)?];
    while peek_kind(tokens, *pos, &TokenKind::Comma) {
        *pos += 1;
        selectables.push(parse_searchable(tokens, pos)?);
    }
    Ok(selectables)
}

fn parse_order_by(tokens: &[Token], pos: &mut usize) -> ParseResult<OrderBy> {
    let searchable = parse_searchable(tokens, pos)?;
    let direction = if peek_keyword(tokens, *pos, "ASC") {
        *pos += 1;
        Direction::Ascending
    } else if peek_keyword(tokens, *pos, "DESC") {
        *pos += 1;
        Direction::Descending
    } else {
        Direction::Ascending
    };
    Ok(OrderBy {
        searchable,
        direction,
    })
}

// ── FROM ──

fn parse_from(tokens: &[Token], pos: &mut usize) -> ParseResult<FromClause> {
    let mut conditions = vec![parse_from_condition(tokens, pos)?];
    if peek_keyword(tokens, *pos, "AND") {
        *pos += 1;
        conditions.push(parse_from_condition(tokens, pos)?);
    }
    Ok(FromClause { conditions })
}

fn parse_from_condition(tokens: &[Token], pos: &mut usize) -> ParseResult<FromCondition> {
    let token = current(tokens, *pos);
    let subject = match &token.kind {
        TokenKind::Metadata(name) => FromSubject::from_metadata(name).ok_or_else(|| {
            error_at(
                token,
                format!("@{name} cannot be used in FROM, expected @project, @project.name or @tracker.name"),
            )
        })?,
        other => {
            return Err(error_at(
                token,
                format!("Expected @project, @project.name or @tracker.name but found {other}"),
            ))
        }
    };
    *pos += 1;

    let operand = if peek_kind(tokens, *pos, &TokenKind::Equal) {
        *pos += 1;
        FromOperand::Equal(expect_string(tokens, pos)?)
    } else if peek_keyword(tokens, *pos, "IN") {
        *pos += 1;
        expect(tokens, pos, TokenKind::LeftParen)?;
        let mut values = vec![expect_string(tokens, pos)?];
        while peek_kind(tokens, *pos, &TokenKind::Comma) {
            *pos += 1;
            values.push(expect_string(tokens, pos)?);
        }
        expect(tokens, pos, TokenKind::RightParen)?;
        FromOperand::In(values)
    } else {
        let token = current(tokens, *pos);
        return Err(error_at(
            token,
            format!("Expected = or IN but found {}", token.kind),
        ));
    };

    Ok(FromCondition { subject, operand })
}

// ── WHERE ──

fn parse_expression(tokens: &[Token], pos: &mut usize) -> ParseResult<Expression> {
    let mut operands = vec![parse_and_expression(tokens, pos)?];
    while peek_keyword(tokens, *pos, "OR") {
        *pos += 1;
        operands.push(parse_and_expression(tokens, pos)?);
    }
    Ok(flatten(operands, Expression::Or))
}

fn parse_and_expression(tokens: &[Token], pos: &mut usize) -> ParseResult<Expression> {
    let mut operands = vec![parse_term(tokens, pos)?];
    while peek_keyword(tokens, *pos, "AND") {
        *pos += 1;
        operands.push(parse_term(tokens, pos)?);
    }
    Ok(flatten(operands, Expression::And))
}

fn flatten(mut operands: Vec<Expression>, combine: fn(Vec<Expression>) -> Expression) -> Expression {
    if operands.len() == 1 {
        return operands.remove(0);
    }
    combine(operands)
}

fn parse_term(tokens: &[Token], pos: &mut usize) -> ParseResult<Expression> {
    if peek_kind(tokens, *pos, &TokenKind::LeftParen) {
        *pos += 1;
        let inner = parse_expression(tokens, pos)?;
        expect(tokens, pos, TokenKind::RightParen)?;
        return Ok(inner);
    }

    if let Some(relationship) = parse_relationship(tokens, pos)? {
        return Ok(Expression::Relationship(relationship));
    }

    parse_comparison(tokens, pos).map(Expression::Comparison)
}

fn parse_comparison(tokens: &[Token], pos: &mut usize) -> ParseResult<Comparison> {
    let searchable = parse_searchable(tokens, pos)?;
    let token = current(tokens, *pos);

    let simple = match &token.kind {
        TokenKind::Equal => Some(Operator::Equal),
        TokenKind::NotEqual => Some(Operator::NotEqual),
        TokenKind::Lesser => Some(Operator::LesserThan),
        TokenKind::LesserOrEqual => Some(Operator::LesserThanOrEqual),
        TokenKind::Greater => Some(Operator::GreaterThan),
        TokenKind::GreaterOrEqual => Some(Operator::GreaterThanOrEqual),
        _ => None,
    };
    if let Some(operator) = simple {
        *pos += 1;
        let value = parse_value(tokens, pos)?;
        return Ok(Comparison {
            searchable,
            operator,
            value: ComparisonValue::Single(value),
        });
    }

    if token.is_keyword("BETWEEN") {
        *pos += 1;
        expect(tokens, pos, TokenKind::LeftParen)?;
        let min = parse_value(tokens, pos)?;
        expect(tokens, pos, TokenKind::Comma)?;
        let max = parse_value(tokens, pos)?;
        expect(tokens, pos, TokenKind::RightParen)?;
        return Ok(Comparison {
            searchable,
            operator: Operator::Between,
            value: ComparisonValue::Between { min, max },
        });
    }

    let operator = if token.is_keyword("IN") {
        *pos += 1;
        Operator::In
    } else if token.is_keyword("NOT") {
        *pos += 1;
        expect_keyword(tokens, pos, "IN")?;
        Operator::NotIn
    } else {
        return Err(error_at(
            token,
            format!("Expected a comparison operator after {searchable} but found {}", token.kind),
        ));
    };

    expect(tokens, pos, TokenKind::LeftParen)?;
    let mut values = vec![parse_value(tokens, pos)?];
    while peek_kind(tokens, *pos, &TokenKind::Comma) {
        *pos += 1;
        values.push(parse_value(tokens, pos)?);
    }
    expect(tokens, pos, TokenKind::RightParen)?;

    Ok(Comparison {
        searchable,
        operator,
        value: ComparisonValue::List(values),
    })
}

fn parse_function_call(tokens: &[Token], pos: &mut usize) -> ParseResult<()> {
    expect(tokens, pos, TokenKind::LeftParen)?;
    expect(tokens, pos, TokenKind::RightParen)
}

fn parse_value(tokens: &[Token], pos: &mut usize) -> ParseResult<Value> {
    let token = current(tokens, *pos);
    let value = match &token.kind {
        TokenKind::String(s) => Value::String(s.clone()),
        TokenKind::Integer(n) => Value::Integer(*n),
        TokenKind::Float(n) => Value::Float(*n),
        TokenKind::Minus => {
            *pos += 1;
            let number = current(tokens, *pos);
            return match number.kind {
                TokenKind::Integer(n) => {
                    *pos += 1;
                    Ok(Value::Integer(-n))
                }
                TokenKind::Float(n) => {
                    *pos += 1;
                    Ok(Value::Float(-n))
                }
                ref other => Err(error_at(number, format!("Expected a number after '-' but found {other}"))),
            };
        }
        TokenKind::Word(word) if word.eq_ignore_ascii_case("NOW") => {
            *pos += 1;
            parse_function_call(tokens, pos)?;
            return Ok(Value::CurrentDateTime(parse_period(tokens, pos)?));
        }
        TokenKind::Word(word) if word.eq_ignore_ascii_case("OPEN") => {
            *pos += 1;
            parse_function_call(tokens, pos)?;
            return Ok(Value::StatusOpen);
        }
        TokenKind::Word(word) if word.eq_ignore_ascii_case("MYSELF") => {
            *pos += 1;
            parse_function_call(tokens, pos)?;
            return Ok(Value::CurrentUser);
        }
        other => return Err(error_at(token, format!("Expected a value but found {other}"))),
    };
    *pos += 1;
    Ok(value)
}

/// Optional `+ 3d` / `- 1w` after `NOW()`.
fn parse_period(tokens: &[Token], pos: &mut usize) -> ParseResult<Option<Period>> {
    let sign = match current(tokens, *pos).kind {
        TokenKind::Plus => 1,
        TokenKind::Minus => -1,
        _ => return Ok(None),
    };
    *pos += 1;
    let token = current(tokens, *pos);
    match token.kind {
        TokenKind::Period(amount, unit) => {
            *pos += 1;
            Ok(Some(Period {
                amount: sign * amount,
                unit,
            }))
        }
        ref other => Err(error_at(
            token,
            format!("Expected a period such as 3d, 2w, 1m or 1y but found {other}"),
        )),
    }
}

// ── Relationships ──

fn parse_relationship(tokens: &[Token], pos: &mut usize) -> ParseResult<Option<Relationship>> {
    let start = *pos;
    let kind = if peek_keyword(tokens, start, "WITH") || peek_keyword(tokens, start, "WITHOUT") {
        let with = peek_keyword(tokens, start, "WITH");
        if peek_keyword(tokens, start + 1, "PARENT") {
            if with { RelationshipKind::WithParent } else { RelationshipKind::WithoutParent }
        } else if peek_keyword(tokens, start + 1, "CHILDREN") {
            if with { RelationshipKind::WithChildren } else { RelationshipKind::WithoutChildren }
        } else {
            return Ok(None);
        }
    } else if peek_keyword(tokens, start, "IS") {
        let negated = peek_keyword(tokens, start + 1, "NOT");
        let linked = start + 1 + usize::from(negated);
        if !peek_keyword(tokens, linked, "LINKED") {
            return Ok(None);
        }
        *pos = linked + 1;
        let kind = if peek_keyword(tokens, *pos, "FROM") {
            if negated { RelationshipKind::NotLinkedFrom } else { RelationshipKind::LinkedFrom }
        } else if peek_keyword(tokens, *pos, "TO") {
            if negated { RelationshipKind::NotLinkedTo } else { RelationshipKind::LinkedTo }
        } else {
            let token = current(tokens, *pos);
            return Err(error_at(token, format!("Expected FROM or TO but found {}", token.kind)));
        };
        *pos += 1;
        let target = parse_relationship_target(tokens, pos)?;
        let link_type = if peek_keyword(tokens, *pos, "WITH") && peek_keyword(tokens, *pos + 1, "TYPE") {
            *pos += 2;
            Some(expect_string(tokens, pos)?)
        } else {
            None
        };
        return Ok(Some(Relationship {
            kind,
            target,
            link_type,
        }));
    } else {
        return Ok(None);
    };

    *pos = start + 2;
    let target = parse_relationship_target(tokens, pos)?;
    Ok(Some(Relationship {
        kind,
        target,
        link_type: None,
    }))
}

fn parse_relationship_target(tokens: &[Token], pos: &mut usize) -> ParseResult<RelationshipTarget> {
    if peek_keyword(tokens, *pos, "ARTIFACT") && peek_kind(tokens, *pos + 1, &TokenKind::Equal) {
        *pos += 2;
        let token = current(tokens, *pos);
        return match token.kind {
            TokenKind::Integer(id) => {
                *pos += 1;
                Ok(RelationshipTarget::Artifact(id))
            }
            TokenKind::Minus => {
                // Negative ids parse; validation reports them.
                *pos += 1;
                match current(tokens, *pos).kind {
                    TokenKind::Integer(id) => {
                        *pos += 1;
                        Ok(RelationshipTarget::Artifact(-id))
                    }
                    ref other => Err(error_at(current(tokens, *pos), format!("Expected an artifact id but found {other}"))),
                }
            }
            ref other => Err(error_at(token, format!("Expected an artifact id but found {other}"))),
        };
    }
    if peek_keyword(tokens, *pos, "TRACKER") && peek_kind(tokens, *pos + 1, &TokenKind::Equal) {
        *pos += 2;
        return Ok(RelationshipTarget::Tracker(expect_string(tokens, pos)?));
    }
    Ok(RelationshipTarget::Any)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datetime::PeriodUnit;

    fn comparison(field: &str, operator: Operator, value: Value) -> Expression {
        Expression::Comparison(Comparison {
            searchable: Searchable::Field(field.to_string()),
            operator,
            value: ComparisonValue::Single(value),
        })
    }

    #[test]
    fn test_parse_full_query() {
        let q = parse(
            "SELECT @id, @title, category FROM @project = 'self' WHERE @status = OPEN() ORDER BY @last_update_date DESC",
        )
        .unwrap();
        assert_eq!(
            q.select,
            vec![
                Searchable::Metadata("id".to_string()),
                Searchable::Metadata("title".to_string()),
                Searchable::Field("category".to_string()),
            ]
        );
        let from = q.from.unwrap();
        assert_eq!(from.conditions.len(), 1);
        assert_eq!(from.conditions[0].subject, FromSubject::Project);
        assert_eq!(from.conditions[0].operand, FromOperand::Equal("self".to_string()));
        assert_eq!(
            q.condition.unwrap(),
            Expression::Comparison(Comparison {
                searchable: Searchable::Metadata("status".to_string()),
                operator: Operator::Equal,
                value: ComparisonValue::Single(Value::StatusOpen),
            })
        );
        let order = q.order_by.unwrap();
        assert_eq!(order.searchable, Searchable::Metadata("last_update_date".to_string()));
        assert_eq!(order.direction, Direction::Descending);
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let q = parse("select @id from @project.name in ('a', 'b') and @tracker.name = 'bug' where x = 1 order by x").unwrap();
        let from = q.from.unwrap();
        assert_eq!(from.conditions.len(), 2);
        assert_eq!(
            from.conditions[0].operand,
            FromOperand::In(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(from.conditions[1].subject, FromSubject::TrackerName);
        assert_eq!(q.order_by.unwrap().direction, Direction::Ascending);
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let q = parse("SELECT @id WHERE a = 1 OR b = 2 AND c = 3").unwrap();
        assert_eq!(
            q.condition.unwrap(),
            Expression::Or(vec![
                comparison("a", Operator::Equal, Value::Integer(1)),
                Expression::And(vec![
                    comparison("b", Operator::Equal, Value::Integer(2)),
                    comparison("c", Operator::Equal, Value::Integer(3)),
                ]),
            ])
        );
    }

    #[test]
    fn test_parentheses_group() {
        let q = parse("SELECT @id WHERE (a = 1 OR b = 2) AND c != 'x'").unwrap();
        match q.condition.unwrap() {
            Expression::And(operands) => {
                assert!(matches!(operands[0], Expression::Or(_)));
                assert_eq!(operands[1], comparison("c", Operator::NotEqual, Value::String("x".to_string())));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_between_in_and_not_in() {
        let q = parse("SELECT @id WHERE d BETWEEN(NOW() - 1w, NOW() + 2d) AND s NOT IN ('a', MYSELF())").unwrap();
        let Some(Expression::And(operands)) = q.condition else {
            panic!("expected AND");
        };
        assert_eq!(
            operands[0],
            Expression::Comparison(Comparison {
                searchable: Searchable::Field("d".to_string()),
                operator: Operator::Between,
                value: ComparisonValue::Between {
                    min: Value::CurrentDateTime(Some(Period { amount: -1, unit: PeriodUnit::Week })),
                    max: Value::CurrentDateTime(Some(Period { amount: 2, unit: PeriodUnit::Day })),
                },
            })
        );
        assert_eq!(
            operands[1],
            Expression::Comparison(Comparison {
                searchable: Searchable::Field("s".to_string()),
                operator: Operator::NotIn,
                value: ComparisonValue::List(vec![Value::String("a".to_string()), Value::CurrentUser]),
            })
        );
    }

    #[test]
    fn test_negative_numbers() {
        let q = parse("SELECT @id WHERE remaining_effort >= -2.5").unwrap();
        assert_eq!(
            q.condition.unwrap(),
            comparison("remaining_effort", Operator::GreaterThanOrEqual, Value::Float(-2.5))
        );
    }

    #[test]
    fn test_relationships() {
        let q = parse(
            "SELECT @id WHERE WITH PARENT ARTIFACT = 12 AND WITHOUT CHILDREN AND IS NOT LINKED TO TRACKER = 'epic' WITH TYPE '_covered_by'",
        )
        .unwrap();
        let Some(Expression::And(operands)) = q.condition else {
            panic!("expected AND");
        };
        assert_eq!(
            operands,
            vec![
                Expression::Relationship(Relationship {
                    kind: RelationshipKind::WithParent,
                    target: RelationshipTarget::Artifact(12),
                    link_type: None,
                }),
                Expression::Relationship(Relationship {
                    kind: RelationshipKind::WithoutChildren,
                    target: RelationshipTarget::Any,
                    link_type: None,
                }),
                Expression::Relationship(Relationship {
                    kind: RelationshipKind::NotLinkedTo,
                    target: RelationshipTarget::Tracker("epic".to_string()),
                    link_type: Some("_covered_by".to_string()),
                }),
            ]
        );
    }

    #[test]
    fn test_fields_named_like_keywords() {
        let q = parse("SELECT type WHERE parent = 'x' AND with = 1").unwrap();
        assert_eq!(q.select, vec![Searchable::Field("type".to_string())]);
        let Some(Expression::And(operands)) = q.condition else {
            panic!("expected AND");
        };
        assert_eq!(operands[0], comparison("parent", Operator::Equal, Value::String("x".to_string())));
        assert_eq!(operands[1], comparison("with", Operator::Equal, Value::Integer(1)));
    }

    #[test]
    fn test_syntax_error_locations() {
        let err = parse("SELECT @id WHERE title =").unwrap_err();
        assert_eq!(err.location.column, 25);
        assert!(err.message.contains("end of query"));

        let err = parse("SELECT @id\nWHERE title ~ 'a'").unwrap_err();
        assert_eq!(err.location.line, 2);
        assert_eq!(err.location.column, 13);
    }

    #[test]
    fn test_rejections() {
        assert!(parse("").is_err());
        assert!(parse("@id = 1").is_err());
        assert!(parse("SELECT").is_err());
        assert!(parse("SELECT @id FROM @status = 'x'").is_err());
        assert!(parse("SELECT @id FROM @project IN ()").is_err());
        assert!(parse("SELECT @id WHERE a = 1 b = 2").is_err());
        assert!(parse("SELECT @id WHERE a BETWEEN(1)").is_err());
        assert!(parse("SELECT @id WHERE d = NOW() + 3").is_err());
        assert!(parse("SELECT @id WHERE (a = 1").is_err());
        assert!(parse("SELECT @id WHERE IS LINKED").is_err());
        assert!(parse("SELECT @id ORDER @id").is_err());
    }
}
