//! Aggregate functions and the pass that finds them in a parsed query.
//!
//! Parsing produces plain [`Expression::Call`] nodes for every function.
//! [`identify_aggregates`] replaces calls to aggregate functions with
//! [`Expression::Aggregate`] nodes and records the distinct aggregates on
//! the query, so the grouping stage knows what to accumulate and the
//! evaluator knows to read accumulated values instead of calling anything.

use std::fmt;

use indexmap::IndexMap;
use tracing::debug;

use crate::ast::{Aggregate, AggregateId, Expression, OrderingTerm, Query, SelectList, WhenThen};
use crate::error::{CsvSqlError, Result};
use crate::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    Count,
    Min,
    Max,
    Sum,
    GroupConcat,
}

impl AggregateFunction {
    /// Case-insensitive lookup by SQL name.
    pub fn from_name(name: &str) -> Option<Self> {
        let func = match name.to_ascii_uppercase().as_str() {
            "COUNT" => AggregateFunction::Count,
            "MIN" => AggregateFunction::Min,
            "MAX" => AggregateFunction::Max,
            "SUM" => AggregateFunction::Sum,
            "GROUP_CONCAT" => AggregateFunction::GroupConcat,
            _ => return None,
        };
        Some(func)
    }

    pub fn name(self) -> &'static str {
        match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::GroupConcat => "GROUP_CONCAT",
        }
    }

    /// Accumulator value for a group before any row is folded in.
    pub fn initial(self) -> Value {
        match self {
            AggregateFunction::Count => Value::Number(0.0),
            _ => Value::Null,
        }
    }

    /// Fold one evaluated argument into the accumulator.
    pub fn reduce(self, acc: Value, value: &Value) -> Value {
        match self {
            AggregateFunction::Count => {
                let n = acc.to_number();
                if value.is_null() {
                    Value::Number(n)
                } else {
                    Value::Number(n + 1.0)
                }
            }
            AggregateFunction::Min => extremum(acc, value, |candidate, current| candidate < current),
            AggregateFunction::Max => extremum(acc, value, |candidate, current| candidate > current),
            // NULL inputs take part as 0
            AggregateFunction::Sum => Value::Number(acc.to_number() + value.to_number()),
            AggregateFunction::GroupConcat => {
                if value.is_null() {
                    acc
                } else {
                    let mut s = acc.to_text();
                    s.push_str(&value.to_text());
                    Value::Text(s)
                }
            }
        }
    }
}

fn extremum(acc: Value, value: &Value, replaces: impl Fn(f64, f64) -> bool) -> Value {
    if value.is_null() {
        return acc;
    }
    let Some(candidate) = value.as_number() else {
        return acc;
    };
    if acc.is_null() || replaces(candidate, acc.to_number()) {
        Value::Number(candidate)
    } else {
        acc
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Rewriting
// ---------------------------------------------------------------------------

type Found = IndexMap<AggregateId, Aggregate>;

/// Rewrite aggregate calls in the output columns, HAVING and ORDER BY of
/// `query` and fill in `query.aggregates`, deduplicated by id in the order
/// they were first seen.
pub fn identify_aggregates(mut query: Query) -> Result<Query> {
    reject_aggregates(query.where_clause.as_ref(), "WHERE")?;
    for expr in query.group_by.iter().flatten() {
        reject_aggregates(Some(expr), "GROUP BY")?;
    }

    let mut found = Found::new();

    if let SelectList::Columns(columns) = &mut query.select {
        for column in columns.iter_mut() {
            rewrite_in_place(&mut column.expr, &mut found)?;
        }
    }
    if let Some(having) = &mut query.having {
        rewrite_in_place(having, &mut found)?;
    }
    for OrderingTerm { expr, .. } in query.order_by.iter_mut().flatten() {
        rewrite_in_place(expr, &mut found)?;
    }

    query.aggregates = found.into_values().collect();
    debug!(count = query.aggregates.len(), "resolved aggregates");
    Ok(query)
}

/// Rewrite a single expression, returning it together with the distinct
/// aggregates it uses.
pub fn identify_aggregates_in_expression(expr: Expression) -> Result<(Expression, Vec<Aggregate>)> {
    let mut found = Found::new();
    let expr = rewrite(expr, &mut found)?;
    Ok((expr, found.into_values().collect()))
}

fn reject_aggregates(expr: Option<&Expression>, clause: &str) -> Result<()> {
    match expr {
        Some(expr) if contains_aggregate(expr) => Err(CsvSqlError::Semantic(format!(
            "aggregate functions are not allowed in {}",
            clause
        ))),
        _ => Ok(()),
    }
}

fn rewrite_in_place(expr: &mut Expression, found: &mut Found) -> Result<()> {
    let taken = std::mem::replace(expr, Expression::Null);
    *expr = rewrite(taken, found)?;
    Ok(())
}

fn rewrite(expr: Expression, found: &mut Found) -> Result<Expression> {
    let rewritten = match expr {
        Expression::Call { name, args } => match AggregateFunction::from_name(&name) {
            Some(function) => {
                if args.iter().any(contains_aggregate) {
                    return Err(CsvSqlError::Semantic(
                        "calls to aggregate functions cannot be nested".into(),
                    ));
                }
                if args.len() != 1 {
                    return Err(CsvSqlError::Semantic(format!(
                        "{} takes exactly one argument, got {}",
                        function,
                        args.len()
                    )));
                }
                let aggregate = Aggregate::new(function, args);
                found.entry(aggregate.id).or_insert_with(|| aggregate.clone());
                Expression::Aggregate(aggregate)
            }
            None => Expression::Call {
                name,
                args: args
                    .into_iter()
                    .map(|arg| rewrite(arg, found))
                    .collect::<Result<_>>()?,
            },
        },
        Expression::Aggregate(aggregate) => {
            found.entry(aggregate.id).or_insert_with(|| aggregate.clone());
            Expression::Aggregate(aggregate)
        }
        Expression::Binary { op, left, right } => Expression::Binary {
            op,
            left: Box::new(rewrite(*left, found)?),
            right: Box::new(rewrite(*right, found)?),
        },
        Expression::CaseIf { cases, else_expr } => Expression::CaseIf {
            cases: rewrite_cases(cases, found)?,
            else_expr: rewrite_boxed(else_expr, found)?,
        },
        Expression::CaseSwitch {
            switch,
            cases,
            else_expr,
        } => Expression::CaseSwitch {
            switch: Box::new(rewrite(*switch, found)?),
            cases: rewrite_cases(cases, found)?,
            else_expr: rewrite_boxed(else_expr, found)?,
        },
        leaf => leaf,
    };
    Ok(rewritten)
}

fn rewrite_cases(cases: Vec<WhenThen>, found: &mut Found) -> Result<Vec<WhenThen>> {
    cases
        .into_iter()
        .map(|case| {
            Ok(WhenThen {
                when: rewrite(case.when, found)?,
                then: rewrite(case.then, found)?,
            })
        })
        .collect()
}

fn rewrite_boxed(
    expr: Option<Box<Expression>>,
    found: &mut Found,
) -> Result<Option<Box<Expression>>> {
    expr.map(|e| rewrite(*e, found).map(Box::new)).transpose()
}

/// Whether `expr` calls an aggregate function anywhere in its tree.
pub fn contains_aggregate(expr: &Expression) -> bool {
    match expr {
        Expression::Aggregate(_) => true,
        Expression::Call { name, args } => {
            AggregateFunction::from_name(name).is_some() || args.iter().any(contains_aggregate)
        }
        Expression::Binary { left, right, .. } => {
            contains_aggregate(left) || contains_aggregate(right)
        }
        Expression::CaseIf { cases, else_expr } => {
            cases_contain_aggregate(cases) || else_expr.as_deref().is_some_and(contains_aggregate)
        }
        Expression::CaseSwitch {
            switch,
            cases,
            else_expr,
        } => {
            contains_aggregate(switch)
                || cases_contain_aggregate(cases)
                || else_expr.as_deref().is_some_and(contains_aggregate)
        }
        _ => false,
    }
}

fn cases_contain_aggregate(cases: &[WhenThen]) -> bool {
    cases
        .iter()
        .any(|c| contains_aggregate(&c.when) || contains_aggregate(&c.then))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::BinaryOperator;
    use crate::parser::parse_query;

    fn id(name: &str) -> Expression {
        Expression::identifier(name)
    }

    fn agg(function: AggregateFunction, arg: Expression) -> Aggregate {
        Aggregate::new(function, vec![arg])
    }

    #[test]
    fn test_basic_expressions_have_no_aggregates() {
        for exp in [
            id("foo"),
            Expression::number(2.0),
            Expression::Bool(true),
            Expression::string("foo"),
            Expression::call("UPPERCASE", vec![id("x")]),
        ] {
            let (rewritten, found) = identify_aggregates_in_expression(exp.clone()).unwrap();
            assert_eq!(rewritten, exp);
            assert!(found.is_empty());
        }
    }

    #[test]
    fn test_call_becomes_aggregate() {
        let exp = Expression::call("count", vec![Expression::number(1.0)]);
        let expected = agg(AggregateFunction::Count, Expression::number(1.0));
        let (rewritten, found) = identify_aggregates_in_expression(exp).unwrap();
        assert_eq!(rewritten, Expression::Aggregate(expected.clone()));
        assert_eq!(found, vec![expected]);
    }

    #[test]
    fn test_aggregates_in_operands_and_arguments() {
        let exp = Expression::call(
            "COALESCE",
            vec![Expression::binary(
                BinaryOperator::Subtract,
                Expression::call("MAX", vec![id("age")]),
                Expression::call("MIN", vec![id("age")]),
            )],
        );
        let (_, found) = identify_aggregates_in_expression(exp).unwrap();
        assert_eq!(
            found,
            vec![
                agg(AggregateFunction::Max, id("age")),
                agg(AggregateFunction::Min, id("age")),
            ]
        );
    }

    #[test]
    fn test_duplicate_aggregates_share_an_id() {
        let exp = Expression::binary(
            BinaryOperator::Multiply,
            Expression::call("COUNT", vec![id("id")]),
            Expression::call("count", vec![id("id")]),
        );
        let (rewritten, found) = identify_aggregates_in_expression(exp).unwrap();
        assert_eq!(found.len(), 1);
        if let Expression::Binary { left, right, .. } = rewritten {
            assert!(matches!(*left, Expression::Aggregate(ref a) if a.id == found[0].id));
            assert!(matches!(*right, Expression::Aggregate(ref a) if a.id == found[0].id));
        } else {
            panic!("Expected binary expression");
        }
    }

    #[test]
    fn test_nested_aggregates_are_rejected() {
        let exp = Expression::call("COUNT", vec![Expression::call("MAX", vec![id("x")])]);
        let err = identify_aggregates_in_expression(exp).unwrap_err();
        assert!(matches!(err, CsvSqlError::Semantic(msg) if msg.contains("nested")));
    }

    #[test]
    fn test_aggregate_argument_count() {
        let exp = Expression::call("SUM", vec![id("a"), id("b")]);
        assert!(matches!(
            identify_aggregates_in_expression(exp),
            Err(CsvSqlError::Semantic(_))
        ));
    }

    #[test]
    fn test_query_aggregates_are_collected_across_clauses() {
        let query = parse_query(
            r#"SELECT g, COUNT(*), SUM(CASE WHEN x > 1 THEN 1 ELSE 0 END) FROM "t"
               GROUP BY g HAVING COUNT(*) > 1 ORDER BY MAX(x) DESC"#,
        )
        .unwrap();
        let query = identify_aggregates(query).unwrap();
        let names: Vec<String> = query.aggregates.iter().map(|a| a.to_string()).collect();
        assert_eq!(names, ["COUNT(*)", "SUM(CASE WHEN x > 1 THEN 1 ELSE 0 END)", "MAX(x)"]);
        assert!(query.needs_grouping());
    }

    #[test]
    fn test_aggregates_in_where_are_rejected() {
        let query = parse_query(r#"SELECT a FROM "t" WHERE COUNT(a) > 1"#).unwrap();
        assert!(matches!(identify_aggregates(query), Err(CsvSqlError::Semantic(_))));
        let query = parse_query(r#"SELECT a FROM "t" GROUP BY MAX(a)"#).unwrap();
        assert!(matches!(identify_aggregates(query), Err(CsvSqlError::Semantic(_))));
    }

    #[test]
    fn test_reducers() {
        use AggregateFunction::*;
        let fold = |f: AggregateFunction, values: &[Value]| {
            values
                .iter()
                .fold(f.initial(), |acc, v| f.reduce(acc, v))
        };
        let values = [
            Value::from("3"),
            Value::from(""),
            Value::Null,
            Value::from("10"),
            Value::from("abc"),
        ];
        assert_eq!(fold(Count, &values), Value::Number(3.0));
        assert_eq!(fold(Min, &values), Value::Number(3.0));
        assert_eq!(fold(Max, &values), Value::Number(10.0));
        assert_eq!(fold(GroupConcat, &values), Value::from("310abc"));
        assert_eq!(fold(Sum, &values[..4]), Value::Number(13.0));
        assert!(fold(Sum, &values).to_number().is_nan());
        assert_eq!(fold(Min, &[]), Value::Null);
        assert_eq!(fold(Count, &[]), Value::Number(0.0));
    }
}
