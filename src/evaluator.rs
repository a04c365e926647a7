//! Expression evaluation against a single row.

use crate::ast::{Expression, WhenThen};
use crate::error::{CsvSqlError, Result};
use crate::functions::eval_function;
use crate::operators::BinaryOperator;
use crate::pattern::PatternCache;
use crate::row::Row;
use crate::types::Value;

/// Mutable state shared by every evaluation within one query execution.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    pub patterns: PatternCache,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Evaluate `expr` against `row`.
///
/// Aggregate nodes read the accumulated value the grouping stage stored on
/// the row; they are never computed here.
pub fn evaluate(expr: &Expression, row: &Row, ctx: &mut ExecutionContext) -> Result<Value> {
    match expr {
        Expression::Null => Ok(Value::Null),
        Expression::Bool(b) => Ok(Value::Bool(*b)),
        Expression::Number { value, .. } => Ok(Value::Number(*value)),
        Expression::String(s) => Ok(Value::Text(s.clone())),
        Expression::Star => Ok(Value::Text("*".into())),

        Expression::Identifier(name) => row
            .get(name)
            .cloned()
            .ok_or_else(|| CsvSqlError::ColumnNotFound(expr.to_string())),

        Expression::Call { name, args } => {
            let values = args
                .iter()
                .map(|arg| evaluate(arg, row, ctx))
                .collect::<Result<Vec<_>>>()?;
            eval_function(name, &values).ok_or_else(|| CsvSqlError::UnknownFunction(name.clone()))
        }

        Expression::Aggregate(agg) => row.aggregate_value(agg.id).cloned().ok_or_else(|| {
            CsvSqlError::Semantic(format!("{} used outside of a grouped query", agg))
        }),

        Expression::Binary { op, left, right } => {
            // both sides always evaluated, including for AND / OR
            let left = evaluate(left, row, ctx)?;
            let right = evaluate(right, row, ctx)?;
            apply_binary(*op, &left, &right, ctx)
        }

        Expression::CaseIf { cases, else_expr } => {
            for WhenThen { when, then } in cases {
                if evaluate(when, row, ctx)?.is_truthy() {
                    return evaluate(then, row, ctx);
                }
            }
            evaluate_else(else_expr.as_deref(), row, ctx)
        }

        Expression::CaseSwitch {
            switch,
            cases,
            else_expr,
        } => {
            let switch = evaluate(switch, row, ctx)?;
            for WhenThen { when, then } in cases {
                if evaluate(when, row, ctx)?.loose_eq(&switch) {
                    return evaluate(then, row, ctx);
                }
            }
            evaluate_else(else_expr.as_deref(), row, ctx)
        }
    }
}

fn evaluate_else(
    else_expr: Option<&Expression>,
    row: &Row,
    ctx: &mut ExecutionContext,
) -> Result<Value> {
    match else_expr {
        Some(e) => evaluate(e, row, ctx),
        None => Ok(Value::Null),
    }
}

/// Apply a binary operator to two evaluated operands.
pub fn apply_binary(
    op: BinaryOperator,
    left: &Value,
    right: &Value,
    ctx: &mut ExecutionContext,
) -> Result<Value> {
    use BinaryOperator::*;

    let value = match op {
        Eq => Value::Bool(left.loose_eq(right)),
        NotEq | NotEqAlt => Value::Bool(!left.loose_eq(right)),
        Is => Value::Bool((left.is_null() && right.is_null()) || left.loose_eq(right)),

        Lt => Value::Bool(left.to_number() < right.to_number()),
        Gt => Value::Bool(left.to_number() > right.to_number()),
        LtEq => Value::Bool(left.to_number() <= right.to_number()),
        GtEq => Value::Bool(left.to_number() >= right.to_number()),

        And => Value::Bool(left.is_truthy() && right.is_truthy()),
        Or => Value::Bool(left.is_truthy() || right.is_truthy()),

        Like => Value::Bool(ctx.patterns.is_match(&right.to_text(), &left.to_text())?),

        Add => Value::Number(left.to_number() + right.to_number()),
        Subtract => Value::Number(left.to_number() - right.to_number()),
        Multiply => Value::Number(left.to_number() * right.to_number()),
        Divide => Value::Number(left.to_number() / right.to_number()),
        Modulo => Value::Number(left.to_number() % right.to_number()),
        Power => Value::Number(left.to_number().powf(right.to_number())),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregates::identify_aggregates_in_expression;
    use crate::parser::Parser;
    use crate::row::AggregateValues;
    use crate::tokenizer::tokenize;

    fn people_row() -> Row {
        Row::from_iter([("name", "Bob Jones"), ("age", "29"), ("gender", "M"), ("blank", "")])
    }

    fn parse(text: &str) -> Expression {
        Parser::new(tokenize(text).unwrap()).parse_expression().unwrap()
    }

    fn eval(text: &str) -> Result<Value> {
        evaluate(&parse(text), &people_row(), &mut ExecutionContext::new())
    }

    #[test]
    fn test_literals_and_columns() {
        assert_eq!(eval("NULL").unwrap(), Value::Null);
        assert_eq!(eval("TRUE").unwrap(), Value::Bool(true));
        assert_eq!(eval("2.5").unwrap(), Value::Number(2.5));
        assert_eq!(eval("'x'").unwrap(), Value::from("x"));
        assert_eq!(eval("name").unwrap(), Value::from("Bob Jones"));
    }

    #[test]
    fn test_missing_column() {
        let err = eval("height").unwrap_err();
        assert!(matches!(err, CsvSqlError::ColumnNotFound(ref c) if c == "height"));
        assert!(err.is_evaluation());
        let err = eval("`first name`").unwrap_err();
        assert!(matches!(err, CsvSqlError::ColumnNotFound(c) if c == "`first name`"));
    }

    #[test]
    fn test_unknown_function() {
        let err = eval("SHOUT(name)").unwrap_err();
        assert_eq!(err.to_string(), "SQL function not found: SHOUT");
    }

    #[test]
    fn test_equality_is_string_based() {
        assert_eq!(eval(r#"1 = "1""#).unwrap(), Value::Bool(true));
        assert_eq!(eval("age = 29").unwrap(), Value::Bool(true));
        assert_eq!(eval("age != 29").unwrap(), Value::Bool(false));
        assert_eq!(eval("age <> 30").unwrap(), Value::Bool(true));
        assert_eq!(eval(r#"NULL = """#).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_comparison_is_numeric() {
        assert_eq!(eval(r#""10" > "9""#).unwrap(), Value::Bool(true));
        assert_eq!(eval("age >= 29").unwrap(), Value::Bool(true));
        assert_eq!(eval("age < 25").unwrap(), Value::Bool(false));
        assert_eq!(eval("name < 5").unwrap(), Value::Bool(false));
        assert_eq!(eval("name > 5").unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_logic_and_is() {
        assert_eq!(eval("age > 25 AND gender = 'M'").unwrap(), Value::Bool(true));
        assert_eq!(eval("age > 30 OR gender = 'F'").unwrap(), Value::Bool(false));
        assert_eq!(eval("blank IS NULL").unwrap(), Value::Bool(true));
        assert_eq!(eval("gender IS NULL").unwrap(), Value::Bool(false));
        assert_eq!(eval("gender IS 'M'").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_logic_evaluates_both_sides() {
        let err = eval("FALSE AND missing").unwrap_err();
        assert!(matches!(err, CsvSqlError::ColumnNotFound(_)));
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("1 + 2 * 3").unwrap(), Value::Number(7.0));
        assert_eq!(eval("age - 9").unwrap(), Value::Number(20.0));
        assert_eq!(eval("7 % 4").unwrap(), Value::Number(3.0));
        assert_eq!(eval("2 ^ 10").unwrap(), Value::Number(1024.0));
        assert_eq!(eval("9 / 2").unwrap(), Value::Number(4.5));
    }

    #[test]
    fn test_like() {
        assert_eq!(eval("name LIKE 'b%'").unwrap(), Value::Bool(true));
        assert_eq!(eval("name LIKE '%O%'").unwrap(), Value::Bool(true));
        assert_eq!(eval("name LIKE 'J%'").unwrap(), Value::Bool(false));

        let mut ctx = ExecutionContext::new();
        let expr = parse("name LIKE 'b%'");
        evaluate(&expr, &people_row(), &mut ctx).unwrap();
        evaluate(&expr, &people_row(), &mut ctx).unwrap();
        assert_eq!(ctx.patterns.len(), 1);
    }

    #[test]
    fn test_functions() {
        assert_eq!(eval("LOWERCASE(gender)").unwrap(), Value::from("m"));
        assert_eq!(eval("uppercase(name)").unwrap(), Value::from("BOB JONES"));
        assert_eq!(eval("LEN(name)").unwrap(), Value::Number(9.0));
        assert_eq!(eval("COALESCE(blank, gender)").unwrap(), Value::from("M"));
    }

    #[test]
    fn test_case_expressions() {
        assert_eq!(
            eval("CASE gender WHEN 'F' THEN 'woman' WHEN 'M' THEN 'man' END").unwrap(),
            Value::from("man")
        );
        assert_eq!(
            eval("CASE WHEN age > 30 THEN 'old' ELSE 'young' END").unwrap(),
            Value::from("young")
        );
        assert_eq!(eval("CASE WHEN age > 30 THEN 'old' END").unwrap(), Value::Null);
        assert_eq!(eval("CASE age WHEN '29' THEN 1 END").unwrap(), Value::Number(1.0));
    }

    #[test]
    fn test_aggregates_read_accumulated_state() {
        let (expr, aggregates) =
            identify_aggregates_in_expression(parse("COUNT(name) + 1")).unwrap();
        let mut row = people_row();
        let mut state = AggregateValues::new();
        state.insert(aggregates[0].id, Value::Number(3.0));
        row.set_aggregates(state);
        let value = evaluate(&expr, &row, &mut ExecutionContext::new()).unwrap();
        assert_eq!(value, Value::Number(4.0));

        let err = evaluate(&expr, &people_row(), &mut ExecutionContext::new()).unwrap_err();
        assert!(matches!(err, CsvSqlError::Semantic(_)));
    }
}
