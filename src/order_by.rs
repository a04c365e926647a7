//! ORDER BY: a buffering, stable multi-key sort.

use std::cmp::Ordering;

use tracing::debug;

use crate::ast::{Direction, OrderingTerm};
use crate::error::Result;
use crate::evaluator::{evaluate, ExecutionContext};
use crate::pipeline::Stage;
use crate::row::Row;
use crate::types::Value;

pub struct Order {
    terms: Vec<OrderingTerm>,
    // sort keys live beside the row so they never appear in its columns
    buffer: Vec<(Vec<Value>, Row)>,
}

impl Order {
    pub fn new(terms: Vec<OrderingTerm>) -> Self {
        Order {
            terms,
            buffer: Vec::new(),
        }
    }
}

/// Compare two key vectors term by term; the first difference decides.
fn compare_keys(terms: &[OrderingTerm], a: &[Value], b: &[Value]) -> Ordering {
    for ((term, x), y) in terms.iter().zip(a).zip(b) {
        let ord = x.sort_cmp(y);
        let ord = match term.direction {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

impl Stage for Order {
    fn process(&mut self, row: Row, ctx: &mut ExecutionContext) -> Result<Vec<Row>> {
        let keys = self
            .terms
            .iter()
            .map(|term| evaluate(&term.expr, &row, ctx))
            .collect::<Result<Vec<_>>>()?;
        self.buffer.push((keys, row));
        Ok(Vec::new())
    }

    fn finish(&mut self, _ctx: &mut ExecutionContext) -> Result<Vec<Row>> {
        let mut buffer = std::mem::take(&mut self.buffer);
        let terms = &self.terms;
        buffer.sort_by(|(a, _), (b, _)| compare_keys(terms, a, b));
        debug!(rows = buffer.len(), "order stage flushed");
        Ok(buffer.into_iter().map(|(_, row)| row).collect())
    }

    fn name(&self) -> &'static str {
        "order"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expression;

    fn term(column: &str, direction: Direction) -> OrderingTerm {
        OrderingTerm {
            expr: Expression::identifier(column),
            direction,
        }
    }

    fn sort(terms: Vec<OrderingTerm>, rows: Vec<Row>) -> Vec<Row> {
        let mut order = Order::new(terms);
        let mut ctx = ExecutionContext::new();
        for row in rows {
            assert!(order.process(row, &mut ctx).unwrap().is_empty());
        }
        order.finish(&mut ctx).unwrap()
    }

    fn column(rows: &[Row], name: &str) -> Vec<Value> {
        rows.iter().map(|r| r.get(name).cloned().unwrap()).collect()
    }

    #[test]
    fn test_nulls_then_numbers_then_text() {
        let rows = vec![
            Row::from_iter([("v", Value::Null)]),
            Row::from_iter([("v", Value::from("10"))]),
            Row::from_iter([("v", Value::from("2"))]),
            Row::from_iter([("v", Value::from("abc"))]),
        ];
        let sorted = sort(vec![term("v", Direction::Asc)], rows.into_iter().rev().collect());
        assert_eq!(
            column(&sorted, "v"),
            [Value::Null, Value::from("2"), Value::from("10"), Value::from("abc")]
        );
    }

    #[test]
    fn test_descending_and_tie_break() {
        let rows = vec![
            Row::from_iter([("name", "David"), ("age", "23"), ("g", "M")]),
            Row::from_iter([("name", "Bob"), ("age", "29"), ("g", "M")]),
            Row::from_iter([("name", "Jenny"), ("age", "30"), ("g", "F")]),
        ];
        let sorted = sort(
            vec![term("g", Direction::Asc), term("age", Direction::Desc)],
            rows,
        );
        assert_eq!(
            column(&sorted, "name"),
            [Value::from("Jenny"), Value::from("Bob"), Value::from("David")]
        );
    }

    #[test]
    fn test_sort_is_stable() {
        let rows: Vec<Row> = ["b", "a", "b", "a"]
            .iter()
            .enumerate()
            .map(|(i, k)| Row::from_iter([("k", Value::from(*k)), ("i", Value::Number(i as f64))]))
            .collect();
        let sorted = sort(vec![term("k", Direction::Asc)], rows);
        assert_eq!(
            column(&sorted, "i"),
            [1.0, 3.0, 0.0, 2.0].map(Value::Number)
        );
    }

    #[test]
    fn test_keys_do_not_leak_into_rows() {
        let sorted = sort(
            vec![OrderingTerm {
                expr: Expression::call("LOWERCASE", vec![Expression::identifier("n")]),
                direction: Direction::Asc,
            }],
            vec![Row::from_iter([("n", "B")]), Row::from_iter([("n", "a")])],
        );
        assert_eq!(sorted[0].len(), 1);
        assert_eq!(sorted[0].get("n"), Some(&Value::from("a")));
    }

    #[test]
    fn test_mixed_numeric_and_text_keys() {
        let pool = ["9", "10", "1a", "2", "100", "1b", "x", "20", "3c", "11"];
        let input: Vec<&str> = (0..60).map(|i| pool[(i * 7 + i / 10) % pool.len()]).collect();
        let rows = input.iter().map(|v| Row::from_iter([("code", *v)])).collect();

        let sorted = sort(vec![term("code", Direction::Asc)], rows);

        let (mut numbers, mut text): (Vec<&str>, Vec<&str>) =
            input.iter().copied().partition(|v| v.parse::<f64>().is_ok());
        numbers.sort_by(|a, b| {
            let (a, b): (f64, f64) = (a.parse().unwrap(), b.parse().unwrap());
            a.total_cmp(&b)
        });
        text.sort();
        let expected: Vec<Value> = numbers.into_iter().chain(text).map(Value::from).collect();
        assert_eq!(column(&sorted, "code"), expected);
        assert_eq!(sorted.len(), 60);
        assert_eq!(sorted[0].get("code"), Some(&Value::from("2")));
        assert_eq!(sorted[59].get("code"), Some(&Value::from("x")));
    }
}
