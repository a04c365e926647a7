//! AST node definitions for parsed queries.
//!
//! Every expression renders to a canonical string (its `Display` form). The
//! rendered form names output columns, and a structural encoding of the same
//! tree gives aggregate calls their content-addressed [`AggregateId`].

use std::fmt;

use xxhash_rust::xxh3::xxh3_64;

use crate::aggregates::AggregateFunction;
use crate::operators::BinaryOperator;
use crate::types::format_number;

/// A complete `SELECT` query.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub select: SelectList,
    /// The quoted table reference, resolved by the row source.
    pub from: String,
    pub where_clause: Option<Expression>,
    pub group_by: Option<Vec<Expression>>,
    pub having: Option<Expression>,
    pub order_by: Option<Vec<OrderingTerm>>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Distinct aggregate calls, filled in by
    /// [`identify_aggregates`](crate::aggregates::identify_aggregates).
    pub aggregates: Vec<Aggregate>,
}

impl Query {
    /// Whether the grouping stage has to run for this query.
    pub fn needs_grouping(&self) -> bool {
        self.group_by.is_some() || !self.aggregates.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectList {
    /// `SELECT *`
    Star,
    Columns(Vec<NamedExpression>),
}

/// An output column: an expression and the name it is emitted under.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedExpression {
    pub expr: Expression,
    pub name: String,
}

impl NamedExpression {
    /// Without an explicit name, identifiers keep their raw name and every
    /// other expression is named by its rendered form.
    pub fn new(expr: Expression, name: Option<String>) -> Self {
        let name = name.unwrap_or_else(|| match &expr {
            Expression::Identifier(id) => id.clone(),
            other => other.to_string(),
        });
        NamedExpression { expr, name }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Asc => f.write_str("ASC"),
            Direction::Desc => f.write_str("DESC"),
        }
    }
}

/// ORDER BY item.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderingTerm {
    pub expr: Expression,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhenThen {
    pub when: Expression,
    pub then: Expression,
}

/// Content-addressed identity of an aggregate call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AggregateId(pub u64);

impl fmt::Display for AggregateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// A call to an aggregate function, evaluated by the grouping stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub function: AggregateFunction,
    pub args: Vec<Expression>,
    pub id: AggregateId,
}

impl Aggregate {
    pub fn new(function: AggregateFunction, args: Vec<Expression>) -> Self {
        let mut buf = Vec::new();
        encode_call(function.name(), &args, &mut buf);
        Aggregate {
            function,
            args,
            id: AggregateId(xxh3_64(&buf)),
        }
    }
}

/// Expression AST node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    // Literals
    Null,
    Bool(bool),
    /// `text` is the literal as written, used when naming output columns.
    Number {
        value: f64,
        text: String,
    },
    String(String),

    Identifier(String),

    // Only produced as the argument of COUNT(*)
    Star,

    // Scalar function call; the name is canonicalised to uppercase
    Call {
        name: String,
        args: Vec<Expression>,
    },

    Aggregate(Aggregate),

    Binary {
        op: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },

    // CASE WHEN cond THEN ... END
    CaseIf {
        cases: Vec<WhenThen>,
        else_expr: Option<Box<Expression>>,
    },

    // CASE expr WHEN value THEN ... END
    CaseSwitch {
        switch: Box<Expression>,
        cases: Vec<WhenThen>,
        else_expr: Option<Box<Expression>>,
    },
}

impl Expression {
    pub fn identifier(name: &str) -> Self {
        Expression::Identifier(name.to_owned())
    }

    pub fn number(value: f64) -> Self {
        Expression::Number {
            value,
            text: format_number(value),
        }
    }

    pub fn string(s: &str) -> Self {
        Expression::String(s.to_owned())
    }

    pub fn call(name: &str, args: Vec<Expression>) -> Self {
        Expression::Call {
            name: name.to_ascii_uppercase(),
            args,
        }
    }

    pub fn binary(op: BinaryOperator, left: Expression, right: Expression) -> Self {
        Expression::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Append a stable, unambiguous byte encoding of this tree to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Expression::Null => out.push(0),
            Expression::Bool(b) => {
                out.push(1);
                out.push(u8::from(*b));
            }
            Expression::Number { value, .. } => {
                out.push(2);
                out.extend_from_slice(&value.to_bits().to_le_bytes());
            }
            Expression::String(s) => {
                out.push(3);
                encode_str(s, out);
            }
            Expression::Identifier(name) => {
                out.push(4);
                encode_str(name, out);
            }
            Expression::Star => out.push(5),
            Expression::Call { name, args } => encode_call(name, args, out),
            Expression::Aggregate(agg) => {
                out.push(7);
                out.extend_from_slice(&agg.id.0.to_le_bytes());
            }
            Expression::Binary { op, left, right } => {
                out.push(8);
                encode_str(op.symbol(), out);
                left.encode(out);
                right.encode(out);
            }
            Expression::CaseIf { cases, else_expr } => {
                out.push(9);
                encode_cases(cases, else_expr.as_deref(), out);
            }
            Expression::CaseSwitch {
                switch,
                cases,
                else_expr,
            } => {
                out.push(10);
                switch.encode(out);
                encode_cases(cases, else_expr.as_deref(), out);
            }
        }
    }
}

fn encode_str(s: &str, out: &mut Vec<u8>) {
    out.extend_from_slice(&(s.len() as u64).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn encode_call(name: &str, args: &[Expression], out: &mut Vec<u8>) {
    out.push(6);
    encode_str(name, out);
    out.extend_from_slice(&(args.len() as u64).to_le_bytes());
    for arg in args {
        arg.encode(out);
    }
}

fn encode_cases(cases: &[WhenThen], else_expr: Option<&Expression>, out: &mut Vec<u8>) {
    out.extend_from_slice(&(cases.len() as u64).to_le_bytes());
    for case in cases {
        case.when.encode(out);
        case.then.encode(out);
    }
    match else_expr {
        Some(e) => {
            out.push(1);
            e.encode(out);
        }
        None => out.push(0),
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn quote(s: &str, delimiter: char) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push(delimiter);
    for ch in s.chars() {
        if ch == delimiter || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push(delimiter);
    out
}

fn is_bare_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_ok = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    starts_ok
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !is_reserved_word(name)
}

fn is_reserved_word(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "SELECT", "FROM", "WHERE", "GROUP", "BY", "HAVING", "AS", "ORDER", "ASC", "DESC",
        "LIMIT", "OFFSET", "CASE", "WHEN", "THEN", "ELSE", "END", "NOT", "NULL", "TRUE",
        "FALSE", "AND", "OR", "IS", "LIKE",
    ];
    RESERVED.contains(&name.to_ascii_uppercase().as_str())
}

fn write_operand(f: &mut fmt::Formatter<'_>, expr: &Expression) -> fmt::Result {
    if matches!(expr, Expression::Binary { .. }) {
        write!(f, "({})", expr)
    } else {
        write!(f, "{}", expr)
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, name: &str, args: &[Expression]) -> fmt::Result {
    write!(f, "{}(", name)?;
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", arg)?;
    }
    f.write_str(")")
}

fn write_case(
    f: &mut fmt::Formatter<'_>,
    switch: Option<&Expression>,
    cases: &[WhenThen],
    else_expr: Option<&Expression>,
) -> fmt::Result {
    f.write_str("CASE")?;
    if let Some(switch) = switch {
        write!(f, " {}", switch)?;
    }
    for case in cases {
        write!(f, " {}", case)?;
    }
    if let Some(else_expr) = else_expr {
        write!(f, " ELSE {}", else_expr)?;
    }
    f.write_str(" END")
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Null => f.write_str("NULL"),
            Expression::Bool(true) => f.write_str("TRUE"),
            Expression::Bool(false) => f.write_str("FALSE"),
            Expression::Number { text, .. } => f.write_str(text),
            Expression::String(s) => f.write_str(&quote(s, '"')),
            Expression::Identifier(name) => {
                if is_bare_identifier(name) {
                    f.write_str(name)
                } else {
                    f.write_str(&quote(name, '`'))
                }
            }
            Expression::Star => f.write_str("*"),
            Expression::Call { name, args } => write_args(f, name, args),
            Expression::Aggregate(agg) => write!(f, "{}", agg),
            Expression::Binary { op, left, right } => {
                write_operand(f, left)?;
                write!(f, " {} ", op)?;
                write_operand(f, right)
            }
            Expression::CaseIf { cases, else_expr } => {
                write_case(f, None, cases, else_expr.as_deref())
            }
            Expression::CaseSwitch {
                switch,
                cases,
                else_expr,
            } => write_case(f, Some(switch), cases, else_expr.as_deref()),
        }
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_args(f, self.function.name(), &self.args)
    }
}

impl fmt::Display for WhenThen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WHEN {} THEN {}", self.when, self.then)
    }
}

impl fmt::Display for OrderingTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.expr, self.direction)
    }
}
