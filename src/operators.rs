//! Binary operator table: symbols, precedence and associativity.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Associativity {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Power,
    Divide,
    Multiply,
    Modulo,
    Add,
    Subtract,
    Is,
    Like,
    LtEq,
    GtEq,
    Lt,
    Gt,
    NotEq,
    /// `<>`; evaluates like `!=` but keeps its own spelling.
    NotEqAlt,
    Eq,
    And,
    Or,
}

impl BinaryOperator {
    /// Look up an operator by its canonical (uppercase) spelling.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let op = match symbol {
            "^" => BinaryOperator::Power,
            "/" => BinaryOperator::Divide,
            "*" => BinaryOperator::Multiply,
            "%" => BinaryOperator::Modulo,
            "+" => BinaryOperator::Add,
            "-" => BinaryOperator::Subtract,
            "IS" => BinaryOperator::Is,
            "LIKE" => BinaryOperator::Like,
            "<=" => BinaryOperator::LtEq,
            ">=" => BinaryOperator::GtEq,
            "<" => BinaryOperator::Lt,
            ">" => BinaryOperator::Gt,
            "!=" => BinaryOperator::NotEq,
            "<>" => BinaryOperator::NotEqAlt,
            "=" => BinaryOperator::Eq,
            "AND" => BinaryOperator::And,
            "OR" => BinaryOperator::Or,
            _ => return None,
        };
        Some(op)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Power => "^",
            BinaryOperator::Divide => "/",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Is => "IS",
            BinaryOperator::Like => "LIKE",
            BinaryOperator::LtEq => "<=",
            BinaryOperator::GtEq => ">=",
            BinaryOperator::Lt => "<",
            BinaryOperator::Gt => ">",
            BinaryOperator::NotEq => "!=",
            BinaryOperator::NotEqAlt => "<>",
            BinaryOperator::Eq => "=",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
        }
    }

    pub fn precedence(self) -> u8 {
        match self {
            BinaryOperator::Power => 80,
            BinaryOperator::Divide | BinaryOperator::Multiply | BinaryOperator::Modulo => 70,
            BinaryOperator::Add | BinaryOperator::Subtract => 60,
            BinaryOperator::Is
            | BinaryOperator::Like
            | BinaryOperator::LtEq
            | BinaryOperator::GtEq
            | BinaryOperator::Lt
            | BinaryOperator::Gt
            | BinaryOperator::NotEq
            | BinaryOperator::NotEqAlt
            | BinaryOperator::Eq => 50,
            BinaryOperator::And => 40,
            BinaryOperator::Or => 30,
        }
    }

    /// `=` is right-associative so that `a = b = TRUE` reads as
    /// `a = (b = TRUE)`. Everything else associates to the left.
    pub fn associativity(self) -> Associativity {
        match self {
            BinaryOperator::Eq => Associativity::Right,
            _ => Associativity::Left,
        }
    }

    /// Whether `self`, found after an operand parsed under `control`, binds
    /// into that operand rather than ending it.
    pub fn binds_tighter_than(self, control: Option<BinaryOperator>) -> bool {
        match control {
            None => true,
            Some(control) => {
                self.precedence() > control.precedence()
                    || (self.precedence() == control.precedence()
                        && control.associativity() == Associativity::Right)
            }
        }
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
