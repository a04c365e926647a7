/// Query parser - recursive descent with precedence climbing for expressions.
use tracing::debug;

use crate::ast::*;
use crate::error::{CsvSqlError, Result};
use crate::operators::BinaryOperator;
use crate::tokenizer::{tokenize, Token, TokenKind};

const END_OF_INPUT: &str = "(end of input)";
const TOO_DEEP: &str = "a shallower expression";

/// Limit on both parser recursion and the height of an expression tree.
/// Evaluation, rendering and drop all recurse over the tree.
const MAX_EXPRESSION_DEPTH: usize = 256;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    /// Parse a complete query, an optional `;`, and nothing else.
    pub fn parse(&mut self) -> Result<Query> {
        let query = self.parse_select()?;
        if self.check_kind(TokenKind::Semicolon) {
            self.advance();
        }
        if !self.at_end() {
            let rest: Vec<&str> = self.tokens[self.pos..]
                .iter()
                .map(|t| t.text.as_str())
                .collect();
            return Err(CsvSqlError::syntax("end of input", rest.join(" ")));
        }
        Ok(query)
    }

    fn parse_select(&mut self) -> Result<Query> {
        self.expect_keyword("SELECT")?;
        let select = self.parse_output_columns()?;

        self.expect_keyword("FROM")?;
        let from = self.parse_table_name()?;

        let where_clause = self.parse_condition_clause("WHERE")?;
        let (group_by, having) = self.parse_group_by_having()?;

        let order_by = if self.check_keyword("ORDER") {
            self.advance();
            self.expect_keyword("BY")?;
            Some(self.many(Self::parse_ordering_term, true, 1)?)
        } else {
            None
        };

        let limit = self.parse_count_clause("LIMIT")?;
        let offset = self.parse_count_clause("OFFSET")?;

        Ok(Query {
            select,
            from,
            where_clause,
            group_by,
            having,
            order_by,
            limit,
            offset,
            aggregates: Vec::new(),
        })
    }

    fn parse_output_columns(&mut self) -> Result<SelectList> {
        if self.check_kind(TokenKind::Star) {
            self.advance();
            return Ok(SelectList::Star);
        }
        let columns = self.many(Self::parse_named_expression, true, 1)?;
        Ok(SelectList::Columns(columns))
    }

    fn parse_named_expression(&mut self) -> Result<NamedExpression> {
        let expr = self.parse_expression()?;
        if !self.check_keyword("AS") {
            return Ok(NamedExpression::new(expr, None));
        }
        self.advance();
        let name = match self.peek() {
            Some(t) if matches!(t.kind, TokenKind::Identifier | TokenKind::String) => {
                t.text_value().unwrap_or_default().to_owned()
            }
            _ => return Err(CsvSqlError::syntax("a column name", self.found())),
        };
        self.advance();
        Ok(NamedExpression::new(expr, Some(name)))
    }

    fn parse_table_name(&mut self) -> Result<String> {
        let token = self.expect_kind(TokenKind::String, "a table name")?;
        Ok(token.text_value().unwrap_or_default().to_owned())
    }

    fn parse_condition_clause(&mut self, keyword: &str) -> Result<Option<Expression>> {
        if !self.check_keyword(keyword) {
            return Ok(None);
        }
        self.advance();
        Ok(Some(self.parse_expression()?))
    }

    /// HAVING is only looked for directly after a GROUP BY list.
    fn parse_group_by_having(&mut self) -> Result<(Option<Vec<Expression>>, Option<Expression>)> {
        if !self.check_keyword("GROUP") {
            return Ok((None, None));
        }
        self.advance();
        self.expect_keyword("BY")?;
        let group_by = self.many(Self::parse_expression, true, 1)?;
        let having = self.parse_condition_clause("HAVING")?;
        Ok((Some(group_by), having))
    }

    fn parse_ordering_term(&mut self) -> Result<OrderingTerm> {
        let expr = self.parse_expression()?;
        let direction = if self.check_keyword("ASC") {
            self.advance();
            Direction::Asc
        } else if self.check_keyword("DESC") {
            self.advance();
            Direction::Desc
        } else {
            Direction::Asc
        };
        Ok(OrderingTerm { expr, direction })
    }

    /// `LIMIT n` / `OFFSET n`, where `n` is a non-negative integer literal.
    fn parse_count_clause(&mut self, keyword: &str) -> Result<Option<u64>> {
        if !self.check_keyword(keyword) {
            return Ok(None);
        }
        self.advance();
        let token = self.expect_kind(TokenKind::Number, "a number")?;
        match token.number_value() {
            Some(n) if n.fract() == 0.0 && n >= 0.0 && n <= u64::MAX as f64 => Ok(Some(n as u64)),
            _ => Err(CsvSqlError::syntax("an integer", token.text)),
        }
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    pub fn parse_expression(&mut self) -> Result<Expression> {
        Ok(self.parse_expression_under(None)?.0)
    }

    /// Precedence climbing: keep folding operators into `left` while they
    /// bind tighter than the operator that owns this operand.
    ///
    /// Returns the expression together with the height of its tree.
    fn parse_expression_under(
        &mut self,
        control: Option<BinaryOperator>,
    ) -> Result<(Expression, usize)> {
        if self.depth >= MAX_EXPRESSION_DEPTH {
            return Err(self.too_deep());
        }
        self.depth += 1;
        let result = self.climb(control);
        self.depth -= 1;
        result
    }

    fn climb(&mut self, control: Option<BinaryOperator>) -> Result<(Expression, usize)> {
        let (mut left, mut height) = self.parse_atom()?;
        while let Some(op) = self.peek_operator()? {
            if !op.binds_tighter_than(control) {
                break;
            }
            self.advance();
            let (right, right_height) = self.parse_expression_under(Some(op))?;
            height = self.check_height(height.max(right_height) + 1)?;
            left = Expression::binary(op, left, right);
        }
        Ok((left, height))
    }

    fn check_height(&self, height: usize) -> Result<usize> {
        if height > MAX_EXPRESSION_DEPTH {
            Err(self.too_deep())
        } else {
            Ok(height)
        }
    }

    fn too_deep(&self) -> CsvSqlError {
        CsvSqlError::syntax(TOO_DEEP, self.found())
    }

    /// The operator at the cursor, if any. A `*` token doubles as multiply.
    fn peek_operator(&self) -> Result<Option<BinaryOperator>> {
        match self.peek() {
            Some(t) if t.kind == TokenKind::Star => Ok(Some(BinaryOperator::Multiply)),
            Some(t) if t.kind == TokenKind::Operator => BinaryOperator::from_symbol(&t.text)
                .map(Some)
                .ok_or_else(|| CsvSqlError::UnknownOperator(t.text.clone())),
            _ => Ok(None),
        }
    }

    fn parse_atom(&mut self) -> Result<(Expression, usize)> {
        let Some(token) = self.peek().cloned() else {
            return Err(CsvSqlError::syntax("an expression", END_OF_INPUT));
        };

        match token.kind {
            TokenKind::ParOpen => {
                self.advance();
                let nested = self.parse_expression_under(None)?;
                self.expect_kind(TokenKind::ParClose, "a closing parenthesis")?;
                Ok(nested)
            }
            TokenKind::Keyword => {
                let expr = match token.text.as_str() {
                    "TRUE" => Expression::Bool(true),
                    "FALSE" => Expression::Bool(false),
                    "NULL" => Expression::Null,
                    "CASE" => {
                        self.advance();
                        return self.parse_case();
                    }
                    _ => return Err(CsvSqlError::syntax("an expression", token.text)),
                };
                self.advance();
                Ok((expr, 1))
            }
            TokenKind::Identifier => {
                let name = token.text_value().unwrap_or_default();
                self.advance();
                if self.check_kind(TokenKind::ParOpen) {
                    self.advance();
                    self.parse_call(name)
                } else {
                    Ok((Expression::identifier(name), 1))
                }
            }
            TokenKind::Number => {
                self.advance();
                let number = Expression::Number {
                    value: token.number_value().unwrap_or_default(),
                    text: token.text,
                };
                Ok((number, 1))
            }
            TokenKind::String => {
                self.advance();
                Ok((Expression::string(token.text_value().unwrap_or_default()), 1))
            }
            _ => Err(CsvSqlError::syntax("an expression", token.text)),
        }
    }

    /// Argument list of a function call; the opening parenthesis has been
    /// consumed.
    fn parse_call(&mut self, name: &str) -> Result<(Expression, usize)> {
        if name.eq_ignore_ascii_case("COUNT") && self.check_kind(TokenKind::Star) {
            self.advance();
            self.expect_kind(TokenKind::ParClose, "a closing parenthesis")?;
            return Ok((Expression::call(name, vec![Expression::Star]), 2));
        }
        let args = self.many(|p: &mut Self| p.parse_expression_under(None), true, 0)?;
        self.expect_kind(TokenKind::ParClose, "a closing parenthesis")?;
        let height = self.check_height(1 + args.iter().map(|(_, h)| *h).max().unwrap_or(0))?;
        let args = args.into_iter().map(|(arg, _)| arg).collect();
        Ok((Expression::call(name, args), height))
    }

    /// Body of a CASE expression; the CASE keyword has been consumed.
    fn parse_case(&mut self) -> Result<(Expression, usize)> {
        let mut inner = 0;
        let switch = if self.check_keyword("WHEN") {
            None
        } else {
            let (switch, height) = self.parse_expression_under(None)?;
            inner = height;
            Some(switch)
        };
        let mut cases = Vec::new();
        for (case, height) in self.many(Self::parse_when_then, false, 1)? {
            inner = inner.max(height);
            cases.push(case);
        }
        let else_expr = if self.check_keyword("ELSE") {
            self.advance();
            let (else_expr, height) = self.parse_expression_under(None)?;
            inner = inner.max(height);
            Some(Box::new(else_expr))
        } else {
            None
        };
        self.expect_keyword("END")?;
        let height = self.check_height(inner + 1)?;

        let case = match switch {
            Some(switch) => Expression::CaseSwitch {
                switch: Box::new(switch),
                cases,
                else_expr,
            },
            None => Expression::CaseIf { cases, else_expr },
        };
        Ok((case, height))
    }

    fn parse_when_then(&mut self) -> Result<(WhenThen, usize)> {
        self.expect_keyword("WHEN")?;
        let (when, when_height) = self.parse_expression_under(None)?;
        self.expect_keyword("THEN")?;
        let (then, then_height) = self.parse_expression_under(None)?;
        Ok((WhenThen { when, then }, when_height.max(then_height)))
    }

    /// Parse repeated items, optionally comma-separated. Once `min` items
    /// have been read, a syntax error in the next item ends the list and
    /// rewinds to just after the last complete item.
    fn many<T>(
        &mut self,
        mut parse_item: impl FnMut(&mut Self) -> Result<T>,
        comma_separated: bool,
        min: usize,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        loop {
            let satisfied = items.len() >= min;
            if satisfied && self.at_end() {
                break;
            }
            let checkpoint = self.pos;
            if comma_separated && !items.is_empty() {
                if !self.check_kind(TokenKind::Comma) {
                    if satisfied {
                        break;
                    }
                    return Err(CsvSqlError::syntax("a comma", self.found()));
                }
                self.advance();
            }
            match parse_item(self) {
                Ok(item) => items.push(item),
                Err(e) if satisfied && ends_list(&e) => {
                    self.pos = checkpoint;
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(items)
    }

    // Token helpers

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn check_kind(&self, kind: TokenKind) -> bool {
        self.peek().is_some_and(|t| t.kind == kind)
    }

    fn check_keyword(&self, word: &str) -> bool {
        self.peek().is_some_and(|t| t.is_keyword(word))
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    /// Text of the token at the cursor, for error reports.
    fn found(&self) -> String {
        self.peek()
            .map_or_else(|| END_OF_INPUT.to_owned(), |t| t.text.clone())
    }

    fn expect_keyword(&mut self, word: &str) -> Result<()> {
        if self.check_keyword(word) {
            self.advance();
            Ok(())
        } else {
            Err(CsvSqlError::syntax(format!("\"{}\"", word), self.found()))
        }
    }

    fn expect_kind(&mut self, kind: TokenKind, expected: &str) -> Result<Token> {
        match self.peek() {
            Some(t) if t.kind == kind => {
                let token = t.clone();
                self.advance();
                Ok(token)
            }
            _ => Err(CsvSqlError::syntax(expected, self.found())),
        }
    }
}

/// Syntax errors end a `many()` list once it is long enough; exceeding the
/// nesting limit never does.
fn ends_list(e: &CsvSqlError) -> bool {
    matches!(e, CsvSqlError::Syntax { expected, .. } if expected != TOO_DEEP)
}

/// Tokenize and parse a query string. Aggregates are not yet identified.
pub fn parse_query(text: &str) -> Result<Query> {
    let tokens = tokenize(text)?;
    let query = Parser::new(tokens).parse()?;
    debug!(from = %query.from, "parsed query");
    Ok(query)
}
