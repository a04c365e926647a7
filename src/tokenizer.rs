// Hand-written query tokenizer/lexer.

use crate::error::{CsvSqlError, Result};

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

/// The syntactic class of a [`Token`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Keyword,
    Identifier,
    Operator,
    Number,
    String,
    Comma,
    Semicolon,
    ParOpen,
    ParClose,
    Star,
}

/// The decoded payload of identifier, number and string tokens.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenValue {
    Text(String),
    Number(f64),
}

/// A single token produced by the lexer.
///
/// `text` is the token as written in the query, except that keywords and
/// word operators are canonicalised to uppercase. `value` holds the decoded
/// identifier name, number or unescaped string.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub value: Option<TokenValue>,
}

impl Token {
    pub fn keyword(word: &str) -> Self {
        Token::bare(TokenKind::Keyword, word.to_ascii_uppercase())
    }

    pub fn operator(op: &str) -> Self {
        Token::bare(TokenKind::Operator, op.to_ascii_uppercase())
    }

    pub fn identifier(name: &str) -> Self {
        Token {
            kind: TokenKind::Identifier,
            text: name.to_owned(),
            value: Some(TokenValue::Text(name.to_owned())),
        }
    }

    pub fn number(text: &str, n: f64) -> Self {
        Token {
            kind: TokenKind::Number,
            text: text.to_owned(),
            value: Some(TokenValue::Number(n)),
        }
    }

    fn bare(kind: TokenKind, text: String) -> Self {
        Token {
            kind,
            text,
            value: None,
        }
    }

    pub fn is_keyword(&self, word: &str) -> bool {
        self.kind == TokenKind::Keyword && self.text == word
    }

    /// The decoded text payload of identifier and string tokens.
    pub fn text_value(&self) -> Option<&str> {
        match &self.value {
            Some(TokenValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn number_value(&self) -> Option<f64> {
        match self.value {
            Some(TokenValue::Number(n)) => Some(n),
            _ => None,
        }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}

const KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "GROUP", "BY", "HAVING", "AS", "ORDER", "ASC", "DESC", "LIMIT",
    "OFFSET", "CASE", "WHEN", "THEN", "ELSE", "END", "NOT", "NULL", "TRUE", "FALSE",
];

const WORD_OPERATORS: &[&str] = &["AND", "OR", "IS", "LIKE"];

/// Reclassify a bare word as a keyword, a word operator, or an identifier.
fn classify_word(word: &str) -> Token {
    let upper = word.to_ascii_uppercase();
    if KEYWORDS.contains(&upper.as_str()) {
        Token::bare(TokenKind::Keyword, upper)
    } else if WORD_OPERATORS.contains(&upper.as_str()) {
        Token::bare(TokenKind::Operator, upper)
    } else {
        Token::identifier(word)
    }
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

/// State of the quoted-literal scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteState {
    Normal,
    Escaped,
}

/// A hand-written lexer that produces a stream of [`Token`]s.
///
/// Create one via [`Tokenizer::new`] and repeatedly call
/// [`Tokenizer::next_token`] until it returns `None`.
pub struct Tokenizer<'a> {
    /// The full input source (UTF-8).
    input: &'a str,
    /// Byte-offset cursor into `input`. Always points at the start of the next
    /// unconsumed character (or `input.len()` when exhausted).
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Tokenizer { input, pos: 0 }
    }

    // -- helpers ----------------------------------------------------------

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.as_bytes().get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn error<T>(&self, msg: impl Into<String>) -> Result<T> {
        Err(CsvSqlError::Tokenize(msg.into()))
    }

    fn skip_whitespace(&mut self) {
        let rest = self.remaining();
        self.pos += rest.len() - rest.trim_start().len();
    }

    /// Emit the slice from `start` to the cursor as a token of `kind`.
    fn slice_token(&self, kind: TokenKind, start: usize) -> Token {
        Token::bare(kind, self.input[start..self.pos].to_owned())
    }

    // -- words ------------------------------------------------------------

    /// Read `[A-Za-z_][A-Za-z0-9_]*`. The first byte has already been
    /// validated.
    fn read_word(&mut self) -> Token {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'_' {
                self.advance();
            } else {
                break;
            }
        }
        classify_word(&self.input[start..self.pos])
    }

    // -- number literals --------------------------------------------------

    /// Read `\d+(\.\d+)?`. A trailing dot without digits is left unconsumed.
    fn read_number(&mut self) -> Result<Token> {
        let start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.advance();
        }
        if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(b'0'..=b'9')) {
            self.advance(); // consume '.'
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.advance();
            }
        }

        let text = &self.input[start..self.pos];
        let value: f64 = text
            .parse()
            .map_err(|e: std::num::ParseFloatError| CsvSqlError::Tokenize(e.to_string()))?;
        Ok(Token::number(text, value))
    }

    // -- operators --------------------------------------------------------

    /// Read one of `= <= >= != <> < > + - / % ^`, or `None` if the cursor is
    /// not on an operator.
    fn read_operator(&mut self) -> Option<Token> {
        let start = self.pos;
        let len = match (self.peek()?, self.peek_at(1)) {
            (b'<', Some(b'=')) | (b'<', Some(b'>')) | (b'>', Some(b'=')) | (b'!', Some(b'=')) => 2,
            (b'=' | b'<' | b'>' | b'+' | b'-' | b'/' | b'%' | b'^', _) => 1,
            _ => return None,
        };
        self.pos += len;
        Some(self.slice_token(TokenKind::Operator, start))
    }

    // -- quoted literals --------------------------------------------------

    /// Read a literal delimited by `delimiter` (`"`, `'` or `` ` ``).
    ///
    /// A backslash escapes the following character, whatever it is.
    /// Backtick-quoted text is an identifier; the other quotes make strings.
    fn read_quoted(&mut self, delimiter: char) -> Result<Token> {
        let start = self.pos;
        self.pos += delimiter.len_utf8();

        let mut value = String::new();
        let mut state = QuoteState::Normal;
        let mut chars = self.remaining().char_indices();
        let body_start = self.pos;

        loop {
            let Some((offset, ch)) = chars.next() else {
                return self.error("input ended in the middle of a string literal");
            };
            match state {
                QuoteState::Normal if ch == delimiter => {
                    self.pos = body_start + offset + ch.len_utf8();
                    break;
                }
                QuoteState::Normal if ch == '\\' => state = QuoteState::Escaped,
                QuoteState::Normal => value.push(ch),
                QuoteState::Escaped => {
                    value.push(ch);
                    state = QuoteState::Normal;
                }
            }
        }

        let kind = if delimiter == '`' {
            TokenKind::Identifier
        } else {
            TokenKind::String
        };
        Ok(Token {
            kind,
            text: self.input[start..self.pos].to_owned(),
            value: Some(TokenValue::Text(value)),
        })
    }

    // -- main entry point -------------------------------------------------

    /// Return the next token, or `None` once the input is exhausted.
    pub fn next_token(&mut self) -> Result<Option<Token>> {
        self.skip_whitespace();

        let b = match self.peek() {
            None => return Ok(None),
            Some(b) => b,
        };

        let start = self.pos;
        let token = match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.read_word(),
            b'(' => {
                self.advance();
                self.slice_token(TokenKind::ParOpen, start)
            }
            b')' => {
                self.advance();
                self.slice_token(TokenKind::ParClose, start)
            }
            b'*' => {
                self.advance();
                self.slice_token(TokenKind::Star, start)
            }
            b'0'..=b'9' => self.read_number()?,
            b'"' | b'\'' | b'`' => self.read_quoted(b as char)?,
            b',' => {
                self.advance();
                self.slice_token(TokenKind::Comma, start)
            }
            b';' => {
                self.advance();
                self.slice_token(TokenKind::Semicolon, start)
            }
            _ => match self.read_operator() {
                Some(token) => token,
                None => {
                    return self.error(format!("unable to tokenize: {:?}", self.remaining()));
                }
            },
        };
        Ok(Some(token))
    }
}

// ---------------------------------------------------------------------------
// Convenience function
// ---------------------------------------------------------------------------

/// Tokenize the full input into a vector of tokens.
pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    if input.trim().is_empty() {
        return Err(CsvSqlError::Tokenize("no input to tokenize".into()));
    }
    let mut tokenizer = Tokenizer::new(input);
    let mut tokens = Vec::new();
    while let Some(tok) = tokenizer.next_token()? {
        tokens.push(tok);
    }
    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: tokenize input, panicking on failure.
    fn tok(input: &str) -> Vec<Token> {
        tokenize(input).expect("tokenize failed")
    }

    /// Helper: tokenize input and expect exactly one token.
    fn tok1(input: &str) -> Token {
        let tokens = tok(input);
        assert_eq!(tokens.len(), 1, "expected 1 token, got {:?}", tokens);
        tokens.into_iter().next().unwrap()
    }

    fn string_token(text: &str, value: &str) -> Token {
        Token {
            kind: TokenKind::String,
            text: text.into(),
            value: Some(TokenValue::Text(value.into())),
        }
    }

    // ----------------------------------------------------------------
    // Keywords and identifiers
    // ----------------------------------------------------------------

    #[test]
    fn keywords_case_insensitive() {
        let tokens = tok("SELECT from    where group   by aS LIMit having");
        assert_eq!(
            tokens,
            vec![
                Token::keyword("SELECT"),
                Token::keyword("FROM"),
                Token::keyword("WHERE"),
                Token::keyword("GROUP"),
                Token::keyword("BY"),
                Token::keyword("AS"),
                Token::keyword("LIMIT"),
                Token::keyword("HAVING"),
            ]
        );
    }

    #[test]
    fn word_operators() {
        let tokens = tok("and Or iS like");
        assert_eq!(
            tokens,
            vec![
                Token::operator("AND"),
                Token::operator("OR"),
                Token::operator("IS"),
                Token::operator("LIKE"),
            ]
        );
    }

    #[test]
    fn identifiers() {
        let tokens = tok("SELECTED hello Dog a _underscored\nmulti_word_thing");
        assert_eq!(
            tokens,
            vec![
                Token::identifier("SELECTED"),
                Token::identifier("hello"),
                Token::identifier("Dog"),
                Token::identifier("a"),
                Token::identifier("_underscored"),
                Token::identifier("multi_word_thing"),
            ]
        );
    }

    #[test]
    fn backtick_identifiers() {
        let tokens = tok(r"`This is a literal identifier`` 1 2 \` 3 `");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[0].text_value(), Some("This is a literal identifier"));
        assert_eq!(tokens[1].text_value(), Some(" 1 2 ` 3 "));
        assert_eq!(tokens[1].text, r"` 1 2 \` 3 `");
    }

    // ----------------------------------------------------------------
    // Literals
    // ----------------------------------------------------------------

    #[test]
    fn numbers() {
        let tokens = tok("  3 56.3 3.141592 9832 293829047240 ");
        let values: Vec<f64> = tokens.iter().filter_map(Token::number_value).collect();
        assert_eq!(values, vec![3.0, 56.3, 3.141592, 9832.0, 293829047240.0]);
        assert!(tokens.iter().all(|t| t.kind == TokenKind::Number));
    }

    #[test]
    fn number_without_fraction_digits() {
        // "42." leaves the dot behind, and a lone dot cannot be tokenized.
        assert!(tokenize("42.").is_err());
        assert_eq!(tok1("42").number_value(), Some(42.0));
    }

    #[test]
    fn basic_strings() {
        assert_eq!(tok1("\"hello there\""), string_token("\"hello there\"", "hello there"));
        assert_eq!(tok1("'single'"), string_token("'single'", "single"));
    }

    #[test]
    fn escaped_strings() {
        let tokens = tok(r#"'how\'s "it" going?'  "great!\\" "#);
        assert_eq!(
            tokens,
            vec![
                string_token(r#"'how\'s "it" going?'"#, r#"how's "it" going?"#),
                string_token(r#""great!\\""#, r"great!\"),
            ]
        );
    }

    #[test]
    fn non_ascii_inside_strings() {
        assert_eq!(tok1("'héllo wörld'").text_value(), Some("héllo wörld"));
    }

    #[test]
    fn unterminated_string() {
        assert!(matches!(
            tokenize("SELECT \"abc"),
            Err(CsvSqlError::Tokenize(_))
        ));
        assert!(tokenize(r"'ends on escape\'").is_err());
    }

    // ----------------------------------------------------------------
    // Punctuation and operators
    // ----------------------------------------------------------------

    #[test]
    fn tokens_around_strings() {
        let tokens = tok(r#"="foo",'bar'"#);
        assert_eq!(
            tokens,
            vec![
                Token::operator("="),
                string_token("\"foo\"", "foo"),
                Token::bare(TokenKind::Comma, ",".into()),
                string_token("'bar'", "bar"),
            ]
        );
    }

    #[test]
    fn parentheses() {
        let kinds: Vec<TokenKind> = tok("() (((     ))").iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::ParOpen,
                TokenKind::ParClose,
                TokenKind::ParOpen,
                TokenKind::ParOpen,
                TokenKind::ParOpen,
                TokenKind::ParClose,
                TokenKind::ParClose,
            ]
        );
    }

    #[test]
    fn commas_and_semicolons() {
        let kinds: Vec<TokenKind> = tok(", so,,; commas;").iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Comma,
                TokenKind::Identifier,
                TokenKind::Comma,
                TokenKind::Comma,
                TokenKind::Semicolon,
                TokenKind::Identifier,
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn comparison_operators() {
        let tokens = tok("== <= >=!=<> < >");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["=", "=", "<=", ">=", "!=", "<>", "<", ">"]);
        assert!(tokens.iter().all(|t| t.kind == TokenKind::Operator));
    }

    #[test]
    fn arithmetic_operators_and_star() {
        let tokens = tok("1+2-3/4%5^6*7");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["1", "+", "2", "-", "3", "/", "4", "%", "5", "^", "6", "*", "7"]
        );
        assert_eq!(tokens[11].kind, TokenKind::Star);
    }

    // ----------------------------------------------------------------
    // Failures and round trips
    // ----------------------------------------------------------------

    #[test]
    fn empty_input() {
        assert!(matches!(tokenize(""), Err(CsvSqlError::Tokenize(_))));
        assert!(matches!(tokenize("   \n"), Err(CsvSqlError::Tokenize(_))));
    }

    #[test]
    fn invalid_characters() {
        assert!(tokenize("#").is_err());
        assert!(tokenize("a ! b").is_err());
        assert!(tokenize("SELECT a.b").is_err());
    }

    #[test]
    fn texts_reassemble_the_input() {
        let input = r#"SELECT name, `odd \` col` FROM "t.csv" WHERE age >= 21 AND x LIKE 'J%';"#;
        let tokens = tok(input);
        let mut rebuilt = String::new();
        let mut cursor = 0;
        for t in &tokens {
            // Re-insert the whitespace that separated tokens in the input.
            let at = input[cursor..].find(t.text.as_str()).unwrap() + cursor;
            rebuilt.push_str(&input[cursor..at]);
            rebuilt.push_str(&t.text);
            cursor = at + t.text.len();
        }
        assert_eq!(rebuilt, input);
        assert_eq!(tok(&rebuilt), tokens);
    }

    #[test]
    fn full_query() {
        let tokens = tok("SELECT gender, COUNT(*) FROM \"people.csv\" GROUP BY gender;");
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Keyword,
                TokenKind::Identifier,
                TokenKind::Comma,
                TokenKind::Identifier,
                TokenKind::ParOpen,
                TokenKind::Star,
                TokenKind::ParClose,
                TokenKind::Keyword,
                TokenKind::String,
                TokenKind::Keyword,
                TokenKind::Keyword,
                TokenKind::Identifier,
                TokenKind::Semicolon,
            ]
        );
        assert_eq!(tokens[8].text_value(), Some("people.csv"));
    }
}
