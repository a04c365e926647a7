//! LIKE pattern compilation.
//!
//! `_` matches exactly one character and `%` matches any run of characters,
//! including none. Everything else is literal. Matching is anchored at both
//! ends and case-insensitive.

use std::collections::HashMap;

use regex::{Regex, RegexBuilder};

use crate::error::{CsvSqlError, Result};

/// Compile a LIKE pattern into an anchored, case-insensitive regex.
pub fn compile_like(pattern: &str) -> Result<Regex> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push('^');
    let mut buf = [0u8; 4];
    for ch in pattern.chars() {
        match ch {
            '_' => source.push('.'),
            '%' => source.push_str(".*"),
            _ => source.push_str(&regex::escape(ch.encode_utf8(&mut buf))),
        }
    }
    source.push('$');

    RegexBuilder::new(&source)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .map_err(|e| CsvSqlError::Semantic(format!("invalid LIKE pattern {:?}: {}", pattern, e)))
}

/// Compiled LIKE patterns keyed by pattern text, for the lifetime of one
/// query execution.
#[derive(Debug, Default)]
pub struct PatternCache {
    patterns: HashMap<String, Regex>,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test `text` against `pattern`, compiling the pattern on first use.
    pub fn is_match(&mut self, pattern: &str, text: &str) -> Result<bool> {
        if let Some(re) = self.patterns.get(pattern) {
            return Ok(re.is_match(text));
        }
        let re = compile_like(pattern)?;
        let matched = re.is_match(text);
        self.patterns.insert(pattern.to_owned(), re);
        Ok(matched)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
