use std::cmp::Ordering;
use std::fmt;

/// A single cell value flowing through the query pipeline.
///
/// Rows read from CSV only ever contain `Text`; the other variants are
/// produced by literals, functions, operators and aggregates.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    /// SQL-NULL test. Null and the empty string are both treated as NULL.
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// String coercion. NULL becomes the empty string.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Text(s) => s.clone(),
        }
    }

    /// Numeric coercion. NULL, `false` and blank text are 0; text that is
    /// not a number is NaN.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::Text(s) => parse_number(s),
        }
    }

    /// The numeric value, if this value can be coerced to a number.
    pub fn as_number(&self) -> Option<f64> {
        let n = self.to_number();
        if n.is_nan() {
            None
        } else {
            Some(n)
        }
    }

    /// Boolean coercion: NULL, `false`, 0, NaN and empty text are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Text(s) => !s.is_empty(),
        }
    }

    /// Equality after string coercion, so `1 = "1"` holds.
    pub fn loose_eq(&self, other: &Value) -> bool {
        self.to_text() == other.to_text()
    }

    /// Ordering used by ORDER BY. Values fall into three tiers: NULL, then
    /// anything that coerces to a number (compared numerically), then the
    /// rest (compared as strings).
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        self.sort_tier()
            .cmp(&other.sort_tier())
            .then_with(|| match (self.sort_tier(), self.as_number(), other.as_number()) {
                (SortTier::Null, _, _) => Ordering::Equal,
                (SortTier::Number, Some(a), Some(b)) => a.total_cmp(&b),
                _ => self.to_text().cmp(&other.to_text()),
            })
    }

    fn sort_tier(&self) -> SortTier {
        if self.is_null() {
            SortTier::Null
        } else if self.as_number().is_some() {
            SortTier::Number
        } else {
            SortTier::Text
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum SortTier {
    Null,
    Number,
    Text,
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, ""),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Shortest round-trip rendering: `3`, `2.5`, `NaN`, `Infinity`.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else if n == 0.0 {
        // also folds -0
        "0".to_string()
    } else if n.abs() >= 1e21 || n.abs() < 1e-6 {
        // exponent form, with an explicit sign on positive exponents: `1e+21`
        let s = format!("{:e}", n);
        match s.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
            _ => s,
        }
    } else {
        format!("{}", n)
    }
}

fn parse_number(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    match t {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if let Some(n) = parse_prefixed_integer(t) {
        return n;
    }
    // f64::from_str also accepts "inf" and "nan", which are not numbers here.
    if t
        .bytes()
        .any(|b| b.is_ascii_alphabetic() && b != b'e' && b != b'E')
    {
        return f64::NAN;
    }
    t.parse::<f64>().unwrap_or(f64::NAN)
}

/// Unsigned `0x` / `0b` / `0o` integers. `None` if `t` has no such prefix;
/// NaN if the digits are invalid for the radix.
fn parse_prefixed_integer(t: &str) -> Option<f64> {
    let radix = match t.get(..2)? {
        "0x" | "0X" => 16,
        "0b" | "0B" => 2,
        "0o" | "0O" => 8,
        _ => return None,
    };
    let digits = &t[2..];
    if digits.is_empty() {
        return Some(f64::NAN);
    }
    let value = digits.chars().try_fold(0.0f64, |acc, c| {
        c.to_digit(radix).map(|d| acc * f64::from(radix) + f64::from(d))
    });
    Some(value.unwrap_or(f64::NAN))
}
