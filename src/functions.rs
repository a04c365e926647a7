/// Built-in scalar functions.
use crate::types::Value;

const DEFAULT_TRIM_CHARS: &str = " \t\n\r";

/// Evaluate a built-in scalar function. Returns `None` if `name` is not a
/// scalar function.
pub fn eval_function(name: &str, args: &[Value]) -> Option<Value> {
    let value = match name.to_ascii_uppercase().as_str() {
        "UPPERCASE" => fn_uppercase(args),
        "LOWERCASE" => fn_lowercase(args),
        "LEN" => fn_len(args),
        "COALESCE" | "IFNULL" => fn_coalesce(args),
        "TRIM" => fn_trim(args),
        "LTRIM" => fn_ltrim(args),
        _ => return None,
    };
    Some(value)
}

fn first_arg(args: &[Value]) -> &Value {
    args.first().unwrap_or(&Value::Null)
}

fn fn_uppercase(args: &[Value]) -> Value {
    match first_arg(args) {
        Value::Null => Value::Null,
        v => Value::Text(v.to_text().to_uppercase()),
    }
}

fn fn_lowercase(args: &[Value]) -> Value {
    match first_arg(args) {
        Value::Null => Value::Null,
        v => Value::Text(v.to_text().to_lowercase()),
    }
}

fn fn_len(args: &[Value]) -> Value {
    let s = first_arg(args);
    if s.is_null() {
        return Value::Null;
    }
    Value::Number(s.to_text().chars().count() as f64)
}

fn fn_coalesce(args: &[Value]) -> Value {
    args.iter()
        .find(|v| !v.is_null())
        .cloned()
        .unwrap_or(Value::Null)
}

fn fn_trim(args: &[Value]) -> Value {
    let s = first_arg(args);
    if s.is_null() {
        return Value::Null;
    }
    let s = s.to_text();
    match args.get(1) {
        None => Value::Text(s.trim().to_string()),
        Some(chars) => {
            let chars = chars.to_text();
            Value::Text(s.trim_matches(|c| chars.contains(c)).to_string())
        }
    }
}

/// `LTRIM(s, chars = " \t\n\r", min = 0)`: strip leading `chars`, but never
/// leave fewer than `min` characters.
fn fn_ltrim(args: &[Value]) -> Value {
    let s = first_arg(args);
    if s.is_null() {
        return Value::Null;
    }
    let s = s.to_text();
    let chars = args
        .get(1)
        .map_or_else(|| DEFAULT_TRIM_CHARS.to_string(), Value::to_text);
    let min = args
        .get(2)
        .and_then(Value::as_number)
        .map_or(0, |n| n.max(0.0) as usize);

    let mut remaining = s.chars().count();
    let mut start = 0;
    for (offset, ch) in s.char_indices() {
        if remaining <= min || !chars.contains(ch) {
            start = offset;
            break;
        }
        remaining -= 1;
        start = offset + ch.len_utf8();
    }
    Value::Text(s[start..].to_string())
}
