//! String → Value parsing rules for statement parameters.
//!
//! User input is parsed into `Value` using auto-detect logic:
//! 1. `null` → Value::Null
//! 2. `true` / `false` → Value::Int(1) / Value::Int(0)
//! 3. `x'0a0b'` → Value::Bytes
//! 4. Integer pattern → Value::Int
//! 5. Float pattern → Value::Float
//! 6. `'quoted'` → Value::String without the quotes
//! 7. Everything else → Value::String

use cairn_executor::Value;

/// Auto-detect value type from a user-supplied string.
pub fn parse_value(s: &str) -> Value {
    if s.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    if s == "true" {
        return Value::from(true);
    }
    if s == "false" {
        return Value::from(false);
    }

    if let Some(hex) = s
        .strip_prefix("x'")
        .or_else(|| s.strip_prefix("X'"))
        .and_then(|rest| rest.strip_suffix('\''))
    {
        if let Some(bytes) = decode_hex(hex) {
            return Value::Bytes(bytes);
        }
    }

    if is_integer(s) {
        if let Ok(i) = s.parse::<i64>() {
            return Value::Int(i);
        }
    }

    if is_float(s) {
        if let Ok(f) = s.parse::<f64>() {
            return Value::Float(f);
        }
    }

    if s.len() >= 2 && s.starts_with('\'') && s.ends_with('\'') {
        return Value::String(s[1..s.len() - 1].to_string());
    }

    Value::String(s.to_string())
}

/// Parse every parameter of a statement.
pub fn parse_params<S: AsRef<str>>(raw: &[S]) -> Vec<Value> {
    raw.iter().map(|s| parse_value(s.as_ref())).collect()
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect()
}

fn is_integer(s: &str) -> bool {
    let s = s.strip_prefix('-').unwrap_or(s);
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_float(s: &str) -> bool {
    let s = s.strip_prefix('-').unwrap_or(s);
    if s.is_empty() {
        return false;
    }
    // Must contain a dot or exponent
    if !s.contains('.') && !s.contains('e') && !s.contains('E') {
        return false;
    }
    s.bytes().all(|b| {
        b.is_ascii_digit() || b == b'.' || b == b'e' || b == b'E' || b == b'+' || b == b'-'
    })
}
