//! Canonical encoding and content hashing of step inputs.
//!
//! Two step inputs hash identically iff their canonical encodings match:
//! object keys are emitted in sorted order, no insignificant whitespace is
//! written, and numbers with an integral value are written without a
//! fractional part (`10.0` and `10` encode the same).

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Largest integer an f64 represents exactly.
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

/// Encode `value` canonically.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

/// SHA-256 (lower-case hex) of the canonical encoding of `value`.
pub fn content_hash(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(value).as_bytes());
    format!("{:x}", hasher.finalize())
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => {
            if let Some(f) = n.as_f64()
                && !n.is_i64()
                && !n.is_u64()
                && f.fract() == 0.0
                && f.abs() < MAX_EXACT_INT
            {
                out.push_str(&(f as i64).to_string());
            } else {
                out.push_str(&n.to_string());
            }
        }
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, &map[key]);
            }
            out.push('}');
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    // serde_json's string escaping is already deterministic
    out.push_str(&Value::String(s.to_string()).to_string());
}
