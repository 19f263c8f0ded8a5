//! Canonical JSON rendering.
//!
//! Hashes and fingerprints commit to a single byte representation per
//! logical value: object keys sorted lexicographically at every depth,
//! no insignificant whitespace, integers rendered without a decimal
//! point, and floats rendered with a decimal point (`1.0`, not `1`).
//! The rendering is idempotent: parsing the output and rendering it
//! again yields the same bytes.

use std::collections::BTreeMap;

use serde_json::Value;

/// Renders a JSON value in canonical form.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => write_number(out, n),
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
            // BTreeMap gives the lexicographic key order the hash relies on.
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            out.push('{');
            for (i, (key, item)) in sorted.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, item);
            }
            out.push('}');
        }
    }
}

fn write_number(out: &mut String, n: &serde_json::Number) {
    if let Some(i) = n.as_i64() {
        out.push_str(&i.to_string());
    } else if let Some(u) = n.as_u64() {
        out.push_str(&u.to_string());
    } else if let Some(f) = n.as_f64() {
        // f64::Display produces the shortest round-trippable form, but
        // drops the decimal point for integral values. Keep it so an
        // integral float never collides with the integer rendering.
        if f.fract() == 0.0 && f.is_finite() {
            out.push_str(&format!("{f:.1}"));
        } else {
            out.push_str(&f.to_string());
        }
    } else {
        out.push_str("null");
    }
}

fn write_string(out: &mut String, s: &str) {
    // serde_json's escaping is deterministic; reuse it for the quoted form.
    out.push_str(&serde_json::to_string(s).unwrap_or_else(|_| String::from("\"\"")));
}
