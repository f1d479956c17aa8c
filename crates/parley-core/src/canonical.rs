//! Canonical JSON for signatures.
//!
//! Signed payloads must be byte-for-byte reproducible by every client, so the
//! encoding is fixed here rather than left to a serializer:
//! - object keys sorted by raw UTF-8 bytes
//! - no insignificant whitespace
//! - strings escape only `"`, `\` and U+0000..=U+001F; everything else,
//!   including non-ASCII, is emitted as literal UTF-8
//! - integers only (signed payloads never carry floats)

use serde_json::Value;

use crate::error::{Error, Result};

/// Canonicalize a JSON value.
pub fn canonicalize(value: &Value) -> Result<String> {
    let mut out = String::new();
    write_value(&mut out, value)?;
    Ok(out)
}

fn write_value(out: &mut String, value: &Value) -> Result<()> {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by(|(a, _), (b, _)| a.as_bytes().cmp(b.as_bytes()));

            out.push('{');
            for (idx, (k, v)) in pairs.into_iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_string(out, k);
                out.push(':');
                write_value(out, v)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (idx, v) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_value(out, v)?;
            }
            out.push(']');
        }
        Value::String(s) => write_string(out, s),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                out.push_str(&i.to_string());
            } else if let Some(u) = n.as_u64() {
                out.push_str(&u.to_string());
            } else {
                return Err(Error::NonCanonicalNumber(n.to_string()));
            }
        }
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Null => out.push_str("null"),
    }
    Ok(())
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0C}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorted_keys_no_whitespace() {
        let value = serde_json::json!({"to": "c/d", "body": "hi", "from": "a/b"});
        assert_eq!(
            canonicalize(&value).unwrap(),
            r#"{"body":"hi","from":"a/b","to":"c/d"}"#
        );
    }

    #[test]
    fn underscore_sorts_after_lowercase_prefix() {
        // "from" < "from_did" < "from_stable_id" byte-wise.
        let value = serde_json::json!({"from_stable_id": "s", "from_did": "d", "from": "f"});
        assert_eq!(
            canonicalize(&value).unwrap(),
            r#"{"from":"f","from_did":"d","from_stable_id":"s"}"#
        );
    }

    #[test]
    fn minimal_escaping() {
        let value = serde_json::json!({
            "b": "\u{0008}",
            "ctl": "\u{001f}",
            "quote": "\"",
            "backslash": "\\",
            "nl": "line\nbreak",
        });
        assert_eq!(
            canonicalize(&value).unwrap(),
            r#"{"b":"\b","backslash":"\\","ctl":"\u001f","nl":"line\nbreak","quote":"\""}"#
        );
    }

    #[test]
    fn non_ascii_is_literal() {
        let value = serde_json::json!({"body": "héllo – 你好 \u{7f} \u{2028}"});
        assert_eq!(
            canonicalize(&value).unwrap(),
            "{\"body\":\"héllo – 你好 \u{7f} \u{2028}\"}"
        );
    }

    #[test]
    fn slash_is_not_escaped() {
        let value = serde_json::json!({"from": "acme/alice", "html": "<b>&</b>"});
        assert_eq!(
            canonicalize(&value).unwrap(),
            r#"{"from":"acme/alice","html":"<b>&</b>"}"#
        );
    }

    #[test]
    fn integers_and_literals() {
        let value = serde_json::json!({"n": -3, "u": 18446744073709551615u64, "t": true, "z": null, "a": [1, "x"]});
        assert_eq!(
            canonicalize(&value).unwrap(),
            r#"{"a":[1,"x"],"n":-3,"t":true,"u":18446744073709551615,"z":null}"#
        );
    }

    #[test]
    fn floats_rejected() {
        let value = serde_json::json!({"f": 1.5});
        assert!(matches!(
            canonicalize(&value),
            Err(Error::NonCanonicalNumber(_))
        ));
    }
}
