//! Console diff between two JSON documents.
//!
//! The expected document is printed pretty, with changes marked inline:
//! a changed value as `old => new`, a member only on the expected side
//! with a leading `-` and one only on the received side with `+`.

use serde_json::Value;
use std::collections::BTreeSet;

const INDENT: &str = "    ";

/// Diffs `expected` against `got`. Returns `None` when they are equal.
///
/// # Examples
///
/// ```
/// use rulecheck_runner::diff::json_diff;
/// use serde_json::json;
///
/// assert!(json_diff(&json!({"a": 1}), &json!({"a": 1})).is_none());
/// let diff = json_diff(&json!({"a": 1}), &json!({"a": 2})).unwrap();
/// assert_eq!(diff, "{\n    \"a\": 1 => 2\n}");
/// ```
pub fn json_diff(expected: &Value, got: &Value) -> Option<String> {
    if expected == got {
        return None;
    }
    let mut out = String::new();
    write_diff(&mut out, expected, got, 0);
    Some(out)
}

fn write_diff(out: &mut String, expected: &Value, got: &Value, depth: usize) {
    match (expected, got) {
        (Value::Object(exp), Value::Object(rec)) if !(exp.is_empty() && rec.is_empty()) => {
            let keys: BTreeSet<&String> = exp.keys().chain(rec.keys()).collect();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                out.push('\n');
                let member = match (exp.get(*key), rec.get(*key)) {
                    (Some(e), Some(g)) => {
                        push_indent(out, depth + 1, ' ');
                        out.push_str(&render(&Value::String((*key).clone())));
                        out.push_str(": ");
                        write_diff(out, e, g, depth + 1);
                        None
                    }
                    (Some(e), None) => Some(('-', e)),
                    (None, Some(g)) => Some(('+', g)),
                    (None, None) => None,
                };
                if let Some((mark, value)) = member {
                    push_indent(out, depth + 1, mark);
                    out.push_str(&render(&Value::String((*key).clone())));
                    out.push_str(": ");
                    out.push_str(&render(value));
                }
                if i + 1 < keys.len() {
                    out.push(',');
                }
            }
            out.push('\n');
            push_indent(out, depth, ' ');
            out.push('}');
        }
        (Value::Array(exp), Value::Array(rec)) if !(exp.is_empty() && rec.is_empty()) => {
            let len = exp.len().max(rec.len());
            out.push('[');
            for i in 0..len {
                out.push('\n');
                match (exp.get(i), rec.get(i)) {
                    (Some(e), Some(g)) => {
                        push_indent(out, depth + 1, ' ');
                        write_diff(out, e, g, depth + 1);
                    }
                    (Some(e), None) => {
                        push_indent(out, depth + 1, '-');
                        out.push_str(&render(e));
                    }
                    (None, Some(g)) => {
                        push_indent(out, depth + 1, '+');
                        out.push_str(&render(g));
                    }
                    (None, None) => {}
                }
                if i + 1 < len {
                    out.push(',');
                }
            }
            out.push('\n');
            push_indent(out, depth, ' ');
            out.push(']');
        }
        (e, g) if e == g => out.push_str(&render(e)),
        (e, g) => {
            out.push_str(&render(e));
            out.push_str(" => ");
            out.push_str(&render(g));
        }
    }
}

/// Indents to `depth`, replacing the first column with `mark`.
fn push_indent(out: &mut String, depth: usize, mark: char) {
    if depth == 0 {
        return;
    }
    out.push(mark);
    out.push_str(&INDENT[1..]);
    for _ in 1..depth {
        out.push_str(INDENT);
    }
}

fn render(value: &Value) -> String {
    value.to_string()
}
