//! `if` / `unless` guard evaluation.

use serde_json::Value;

/// Truthiness of an attribute value.
///
/// Strings accept `"true"`/`"false"` and a single `a == b` or `a != b`
/// comparison; any other non-empty string counts as true.
pub fn is_true(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => string_is_true(text),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn string_is_true(text: &str) -> bool {
    let text = text.trim();
    if let Some((left, right)) = text.split_once("!=") {
        return operand(left) != operand(right);
    }
    if let Some((left, right)) = text.split_once("==") {
        return operand(left) == operand(right);
    }
    !matches!(text, "" | "false" | "nil" | "null")
}

fn operand(raw: &str) -> &str {
    raw.trim().trim_matches(|c| c == '"' || c == '\'')
}

/// Whether a node guarded by `if_attr` / `unless_attr` should be skipped.
pub fn skip(if_attr: Option<&Value>, unless_attr: Option<&Value>) -> bool {
    if if_attr.is_some_and(|condition| !is_true(condition)) {
        return true;
    }
    unless_attr.is_some_and(is_true)
}
