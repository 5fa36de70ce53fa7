//! Modification dialog parsing.
//!
//! The operator can rewrite a gated call before it is forwarded. Two input
//! forms are accepted: a JSON object `{"name": .., "arguments": ..}`, or a
//! simple token form `<name> key=value key2=value2` where each value is
//! parsed as JSON (when it opens an object or array), then as a number,
//! then as a boolean, and finally kept as a string. The literal `cancel`
//! aborts the call.

use serde_json::{Map, Value};

use crate::error::{ProxyError, ProxyResult};

/// Parsed outcome of one modification-dialog line.
#[derive(Debug, Clone, PartialEq)]
pub enum Modification {
    /// Abort the call
    Cancel,
    /// Replace the call with this tool name and argument object
    Call {
        /// Replacement tool identifier (may carry a `server::` prefix)
        name: String,
        /// Replacement arguments
        arguments: Value,
    },
}

/// Parse one modification-dialog line.
///
/// # Errors
///
/// Returns a protocol error for an empty line, malformed JSON, or a token
/// without a `key=` prefix.
pub fn parse_modification(input: &str) -> ProxyResult<Modification> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ProxyError::protocol("empty modification"));
    }
    if input == "cancel" {
        return Ok(Modification::Cancel);
    }
    if input.starts_with('{') {
        let value: Value = serde_json::from_str(input)
            .map_err(|e| ProxyError::protocol(format!("invalid modification JSON: {e}")))?;
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| ProxyError::protocol("modification JSON needs a \"name\""))?
            .to_owned();
        let arguments = value.get("arguments").cloned().unwrap_or(Value::Object(Map::new()));
        return Ok(Modification::Call { name, arguments });
    }

    let mut tokens = input.split_whitespace();
    let name = tokens
        .next()
        .ok_or_else(|| ProxyError::protocol("empty modification"))?
        .to_owned();
    let mut arguments = Map::new();
    for token in tokens {
        let (key, raw) = token.split_once('=').ok_or_else(|| {
            ProxyError::protocol(format!("expected key=value, got '{token}'"))
        })?;
        arguments.insert(key.to_owned(), parse_scalar(raw));
    }
    Ok(Modification::Call {
        name,
        arguments: Value::Object(arguments),
    })
}

/// Parse a token value: JSON object/array, then number, then bool, then
/// string.
pub fn parse_scalar(raw: &str) -> Value {
    if raw.starts_with('{') || raw.starts_with('[') {
        if let Ok(v) = serde_json::from_str(raw) {
            return v;
        }
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(f) = raw.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    if let Ok(b) = raw.parse::<bool>() {
        return Value::Bool(b);
    }
    Value::String(raw.to_owned())
}
