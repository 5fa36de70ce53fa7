//! Drunk-mode positional argument rebinding.
//!
//! When the supplied argument keys do not match the tool's declared
//! parameter names, the arguments are re-bound positionally: numeric keys
//! (`"0"`, `"1"`, ...) first in integer order, then the remaining keys in
//! lexicographic order, onto the declared parameters in declaration order.
//! A single supplied argument always binds to the first parameter.

use maimcp_protocol::ToolParam;
use serde_json::{Map, Value};

/// Re-bind `arguments` onto `params` when their keys do not line up.
/// Returns the arguments untouched when they already match the declaration
/// (or when there is nothing to bind onto).
pub fn reshape_arguments(arguments: &Value, params: &[ToolParam]) -> Value {
    let Value::Object(supplied) = arguments else {
        return arguments.clone();
    };
    if supplied.is_empty() || params.is_empty() {
        return arguments.clone();
    }
    if supplied
        .keys()
        .all(|k| params.iter().any(|p| &p.name == k))
    {
        return arguments.clone();
    }

    let mut rebound = Map::new();
    if supplied.len() == 1 {
        let (_, value) = supplied.iter().next().expect("len checked above");
        rebound.insert(params[0].name.clone(), value.clone());
        return Value::Object(rebound);
    }

    let mut numeric: Vec<(u64, &String)> = Vec::new();
    let mut named: Vec<&String> = Vec::new();
    for key in supplied.keys() {
        match key.parse::<u64>() {
            Ok(n) => numeric.push((n, key)),
            Err(_) => named.push(key),
        }
    }
    numeric.sort_by_key(|(n, _)| *n);
    named.sort();

    let ordered = numeric.into_iter().map(|(_, k)| k).chain(named);
    for (key, param) in ordered.zip(params.iter()) {
        rebound.insert(param.name.clone(), supplied[key].clone());
    }
    Value::Object(rebound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn params(names: &[&str]) -> Vec<ToolParam> {
        names
            .iter()
            .map(|n| ToolParam {
                name: (*n).to_owned(),
                description: String::new(),
                type_tag: "string".to_owned(),
                required: false,
            })
            .collect()
    }

    #[test]
    fn matching_keys_are_untouched() {
        let args = json!({"name": "world", "greeting": "hi"});
        let out = reshape_arguments(&args, &params(&["name", "greeting"]));
        assert_eq!(out, args);
    }

    #[test]
    fn numeric_keys_bind_in_integer_order() {
        let args = json!({"1": "hi", "0": "world"});
        let out = reshape_arguments(&args, &params(&["name", "greeting"]));
        assert_eq!(out, json!({"name": "world", "greeting": "hi"}));
    }

    #[test]
    fn numeric_order_is_integer_not_lexicographic() {
        let args = json!({"10": "j", "2": "c", "0": "a"});
        let out = reshape_arguments(&args, &params(&["first", "second", "third"]));
        assert_eq!(out, json!({"first": "a", "second": "c", "third": "j"}));
    }

    #[test]
    fn leftover_named_keys_follow_lexicographically() {
        let args = json!({"0": "a", "zz": "late", "mm": "mid"});
        let out = reshape_arguments(&args, &params(&["x", "y", "z"]));
        assert_eq!(out, json!({"x": "a", "y": "mid", "z": "late"}));
    }

    #[test]
    fn single_argument_binds_to_first_parameter() {
        let args = json!({"whatever": "value"});
        let out = reshape_arguments(&args, &params(&["path", "mode"]));
        assert_eq!(out, json!({"path": "value"}));
    }

    #[test]
    fn extra_arguments_beyond_declared_are_dropped() {
        let args = json!({"0": "a", "1": "b", "2": "c"});
        let out = reshape_arguments(&args, &params(&["only"]));
        assert_eq!(out, json!({"only": "a"}));
    }

    #[test]
    fn no_declared_params_means_no_reshaping() {
        let args = json!({"0": "a"});
        assert_eq!(reshape_arguments(&args, &[]), args);
    }
}
