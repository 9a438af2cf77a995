//! # Built-in Functions
//!
//! Pure helpers available to every script. None of them can observe the
//! host, the clock or any source of entropy.

use crate::domain::services::check_value_depth;
use crate::domain::value_objects::Value;
use crate::errors::ContractError;

/// Names of all built-in functions.
pub const BUILTINS: [&str; 8] = [
    "len",
    "str",
    "int",
    "keys",
    "contains",
    "push",
    "jsonEncode",
    "jsonDecode",
];

/// Returns true if `name` is a built-in function.
#[must_use]
pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// Calls a built-in by name. Returns `None` if no such built-in exists.
pub fn call_builtin(name: &str, args: Vec<Value>) -> Option<Result<Value, ContractError>> {
    let result = match name {
        "len" => unary(name, args).and_then(len),
        "str" => unary(name, args).map(|v| Value::Str(v.to_string())),
        "int" => unary(name, args).and_then(to_int),
        "keys" => unary(name, args).and_then(keys),
        "contains" => binary(name, args).and_then(|(haystack, needle)| contains(&haystack, &needle)),
        "push" => binary(name, args).and_then(|(list, item)| push(list, item)),
        "jsonEncode" => unary(name, args).and_then(json_encode),
        "jsonDecode" => unary(name, args).and_then(json_decode),
        _ => return None,
    };
    Some(result)
}

fn unary(name: &str, args: Vec<Value>) -> Result<Value, ContractError> {
    let [value]: [Value; 1] = args.try_into().map_err(|args: Vec<Value>| arity(name, 1, args.len()))?;
    Ok(value)
}

fn binary(name: &str, args: Vec<Value>) -> Result<(Value, Value), ContractError> {
    let [a, b]: [Value; 2] = args.try_into().map_err(|args: Vec<Value>| arity(name, 2, args.len()))?;
    Ok((a, b))
}

fn arity(name: &str, expected: usize, got: usize) -> ContractError {
    ContractError::script(format!("{name}() expects {expected} argument(s), got {got}"))
}

fn len(value: Value) -> Result<Value, ContractError> {
    let n = match &value {
        Value::Str(s) => s.chars().count(),
        Value::List(items) => items.len(),
        Value::Map(map) => map.len(),
        other => {
            return Err(ContractError::script(format!(
                "len() not supported for {}",
                other.type_name()
            )));
        }
    };
    Ok(Value::Int(i64::try_from(n).unwrap_or(i64::MAX)))
}

fn to_int(value: Value) -> Result<Value, ContractError> {
    match value {
        Value::Int(i) => Ok(Value::Int(i)),
        Value::Bool(b) => Ok(Value::Int(i64::from(b))),
        Value::Null => Ok(Value::Int(0)),
        Value::Str(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| ContractError::script(format!("int(): cannot parse {s:?}"))),
        other => Err(ContractError::script(format!(
            "int() not supported for {}",
            other.type_name()
        ))),
    }
}

fn keys(value: Value) -> Result<Value, ContractError> {
    match value {
        Value::Map(map) => Ok(Value::List(map.into_keys().map(Value::Str).collect())),
        other => Err(ContractError::script(format!(
            "keys() expects a map, got {}",
            other.type_name()
        ))),
    }
}

fn contains(haystack: &Value, needle: &Value) -> Result<Value, ContractError> {
    let found = match (haystack, needle) {
        (Value::List(items), _) => items.contains(needle),
        (Value::Map(map), Value::Str(key)) => map.contains_key(key),
        (Value::Str(s), Value::Str(part)) => s.contains(part.as_str()),
        (h, n) => {
            return Err(ContractError::script(format!(
                "contains() not supported for {} and {}",
                h.type_name(),
                n.type_name()
            )));
        }
    };
    Ok(Value::Bool(found))
}

fn push(list: Value, item: Value) -> Result<Value, ContractError> {
    match list {
        Value::List(mut items) => {
            items.push(item);
            Ok(Value::List(items))
        }
        other => Err(ContractError::script(format!(
            "push() expects a list, got {}",
            other.type_name()
        ))),
    }
}

fn json_encode(value: Value) -> Result<Value, ContractError> {
    check_value_depth(&value, "jsonEncode()")?;
    Ok(Value::Str(value.to_canonical_json()))
}

fn json_decode(value: Value) -> Result<Value, ContractError> {
    match value {
        Value::Str(text) => {
            let decoded = Value::from_json(&text)
                .map_err(|e| ContractError::script(format!("jsonDecode(): {e}")))?;
            check_value_depth(&decoded, "jsonDecode()")?;
            Ok(decoded)
        }
        other => Err(ContractError::script(format!(
            "jsonDecode() expects a string, got {}",
            other.type_name()
        ))),
    }
}
