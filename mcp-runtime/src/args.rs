//! Typed accessors over `tools/call` arguments.

use reqwest::Method;
use serde_json::{Map, Value};

use crate::error::ToolError;
use crate::util::is_api_name;

pub fn required_string(args: &Map<String, Value>, key: &str) -> Result<String, ToolError> {
    let value = args
        .get(key)
        .ok_or_else(|| ToolError::validation(key, format!("Missing required field '{key}'")))?;
    match value {
        Value::String(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        Value::String(_) => Err(ToolError::validation(key, format!("'{key}' must not be empty"))),
        _ => Err(ToolError::validation(key, format!("'{key}' must be a string"))),
    }
}

/// A required string that must also be a Salesforce API name, since it ends
/// up in a URL path or a SOQL statement.
pub fn required_api_name(args: &Map<String, Value>, key: &str) -> Result<String, ToolError> {
    let name = required_string(args, key)?;
    if !is_api_name(&name) {
        return Err(ToolError::validation(
            key,
            format!("'{key}' must be a Salesforce API name (letters, digits and underscores)"),
        )
        .with_docs_hint("Use the API name, e.g. 'Account' or 'Invoice__c', not the label."));
    }
    Ok(name)
}

pub fn arg_string(args: &Map<String, Value>, key: &str, default: &str) -> Result<String, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default.to_string()),
        Some(Value::String(v)) if v.trim().is_empty() => Ok(default.to_string()),
        Some(Value::String(v)) => Ok(v.clone()),
        Some(_) => Err(ToolError::validation(key, format!("'{key}' must be a string"))),
    }
}

pub fn arg_optional_string(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Option<String>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(v)) if v.trim().is_empty() => Ok(None),
        Some(Value::String(v)) => Ok(Some(v.trim().to_string())),
        Some(_) => Err(ToolError::validation(key, format!("'{key}' must be a string"))),
    }
}

pub fn arg_bool(args: &Map<String, Value>, key: &str, default: bool) -> Result<bool, ToolError> {
    Ok(arg_optional_bool(args, key)?.unwrap_or(default))
}

pub fn arg_optional_bool(args: &Map<String, Value>, key: &str) -> Result<Option<bool>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(v)) => Ok(Some(*v)),
        Some(_) => Err(ToolError::validation(key, format!("'{key}' must be a boolean"))),
    }
}

pub fn arg_optional_u64(args: &Map<String, Value>, key: &str) -> Result<Option<u64>, ToolError> {
    let invalid = || ToolError::validation(key, format!("'{key}' must be an unsigned integer"));
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            if let Some(v) = n.as_u64() {
                return Ok(Some(v));
            }
            // Clients often send 10.0 for an integer field.
            match n.as_f64() {
                Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => {
                    Ok(Some(f as u64))
                }
                _ => Err(invalid()),
            }
        }
        Some(_) => Err(invalid()),
    }
}

pub fn required_object<'a>(
    args: &'a Map<String, Value>,
    key: &str,
) -> Result<&'a Map<String, Value>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Err(ToolError::validation(
            key,
            format!("Missing required field '{key}'"),
        )),
        Some(Value::Object(map)) if map.is_empty() => {
            Err(ToolError::validation(key, format!("'{key}' must not be empty")))
        }
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(ToolError::validation(key, format!("'{key}' must be an object"))),
    }
}

pub fn arg_optional_object<'a>(
    args: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Value>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value @ Value::Object(_)) => Ok(Some(value)),
        Some(_) => Err(ToolError::validation(key, format!("'{key}' must be an object"))),
    }
}

pub fn required_array<'a>(
    args: &'a Map<String, Value>,
    key: &str,
) -> Result<&'a [Value], ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Err(ToolError::validation(
            key,
            format!("Missing required field '{key}'"),
        )),
        Some(Value::Array(items)) if items.is_empty() => {
            Err(ToolError::validation(key, format!("'{key}' must not be empty")))
        }
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(ToolError::validation(key, format!("'{key}' must be an array"))),
    }
}

/// HTTP verb from the `method` argument; only the verbs the pass-through
/// tools advertise are accepted.
pub fn parse_http_method(args: &Map<String, Value>) -> Result<Method, ToolError> {
    let raw = arg_string(args, "method", "GET")?;
    match raw.trim().to_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PATCH" => Ok(Method::PATCH),
        "DELETE" => Ok(Method::DELETE),
        _ => Err(ToolError::validation(
            "method",
            format!("Unsupported HTTP method '{raw}'"),
        )
        .with_docs_hint("Use one of GET, POST, PATCH, DELETE.")),
    }
}

/// Query parameters from an object map or a `[{key, value}]` array. Null
/// values are skipped.
pub fn parse_query_pairs(
    value: Option<&Value>,
    field: &str,
) -> Result<Vec<(String, String)>, ToolError> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };

    match value {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => {
            let mut out = Vec::with_capacity(map.len());
            for (k, v) in map {
                if v.is_null() {
                    continue;
                }
                out.push((k.clone(), scalar_to_string(v, field)?));
            }
            Ok(out)
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                let key = item
                    .get("key")
                    .and_then(Value::as_str)
                    .filter(|s| !s.trim().is_empty())
                    .ok_or_else(|| {
                        ToolError::validation(
                            field,
                            format!("{field}[{index}].key must be a non-empty string"),
                        )
                    })?;
                let value = item.get("value").ok_or_else(|| {
                    ToolError::validation(field, format!("{field}[{index}].value is required"))
                })?;
                out.push((key.to_string(), scalar_to_string(value, field)?));
            }
            Ok(out)
        }
        _ => Err(ToolError::validation(
            field,
            format!("'{field}' must be an object map or [{{key,value}}] array"),
        )),
    }
}

pub fn scalar_to_string(value: &Value, field: &str) -> Result<String, ToolError> {
    match value {
        Value::String(v) => Ok(v.clone()),
        Value::Number(v) => Ok(v.to_string()),
        Value::Bool(v) => Ok(v.to_string()),
        _ => Err(ToolError::validation(
            field,
            format!("'{field}' values must be scalar (string/number/bool)"),
        )),
    }
}
