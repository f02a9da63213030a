use rmcp::model::{CallToolResult, Content};
use serde::Serialize;
use serde_json::{json, Map as JsonMap, Value as JsonValue};

use crate::config::parse_bool;
use crate::error::{ErrorCode, ThingsError};

pub type Args = JsonMap<String, JsonValue>;

/// Successful tool result: `{success: true, ...data}` as structured content,
/// plus the same JSON as text for clients that ignore structured content.
pub fn structured_result_with_text<T: Serialize>(data: &T) -> Result<CallToolResult, ThingsError> {
    let value = serde_json::to_value(data)?;

    // Non-object payloads are wrapped under `data`.
    let mut map: JsonMap<String, JsonValue> = match value {
        JsonValue::Object(m) => m,
        other => {
            let mut m = JsonMap::new();
            m.insert("data".to_string(), other);
            m
        }
    };
    map.entry("success".to_string())
        .or_insert(JsonValue::Bool(true));

    let structured = JsonValue::Object(map);
    let text = serde_json::to_string_pretty(&structured)?;
    Ok(CallToolResult {
        content: vec![Content::text(text)],
        structured_content: Some(structured),
        is_error: Some(false),
        meta: None,
    })
}

/// Failed tool result: `{success: false, error: CODE, kind, message}`.
/// `kind` tells a client whether retrying later can help.
pub fn error_result(error: &ThingsError) -> CallToolResult {
    let body = json!({
        "success": false,
        "error": error.code(),
        "kind": error.kind(),
        "message": error.to_string(),
    });
    CallToolResult {
        content: vec![Content::text(body.to_string())],
        structured_content: Some(body),
        is_error: Some(true),
        meta: None,
    }
}

// --- Argument helpers. MCP clients send loosely typed JSON, so strings,
// numbers and booleans are normalised here before anything else sees them.

pub fn required_str<'a>(args: &'a Args, key: &str) -> Result<&'a str, ThingsError> {
    optional_str(args, key).ok_or_else(|| {
        ThingsError::validation(
            ErrorCode::InvalidParameter,
            format!("Missing required argument '{}'", key),
        )
    })
}

/// Trimmed, non-empty string or `None`.
pub fn optional_str<'a>(args: &'a Args, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Like [`optional_str`], but an explicitly empty string is kept so callers
/// can clear a field.
pub fn optional_text(args: &Args, key: &str) -> Option<String> {
    args.get(key).and_then(JsonValue::as_str).map(str::to_string)
}

/// Accepts JSON booleans and `"true"/"false"`-style strings.
pub fn flag(args: &Args, key: &str) -> Result<Option<bool>, ThingsError> {
    match args.get(key) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::Bool(b)) => Ok(Some(*b)),
        Some(JsonValue::String(s)) if s.trim().is_empty() => Ok(None),
        Some(JsonValue::String(s)) => parse_bool(s).map(Some).ok_or_else(|| invalid_bool(key, s)),
        Some(JsonValue::Number(n)) => match n.as_u64() {
            Some(0) => Ok(Some(false)),
            Some(1) => Ok(Some(true)),
            _ => Err(invalid_bool(key, &n.to_string())),
        },
        Some(other) => Err(invalid_bool(key, &other.to_string())),
    }
}

fn invalid_bool(key: &str, value: &str) -> ThingsError {
    ThingsError::validation(
        ErrorCode::InvalidParameter,
        format!("Argument '{}' must be a boolean, got '{}'", key, value),
    )
}

/// Accepts a JSON array of strings or one comma-separated string.
pub fn string_list(args: &Args, key: &str) -> Option<Vec<String>> {
    let values: Vec<String> = match args.get(key)? {
        JsonValue::Array(items) => items
            .iter()
            .filter_map(JsonValue::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        JsonValue::String(s) => s
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => return None,
    };
    Some(values)
}

/// Like [`string_list`], but array entries are kept one-for-one, blanks
/// included, so per-item reports line up with what the caller sent.
pub fn item_list(args: &Args, key: &str) -> Option<Vec<String>> {
    match args.get(key)? {
        JsonValue::Array(items) => Some(
            items
                .iter()
                .map(|item| match item {
                    JsonValue::String(s) => s.clone(),
                    JsonValue::Null => String::new(),
                    other => other.to_string(),
                })
                .collect(),
        ),
        _ => string_list(args, key),
    }
}

/// Newline-separated items, for checklist items and project to-dos.
pub fn line_list(args: &Args, key: &str) -> Vec<String> {
    match args.get(key) {
        Some(JsonValue::String(s)) => s
            .lines()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => string_list(args, key).unwrap_or_default(),
    }
}

/// Accepts a number or a numeric string.
pub fn optional_usize(args: &Args, key: &str) -> Result<Option<usize>, ThingsError> {
    let invalid = |raw: String| {
        ThingsError::validation(
            ErrorCode::InvalidParameter,
            format!("Argument '{}' must be a non-negative integer, got '{}'", key, raw),
        )
    };
    match args.get(key) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::Number(n)) => n
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| invalid(n.to_string())),
        Some(JsonValue::String(s)) if s.trim().is_empty() => Ok(None),
        Some(JsonValue::String(s)) => s
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| invalid(s.clone())),
        Some(other) => Err(invalid(other.to_string())),
    }
}

/// `limit` argument: default 50, must fall in 1..=500.
pub fn limit(args: &Args) -> Result<usize, ThingsError> {
    let raw = match args.get("limit") {
        Some(JsonValue::Number(n)) if n.as_i64().map(|v| v < 0).unwrap_or(false) => {
            return Err(ThingsError::validation(
                ErrorCode::InvalidLimit,
                format!("limit must be between 1 and 500, got {}", n),
            ));
        }
        _ => optional_usize(args, "limit")?,
    };
    crate::connectors::things::validate_limit(
        raw.unwrap_or(crate::connectors::things::DEFAULT_LIMIT),
    )
}
