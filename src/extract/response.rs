//! Parsing model replies into field mappings.
//!
//! Vision models rarely return clean JSON. Replies may be wrapped in Markdown
//! fences, surrounded by prose, or written as Python dict literals with single
//! quotes and bare `None`. Parsing is lenient about all of these but strict
//! about the result being an object.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use super::backend::ExtractError;
use crate::models::{FieldMapping, FieldSchema};

/// Reply values that mean "not found".
const NULL_MARKERS: &[&str] = &["none", "null", "n/a", "na", "nil", "not found", "not available"];

fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```[A-Za-z]*\s*(.*?)```").expect("fence pattern"))
}

/// Double-quoted strings (kept), single-quoted strings, or bare Python literals.
fn python_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#""(?:[^"\\]|\\.)*"|'((?:[^'\\]|\\.)*)'|\b(None|True|False)\b"#)
            .expect("python token pattern")
    })
}

/// Parse a model reply into a mapping over exactly the schema's fields.
pub fn parse_field_mapping(reply: &str, schema: &FieldSchema) -> Result<FieldMapping, ExtractError> {
    let object = parse_object(reply)?;

    let mapping: FieldMapping = schema
        .field_names()
        .map(|name| {
            let value = lookup(&object, name).and_then(normalize_value);
            (name.to_string(), value)
        })
        .collect();

    let unexpected: Vec<&String> = object
        .keys()
        .filter(|k| !schema.fields.iter().any(|f| f.name.eq_ignore_ascii_case(k)))
        .collect();
    if !unexpected.is_empty() {
        debug!("Ignoring keys outside schema '{}': {:?}", schema.name, unexpected);
    }

    Ok(mapping)
}

/// Locate and decode the JSON object inside a reply.
pub fn parse_object(reply: &str) -> Result<Map<String, Value>, ExtractError> {
    let body = fence_regex()
        .captures(reply)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(reply);

    let start = body.find('{');
    let end = body.rfind('}');
    let candidate = match (start, end) {
        (Some(s), Some(e)) if s < e => &body[s..=e],
        _ => {
            return Err(ExtractError::ApiError(format!(
                "Reply does not contain a field object: {}",
                preview(reply)
            )))
        }
    };

    let value = match serde_json::from_str::<Value>(candidate) {
        Ok(value) => value,
        Err(strict_err) => {
            let relaxed = depythonize(candidate);
            serde_json::from_str::<Value>(&relaxed).map_err(|_| {
                ExtractError::ApiError(format!(
                    "Reply is not valid JSON ({}): {}",
                    strict_err,
                    preview(reply)
                ))
            })?
        }
    };

    match value {
        Value::Object(map) => Ok(map),
        other => Err(ExtractError::ApiError(format!(
            "Expected a JSON object, got {}",
            preview(&other.to_string())
        ))),
    }
}

/// Convert a Python dict literal to JSON.
///
/// Only single-quoted strings are requoted, so apostrophes inside
/// double-quoted strings survive. Literals inside strings are left alone.
fn depythonize(text: &str) -> String {
    python_token_regex()
        .replace_all(text, |caps: &regex::Captures| {
            if let Some(inner) = caps.get(1) {
                requote(inner.as_str())
            } else if let Some(literal) = caps.get(2) {
                match literal.as_str() {
                    "None" => "null",
                    "True" => "true",
                    _ => "false",
                }
                .to_string()
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

/// Re-emit the body of a single-quoted Python string as a JSON string.
fn requote(inner: &str) -> String {
    let mut out = String::with_capacity(inner.len() + 2);
    out.push('"');
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('\'') => out.push('\''),
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push_str("\\\\"),
            },
            '"' => out.push_str("\\\""),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

fn lookup<'a>(object: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    object.get(name).or_else(|| {
        object
            .iter()
            .find(|(k, _)| k.trim().eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    })
}

/// Reduce a JSON value to an extracted string, or `None` if absent.
fn normalize_value(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(normalize_value)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => value.to_string(),
    };

    let lowered = text.to_lowercase();
    if text.is_empty() || NULL_MARKERS.contains(&lowered.as_str()) {
        None
    } else {
        Some(text)
    }
}

fn preview(text: &str) -> String {
    const MAX: usize = 200;
    if text.len() <= MAX {
        return text.to_string();
    }
    let mut end = MAX;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
