use chrono::{DateTime, Local};
use serde_json::{Map, Value};

use crate::config::{ConfigMap, ConfigValue, SPACE_DELIM};
use crate::utils::sensitive_data::{is_hidden_key, mask_all};

pub fn info_line(message: impl AsRef<str>) -> String {
    format!("<i> {}", message.as_ref())
}

pub fn error_line(message: impl AsRef<str>) -> String {
    format!("<E> {}", message.as_ref())
}

/// Render a JSON value the way the REPL shows it: strings without quotes,
/// everything else as compact JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "None".to_string(),
        other => other.to_string(),
    }
}

/// One line per entry: `key: value` for objects, `index: value` for arrays,
/// the value itself otherwise. The `password` key is masked.
pub fn format_item(value: &Value, indent: &str) -> Vec<String> {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(key, v)| {
                if is_hidden_key(key) {
                    format!("{indent}{key}: {}", mask_all(&display_value(v)))
                } else {
                    format!("{indent}{key}: {}", display_value(v))
                }
            })
            .collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| format!("{indent}{i}: {}", display_value(item)))
            .collect(),
        other => vec![format!("{indent}{}", display_value(other))],
    }
}

/// [`format_item`] over the config map, in file order. Escaped spaces are
/// shown as `\0`.
pub fn format_config(config: &ConfigMap, indent: &str) -> Vec<String> {
    let entries = config
        .iter()
        .map(|(key, value)| {
            let value = match value {
                ConfigValue::Bool(b) => Value::Bool(*b),
                ConfigValue::Text(s) => Value::String(s.replace(SPACE_DELIM, "\\0")),
            };
            (key.to_string(), value)
        })
        .collect::<Map<String, Value>>();
    format_item(&Value::Object(entries), indent)
}

/// Convert an RFC 3339 timestamp into local time. Unparseable input is
/// returned unchanged.
pub fn show_time(date_string: &str) -> String {
    match DateTime::parse_from_rfc3339(date_string) {
        Ok(dt) => dt
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S%.6f")
            .to_string(),
        Err(_) => date_string.to_string(),
    }
}
