//! Request format sent by character-chat clients to `POST /chat`.
//!
//! Clients are loosely typed: fields may be missing, `null`, or carry a
//! different JSON type than expected. Every field is therefore kept as raw JSON
//! and coerced when the upstream request is built, following the browser-side
//! conventions the clients were written against (truthiness, `parseFloat`).

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboundChatRequest {
    /// `Some(Value::Null)` when the client sent an explicit `null`.
    #[serde(default, deserialize_with = "present")]
    pub character: Option<Value>,
    #[serde(rename = "chatHistory", default, deserialize_with = "present")]
    pub chat_history: Option<Value>,
    #[serde(rename = "userMessage", default, deserialize_with = "present")]
    pub user_message: Option<Value>,
    #[serde(rename = "modelName", default, deserialize_with = "present")]
    pub model_name: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub temperature: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub frequency_penalty: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub presence_penalty: Option<Value>,
}

/// Distinguishes an explicit `null` from a missing key.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl InboundChatRequest {
    /// Build from an already-parsed JSON document.
    ///
    /// Anything other than an object carries no fields and fails validation.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(_) => serde_json::from_value(value).unwrap_or_default(),
            _ => Self::default(),
        }
    }

    /// `character` must be truthy and `userMessage` present (even if empty).
    #[must_use]
    pub fn has_required_fields(&self) -> bool {
        self.character.as_ref().is_some_and(is_truthy) && self.user_message.is_some()
    }

    /// `character.description`, if the character is an object that has one.
    #[must_use]
    pub fn character_description(&self) -> Option<&Value> {
        self.character.as_ref()?.get("description")
    }
}

/// A single `chatHistory` element.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub sender: Option<Value>,
    #[serde(default)]
    pub main: Option<Value>,
}

impl HistoryEntry {
    /// Non-object elements behave like entries with no fields.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        Self {
            sender: value.get("sender").cloned(),
            main: value.get("main").cloned(),
        }
    }

    #[must_use]
    pub fn is_from_ai(&self) -> bool {
        matches!(&self.sender, Some(Value::String(s)) if s == "ai")
    }

    #[must_use]
    pub fn has_content(&self) -> bool {
        self.main.as_ref().is_some_and(is_truthy)
    }
}

/// JavaScript truthiness of a JSON value.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Text content for an upstream message. `null` carries no content; strings
/// pass through and other values are sent as their JSON text.
#[must_use]
pub fn text_content(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Numeric coercion for tuning parameters.
///
/// A missing field takes `default`; numbers pass through; strings are read
/// with `parseFloat` rules; everything else is NaN.
#[must_use]
pub fn coerce_f64(value: Option<&Value>, default: f64) -> f64 {
    match value {
        None => default,
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => parse_float(s),
        Some(_) => f64::NAN,
    }
}

/// Longest leading decimal literal of `s`, after leading whitespace.
/// Returns NaN when there is none.
#[must_use]
pub fn parse_float(s: &str) -> f64 {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }

    if s[end..].starts_with("Infinity") {
        return if s.starts_with('-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
    }

    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;

    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        if digits > 0 {
            end = frac_end;
        }
    }

    if digits == 0 {
        return f64::NAN;
    }

    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && matches!(bytes[exp_end], b'+' | b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    s[..end].parse().unwrap_or(f64::NAN)
}
