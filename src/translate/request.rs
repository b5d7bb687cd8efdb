//! Translate a character-chat request into an upstream Chat Completions request.
//!
//! The message list is always `system` (character description), then the
//! non-empty history in order, then the new user message.

use serde_json::Value;

use super::inbound_types::{coerce_f64, is_truthy, text_content, HistoryEntry, InboundChatRequest};
use super::openai_types::{Role, UpstreamChatRequest, UpstreamMessage};
use crate::error::{RelayError, Result};

pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_FREQUENCY_PENALTY: f64 = 0.0;
pub const DEFAULT_PRESENCE_PENALTY: f64 = 0.0;

/// Build the ordered upstream message list.
///
/// Fails when `chatHistory` is missing, not an array, or holds a `null` entry.
pub fn build_messages(req: &InboundChatRequest) -> Result<Vec<UpstreamMessage>> {
    let history = match &req.chat_history {
        Some(Value::Array(items)) => items,
        _ => return Err(RelayError::processing("chatHistory must be an array")),
    };

    if let Some(index) = history.iter().position(Value::is_null) {
        return Err(RelayError::processing(format!(
            "chatHistory entry {} is null",
            index
        )));
    }

    let mut messages = Vec::with_capacity(history.len() + 2);

    messages.push(UpstreamMessage::new(
        Role::System,
        text_content(req.character_description()),
    ));

    messages.extend(
        history
            .iter()
            .map(HistoryEntry::from_value)
            .filter(HistoryEntry::has_content)
            .map(|entry| {
                let role = if entry.is_from_ai() {
                    Role::Assistant
                } else {
                    Role::User
                };
                UpstreamMessage::new(role, text_content(entry.main.as_ref()))
            }),
    );

    messages.push(UpstreamMessage::new(
        Role::User,
        text_content(req.user_message.as_ref()),
    ));

    Ok(messages)
}

/// Resolve the model name, falling back to `default_model` when unset or falsy.
pub fn resolve_model(req: &InboundChatRequest, default_model: &str) -> String {
    match &req.model_name {
        Some(value) if is_truthy(value) => {
            text_content(Some(value)).unwrap_or_else(|| default_model.to_string())
        }
        _ => default_model.to_string(),
    }
}

/// Build the full streaming request body for upstream.
pub fn build_upstream_request(
    req: &InboundChatRequest,
    default_model: &str,
) -> Result<UpstreamChatRequest> {
    Ok(UpstreamChatRequest {
        model: resolve_model(req, default_model),
        messages: build_messages(req)?,
        temperature: coerce_f64(req.temperature.as_ref(), DEFAULT_TEMPERATURE),
        frequency_penalty: coerce_f64(req.frequency_penalty.as_ref(), DEFAULT_FREQUENCY_PENALTY),
        presence_penalty: coerce_f64(req.presence_penalty.as_ref(), DEFAULT_PRESENCE_PENALTY),
        stream: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DEFAULT_MODEL: &str = "deepseek/deepseek-r1-0528:free";

    fn request(body: Value) -> InboundChatRequest {
        InboundChatRequest::from_value(body)
    }

    #[test]
    fn test_history_filtered_and_ordered() {
        let req = request(json!({
            "character": { "description": "A cheerful baker" },
            "chatHistory": [
                { "sender": "user", "main": "hi" },
                { "sender": "ai", "main": "hello" },
                { "sender": "user" },
            ],
            "userMessage": "what's fresh today?",
        }));

        let messages = build_messages(&req).unwrap();
        assert_eq!(
            messages,
            vec![
                UpstreamMessage::new(Role::System, Some("A cheerful baker".into())),
                UpstreamMessage::new(Role::User, Some("hi".into())),
                UpstreamMessage::new(Role::Assistant, Some("hello".into())),
                UpstreamMessage::new(Role::User, Some("what's fresh today?".into())),
            ]
        );
    }

    #[test]
    fn test_unknown_senders_become_user() {
        let req = request(json!({
            "character": {},
            "chatHistory": [
                { "sender": "narrator", "main": "It was night." },
                { "main": "anyone?" },
                { "sender": "AI", "main": "case matters" },
                { "sender": "ai", "main": "" },
            ],
            "userMessage": "",
        }));

        let messages = build_messages(&req).unwrap();
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::User, Role::User, Role::User]
        );
        assert_eq!(messages[0].content, None);
        assert_eq!(messages[4].content, Some(String::new()));
    }

    #[test]
    fn test_missing_history_is_processing_error() {
        let req = request(json!({ "character": { "description": "x" }, "userMessage": "hi" }));
        let err = build_messages(&req).unwrap_err();
        assert!(matches!(err, RelayError::Processing { .. }));

        let req = request(json!({
            "character": { "description": "x" },
            "chatHistory": "not a list",
            "userMessage": "hi",
        }));
        assert!(build_messages(&req).is_err());
    }

    #[test]
    fn test_null_history_entry_is_processing_error() {
        let req = request(json!({
            "character": { "description": "x" },
            "chatHistory": [null, { "sender": "ai", "main": "x" }],
            "userMessage": "hi",
        }));

        match build_messages(&req) {
            Err(RelayError::Processing { message }) => {
                assert_eq!(message, "chatHistory entry 0 is null");
            }
            other => panic!("expected processing error, got {:?}", other),
        }
    }

    #[test]
    fn test_defaults_applied() {
        let req = request(json!({
            "character": { "description": "x" },
            "chatHistory": [],
            "userMessage": "hi",
        }));

        let upstream = build_upstream_request(&req, DEFAULT_MODEL).unwrap();
        assert_eq!(upstream.model, DEFAULT_MODEL);
        assert_eq!(upstream.temperature, 0.7);
        assert_eq!(upstream.frequency_penalty, 0.0);
        assert_eq!(upstream.presence_penalty, 0.0);
        assert!(upstream.stream);
        assert_eq!(upstream.messages.len(), 2);
    }

    #[test]
    fn test_model_name_override_and_empty() {
        let named = request(json!({ "modelName": "openai/gpt-4o-mini" }));
        assert_eq!(resolve_model(&named, DEFAULT_MODEL), "openai/gpt-4o-mini");

        let empty = request(json!({ "modelName": "" }));
        assert_eq!(resolve_model(&empty, DEFAULT_MODEL), DEFAULT_MODEL);

        let null = request(json!({ "modelName": null }));
        assert_eq!(resolve_model(&null, DEFAULT_MODEL), DEFAULT_MODEL);
    }

    #[test]
    fn test_serialized_body_shape() {
        let req = request(json!({
            "character": { "description": "Stoic knight" },
            "chatHistory": [{ "sender": "ai", "main": "Halt." }],
            "userMessage": "Greetings",
            "modelName": "meta-llama/llama-3-8b-instruct",
            "temperature": "0.9",
            "frequency_penalty": 0.2,
            "presence_penalty": "high",
        }));

        let upstream = build_upstream_request(&req, DEFAULT_MODEL).unwrap();
        let body = serde_json::to_value(&upstream).unwrap();

        assert_eq!(
            body,
            json!({
                "model": "meta-llama/llama-3-8b-instruct",
                "messages": [
                    { "role": "system", "content": "Stoic knight" },
                    { "role": "assistant", "content": "Halt." },
                    { "role": "user", "content": "Greetings" },
                ],
                "temperature": 0.9,
                "frequency_penalty": 0.2,
                "presence_penalty": null,
                "stream": true,
            })
        );
    }
}
