//! Transformation helpers shared by the vendor converters

use crate::protocol::{Message, MessageRole};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::warn;
use uuid::Uuid;

/// Separator between concatenated system messages
pub const SYSTEM_SEPARATOR: &str = "\n\n";

/// Pull every system message out of `messages`.
///
/// Returns the system texts joined with a blank line, in order, and the
/// remaining conversational turns. The prompt is `None` when there is no
/// system text at all, so vendors can omit the field entirely.
pub fn extract_system_prompt(messages: &[Message]) -> (Option<String>, Vec<&Message>) {
    let mut system = Vec::new();
    let mut turns = Vec::with_capacity(messages.len());

    for message in messages {
        if message.role == MessageRole::System {
            let text = message.content.text();
            if !text.is_empty() {
                system.push(text);
            }
        } else {
            turns.push(message);
        }
    }

    let prompt = (!system.is_empty()).then(|| system.join(SYSTEM_SEPARATOR));
    (prompt, turns)
}

/// A decoded `data:` URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl<'a> {
    pub media_type: &'a str,
    pub data: &'a str,
}

/// Split a base64 `data:` URL into media type and payload
pub fn parse_data_url(url: &str) -> Option<DataUrl<'_>> {
    let rest = url.strip_prefix("data:")?;
    let (meta, data) = rest.split_once(',')?;
    let media_type = meta.strip_suffix(";base64")?;
    if data.is_empty() {
        return None;
    }
    Some(DataUrl {
        media_type: if media_type.is_empty() {
            "application/octet-stream"
        } else {
            media_type
        },
        data,
    })
}

pub fn to_data_url(media_type: &str, data: &str) -> String {
    format!("data:{};base64,{}", media_type, data)
}

pub fn is_http_url(url: &str) -> bool {
    url.starts_with("https://") || url.starts_with("http://")
}

/// Merge adjacent items that share a role.
///
/// Vendors with strictly alternating turns reject consecutive same-role
/// messages; `merge` folds the later item into the earlier one.
pub fn merge_consecutive<T, R, F, M>(items: Vec<T>, role: F, mut merge: M) -> Vec<T>
where
    R: PartialEq,
    F: Fn(&T) -> R,
    M: FnMut(&mut T, T),
{
    let mut merged: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        match merged.last_mut() {
            Some(last) if role(last) == role(&item) => merge(last, item),
            _ => merged.push(item),
        }
    }
    merged
}

/// Parse tool arguments for vendors that take a JSON object.
///
/// Arguments are opaque strings in the unified model; anything that is not
/// a JSON object is logged and replaced by `{}`.
pub fn arguments_to_object(arguments: &str) -> Value {
    if arguments.trim().is_empty() {
        return Value::Object(Map::new());
    }
    match serde_json::from_str::<Value>(arguments) {
        Ok(value @ Value::Object(_)) => value,
        Ok(other) => {
            warn!("Tool arguments are not a JSON object: {}", other);
            Value::Object(Map::new())
        }
        Err(e) => {
            warn!("Tool arguments are not valid JSON: {}", e);
            Value::Object(Map::new())
        }
    }
}

/// Serialize native argument objects back into the unified string form
pub fn object_to_arguments(value: &Value) -> String {
    match value {
        Value::Null => "{}".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Map every assistant tool call id to its function name
pub fn tool_call_names(messages: &[Message]) -> HashMap<&str, &str> {
    messages
        .iter()
        .flat_map(|m| m.tool_calls.iter().flatten())
        .map(|call| (call.id.as_str(), call.function.name.as_str()))
        .collect()
}

/// Identifier for tool calls whose vendor does not assign one
pub fn generate_tool_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ToolCall;
    use proptest::prelude::*;

    #[test]
    fn test_system_prompt_extraction() {
        let messages = vec![
            Message::system("You are helpful."),
            Message::user("Hi"),
            Message::system("Be brief."),
            Message::assistant("Hello"),
        ];
        let (system, turns) = extract_system_prompt(&messages);
        assert_eq!(system.as_deref(), Some("You are helpful.\n\nBe brief."));
        assert_eq!(turns.len(), 2);
        assert!(turns.iter().all(|m| m.role != MessageRole::System));
    }

    #[test]
    fn test_no_system_prompt_is_none() {
        let messages = vec![Message::user("Hi")];
        let (system, turns) = extract_system_prompt(&messages);
        assert!(system.is_none());
        assert_eq!(turns.len(), 1);
    }

    #[test]
    fn test_parse_data_url() {
        let parsed = parse_data_url("data:image/png;base64,iVBORw0KGgo=").unwrap();
        assert_eq!(parsed.media_type, "image/png");
        assert_eq!(parsed.data, "iVBORw0KGgo=");

        assert!(parse_data_url("data:image/png,plain").is_none());
        assert!(parse_data_url("https://example.com/cat.png").is_none());
        assert!(parse_data_url("data:image/png;base64,").is_none());
        assert_eq!(
            parse_data_url("data:;base64,AAAA").unwrap().media_type,
            "application/octet-stream"
        );
    }

    #[test]
    fn test_merge_consecutive() {
        let items = vec![("user", "a"), ("user", "b"), ("assistant", "c"), ("user", "d")];
        let items: Vec<(&str, String)> = items.into_iter().map(|(r, t)| (r, t.to_string())).collect();
        let merged = merge_consecutive(items, |(role, _)| *role, |last, (_, text)| {
            last.1.push_str("\n\n");
            last.1.push_str(&text);
        });
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].1, "a\n\nb");
        assert_eq!(merged[2].1, "d");
    }

    #[test]
    fn test_arguments_round_trip() {
        assert_eq!(arguments_to_object("{\"a\":1}"), serde_json::json!({"a": 1}));
        assert_eq!(arguments_to_object(""), serde_json::json!({}));
        assert_eq!(arguments_to_object("{broken"), serde_json::json!({}));
        assert_eq!(arguments_to_object("[1,2]"), serde_json::json!({}));
        assert_eq!(object_to_arguments(&serde_json::json!({"a": 1})), "{\"a\":1}");
        assert_eq!(object_to_arguments(&Value::Null), "{}");
    }

    #[test]
    fn test_tool_call_names() {
        let messages = vec![
            Message::assistant_tool_calls(vec![ToolCall::function("call_1", "get_weather", "{}")]),
            Message::tool("call_1", "sunny"),
        ];
        let names = tool_call_names(&messages);
        assert_eq!(names.get("call_1"), Some(&"get_weather"));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = generate_tool_call_id();
        assert!(a.starts_with("call_"));
        assert_ne!(a, generate_tool_call_id());
    }

    proptest! {
        #[test]
        fn prop_system_text_is_ordered_concatenation(
            system in proptest::collection::vec("[a-zA-Z ]{1,20}", 1..5),
            user in proptest::collection::vec("[a-zA-Z ]{1,20}", 1..5),
        ) {
            let mut messages = Vec::new();
            for (i, text) in system.iter().enumerate() {
                messages.push(Message::system(text.clone()));
                if let Some(u) = user.get(i) {
                    messages.push(Message::user(u.clone()));
                }
            }
            let (prompt, turns) = extract_system_prompt(&messages);
            prop_assert_eq!(prompt, Some(system.join(SYSTEM_SEPARATOR)));
            prop_assert!(turns.iter().all(|m| m.role != MessageRole::System));
        }
    }
}
