//! Chat completion stream events to unified chunks
//!
//! The sentinel grammar carries full deltas, so the per-stream state is the
//! unified [`StreamAccumulator`] plus a flag for the one-time role announcement.

use super::converter::{from_openai_usage, map_finish_reason, parse_role};
use super::types::{OpenAIStreamChunk, OpenAIStreamEvent};
use crate::protocol::{FunctionCallDelta, StreamAccumulator, StreamChunk, ToolCallDelta};
use crate::providers::error::{ErrorTable, ProviderError, ProviderResult, RawError};
use serde_json::json;

/// Per-stream state for OpenAI-family streams
#[derive(Debug, Default)]
pub struct OpenAIStreamState {
    acc: StreamAccumulator,
    role_seen: bool,
}

impl OpenAIStreamState {
    /// Everything seen so far
    pub fn accumulated(&self) -> &StreamAccumulator {
        &self.acc
    }
}

pub fn transform_event(
    errors: &ErrorTable,
    event: OpenAIStreamEvent,
    state: &mut OpenAIStreamState,
) -> ProviderResult<Option<StreamChunk>> {
    match event {
        OpenAIStreamEvent::Error { error } => {
            let payload = json!({ "error": error });
            Err(ProviderError::from(errors.map(RawError::Payload(&payload))))
        }
        OpenAIStreamEvent::Chunk(chunk) => Ok(transform_chunk(chunk, state)),
    }
}

fn transform_chunk(chunk: OpenAIStreamChunk, state: &mut OpenAIStreamState) -> Option<StreamChunk> {
    let mut out = StreamChunk {
        usage: chunk.usage.map(from_openai_usage),
        ..Default::default()
    };

    // Only the first choice is tracked
    if let Some(choice) = chunk.choices.into_iter().find(|c| c.index == 0) {
        let delta = choice.delta;

        if let Some(role) = delta.role {
            if !state.role_seen {
                state.role_seen = true;
                out.role = Some(parse_role(&role));
            }
        }

        out.content = delta.content.filter(|text| !text.is_empty());

        out.function_call = delta.function_call.map(|fc| FunctionCallDelta {
            name: fc.name,
            arguments: fc.arguments,
        });

        out.tool_calls = delta
            .tool_calls
            .map(|calls| {
                calls
                    .into_iter()
                    .map(|tc| {
                        let (name, arguments) = match tc.function {
                            Some(f) => (f.name, f.arguments),
                            None => (None, None),
                        };
                        ToolCallDelta {
                            index: tc.index,
                            id: tc.id,
                            name,
                            arguments,
                        }
                    })
                    .collect::<Vec<_>>()
            })
            .filter(|calls| !calls.is_empty());

        out.finish_reason = choice
            .finish_reason
            .as_deref()
            .map(|reason| map_finish_reason(Some(reason)));
    }

    if out.is_empty() {
        return None;
    }
    state.acc.apply(&out);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{FinishReason, MessageRole};
    use crate::providers::error::ErrorKind;
    use crate::providers::openai::error::OPENAI_ERRORS;

    fn event(value: serde_json::Value) -> OpenAIStreamEvent {
        serde_json::from_value(value).unwrap()
    }

    fn feed(state: &mut OpenAIStreamState, value: serde_json::Value) -> Option<StreamChunk> {
        transform_event(&OPENAI_ERRORS, event(value), state).unwrap()
    }

    #[test]
    fn test_role_announced_once() {
        let mut state = OpenAIStreamState::default();
        let first = feed(
            &mut state,
            serde_json::json!({"choices": [{"index": 0, "delta": {"role": "assistant", "content": ""}}]}),
        )
        .unwrap();
        assert_eq!(first.role, Some(MessageRole::Assistant));
        assert!(first.content.is_none());

        let second = feed(
            &mut state,
            serde_json::json!({"choices": [{"index": 0, "delta": {"role": "assistant"}}]}),
        );
        assert!(second.is_none());
    }

    #[test]
    fn test_split_tool_arguments() {
        let mut state = OpenAIStreamState::default();
        feed(&mut state, serde_json::json!({"choices": [{"index": 0, "delta": {"tool_calls": [
            {"index": 0, "id": "call_1", "type": "function", "function": {"name": "get_weather", "arguments": ""}}
        ]}}]}));
        for fragment in ["{\"location\":", "\"Paris\"", "}"] {
            let chunk = feed(&mut state, serde_json::json!({"choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": fragment}}
            ]}}]}))
            .unwrap();
            let delta = &chunk.tool_calls.unwrap()[0];
            assert!(delta.id.is_none());
            assert_eq!(delta.arguments.as_deref(), Some(fragment));
        }
        let done = feed(
            &mut state,
            serde_json::json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "tool_calls"}]}),
        )
        .unwrap();
        assert_eq!(done.finish_reason, Some(FinishReason::ToolCalls));

        let calls = state.accumulated().tool_calls();
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].function.arguments, "{\"location\":\"Paris\"}");
    }

    #[test]
    fn test_usage_only_chunk() {
        let mut state = OpenAIStreamState::default();
        let chunk = feed(
            &mut state,
            serde_json::json!({"choices": [], "usage": {"prompt_tokens": 5, "completion_tokens": 7, "total_tokens": 12}}),
        )
        .unwrap();
        assert_eq!(chunk.usage.unwrap().total_tokens, 12);
    }

    #[test]
    fn test_other_choices_are_ignored() {
        let mut state = OpenAIStreamState::default();
        assert!(feed(
            &mut state,
            serde_json::json!({"choices": [{"index": 1, "delta": {"content": "other"}}]})
        )
        .is_none());
    }

    #[test]
    fn test_error_event_raises() {
        let mut state = OpenAIStreamState::default();
        let err = transform_event(
            &OPENAI_ERRORS,
            event(serde_json::json!({"error": {"message": "overloaded", "type": "server_error"}})),
            &mut state,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServerError);
    }
}
