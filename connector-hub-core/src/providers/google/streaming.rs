//! `streamGenerateContent?alt=sse` records to unified chunks
//!
//! Each record is a complete `GenerateContentResponse` holding the next slice
//! of text. Function calls arrive whole, never as argument fragments, so each
//! one becomes a single tool-call delta carrying a generated id.

use super::converter::{answer_text, from_google_usage, map_finish_reason};
use super::types::{GoogleResponse, GoogleStreamEvent};
use crate::protocol::{FinishReason, MessageRole, StreamChunk, ToolCallDelta};
use crate::providers::error::{ErrorTable, ProviderError, ProviderResult, RawError};
use crate::providers::transform::{generate_tool_call_id, object_to_arguments};
use serde_json::json;

#[derive(Debug, Default)]
pub struct GoogleStreamState {
    role_sent: bool,
    next_tool_index: usize,
}

impl GoogleStreamState {
    /// Number of function calls emitted so far
    pub fn tool_call_count(&self) -> usize {
        self.next_tool_index
    }
}

pub fn transform_event(
    errors: &ErrorTable,
    event: GoogleStreamEvent,
    state: &mut GoogleStreamState,
) -> ProviderResult<Option<StreamChunk>> {
    match event {
        GoogleStreamEvent::Error { error } => {
            let payload = json!({ "error": error });
            Err(ProviderError::from(errors.map(RawError::Payload(&payload))))
        }
        GoogleStreamEvent::Chunk(response) => Ok(transform_response(response, state)),
    }
}

fn transform_response(response: GoogleResponse, state: &mut GoogleStreamState) -> Option<StreamChunk> {
    let mut out = StreamChunk {
        usage: response.usage_metadata.and_then(from_google_usage),
        ..Default::default()
    };

    let blocked = response
        .prompt_feedback
        .as_ref()
        .and_then(|feedback| feedback.block_reason.as_deref())
        .is_some();

    match response.candidates.into_iter().next() {
        Some(candidate) => {
            let parts = candidate.content.map(|c| c.parts).unwrap_or_default();

            let text = answer_text(&parts);
            out.content = (!text.is_empty()).then_some(text);

            let calls: Vec<ToolCallDelta> = parts
                .into_iter()
                .filter_map(|part| part.function_call)
                .map(|call| {
                    let index = state.next_tool_index;
                    state.next_tool_index += 1;
                    ToolCallDelta {
                        index,
                        id: Some(generate_tool_call_id()),
                        name: Some(call.name),
                        arguments: Some(object_to_arguments(&call.args)),
                    }
                })
                .collect();
            if !calls.is_empty() {
                out.tool_calls = Some(calls);
            }

            out.finish_reason = candidate
                .finish_reason
                .as_deref()
                .map(|reason| map_finish_reason(Some(reason), state.next_tool_index > 0));
        }
        None if blocked => out.finish_reason = Some(FinishReason::ContentFilter),
        None => {}
    }

    if out.is_empty() {
        return None;
    }
    if !state.role_sent {
        state.role_sent = true;
        out.role = Some(MessageRole::Assistant);
    }
    Some(out)
}
