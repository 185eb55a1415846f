//! Reassembly of a full response from a sequence of stream chunks

use super::types::{
    Choice, CompletionResponse, FinishReason, FunctionCall, Message, MessageContent, MessageRole,
    StreamChunk, ToolCall, Usage,
};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
struct ToolCallState {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Folds [`StreamChunk`]s into the logical response they describe.
///
/// Content and argument fragments are concatenated in arrival order. Tool
/// call `id` and `name` are recorded the first time they appear for an index
/// and never overwritten.
#[derive(Debug, Clone, Default)]
pub struct StreamAccumulator {
    role: Option<MessageRole>,
    content: String,
    function_call: Option<FunctionCall>,
    tool_calls: BTreeMap<usize, ToolCallState>,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, chunk: &StreamChunk) {
        if self.role.is_none() {
            self.role = chunk.role;
        }

        if let Some(content) = &chunk.content {
            self.content.push_str(content);
        }

        if let Some(delta) = &chunk.function_call {
            let call = self.function_call.get_or_insert_with(|| FunctionCall {
                name: String::new(),
                arguments: String::new(),
            });
            if call.name.is_empty() {
                if let Some(name) = &delta.name {
                    call.name = name.clone();
                }
            }
            if let Some(arguments) = &delta.arguments {
                call.arguments.push_str(arguments);
            }
        }

        for delta in chunk.tool_calls.iter().flatten() {
            let state = self.tool_calls.entry(delta.index).or_default();
            if state.id.is_none() {
                state.id = delta.id.clone();
            }
            if state.name.is_none() {
                state.name = delta.name.clone();
            }
            if let Some(arguments) = &delta.arguments {
                state.arguments.push_str(arguments);
            }
        }

        if chunk.finish_reason.is_some() {
            self.finish_reason = chunk.finish_reason;
        }
        if chunk.usage.is_some() {
            self.usage = chunk.usage;
        }
    }

    pub fn role(&self) -> Option<MessageRole> {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn function_call(&self) -> Option<&FunctionCall> {
        self.function_call.as_ref()
    }

    /// Arguments accumulated so far for the tool call at `index`
    pub fn tool_call_arguments(&self, index: usize) -> Option<&str> {
        self.tool_calls.get(&index).map(|s| s.arguments.as_str())
    }

    pub fn has_tool_call(&self, index: usize) -> bool {
        self.tool_calls.contains_key(&index)
    }

    pub fn tool_call_count(&self) -> usize {
        self.tool_calls.len()
    }

    /// Tool calls ordered by index
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.tool_calls
            .values()
            .map(|state| {
                ToolCall::function(
                    state.id.clone().unwrap_or_default(),
                    state.name.clone().unwrap_or_default(),
                    state.arguments.clone(),
                )
            })
            .collect()
    }

    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.finish_reason
    }

    pub fn usage(&self) -> Option<Usage> {
        self.usage
    }

    pub fn into_response(self, id: impl Into<String>, model: impl Into<String>) -> CompletionResponse {
        let tool_calls = self.tool_calls();
        let message = Message {
            role: self.role.unwrap_or(MessageRole::Assistant),
            content: MessageContent::Text(self.content),
            name: None,
            function_call: self.function_call,
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            tool_call_id: None,
        };

        CompletionResponse {
            id: id.into(),
            model: model.into(),
            created: unix_timestamp(),
            choices: vec![Choice {
                index: 0,
                message,
                finish_reason: self.finish_reason.unwrap_or_default(),
            }],
            usage: self.usage,
        }
    }
}

pub(crate) fn unix_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
