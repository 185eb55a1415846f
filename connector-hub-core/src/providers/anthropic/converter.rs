//! Conversion between the unified protocol and the Messages API

use super::types::*;
use crate::config::ProviderSettings;
use crate::protocol::accumulator::unix_timestamp;
use crate::protocol::{
    Choice, CompletionRequest, CompletionResponse, ContentPart, FinishReason, Message,
    MessageContent, MessageRole, ToolCall, ToolChoice, Usage,
};
use crate::providers::adapter::TokenLimit;
use crate::providers::transform::{
    arguments_to_object, extract_system_prompt, is_http_url, merge_consecutive, object_to_arguments,
    parse_data_url,
};
use serde_json::json;
use tracing::warn;

/// Convert a unified request to a Messages API request.
///
/// `max_tokens` is mandatory for this vendor: when the caller leaves it out,
/// the configured default is sent, clamped to the model's known limit.
pub fn to_anthropic_request(
    request: &CompletionRequest,
    settings: &ProviderSettings,
    limit: TokenLimit,
    stream: bool,
) -> AnthropicRequest {
    let (system, turns) = extract_system_prompt(&request.messages);

    let messages: Vec<AnthropicMessage> = turns.into_iter().filter_map(to_anthropic_message).collect();
    let messages = merge_consecutive(
        messages,
        |m| m.role.clone(),
        |last, next| last.content.extend(next.content),
    );

    let tools = request.all_tools();

    AnthropicRequest {
        model: request.model.clone(),
        max_tokens: request
            .max_tokens
            .unwrap_or_else(|| limit.clamp(settings.default_max_tokens)),
        system,
        messages,
        temperature: request.temperature,
        top_p: request.top_p,
        stop_sequences: request.stop.clone().filter(|stop| !stop.is_empty()),
        stream: stream.then_some(true),
        tools: (!tools.is_empty()).then(|| {
            tools
                .into_iter()
                .map(|tool| AnthropicTool {
                    name: tool.function.name,
                    description: tool.function.description,
                    input_schema: tool
                        .function
                        .parameters
                        .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
                })
                .collect()
        }),
        tool_choice: request.tool_choice.as_ref().map(to_anthropic_tool_choice),
        metadata: request.user.clone().map(|user_id| AnthropicMetadata { user_id }),
    }
}

/// One unified turn as blocks. Tool and function results become user turns
/// holding a `tool_result` block; merging then folds them into the
/// neighbouring user turn.
fn to_anthropic_message(message: &Message) -> Option<AnthropicMessage> {
    match message.role {
        MessageRole::System => None,
        MessageRole::User => Some(AnthropicMessage {
            role: "user".to_string(),
            content: content_blocks(&message.content),
        }),
        MessageRole::Assistant => {
            let mut content = content_blocks(&message.content);
            for call in message.tool_calls.iter().flatten() {
                content.push(AnthropicContentBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.function.name.clone(),
                    input: arguments_to_object(&call.function.arguments),
                });
            }
            if let Some(call) = &message.function_call {
                // Legacy calls have no id; results refer back by name
                content.push(AnthropicContentBlock::ToolUse {
                    id: call.name.clone(),
                    name: call.name.clone(),
                    input: arguments_to_object(&call.arguments),
                });
            }
            Some(AnthropicMessage {
                role: "assistant".to_string(),
                content,
            })
        }
        MessageRole::Tool | MessageRole::Function => {
            let tool_use_id = message
                .tool_call_id
                .clone()
                .or_else(|| message.name.clone())
                .unwrap_or_default();
            Some(AnthropicMessage {
                role: "user".to_string(),
                content: vec![AnthropicContentBlock::ToolResult {
                    tool_use_id,
                    content: message.content.text(),
                }],
            })
        }
    }
}

fn content_blocks(content: &MessageContent) -> Vec<AnthropicContentBlock> {
    match content {
        MessageContent::Text(text) if text.is_empty() => Vec::new(),
        MessageContent::Text(text) => vec![AnthropicContentBlock::Text { text: text.clone() }],
        MessageContent::Parts(parts) => parts.iter().filter_map(content_block).collect(),
    }
}

fn content_block(part: &ContentPart) -> Option<AnthropicContentBlock> {
    let source = match part {
        ContentPart::Text { text } => {
            return Some(AnthropicContentBlock::Text { text: text.clone() });
        }
        ContentPart::ImageBase64 { media_type, data } => AnthropicImageSource::Base64 {
            media_type: media_type.clone(),
            data: data.clone(),
        },
        ContentPart::ImageUrl { url, .. } => match parse_data_url(url) {
            Some(parsed) => AnthropicImageSource::Base64 {
                media_type: parsed.media_type.to_string(),
                data: parsed.data.to_string(),
            },
            None if is_http_url(url) => AnthropicImageSource::Url { url: url.clone() },
            None => {
                warn!("Dropping image with unsupported URL scheme");
                return None;
            }
        },
    };
    Some(AnthropicContentBlock::Image { source })
}

fn to_anthropic_tool_choice(choice: &ToolChoice) -> AnthropicToolChoice {
    match choice {
        ToolChoice::Mode(mode) => match mode.as_str() {
            "none" => AnthropicToolChoice::None,
            "required" | "any" => AnthropicToolChoice::Any,
            _ => AnthropicToolChoice::Auto,
        },
        ToolChoice::Function { function, .. } => AnthropicToolChoice::Tool {
            name: function.name.clone(),
        },
    }
}

pub fn map_stop_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("max_tokens") => FinishReason::Length,
        Some("tool_use") => FinishReason::ToolCalls,
        Some("refusal") => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

pub fn from_anthropic_response(response: AnthropicResponse) -> CompletionResponse {
    let mut text = String::new();
    let mut tool_calls = Vec::new();

    for block in response.content {
        match block {
            AnthropicResponseBlock::Text { text: t } => text.push_str(&t),
            AnthropicResponseBlock::ToolUse { id, name, input } => {
                tool_calls.push(ToolCall::function(id, name, object_to_arguments(&input)));
            }
            AnthropicResponseBlock::Other => {}
        }
    }

    CompletionResponse {
        id: response.id,
        model: response.model,
        created: unix_timestamp(),
        choices: vec![Choice {
            index: 0,
            finish_reason: map_stop_reason(response.stop_reason.as_deref()),
            message: Message {
                role: MessageRole::Assistant,
                content: MessageContent::Text(text),
                name: None,
                function_call: None,
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                tool_call_id: None,
            },
        }],
        usage: response
            .usage
            .map(|u| Usage::new(u.input_tokens, u.output_tokens)),
    }
}
