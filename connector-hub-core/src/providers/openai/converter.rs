//! Conversion between the unified protocol and OpenAI chat completions

use super::types::*;
use crate::protocol::{
    Choice, CompletionRequest, CompletionResponse, ContentPart, FinishReason, FunctionCall,
    FunctionDefinition, Message, MessageContent, MessageRole, ResponseFormat, ToolCall, ToolChoice,
    ToolDefinition, Usage,
};
use crate::providers::error::{ProviderError, ProviderResult};
use crate::providers::transform::to_data_url;
use serde_json::{json, Value};

/// Model families that take `max_completion_tokens` instead of `max_tokens`
const REASONING_FAMILIES: &[&str] = &["o1", "o3", "o4", "gpt-5"];

pub fn is_reasoning_model(model: &str) -> bool {
    REASONING_FAMILIES.iter().any(|family| {
        model == *family
            || model
                .strip_prefix(family)
                .is_some_and(|rest| rest.starts_with('-'))
    })
}

/// Convert a unified request to OpenAI format
pub fn to_openai_request(request: &CompletionRequest, stream: bool) -> OpenAIRequest {
    let output_limit = request.max_tokens.map(|limit| {
        if is_reasoning_model(&request.model) {
            OpenAIOutputLimit::MaxCompletionTokens(limit)
        } else {
            OpenAIOutputLimit::MaxTokens(limit)
        }
    });

    OpenAIRequest {
        model: request.model.clone(),
        messages: request.messages.iter().map(to_openai_message).collect(),
        sampling: OpenAISampling {
            temperature: request.temperature,
            top_p: request.top_p,
            frequency_penalty: request.frequency_penalty,
            presence_penalty: request.presence_penalty,
            seed: request.seed,
            stop: request.stop.clone(),
        },
        output_limit,
        stream: stream.then_some(true),
        stream_options: stream.then_some(OpenAIStreamOptions {
            include_usage: true,
        }),
        user: request.user.clone(),
        response_format: request.response_format.as_ref().map(to_openai_response_format),
        tools: request
            .tools
            .as_ref()
            .map(|tools| tools.iter().map(to_openai_tool).collect()),
        tool_choice: request.tool_choice.as_ref().map(to_openai_tool_choice),
        functions: request
            .functions
            .as_ref()
            .map(|functions| functions.iter().map(to_openai_function).collect()),
    }
}

fn to_openai_message(message: &Message) -> OpenAIMessage {
    let tool_calls = message.tool_calls.as_ref().filter(|calls| !calls.is_empty());

    // Assistant turns that only invoke tools send `content: null`
    let content = if tool_calls.is_some() && message.content.is_empty() {
        None
    } else {
        Some(to_openai_content(&message.content))
    };

    OpenAIMessage {
        role: message.role.as_str().to_string(),
        content,
        name: message.name.clone(),
        function_call: message.function_call.as_ref().map(|fc| OpenAIFunctionCall {
            name: fc.name.clone(),
            arguments: fc.arguments.clone(),
        }),
        tool_calls: tool_calls.map(|calls| {
            calls
                .iter()
                .map(|tc| OpenAIToolCall {
                    id: tc.id.clone(),
                    tool_type: tc.tool_type.clone(),
                    function: OpenAIFunctionCall {
                        name: tc.function.name.clone(),
                        arguments: tc.function.arguments.clone(),
                    },
                })
                .collect()
        }),
        tool_call_id: message.tool_call_id.clone(),
    }
}

fn to_openai_content(content: &MessageContent) -> OpenAIContent {
    match content {
        MessageContent::Text(text) => OpenAIContent::Text(text.clone()),
        MessageContent::Parts(parts) => OpenAIContent::Parts(
            parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => OpenAIContentPart::Text { text: text.clone() },
                    ContentPart::ImageUrl { url, detail } => OpenAIContentPart::ImageUrl {
                        image_url: OpenAIImageUrl {
                            url: url.clone(),
                            detail: detail.clone(),
                        },
                    },
                    ContentPart::ImageBase64 { media_type, data } => OpenAIContentPart::ImageUrl {
                        image_url: OpenAIImageUrl {
                            url: to_data_url(media_type, data),
                            detail: None,
                        },
                    },
                })
                .collect(),
        ),
    }
}

fn to_openai_response_format(format: &ResponseFormat) -> Value {
    match format {
        ResponseFormat::Text => json!({"type": "text"}),
        ResponseFormat::JsonObject => json!({"type": "json_object"}),
        ResponseFormat::JsonSchema { schema } => json!({
            "type": "json_schema",
            "json_schema": schema,
        }),
    }
}

fn to_openai_function(function: &FunctionDefinition) -> OpenAIFunction {
    OpenAIFunction {
        name: function.name.clone(),
        description: function.description.clone(),
        parameters: function.parameters.clone(),
    }
}

fn to_openai_tool(tool: &ToolDefinition) -> OpenAITool {
    OpenAITool {
        tool_type: tool.tool_type.clone(),
        function: to_openai_function(&tool.function),
    }
}

fn to_openai_tool_choice(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Mode(mode) => json!(mode),
        ToolChoice::Function { function, .. } => json!({
            "type": "function",
            "function": {"name": function.name},
        }),
    }
}

/// Finish reasons map 1:1; anything unrecognized is `stop`
pub fn map_finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("length") => FinishReason::Length,
        Some("function_call") => FinishReason::FunctionCall,
        Some("tool_calls") => FinishReason::ToolCalls,
        Some("content_filter") => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

pub fn parse_role(role: &str) -> MessageRole {
    match role {
        "system" => MessageRole::System,
        "user" => MessageRole::User,
        "function" => MessageRole::Function,
        "tool" => MessageRole::Tool,
        _ => MessageRole::Assistant,
    }
}

pub fn from_openai_usage(usage: OpenAIUsage) -> Usage {
    Usage::new(usage.prompt_tokens, usage.completion_tokens)
}

/// Convert an OpenAI response to the unified format
pub fn from_openai_response(response: OpenAIResponse) -> ProviderResult<CompletionResponse> {
    if response.choices.is_empty() {
        return Err(ProviderError::Decode(
            "chat completion contained no choices".to_string(),
        ));
    }

    Ok(CompletionResponse {
        id: response.id,
        model: response.model,
        created: response.created,
        choices: response.choices.into_iter().map(from_openai_choice).collect(),
        usage: response.usage.map(from_openai_usage),
    })
}

fn from_openai_choice(choice: OpenAIChoice) -> Choice {
    let message = choice.message;
    Choice {
        index: choice.index,
        finish_reason: map_finish_reason(choice.finish_reason.as_deref()),
        message: Message {
            role: message.role.as_deref().map(parse_role).unwrap_or(MessageRole::Assistant),
            content: MessageContent::Text(message.content.unwrap_or_default()),
            name: None,
            function_call: message.function_call.map(|fc| FunctionCall {
                name: fc.name,
                arguments: fc.arguments,
            }),
            tool_calls: message
                .tool_calls
                .filter(|calls| !calls.is_empty())
                .map(|calls| {
                    calls
                        .into_iter()
                        .map(|tc| ToolCall::function(tc.id, tc.function.name, tc.function.arguments))
                        .collect()
                }),
            tool_call_id: None,
        },
    }
}
