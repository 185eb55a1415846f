//! Conversion between the unified protocol and Gemini `generateContent`

use super::types::*;
use crate::protocol::accumulator::unix_timestamp;
use crate::protocol::{
    Choice, CompletionRequest, CompletionResponse, ContentPart, FinishReason, Message,
    MessageContent, MessageRole, ResponseFormat, ToolCall, ToolChoice, Usage,
};
use crate::providers::error::{ProviderError, ProviderResult};
use crate::providers::transform::{
    arguments_to_object, extract_system_prompt, generate_tool_call_id, is_http_url, merge_consecutive,
    object_to_arguments, parse_data_url, tool_call_names,
};
use serde_json::{json, Value};
use std::collections::HashMap;

const USER_ROLE: &str = "user";
const MODEL_ROLE: &str = "model";

pub fn to_google_request(request: &CompletionRequest) -> GoogleRequest {
    let (system, turns) = extract_system_prompt(&request.messages);
    let names = tool_call_names(&request.messages);

    let contents: Vec<GoogleContent> = turns
        .into_iter()
        .map(|message| to_google_content(message, &names))
        .filter(|content| !content.parts.is_empty())
        .collect();
    let contents = merge_consecutive(
        contents,
        |c| c.role.clone(),
        |last, next| last.parts.extend(next.parts),
    );

    let generation_config = generation_config(request);
    let tools = request.all_tools();

    GoogleRequest {
        contents,
        system_instruction: system.map(|text| GoogleContent {
            role: None,
            parts: vec![GooglePart::text(text)],
        }),
        generation_config: (!generation_config.is_empty()).then_some(generation_config),
        tools: (!tools.is_empty()).then(|| {
            vec![GoogleTool {
                function_declarations: tools
                    .into_iter()
                    .map(|tool| GoogleFunctionDeclaration {
                        name: tool.function.name,
                        description: tool.function.description,
                        parameters: tool.function.parameters,
                    })
                    .collect(),
            }]
        }),
        tool_config: request.tool_choice.as_ref().map(to_tool_config),
    }
}

fn to_google_content(message: &Message, names: &HashMap<&str, &str>) -> GoogleContent {
    match message.role {
        MessageRole::User | MessageRole::System => GoogleContent {
            role: Some(USER_ROLE.to_string()),
            parts: content_parts(&message.content),
        },
        MessageRole::Assistant => {
            let mut parts = content_parts(&message.content);
            for call in message.tool_calls.iter().flatten() {
                parts.push(function_call_part(&call.function.name, &call.function.arguments));
            }
            if let Some(call) = &message.function_call {
                parts.push(function_call_part(&call.name, &call.arguments));
            }
            GoogleContent {
                role: Some(MODEL_ROLE.to_string()),
                parts,
            }
        }
        MessageRole::Tool | MessageRole::Function => {
            // Results are matched to calls by function name
            let name = message
                .tool_call_id
                .as_deref()
                .and_then(|id| names.get(id).copied())
                .or(message.name.as_deref())
                .unwrap_or_default()
                .to_string();
            let text = message.content.text();
            let response = match serde_json::from_str::<Value>(&text) {
                Ok(value @ Value::Object(_)) => value,
                _ => json!({ "content": text }),
            };
            GoogleContent {
                role: Some(USER_ROLE.to_string()),
                parts: vec![GooglePart {
                    function_response: Some(GoogleFunctionResponse { name, response }),
                    ..Default::default()
                }],
            }
        }
    }
}

fn function_call_part(name: &str, arguments: &str) -> GooglePart {
    GooglePart {
        function_call: Some(GoogleFunctionCall {
            name: name.to_string(),
            args: arguments_to_object(arguments),
        }),
        ..Default::default()
    }
}

fn content_parts(content: &MessageContent) -> Vec<GooglePart> {
    match content {
        MessageContent::Text(text) if text.is_empty() => Vec::new(),
        MessageContent::Text(text) => vec![GooglePart::text(text.clone())],
        MessageContent::Parts(parts) => parts.iter().map(content_part).collect(),
    }
}

fn content_part(part: &ContentPart) -> GooglePart {
    match part {
        ContentPart::Text { text } => GooglePart::text(text.clone()),
        ContentPart::ImageBase64 { media_type, data } => GooglePart {
            inline_data: Some(GoogleInlineData {
                mime_type: media_type.clone(),
                data: data.clone(),
            }),
            ..Default::default()
        },
        ContentPart::ImageUrl { url, .. } => match parse_data_url(url) {
            Some(parsed) => GooglePart {
                inline_data: Some(GoogleInlineData {
                    mime_type: parsed.media_type.to_string(),
                    data: parsed.data.to_string(),
                }),
                ..Default::default()
            },
            None => GooglePart {
                file_data: Some(GoogleFileData {
                    mime_type: Some(image_mime_type(url).to_string()),
                    file_uri: url.clone(),
                }),
                ..Default::default()
            },
        },
    }
}

/// `fileData` needs a MIME type; infer it from the URL's extension
fn image_mime_type(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let extension = path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        _ if !is_http_url(url) && !url.starts_with("gs://") => "application/octet-stream",
        _ => "image/jpeg",
    }
}

fn generation_config(request: &CompletionRequest) -> GoogleGenerationConfig {
    let (response_mime_type, response_json_schema) = match &request.response_format {
        Some(ResponseFormat::JsonObject) => (Some("application/json".to_string()), None),
        Some(ResponseFormat::JsonSchema { schema }) => {
            // Accept both a bare schema and an OpenAI-style {name, schema} wrapper
            let schema = schema.get("schema").cloned().unwrap_or_else(|| schema.clone());
            (Some("application/json".to_string()), Some(schema))
        }
        Some(ResponseFormat::Text) | None => (None, None),
    };

    GoogleGenerationConfig {
        temperature: request.temperature,
        top_p: request.top_p,
        max_output_tokens: request.max_tokens,
        stop_sequences: request.stop.clone().filter(|stop| !stop.is_empty()),
        seed: request.seed,
        presence_penalty: request.presence_penalty,
        frequency_penalty: request.frequency_penalty,
        response_mime_type,
        response_json_schema,
    }
}

fn to_tool_config(choice: &ToolChoice) -> GoogleToolConfig {
    let function_calling_config = match choice {
        ToolChoice::Mode(mode) => GoogleFunctionCallingConfig {
            mode: match mode.as_str() {
                "none" => "NONE",
                "required" | "any" => "ANY",
                _ => "AUTO",
            }
            .to_string(),
            allowed_function_names: None,
        },
        ToolChoice::Function { function, .. } => GoogleFunctionCallingConfig {
            mode: "ANY".to_string(),
            allowed_function_names: Some(vec![function.name.clone()]),
        },
    };
    GoogleToolConfig {
        function_calling_config,
    }
}

/// Map a candidate `finishReason`.
///
/// Gemini reports `STOP` for function-call turns too, so `has_tool_calls`
/// decides between `Stop` and `ToolCalls`.
pub fn map_finish_reason(reason: Option<&str>, has_tool_calls: bool) -> FinishReason {
    match reason {
        Some("MAX_TOKENS") => FinishReason::Length,
        Some("SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII") => {
            FinishReason::ContentFilter
        }
        _ if has_tool_calls => FinishReason::ToolCalls,
        _ => FinishReason::Stop,
    }
}

/// Usage only when both sides were reported
pub fn from_google_usage(usage: GoogleUsageMetadata) -> Option<Usage> {
    Some(Usage::new(usage.prompt_token_count?, usage.candidates_token_count?))
}

/// Visible answer text of a candidate; thought summaries are skipped
pub fn answer_text(parts: &[GooglePart]) -> String {
    parts
        .iter()
        .filter(|part| !part.is_thought())
        .filter_map(|part| part.text.as_deref())
        .collect()
}

/// Convert a full response. `model` is left empty when Gemini omits
/// `modelVersion`; the caller fills in the requested model.
pub fn from_google_response(response: GoogleResponse) -> ProviderResult<CompletionResponse> {
    let id = response
        .response_id
        .clone()
        .unwrap_or_else(|| format!("gemini-{}", uuid::Uuid::new_v4().simple()));
    let model = response.model_version.clone().unwrap_or_default();
    let usage = response.usage_metadata.and_then(from_google_usage);

    let choices: Vec<Choice> = if response.candidates.is_empty() {
        // A blocked prompt produces no candidates at all
        let blocked = response
            .prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason.as_deref())
            .is_some();
        if !blocked {
            return Err(ProviderError::Decode(
                "Gemini response contained no candidates".to_string(),
            ));
        }
        vec![Choice {
            index: 0,
            message: Message::assistant(""),
            finish_reason: FinishReason::ContentFilter,
        }]
    } else {
        response
            .candidates
            .into_iter()
            .enumerate()
            .map(|(position, candidate)| to_choice(position, candidate))
            .collect()
    };

    Ok(CompletionResponse {
        id,
        model,
        created: unix_timestamp(),
        choices,
        usage,
    })
}

fn to_choice(position: usize, candidate: GoogleCandidate) -> Choice {
    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
    let text = answer_text(&parts);
    let tool_calls: Vec<ToolCall> = parts
        .into_iter()
        .filter_map(|part| part.function_call)
        .map(|call| ToolCall::function(generate_tool_call_id(), call.name, object_to_arguments(&call.args)))
        .collect();

    Choice {
        index: candidate.index.unwrap_or(position as u32),
        finish_reason: map_finish_reason(candidate.finish_reason.as_deref(), !tool_calls.is_empty()),
        message: Message {
            role: MessageRole::Assistant,
            content: MessageContent::Text(text),
            name: None,
            function_call: None,
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            tool_call_id: None,
        },
    }
}
