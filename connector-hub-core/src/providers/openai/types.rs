//! OpenAI chat completions wire types
//!
//! Shared with Azure OpenAI, which speaks the same payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Chat completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIRequest {
    pub model: String,
    pub messages: Vec<OpenAIMessage>,

    #[serde(flatten)]
    pub sampling: OpenAISampling,

    #[serde(flatten)]
    pub output_limit: Option<OpenAIOutputLimit>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<OpenAIStreamOptions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<OpenAITool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    /// Legacy function calling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub functions: Option<Vec<OpenAIFunction>>,
}

/// Sampling knobs, sent only when set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenAISampling {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

/// Output cap. Reasoning models reject `max_tokens` and take
/// `max_completion_tokens` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenAIOutputLimit {
    MaxTokens(u32),
    MaxCompletionTokens(u32),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIMessage {
    pub role: String,

    /// Null for assistant turns that only carry tool calls
    #[serde(default)]
    pub content: Option<OpenAIContent>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<OpenAIFunctionCall>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAIToolCall>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// String or array of parts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OpenAIContent {
    Text(String),
    Parts(Vec<OpenAIContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpenAIContentPart {
    Text { text: String },
    ImageUrl { image_url: OpenAIImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIImageUrl {
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIFunctionCall {
    pub name: String,
    /// JSON-encoded string
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIToolCall {
    pub id: String,

    #[serde(rename = "type", default = "function_type")]
    pub tool_type: String,

    pub function: OpenAIFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAITool {
    #[serde(rename = "type")]
    pub tool_type: String,

    pub function: OpenAIFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIFunction {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIStreamOptions {
    pub include_usage: bool,
}

/// Chat completion response. Every field is defaulted so sparse
/// compatible servers still decode.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OpenAIResponse {
    pub id: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<OpenAIChoice>,
    pub usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIChoice {
    #[serde(default)]
    pub index: u32,
    pub message: OpenAIResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OpenAIResponseMessage {
    pub role: Option<String>,
    pub content: Option<String>,
    pub function_call: Option<OpenAIFunctionCall>,
    pub tool_calls: Option<Vec<OpenAIToolCall>>,
}

/// `total_tokens` is recomputed locally
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct OpenAIUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// One record of a chat completion stream
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OpenAIStreamEvent {
    /// Mid-stream failure, delivered as `{"error": {...}}`
    Error { error: Value },
    Chunk(OpenAIStreamChunk),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OpenAIStreamChunk {
    pub id: Option<String>,
    pub choices: Vec<OpenAIStreamChoice>,
    /// Only on the final chunk, with `stream_options.include_usage`
    pub usage: Option<OpenAIUsage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OpenAIStreamChoice {
    pub index: u32,
    pub delta: OpenAIDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OpenAIDelta {
    pub role: Option<String>,
    pub content: Option<String>,
    pub function_call: Option<OpenAIFunctionCallDelta>,
    pub tool_calls: Option<Vec<OpenAIToolCallDelta>>,
}

/// Fragment of a call; `name` arrives once, `arguments` in pieces
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OpenAIFunctionCallDelta {
    pub name: Option<String>,
    pub arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIToolCallDelta {
    /// Position of the call within the assistant turn
    pub index: usize,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<OpenAIFunctionCallDelta>,
}

/// Error envelope: `{"error": {"message", "type", "code", "param"}}`
#[derive(Debug, Deserialize)]
pub struct OpenAIErrorEnvelope {
    pub error: OpenAIErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    /// String on OpenAI, sometimes a number on Azure
    #[serde(default)]
    pub code: Option<Value>,
}

impl OpenAIErrorBody {
    pub fn code_str(&self) -> Option<String> {
        match &self.code {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }
}
