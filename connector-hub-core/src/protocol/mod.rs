//! Protocol module for the unified LLM data model
//!
//! These types are what callers see regardless of vendor:
//! - Requests and complete responses
//! - Incremental stream chunks and their accumulator
//! - Tool calls, usage and finish reasons

pub mod accumulator;
pub mod types;

pub use accumulator::StreamAccumulator;
pub use types::{
    Choice, CompletionRequest, CompletionResponse, ContentPart, FinishReason, FunctionCall,
    FunctionCallDelta, FunctionChoice, FunctionDefinition, Message, MessageBuilder,
    MessageContent, MessageRole, ResponseFormat, StreamChunk, ToolCall, ToolCallDelta, ToolChoice,
    ToolDefinition, Usage,
};
