//! Block-lifecycle stream handling
//!
//! Content blocks are addressed by the vendor's block index. Tool-use blocks
//! are renumbered into a dense tool-call index so unified consumers see
//! tool calls 0, 1, 2… regardless of interleaved text blocks.

use super::converter::map_stop_reason;
use super::types::{AnthropicStreamBlock, AnthropicStreamDelta, AnthropicStreamEvent};
use crate::protocol::{MessageRole, StreamChunk, ToolCallDelta, Usage};
use crate::providers::error::{ErrorTable, ProviderError, ProviderResult, RawError};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
enum Block {
    Text(String),
    ToolUse {
        tool_index: usize,
        id: String,
        name: String,
        input_json: String,
    },
    Other,
}

#[derive(Debug, Clone, PartialEq)]
struct BlockState {
    block: Block,
    open: bool,
}

/// Per-stream state for a block-lifecycle stream
#[derive(Debug, Default)]
pub struct AnthropicStreamState {
    message_id: Option<String>,
    model: Option<String>,
    input_tokens: Option<u32>,
    blocks: BTreeMap<usize, BlockState>,
    next_tool_index: usize,
}

impl AnthropicStreamState {
    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Blocks started but not yet stopped
    pub fn open_blocks(&self) -> usize {
        self.blocks.values().filter(|b| b.open).count()
    }

    /// Text accumulated for the block at `index`
    pub fn block_text(&self, index: usize) -> Option<&str> {
        match &self.blocks.get(&index)?.block {
            Block::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Raw input JSON accumulated for the tool-use block at `index`
    pub fn tool_input(&self, index: usize) -> Option<&str> {
        match &self.blocks.get(&index)?.block {
            Block::ToolUse { input_json, .. } => Some(input_json),
            _ => None,
        }
    }

    fn start_tool(&mut self, index: usize, id: String, name: String) -> usize {
        let tool_index = self.next_tool_index;
        self.next_tool_index += 1;
        self.blocks.insert(
            index,
            BlockState {
                block: Block::ToolUse {
                    tool_index,
                    id,
                    name,
                    input_json: String::new(),
                },
                open: true,
            },
        );
        tool_index
    }
}

pub fn transform_event(
    errors: &ErrorTable,
    event: AnthropicStreamEvent,
    state: &mut AnthropicStreamState,
) -> ProviderResult<Option<StreamChunk>> {
    let chunk = match event {
        AnthropicStreamEvent::MessageStart { message } => {
            state.message_id = Some(message.id);
            state.model = Some(message.model);
            state.input_tokens = message.usage.map(|u| u.input_tokens);
            Some(StreamChunk {
                role: Some(MessageRole::Assistant),
                ..Default::default()
            })
        }

        AnthropicStreamEvent::ContentBlockStart {
            index,
            content_block,
        } => match content_block {
            AnthropicStreamBlock::Text { text } => {
                let chunk = (!text.is_empty()).then(|| StreamChunk::content(text.clone()));
                state.blocks.insert(
                    index,
                    BlockState {
                        block: Block::Text(text),
                        open: true,
                    },
                );
                chunk
            }
            AnthropicStreamBlock::ToolUse { id, name } => {
                let tool_index = state.start_tool(index, id.clone(), name.clone());
                Some(StreamChunk::tool_call(ToolCallDelta {
                    index: tool_index,
                    id: Some(id),
                    name: Some(name),
                    arguments: None,
                }))
            }
            AnthropicStreamBlock::Other => {
                state.blocks.insert(
                    index,
                    BlockState {
                        block: Block::Other,
                        open: true,
                    },
                );
                None
            }
        },

        AnthropicStreamEvent::ContentBlockDelta { index, delta } => match delta {
            AnthropicStreamDelta::TextDelta { text } => {
                let entry = state.blocks.entry(index).or_insert_with(|| BlockState {
                    block: Block::Text(String::new()),
                    open: true,
                });
                match &mut entry.block {
                    Block::Text(buffer) => buffer.push_str(&text),
                    _ => warn!("Text delta for non-text block {}", index),
                }
                (!text.is_empty()).then(|| StreamChunk::content(text))
            }
            AnthropicStreamDelta::InputJsonDelta { partial_json } => {
                match state.blocks.get_mut(&index).map(|b| &mut b.block) {
                    Some(Block::ToolUse {
                        tool_index,
                        input_json,
                        ..
                    }) => {
                        input_json.push_str(&partial_json);
                        (!partial_json.is_empty()).then(|| {
                            StreamChunk::tool_call(ToolCallDelta {
                                index: *tool_index,
                                id: None,
                                name: None,
                                arguments: Some(partial_json),
                            })
                        })
                    }
                    _ => {
                        warn!("Input JSON delta for block {} without an open tool_use block", index);
                        None
                    }
                }
            }
            AnthropicStreamDelta::Other => None,
        },

        AnthropicStreamEvent::ContentBlockStop { index } => match state.blocks.get_mut(&index) {
            Some(block) => {
                block.open = false;
                match &mut block.block {
                    // A call without arguments still carries an empty object
                    Block::ToolUse {
                        tool_index,
                        input_json,
                        ..
                    } if input_json.is_empty() => {
                        input_json.push_str("{}");
                        Some(StreamChunk::tool_call(ToolCallDelta {
                            index: *tool_index,
                            id: None,
                            name: None,
                            arguments: Some("{}".to_string()),
                        }))
                    }
                    Block::ToolUse { name, input_json, .. } => {
                        if serde_json::from_str::<serde_json::Value>(input_json.as_str()).is_err() {
                            warn!("Tool {} closed with incomplete input JSON", name);
                        }
                        None
                    }
                    _ => None,
                }
            }
            None => None,
        },

        AnthropicStreamEvent::MessageDelta { delta, usage } => {
            let usage = usage.and_then(|u| {
                let input = u.input_tokens.or(state.input_tokens);
                if input.is_none() {
                    debug!("Dropping usage without an input token count");
                }
                input.map(|input| Usage::new(input, u.output_tokens))
            });
            Some(StreamChunk {
                finish_reason: Some(map_stop_reason(delta.stop_reason.as_deref())),
                usage,
                ..Default::default()
            })
        }

        AnthropicStreamEvent::MessageStop | AnthropicStreamEvent::Ping => None,

        AnthropicStreamEvent::Error { error } => {
            let payload = json!({"type": "error", "error": error});
            return Err(ProviderError::from(errors.map(RawError::Payload(&payload))));
        }

        AnthropicStreamEvent::Unknown => {
            debug!("Ignoring unknown stream event");
            None
        }
    };

    Ok(chunk)
}
