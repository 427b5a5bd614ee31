//! Assembling streaming deltas into one logical message.
//!
//! A streaming turn arrives as a sequence of partial fragments. The
//! [`MessageAccumulator`] deep-merges them: string fields concatenate,
//! tool-call fragments merge into a slot keyed by their positional index,
//! and the delta's `role` is discarded — the accumulator's role is fixed at
//! turn start and never mutated mid-stream. Pure data manipulation, no
//! suspension.

use std::collections::BTreeMap;

use troupe_core::message::{Message, ToolCallRequest};
use troupe_core::provider::MessageDelta;

/// Accumulates one streamed assistant turn.
#[derive(Debug)]
pub struct MessageAccumulator {
    sender: Option<String>,
    content: String,
    // Keyed by the wire's positional index; BTreeMap keeps finish() ordered.
    tool_calls: BTreeMap<u32, PartialToolCall>,
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl MessageAccumulator {
    /// Start accumulating a turn for the named agent. The resulting
    /// message's role is `assistant`, fixed here.
    pub fn new(sender: impl Into<String>) -> Self {
        Self {
            sender: Some(sender.into()),
            content: String::new(),
            tool_calls: BTreeMap::new(),
        }
    }

    /// Deep-merge one fragment into the accumulator.
    pub fn apply(&mut self, delta: &MessageDelta) {
        // delta.role (and sender stamped onto it) is display-only; the
        // accumulator's identity was fixed at turn start.
        if let Some(content) = &delta.content {
            self.content.push_str(content);
        }

        let Some(fragments) = &delta.tool_calls else {
            return;
        };
        for fragment in fragments {
            let slot = self.tool_calls.entry(fragment.index).or_default();
            if let Some(id) = &fragment.id {
                slot.id.push_str(id);
            }
            if let Some(function) = &fragment.function {
                if let Some(name) = &function.name {
                    slot.name.push_str(name);
                }
                if let Some(arguments) = &function.arguments {
                    slot.arguments.push_str(arguments);
                }
            }
        }
    }

    /// Convert the index-keyed slots into an ordered sequence and produce
    /// the completed message. An empty slot map yields an empty tool-call
    /// list, the one representation of "no tool calls" downstream.
    pub fn finish(self) -> Message {
        let tool_calls: Vec<ToolCallRequest> = self
            .tool_calls
            .into_values()
            .map(|partial| ToolCallRequest {
                id: partial.id,
                name: partial.name,
                arguments: partial.arguments,
            })
            .collect();

        let mut message = Message::assistant(self.content);
        message.sender = self.sender;
        message.tool_calls = tool_calls;
        message
    }
}
