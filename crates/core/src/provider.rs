//! Provider trait — the abstraction over completion backends.
//!
//! A Provider knows how to send a conversation to a model and get a
//! response back, either as one complete assistant message or as a lazy
//! sequence of raw streaming deltas. Delta assembly is deliberately NOT a
//! provider concern: the engine merges fragments itself so it can forward
//! every raw delta to its consumer for live display.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::{Message, ToolCallRequest};

/// A completion request as the engine builds it for the active agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (run-level override already applied).
    pub model: String,

    /// System message from the resolved instructions, followed by history.
    pub messages: Vec<Message>,

    /// Tools advertised to the model. Empty means none are sent.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Preferred tool-choice hint. Only meaningful when tools are present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,

    /// Whether the model may request independent tool calls in parallel.
    /// Set only when tools are non-empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,

    /// Sampling temperature; provider default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate; provider default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Whether to stream the response.
    #[serde(default)]
    pub stream: bool,
}

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema describing the tool's parameters.
    pub parameters: serde_json::Value,
}

/// A complete (non-streaming) response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The first choice's message.
    pub message: Message,

    /// Token usage statistics, when the provider reports them.
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested).
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One raw fragment of a streaming response, forwarded verbatim from the
/// provider's wire format. Any field may be absent; the engine's merger
/// assembles fragments into a complete [`Message`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageDelta {
    /// Role, present on the first fragment of a turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Producing agent's name; stamped by the engine on role-bearing
    /// fragments, never sent by providers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,

    /// Partial content text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Partial tool-call fragments, each addressed by position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

/// A positional fragment of an in-progress tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallDelta {
    /// Which tool-call slot this fragment belongs to.
    pub index: u32,

    /// Call id, present on the slot's first fragment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionDelta>,
}

/// Partial function name / argument text within a tool-call fragment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// Receiver half of a streaming response: a finite sequence of deltas that
/// ends when the channel closes.
pub type DeltaStream =
    tokio::sync::mpsc::Receiver<std::result::Result<MessageDelta, ProviderError>>;

/// The core Provider trait.
///
/// The engine calls `complete()` or `stream()` without knowing which
/// backend is in use.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g. "openai", "ollama").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Send a request and get a stream of raw deltas.
    ///
    /// Default implementation calls `complete()` and replays the result as
    /// a single delta, so non-streaming backends still work in streaming
    /// runs.
    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<DeltaStream, ProviderError> {
        let response = self.complete(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx.send(Ok(message_as_delta(&response.message))).await;
        Ok(rx)
    }
}

/// Replay a complete message as one delta carrying everything.
pub fn message_as_delta(message: &Message) -> MessageDelta {
    let tool_calls: Vec<ToolCallDelta> = message
        .tool_calls
        .iter()
        .enumerate()
        .map(|(index, tc)| tool_call_as_delta(index as u32, tc))
        .collect();

    MessageDelta {
        role: Some("assistant".into()),
        sender: None,
        content: if message.content.is_empty() {
            None
        } else {
            Some(message.content.clone())
        },
        tool_calls: if tool_calls.is_empty() {
            None
        } else {
            Some(tool_calls)
        },
    }
}

/// A whole tool call as one positional fragment.
pub fn tool_call_as_delta(index: u32, call: &ToolCallRequest) -> ToolCallDelta {
    ToolCallDelta {
        index,
        id: Some(call.id.clone()),
        function: Some(FunctionDelta {
            name: Some(call.name.clone()),
            arguments: Some(call.arguments.clone()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    struct EchoProvider;

    #[async_trait]
    impl Provider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            let last = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(ProviderResponse {
                message: Message::assistant(last),
                usage: None,
                model: request.model,
            })
        }
    }

    #[tokio::test]
    async fn default_stream_replays_complete_response() {
        let provider = EchoProvider;
        let request = ProviderRequest {
            model: "test-model".into(),
            messages: vec![Message::user("hello")],
            tools: vec![],
            tool_choice: None,
            parallel_tool_calls: None,
            temperature: None,
            max_tokens: None,
            stream: true,
        };

        let mut rx = provider.stream(request).await.unwrap();
        let delta = rx.recv().await.unwrap().unwrap();
        assert_eq!(delta.role.as_deref(), Some("assistant"));
        assert_eq!(delta.content.as_deref(), Some("hello"));
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn whole_message_roundtrips_through_delta_shape() {
        let mut msg = Message::assistant("");
        msg.tool_calls = vec![ToolCallRequest {
            id: "call_1".into(),
            name: "add_numbers".into(),
            arguments: r#"{"a":2,"b":3}"#.into(),
        }];

        let delta = message_as_delta(&msg);
        assert!(delta.content.is_none());
        let tcs = delta.tool_calls.unwrap();
        assert_eq!(tcs.len(), 1);
        assert_eq!(tcs[0].index, 0);
        assert_eq!(tcs[0].id.as_deref(), Some("call_1"));
        assert_eq!(
            tcs[0].function.as_ref().unwrap().name.as_deref(),
            Some("add_numbers")
        );
    }
}
