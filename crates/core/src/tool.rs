//! Tool trait — the abstraction over agent capabilities.
//!
//! Tools are what let an agent act: compute something, call a service, or
//! hand the conversation to another agent. Every tool declares its schema
//! explicitly — nothing is inferred from function signatures — and returns
//! a [`ToolOutcome`], the tagged union the dispatcher normalizes exactly
//! once so the engine never branches on raw return shapes.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{json, Value};

use crate::agent::Agent;
use crate::context::ContextVariables;
use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// What a tool invocation produced.
///
/// Three shapes are legal, mirroring what agent tools naturally want to
/// return: a plain value for the model, a structured [`ToolResult`] when the
/// tool also patches context or triggers a handoff, or an [`Agent`] as a
/// bare handoff.
#[derive(Debug, Clone)]
pub enum ToolOutcome {
    /// A plain value; stringified before it is shown to the model.
    Plain(Value),
    /// A fully-specified result.
    Structured(ToolResult),
    /// Transfer control of the conversation to another agent.
    Handoff(Agent),
}

impl ToolOutcome {
    /// A plain text outcome.
    pub fn text(value: impl Into<String>) -> Self {
        ToolOutcome::Plain(Value::String(value.into()))
    }

    /// A plain outcome from any serializable value.
    ///
    /// Serialization failure here is a programming error in the tool (the
    /// "bad return type" case) and is reported as such, not as a normal
    /// execution failure.
    pub fn plain<T: serde::Serialize>(tool_name: &str, value: T) -> Result<Self, ToolError> {
        let value = serde_json::to_value(value).map_err(|e| ToolError::BadReturnValue {
            tool_name: tool_name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(ToolOutcome::Plain(value))
    }

    /// Normalize into a [`ToolResult`]. This is the single place the
    /// three-way polymorphism collapses; a handoff becomes an announcement
    /// value plus the target agent.
    pub fn into_tool_result(self) -> ToolResult {
        match self {
            ToolOutcome::Plain(value) => ToolResult::value(stringify_value(value)),
            ToolOutcome::Structured(result) => result,
            ToolOutcome::Handoff(agent) => {
                let value = format!("Transferring to {}", agent.name);
                ToolResult::value(value).with_agent(agent)
            }
        }
    }
}

impl From<ToolResult> for ToolOutcome {
    fn from(result: ToolResult) -> Self {
        ToolOutcome::Structured(result)
    }
}

impl From<Agent> for ToolOutcome {
    fn from(agent: Agent) -> Self {
        ToolOutcome::Handoff(agent)
    }
}

/// Strings pass through verbatim; every other JSON value is rendered as
/// compact JSON text.
fn stringify_value(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// The normalized result of a tool execution.
#[derive(Debug, Clone, Default)]
pub struct ToolResult {
    /// Payload returned to the model as the tool-role message content.
    pub value: String,

    /// Partial patch merged into the run's context variables.
    pub context_variables: ContextVariables,

    /// When set, control transfers to this agent.
    pub agent: Option<Agent>,
}

impl ToolResult {
    /// A result carrying only a value.
    pub fn value(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    /// Attach a context-variables patch.
    pub fn with_context_variables(mut self, patch: ContextVariables) -> Self {
        self.context_variables = patch;
        self
    }

    /// Attach a handoff target.
    pub fn with_agent(mut self, agent: Agent) -> Self {
        self.agent = Some(agent);
        self
    }
}

/// The core Tool trait.
///
/// Implementations may have arbitrary side effects; the dispatcher's job is
/// structured containment of their result or failure, not sandboxing.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool within its agent's tool set. Must match
    /// the identifier advertised to the provider, or dispatch fails the call.
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str {
        ""
    }

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {}, "required": [] })
    }

    /// Whether the run's context variables should be injected into this
    /// tool's arguments under [`CONTEXT_VARIABLES_KEY`]. The key is stripped
    /// from the advertised schema either way.
    ///
    /// [`CONTEXT_VARIABLES_KEY`]: crate::context::CONTEXT_VARIABLES_KEY
    fn needs_context(&self) -> bool {
        false
    }

    /// Invoke the tool with parsed arguments.
    async fn call(&self, arguments: Value) -> Result<ToolOutcome, ToolError>;

    /// Convert this tool into a definition for the provider.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

type ToolFuture = BoxFuture<'static, Result<ToolOutcome, ToolError>>;

/// A tool backed by a closure, with an explicitly declared schema.
pub struct FnTool {
    name: String,
    description: String,
    parameters: Value,
    needs_context: bool,
    f: Arc<dyn Fn(Value) -> ToolFuture + Send + Sync>,
}

impl FnTool {
    /// Create a tool from a name, description, parameter schema, and an
    /// async closure over the parsed arguments.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        f: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<ToolOutcome, ToolError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            needs_context: false,
            f: Arc::new(move |args| Box::pin(f(args))),
        }
    }

    /// Mark this tool as context-aware: the run's context variables are
    /// injected into its arguments under the reserved key.
    pub fn with_context(mut self) -> Self {
        self.needs_context = true;
        self
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.parameters.clone()
    }

    fn needs_context(&self) -> bool {
        self.needs_context
    }

    async fn call(&self, arguments: Value) -> Result<ToolOutcome, ToolError> {
        (self.f)(arguments).await
    }
}

impl std::fmt::Debug for FnTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("needs_context", &self.needs_context)
            .finish()
    }
}

/// Build a handoff tool targeting `agent`.
///
/// The tool is named `transfer_to_<agent name>` (lowercased, spaces to
/// underscores) and returns the agent as a [`ToolOutcome::Handoff`]. The
/// description tells the calling agent when the transfer is appropriate.
pub fn handoff_to(agent: Agent, description: impl Into<String>) -> FnTool {
    let tool_name = format!(
        "transfer_to_{}",
        agent.name.to_lowercase().replace(char::is_whitespace, "_")
    );
    let description = description.into();
    FnTool::new(
        tool_name,
        description,
        json!({ "type": "object", "properties": {}, "required": [] }),
        move |_args| {
            let agent = agent.clone();
            async move { Ok(ToolOutcome::Handoff(agent)) }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_string_passes_through() {
        let result = ToolOutcome::text("sum=5").into_tool_result();
        assert_eq!(result.value, "sum=5");
        assert!(result.agent.is_none());
        assert!(result.context_variables.is_empty());
    }

    #[test]
    fn plain_json_is_rendered_compact() {
        let result = ToolOutcome::Plain(json!({ "ok": true })).into_tool_result();
        assert_eq!(result.value, r#"{"ok":true}"#);
    }

    #[test]
    fn handoff_becomes_transfer_announcement() {
        let target = Agent::new("Refunds");
        let result = ToolOutcome::Handoff(target).into_tool_result();
        assert_eq!(result.value, "Transferring to Refunds");
        assert_eq!(result.agent.as_ref().map(|a| a.name.as_str()), Some("Refunds"));
    }

    #[test]
    fn structured_result_passes_through() {
        let mut patch = ContextVariables::new();
        patch.insert("seen", json!(true));
        let result = ToolOutcome::Structured(
            ToolResult::value("done").with_context_variables(patch.clone()),
        )
        .into_tool_result();
        assert_eq!(result.value, "done");
        assert_eq!(result.context_variables, patch);
    }

    #[tokio::test]
    async fn fn_tool_invokes_closure() {
        let tool = FnTool::new(
            "add_numbers",
            "Add two numbers",
            json!({
                "type": "object",
                "properties": {
                    "a": { "type": "number" },
                    "b": { "type": "number" }
                },
                "required": ["a", "b"]
            }),
            |args: Value| async move {
                let a = args["a"].as_f64().unwrap_or_default();
                let b = args["b"].as_f64().unwrap_or_default();
                Ok(ToolOutcome::text(format!("sum={}", a + b)))
            },
        );

        let outcome = tool.call(json!({ "a": 2, "b": 3 })).await.unwrap();
        assert_eq!(outcome.into_tool_result().value, "sum=5");
        assert_eq!(tool.to_definition().name, "add_numbers");
    }

    #[tokio::test]
    async fn handoff_tool_names_and_returns_target() {
        let tool = handoff_to(Agent::new("Tech Support"), "Technical questions");
        assert_eq!(tool.name(), "transfer_to_tech_support");

        let outcome = tool.call(json!({})).await.unwrap();
        match outcome {
            ToolOutcome::Handoff(agent) => assert_eq!(agent.name, "Tech Support"),
            other => panic!("expected handoff, got {other:?}"),
        }
    }

    #[test]
    fn bad_return_value_is_distinct() {
        // JSON object keys must be strings; a tuple-keyed map cannot
        // serialize and is surfaced as the bad-return-type error, not an
        // execution failure.
        let mut weird = std::collections::BTreeMap::new();
        weird.insert((1u8, 2u8), "value");
        let err = ToolOutcome::plain("measure", weird).unwrap_err();
        assert!(matches!(err, ToolError::BadReturnValue { .. }));
    }
}
