//! The turn execution loop.
//!
//! One run drives a conversation through as many turns as it takes: ask the
//! active agent's model for a completion, execute any requested tool calls,
//! apply handoffs, repeat. The loop ends when a turn produces no tool
//! calls, tool execution is disabled, the turn budget is exhausted, or no
//! agent is active. The streaming variant follows the same control flow but
//! consumes raw deltas and re-emits them to its own consumer.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};
use troupe_core::agent::Agent;
use troupe_core::context::{ContextVariables, CONTEXT_VARIABLES_KEY};
use troupe_core::error::Result;
use troupe_core::message::Message;
use troupe_core::provider::{Provider, ProviderRequest, ToolDefinition};

use crate::delta::MessageAccumulator;
use crate::dispatch::dispatch_tool_calls;
use crate::events::RunEvent;

/// Everything a run needs: the starting agent, the prior conversation, and
/// the run-level options.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// The initially active agent.
    pub agent: Agent,

    /// Prior conversation; the run appends beyond this prefix and returns
    /// only the appended slice.
    pub messages: Vec<Message>,

    /// Initial context variables, shared across the whole run.
    pub context_variables: ContextVariables,

    /// Overrides every agent's model when set.
    pub model_override: Option<String>,

    /// Maximum number of messages the run may append. `None` is unbounded.
    /// Measured as history growth beyond the prefix, so tool-result
    /// messages count toward the budget.
    pub max_turns: Option<usize>,

    /// When false, tool calls are recorded in history but never executed;
    /// the run ends after the first completion.
    pub execute_tools: bool,
}

impl RunRequest {
    pub fn new(agent: Agent, messages: Vec<Message>) -> Self {
        Self {
            agent,
            messages,
            context_variables: ContextVariables::new(),
            model_override: None,
            max_turns: None,
            execute_tools: true,
        }
    }

    pub fn with_context_variables(mut self, context_variables: ContextVariables) -> Self {
        self.context_variables = context_variables;
        self
    }

    pub fn with_model_override(mut self, model: impl Into<String>) -> Self {
        self.model_override = Some(model.into());
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = Some(max_turns);
        self
    }

    pub fn with_execute_tools(mut self, execute_tools: bool) -> Self {
        self.execute_tools = execute_tools;
        self
    }
}

/// What a run produced: the appended history slice, the final active agent
/// (None when the run ended without one to resume), and the final context.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub messages: Vec<Message>,
    pub agent: Option<Agent>,
    pub context_variables: ContextVariables,
}

/// The turn engine. Holds the provider plus run-level sampling knobs; all
/// per-run state lives on the stack of one `run` call, so a single `Runner`
/// can serve concurrent runs.
pub struct Runner {
    provider: Arc<dyn Provider>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl Runner {
    /// Create a runner over the given provider.
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Set the sampling temperature for every completion this runner makes.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Cap tokens per completion.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Build the provider request for the active agent: resolved
    /// instructions as the system message, then full history. The
    /// tool-choice hint and parallel-calls flag travel only when the agent
    /// actually has tools.
    fn build_request(
        &self,
        agent: &Agent,
        history: &[Message],
        context: &ContextVariables,
        model_override: Option<&str>,
        stream: bool,
    ) -> ProviderRequest {
        let instructions = agent.instructions.resolve(context);

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Message::system(instructions));
        messages.extend_from_slice(history);

        let tools = advertised_tools(agent);
        let (tool_choice, parallel_tool_calls) = if tools.is_empty() {
            (None, None)
        } else {
            (agent.tool_choice.clone(), Some(agent.parallel_tool_calls))
        };

        ProviderRequest {
            model: model_override.unwrap_or(&agent.model).to_string(),
            messages,
            tools,
            tool_choice,
            parallel_tool_calls,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream,
        }
    }

    /// Run to completion and return the appended history slice, the final
    /// active agent, and the final context variables.
    pub async fn run(&self, request: RunRequest) -> Result<RunResult> {
        let RunRequest {
            agent,
            messages,
            mut context_variables,
            model_override,
            max_turns,
            execute_tools,
        } = request;

        info!(agent = %agent.name, prior_messages = messages.len(), "Starting run");

        let mut active = Some(agent);
        let mut history = messages;
        let prefix_len = history.len();
        let max_turns = max_turns.unwrap_or(usize::MAX);

        // Every iteration appends the completion message before anything
        // else, so the budget check below always sees progress.
        while history.len() - prefix_len < max_turns {
            let Some(agent) = active.as_ref() else { break };

            let provider_request = self.build_request(
                agent,
                &history,
                &context_variables,
                model_override.as_deref(),
                false,
            );
            let response = self.provider.complete(provider_request).await?;

            if let Some(usage) = response.usage {
                debug!(
                    model = %response.model,
                    total_tokens = usage.total_tokens,
                    "Completion usage"
                );
            }

            let message = response.message.with_sender(&agent.name);
            debug!(
                agent = %agent.name,
                tool_calls = message.tool_calls.len(),
                "Received completion"
            );
            let tool_calls = message.tool_calls.clone();
            history.push(message);

            if tool_calls.is_empty() || !execute_tools {
                debug!("No tool calls to execute, ending run");
                break;
            }

            let outcome = dispatch_tool_calls(&tool_calls, agent, &context_variables).await;
            history.extend(outcome.messages);
            context_variables.merge(outcome.context_patch);

            if let Some(next) = outcome.handoff {
                info!(to = %next.name, "Handoff, switching active agent");
                active = Some(next);
            }
        }

        Ok(RunResult {
            messages: history.split_off(prefix_len),
            agent: active,
            context_variables,
        })
    }

    /// Run in streaming mode. The receiver yields every raw delta as it
    /// arrives, bracketed per turn by [`RunEvent::TurnStart`] and
    /// [`RunEvent::TurnEnd`], and terminates with [`RunEvent::Done`]
    /// carrying the same result `run` would return. Dropping the receiver
    /// cancels the run.
    pub fn run_streamed(&self, request: RunRequest) -> mpsc::Receiver<Result<RunEvent>> {
        let (tx, rx) = mpsc::channel(64);
        let provider = Arc::clone(&self.provider);
        let temperature = self.temperature;
        let max_tokens = self.max_tokens;

        tokio::spawn(async move {
            let runner = Runner {
                provider,
                temperature,
                max_tokens,
            };
            if let Err(e) = runner.stream_run(request, &tx).await {
                let _ = tx.send(Err(e)).await;
            }
        });

        rx
    }

    async fn stream_run(
        &self,
        request: RunRequest,
        tx: &mpsc::Sender<Result<RunEvent>>,
    ) -> Result<()> {
        let RunRequest {
            agent,
            messages,
            mut context_variables,
            model_override,
            max_turns,
            execute_tools,
        } = request;

        info!(agent = %agent.name, prior_messages = messages.len(), "Starting streaming run");

        let mut active = Some(agent);
        let mut history = messages;
        let prefix_len = history.len();
        let max_turns = max_turns.unwrap_or(usize::MAX);

        while history.len() - prefix_len < max_turns {
            let Some(agent) = active.as_ref() else { break };

            let provider_request = self.build_request(
                agent,
                &history,
                &context_variables,
                model_override.as_deref(),
                true,
            );

            if tx.send(Ok(RunEvent::TurnStart)).await.is_err() {
                return Ok(()); // consumer gone
            }

            let mut deltas = self.provider.stream(provider_request).await?;
            let mut accumulator = MessageAccumulator::new(&agent.name);

            while let Some(item) = deltas.recv().await {
                let mut delta = item?;
                if delta.role.is_some() {
                    delta.sender = Some(agent.name.clone());
                }
                accumulator.apply(&delta);
                if tx.send(Ok(RunEvent::Delta(delta))).await.is_err() {
                    return Ok(());
                }
            }

            if tx.send(Ok(RunEvent::TurnEnd)).await.is_err() {
                return Ok(());
            }

            let message = accumulator.finish();
            debug!(
                agent = %agent.name,
                tool_calls = message.tool_calls.len(),
                "Assembled streamed completion"
            );
            let tool_calls = message.tool_calls.clone();
            history.push(message);

            if tool_calls.is_empty() || !execute_tools {
                break;
            }

            let outcome = dispatch_tool_calls(&tool_calls, agent, &context_variables).await;
            history.extend(outcome.messages);
            context_variables.merge(outcome.context_patch);

            if let Some(next) = outcome.handoff {
                info!(to = %next.name, "Handoff, switching active agent");
                active = Some(next);
            }
        }

        let result = RunResult {
            messages: history.split_off(prefix_len),
            agent: active,
            context_variables,
        };
        let _ = tx.send(Ok(RunEvent::Done(result))).await;
        Ok(())
    }
}

/// The agent's tools as provider-facing definitions, with the reserved
/// context-variables parameter stripped from both the property map and the
/// required list. The key is implementation-internal, never model-visible.
fn advertised_tools(agent: &Agent) -> Vec<ToolDefinition> {
    agent
        .tools
        .iter()
        .map(|tool| {
            let mut definition = tool.to_definition();
            strip_context_parameter(&mut definition.parameters);
            definition
        })
        .collect()
}

fn strip_context_parameter(schema: &mut serde_json::Value) {
    if let Some(properties) = schema
        .get_mut("properties")
        .and_then(serde_json::Value::as_object_mut)
    {
        properties.remove(CONTEXT_VARIABLES_KEY);
    }
    if let Some(required) = schema
        .get_mut("required")
        .and_then(serde_json::Value::as_array_mut)
    {
        required.retain(|name| name.as_str() != Some(CONTEXT_VARIABLES_KEY));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use troupe_core::message::Role;
    use troupe_core::tool::{FnTool, ToolOutcome};

    fn context_aware_tool() -> FnTool {
        FnTool::new(
            "lookup",
            "Look something up",
            json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "context_variables": { "type": "object" }
                },
                "required": ["query", "context_variables"]
            }),
            |_args| async { Ok(ToolOutcome::text("found")) },
        )
        .with_context()
    }

    #[test]
    fn advertised_schema_never_mentions_context_variables() {
        let agent = Agent::new("A").with_tool(context_aware_tool());
        let tools = advertised_tools(&agent);
        assert_eq!(tools.len(), 1);

        let params = &tools[0].parameters;
        assert!(params["properties"].get(CONTEXT_VARIABLES_KEY).is_none());
        assert!(params["properties"].get("query").is_some());
        let required = params["required"].as_array().unwrap();
        assert_eq!(required.len(), 1);
        assert_eq!(required[0], "query");
    }

    #[test]
    fn request_has_system_message_first_and_override_model() {
        let runner = Runner::new(Arc::new(NullProvider)).with_temperature(0.2);
        let agent = Agent::new("A").with_instructions("Be terse.");
        let history = vec![Message::user("hi")];

        let request = runner.build_request(
            &agent,
            &history,
            &ContextVariables::new(),
            Some("gpt-4o-mini"),
            false,
        );

        assert_eq!(request.model, "gpt-4o-mini");
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[0].content, "Be terse.");
        assert_eq!(request.temperature, Some(0.2));
        // No tools — no tool-choice hint, no parallel flag.
        assert!(request.tool_choice.is_none());
        assert!(request.parallel_tool_calls.is_none());
    }

    #[test]
    fn tool_flags_travel_only_with_tools() {
        let runner = Runner::new(Arc::new(NullProvider));
        let agent = Agent::new("A")
            .with_tool(context_aware_tool())
            .with_tool_choice("auto")
            .with_parallel_tool_calls(false);

        let request =
            runner.build_request(&agent, &[], &ContextVariables::new(), None, false);
        assert_eq!(request.tool_choice.as_deref(), Some("auto"));
        assert_eq!(request.parallel_tool_calls, Some(false));
        assert_eq!(request.model, "gpt-4");
    }

    #[test]
    fn dynamic_instructions_resolve_per_request() {
        let runner = Runner::new(Arc::new(NullProvider));
        let agent = Agent::new("A").with_dynamic_instructions(|ctx| {
            format!(
                "Plan tier: {}",
                ctx.get("plan").and_then(|v| v.as_str()).unwrap_or("free")
            )
        });

        let mut context = ContextVariables::new();
        context.insert("plan", json!("pro"));
        let request = runner.build_request(&agent, &[], &context, None, false);
        assert_eq!(request.messages[0].content, "Plan tier: pro");
    }

    struct NullProvider;

    #[async_trait::async_trait]
    impl Provider for NullProvider {
        fn name(&self) -> &str {
            "null"
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> std::result::Result<
            troupe_core::provider::ProviderResponse,
            troupe_core::error::ProviderError,
        > {
            Ok(troupe_core::provider::ProviderResponse {
                message: Message::assistant("ok"),
                usage: None,
                model: request.model,
            })
        }
    }
}
