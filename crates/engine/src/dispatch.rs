//! Tool dispatch.
//!
//! Resolves each requested tool call against the active agent's tool set,
//! parses arguments, injects context variables where a tool asks for them,
//! invokes the implementation, and normalizes whatever came back into a
//! uniform [`ToolResult`]. Every per-call problem — unknown tool, bad
//! arguments, execution failure, unsupported return value — becomes a
//! tool-role message in the conversation instead of an error out of
//! dispatch, so the model always sees a coherent transcript.
//!
//! Handoff policy: the first result carrying an agent short-circuits the
//! rest of the batch. Remaining calls are not executed; their requests stay
//! visible in the assistant message, but only dispatched calls get tool
//! messages.

use serde_json::Value;
use tracing::{debug, error, warn};
use troupe_core::agent::Agent;
use troupe_core::context::{ContextVariables, CONTEXT_VARIABLES_KEY};
use troupe_core::error::ToolError;
use troupe_core::message::{Message, ToolCallRequest};

/// What one batch of tool calls produced.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// Tool-role messages, in dispatch order.
    pub messages: Vec<Message>,

    /// Accumulated context patch; later results overwrite earlier ones
    /// per key.
    pub context_patch: ContextVariables,

    /// Set when a result carried a handoff target.
    pub handoff: Option<Agent>,
}

/// Dispatch a batch of tool calls sequentially, in request order.
pub async fn dispatch_tool_calls(
    calls: &[ToolCallRequest],
    agent: &Agent,
    context: &ContextVariables,
) -> DispatchOutcome {
    let mut outcome = DispatchOutcome::default();

    for call in calls {
        let Some(tool) = agent.find_tool(&call.name) else {
            warn!(tool = %call.name, agent = %agent.name, "Requested tool not found");
            outcome.messages.push(Message::tool_result(
                &call.id,
                format!("Error: Tool {} not found.", call.name),
            ));
            continue;
        };

        let mut arguments = match parse_arguments(&call.arguments) {
            Ok(args) => args,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool call arguments failed to parse");
                outcome.messages.push(Message::tool_result(
                    &call.id,
                    format!("Error: Invalid arguments for {}: {e}", call.name),
                ));
                continue;
            }
        };

        // Context injection happens after the schema was advertised without
        // the reserved key, so the model can never have set it itself.
        if tool.needs_context() {
            if let Some(object) = arguments.as_object_mut() {
                object.insert(CONTEXT_VARIABLES_KEY.to_string(), context.to_value());
            }
        }

        debug!(tool = %call.name, call_id = %call.id, "Dispatching tool call");

        let result = match tool.call(arguments).await {
            Ok(raw) => raw.into_tool_result(),
            Err(e @ ToolError::BadReturnValue { .. }) => {
                // Programming error in the tool, kept distinct from a normal
                // execution failure for diagnostics.
                error!(tool = %call.name, error = %e, "Tool returned an uncoercible value");
                outcome
                    .messages
                    .push(Message::tool_result(&call.id, format!("Error: {e}")));
                continue;
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                outcome.messages.push(Message::tool_result(
                    &call.id,
                    format!("Error executing {}: {e}", call.name),
                ));
                continue;
            }
        };

        outcome
            .messages
            .push(Message::tool_result(&call.id, &result.value));
        outcome.context_patch.merge(result.context_variables);

        if let Some(next_agent) = result.agent {
            debug!(tool = %call.name, to = %next_agent.name, "Handoff detected");
            outcome.handoff = Some(next_agent);
            // Short-circuit: the transfer is decided; remaining calls in
            // this batch are skipped.
            break;
        }
    }

    outcome
}

/// Parse a call's argument payload. The empty string counts as an empty
/// object — some providers send no argument text for zero-parameter tools.
fn parse_arguments(raw: &str) -> Result<Value, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use troupe_core::tool::{FnTool, ToolOutcome, ToolResult};

    fn call(id: &str, name: &str, arguments: &str) -> ToolCallRequest {
        ToolCallRequest {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    fn adder() -> FnTool {
        FnTool::new(
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
        )
    }

    #[tokio::test]
    async fn executes_calls_in_order() {
        let agent = Agent::new("A").with_tool(adder());
        let calls = vec![
            call("call_1", "add_numbers", r#"{"a":2,"b":3}"#),
            call("call_2", "add_numbers", r#"{"a":10,"b":20}"#),
        ];

        let outcome = dispatch_tool_calls(&calls, &agent, &ContextVariables::new()).await;
        assert_eq!(outcome.messages.len(), 2);
        assert_eq!(outcome.messages[0].content, "sum=5");
        assert_eq!(outcome.messages[0].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(outcome.messages[1].content, "sum=30");
        assert!(outcome.handoff.is_none());
    }

    #[tokio::test]
    async fn missing_tool_becomes_error_message() {
        let agent = Agent::new("A");
        let calls = vec![call("call_1", "does_not_exist", "{}")];

        let outcome = dispatch_tool_calls(&calls, &agent, &ContextVariables::new()).await;
        assert_eq!(outcome.messages.len(), 1);
        assert_eq!(
            outcome.messages[0].content,
            "Error: Tool does_not_exist not found."
        );
        assert_eq!(outcome.messages[0].tool_call_id.as_deref(), Some("call_1"));
    }

    #[tokio::test]
    async fn invalid_arguments_become_error_message() {
        let agent = Agent::new("A").with_tool(adder());
        let calls = vec![call("call_1", "add_numbers", "{not json")];

        let outcome = dispatch_tool_calls(&calls, &agent, &ContextVariables::new()).await;
        assert_eq!(outcome.messages.len(), 1);
        assert!(outcome.messages[0]
            .content
            .starts_with("Error: Invalid arguments for add_numbers:"));
    }

    #[tokio::test]
    async fn empty_arguments_parse_as_empty_object() {
        let agent = Agent::new("A").with_tool(FnTool::new(
            "ping",
            "",
            json!({"type":"object","properties":{},"required":[]}),
            |_args| async { Ok(ToolOutcome::text("pong")) },
        ));
        let calls = vec![call("call_1", "ping", "")];

        let outcome = dispatch_tool_calls(&calls, &agent, &ContextVariables::new()).await;
        assert_eq!(outcome.messages[0].content, "pong");
    }

    #[tokio::test]
    async fn execution_failure_is_contained() {
        let agent = Agent::new("A").with_tool(FnTool::new(
            "flaky",
            "",
            json!({"type":"object","properties":{},"required":[]}),
            |_args| async {
                Err(ToolError::ExecutionFailed {
                    tool_name: "flaky".into(),
                    reason: "upstream down".into(),
                })
            },
        ));
        let calls = vec![call("call_1", "flaky", "{}")];

        let outcome = dispatch_tool_calls(&calls, &agent, &ContextVariables::new()).await;
        assert_eq!(outcome.messages.len(), 1);
        assert!(outcome.messages[0].content.starts_with("Error executing flaky:"));
        assert!(outcome.messages[0].content.contains("upstream down"));
    }

    #[tokio::test]
    async fn bad_return_value_is_reported_distinctly() {
        let agent = Agent::new("A").with_tool(FnTool::new(
            "measure",
            "",
            json!({"type":"object","properties":{},"required":[]}),
            |_args| async {
                let mut weird = std::collections::BTreeMap::new();
                weird.insert((1u8, 2u8), "value");
                Ok(ToolOutcome::plain("measure", weird)?)
            },
        ));
        let calls = vec![call("call_1", "measure", "{}")];

        let outcome = dispatch_tool_calls(&calls, &agent, &ContextVariables::new()).await;
        assert_eq!(outcome.messages.len(), 1);
        assert!(outcome.messages[0]
            .content
            .contains("returned an unsupported value"));
        // Not the "Error executing" wording — a distinct failure class.
        assert!(!outcome.messages[0].content.starts_with("Error executing"));
    }

    #[tokio::test]
    async fn context_is_injected_under_reserved_key() {
        let agent = Agent::new("A").with_tool(
            FnTool::new(
                "whoami",
                "",
                json!({"type":"object","properties":{},"required":[]}),
                |args: Value| async move {
                    let user = args[CONTEXT_VARIABLES_KEY]["user"]
                        .as_str()
                        .unwrap_or("unknown")
                        .to_string();
                    Ok(ToolOutcome::text(user))
                },
            )
            .with_context(),
        );

        let mut context = ContextVariables::new();
        context.insert("user", json!("ada"));
        let calls = vec![call("call_1", "whoami", "{}")];

        let outcome = dispatch_tool_calls(&calls, &agent, &context).await;
        assert_eq!(outcome.messages[0].content, "ada");
    }

    #[tokio::test]
    async fn context_patches_apply_last_write_wins() {
        let setter = |name: &str, value: &str| {
            let value = value.to_string();
            FnTool::new(
                name,
                "",
                json!({"type":"object","properties":{},"required":[]}),
                move |_args| {
                    let value = value.clone();
                    async move {
                        let mut patch = ContextVariables::new();
                        patch.insert("key", json!(value));
                        Ok(ToolOutcome::Structured(
                            ToolResult::value("ok").with_context_variables(patch),
                        ))
                    }
                },
            )
        };

        let agent = Agent::new("A")
            .with_tool(setter("set_first", "first"))
            .with_tool(setter("set_second", "second"));
        let calls = vec![
            call("call_1", "set_first", "{}"),
            call("call_2", "set_second", "{}"),
        ];

        let outcome = dispatch_tool_calls(&calls, &agent, &ContextVariables::new()).await;
        assert_eq!(outcome.context_patch.get("key"), Some(&json!("second")));
    }

    #[tokio::test]
    async fn handoff_short_circuits_rest_of_batch() {
        let target = Agent::new("Specialist");
        let agent = Agent::new("Triage")
            .with_tool(troupe_core::tool::handoff_to(target, "Escalate"))
            .with_tool(adder());

        let calls = vec![
            call("call_1", "transfer_to_specialist", "{}"),
            call("call_2", "add_numbers", r#"{"a":1,"b":1}"#),
        ];

        let outcome = dispatch_tool_calls(&calls, &agent, &ContextVariables::new()).await;
        // Only the handoff call produced a message; the second call never ran.
        assert_eq!(outcome.messages.len(), 1);
        assert_eq!(outcome.messages[0].content, "Transferring to Specialist");
        assert_eq!(
            outcome.handoff.as_ref().map(|a| a.name.as_str()),
            Some("Specialist")
        );
    }
}
