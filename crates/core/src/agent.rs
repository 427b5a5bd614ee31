//! Agent definition.
//!
//! An [`Agent`] is a name, a model, instructions, and an ordered set of
//! tools. Agents are immutable value objects built once by the caller; the
//! engine never mutates one, it only swaps which agent is active. Cloning is
//! cheap — tools are behind `Arc` — so agents can be referenced from
//! multiple concurrent runs and handed around freely by handoff tools.

use std::fmt;
use std::sync::Arc;

use crate::context::ContextVariables;
use crate::tool::Tool;

/// An agent's system instructions: either a fixed string or a function of
/// the run's current context variables.
///
/// The dynamic variant is evaluated explicitly at the start of every turn,
/// so instructions can reflect context mutated by earlier tool calls.
#[derive(Clone)]
pub enum Instructions {
    /// Fixed instruction text.
    Static(String),
    /// Instructions computed from the current context variables.
    Dynamic(Arc<dyn Fn(&ContextVariables) -> String + Send + Sync>),
}

impl Instructions {
    /// Resolve to concrete instruction text for this turn.
    pub fn resolve(&self, context: &ContextVariables) -> String {
        match self {
            Instructions::Static(text) => text.clone(),
            Instructions::Dynamic(f) => f(context),
        }
    }
}

impl fmt::Debug for Instructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instructions::Static(text) => f.debug_tuple("Static").field(text).finish(),
            Instructions::Dynamic(_) => f.write_str("Dynamic(<fn>)"),
        }
    }
}

impl From<&str> for Instructions {
    fn from(text: &str) -> Self {
        Instructions::Static(text.to_string())
    }
}

impl From<String> for Instructions {
    fn from(text: String) -> Self {
        Instructions::Static(text)
    }
}

/// A named agent: a system prompt plus a set of callable tools.
#[derive(Clone)]
pub struct Agent {
    /// Identity — also the name stamped onto messages this agent produces.
    pub name: String,

    /// The backing model (a run-level override takes precedence).
    pub model: String,

    /// System instructions, static or computed from context.
    pub instructions: Instructions,

    /// Ordered tool set. Names must be unique within one agent.
    pub tools: Vec<Arc<dyn Tool>>,

    /// Optional preferred tool-choice hint forwarded to the provider.
    pub tool_choice: Option<String>,

    /// Whether the provider may request independent tool calls in parallel
    /// within one assistant turn. Dispatch itself stays sequential.
    pub parallel_tool_calls: bool,
}

impl Agent {
    /// Create an agent with the stock defaults.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: "gpt-4".into(),
            instructions: Instructions::Static("You are a helpful agent.".into()),
            tools: Vec::new(),
            tool_choice: None,
            parallel_tool_calls: true,
        }
    }

    /// Set the backing model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set fixed instruction text.
    pub fn with_instructions(mut self, instructions: impl Into<Instructions>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Set instructions computed from the run's context variables each turn.
    pub fn with_dynamic_instructions<F>(mut self, f: F) -> Self
    where
        F: Fn(&ContextVariables) -> String + Send + Sync + 'static,
    {
        self.instructions = Instructions::Dynamic(Arc::new(f));
        self
    }

    /// Add a tool to the agent's tool set.
    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    /// Add an already-shared tool.
    pub fn with_shared_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Set the tool-choice hint (e.g. `"auto"`, `"none"`).
    pub fn with_tool_choice(mut self, choice: impl Into<String>) -> Self {
        self.tool_choice = Some(choice.into());
        self
    }

    /// Allow or forbid parallel tool-call requests at the provider level.
    pub fn with_parallel_tool_calls(mut self, allowed: bool) -> Self {
        self.parallel_tool_calls = allowed;
        self
    }

    /// Look up a tool by name.
    pub fn find_tool(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }
}

// Tools are trait objects, so Debug is written out by hand.
impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("instructions", &self.instructions)
            .field(
                "tools",
                &self.tools.iter().map(|t| t.name().to_string()).collect::<Vec<_>>(),
            )
            .field("tool_choice", &self.tool_choice)
            .field("parallel_tool_calls", &self.parallel_tool_calls)
            .finish()
    }
}
