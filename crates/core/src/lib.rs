//! # troupe-core
//!
//! Domain types and traits for the troupe multi-agent orchestrator. This
//! crate has **zero framework dependencies** — it defines the model that
//! the engine and provider crates implement against.
//!
//! ## Design Philosophy
//!
//! Agents and tools are immutable value objects; run state (history,
//! context variables) is owned by one in-flight run. Every seam that has
//! more than one implementation — the completion backend, the tools — is a
//! trait here, so the engine stays testable with in-process mocks.

pub mod agent;
pub mod context;
pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::{Agent, Instructions};
pub use context::{ContextVariables, CONTEXT_VARIABLES_KEY};
pub use error::{Error, ProviderError, Result, ToolError};
pub use message::{Message, Role, ToolCallRequest};
pub use provider::{
    DeltaStream, FunctionDelta, MessageDelta, Provider, ProviderRequest, ProviderResponse,
    ToolCallDelta, ToolDefinition, Usage,
};
pub use tool::{handoff_to, FnTool, Tool, ToolOutcome, ToolResult};
