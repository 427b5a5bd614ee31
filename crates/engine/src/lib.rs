//! # troupe-engine
//!
//! The turn execution engine: the loop that asks the active agent's model
//! for a completion, executes requested tool calls, detects and applies
//! agent handoffs, merges shared context across turns, and does all of it
//! incrementally for streaming responses.
//!
//! One [`Runner`] serves one conversation at a time per run; history and
//! context variables are owned by the in-flight run and handed back, sliced
//! to the newly appended portion, as the [`RunResult`].

pub mod delta;
pub mod dispatch;
pub mod events;
pub mod runner;

pub use delta::MessageAccumulator;
pub use dispatch::{dispatch_tool_calls, DispatchOutcome};
pub use events::RunEvent;
pub use runner::{RunRequest, RunResult, Runner};
