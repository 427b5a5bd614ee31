//! Events emitted by a streaming run.

use troupe_core::provider::MessageDelta;

use crate::runner::RunResult;

/// One event in a streaming run's lazy sequence.
///
/// Every raw provider delta is forwarded for live display, bracketed by a
/// start/end marker pair per turn; the sequence terminates with a single
/// [`RunEvent::Done`] carrying the same result a non-streaming run returns.
/// Agents carry callables, so events are in-process values; rendering them
/// for a wire protocol belongs to a presentation layer.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// A turn is starting: the next deltas belong to one assistant message.
    TurnStart,

    /// A raw delta, exactly as received (with `sender` stamped onto
    /// role-bearing deltas).
    Delta(MessageDelta),

    /// The current turn's delta stream is exhausted.
    TurnEnd,

    /// Terminal event: the completed run.
    Done(RunResult),
}

impl RunEvent {
    /// A short name for this event kind, for display and logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TurnStart => "turn_start",
            Self::Delta(_) => "delta",
            Self::TurnEnd => "turn_end",
            Self::Done(_) => "done",
        }
    }
}
