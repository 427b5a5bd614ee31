//! Shared context variables.
//!
//! [`ContextVariables`] is an open string-keyed mapping that is shared across
//! a whole run: dynamic instructions read it, tools that opt in receive it,
//! and tool results patch it. It is owned by exactly one in-flight run and
//! is never serialized into a provider request.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reserved argument key under which the run's context variables are
/// injected into a context-aware tool's arguments. The key is stripped from
/// every advertised parameter schema, so the model never sees it.
pub const CONTEXT_VARIABLES_KEY: &str = "context_variables";

/// An open mapping from string keys to arbitrary JSON values, threaded
/// through a run as an explicitly owned value (never a process-wide global).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextVariables(serde_json::Map<String, Value>);

impl ContextVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Insert a single key, replacing any existing value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Merge a patch into this mapping. On key collision the patch wins
    /// (last-write-wins semantics, applied in patch iteration order).
    pub fn merge(&mut self, patch: ContextVariables) {
        for (key, value) in patch.0 {
            self.0.insert(key, value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// The mapping as a JSON value, for injection into tool arguments.
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<serde_json::Map<String, Value>> for ContextVariables {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for ContextVariables {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
