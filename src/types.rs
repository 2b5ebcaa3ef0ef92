//! Core types for the pflow workflow engine.
//!
//! This module defines the fundamental domain types shared across the engine:
//! transition actions, declared value types, and the JSON object alias used
//! for params, node outputs, and the shared store.
//!
//! # Key Types
//!
//! - [`Action`]: The string a node returns to select its outgoing edge
//! - [`ValueType`]: Declared type of a workflow input or node port
//! - [`JsonMap`]: Alias for the ordered JSON object used throughout

use serde::{Deserialize, Serialize};
use std::fmt;

/// JSON object type used for node params, node outputs, and the shared store.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// The transition label a node returns to select its outgoing edge.
///
/// Every node execution produces an `Action`. The executor looks up
/// `(node_id, action)` in the compiled wiring map to find the next node.
/// The implicit edge label is [`Action::DEFAULT`]; any action equal to
/// `"error"` or starting with `"error:"` marks a failure.
///
/// # Examples
///
/// ```rust
/// use pflow::types::Action;
///
/// let ok = Action::default_action();
/// assert!(!ok.is_error());
///
/// let failed = Action::from("error:execution_failure");
/// assert!(failed.is_error());
/// assert_eq!(failed.as_str(), "error:execution_failure");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Action(String);

impl Action {
    /// The implicit edge label used when an edge declares no action.
    pub const DEFAULT: &'static str = "default";

    /// Prefix that marks an action as a failure transition.
    pub const ERROR_PREFIX: &'static str = "error";

    /// Action synthesized when a node's `exec` raises instead of returning.
    pub const EXECUTION_FAILURE: &'static str = "error:execution_failure";

    /// Action synthesized when template resolution fails in strict mode.
    pub const TEMPLATE_FAILED: &'static str = "error:template_failed";

    /// The `"default"` action.
    #[must_use]
    pub fn default_action() -> Self {
        Action(Self::DEFAULT.to_string())
    }

    /// Returns `true` iff this action marks a failure transition.
    ///
    /// Failure actions are `"error"` exactly, or anything namespaced under
    /// it (`"error:template_failed"`, `"error:execution_failure"`, ...).
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.0 == Self::ERROR_PREFIX || self.0.starts_with("error:")
    }

    /// Borrow the raw action string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Action {
    fn default() -> Self {
        Self::default_action()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Action {
    fn from(s: &str) -> Self {
        Action(s.to_string())
    }
}

impl From<String> for Action {
    fn from(s: String) -> Self {
        Action(s)
    }
}

/// Declared type of a workflow input or a node port.
///
/// Used by the IR for input declarations and by [`NodeSpec`](crate::node::NodeSpec)
/// ports; the validator compares template references against these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl Default for ValueType {
    fn default() -> Self {
        ValueType::String
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Number => write!(f, "number"),
            Self::Boolean => write!(f, "boolean"),
            Self::Object => write!(f, "object"),
            Self::Array => write!(f, "array"),
        }
    }
}
