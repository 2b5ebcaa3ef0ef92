//! Node execution contract for the pflow engine.
//!
//! This module provides the abstractions every node implementation fulfils:
//! the [`Node`] trait, the declared IO schema ([`NodeSpec`]), the execution
//! context ([`NodeCtx`]), the outcome value ([`NodeOutcome`]), and error
//! handling.
//!
//! Concrete node implementations (HTTP, shell, LLM, ...) live outside the
//! core; the core only requires this interface.

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::types::{Action, JsonMap, ValueType};

// ============================================================================
// Core Trait
// ============================================================================

/// A single unit of computation within a workflow.
///
/// Nodes receive their fully template-resolved params plus an execution
/// context, do their work, and return their outputs together with the
/// [`Action`] selecting the outgoing edge.
///
/// # Design Principles
///
/// - **Stateless**: a node instance may be executed by many runs concurrently
/// - **Outputs via return**: nodes never write to the shared store directly;
///   the instrumented wrapper namespaces the returned outputs under the
///   node's id
/// - **Failure via action**: expected failures are reported by returning an
///   `error*` action; `Err(NodeError)` is for unexpected breakage and is
///   translated by the wrapper into `error:execution_failure`
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use pflow::node::{Node, NodeCtx, NodeError, NodeOutcome, NodeSpec, PortSpec};
/// use pflow::types::{JsonMap, ValueType};
/// use serde_json::json;
///
/// struct Uppercase;
///
/// #[async_trait]
/// impl Node for Uppercase {
///     fn spec(&self) -> NodeSpec {
///         NodeSpec::new()
///             .input(PortSpec::required("text", ValueType::String))
///             .output(PortSpec::out("text", ValueType::String))
///     }
///
///     async fn exec(&self, params: JsonMap, _ctx: NodeCtx) -> Result<NodeOutcome, NodeError> {
///         let text = params
///             .get("text")
///             .and_then(|v| v.as_str())
///             .ok_or(NodeError::MissingParam { name: "text" })?;
///         let mut outputs = JsonMap::new();
///         outputs.insert("text".into(), json!(text.to_uppercase()));
///         Ok(NodeOutcome::success(outputs))
///     }
/// }
/// ```
#[async_trait]
pub trait Node: Send + Sync {
    /// Declared input params and output fields, consumed by the validator.
    fn spec(&self) -> NodeSpec;

    /// Execute with resolved params. Returns outputs plus the edge action.
    async fn exec(&self, params: JsonMap, ctx: NodeCtx) -> Result<NodeOutcome, NodeError>;
}

// ============================================================================
// IO Schema
// ============================================================================

/// Declared inputs and outputs of a node type.
///
/// The validator uses `inputs` for param checking and `outputs` to verify
/// that template references into this node's namespace name real fields.
#[derive(Clone, Debug, Default)]
pub struct NodeSpec {
    pub inputs: Vec<PortSpec>,
    pub outputs: Vec<PortSpec>,
}

impl NodeSpec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an input port declaration.
    #[must_use]
    pub fn input(mut self, port: PortSpec) -> Self {
        self.inputs.push(port);
        self
    }

    /// Add an output field declaration.
    #[must_use]
    pub fn output(mut self, port: PortSpec) -> Self {
        self.outputs.push(port);
        self
    }

    /// Look up an output field by name.
    #[must_use]
    pub fn output_field(&self, name: &str) -> Option<&PortSpec> {
        self.outputs.iter().find(|p| p.name == name)
    }
}

/// One declared port (input param or output field) of a node type.
#[derive(Clone, Debug)]
pub struct PortSpec {
    pub name: String,
    pub value_type: ValueType,
    pub required: bool,
    pub description: String,
}

impl PortSpec {
    /// A required input param.
    #[must_use]
    pub fn required(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            required: true,
            description: String::new(),
        }
    }

    /// An optional input param.
    #[must_use]
    pub fn optional(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            required: false,
            description: String::new(),
        }
    }

    /// An output field.
    #[must_use]
    pub fn out(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            required: false,
            description: String::new(),
        }
    }

    /// Attach a human-readable description.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

// ============================================================================
// Execution Context & Outcome
// ============================================================================

/// Context handed to a node for one execution.
///
/// Carries the node's identity, its position in the traversal, a read-only
/// snapshot of the shared store, and the run's cancellation token. Nodes
/// may consult the snapshot but must report outputs via [`NodeOutcome`].
#[derive(Clone, Debug)]
pub struct NodeCtx {
    /// Id of the node being executed.
    pub node_id: String,
    /// Zero-based position of this visit in the current attempt.
    pub step: u64,
    /// Read-only snapshot of the shared store taken before execution.
    pub shared: JsonMap,
    /// Cooperative cancellation signal; long-running nodes may honor it.
    pub cancellation: CancellationToken,
}

impl NodeCtx {
    /// Read a value from the shared store snapshot by top-level key.
    #[must_use]
    pub fn shared_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.shared.get(key)
    }
}

/// What a node execution produced: outputs plus the edge-selecting action.
#[derive(Clone, Debug)]
pub struct NodeOutcome {
    /// Output fields, namespaced under the node's id by the wrapper.
    pub outputs: JsonMap,
    /// Edge label for the executor's wiring lookup.
    pub action: Action,
}

impl NodeOutcome {
    /// Outputs with the `"default"` action.
    #[must_use]
    pub fn success(outputs: JsonMap) -> Self {
        Self {
            outputs,
            action: Action::default_action(),
        }
    }

    /// Outputs with an explicit action.
    #[must_use]
    pub fn with_action(outputs: JsonMap, action: impl Into<Action>) -> Self {
        Self {
            outputs,
            action: action.into(),
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Unexpected failures inside a node's `exec`.
///
/// These do not cross the engine's public API: the instrumented wrapper
/// catches them and synthesizes an `error:execution_failure` outcome so the
/// orchestrator sees a structured error record instead of a raised error.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeError {
    /// A param the node requires was absent after resolution.
    #[error("missing required param: {name}")]
    #[diagnostic(
        code(pflow::node::missing_param),
        help("Declare `{name}` in the node's params or check the upstream template.")
    )]
    MissingParam { name: &'static str },

    /// A param was present but of the wrong shape.
    #[error("invalid param {name}: {reason}")]
    #[diagnostic(code(pflow::node::invalid_param))]
    InvalidParam { name: &'static str, reason: String },

    /// External provider or service failure.
    #[error("provider error ({provider}): {message}")]
    #[diagnostic(code(pflow::node::provider))]
    Provider {
        provider: &'static str,
        message: String,
    },

    /// JSON (de)serialization failure inside the node.
    #[error(transparent)]
    #[diagnostic(code(pflow::node::serde_json))]
    Serde(#[from] serde_json::Error),

    /// Anything else the node wants to surface as a failure.
    #[error("{0}")]
    #[diagnostic(code(pflow::node::other))]
    Other(String),
}
