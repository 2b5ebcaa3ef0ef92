//! Workflow intermediate representation (IR).
//!
//! The IR is the canonical JSON-shaped definition of a workflow: an ordered
//! list of nodes, action-labelled edges between them, declared inputs and
//! outputs, and a template resolution mode. It is authored upstream (by a
//! planner or a human), validated by [`crate::validate`], compiled by
//! [`crate::graph`], and mutated only by the repair orchestrator.
//!
//! # Examples
//!
//! ```rust
//! use pflow::ir::WorkflowIr;
//!
//! let ir = WorkflowIr::from_json_str(r#"{
//!     "ir_version": "1.0.0",
//!     "nodes": [
//!         {"id": "fetch", "type": "http", "params": {"url": "${base}/items"}}
//!     ],
//!     "edges": [],
//!     "inputs": {"base": {"type": "string", "required": true}},
//!     "outputs": {"items": {"source": "${fetch.body}"}}
//! }"#).unwrap();
//!
//! assert_eq!(ir.nodes.len(), 1);
//! assert_eq!(ir.start_node_id(), "fetch");
//! ```

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::types::{Action, JsonMap};

/// A complete workflow definition.
///
/// Field order and nesting mirror the on-the-wire JSON form exactly; the
/// struct round-trips through `serde_json` without loss. `inputs` and
/// `outputs` use `BTreeMap` so iteration (and therefore validation error
/// ordering) is deterministic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowIr {
    /// Semantic version of the IR dialect this document was authored against.
    pub ir_version: String,
    /// Ordered node definitions; the first entry is the default start node.
    pub nodes: Vec<NodeDef>,
    /// Action-labelled transitions between nodes.
    #[serde(default)]
    pub edges: Vec<EdgeDef>,
    /// Explicit start node id; defaults to the first entry of `nodes`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_node: Option<String>,
    /// Declared workflow inputs, keyed by name.
    #[serde(default)]
    pub inputs: BTreeMap<String, InputDecl>,
    /// Declared workflow outputs, keyed by name.
    #[serde(default)]
    pub outputs: BTreeMap<String, OutputDecl>,
    /// How unresolved template references behave at run time.
    #[serde(default)]
    pub template_resolution_mode: TemplateMode,
}

impl WorkflowIr {
    /// Parse an IR document from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self, IrParseError> {
        serde_json::from_str(s).map_err(|source| IrParseError::Json { source })
    }

    /// Parse an IR document from an already-decoded JSON value.
    pub fn from_value(value: Value) -> Result<Self, IrParseError> {
        serde_json::from_value(value).map_err(|source| IrParseError::Json { source })
    }

    /// Serialize back to a JSON value.
    ///
    /// Serialization of a struct with serializable fields cannot fail, so
    /// this is infallible.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// The effective start node id: `start_node` if set, else the first node.
    ///
    /// Returns an empty string for an empty workflow; the validator rejects
    /// that shape before anything consumes it.
    #[must_use]
    pub fn start_node_id(&self) -> &str {
        match &self.start_node {
            Some(id) => id,
            None => self.nodes.first().map(|n| n.id.as_str()).unwrap_or(""),
        }
    }

    /// Look up a node definition by id.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&NodeDef> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// The sole input declared with `stdin: true`, if any.
    #[must_use]
    pub fn stdin_input(&self) -> Option<(&str, &InputDecl)> {
        self.inputs
            .iter()
            .find(|(_, decl)| decl.stdin)
            .map(|(name, decl)| (name.as_str(), decl))
    }
}

/// One node of a workflow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
    /// Unique id; word characters only.
    pub id: String,
    /// Registry key selecting the node implementation.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Free-text statement of what this node is for (at most 200 chars).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub purpose: String,
    /// Raw params; string values may contain `${...}` template references.
    #[serde(default)]
    pub params: JsonMap,
}

/// One transition of a workflow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeDef {
    pub from: String,
    pub to: String,
    /// Edge label; a node returning this action transitions along this edge.
    #[serde(default)]
    pub action: Action,
}

impl EdgeDef {
    /// Returns `true` iff this edge is taken on a failure action.
    ///
    /// Error edges are the only edges allowed to close cycles; the dataflow
    /// validator excludes them from the acyclicity check.
    #[must_use]
    pub fn is_error_edge(&self) -> bool {
        self.action.is_error()
    }
}

/// A declared workflow input.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputDecl {
    #[serde(rename = "type", default)]
    pub value_type: crate::types::ValueType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    /// Value used when the caller supplies nothing for this input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// At most one input per workflow may set this; stdin is routed into it.
    #[serde(default)]
    pub stdin: bool,
}

/// A declared workflow output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputDecl {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Template expression evaluated against the final shared store.
    pub source: String,
}

/// How unresolved template references behave at run time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateMode {
    /// Unresolved references fail the node with a template error.
    #[default]
    Strict,
    /// Unresolved references yield a typed sentinel and mark the run degraded.
    Permissive,
}

/// Errors raised while decoding an IR document.
#[derive(Debug, Error, Diagnostic)]
pub enum IrParseError {
    /// The document is not valid JSON or does not match the IR schema.
    #[error("invalid workflow IR: {source}")]
    #[diagnostic(
        code(pflow::ir::json),
        help("The IR must be a JSON object with `ir_version` and `nodes`; see the schema docs.")
    )]
    Json {
        #[source]
        source: serde_json::Error,
    },
}
