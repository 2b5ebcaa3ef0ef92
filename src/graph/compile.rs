//! IR → executable flow compilation.
//!
//! Compilation instantiates each node through the registry, wraps it in the
//! instrumented wrapper, and wires `(from, action)` transitions into a lookup
//! map for the executor. Validation normally precedes compilation; because it
//! can be skipped, the compiler re-enforces the structural facts it cannot
//! survive without (unique ids, a real start node, known node types, an
//! acyclic non-error graph) and fails fast on violation.

use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::graph::order::{CycleError, execution_order};
use crate::ir::{InputDecl, OutputDecl, TemplateMode, WorkflowIr};
use crate::registry::Registry;
use crate::runtime::wrapper::InstrumentedNode;
use crate::types::Action;

/// A workflow ready for execution.
///
/// Owns the instrumented node instances, the wiring map, and the declaration
/// data needed after the run (inputs for seeding, outputs for extraction).
pub struct CompiledFlow {
    nodes: FxHashMap<String, InstrumentedNode>,
    wiring: FxHashMap<(String, String), String>,
    start: String,
    /// Total execution order over non-error edges.
    pub order: Vec<String>,
    /// Declared inputs, captured for run-start seeding.
    pub inputs: BTreeMap<String, InputDecl>,
    /// Declared outputs, captured for post-run extraction.
    pub outputs: BTreeMap<String, OutputDecl>,
    /// Template resolution mode the whole run uses.
    pub mode: TemplateMode,
}

impl CompiledFlow {
    /// Id of the node execution starts from (absent a resume point).
    #[must_use]
    pub fn start_node(&self) -> &str {
        &self.start
    }

    /// Wiring lookup: the node that `(from, action)` transitions to.
    #[must_use]
    pub fn successor(&self, from: &str, action: &Action) -> Option<&str> {
        self.wiring
            .get(&(from.to_string(), action.as_str().to_string()))
            .map(String::as_str)
    }

    /// The instrumented node registered under `id`.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&InstrumentedNode> {
        self.nodes.get(id)
    }

    /// Registry type of the node `id`, for error reporting.
    #[must_use]
    pub fn node_type(&self, id: &str) -> Option<&str> {
        self.nodes.get(id).map(InstrumentedNode::node_type)
    }

    /// Number of nodes in the flow.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Structural defects the compiler refuses to proceed past.
#[derive(Debug, Error, Diagnostic)]
pub enum CompileError {
    #[error("duplicate node id `{id}`")]
    #[diagnostic(code(pflow::compile::duplicate_id))]
    DuplicateNodeId { id: String },

    #[error("start node `{id}` is not defined in `nodes`")]
    #[diagnostic(code(pflow::compile::unknown_start))]
    UnknownStartNode { id: String },

    #[error("node `{id}` has unknown type `{node_type}`")]
    #[diagnostic(
        code(pflow::compile::unknown_type),
        help("Register the node type or fix the `type` field; available types come from the registry.")
    )]
    UnknownNodeType { id: String, node_type: String },

    #[error("workflow defines no nodes")]
    #[diagnostic(code(pflow::compile::empty))]
    Empty,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Cycle(#[from] CycleError),
}

/// Compile a workflow IR against a registry.
pub fn compile(ir: &WorkflowIr, registry: &Registry) -> Result<CompiledFlow, CompileError> {
    if ir.nodes.is_empty() {
        return Err(CompileError::Empty);
    }

    let mut seen: FxHashSet<&str> = FxHashSet::default();
    for def in &ir.nodes {
        if !seen.insert(def.id.as_str()) {
            return Err(CompileError::DuplicateNodeId {
                id: def.id.clone(),
            });
        }
    }

    let start = ir.start_node_id().to_string();
    if !seen.contains(start.as_str()) {
        return Err(CompileError::UnknownStartNode { id: start });
    }

    let order = execution_order(&ir.nodes, &ir.edges)?;

    let mut nodes = FxHashMap::default();
    for def in &ir.nodes {
        let node = registry
            .get(&def.node_type)
            .ok_or_else(|| CompileError::UnknownNodeType {
                id: def.id.clone(),
                node_type: def.node_type.clone(),
            })?;
        nodes.insert(
            def.id.clone(),
            InstrumentedNode::new(def.id.clone(), def.node_type.clone(), def.params.clone(), node),
        );
    }

    let mut wiring = FxHashMap::default();
    for edge in &ir.edges {
        wiring.insert(
            (edge.from.clone(), edge.action.as_str().to_string()),
            edge.to.clone(),
        );
    }

    Ok(CompiledFlow {
        nodes,
        wiring,
        start,
        order,
        inputs: ir.inputs.clone(),
        outputs: ir.outputs.clone(),
        mode: ir.template_resolution_mode,
    })
}
