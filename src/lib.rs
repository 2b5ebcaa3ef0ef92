//! # pflow: Declarative Workflow Engine with Self-Healing Execution
//!
//! pflow compiles a JSON intermediate representation (IR) into a runnable
//! graph, executes it one node at a time with checkpoint-based resume
//! semantics, resolves `${...}` template references across node outputs, and
//! — when a repair client is configured — heals workflow structure between
//! attempts by feeding structured error records to an LLM.
//!
//! ## Core Concepts
//!
//! - **IR**: the JSON-shaped workflow definition: nodes, action-labelled
//!   edges, declared inputs and outputs
//! - **Shared store**: the per-run state carrier; node outputs live in
//!   per-node namespaces, system state under `__`-prefixed keys
//! - **Checkpoint**: the `__execution__` subtree of the shared store; makes
//!   resume and caching possible with no external persistence
//! - **Actions**: the string a node returns selects its outgoing edge; any
//!   `error*` action marks a failure
//! - **Repair**: the orchestrator's outer loop that validates, executes,
//!   extracts errors, requests an IR repair, and resumes from checkpoint
//!
//! ## Quick Start
//!
//! Parsing and validating an IR requires no runtime:
//!
//! ```
//! use pflow::ir::WorkflowIr;
//! use pflow::validate::validate;
//!
//! let ir = WorkflowIr::from_json_str(r#"{
//!     "ir_version": "1.0.0",
//!     "nodes": [
//!         {"id": "read", "type": "readfile", "params": {"path": "${file}"}},
//!         {"id": "upper", "type": "uppercase", "params": {"text": "${read.content}"}}
//!     ],
//!     "edges": [{"from": "read", "to": "upper"}],
//!     "inputs": {"file": {"type": "string", "required": true}},
//!     "outputs": {"result": {"source": "${upper.text}"}}
//! }"#).unwrap();
//!
//! // Node types are checked against a registry when one is supplied.
//! assert!(validate(&ir, None, None, true).is_empty());
//! ```
//!
//! Executing needs a registry of node implementations and an orchestrator:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pflow::orchestrator::{ExecuteOptions, Orchestrator};
//! use pflow::registry::Registry;
//! # async fn example(ir: pflow::ir::WorkflowIr, registry: Registry) {
//! let orchestrator = Orchestrator::new(Arc::new(registry));
//! let result = orchestrator
//!     .execute(ir, Default::default(), ExecuteOptions::default())
//!     .await;
//! assert!(result.success);
//! // `result.shared_after` doubles as resume state for a follow-up call.
//! # }
//! ```
//!
//! ## Execution Model
//!
//! Each run is single-threaded: the executor drives one node at a time,
//! following `(node, action)` wiring until no successor exists. Between
//! nodes it honors cancellation and the per-run deadline. The instrumented
//! wrapper around each node is the only writer of the checkpoint, so a
//! resumed run skips every completed node whose resolved-param hash still
//! matches. Independent runs may proceed concurrently; the registry, the
//! workflow manager, and the repair client are shared read-safely.
//!
//! ## Module Guide
//!
//! - [`ir`] - IR data model and JSON (de)serialization
//! - [`validate`] - five-layer structural/dataflow/template validation
//! - [`graph`] - execution order and compilation into a wired flow
//! - [`template`] - `${...}` scanning and layered resolution
//! - [`store`] - the shared store and checkpoint value
//! - [`runtime`] - per-node instrumentation and the attempt executor
//! - [`orchestrator`] - validation/runtime repair loops and the facade
//! - [`errors`] - structured error records and loop signatures
//! - [`repair`] - the repair client contract
//! - [`manager`] - atomic persistence of named workflows
//! - [`registry`] - node type registry with search
//! - [`hooks`] - progress, trace, and metrics observers
//! - [`telemetry`] - opt-in tracing bootstrap

pub mod errors;
pub mod graph;
pub mod hooks;
pub mod ir;
pub mod manager;
pub mod node;
pub mod orchestrator;
pub mod registry;
pub mod repair;
pub mod runtime;
pub mod store;
pub mod telemetry;
pub mod template;
pub mod types;
pub mod utils;
pub mod validate;

pub use errors::{ErrorCategory, ErrorRecord};
pub use graph::{CompiledFlow, compile};
pub use ir::{TemplateMode, WorkflowIr};
pub use node::{Node, NodeCtx, NodeOutcome, NodeSpec, PortSpec};
pub use orchestrator::{ExecuteOptions, Orchestrator, execute_workflow};
pub use registry::{NodeMetadata, Registry};
pub use repair::{RepairClient, RepairOutcome};
pub use runtime::{ExecutionEnv, ExecutionResult, RuntimeConfig};
pub use store::{ExecutionCheckpoint, SharedStore};
pub use types::{Action, JsonMap, ValueType};
pub use validate::validate;
