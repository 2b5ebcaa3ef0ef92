//! Repair client interface and shared-store excerpts.
//!
//! The repair client is an external collaborator (an LLM behind some
//! transport) that proposes a corrected IR for a failing workflow. The core
//! defines only the contract: structured errors in, candidate IR plus the
//! exact set of modified node ids out. An empty `modified_node_ids` means
//! the client had nothing to offer and the orchestrator must stop.

use async_trait::async_trait;
use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;

use crate::errors::ErrorRecord;
use crate::ir::WorkflowIr;
use crate::store::SharedStore;
use crate::types::JsonMap;

/// A proposed repair.
#[derive(Clone, Debug)]
pub struct RepairOutcome {
    /// The corrected IR. Ids and ordering of unmodified nodes should be
    /// preserved so checkpoint invalidation stays minimal.
    pub candidate_ir: WorkflowIr,
    /// Every node whose params, type, or edges changed. Empty means
    /// "no change possible".
    pub modified_node_ids: Vec<String>,
    /// Free-text explanation, surfaced through progress hooks.
    pub rationale: String,
}

/// Failures of the repair transport itself (not of the proposed IR).
#[derive(Debug, Error, Diagnostic)]
pub enum RepairError {
    #[error("repair client unavailable: {message}")]
    #[diagnostic(code(pflow::repair::unavailable))]
    Unavailable { message: String },

    #[error("repair client returned an unusable response: {message}")]
    #[diagnostic(code(pflow::repair::malformed))]
    Malformed { message: String },
}

/// Interface the orchestrator drives to obtain IR repairs.
///
/// Implementations are expected to be internally rate-limited and retried;
/// the core treats one `repair` call as a slow, idempotent operation and
/// bounds how many it makes.
#[async_trait]
pub trait RepairClient: Send + Sync {
    async fn repair(
        &self,
        ir: &WorkflowIr,
        errors: &[ErrorRecord],
        shared_excerpt: &JsonMap,
        params: &JsonMap,
        cache_hints: Option<&Value>,
    ) -> Result<RepairOutcome, RepairError>;
}

/// Compact projection of the shared store for a repair request.
///
/// Includes the failed node's namespace, the namespaces of its direct
/// predecessors in execution order, and the warning summaries. Unrelated
/// node data stays out to keep the request small.
#[must_use]
pub fn shared_excerpt(store: &SharedStore, failed_node: Option<&str>, order: &[String]) -> JsonMap {
    let mut excerpt = JsonMap::new();

    if let Some(warnings) = store.get(crate::store::keys::WARNINGS) {
        excerpt.insert(crate::store::keys::WARNINGS.to_string(), warnings.clone());
    }

    let Some(failed) = failed_node else {
        return excerpt;
    };

    let mut wanted: Vec<&str> = vec![failed];
    if let Some(pos) = order.iter().position(|id| id == failed) {
        // Immediate upstream context: the node executed just before.
        if pos > 0 {
            wanted.push(order[pos - 1].as_str());
        }
    }

    for id in wanted {
        if let Some(outputs) = store.node_outputs(id) {
            excerpt.insert(id.to_string(), Value::Object(outputs.clone()));
        }
    }

    excerpt
}
