//! Per-node instrumentation: the only writer of the checkpoint.
//!
//! Every compiled node is wrapped in an [`InstrumentedNode`]. One call to
//! [`InstrumentedNode::run`] performs the full per-node pipeline:
//!
//! 1. resolve params and hash them canonically
//! 2. serve from cache when the checkpoint already holds this id with the
//!    same hash and a non-error action
//! 3. execute the inner node, translating unexpected errors into an
//!    `error:execution_failure` outcome
//! 4. inspect outputs for API-level failure signals, flagging non-repairable
//!    classes (auth, not-found, rate-limit) so repair is not attempted
//! 5. namespace the outputs into the shared store
//! 6. update the checkpoint
//!
//! The returned [`Action`] feeds the executor's wiring lookup.

use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::errors::looks_like_validation_message;
use crate::hooks::{NodeStatus, RunHooks};
use crate::ir::TemplateMode;
use crate::node::{Node, NodeCtx, NodeSpec};
use crate::store::SharedStore;
use crate::template::{ResolveContext, resolve_params};
use crate::types::{Action, JsonMap};
use crate::utils::canonical::param_hash;

/// HTTP statuses that make a failure not worth a repair attempt on their own.
const NON_REPAIRABLE_STATUSES: &[u16] = &[401, 403, 404, 429];

/// A workflow node plus the instrumentation the engine needs around it.
pub struct InstrumentedNode {
    id: String,
    node_type: String,
    params: JsonMap,
    node: Arc<dyn Node>,
}

impl InstrumentedNode {
    #[must_use]
    pub fn new(id: String, node_type: String, params: JsonMap, node: Arc<dyn Node>) -> Self {
        Self {
            id,
            node_type,
            params,
            node,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    /// Declared IO schema of the wrapped node.
    #[must_use]
    pub fn spec(&self) -> NodeSpec {
        self.node.spec()
    }

    /// Raw, template-laden params from the IR.
    #[must_use]
    pub fn raw_params(&self) -> &JsonMap {
        &self.params
    }

    /// Execute the per-node pipeline once and return the edge action.
    #[allow(clippy::too_many_arguments)]
    pub async fn run(
        &self,
        store: &mut SharedStore,
        extracted: &JsonMap,
        defaults: &JsonMap,
        mode: TemplateMode,
        step: u64,
        cancellation: &CancellationToken,
        hooks: &RunHooks,
    ) -> Action {
        let snapshot = store.snapshot();
        let ctx = ResolveContext::new()
            .layer(extracted)
            .layer(&snapshot)
            .layer(defaults);

        let (resolved, unresolved) = match resolve_params(&self.params, &ctx, mode) {
            Ok(resolved) => resolved,
            Err(err) => {
                // Strict-mode resolution failure: fail the node without
                // calling exec, hashing the raw params for the record.
                let action = Action::from(Action::TEMPLATE_FAILED);
                let mut outputs = JsonMap::new();
                outputs.insert("error".to_string(), json!(err.to_string()));
                store.set_node_outputs(&self.id, outputs);
                let mut checkpoint = store.checkpoint();
                checkpoint.record_failure(&self.id, param_hash(&self.params), action.clone());
                store.set_checkpoint(&checkpoint);
                hooks.output.show_node(&self.id, NodeStatus::Error, None);
                tracing::debug!(node_id = %self.id, %err, "template resolution failed");
                return action;
            }
        };

        if !unresolved.is_empty() {
            tracing::warn!(node_id = %self.id, ?unresolved, "degraded: unresolved templates");
            store.add_warning(&self.id, json!({ "unresolved_templates": unresolved }));
        }

        let hash = param_hash(&resolved);
        let checkpoint = store.checkpoint();
        if let Some(action) = checkpoint.cached_action(&self.id, &hash) {
            let action = action.clone();
            store.push_cache_hit(&self.id);
            hooks.output.show_node(&self.id, NodeStatus::Cached, None);
            tracing::debug!(node_id = %self.id, %action, "cache hit");
            return action;
        }

        hooks.output.show_node(&self.id, NodeStatus::Start, None);
        let started = Instant::now();
        let node_ctx = NodeCtx {
            node_id: self.id.clone(),
            step,
            shared: snapshot,
            cancellation: cancellation.clone(),
        };

        let (outputs, action) = match self.node.exec(resolved.clone(), node_ctx).await {
            Ok(outcome) => (outcome.outputs, outcome.action),
            Err(err) => {
                let mut outputs = JsonMap::new();
                outputs.insert("error".to_string(), json!(err.to_string()));
                (outputs, Action::from(Action::EXECUTION_FAILURE))
            }
        };
        let duration = started.elapsed();

        self.detect_api_failure(store, &outputs);

        store.set_node_outputs(&self.id, outputs.clone());

        let mut checkpoint = store.checkpoint();
        if action.is_error() {
            checkpoint.record_failure(&self.id, hash, action.clone());
        } else {
            checkpoint.record_success(&self.id, hash, action.clone());
        }
        store.set_checkpoint(&checkpoint);

        let status = if action.is_error() {
            NodeStatus::Error
        } else {
            NodeStatus::Completed
        };
        hooks.output.show_node(&self.id, status, Some(duration));
        hooks
            .trace
            .record_node(&self.id, &resolved, &outputs, duration);
        tracing::debug!(node_id = %self.id, %action, ?duration, "node finished");

        action
    }

    /// Inspect outputs for API-level failure signals (§4.E step 4).
    ///
    /// A failure signal records a warning summary; statuses in the
    /// non-repairable set (or a business 4xx without structured validation
    /// detail) additionally mark the whole run non-repairable.
    fn detect_api_failure(&self, store: &mut SharedStore, outputs: &JsonMap) {
        let status = outputs
            .get("status_code")
            .or_else(|| outputs.get("status"))
            .and_then(Value::as_u64)
            .and_then(|code| u16::try_from(code).ok());

        let flagged_ok = outputs.get("ok").and_then(Value::as_bool) == Some(false)
            || outputs.get("success").and_then(Value::as_bool) == Some(false);
        let has_error_list = outputs
            .get("errors")
            .and_then(Value::as_array)
            .is_some_and(|items| !items.is_empty());
        let failed_status = status.is_some_and(|code| code >= 400);

        if !(flagged_ok || has_error_list || failed_status) {
            return;
        }

        let message = outputs
            .get("error")
            .or_else(|| outputs.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("API-level failure");
        let mut summary = JsonMap::new();
        summary.insert("message".to_string(), json!(message));
        if let Some(code) = status {
            summary.insert("status_code".to_string(), json!(code));
        }
        store.add_warning(&self.id, Value::Object(summary));

        let non_repairable = match status {
            Some(code) if NON_REPAIRABLE_STATUSES.contains(&code) => true,
            Some(code) if (400..500).contains(&code) => {
                // A 4xx is only repairable when it carries something a
                // repair can act on.
                let structured = outputs
                    .get("raw_response")
                    .is_some_and(|raw| raw.is_object() || raw.is_array());
                !structured && !looks_like_validation_message(message)
            }
            _ => false,
        };
        if non_repairable {
            tracing::warn!(node_id = %self.id, ?status, "non-repairable API failure");
            store.set_non_repairable();
        }
    }
}

impl std::fmt::Debug for InstrumentedNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentedNode")
            .field("id", &self.id)
            .field("node_type", &self.node_type)
            .finish_non_exhaustive()
    }
}
