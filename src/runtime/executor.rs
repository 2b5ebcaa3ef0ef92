//! One attempt of a compiled flow over a shared store.
//!
//! The executor is single-threaded per run: it drives one node at a time,
//! following `(node, action)` wiring until no successor exists. Cancellation
//! and the per-run deadline are honored between nodes; a node's `exec` is an
//! opaque boundary the executor never preempts.

use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::errors::{ErrorRecord, extract_runtime_error};
use crate::graph::compile::CompiledFlow;
use crate::hooks::RunHooks;
use crate::ir::WorkflowIr;
use crate::runtime::config::RuntimeConfig;
use crate::store::SharedStore;
use crate::template::{ResolveContext, TemplateError, resolve_value};
use crate::types::{Action, JsonMap};

/// Structured outcome of one `execute` (or orchestrated) call.
#[derive(Clone, Debug)]
pub struct ExecutionResult {
    /// `true` iff the terminal action is not a failure and no non-repairable
    /// error was flagged.
    pub success: bool,
    /// The shared store after the run; feed back as `resume_state`.
    pub shared_after: JsonMap,
    /// Structured failures; empty on success.
    pub errors: Vec<ErrorRecord>,
    /// The last action observed before termination.
    pub action_result: Option<Action>,
    /// Node visits this attempt, cache hits included.
    pub node_count: usize,
    /// Wall-clock duration of this attempt.
    pub duration: Duration,
    /// Declared outputs evaluated against the final store.
    pub output_data: Value,
    /// Aggregated metrics from the metrics hook.
    pub metrics_summary: Value,
    /// The repaired IR, set iff a repair was applied during orchestration.
    pub repaired_workflow_ir: Option<WorkflowIr>,
}

/// Per-run environment: hooks, cancellation, deadline, and bounds.
#[derive(Clone, Debug, Default)]
pub struct ExecutionEnv {
    pub hooks: RunHooks,
    pub cancellation: CancellationToken,
    /// Absolute point after which the run aborts between nodes.
    pub deadline: Option<tokio::time::Instant>,
    pub config: RuntimeConfig,
}

impl ExecutionEnv {
    fn interrupted(&self) -> Option<&'static str> {
        if self.cancellation.is_cancelled() {
            return Some("cancelled");
        }
        if let Some(deadline) = self.deadline {
            if tokio::time::Instant::now() >= deadline {
                return Some("deadline exceeded");
            }
        }
        None
    }
}

/// Run one attempt of `compiled` over `store`.
///
/// Execution starts at the compiled start node, or at the checkpoint's
/// `failed_node` when resuming. The store is mutated in place; the result
/// carries a clone so the caller can both inspect and resume.
pub async fn execute(
    compiled: &CompiledFlow,
    store: &mut SharedStore,
    params: &JsonMap,
    env: &ExecutionEnv,
) -> ExecutionResult {
    let started = std::time::Instant::now();

    seed_inputs(compiled, store, params);
    store.clear_cache_hits();
    let defaults = default_layer(compiled);

    let mut current = store
        .checkpoint()
        .failed_node
        .unwrap_or_else(|| compiled.start_node().to_string());
    let mut step: u64 = 0;
    let mut terminal: Option<Action> = None;
    let mut interruption: Option<ErrorRecord> = None;

    loop {
        if let Some(reason) = env.interrupted() {
            env.hooks
                .output
                .show_progress(&format!("run {reason} before `{current}`"), true);
            interruption = Some(ErrorRecord::cancelled(reason, Some(&current)));
            break;
        }

        let Some(node) = compiled.node(&current) else {
            // Wiring pointed at a node the compiler never saw; compile-time
            // checks make this unreachable for compiled IRs.
            let mut record =
                ErrorRecord::static_validation(format!("edge target `{current}` does not exist"));
            record.source = "runtime".to_string();
            interruption = Some(record);
            break;
        };

        let action = node
            .run(
                store,
                params,
                &defaults,
                compiled.mode,
                step,
                &env.cancellation,
                &env.hooks,
            )
            .await;
        step += 1;

        match compiled.successor(&current, &action) {
            Some(next) => {
                current = next.to_string();
                terminal = Some(action);
            }
            None => {
                terminal = Some(action);
                break;
            }
        }
    }

    let interrupted = interruption.is_some();
    let action_failed = terminal.as_ref().is_some_and(Action::is_error);
    let mut success = !interrupted && !action_failed && !store.non_repairable();
    let mut errors = Vec::new();

    if !interrupted && !action_failed {
        // An error-edge detour may have left a stale failed marker even
        // though the traversal ended cleanly; a resume must not re-enter it.
        let mut checkpoint = store.checkpoint();
        if checkpoint.failed_node.is_some() {
            checkpoint.failed_node = None;
            store.set_checkpoint(&checkpoint);
        }
    }

    let mut output_data = Value::Null;
    if success {
        match extract_outputs(compiled, store) {
            Ok(data) => output_data = data,
            Err(err) => {
                // A declared output that cannot be produced fails the run.
                success = false;
                let mut record = ErrorRecord::static_validation(err.to_string());
                record.source = "runtime".to_string();
                record.category = crate::errors::ErrorCategory::TemplateError;
                errors.push(record);
            }
        }
    }

    if !success && errors.is_empty() {
        if let Some(record) = interruption {
            errors.push(record);
        } else {
            let action = terminal.clone().unwrap_or_else(Action::default_action);
            errors.push(extract_runtime_error(
                &action,
                store,
                |id| compiled.node_type(id).map(str::to_string),
                env.config.raw_response_budget,
            ));
        }
    }

    ExecutionResult {
        success,
        shared_after: store.snapshot(),
        errors,
        action_result: terminal,
        node_count: step as usize,
        duration: started.elapsed(),
        output_data,
        metrics_summary: env.hooks.metrics.summary(),
        repaired_workflow_ir: None,
    }
}

/// Seed declared inputs into the store: caller params override, declared
/// defaults fill gaps without clobbering resumed state.
fn seed_inputs(compiled: &CompiledFlow, store: &mut SharedStore, params: &JsonMap) {
    for (name, decl) in &compiled.inputs {
        if let Some(value) = params.get(name) {
            store.insert(name.clone(), value.clone());
        } else if let Some(default) = &decl.default {
            if store.get(name).is_none() {
                store.insert(name.clone(), default.clone());
            }
        }
    }
}

/// Declared input defaults as the lowest-precedence resolver layer.
fn default_layer(compiled: &CompiledFlow) -> JsonMap {
    let mut layer = JsonMap::new();
    for (name, decl) in &compiled.inputs {
        if let Some(default) = &decl.default {
            layer.insert(name.clone(), default.clone());
        }
    }
    layer
}

/// Evaluate `outputs[*].source` against the final store.
///
/// A single declared output yields its bare value; several yield an object
/// keyed by output name; none yields `Null`. Resolution honors the IR's
/// template mode, so permissive workflows degrade instead of failing here.
fn extract_outputs(compiled: &CompiledFlow, store: &SharedStore) -> Result<Value, TemplateError> {
    if compiled.outputs.is_empty() {
        return Ok(Value::Null);
    }
    let snapshot = store.snapshot();
    let ctx = ResolveContext::new().layer(&snapshot);
    let mode = compiled.mode;

    let mut extracted = JsonMap::new();
    for (name, decl) in &compiled.outputs {
        let resolution = resolve_value(&Value::String(decl.source.clone()), &ctx, mode)?;
        extracted.insert(name.clone(), resolution.value);
    }
    if extracted.len() == 1 {
        let value = extracted
            .into_iter()
            .next()
            .map(|(_, v)| v)
            .unwrap_or(Value::Null);
        return Ok(value);
    }
    Ok(Value::Object(extracted))
}

/// Build a failed result without running anything (validation failures,
/// exhausted repair loops).
#[must_use]
pub fn failed_result(
    errors: Vec<ErrorRecord>,
    shared_after: JsonMap,
    metrics_summary: Value,
) -> ExecutionResult {
    ExecutionResult {
        success: false,
        shared_after,
        errors,
        action_result: None,
        node_count: 0,
        duration: Duration::ZERO,
        output_data: Value::Null,
        metrics_summary,
        repaired_workflow_ir: None,
    }
}
