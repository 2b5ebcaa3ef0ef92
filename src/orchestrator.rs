//! The repair orchestrator and the `execute_workflow` facade.
//!
//! One call to [`Orchestrator::execute`] performs the whole lifecycle and
//! returns exactly one [`ExecutionResult`], never raising for run failures:
//!
//! - **Phase 1** validates the IR, looping through the repair client while
//!   validation keeps failing (bounded by `max_validation_attempts`)
//! - **Phase 2** compiles and executes, and on failure extracts structured
//!   errors, requests a repair, re-validates the candidate, invalidates the
//!   checkpoint for modified nodes and their descendants, and resumes
//!   (bounded by `max_runtime_loops` × `max_inner_repairs`)
//!
//! Loop detection cuts phase 2 short when an attempt reproduces an error
//! signature already seen; non-repairable failures suppress repair entirely,
//! in both phases.

use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::errors::{ErrorRecord, error_signature};
use crate::graph::{compile, execution_order};
use crate::hooks::{LlmCallInfo, NodeStatus, RunHooks};
use crate::ir::WorkflowIr;
use crate::manager::WorkflowManager;
use crate::registry::Registry;
use crate::repair::{RepairClient, RepairOutcome, shared_excerpt};
use crate::runtime::config::RuntimeConfig;
use crate::runtime::executor::{ExecutionEnv, ExecutionResult, execute, failed_result};
use crate::store::SharedStore;
use crate::types::JsonMap;
use crate::validate::validate;

/// Param key under which callers pass opaque planner cache chunks through to
/// the repair client.
pub const PLANNER_CACHE_PARAM: &str = "__planner_cache_chunks__";

/// Per-call options for [`Orchestrator::execute`].
#[derive(Clone, Debug, Default)]
pub struct ExecuteOptions {
    /// Allow LLM-driven repair of validation and runtime failures.
    pub enable_repair: bool,
    /// A previous run's `shared_after`, to resume from its checkpoint.
    pub resume_state: Option<JsonMap>,
    /// Raw stdin payload, routed into the sole `stdin: true` input.
    pub stdin_data: Option<Value>,
    /// Narrow `output_data` to one declared output.
    pub output_key: Option<String>,
    /// Name under the workflow manager, for execution bookkeeping.
    pub workflow_name: Option<String>,
    /// Persist a repaired IR back to the manager (default on).
    pub persist_repaired_ir: Option<bool>,
    /// Cooperative cancellation, honored at node boundaries.
    pub cancellation: tokio_util::sync::CancellationToken,
    /// Absolute deadline, honored between nodes.
    pub deadline: Option<tokio::time::Instant>,
}

/// Drives validation, execution, and repair for workflow runs.
///
/// The orchestrator owns the long-lived collaborators (registry, repair
/// client, workflow manager, hooks, config); per-run state arrives through
/// [`ExecuteOptions`] and the shared store. One orchestrator serves any
/// number of concurrent runs.
#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<Registry>,
    repair_client: Option<Arc<dyn RepairClient>>,
    manager: Option<Arc<WorkflowManager>>,
    config: RuntimeConfig,
    hooks: RunHooks,
}

impl Orchestrator {
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            repair_client: None,
            manager: None,
            config: RuntimeConfig::default(),
            hooks: RunHooks::noop(),
        }
    }

    #[must_use]
    pub fn with_repair_client(mut self, client: Arc<dyn RepairClient>) -> Self {
        self.repair_client = Some(client);
        self
    }

    #[must_use]
    pub fn with_workflow_manager(mut self, manager: Arc<WorkflowManager>) -> Self {
        self.manager = Some(manager);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: RunHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Execute a workflow to completion, repairing when enabled.
    ///
    /// Exactly one result is returned per call, regardless of how many
    /// repair attempts happen along the way.
    pub async fn execute(
        &self,
        ir: WorkflowIr,
        params: JsonMap,
        options: ExecuteOptions,
    ) -> ExecutionResult {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "workflow_run",
            %run_id,
            workflow = options.workflow_name.as_deref().unwrap_or("<anonymous>")
        );
        self.execute_inner(ir, params, options).instrument(span).await
    }

    async fn execute_inner(
        &self,
        ir: WorkflowIr,
        params: JsonMap,
        options: ExecuteOptions,
    ) -> ExecutionResult {
        let mut params = params;
        if let Some(stdin_data) = options.stdin_data.clone() {
            match ir.stdin_input() {
                Some((name, _)) => {
                    // Caller-provided params win over stdin (which itself
                    // wins over the input's declared default).
                    params
                        .entry(name.to_string())
                        .or_insert(stdin_data);
                }
                None => {
                    return failed_result(
                        vec![ErrorRecord::static_validation(
                            "stdin data was provided but no input declares `stdin: true`; \
                             suggestion: mark exactly one input with `stdin: true`",
                        )],
                        options.resume_state.clone().unwrap_or_default(),
                        self.hooks.metrics.summary(),
                    );
                }
            }
        }

        let mut store = match options.resume_state.clone() {
            Some(map) => SharedStore::from_map(map),
            None => SharedStore::new(),
        };

        // ------------------------------------------------------------------
        // Phase 1: validation repair loop
        // ------------------------------------------------------------------
        let mut ir = ir;
        let mut any_repair = false;
        let mut valid = false;
        let mut last_records: Vec<ErrorRecord> = Vec::new();
        for attempt in 0..self.config.max_validation_attempts.max(1) {
            let validation_errors =
                validate(&ir, Some(&params), Some(self.registry.as_ref()), false);
            if validation_errors.is_empty() {
                valid = true;
                break;
            }
            let records: Vec<ErrorRecord> = validation_errors
                .iter()
                .map(ErrorRecord::static_validation)
                .collect();

            let repairable = options.enable_repair
                && self.repair_client.is_some()
                && !store.non_repairable();
            if !repairable {
                tracing::info!(
                    errors = validation_errors.len(),
                    "validation failed, repair unavailable"
                );
                return failed_result(records, store.snapshot(), self.hooks.metrics.summary());
            }

            let empty_excerpt = JsonMap::new();
            let Some(outcome) = self
                .request_repair(&ir, &records, &empty_excerpt, &params, &mut store)
                .await
            else {
                return failed_result(records, store.snapshot(), self.hooks.metrics.summary());
            };
            ir = outcome.candidate_ir;
            any_repair = true;
            last_records = records;
            self.hooks.output.show_progress(
                &format!(
                    "repaired validation errors (attempt {}): {}",
                    attempt + 1,
                    outcome.rationale
                ),
                false,
            );
        }
        if !valid {
            // Attempts exhausted: the last observed validation errors stand;
            // the repair applied after them is never validated or executed.
            tracing::info!("validation repair attempts exhausted");
            return failed_result(last_records, store.snapshot(), self.hooks.metrics.summary());
        }

        // ------------------------------------------------------------------
        // Phase 2: runtime execution with repair
        // ------------------------------------------------------------------
        let env = ExecutionEnv {
            hooks: self.hooks.clone(),
            cancellation: options.cancellation.clone(),
            deadline: options.deadline,
            config: self.config.clone(),
        };
        let mut seen_signatures: Vec<String> = Vec::new();
        let attempts = self.config.max_runtime_loops.max(1);

        for outer in 0..attempts {
            let compiled = match compile(&ir, &self.registry) {
                Ok(compiled) => compiled,
                Err(err) => {
                    return failed_result(
                        vec![ErrorRecord::static_validation(err.to_string())],
                        store.snapshot(),
                        self.hooks.metrics.summary(),
                    );
                }
            };

            let mut result = execute(&compiled, &mut store, &params, &env).await;

            if result.success {
                result.repaired_workflow_ir = any_repair.then(|| ir.clone());
                self.select_output(&mut result, &options, ir.outputs.len());
                self.bookkeep(&options, &result, &ir);
                return result;
            }

            let cancelled = options.cancellation.is_cancelled();
            let last_attempt = outer + 1 == attempts;
            let repairable = options.enable_repair
                && self.repair_client.is_some()
                && !store.non_repairable()
                && !cancelled
                && !last_attempt;
            if !repairable {
                return result;
            }

            let signature = result
                .errors
                .first()
                .map(error_signature)
                .unwrap_or_default();
            if seen_signatures.contains(&signature) {
                tracing::info!(%signature, "repair loop detected, giving up");
                return result;
            }
            seen_signatures.push(signature);

            let Some(outcome) = self
                .repair_runtime_failure(&ir, &result, &compiled.order, &params, &mut store)
                .await
            else {
                return result;
            };

            // Invalidate the checkpoint for modified nodes and everything
            // downstream of them in the candidate's execution order.
            let order = execution_order(&outcome.candidate_ir.nodes, &outcome.candidate_ir.edges)
                .unwrap_or_else(|_| compiled.order.clone());
            let mut checkpoint = store.checkpoint();
            checkpoint.invalidate_descendants(&outcome.modified_node_ids, &order);
            store.set_checkpoint(&checkpoint);
            store.add_modified_nodes(&outcome.modified_node_ids);
            for id in &outcome.modified_node_ids {
                self.hooks.output.show_node(id, NodeStatus::Repaired, None);
            }

            ir = outcome.candidate_ir;
            any_repair = true;
            tracing::info!(
                attempt = outer + 1,
                modified = ?outcome.modified_node_ids,
                "applied runtime repair, resuming from checkpoint"
            );
        }

        // attempts >= 1 and the last iteration always returns.
        unreachable!("runtime loop returns on its final attempt")
    }

    /// Inner repair loop for one runtime failure: request a candidate, feed
    /// validation errors back in until one validates or attempts run out.
    async fn repair_runtime_failure(
        &self,
        ir: &WorkflowIr,
        result: &ExecutionResult,
        order: &[String],
        params: &JsonMap,
        store: &mut SharedStore,
    ) -> Option<RepairOutcome> {
        let failed_node = result
            .errors
            .first()
            .and_then(|record| record.node_id.clone());
        let excerpt = shared_excerpt(store, failed_node.as_deref(), order);
        let mut feedback = result.errors.clone();

        for _ in 0..self.config.max_inner_repairs.max(1) {
            let outcome = self
                .request_repair(ir, &feedback, &excerpt, params, store)
                .await?;
            let validation_errors = validate(
                &outcome.candidate_ir,
                Some(params),
                Some(self.registry.as_ref()),
                false,
            );
            if validation_errors.is_empty() {
                return Some(outcome);
            }
            tracing::debug!(
                errors = validation_errors.len(),
                "repair candidate failed validation, feeding back"
            );
            feedback = validation_errors
                .iter()
                .map(ErrorRecord::static_validation)
                .collect();
        }
        None
    }

    /// One bounded call to the repair client, with metrics and store
    /// accounting. `None` means no usable repair (transport failure or an
    /// empty-change response).
    async fn request_repair(
        &self,
        ir: &WorkflowIr,
        errors: &[ErrorRecord],
        excerpt: &JsonMap,
        params: &JsonMap,
        store: &mut SharedStore,
    ) -> Option<RepairOutcome> {
        let client = self.repair_client.as_ref()?;
        let cache_hints = params.get(PLANNER_CACHE_PARAM);

        let started = Instant::now();
        let response = client
            .repair(ir, errors, excerpt, params, cache_hints)
            .await;
        let duration = started.elapsed();

        self.hooks.metrics.record_llm(&LlmCallInfo {
            purpose: "repair".to_string(),
            duration,
            model: None,
        });
        store.record_llm_call(json!({
            "purpose": "repair",
            "duration_ms": duration.as_millis() as u64,
            "errors": errors.len(),
        }));

        match response {
            Ok(outcome) if outcome.modified_node_ids.is_empty() => {
                tracing::info!("repair client reported no possible change");
                None
            }
            Ok(outcome) => Some(outcome),
            Err(err) => {
                tracing::warn!(%err, "repair client failed");
                None
            }
        }
    }

    /// Narrow `output_data` to the requested output when several exist.
    ///
    /// A single declared output is already extracted as its bare value, so
    /// there is nothing to narrow — even when that value happens to be an
    /// object.
    fn select_output(
        &self,
        result: &mut ExecutionResult,
        options: &ExecuteOptions,
        output_count: usize,
    ) {
        let Some(key) = &options.output_key else {
            return;
        };
        if output_count <= 1 {
            return;
        }
        match std::mem::take(&mut result.output_data) {
            Value::Object(mut map) => {
                result.output_data = map.remove(key).unwrap_or(Value::Null);
            }
            other => result.output_data = other,
        }
    }

    /// Post-success workflow manager bookkeeping. Failures here are logged,
    /// never surfaced: the run's one result is already decided.
    fn bookkeep(&self, options: &ExecuteOptions, result: &ExecutionResult, ir: &WorkflowIr) {
        let (Some(manager), Some(name)) = (&self.manager, &options.workflow_name) else {
            return;
        };
        if let Err(err) = manager.record_execution(name, result.success, result.duration) {
            tracing::warn!(%err, workflow = %name, "failed to record execution metadata");
        }
        let persist = options.persist_repaired_ir.unwrap_or(true);
        if persist && result.repaired_workflow_ir.is_some() {
            if let Err(err) = manager.update_ir(name, ir) {
                tracing::warn!(%err, workflow = %name, "failed to persist repaired IR");
            }
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("repair_enabled", &self.repair_client.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Convenience facade: execute a workflow with an ad-hoc orchestrator.
///
/// Equivalent to building an [`Orchestrator`] with the given registry and
/// calling [`Orchestrator::execute`]; long-lived services should construct
/// the orchestrator once instead.
pub async fn execute_workflow(
    ir: WorkflowIr,
    params: JsonMap,
    registry: Arc<Registry>,
    options: ExecuteOptions,
) -> ExecutionResult {
    Orchestrator::new(registry).execute(ir, params, options).await
}
