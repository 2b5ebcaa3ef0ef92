//! Observer hooks for progress, tracing, and metrics.
//!
//! The engine reports per-node progress and repair activity through three
//! optional observer traits. All methods have no-op defaults, so callers
//! implement only what they need; [`RunHooks`] bundles the three behind
//! `Arc`s with no-op instances as the default.
//!
//! Hook calls never influence control flow: the engine does not inspect
//! their results and they must not block for long.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::types::JsonMap;

/// Lifecycle states reported per node visit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeStatus {
    Start,
    Completed,
    Cached,
    Error,
    Repaired,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Completed => write!(f, "completed"),
            Self::Cached => write!(f, "cached"),
            Self::Error => write!(f, "error"),
            Self::Repaired => write!(f, "repaired"),
        }
    }
}

/// Human-facing progress reporting.
pub trait OutputHook: Send + Sync {
    /// Free-text progress line.
    fn show_progress(&self, _message: &str, _is_error: bool) {}

    /// Per-node status transition.
    fn show_node(&self, _node_id: &str, _status: NodeStatus, _duration: Option<Duration>) {}
}

/// Structured execution tracing.
pub trait TraceHook: Send + Sync {
    /// Record one node execution with its resolved inputs and outputs.
    fn record_node(
        &self,
        _node_id: &str,
        _resolved_inputs: &JsonMap,
        _outputs: &JsonMap,
        _duration: Duration,
    ) {
    }
}

/// Description of one LLM call made on behalf of a run.
#[derive(Clone, Debug)]
pub struct LlmCallInfo {
    /// What the call was for, e.g. `"repair"`.
    pub purpose: String,
    pub duration: Duration,
    pub model: Option<String>,
}

/// LLM accounting.
pub trait MetricsHook: Send + Sync {
    fn record_llm(&self, _call: &LlmCallInfo) {}

    /// Aggregated counters, attached to the execution result.
    fn summary(&self) -> Value {
        Value::Null
    }
}

/// No-op implementation of all three hooks.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHooks;

impl OutputHook for NoopHooks {}
impl TraceHook for NoopHooks {}
impl MetricsHook for NoopHooks {}

/// Progress reporting through the `tracing` subscriber.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingOutput;

impl OutputHook for TracingOutput {
    fn show_progress(&self, message: &str, is_error: bool) {
        if is_error {
            tracing::warn!(%message, "workflow progress");
        } else {
            tracing::info!(%message, "workflow progress");
        }
    }

    fn show_node(&self, node_id: &str, status: NodeStatus, duration: Option<Duration>) {
        tracing::debug!(%node_id, %status, ?duration, "node status");
    }
}

/// The three observers a run carries.
#[derive(Clone)]
pub struct RunHooks {
    pub output: Arc<dyn OutputHook>,
    pub trace: Arc<dyn TraceHook>,
    pub metrics: Arc<dyn MetricsHook>,
}

impl RunHooks {
    /// Hooks that do nothing.
    #[must_use]
    pub fn noop() -> Self {
        Self {
            output: Arc::new(NoopHooks),
            trace: Arc::new(NoopHooks),
            metrics: Arc::new(NoopHooks),
        }
    }

    /// Replace the output observer.
    #[must_use]
    pub fn with_output(mut self, output: Arc<dyn OutputHook>) -> Self {
        self.output = output;
        self
    }

    /// Replace the trace observer.
    #[must_use]
    pub fn with_trace(mut self, trace: Arc<dyn TraceHook>) -> Self {
        self.trace = trace;
        self
    }

    /// Replace the metrics observer.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsHook>) -> Self {
        self.metrics = metrics;
        self
    }
}

impl Default for RunHooks {
    fn default() -> Self {
        Self::noop()
    }
}

impl fmt::Debug for RunHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunHooks").finish_non_exhaustive()
    }
}
