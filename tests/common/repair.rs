#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use pflow::errors::ErrorRecord;
use pflow::ir::WorkflowIr;
use pflow::repair::{RepairClient, RepairError, RepairOutcome};
use pflow::types::JsonMap;

/// Repair client that replays a scripted queue of outcomes and counts calls.
///
/// An exhausted queue answers with an empty-change outcome, which the
/// orchestrator treats as "nothing more to offer".
pub struct ScriptedRepairClient {
    queue: Mutex<Vec<RepairOutcome>>,
    pub calls: AtomicUsize,
}

impl ScriptedRepairClient {
    pub fn new(outcomes: Vec<RepairOutcome>) -> Self {
        let mut queue = outcomes;
        queue.reverse();
        Self {
            queue: Mutex::new(queue),
            calls: AtomicUsize::new(0),
        }
    }

    /// A client whose queue is empty from the start.
    pub fn refusing() -> Self {
        Self::new(Vec::new())
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RepairClient for ScriptedRepairClient {
    async fn repair(
        &self,
        ir: &WorkflowIr,
        _errors: &[ErrorRecord],
        _shared_excerpt: &JsonMap,
        _params: &JsonMap,
        _cache_hints: Option<&Value>,
    ) -> Result<RepairOutcome, RepairError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.queue.lock().expect("queue lock").pop();
        Ok(next.unwrap_or(RepairOutcome {
            candidate_ir: ir.clone(),
            modified_node_ids: Vec::new(),
            rationale: "no change possible".to_string(),
        }))
    }
}

/// Build a one-node-modified outcome.
pub fn repair_outcome(candidate_ir: WorkflowIr, modified: &[&str]) -> RepairOutcome {
    RepairOutcome {
        candidate_ir,
        modified_node_ids: modified.iter().map(|s| s.to_string()).collect(),
        rationale: "scripted".to_string(),
    }
}
