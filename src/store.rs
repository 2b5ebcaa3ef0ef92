//! Per-run shared store and the execution checkpoint.
//!
//! The shared store is the single state carrier of a run: a JSON object whose
//! top level holds declared inputs, one namespace per executed node, and a
//! small set of `__`-prefixed system keys. The checkpoint lives *inside* the
//! store under [`keys::EXECUTION`]; nothing about resume state is persisted
//! anywhere else, so handing `shared_after` back as `resume_state` is all a
//! caller needs to continue a run.
//!
//! Each run exclusively owns its store; the instrumented wrapper is the only
//! writer during an attempt, the orchestrator the only writer between
//! attempts.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use rustc_hash::FxHashMap;

use crate::types::{Action, JsonMap};

/// System key names inside the shared store.
pub mod keys {
    /// The checkpoint: completed nodes, hashes, actions, failed node.
    pub const EXECUTION: &str = "__execution__";
    /// Node ids served from cache during the current attempt.
    pub const CACHE_HITS: &str = "__cache_hits__";
    /// Per-node API warning summaries.
    pub const WARNINGS: &str = "__warnings__";
    /// Set when a failure is known to be beyond repair (auth, 404, ...).
    pub const NON_REPAIRABLE: &str = "__non_repairable_error__";
    /// Union of node ids modified across repair attempts.
    pub const MODIFIED_NODES: &str = "__modified_nodes__";
    /// Log of LLM calls made on behalf of this run.
    pub const LLM_CALLS: &str = "__llm_calls__";
}

/// Output keys the wrapper also surfaces at the store's top level so older
/// workflows can reference them without a node-id prefix.
pub const SURFACED_OUTPUT_KEYS: &[&str] = &["response", "result"];

// ============================================================================
// Checkpoint
// ============================================================================

/// Resume state of one run: which nodes completed, under which param hashes,
/// with which actions, and where execution stopped.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionCheckpoint {
    #[serde(default)]
    pub completed_nodes: Vec<String>,
    #[serde(default)]
    pub node_actions: FxHashMap<String, Action>,
    #[serde(default)]
    pub node_hashes: FxHashMap<String, String>,
    #[serde(default)]
    pub failed_node: Option<String>,
}

impl ExecutionCheckpoint {
    /// The cached action for `id`, iff `id` completed under the same param
    /// hash with a non-error action. `None` means the node must execute.
    #[must_use]
    pub fn cached_action(&self, id: &str, hash: &str) -> Option<&Action> {
        if !self.completed_nodes.iter().any(|n| n == id) {
            return None;
        }
        if self.node_hashes.get(id).map(String::as_str) != Some(hash) {
            return None;
        }
        self.node_actions.get(id).filter(|action| !action.is_error())
    }

    /// Record a successful node execution.
    ///
    /// A node re-executed after invalidation is moved to the end of
    /// `completed_nodes` rather than duplicated. A success clears
    /// `failed_node` when it was this node.
    pub fn record_success(&mut self, id: &str, hash: String, action: Action) {
        self.completed_nodes.retain(|n| n != id);
        self.completed_nodes.push(id.to_string());
        self.node_hashes.insert(id.to_string(), hash);
        self.node_actions.insert(id.to_string(), action);
        if self.failed_node.as_deref() == Some(id) {
            self.failed_node = None;
        }
    }

    /// Record a failed node execution.
    ///
    /// Failed nodes never join `completed_nodes`; their hash and action are
    /// still recorded for diagnostics, and `failed_node` marks the resume
    /// point.
    pub fn record_failure(&mut self, id: &str, hash: String, action: Action) {
        self.completed_nodes.retain(|n| n != id);
        self.node_hashes.insert(id.to_string(), hash);
        self.node_actions.insert(id.to_string(), action);
        self.failed_node = Some(id.to_string());
    }

    /// Invalidate the checkpoint entries for `modified` nodes and everything
    /// ordered after the earliest of them.
    ///
    /// After a repair, every node at or past the first modification may see
    /// different inputs and must re-execute. `failed_node` is repointed at
    /// the earliest modified node so the next attempt resumes there.
    pub fn invalidate_descendants(&mut self, modified: &[String], order: &[String]) {
        let first = order.iter().position(|id| modified.contains(id));
        let Some(first) = first else {
            // Only brand-new nodes changed; nothing recorded yet to drop.
            return;
        };
        let stale: Vec<&String> = order[first..].iter().collect();
        for id in &stale {
            self.completed_nodes.retain(|n| n != *id);
            self.node_hashes.remove(*id);
            self.node_actions.remove(*id);
        }
        self.failed_node = Some(order[first].clone());
    }
}

// ============================================================================
// Shared store
// ============================================================================

/// The per-run mutable state carrier.
#[derive(Clone, Debug, Default)]
pub struct SharedStore {
    root: JsonMap,
}

impl SharedStore {
    /// Fresh store with an empty checkpoint.
    #[must_use]
    pub fn new() -> Self {
        let mut store = Self { root: JsonMap::new() };
        store.set_checkpoint(&ExecutionCheckpoint::default());
        store
    }

    /// Wrap an inherited store (resume), initializing the checkpoint if the
    /// caller's map lacks one.
    #[must_use]
    pub fn from_map(root: JsonMap) -> Self {
        let mut store = Self { root };
        if !store.root.contains_key(keys::EXECUTION) {
            store.set_checkpoint(&ExecutionCheckpoint::default());
        }
        store
    }

    /// The underlying JSON object.
    #[must_use]
    pub fn as_map(&self) -> &JsonMap {
        &self.root
    }

    /// Consume into the underlying JSON object (for `shared_after`).
    #[must_use]
    pub fn into_map(self) -> JsonMap {
        self.root
    }

    /// Clone of the top level, used as the template resolution layer and the
    /// per-node read-only context snapshot.
    #[must_use]
    pub fn snapshot(&self) -> JsonMap {
        self.root.clone()
    }

    /// Read a top-level value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.root.get(key)
    }

    /// Write a top-level value (input seeding, surfaced output keys).
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.root.insert(key.into(), value);
    }

    // ------------------------------------------------------------------
    // Checkpoint accessors
    // ------------------------------------------------------------------

    /// Deserialize the checkpoint, defaulting when absent or malformed.
    #[must_use]
    pub fn checkpoint(&self) -> ExecutionCheckpoint {
        self.root
            .get(keys::EXECUTION)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    /// Serialize the checkpoint back into the store.
    pub fn set_checkpoint(&mut self, checkpoint: &ExecutionCheckpoint) {
        let value = serde_json::to_value(checkpoint).unwrap_or(Value::Null);
        self.root.insert(keys::EXECUTION.to_string(), value);
    }

    // ------------------------------------------------------------------
    // Node namespaces
    // ------------------------------------------------------------------

    /// Outputs previously stored under a node's namespace.
    #[must_use]
    pub fn node_outputs(&self, id: &str) -> Option<&JsonMap> {
        self.root.get(id).and_then(Value::as_object)
    }

    /// Store a node's outputs under its namespace and surface whitelisted
    /// keys at the top level. The namespace stays authoritative.
    pub fn set_node_outputs(&mut self, id: &str, outputs: JsonMap) {
        for key in SURFACED_OUTPUT_KEYS {
            if let Some(value) = outputs.get(*key) {
                self.root.insert((*key).to_string(), value.clone());
            }
        }
        self.root.insert(id.to_string(), Value::Object(outputs));
    }

    // ------------------------------------------------------------------
    // System keys
    // ------------------------------------------------------------------

    /// Reset the per-attempt cache hit list.
    pub fn clear_cache_hits(&mut self) {
        self.root
            .insert(keys::CACHE_HITS.to_string(), Value::Array(Vec::new()));
    }

    /// Append a node id served from cache this attempt.
    pub fn push_cache_hit(&mut self, id: &str) {
        match self
            .root
            .entry(keys::CACHE_HITS.to_string())
            .or_insert_with(|| Value::Array(Vec::new()))
        {
            Value::Array(items) => items.push(Value::String(id.to_string())),
            other => *other = Value::Array(vec![Value::String(id.to_string())]),
        }
    }

    /// Node ids served from cache this attempt.
    #[must_use]
    pub fn cache_hits(&self) -> Vec<String> {
        self.string_list(keys::CACHE_HITS)
    }

    /// Record an API warning summary for a node.
    pub fn add_warning(&mut self, node_id: &str, summary: Value) {
        match self
            .root
            .entry(keys::WARNINGS.to_string())
            .or_insert_with(|| Value::Object(JsonMap::new()))
        {
            Value::Object(map) => {
                map.insert(node_id.to_string(), summary);
            }
            other => {
                let mut map = JsonMap::new();
                map.insert(node_id.to_string(), summary);
                *other = Value::Object(map);
            }
        }
    }

    /// The warning summary recorded for a node, if any.
    #[must_use]
    pub fn warning(&self, node_id: &str) -> Option<&Value> {
        self.root
            .get(keys::WARNINGS)
            .and_then(Value::as_object)
            .and_then(|map| map.get(node_id))
    }

    /// Mark the run as failed beyond repair.
    pub fn set_non_repairable(&mut self) {
        self.root
            .insert(keys::NON_REPAIRABLE.to_string(), Value::Bool(true));
    }

    /// Whether a non-repairable failure was observed.
    #[must_use]
    pub fn non_repairable(&self) -> bool {
        self.root
            .get(keys::NON_REPAIRABLE)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Union repair-modified node ids into `__modified_nodes__`.
    pub fn add_modified_nodes(&mut self, ids: &[String]) {
        let mut merged = self.string_list(keys::MODIFIED_NODES);
        for id in ids {
            if !merged.contains(id) {
                merged.push(id.clone());
            }
        }
        self.root.insert(
            keys::MODIFIED_NODES.to_string(),
            Value::Array(merged.into_iter().map(Value::String).collect()),
        );
    }

    /// Node ids modified by repairs so far.
    #[must_use]
    pub fn modified_nodes(&self) -> Vec<String> {
        self.string_list(keys::MODIFIED_NODES)
    }

    /// Append a record of an LLM call made for this run.
    pub fn record_llm_call(&mut self, info: Value) {
        match self
            .root
            .entry(keys::LLM_CALLS.to_string())
            .or_insert_with(|| Value::Array(Vec::new()))
        {
            Value::Array(items) => items.push(info),
            other => *other = Value::Array(vec![info]),
        }
    }

    fn string_list(&self, key: &str) -> Vec<String> {
        self.root
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cache_requires_membership_hash_and_success() {
        let mut cp = ExecutionCheckpoint::default();
        cp.record_success("a", "h1".into(), Action::default_action());
        assert!(cp.cached_action("a", "h1").is_some());
        assert!(cp.cached_action("a", "h2").is_none());
        assert!(cp.cached_action("b", "h1").is_none());

        cp.record_failure("b", "h3".into(), Action::from("error:execution_failure"));
        assert!(cp.cached_action("b", "h3").is_none());
        assert!(!cp.completed_nodes.contains(&"b".to_string()));
        assert_eq!(cp.failed_node.as_deref(), Some("b"));
    }

    #[test]
    fn success_clears_own_failure() {
        let mut cp = ExecutionCheckpoint::default();
        cp.record_failure("a", "h".into(), Action::from("error"));
        cp.record_success("a", "h2".into(), Action::default_action());
        assert!(cp.failed_node.is_none());
        assert_eq!(cp.completed_nodes, vec!["a"]);
    }

    #[test]
    fn invalidation_drops_suffix_and_repoints_failed_node() {
        let order: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let mut cp = ExecutionCheckpoint::default();
        for id in &order {
            cp.record_success(id, format!("h-{id}"), Action::default_action());
        }
        cp.invalidate_descendants(&["b".to_string()], &order);
        assert_eq!(cp.completed_nodes, vec!["a"]);
        assert!(cp.node_hashes.contains_key("a"));
        assert!(!cp.node_hashes.contains_key("c"));
        assert_eq!(cp.failed_node.as_deref(), Some("b"));
    }

    #[test]
    fn surfaced_keys_reach_top_level() {
        let mut store = SharedStore::new();
        let outputs: JsonMap =
            serde_json::from_value(json!({"response": {"ok": true}, "count": 2})).unwrap();
        store.set_node_outputs("fetch", outputs);
        assert_eq!(store.get("response"), Some(&json!({"ok": true})));
        assert!(store.get("count").is_none());
        assert_eq!(
            store.node_outputs("fetch").unwrap().get("count"),
            Some(&json!(2))
        );
    }

    #[test]
    fn modified_nodes_union() {
        let mut store = SharedStore::new();
        store.add_modified_nodes(&["a".to_string(), "b".to_string()]);
        store.add_modified_nodes(&["b".to_string(), "c".to_string()]);
        assert_eq!(store.modified_nodes(), vec!["a", "b", "c"]);
    }
}
