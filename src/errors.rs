//! Structured error records, runtime error extraction, and loop signatures.
//!
//! Failures never cross the engine's public API as raised errors; they are
//! captured as [`ErrorRecord`] values on the execution result
//! (see [`crate::runtime::executor`]). The records carry enough per-node
//! context (status codes, raw responses, available fields) for the repair
//! client to act on, and normalize into [`error_signature`]s so the
//! orchestrator can detect repair loops.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

use crate::store::SharedStore;
use crate::types::Action;

/// Classification of a failure, driving repair strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// External system rejected the request with structured validation detail.
    ApiValidation,
    /// A `${...}` reference failed to resolve at execution time.
    TemplateError,
    /// Unhandled breakage inside a node.
    ExecutionFailure,
    /// The IR failed validation before execution.
    StaticValidation,
}

/// One structured failure, rich enough to drive an LLM repair.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Where the failure was observed: `"runtime"` or `"validation"`.
    pub source: String,
    pub category: ErrorCategory,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    /// Whether a repair attempt could plausibly fix this.
    pub fixable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<Value>,
    /// Keys visible in the failed node's namespace; aids template repairs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_fields: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Set when `raw_response` was cut down to the configured byte budget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncated: Option<bool>,
}

impl ErrorRecord {
    /// A pre-execution validation failure.
    #[must_use]
    pub fn static_validation(message: impl Into<String>) -> Self {
        Self {
            source: "validation".to_string(),
            category: ErrorCategory::StaticValidation,
            message: message.into(),
            node_id: None,
            node_type: None,
            action: None,
            fixable: true,
            status_code: None,
            raw_response: None,
            response_headers: None,
            available_fields: None,
            hint: None,
            truncated: None,
        }
    }

    /// A run aborted by the caller's cancellation signal or deadline.
    #[must_use]
    pub fn cancelled(reason: &str, next_node: Option<&str>) -> Self {
        let message = match next_node {
            Some(id) => format!("execution {reason} before node `{id}`"),
            None => format!("execution {reason}"),
        };
        Self {
            source: "runtime".to_string(),
            category: ErrorCategory::ExecutionFailure,
            message,
            node_id: next_node.map(str::to_string),
            node_type: None,
            action: None,
            fixable: false,
            status_code: None,
            raw_response: None,
            response_headers: None,
            available_fields: None,
            hint: Some("re-run with the returned shared store to resume".to_string()),
            truncated: None,
        }
    }
}

/// Count of namespace keys reported through `available_fields`.
const AVAILABLE_FIELDS_CAP: usize = 20;

static VALIDATION_MESSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(input should be|field required|validation error)").expect("valid regex")
});

/// Whether a message looks like structured API validation feedback.
pub(crate) fn looks_like_validation_message(message: &str) -> bool {
    VALIDATION_MESSAGE.is_match(message)
}

/// Build the structured record for a failed attempt (§ extraction contract).
///
/// `node_type_of` resolves a node id to its registry type; `raw_budget` caps
/// the serialized size of `raw_response` (a `truncated` flag is set when the
/// cap applies).
pub fn extract_runtime_error(
    action: &Action,
    store: &SharedStore,
    node_type_of: impl Fn(&str) -> Option<String>,
    raw_budget: usize,
) -> ErrorRecord {
    let checkpoint = store.checkpoint();
    let mut failed = checkpoint.failed_node.clone();
    if failed.is_none() && store.non_repairable() {
        // No node failed its action, but a warning marked the run beyond
        // repair (e.g. an auth failure on an otherwise-routing node).
        failed = store
            .get(crate::store::keys::WARNINGS)
            .and_then(Value::as_object)
            .and_then(|warnings| warnings.keys().next().cloned());
    }
    let namespace = failed.as_deref().and_then(|id| store.node_outputs(id));

    let message = store
        .get("error")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            namespace
                .and_then(|ns| ns.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| match &failed {
            Some(id) => format!("node `{id}` returned action `{action}`"),
            None => format!("workflow terminated with action `{action}`"),
        });

    let status_code = namespace
        .and_then(|ns| ns.get("status_code"))
        .and_then(Value::as_u64)
        .and_then(|code| u16::try_from(code).ok());

    let mut record = ErrorRecord {
        source: "runtime".to_string(),
        category: ErrorCategory::ExecutionFailure,
        message,
        node_id: failed.clone(),
        node_type: failed.as_deref().and_then(&node_type_of),
        action: Some(action.clone()),
        fixable: !store.non_repairable(),
        status_code,
        raw_response: None,
        response_headers: None,
        available_fields: None,
        hint: None,
        truncated: None,
    };

    let template_failure = action.as_str().starts_with(Action::TEMPLATE_FAILED)
        || (record.message.contains("${") && record.message.contains("resolve"));
    let api_validation = VALIDATION_MESSAGE.is_match(&record.message)
        || matches!(status_code, Some(code) if (400..500).contains(&code) && record.fixable);

    if template_failure {
        record.category = ErrorCategory::TemplateError;
        record.available_fields = Some(available_fields(store, failed.as_deref()));
        record.hint = Some(
            "reference a declared input or an upstream node's output field".to_string(),
        );
    } else if api_validation {
        record.category = ErrorCategory::ApiValidation;
        if let Some(ns) = namespace {
            let (raw, truncated) = ns
                .get("raw_response")
                .map(|raw| truncate_raw(raw, raw_budget))
                .unwrap_or((None, None));
            record.raw_response = raw;
            record.truncated = truncated;
            record.response_headers = ns.get("response_headers").cloned();
        }
    }

    record
}

/// Keys the failed node can see: its own namespace when present, otherwise
/// the store's non-system top level. Capped at [`AVAILABLE_FIELDS_CAP`].
fn available_fields(store: &SharedStore, failed: Option<&str>) -> Vec<String> {
    let keys: Vec<String> = match failed.and_then(|id| store.node_outputs(id)) {
        Some(ns) => ns.keys().cloned().collect(),
        None => store
            .as_map()
            .keys()
            .filter(|k| !k.starts_with("__"))
            .cloned()
            .collect(),
    };
    keys.into_iter().take(AVAILABLE_FIELDS_CAP).collect()
}

/// Cap a raw response at `budget` serialized bytes.
///
/// An oversized response is replaced with its truncated serialization (the
/// repair client still sees the leading structure) and flagged.
fn truncate_raw(raw: &Value, budget: usize) -> (Option<Value>, Option<bool>) {
    let serialized = raw.to_string();
    if serialized.len() <= budget {
        return (Some(raw.clone()), None);
    }
    let mut cut = budget;
    while cut > 0 && !serialized.is_char_boundary(cut) {
        cut -= 1;
    }
    (Some(Value::String(serialized[..cut].to_string())), Some(true))
}

// ============================================================================
// Signatures
// ============================================================================

static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .expect("valid regex")
});
static TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:?\d{2})?")
        .expect("valid regex")
});
static DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+(\.\d+)?\s*(ms|s|m|h)\b").expect("valid regex"));
static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+(\.\d+)?\b").expect("valid regex"));

/// Normalized identity of a failure, used for repair loop detection.
///
/// Volatile fragments (timestamps, UUIDs, durations, numeric literals) are
/// replaced with fixed placeholders so two occurrences of the same failure
/// compare equal across attempts.
#[must_use]
pub fn error_signature(record: &ErrorRecord) -> String {
    let mut message = record.message.clone();
    message = UUID_RE.replace_all(&message, "<uuid>").into_owned();
    message = TIMESTAMP_RE.replace_all(&message, "<ts>").into_owned();
    message = DURATION_RE.replace_all(&message, "<dur>").into_owned();
    message = NUMBER_RE.replace_all(&message, "#").into_owned();
    format!(
        "{}:{}:{}",
        serde_json::to_string(&record.category).unwrap_or_default(),
        record.node_id.as_deref().unwrap_or("-"),
        message
    )
}
