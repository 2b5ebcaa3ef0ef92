//! Five-layer IR validation.
//!
//! [`validate`] runs every layer even when earlier layers found problems, so
//! one pass yields the full report (the repair client works best with all
//! defects at once). Errors are strings prefixed with the JSON-ish path of
//! the offending field and generally end with a suggestion.
//!
//! Layers, in order:
//!
//! 1. **Schema** — field shapes: id syntax, duplicates, purpose length,
//!    start node existence, the single-stdin rule
//! 2. **Dataflow** — edge endpoint existence, acyclicity of non-error
//!    edges, output sources naming real nodes
//! 3. **Template** — every `${...}` root is a declared input, an extracted
//!    param, or a strictly-preceding node; known output fields are checked
//!    against the registry and reported as `tracing` warnings only
//! 4. **Node types** — every `type` exists in the registry (skippable)
//! 5. **JSON-string anti-pattern** — a JSON literal smuggled inside a
//!    template string, a frequent authoring mistake

use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use std::sync::LazyLock;

use crate::graph::order::execution_order;
use crate::ir::WorkflowIr;
use crate::registry::Registry;
use crate::template::collect_references;
use crate::types::JsonMap;

static ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\w+$").expect("valid regex"));
static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\d+\.\d+").expect("valid regex"));

const MAX_PURPOSE_CHARS: usize = 200;

/// Validate a workflow IR. Returns an ordered list of error strings; empty
/// means valid. Never mutates its arguments.
#[must_use]
pub fn validate(
    ir: &WorkflowIr,
    extracted_params: Option<&JsonMap>,
    registry: Option<&Registry>,
    skip_node_types: bool,
) -> Vec<String> {
    let mut errors = Vec::new();

    check_schema(ir, &mut errors);
    let order = check_dataflow(ir, &mut errors);
    check_templates(ir, extracted_params, registry, order.as_deref(), &mut errors);
    if !skip_node_types {
        check_node_types(ir, registry, &mut errors);
    }
    check_json_string_antipattern(ir, &mut errors);

    errors
}

// ============================================================================
// Layer 1: schema
// ============================================================================

fn check_schema(ir: &WorkflowIr, errors: &mut Vec<String>) {
    if !VERSION_RE.is_match(&ir.ir_version) {
        errors.push(format!(
            "ir_version: `{}` is not a semantic version; suggestion: use MAJOR.MINOR.PATCH",
            ir.ir_version
        ));
    }

    if ir.nodes.is_empty() {
        errors.push("nodes: workflow defines no nodes; suggestion: add at least one node".into());
    }

    let mut seen: FxHashSet<&str> = FxHashSet::default();
    for (i, node) in ir.nodes.iter().enumerate() {
        if !ID_RE.is_match(&node.id) {
            errors.push(format!(
                "nodes[{i}].id: `{}` contains non-word characters; suggestion: use letters, digits, and underscores",
                node.id
            ));
        }
        if !seen.insert(node.id.as_str()) {
            errors.push(format!(
                "nodes[{i}].id: duplicate id `{}`; suggestion: node ids must be unique",
                node.id
            ));
        }
        if node.node_type.is_empty() {
            errors.push(format!("nodes[{i}].type: empty; suggestion: set a registered node type"));
        }
        if node.purpose.chars().count() > MAX_PURPOSE_CHARS {
            errors.push(format!(
                "nodes[{i}].purpose: exceeds {MAX_PURPOSE_CHARS} characters; suggestion: shorten the statement"
            ));
        }
    }

    if let Some(start) = &ir.start_node {
        if !ir.nodes.iter().any(|n| &n.id == start) {
            errors.push(format!(
                "start_node: `{start}` is not a defined node id; suggestion: reference one of `nodes`"
            ));
        }
    }

    let stdin_inputs: Vec<&str> = ir
        .inputs
        .iter()
        .filter(|(_, decl)| decl.stdin)
        .map(|(name, _)| name.as_str())
        .collect();
    if stdin_inputs.len() > 1 {
        errors.push(format!(
            "inputs: {} inputs declare stdin=true ({}); suggestion: at most one may",
            stdin_inputs.len(),
            stdin_inputs.join(", ")
        ));
    }
}

// ============================================================================
// Layer 2: dataflow
// ============================================================================

/// Returns the execution order when one exists, for the template layer's
/// precedence checks.
fn check_dataflow(ir: &WorkflowIr, errors: &mut Vec<String>) -> Option<Vec<String>> {
    let ids: FxHashSet<&str> = ir.nodes.iter().map(|n| n.id.as_str()).collect();

    for (i, edge) in ir.edges.iter().enumerate() {
        if !ids.contains(edge.from.as_str()) {
            errors.push(format!(
                "edges[{i}].from: `{}` is not a defined node id; suggestion: reference one of `nodes`",
                edge.from
            ));
        }
        if !ids.contains(edge.to.as_str()) {
            errors.push(format!(
                "edges[{i}].to: `{}` is not a defined node id; suggestion: reference one of `nodes`",
                edge.to
            ));
        }
    }

    for (name, decl) in &ir.outputs {
        let (refs, _) = collect_references(&Value::String(decl.source.clone()));
        for path in refs {
            let is_input = ir.inputs.contains_key(&path.root);
            if !is_input && !ids.contains(path.root.as_str()) {
                errors.push(format!(
                    "outputs.{name}.source: `${{{}}}` references unknown node `{}`; suggestion: reference a node id or declared input",
                    path.raw, path.root
                ));
            }
        }
    }

    match execution_order(&ir.nodes, &ir.edges) {
        Ok(order) => Some(order),
        Err(cycle) => {
            errors.push(format!(
                "edges: {cycle}; suggestion: only `error*` actions may loop back"
            ));
            None
        }
    }
}

// ============================================================================
// Layer 3: templates
// ============================================================================

fn check_templates(
    ir: &WorkflowIr,
    extracted_params: Option<&JsonMap>,
    registry: Option<&Registry>,
    order: Option<&[String]>,
    errors: &mut Vec<String>,
) {
    let specs = node_specs(ir, registry);
    // Precedence positions; declaration order stands in when a cycle blocked
    // the real execution order.
    let positions: FxHashMap<&str, usize> = match order {
        Some(order) => order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect(),
        None => ir
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect(),
    };

    for (i, node) in ir.nodes.iter().enumerate() {
        let own_pos = positions.get(node.id.as_str()).copied();
        for (key, value) in &node.params {
            let (refs, parse_errors) = collect_references(value);
            for parse_error in parse_errors {
                errors.push(format!(
                    "nodes[{i}].params.{key}: {parse_error}; suggestion: use `${{head.tail[0]}}` syntax or `$$` for a literal dollar"
                ));
            }
            for path in refs {
                check_reference(
                    ir,
                    extracted_params,
                    &specs,
                    &positions,
                    own_pos,
                    &format!("nodes[{i}].params.{key}"),
                    &node.id,
                    &path,
                    errors,
                );
            }
        }
    }

    for (name, decl) in &ir.outputs {
        let (refs, parse_errors) = collect_references(&Value::String(decl.source.clone()));
        for parse_error in parse_errors {
            errors.push(format!(
                "outputs.{name}.source: {parse_error}; suggestion: use `${{head.tail[0]}}` syntax"
            ));
        }
        // Existence is layer 2's job; here only field-level spec checks.
        for path in refs {
            warn_unknown_output_field(ir, &specs, &path.root, path.first_key(), name);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn check_reference(
    ir: &WorkflowIr,
    extracted_params: Option<&JsonMap>,
    specs: &FxHashMap<&str, crate::node::NodeSpec>,
    positions: &FxHashMap<&str, usize>,
    own_pos: Option<usize>,
    prefix: &str,
    own_id: &str,
    path: &crate::template::PathExpr,
    errors: &mut Vec<String>,
) {
    let root = path.root.as_str();

    if ir.inputs.contains_key(root) {
        return;
    }
    if extracted_params.is_some_and(|params| params.contains_key(root)) {
        return;
    }

    let Some(&source_pos) = positions.get(root) else {
        errors.push(format!(
            "{prefix}: `${{{}}}` references unknown source `{root}`; suggestion: declare it as an input or reference an upstream node",
            path.raw
        ));
        return;
    };

    if root == own_id {
        errors.push(format!(
            "{prefix}: `${{{}}}` references the node's own outputs; suggestion: reference an upstream node",
            path.raw
        ));
        return;
    }

    if let Some(own_pos) = own_pos {
        if source_pos >= own_pos {
            errors.push(format!(
                "{prefix}: `${{{}}}` references node `{root}` which does not precede `{own_id}` in execution order; suggestion: add an edge ordering `{root}` before `{own_id}`",
                path.raw
            ));
            return;
        }
    }

    warn_unknown_output_field(ir, specs, root, path.first_key(), prefix);
}

/// Output-field checks are advisory: the spec may be stale relative to the
/// node implementation, so a miss is only a log warning.
fn warn_unknown_output_field(
    ir: &WorkflowIr,
    specs: &FxHashMap<&str, crate::node::NodeSpec>,
    root: &str,
    first_key: Option<&str>,
    at: &str,
) {
    if ir.inputs.contains_key(root) {
        return;
    }
    let (Some(spec), Some(field)) = (specs.get(root), first_key) else {
        return;
    };
    if !spec.outputs.is_empty() && spec.output_field(field).is_none() {
        tracing::warn!(
            at,
            node = root,
            field,
            "template references a field the node's output spec does not declare"
        );
    }
}

fn node_specs<'a>(
    ir: &'a WorkflowIr,
    registry: Option<&Registry>,
) -> FxHashMap<&'a str, crate::node::NodeSpec> {
    let Some(registry) = registry else {
        return FxHashMap::default();
    };
    ir.nodes
        .iter()
        .filter_map(|n| {
            registry
                .get(&n.node_type)
                .map(|node| (n.id.as_str(), node.spec()))
        })
        .collect()
}

// ============================================================================
// Layer 4: node types
// ============================================================================

fn check_node_types(ir: &WorkflowIr, registry: Option<&Registry>, errors: &mut Vec<String>) {
    let Some(registry) = registry else {
        return;
    };
    for (i, node) in ir.nodes.iter().enumerate() {
        if node.node_type.is_empty() || registry.contains(&node.node_type) {
            continue;
        }
        let suggestion = registry
            .search(&node.node_type)
            .first()
            .map(|(name, _, _)| format!("did you mean `{name}`?"))
            .unwrap_or_else(|| "register it or fix the `type` field".to_string());
        errors.push(format!(
            "nodes[{i}].type: unknown node type `{}`; suggestion: {suggestion}",
            node.node_type
        ));
    }
}

// ============================================================================
// Layer 5: JSON-string anti-pattern
// ============================================================================

fn check_json_string_antipattern(ir: &WorkflowIr, errors: &mut Vec<String>) {
    for (i, node) in ir.nodes.iter().enumerate() {
        for (key, value) in &node.params {
            let Some(text) = value.as_str() else {
                continue;
            };
            let trimmed = text.trim_start();
            if (trimmed.starts_with('{') || trimmed.starts_with('['))
                && trimmed.contains("${")
            {
                errors.push(format!(
                    "nodes[{i}].params.{key}: JSON literal encoded inside a template string; suggestion: pass structured data directly (objects and arrays may contain templates natively)"
                ));
            }
        }
    }
}
