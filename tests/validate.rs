mod common;

use common::*;
use serde_json::json;

use pflow::ir::WorkflowIr;
use pflow::validate::validate;

#[test]
fn valid_workflows_validate_cleanly() {
    let registry = registry();
    assert!(validate(&linear_ir(), None, Some(&registry), false).is_empty());
    assert!(validate(&abc_ir(), None, Some(&registry), false).is_empty());
    assert!(validate(&abc_ir_repaired(), None, Some(&registry), false).is_empty());
}

#[test]
fn template_typo_names_the_param_and_the_bad_source() {
    let mut ir = linear_ir();
    ir.nodes[1]
        .params
        .insert("text".into(), json!("${reed.content}"));

    let errors = validate(&ir, None, Some(&registry()), false);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("nodes[1].params.text:"));
    assert!(errors[0].contains("reed"));
    assert!(errors[0].contains("suggestion"));
}

#[test]
fn cycles_in_non_error_edges_are_reported() {
    let ir = WorkflowIr::from_value(json!({
        "ir_version": "1.0.0",
        "nodes": [
            {"id": "plan", "type": "echo"},
            {"id": "act", "type": "echo"},
            {"id": "review", "type": "echo"}
        ],
        "edges": [
            {"from": "plan", "to": "act"},
            {"from": "act", "to": "review"},
            {"from": "review", "to": "plan"}
        ],
    }))
    .unwrap();

    let errors = validate(&ir, None, Some(&registry()), false);
    assert!(errors.iter().any(|e| e.contains("cycle")));
    // The report names nodes on the cycle.
    assert!(errors.iter().any(|e| e.contains("plan") || e.contains("act")));
}

#[test]
fn error_action_back_edges_are_allowed() {
    let ir = WorkflowIr::from_value(json!({
        "ir_version": "1.0.0",
        "nodes": [
            {"id": "try_call", "type": "echo"},
            {"id": "backoff", "type": "echo"}
        ],
        "edges": [
            {"from": "try_call", "to": "backoff", "action": "error:retry"},
            {"from": "backoff", "to": "try_call"}
        ],
    }))
    .unwrap();

    // `backoff -> try_call` alone is not a cycle; the closing edge is an
    // explicit error action and excluded from the acyclicity check.
    assert!(validate(&ir, None, Some(&registry()), false).is_empty());
}

#[test]
fn unknown_node_types_are_layer_four_errors() {
    let mut ir = linear_ir();
    ir.nodes[0].node_type = "readfil".into();

    let errors = validate(&ir, None, Some(&registry()), false);
    assert!(errors.iter().any(|e| e.contains("unknown node type `readfil`")));
    // The registry's closest hit is suggested.
    assert!(errors.iter().any(|e| e.contains("readfile")));

    // Skippable on request.
    assert!(validate(&ir, None, Some(&registry()), true).is_empty());
}

#[test]
fn validation_does_not_mutate_the_ir() {
    let ir = linear_ir();
    let before = ir.clone();
    let _ = validate(&ir, None, Some(&registry()), false);
    assert_eq!(ir, before);
}

#[test]
fn edge_to_missing_node_is_reported() {
    let mut ir = linear_ir();
    ir.edges[0].to = "nowhere".into();

    let errors = validate(&ir, None, Some(&registry()), false);
    assert!(errors.iter().any(|e| e.starts_with("edges[0].to:")));
}

#[test]
fn output_sources_must_name_real_nodes() {
    let mut ir = linear_ir();
    ir.outputs.get_mut("result").unwrap().source = "${ghost.text}".into();

    let errors = validate(&ir, None, Some(&registry()), false);
    assert!(errors.iter().any(|e| e.starts_with("outputs.result.source:")));
    assert!(errors.iter().any(|e| e.contains("ghost")));
}

#[test]
fn json_literal_in_template_string_is_flagged() {
    let mut ir = linear_ir();
    ir.nodes[1]
        .params
        .insert("payload".into(), json!("{\"text\": \"${read.content}\"}"));

    let errors = validate(&ir, None, Some(&registry()), false);
    assert!(errors.iter().any(|e| e.contains("JSON literal")));
}

#[test]
fn malformed_templates_are_reported_with_grammar_help() {
    let mut ir = linear_ir();
    ir.nodes[0].params.insert("path".into(), json!("${file"));

    let errors = validate(&ir, None, Some(&registry()), false);
    assert!(
        errors
            .iter()
            .any(|e| e.starts_with("nodes[0].params.path:") && e.contains("unterminated"))
    );
}
