mod common;

use common::*;
use serde_json::json;
use std::sync::Arc;

use pflow::errors::ErrorCategory;
use pflow::ir::WorkflowIr;
use pflow::manager::{WorkflowManager, WorkflowMetadata};
use pflow::orchestrator::{ExecuteOptions, Orchestrator};
use pflow::runtime::RuntimeConfig;
use pflow::types::JsonMap;

fn orchestrator_with(client: Arc<ScriptedRepairClient>) -> Orchestrator {
    Orchestrator::new(Arc::new(registry())).with_repair_client(client)
}

fn repair_options() -> ExecuteOptions {
    ExecuteOptions {
        enable_repair: true,
        ..ExecuteOptions::default()
    }
}

#[tokio::test]
async fn runtime_repair_resumes_from_the_failed_node() {
    // `b` fails 422 until repaired with a title param; the repaired attempt
    // must start at `b`, serving `a` from cache.
    let client = Arc::new(ScriptedRepairClient::new(vec![repair_outcome(
        abc_ir_repaired(),
        &["b"],
    )]));
    let orchestrator = orchestrator_with(client.clone());

    let result = orchestrator
        .execute(abc_ir(), JsonMap::new(), repair_options())
        .await;

    assert!(result.success);
    assert_eq!(client.call_count(), 1);
    assert_eq!(result.repaired_workflow_ir, Some(abc_ir_repaired()));
    assert_eq!(result.output_data, json!(1));

    let shared = &result.shared_after;
    assert_eq!(
        shared.get("__modified_nodes__"),
        Some(&json!(["b"]))
    );
    let checkpoint: pflow::store::ExecutionCheckpoint =
        serde_json::from_value(shared.get("__execution__").unwrap().clone()).unwrap();
    assert_eq!(checkpoint.completed_nodes, vec!["a", "b", "c"]);
    // The second attempt resumed at `b`; `a`'s first execution was reused
    // without a revisit.
    assert_eq!(shared.get("__cache_hits__"), Some(&json!([])));
    // `b` got its title through the repair, resolved from `a`'s output.
    assert_eq!(
        shared.get("b").and_then(|ns| ns.get("title")),
        Some(&json!("widget"))
    );
}

#[tokio::test]
async fn repair_disabled_returns_the_first_failure() {
    let client = Arc::new(ScriptedRepairClient::new(vec![repair_outcome(
        abc_ir_repaired(),
        &["b"],
    )]));
    let orchestrator = orchestrator_with(client.clone());

    let result = orchestrator
        .execute(abc_ir(), JsonMap::new(), ExecuteOptions::default())
        .await;

    assert!(!result.success);
    assert_eq!(client.call_count(), 0);
    assert_eq!(result.errors[0].node_id.as_deref(), Some("b"));
    assert_eq!(result.errors[0].category, ErrorCategory::ApiValidation);
    assert_eq!(result.errors[0].status_code, Some(422));
}

#[tokio::test]
async fn repeated_error_signatures_stop_the_loop() {
    // Both scripted repairs "fix" the workflow into the same still-broken
    // shape, so the second attempt fails identically and the loop stops
    // without a third attempt.
    let ir = WorkflowIr::from_value(json!({
        "ir_version": "1.0.0",
        "nodes": [{"id": "b", "type": "explode", "params": {}}],
        "edges": [],
    }))
    .unwrap();
    let mut retagged = ir.clone();
    retagged.nodes[0].purpose = "retry".into();

    let client = Arc::new(ScriptedRepairClient::new(vec![
        repair_outcome(retagged.clone(), &["b"]),
        repair_outcome(ir.clone(), &["b"]),
    ]));
    let orchestrator = orchestrator_with(client.clone());

    let result = orchestrator
        .execute(ir, JsonMap::new(), repair_options())
        .await;

    assert!(!result.success);
    // One repair after the first failure; the identical second failure is
    // recognized and no further repair is requested.
    assert_eq!(client.call_count(), 1);
    assert_eq!(result.errors[0].node_id.as_deref(), Some("b"));
}

#[tokio::test]
async fn non_repairable_errors_suppress_repair_entirely() {
    let ir = WorkflowIr::from_value(json!({
        "ir_version": "1.0.0",
        "nodes": [
            {"id": "a", "type": "echo", "params": {}},
            {"id": "b", "type": "auth_probe", "params": {}}
        ],
        "edges": [{"from": "a", "to": "b"}],
    }))
    .unwrap();
    let client = Arc::new(ScriptedRepairClient::new(vec![repair_outcome(
        ir.clone(),
        &["b"],
    )]));
    let orchestrator = orchestrator_with(client.clone());

    let result = orchestrator
        .execute(ir, JsonMap::new(), repair_options())
        .await;

    assert!(!result.success);
    assert_eq!(client.call_count(), 0);
    assert!(!result.errors[0].fixable);
    assert_eq!(
        result.shared_after.get("__non_repairable_error__"),
        Some(&json!(true))
    );
}

#[tokio::test]
async fn validation_errors_repair_before_any_execution() {
    // The broken IR references `reed`; the scripted repair fixes the typo,
    // after which execution proceeds normally.
    let mut broken = linear_ir();
    broken.nodes[1]
        .params
        .insert("text".into(), json!("${reed.content}"));

    let client = Arc::new(ScriptedRepairClient::new(vec![repair_outcome(
        linear_ir(),
        &["upper"],
    )]));
    let orchestrator = orchestrator_with(client.clone());

    let result = orchestrator
        .execute(broken, jmap(json!({"file": "x"})), repair_options())
        .await;

    assert!(result.success);
    assert_eq!(client.call_count(), 1);
    assert_eq!(result.output_data, json!("HI"));
    assert_eq!(result.repaired_workflow_ir, Some(linear_ir()));
}

#[tokio::test]
async fn validation_failure_without_repair_reports_static_errors() {
    let mut broken = linear_ir();
    broken.nodes[1]
        .params
        .insert("text".into(), json!("${reed.content}"));

    let orchestrator = Orchestrator::new(Arc::new(registry()));
    let result = orchestrator
        .execute(broken, jmap(json!({"file": "x"})), ExecuteOptions::default())
        .await;

    assert!(!result.success);
    assert_eq!(result.errors[0].category, ErrorCategory::StaticValidation);
    assert!(result.errors[0].message.contains("reed"));
    // Nothing executed: the store holds no node namespaces.
    assert!(result.shared_after.get("read").is_none());
}

#[tokio::test]
async fn empty_change_repairs_abort_the_loop() {
    let client = Arc::new(ScriptedRepairClient::refusing());
    let orchestrator = orchestrator_with(client.clone());

    let result = orchestrator
        .execute(abc_ir(), JsonMap::new(), repair_options())
        .await;

    assert!(!result.success);
    assert_eq!(client.call_count(), 1);
    assert_eq!(result.errors[0].node_id.as_deref(), Some("b"));
}

#[tokio::test]
async fn invalid_repair_candidates_consume_inner_attempts() {
    // First candidate is invalid (bad template root), second is good.
    let mut bad = abc_ir_repaired();
    bad.nodes[1].params.insert("title".into(), json!("${ghost.name}"));

    let client = Arc::new(ScriptedRepairClient::new(vec![
        repair_outcome(bad, &["b"]),
        repair_outcome(abc_ir_repaired(), &["b"]),
    ]));
    let orchestrator = orchestrator_with(client.clone());

    let result = orchestrator
        .execute(abc_ir(), JsonMap::new(), repair_options())
        .await;

    assert!(result.success);
    assert_eq!(client.call_count(), 2);
    assert_eq!(result.repaired_workflow_ir, Some(abc_ir_repaired()));
}

#[tokio::test]
async fn stdin_routes_into_the_declared_input() {
    let mut ir = linear_ir();
    ir.inputs.get_mut("file").unwrap().stdin = true;

    let orchestrator = Orchestrator::new(Arc::new(registry()));
    let options = ExecuteOptions {
        stdin_data: Some(json!("from-stdin")),
        ..ExecuteOptions::default()
    };
    let result = orchestrator.execute(ir, JsonMap::new(), options).await;

    assert!(result.success);
    assert_eq!(result.shared_after.get("file"), Some(&json!("from-stdin")));
}

#[tokio::test]
async fn stdin_without_a_declared_input_is_a_structured_error() {
    let orchestrator = Orchestrator::new(Arc::new(registry()));
    let options = ExecuteOptions {
        stdin_data: Some(json!("data")),
        ..ExecuteOptions::default()
    };
    let result = orchestrator
        .execute(linear_ir(), jmap(json!({"file": "x"})), options)
        .await;

    assert!(!result.success);
    assert_eq!(result.errors[0].category, ErrorCategory::StaticValidation);
    assert!(result.errors[0].message.contains("stdin"));
}

#[tokio::test]
async fn caller_params_win_over_stdin() {
    let mut ir = linear_ir();
    ir.inputs.get_mut("file").unwrap().stdin = true;

    let orchestrator = Orchestrator::new(Arc::new(registry()));
    let options = ExecuteOptions {
        stdin_data: Some(json!("from-stdin")),
        ..ExecuteOptions::default()
    };
    let result = orchestrator
        .execute(ir, jmap(json!({"file": "explicit"})), options)
        .await;

    assert!(result.success);
    assert_eq!(result.shared_after.get("file"), Some(&json!("explicit")));
}

#[tokio::test]
async fn output_key_narrows_multi_output_workflows() {
    let ir = WorkflowIr::from_value(json!({
        "ir_version": "1.0.0",
        "nodes": [{"id": "a", "type": "echo", "params": {"x": 1, "y": 2}}],
        "edges": [],
        "outputs": {
            "first": {"source": "${a.x}"},
            "second": {"source": "${a.y}"}
        }
    }))
    .unwrap();

    let orchestrator = Orchestrator::new(Arc::new(registry()));
    let options = ExecuteOptions {
        output_key: Some("second".to_string()),
        ..ExecuteOptions::default()
    };
    let result = orchestrator.execute(ir, JsonMap::new(), options).await;

    assert!(result.success);
    assert_eq!(result.output_data, json!(2));
}

#[tokio::test]
async fn output_key_preserves_single_output_workflows() {
    // One declared output is already extracted as its bare value; naming it
    // through `output_key` must not discard it.
    let orchestrator = Orchestrator::new(Arc::new(registry()));
    let options = ExecuteOptions {
        output_key: Some("result".to_string()),
        ..ExecuteOptions::default()
    };
    let result = orchestrator
        .execute(linear_ir(), jmap(json!({"file": "x"})), options)
        .await;

    assert!(result.success);
    assert_eq!(result.output_data, json!("HI"));
}

#[tokio::test]
async fn output_key_leaves_single_object_outputs_intact() {
    // The lone output's value is itself an object; it must not be mistaken
    // for a multi-output map and have a key plucked out of it.
    let ir = WorkflowIr::from_value(json!({
        "ir_version": "1.0.0",
        "nodes": [{"id": "a", "type": "echo", "params": {"payload": {"x": 1, "y": 2}}}],
        "edges": [],
        "outputs": {"payload": {"source": "${a.payload}"}}
    }))
    .unwrap();

    let orchestrator = Orchestrator::new(Arc::new(registry()));
    let options = ExecuteOptions {
        output_key: Some("payload".to_string()),
        ..ExecuteOptions::default()
    };
    let result = orchestrator.execute(ir, JsonMap::new(), options).await;

    assert!(result.success);
    assert_eq!(result.output_data, json!({"x": 1, "y": 2}));
}

#[tokio::test]
async fn exhausted_validation_repairs_return_the_last_validated_errors() {
    // Each candidate is still broken, with a distinct typo. The loop
    // validates three times and repairs three times; the errors returned
    // come from the third validation, and the third repair's candidate is
    // never validated.
    fn typo_ir(root: &str) -> WorkflowIr {
        let mut ir = linear_ir();
        ir.nodes[1]
            .params
            .insert("text".into(), json!(format!("${{{root}.content}}")));
        ir
    }

    let client = Arc::new(ScriptedRepairClient::new(vec![
        repair_outcome(typo_ir("reeed"), &["upper"]),
        repair_outcome(typo_ir("rheed"), &["upper"]),
        repair_outcome(typo_ir("reed4"), &["upper"]),
    ]));
    let orchestrator = Orchestrator::new(Arc::new(registry()))
        .with_repair_client(client.clone())
        .with_config(RuntimeConfig::default().with_max_validation_attempts(3));

    let result = orchestrator
        .execute(typo_ir("reed"), jmap(json!({"file": "x"})), repair_options())
        .await;

    assert!(!result.success);
    assert_eq!(client.call_count(), 3);
    assert_eq!(result.errors[0].category, ErrorCategory::StaticValidation);
    assert!(result.errors[0].message.contains("rheed"));
    // Nothing executed along the way.
    assert!(result.shared_after.get("read").is_none());
}

#[tokio::test]
async fn successful_named_runs_update_manager_bookkeeping() {
    let dir = tempfile::tempdir().unwrap();
    let manager = Arc::new(WorkflowManager::new(dir.path()).unwrap());
    manager
        .save(
            "greet",
            &abc_ir(),
            WorkflowMetadata::new("test workflow"),
            false,
        )
        .unwrap();

    let client = Arc::new(ScriptedRepairClient::new(vec![repair_outcome(
        abc_ir_repaired(),
        &["b"],
    )]));
    let orchestrator = orchestrator_with(client)
        .with_workflow_manager(manager.clone())
        .with_config(RuntimeConfig::default());

    let options = ExecuteOptions {
        enable_repair: true,
        workflow_name: Some("greet".to_string()),
        ..ExecuteOptions::default()
    };
    let result = orchestrator.execute(abc_ir(), JsonMap::new(), options).await;
    assert!(result.success);

    let (stored_ir, metadata) = manager.load("greet").unwrap();
    assert_eq!(metadata.execution_count, 1);
    assert_eq!(metadata.last_execution_success, Some(true));
    // The repaired IR replaced the stored one.
    assert_eq!(stored_ir, abc_ir_repaired());
}

#[tokio::test]
async fn resume_state_carries_across_calls() {
    // A full run, then a second call resuming from its shared store: the
    // second call re-executes nothing.
    let orchestrator = Orchestrator::new(Arc::new(registry()));
    let params = jmap(json!({"file": "x"}));

    let first = orchestrator
        .execute(linear_ir(), params.clone(), ExecuteOptions::default())
        .await;
    assert!(first.success);

    let options = ExecuteOptions {
        resume_state: Some(first.shared_after.clone()),
        ..ExecuteOptions::default()
    };
    let second = orchestrator.execute(linear_ir(), params, options).await;

    assert!(second.success);
    assert_eq!(
        second.shared_after.get("__cache_hits__"),
        Some(&json!(["read", "upper"]))
    );
}
