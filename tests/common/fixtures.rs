#![allow(dead_code)]

use serde_json::{Value, json};
use std::sync::Arc;

use pflow::ir::WorkflowIr;
use pflow::registry::{NodeMetadata, Registry};
use pflow::types::JsonMap;

use super::nodes::*;

/// Decode a `json!` object into a `JsonMap`.
pub fn jmap(value: Value) -> JsonMap {
    serde_json::from_value(value).expect("fixture is a JSON object")
}

/// Registry with every stub node type the fixtures use.
pub fn registry() -> Registry {
    let mut registry = Registry::new();
    registry.register(
        "readfile",
        NodeMetadata::new("read a file's content").with_keywords(["file", "io"]),
        || Arc::new(ReadFileStub),
    );
    registry.register(
        "uppercase",
        NodeMetadata::new("uppercase a string"),
        || Arc::new(UppercaseNode),
    );
    registry.register("echo", NodeMetadata::new("echo params as outputs"), || {
        Arc::new(EchoNode)
    });
    registry.register(
        "create_item",
        NodeMetadata::new("create an item in a remote system"),
        || Arc::new(RequireTitleNode),
    );
    registry.register(
        "auth_probe",
        NodeMetadata::new("call a guarded endpoint"),
        || Arc::new(UnauthorizedNode),
    );
    registry.register("explode", NodeMetadata::new("always fails"), || {
        Arc::new(AlwaysFailingNode)
    });
    registry
}

/// S1's two-node workflow: readfile -> uppercase, one declared output.
pub fn linear_ir() -> WorkflowIr {
    WorkflowIr::from_value(json!({
        "ir_version": "1.0.0",
        "nodes": [
            {"id": "read", "type": "readfile", "params": {"path": "${file}"}},
            {"id": "upper", "type": "uppercase", "params": {"text": "${read.content}"}}
        ],
        "edges": [{"from": "read", "to": "upper"}],
        "inputs": {"file": {"type": "string", "required": true}},
        "outputs": {"result": {"source": "${upper.text}"}}
    }))
    .expect("fixture IR parses")
}

/// Three-node chain `a -> b -> c` where `b` needs a repair to pass
/// (`create_item` fails 422 until it gets a `title` param).
pub fn abc_ir() -> WorkflowIr {
    WorkflowIr::from_value(json!({
        "ir_version": "1.0.0",
        "nodes": [
            {"id": "a", "type": "echo", "params": {"name": "widget"}},
            {"id": "b", "type": "create_item", "params": {}},
            {"id": "c", "type": "echo", "params": {"created": "${b.id}"}}
        ],
        "edges": [
            {"from": "a", "to": "b"},
            {"from": "b", "to": "c"}
        ],
        "outputs": {"created": {"source": "${c.created}"}}
    }))
    .expect("fixture IR parses")
}

/// The repaired form of [`abc_ir`]: `b` gains `title: "${a.name}"`.
pub fn abc_ir_repaired() -> WorkflowIr {
    let mut ir = abc_ir();
    ir.nodes[1]
        .params
        .insert("title".into(), json!("${a.name}"));
    ir
}
