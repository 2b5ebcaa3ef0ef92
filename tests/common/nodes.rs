#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

use pflow::node::{Node, NodeCtx, NodeError, NodeOutcome, NodeSpec, PortSpec};
use pflow::types::{JsonMap, ValueType};

/// Pretends to read a file: always yields `{content: "hi"}`.
#[derive(Debug, Clone)]
pub struct ReadFileStub;

#[async_trait]
impl Node for ReadFileStub {
    fn spec(&self) -> NodeSpec {
        NodeSpec::new()
            .input(PortSpec::required("path", ValueType::String))
            .output(PortSpec::out("content", ValueType::String))
    }

    async fn exec(&self, params: JsonMap, _ctx: NodeCtx) -> Result<NodeOutcome, NodeError> {
        params
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or(NodeError::MissingParam { name: "path" })?;
        let mut outputs = JsonMap::new();
        outputs.insert("content".into(), json!("hi"));
        Ok(NodeOutcome::success(outputs))
    }
}

/// Uppercases its `text` param.
#[derive(Debug, Clone)]
pub struct UppercaseNode;

#[async_trait]
impl Node for UppercaseNode {
    fn spec(&self) -> NodeSpec {
        NodeSpec::new()
            .input(PortSpec::required("text", ValueType::String))
            .output(PortSpec::out("text", ValueType::String))
    }

    async fn exec(&self, params: JsonMap, _ctx: NodeCtx) -> Result<NodeOutcome, NodeError> {
        let text = params
            .get("text")
            .and_then(|v| v.as_str())
            .ok_or(NodeError::MissingParam { name: "text" })?;
        let mut outputs = JsonMap::new();
        outputs.insert("text".into(), json!(text.to_uppercase()));
        Ok(NodeOutcome::success(outputs))
    }
}

/// Echoes its resolved params back as outputs.
#[derive(Debug, Clone)]
pub struct EchoNode;

#[async_trait]
impl Node for EchoNode {
    fn spec(&self) -> NodeSpec {
        NodeSpec::new()
    }

    async fn exec(&self, params: JsonMap, _ctx: NodeCtx) -> Result<NodeOutcome, NodeError> {
        Ok(NodeOutcome::success(params))
    }
}

/// Counts executions through a shared counter and emits `{name: ..., runs: n}`.
///
/// Cache tests assert on the counter to prove which nodes actually executed.
#[derive(Debug, Clone)]
pub struct CountingNode {
    pub name: &'static str,
    pub runs: Arc<AtomicUsize>,
}

impl CountingNode {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Node for CountingNode {
    fn spec(&self) -> NodeSpec {
        NodeSpec::new().output(PortSpec::out("name", ValueType::String))
    }

    async fn exec(&self, _params: JsonMap, _ctx: NodeCtx) -> Result<NodeOutcome, NodeError> {
        let runs = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        let mut outputs = JsonMap::new();
        outputs.insert("name".into(), json!(self.name));
        outputs.insert("runs".into(), json!(runs));
        Ok(NodeOutcome::success(outputs))
    }
}

/// Succeeds only when a `title` param is present; otherwise fails like an
/// API 422 with structured validation detail.
#[derive(Debug, Clone)]
pub struct RequireTitleNode;

#[async_trait]
impl Node for RequireTitleNode {
    fn spec(&self) -> NodeSpec {
        NodeSpec::new()
            .input(PortSpec::optional("title", ValueType::String))
            .output(PortSpec::out("id", ValueType::Number))
    }

    async fn exec(&self, params: JsonMap, _ctx: NodeCtx) -> Result<NodeOutcome, NodeError> {
        if let Some(title) = params.get("title").and_then(|v| v.as_str()) {
            let mut outputs = JsonMap::new();
            outputs.insert("id".into(), json!(1));
            outputs.insert("title".into(), json!(title));
            return Ok(NodeOutcome::success(outputs));
        }
        let mut outputs = JsonMap::new();
        outputs.insert("error".into(), json!("validation error: field required"));
        outputs.insert("status_code".into(), json!(422));
        outputs.insert("raw_response".into(), json!({"missing": "title"}));
        Ok(NodeOutcome::with_action(outputs, "error:api_validation"))
    }
}

/// Simulates an authentication failure: HTTP 401 on a success action.
#[derive(Debug, Clone)]
pub struct UnauthorizedNode;

#[async_trait]
impl Node for UnauthorizedNode {
    fn spec(&self) -> NodeSpec {
        NodeSpec::new().output(PortSpec::out("status_code", ValueType::Number))
    }

    async fn exec(&self, _params: JsonMap, _ctx: NodeCtx) -> Result<NodeOutcome, NodeError> {
        let mut outputs = JsonMap::new();
        outputs.insert("status_code".into(), json!(401));
        outputs.insert("error".into(), json!("unauthorized"));
        Ok(NodeOutcome::success(outputs))
    }
}

/// Always fails with the same deterministic message.
#[derive(Debug, Clone)]
pub struct AlwaysFailingNode;

#[async_trait]
impl Node for AlwaysFailingNode {
    fn spec(&self) -> NodeSpec {
        NodeSpec::new()
    }

    async fn exec(&self, _params: JsonMap, _ctx: NodeCtx) -> Result<NodeOutcome, NodeError> {
        let mut outputs = JsonMap::new();
        outputs.insert("error".into(), json!("upstream service exploded"));
        Ok(NodeOutcome::with_action(outputs, "error:execution_failure"))
    }
}

/// Cancels the run's token during its own execution, then succeeds; the
/// executor notices before the next node.
#[derive(Debug, Clone)]
pub struct CancellingNode {
    pub token: CancellationToken,
}

#[async_trait]
impl Node for CancellingNode {
    fn spec(&self) -> NodeSpec {
        NodeSpec::new()
    }

    async fn exec(&self, _params: JsonMap, _ctx: NodeCtx) -> Result<NodeOutcome, NodeError> {
        self.token.cancel();
        let mut outputs = JsonMap::new();
        outputs.insert("done".into(), json!(true));
        Ok(NodeOutcome::success(outputs))
    }
}

/// Raises instead of returning, exercising the wrapper's catch-all.
#[derive(Debug, Clone)]
pub struct PanickyProviderNode;

#[async_trait]
impl Node for PanickyProviderNode {
    fn spec(&self) -> NodeSpec {
        NodeSpec::new()
    }

    async fn exec(&self, _params: JsonMap, _ctx: NodeCtx) -> Result<NodeOutcome, NodeError> {
        Err(NodeError::Provider {
            provider: "flaky-api",
            message: "connection reset".to_string(),
        })
    }
}
