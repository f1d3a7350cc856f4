//! Tools: named capabilities a Note's logic can invoke
//!
//! A capability declares an [`InputSchema`]; the registry validates input
//! against it before `call`. The output's `content` is shallow-merged into
//! the invoking Note, `memory` becomes a Memory Note.
//!
//! Built-ins are `spawn` and `control`. Anything else (code generation,
//! reflection, ...) plugs in by implementing [`Capability`].

pub mod control;
mod schema;
pub mod spawn;

pub use control::{ControlCommand, ControlTool};
pub use schema::{InputSchema, PropertySchema};
pub use spawn::SpawnTool;

use crate::core::{EngineError, EngineResult, NoteId, Status};
use crate::engine::Arena;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CapabilityOutput {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

impl CapabilityOutput {
    pub fn done() -> Self { Self { status: Status::Done, ..Default::default() } }
    pub fn running() -> Self { Self { status: Status::Running, ..Default::default() } }
    pub fn failed() -> Self { Self { status: Status::Failed, ..Default::default() } }

    /// Non-object values are ignored; content is always a partial object.
    pub fn with_content(mut self, content: Value) -> Self {
        if let Value::Object(map) = content { self.content = Some(map); }
        self
    }

    pub fn with_memory(mut self, text: impl Into<String>) -> Self { self.memory = Some(text.into()); self }
}

/// What a capability can reach while it runs.
#[derive(Clone)]
pub struct CapabilityContext {
    /// Note whose logic is executing (or the caller's stand-in for direct calls).
    pub note_id: NoteId,
    pub arena: Arena,
}

impl CapabilityContext {
    pub fn new(note_id: impl Into<NoteId>, arena: Arena) -> Self { Self { note_id: note_id.into(), arena } }
}

#[async_trait]
pub trait Capability: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str { "" }
    fn input_schema(&self) -> &InputSchema;
    async fn call(&self, ctx: &CapabilityContext, input: Value) -> anyhow::Result<CapabilityOutput>;
}

#[derive(Debug, Clone, Serialize)]
pub struct CapabilityInfo {
    pub name: String,
    pub description: String,
    pub input_schema: InputSchema,
}

#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Capability>>,
}

impl ToolRegistry {
    pub fn new() -> Self { Self::default() }

    /// `spawn` and `control`.
    pub fn with_builtins() -> Self { Self::new().with(SpawnTool::new()).with(ControlTool::new()) }

    pub fn with(mut self, tool: impl Capability + 'static) -> Self { self.register(Arc::new(tool)); self }

    /// Later registrations replace earlier ones with the same name.
    pub fn register(&mut self, tool: Arc<dyn Capability>) {
        if self.tools.insert(tool.name().to_string(), tool.clone()).is_some() {
            tracing::debug!("capability '{}' replaced", tool.name());
        }
    }

    pub fn get(&self, name: &str) -> EngineResult<Arc<dyn Capability>> {
        self.tools.get(name).cloned().ok_or_else(|| EngineError::CapabilityNotFound(name.into()))
    }

    pub fn contains(&self, name: &str) -> bool { self.tools.contains_key(name) }

    /// Resolve, validate, call. The call runs on its own task so a panicking
    /// capability fails the attempt like any other error.
    pub async fn invoke(&self, name: &str, ctx: &CapabilityContext, input: Value) -> EngineResult<CapabilityOutput> {
        let tool = self.get(name)?;
        tool.input_schema().validate(name, &input)?;
        let ctx = ctx.clone();
        let call = tokio::spawn(async move { tool.call(&ctx, input).await });
        match call.await {
            Ok(result) => result.map_err(|e| EngineError::from_capability(name, e)),
            Err(e) => Err(EngineError::Execution { capability: name.into(), message: join_failure(e) }),
        }
    }

    pub fn list(&self) -> Vec<CapabilityInfo> {
        let mut infos: Vec<CapabilityInfo> = self.tools.values()
            .map(|t| CapabilityInfo { name: t.name().into(), description: t.description().into(), input_schema: t.input_schema().clone() })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }
}

fn join_failure(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    let message = payload.downcast_ref::<&str>().map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown payload".into());
    format!("panicked: {}", message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    struct Echo { schema: InputSchema }

    #[async_trait]
    impl Capability for Echo {
        fn name(&self) -> &str { "echo" }
        fn input_schema(&self) -> &InputSchema { &self.schema }
        async fn call(&self, _ctx: &CapabilityContext, input: Value) -> anyhow::Result<CapabilityOutput> {
            if input["text"] == "boom" { anyhow::bail!("echo exploded"); }
            if input["text"] == "panic" { panic!("echo lost its voice"); }
            Ok(CapabilityOutput::done().with_content(json!({"echo": input["text"]})).with_memory("echoed"))
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::with_builtins().with(Echo { schema: InputSchema::new().required("text", PropertySchema::new("string", "text")) })
    }

    fn ctx() -> CapabilityContext { CapabilityContext::new("n1", Arena::new(Arc::new(MemoryStore::new()))) }

    #[tokio::test]
    async fn invoke_validates_then_calls() {
        let out = registry().invoke("echo", &ctx(), json!({"text": "hi"})).await.unwrap();
        assert_eq!(out.status, Status::Done);
        assert_eq!(out.content.unwrap()["echo"], "hi");
        assert_eq!(out.memory.as_deref(), Some("echoed"));
    }

    #[tokio::test]
    async fn invoke_error_kinds() {
        let reg = registry();
        assert!(matches!(reg.invoke("nope", &ctx(), json!({})).await, Err(EngineError::CapabilityNotFound(_))));
        assert!(matches!(reg.invoke("echo", &ctx(), json!({"text": 1})).await, Err(EngineError::Validation { .. })));
        assert!(matches!(reg.invoke("echo", &ctx(), json!({"text": "boom"})).await, Err(EngineError::Execution { .. })));
    }

    #[tokio::test]
    async fn panicking_capability_becomes_execution_error() {
        match registry().invoke("echo", &ctx(), json!({"text": "panic"})).await {
            Err(EngineError::Execution { capability, message }) => {
                assert_eq!(capability, "echo");
                assert_eq!(message, "panicked: echo lost its voice");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn list_is_sorted_with_builtins() {
        let names: Vec<String> = registry().list().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["control", "echo", "spawn"]);
    }

    #[test]
    fn output_ignores_scalar_content() {
        assert!(CapabilityOutput::done().with_content(json!("text")).content.is_none());
    }
}
