//! `spawn`: create (or overwrite) a Note and hang it off its parent

use super::{Capability, CapabilityContext, CapabilityOutput, InputSchema, PropertySchema};
use crate::core::{ids, EngineResult, Note, SpawnRequest};
use crate::engine::Arena;
use crate::graph;
use async_trait::async_trait;
use serde_json::Value;

pub struct SpawnTool {
    schema: InputSchema,
}

impl SpawnTool {
    pub fn new() -> Self {
        let id = PropertySchema::new("string", "Explicit id; defaults to <type>-<timestamp>.");
        let id = id.clone().matching(r"^\S+$").unwrap_or(id);
        Self {
            schema: InputSchema::new()
                .required("content", PropertySchema::new("object", "Type-tagged payload; content.type names the kind."))
                .property("id", id)
                .property("state", PropertySchema::new("object", "{status, priority, entropy}; status defaults to running."))
                .property("context", PropertySchema::new("array", "Ancestor ids; context[0] is the parent (default root)."))
                .property("resources", PropertySchema::new("object", "{tokens, cycles} budget counters."))
                .property("logic", PropertySchema::new("object", "{type: sequential, steps} or {input} for content.name.")),
        }
    }
}

impl SpawnTool {
    /// Hold a direct request (Node, HTTP, CLI) to the same schema the capability enforces.
    pub fn check(&self, request: &SpawnRequest) -> EngineResult<()> {
        self.schema.validate(ids::capability::SPAWN, &serde_json::to_value(request)?)
    }
}

impl Default for SpawnTool {
    fn default() -> Self { Self::new() }
}

/// Build the Note, link it into its parent, then save it. The save is what
/// enqueues it: the scheduler sees the change event. Self-spawning Notes are
/// filtered at the executor's gate.
pub async fn spawn(arena: &Arena, request: SpawnRequest) -> EngineResult<Note> {
    let mut note = request.into_note()?;
    graph::link_child(arena, &mut note).await?;
    arena.put(&note).await?;
    if note.is_self_spawning() {
        tracing::info!("spawned {} (content.name = spawn, not auto-run)", note.id);
    } else {
        tracing::info!("spawned {} under {}", note.id, note.parent());
    }
    Ok(note)
}

#[async_trait]
impl Capability for SpawnTool {
    fn name(&self) -> &str { ids::capability::SPAWN }
    fn description(&self) -> &str { "Create a Note, link it under context[0], and queue it for execution." }
    fn input_schema(&self) -> &InputSchema { &self.schema }

    async fn call(&self, ctx: &CapabilityContext, input: Value) -> anyhow::Result<CapabilityOutput> {
        let request = SpawnRequest::from_value(input)?;
        spawn(&ctx.arena, request).await?;
        Ok(CapabilityOutput::done())
    }
}
