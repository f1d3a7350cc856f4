//! `control`: flip the global pause gate

use super::{Capability, CapabilityContext, CapabilityOutput, InputSchema, PropertySchema};
use crate::core::{ids, EngineResult, Note};
use crate::engine::Arena;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlCommand {
    Pause,
    Resume,
}

impl ControlCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlCommand::Pause => "pause",
            ControlCommand::Resume => "resume",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pause" => Some(ControlCommand::Pause),
            "resume" => Some(ControlCommand::Resume),
            _ => None,
        }
    }

    pub fn paused(&self) -> bool { matches!(self, ControlCommand::Pause) }
}

#[derive(Debug, Deserialize)]
struct ControlInput {
    command: ControlCommand,
}

/// Apply `command` to the Control Note, creating it on first use. Always
/// persisted, so the write shows up on the change feed.
pub async fn apply(arena: &Arena, command: ControlCommand) -> EngineResult<Note> {
    let note = arena.upsert(ids::CONTROL, || Note::control(false), |note| {
        let mut patch = serde_json::Map::new();
        patch.insert("paused".into(), Value::Bool(command.paused()));
        note.merge_content(&patch);
        true
    }).await?;
    tracing::info!("control: {}", command.as_str());
    Ok(note)
}

pub struct ControlTool {
    schema: InputSchema,
}

impl ControlTool {
    pub fn new() -> Self {
        Self {
            schema: InputSchema::new()
                .required("command", PropertySchema::new("string", "pause or resume the scheduler gate").one_of(&["pause", "resume"])),
        }
    }
}

impl Default for ControlTool {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl Capability for ControlTool {
    fn name(&self) -> &str { ids::capability::CONTROL }
    fn description(&self) -> &str { "Pause or resume execution of every Note." }
    fn input_schema(&self) -> &InputSchema { &self.schema }

    async fn call(&self, ctx: &CapabilityContext, input: Value) -> anyhow::Result<CapabilityOutput> {
        let ControlInput { command } = serde_json::from_value(input)?;
        apply(&ctx.arena, command).await?;
        Ok(CapabilityOutput::done().with_memory(format!("control: {}", command.as_str())))
    }
}
