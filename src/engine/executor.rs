//! Executor: one attempt over one Note

use super::Arena;
use crate::core::{ids, EngineResult, Note, NoteId, Status};
use crate::store::ChangeKind;
use crate::tools::{CapabilityContext, CapabilityOutput, ToolRegistry};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Paused,
    NotRunning(Status),
    /// `content.name == "spawn"` on an automatic trigger.
    SelfSpawning,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Paused => f.write_str("paused"),
            SkipReason::NotRunning(status) => write!(f, "status {}", status),
            SkipReason::SelfSpawning => f.write_str("self-spawning note"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// Gate said no. Deliberate no-op, not an error.
    Skipped(SkipReason),
    /// Steps ran and the Note was committed with this status.
    Completed(Status),
}

/// Everything an attempt wants to write back. Built while steps run and
/// applied to a fresh copy of the Note at commit, so writes other tasks made
/// meanwhile (children linking themselves in) survive.
#[derive(Debug, Default)]
struct Patch {
    status: Option<Status>,
    content: Map<String, Value>,
    memory: Vec<String>,
}

impl Patch {
    fn absorb(&mut self, out: CapabilityOutput) {
        self.status = Some(out.status);
        if let Some(content) = out.content {
            self.content.extend(content);
        }
        if let Some(text) = out.memory {
            self.memory.push(text);
        }
    }

    /// A successful attempt never leaves the Note `running`.
    fn final_status(&self) -> Status {
        match self.status {
            None | Some(Status::Running) => Status::Done,
            Some(other) => other,
        }
    }
}

/// Eligibility: pause gate, then status, then the self-reference guard.
pub fn gate(note: &Note, paused: bool, kind: ChangeKind) -> Option<SkipReason> {
    if paused {
        Some(SkipReason::Paused)
    } else if note.state.status != Status::Running {
        Some(SkipReason::NotRunning(note.state.status))
    } else if kind == ChangeKind::Change && note.is_self_spawning() {
        Some(SkipReason::SelfSpawning)
    } else {
        None
    }
}

#[derive(Clone)]
pub struct Executor {
    arena: Arena,
    registry: Arc<ToolRegistry>,
}

impl Executor {
    pub fn new(arena: Arena, registry: Arc<ToolRegistry>) -> Self { Self { arena, registry } }

    pub fn arena(&self) -> &Arena { &self.arena }
    pub fn registry(&self) -> &ToolRegistry { &self.registry }

    /// One attempt. Any error aborts the remaining steps and discards the
    /// attempt's patch; the retry controller decides what happens next.
    pub async fn run(&self, id: &str, kind: ChangeKind) -> EngineResult<Attempt> {
        let note = self.arena.load(id).await?;
        let paused = self.arena.find(ids::CONTROL).await?.map(|c| c.is_paused()).unwrap_or(false);
        if let Some(reason) = gate(&note, paused, kind) {
            tracing::debug!("{} not eligible ({}): {}", id, kind.as_str(), reason);
            return Ok(Attempt::Skipped(reason));
        }

        tracing::debug!("{} attempt start ({})", id, kind.as_str());
        let patch = self.execute(&note).await?;
        let status = self.commit(id, patch).await?;
        Ok(Attempt::Completed(status))
    }

    async fn execute(&self, note: &Note) -> EngineResult<Patch> {
        let ctx = CapabilityContext::new(note.id.clone(), self.arena.clone());
        let mut patch = Patch::default();
        match &note.logic {
            Some(logic) if logic.is_sequential() => {
                for (i, step) in logic.steps.iter().enumerate() {
                    tracing::debug!("{} step {}: {}", note.id, i, step.capability);
                    let out = self.registry.invoke(&step.capability, &ctx, step.input.clone()).await?;
                    patch.absorb(out);
                }
            }
            logic => {
                if let Some(name) = note.capability_name() {
                    let input = logic.as_ref().and_then(|l| l.input.clone()).unwrap_or_else(|| Value::Object(Map::new()));
                    let out = self.registry.invoke(name, &ctx, input).await?;
                    patch.absorb(out);
                }
            }
        }
        Ok(patch)
    }

    async fn commit(&self, id: &str, patch: Patch) -> EngineResult<Status> {
        let status = patch.final_status();
        let mut logged: Vec<NoteId> = Vec::with_capacity(patch.memory.len());
        for text in patch.memory {
            logged.push(self.arena.record(id, text).await?);
        }
        let content = patch.content;
        self.arena.update(id, move |note| {
            if !content.is_empty() {
                note.merge_content(&content);
            }
            note.state.status = status;
            note.memory.extend(logged);
            true
        }).await?;
        Ok(status)
    }
}
