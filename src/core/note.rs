//! Note: the universal entity. Data, behaviour and state in one record.

use crate::core::error::{EngineError, EngineResult};
use crate::core::ids::{self, capability, kind, relation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};

pub type NoteId = String;

static ID_SEQ: AtomicU64 = AtomicU64::new(0);

/// `<type>-<unix millis>-<seq>`; the sequence keeps ids unique within one millisecond.
pub fn next_id(kind: &str) -> NoteId {
    format!("{}-{}-{}", kind, now_millis(), ID_SEQ.fetch_add(1, Ordering::Relaxed))
}

pub fn now_millis() -> i64 { chrono::Utc::now().timestamp_millis() }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    #[default]
    Running,
    Done,
    Failed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Running => "running",
            Status::Done => "done",
            Status::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

/// Status plus informational ranking attributes. The scheduler never reorders by them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoteState {
    pub status: Status,
    pub priority: i64,
    pub entropy: f64,
}

impl Default for NoteState {
    fn default() -> Self { Self { status: Status::Running, priority: 50, entropy: 0.0 } }
}

impl NoteState {
    pub fn with_status(status: Status) -> Self { Self { status, ..Default::default() } }
}

/// Outgoing typed relation. The target may not exist (yet).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub target: NoteId,
    pub relation: String,
}

/// Budget counters, carried but not enforced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resources {
    pub tokens: i64,
    pub cycles: i64,
}

impl Default for Resources {
    fn default() -> Self { Self { tokens: 100, cycles: 100 } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub capability: String,
    #[serde(default)]
    pub input: Value,
}

impl Step {
    pub fn new(capability: impl Into<String>, input: Value) -> Self { Self { capability: capability.into(), input } }
}

/// Execution plan: `{type: "sequential", steps}` or the single-capability form
/// where `content.name` picks the capability and `input` is its argument.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Logic {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
}

impl Logic {
    pub fn sequential(steps: Vec<Step>) -> Self {
        Self { kind: Some(ids::logic::SEQUENTIAL.into()), steps, input: None }
    }

    pub fn single(input: Value) -> Self { Self { kind: None, steps: Vec::new(), input: Some(input) } }

    pub fn is_sequential(&self) -> bool { self.kind.as_deref() == Some(ids::logic::SEQUENTIAL) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub content: Value,
    #[serde(default)]
    pub state: NoteState,
    #[serde(default)]
    pub graph: Vec<Edge>,
    #[serde(default)]
    pub memory: Vec<NoteId>,
    #[serde(default)]
    pub context: Vec<NoteId>,
    #[serde(default)]
    pub resources: Resources,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logic: Option<Logic>,
    #[serde(default)]
    pub ts: i64,
}

impl Note {
    pub fn new(id: impl Into<NoteId>, content: Value) -> Self {
        Self {
            id: id.into(),
            content,
            state: NoteState::default(),
            graph: Vec::new(),
            memory: Vec::new(),
            context: vec![ids::ROOT.into()],
            resources: Resources::default(),
            logic: None,
            ts: now_millis(),
        }
    }

    /// Bootstrap seed every spawn ultimately hangs off.
    pub fn root() -> Self {
        let mut note = Self::new(ids::ROOT, serde_json::json!({"type": kind::ROOT, "desc": "Root"}));
        note.state.status = Status::Done;
        note.context.clear();
        note
    }

    pub fn control(paused: bool) -> Self {
        let mut note = Self::new(ids::CONTROL, serde_json::json!({"type": kind::CONTROL, "paused": paused}));
        note.state.status = Status::Done;
        note.context.clear();
        note
    }

    /// Immutable log entry referenced from `parent.memory`.
    pub fn memory(parent: &str, text: impl Into<String>) -> Self {
        let mut note = Self::new(next_id(kind::MEMORY), Value::String(text.into()));
        note.state.status = Status::Done;
        note.context = vec![parent.to_string()];
        note
    }

    pub fn with_status(mut self, status: Status) -> Self { self.state.status = status; self }
    pub fn with_logic(mut self, logic: Logic) -> Self { self.logic = Some(logic); self }
    pub fn with_context(mut self, context: Vec<NoteId>) -> Self { self.context = context; self }

    pub fn kind(&self) -> Option<&str> { self.content.get("type").and_then(Value::as_str) }
    pub fn desc(&self) -> Option<&str> { self.content.get("desc").and_then(Value::as_str) }
    pub fn capability_name(&self) -> Option<&str> { self.content.get("name").and_then(Value::as_str) }

    /// Plain log text when this is a Memory Note.
    pub fn log_text(&self) -> Option<&str> { self.content.as_str() }

    pub fn parent(&self) -> &str { self.context.first().map(String::as_str).unwrap_or(ids::ROOT) }

    /// Notes naming `spawn` as their own capability are never auto-executed.
    pub fn is_self_spawning(&self) -> bool { self.capability_name() == Some(capability::SPAWN) }

    /// Control Note pause flag; anything but `true` reads as running.
    pub fn is_paused(&self) -> bool { self.content.get("paused").and_then(Value::as_bool).unwrap_or(false) }

    pub fn contains(&self, target: &str) -> bool { self.graph.iter().any(|e| e.target == target) }

    /// Append a `contains` edge unless one to `target` already exists.
    pub fn link_child(&mut self, target: &str) -> bool {
        if self.contains(target) { return false; }
        self.graph.push(Edge { target: target.into(), relation: relation::CONTAINS.into() });
        true
    }

    /// Shallow merge into `content`; a non-object payload is replaced.
    pub fn merge_content(&mut self, patch: &Map<String, Value>) {
        if !self.content.is_object() { self.content = Value::Object(Map::new()); }
        if let Value::Object(obj) = &mut self.content {
            for (k, v) in patch { obj.insert(k.clone(), v.clone()); }
        }
    }
}

/// What any caller (capability, HTTP, CLI) hands to `spawn`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpawnRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NoteId>,
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<NoteState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<NoteId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Resources>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logic: Option<Logic>,
}

impl SpawnRequest {
    pub fn new(content: Value) -> Self { Self { content, ..Default::default() } }
    pub fn with_id(mut self, id: impl Into<NoteId>) -> Self { self.id = Some(id.into()); self }
    pub fn with_status(mut self, status: Status) -> Self { self.state = Some(NoteState::with_status(status)); self }
    pub fn with_parent(mut self, parent: impl Into<NoteId>) -> Self { self.context = Some(vec![parent.into()]); self }
    pub fn with_logic(mut self, logic: Logic) -> Self { self.logic = Some(logic); self }

    pub fn from_value(value: Value) -> EngineResult<Self> {
        serde_json::from_value(value).map_err(|e| EngineError::validation(capability::SPAWN, e.to_string()))
    }

    pub fn into_note(self) -> EngineResult<Note> {
        if !self.content.is_object() {
            return Err(EngineError::validation(capability::SPAWN, "content must be an object"));
        }
        let id = match self.id {
            Some(id) if id.trim().is_empty() => return Err(EngineError::validation(capability::SPAWN, "id must not be empty")),
            Some(id) => id,
            None => next_id(self.content.get("type").and_then(Value::as_str).unwrap_or(kind::NOTE)),
        };
        let mut note = Note::new(id, self.content);
        if let Some(state) = self.state { note.state = state; }
        if let Some(context) = self.context.filter(|c| !c.is_empty()) { note.context = context; }
        if let Some(resources) = self.resources { note.resources = resources; }
        note.logic = self.logic;
        Ok(note)
    }
}
