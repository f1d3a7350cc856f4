use crate::core::{Note, NoteId, Status};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub id: NoteId,
    pub label: Option<String>,
    pub status: Status,
    pub priority: i64,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub context: Vec<NoteId>,
    pub ts: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEdge {
    pub source: NoteId,
    pub target: NoteId,
}

/// Export-only view for external visualization.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub nodes: Vec<SnapshotNode>,
    pub edges: Vec<SnapshotEdge>,
}

pub fn snapshot(notes: &[Note]) -> Snapshot {
    let nodes = notes.iter().map(|n| SnapshotNode {
        id: n.id.clone(),
        label: n.desc().map(str::to_string),
        status: n.state.status,
        priority: n.state.priority,
        kind: n.kind().map(str::to_string),
        context: n.context.clone(),
        ts: n.ts,
    }).collect();
    let edges = notes.iter()
        .flat_map(|n| n.graph.iter().map(move |e| SnapshotEdge { source: n.id.clone(), target: e.target.clone() }))
        .collect();
    Snapshot { nodes, edges }
}
