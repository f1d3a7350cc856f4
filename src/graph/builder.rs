use crate::core::{ids, EngineResult, Note};
use crate::engine::Arena;

/// Record `child` in its parent's graph (`context[0]`, default `root`).
///
/// Runs before the child is saved, so by the time the child executes its
/// parent already lists it. A missing non-root parent falls back to `root`
/// and the child's `context[0]` is rewritten to match. Returns whether a new
/// edge was written.
pub async fn link_child(arena: &Arena, child: &mut Note) -> EngineResult<bool> {
    if child.context.is_empty() {
        child.context.push(ids::ROOT.into());
    }
    let mut parent_id = child.parent().to_string();
    if parent_id == child.id {
        return Ok(false);
    }

    if parent_id != ids::ROOT && arena.find(&parent_id).await?.is_none() {
        tracing::warn!("spawn {}: parent '{}' missing, linking under root", child.id, parent_id);
        parent_id = ids::ROOT.into();
        child.context[0] = parent_id.clone();
    }

    let child_id = child.id.clone();
    let mut added = false;
    arena.upsert(&parent_id, Note::root, |parent| {
        added = parent.link_child(&child_id);
        added
    }).await?;
    if added {
        tracing::debug!("{} contains {}", parent_id, child_id);
    }
    Ok(added)
}
