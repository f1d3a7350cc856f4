//! Graph: parent/child linkage on spawn, flattened export for visualizers
//!
//! Edges are non-owning id references. `graph` and `context` may form
//! cycles and may point at ids that do not exist; nothing here traverses.

mod builder;
mod snapshot;

pub use builder::link_child;
pub use snapshot::{snapshot, Snapshot, SnapshotEdge, SnapshotNode};
