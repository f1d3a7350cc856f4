//! Notemind: a graph of self-describing Notes that run themselves.
//!
//! A Note is data, behaviour and state in one record. Saving a Note emits a
//! change event; the scheduler picks it up and, if the Note is `running` and
//! the node is not paused, executes its logic through registered
//! capabilities. Capabilities spawn more Notes, which are saved, which are
//! scheduled. The loop ends when every Note is `done` or `failed`.
//!
//! # Architecture
//!
//! ```text
//! Node (entry point)
//!   │
//!   ├── NoteStore (MemoryStore | FileStore)
//!   │     └── change feed ──▶ Scheduler (K permits)
//!   │                            └── RetryController ──▶ Executor
//!   │                                                      └── ToolRegistry
//!   │                                                            ├── spawn ──▶ Graph Builder
//!   │                                                            └── control ──▶ ui-status
//!   │
//!   └── server (axum, feature `server`)
//! ```
//!
//! # Verbs
//!
//! | Verb | Method | Description |
//! |------|--------|-------------|
//! | spawn | `node.spawn(req)` | Create a Note under `context[0]` |
//! | get | `node.get(id)` | Read a Note |
//! | list | `node.list()` | Every Note |
//! | run | `node.run(id)` | Explicit run (bypasses the self-spawn guard) |
//! | control | `node.control(cmd)` | Pause / resume |
//! | close | `node.close()` | Shut down |
//!
//! # Usage
//!
//! ```ignore
//! use notemind::{Node, NodeConfig, SpawnRequest};
//! use serde_json::json;
//!
//! let node = Node::start(NodeConfig::new("myapp")).await?;
//! let id = node.spawn(SpawnRequest::new(json!({"type": "task", "desc": "hello"}))).await?;
//! node.settle().await;
//! assert_eq!(node.get(&id).await?.state.status, notemind::Status::Done);
//! ```

pub mod core;
pub mod engine;
pub mod graph;
pub mod logging;
pub mod node;
pub mod runtime;
pub mod store;
pub mod tools;

#[cfg(feature = "server")]
pub mod server;

pub use crate::core::{EngineError, EngineResult, Edge, Logic, Note, NoteId, NoteState, Resources, SpawnRequest, Status, Step};
pub use engine::{Arena, Attempt, Executor, RetryController, RetryPolicy, Scheduler, SchedulerHandle};
pub use graph::{Snapshot, SnapshotEdge, SnapshotNode};
pub use node::{Backend, Node, NodeConfig};
pub use runtime::{install_signal_handlers, Shutdown};
pub use store::{ChangeEvent, ChangeKind, FileStore, MemoryStore, NoteStore};
pub use tools::{Capability, CapabilityContext, CapabilityInfo, CapabilityOutput, ControlCommand, InputSchema, PropertySchema, ToolRegistry};

#[cfg(feature = "server")]
pub use server::{create_router, create_router_with_name};
