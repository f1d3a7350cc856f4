//! Node - the engine wired together behind a handful of verbs
//!
//! | Verb | Method | Description |
//! |------|--------|-------------|
//! | spawn | `node.spawn(req)` | Create a Note under its parent |
//! | get | `node.get(id)` | Read one Note |
//! | list | `node.list()` | Every Note, `ts` order |
//! | run | `node.run(id)` | Explicit execution request |
//! | control | `node.control(cmd)` | Pause / resume the scheduler gate |
//! | close | `node.close()` | Stop admitting, drain, shut down |

mod config;

pub use config::{load_dotenv, Backend, NodeConfig};

use crate::core::{ids, EngineError, EngineResult, Note, NoteId, SpawnRequest};
use crate::engine::{Arena, Executor, RetryController, RetryPolicy, Scheduler, SchedulerHandle, SchedulerStats};
use crate::graph::{self, Snapshot};
use crate::runtime::Shutdown;
use crate::store::{FileStore, MemoryStore, NoteStore};
use crate::tools::{self, CapabilityInfo, ControlCommand, SpawnTool, ToolRegistry};
use std::sync::Arc;

pub struct Node {
    config: NodeConfig,
    arena: Arena,
    registry: Arc<ToolRegistry>,
    spawner: SpawnTool,
    scheduler: SchedulerHandle,
    shutdown: Shutdown,
}

impl Node {
    /// Built-in capabilities only.
    pub async fn start(config: NodeConfig) -> EngineResult<Self> { Self::start_with(config, ToolRegistry::with_builtins()).await }

    pub async fn start_with(config: NodeConfig, registry: ToolRegistry) -> EngineResult<Self> {
        let store: Arc<dyn NoteStore> = match config.backend {
            Backend::Memory => Arc::new(MemoryStore::new()),
            Backend::File => Arc::new(FileStore::new(config.resolved_data_dir())),
        };
        Self::start_with_store(config, store, registry).await
    }

    /// Any backend. The store must not have been written to by someone else's scheduler.
    pub async fn start_with_store(config: NodeConfig, store: Arc<dyn NoteStore>, registry: ToolRegistry) -> EngineResult<Self> {
        store.initialize().await?;
        let feed = store.watch();
        let arena = Arena::new(store);
        let registry = Arc::new(registry);

        let executor = Executor::new(arena.clone(), registry.clone());
        let retry = RetryController::new(executor, RetryPolicy::new(config.max_retries, config.base_delay));
        let shutdown = Shutdown::new();
        let scheduler = Scheduler::new(retry, config.concurrency).spawn(feed, shutdown.subscribe());

        if config.bootstrap && arena.find(ids::ROOT).await?.is_none() {
            arena.put(&Note::root()).await?;
            tracing::info!("Seeded {}", ids::ROOT);
        }
        tracing::info!("Node '{}' started ({} backend, K={}, retries={})", config.app, config.backend.as_str(), config.concurrency, config.max_retries);

        Ok(Self { config, arena, registry, spawner: SpawnTool::new(), scheduler, shutdown })
    }

    // Verbs
    pub async fn spawn(&self, request: SpawnRequest) -> EngineResult<NoteId> {
        self.spawner.check(&request)?;
        Ok(tools::spawn::spawn(&self.arena, request).await?.id)
    }
    pub async fn get(&self, id: &str) -> EngineResult<Note> { self.arena.load(id).await }
    pub async fn find(&self, id: &str) -> EngineResult<Option<Note>> { self.arena.find(id).await }
    pub async fn list(&self) -> EngineResult<Vec<Note>> { self.arena.list().await }

    /// Queue an explicit run. Skips the self-reference guard, still gated by pause and status.
    pub async fn run(&self, id: &str) -> EngineResult<()> {
        if self.arena.find(id).await?.is_none() {
            return Err(EngineError::NoteNotFound(id.into()));
        }
        if !self.scheduler.run(id) {
            return Err(EngineError::Store("scheduler is not running".into()));
        }
        Ok(())
    }

    pub async fn control(&self, command: ControlCommand) -> EngineResult<Note> { tools::control::apply(&self.arena, command).await }
    pub async fn pause(&self) -> EngineResult<Note> { self.control(ControlCommand::Pause).await }
    pub async fn resume(&self) -> EngineResult<Note> { self.control(ControlCommand::Resume).await }
    pub async fn is_paused(&self) -> EngineResult<bool> {
        Ok(self.arena.find(ids::CONTROL).await?.map(|c| c.is_paused()).unwrap_or(false))
    }

    /// Store a whole Note as-is (no graph linking). The save schedules it like any other.
    pub async fn seed(&self, note: &Note) -> EngineResult<()> { self.arena.put(note).await }

    pub async fn snapshot(&self) -> EngineResult<Snapshot> { Ok(graph::snapshot(&self.list().await?)) }
    pub fn capabilities(&self) -> Vec<CapabilityInfo> { self.registry.list() }
    pub async fn memory_log(&self, id: &str) -> EngineResult<Vec<String>> { self.arena.memory_log(id).await }

    /// Wait until the notification loop has run dry.
    pub async fn settle(&self) { self.scheduler.settled().await }

    pub async fn close(&self) {
        self.shutdown.trigger();
        self.scheduler.join().await;
        tracing::info!("Node '{}' closed", self.config.app);
    }

    // Accessors
    pub fn config(&self) -> &NodeConfig { &self.config }
    pub fn arena(&self) -> &Arena { &self.arena }
    pub fn registry(&self) -> &ToolRegistry { &self.registry }
    pub fn stats(&self) -> &Arc<SchedulerStats> { self.scheduler.stats() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Status;
    use serde_json::json;

    #[tokio::test]
    async fn test_bootstrap_and_verbs() {
        let node = Node::start(NodeConfig::new("test-verbs")).await.unwrap();
        assert_eq!(node.get("root").await.unwrap().state.status, Status::Done);

        let id = node.spawn(SpawnRequest::new(json!({"type": "task", "desc": "hello"}))).await.unwrap();
        assert!(id.starts_with("task-"));
        node.settle().await;

        assert_eq!(node.get(&id).await.unwrap().state.status, Status::Done);
        assert!(node.get("root").await.unwrap().contains(&id));
        assert_eq!(node.list().await.unwrap().len(), 2);
        node.close().await;
    }

    #[tokio::test]
    async fn test_run_unknown_id() {
        let node = Node::start(NodeConfig::new("test-run")).await.unwrap();
        assert!(matches!(node.run("ghost").await, Err(EngineError::NoteNotFound(_))));
        node.close().await;
    }

    #[tokio::test]
    async fn test_spawn_rejects_what_the_capability_rejects() {
        let node = Node::start(NodeConfig::new("test-spawn-schema")).await.unwrap();
        let err = node.spawn(SpawnRequest::new(json!({"type": "task"})).with_id("a b")).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
        assert!(node.find("a b").await.unwrap().is_none());
        assert_eq!(node.get("root").await.unwrap().graph.len(), 0);
        node.close().await;
    }

    #[tokio::test]
    async fn test_pause_toggle() {
        let node = Node::start(NodeConfig::new("test-pause")).await.unwrap();
        assert!(!node.is_paused().await.unwrap());
        node.pause().await.unwrap();
        assert!(node.is_paused().await.unwrap());
        node.resume().await.unwrap();
        assert!(!node.is_paused().await.unwrap());
        node.close().await;
    }

    #[tokio::test]
    async fn test_without_bootstrap() {
        let node = Node::start(NodeConfig::new("bare").with_bootstrap(false)).await.unwrap();
        assert!(node.find("root").await.unwrap().is_none());
        node.close().await;
    }
}
