//! End-to-end engine behaviour through a memory-backed Node

use async_trait::async_trait;
use notemind::core::ids;
use notemind::{
    Capability, CapabilityContext, CapabilityOutput, InputSchema, Logic, Node, NodeConfig, Note, PropertySchema,
    SpawnRequest, Status, Step, ToolRegistry,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Always fails.
struct Explode { schema: InputSchema }

#[async_trait]
impl Capability for Explode {
    fn name(&self) -> &str { "explode" }
    fn input_schema(&self) -> &InputSchema { &self.schema }
    async fn call(&self, _ctx: &CapabilityContext, _input: Value) -> anyhow::Result<CapabilityOutput> {
        anyhow::bail!("kaboom")
    }
}

/// Tracks how many calls overlap.
struct Overlap { schema: InputSchema, active: Arc<AtomicUsize>, peak: Arc<AtomicUsize>, calls: Arc<AtomicUsize> }

#[async_trait]
impl Capability for Overlap {
    fn name(&self) -> &str { "overlap" }
    fn input_schema(&self) -> &InputSchema { &self.schema }
    async fn call(&self, ctx: &CapabilityContext, _input: Value) -> anyhow::Result<CapabilityOutput> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(CapabilityOutput::done().with_memory(format!("overlapped {}", ctx.note_id)))
    }
}

/// Panics on every call.
struct Crash { schema: InputSchema }

#[async_trait]
impl Capability for Crash {
    fn name(&self) -> &str { "crash" }
    fn input_schema(&self) -> &InputSchema { &self.schema }
    async fn call(&self, _ctx: &CapabilityContext, _input: Value) -> anyhow::Result<CapabilityOutput> {
        panic!("capability crashed")
    }
}

/// Writes `{summary}` into the invoking Note.
struct Summarize { schema: InputSchema }

#[async_trait]
impl Capability for Summarize {
    fn name(&self) -> &str { "summarize" }
    fn description(&self) -> &str { "Store a summary on the Note." }
    fn input_schema(&self) -> &InputSchema { &self.schema }
    async fn call(&self, _ctx: &CapabilityContext, input: Value) -> anyhow::Result<CapabilityOutput> {
        Ok(CapabilityOutput::running().with_content(json!({"summary": input["text"]})))
    }
}

fn config() -> NodeConfig {
    NodeConfig::new("engine-tests").with_base_delay(Duration::from_millis(10))
}

fn spawn_step(content: Value) -> Step { Step::new("spawn", json!({"content": content})) }

#[tokio::test]
async fn root_with_three_spawn_steps_builds_the_tree() {
    let node = Node::start(config().with_bootstrap(false)).await.unwrap();
    let root = Note::root().with_status(Status::Running).with_logic(Logic::sequential(vec![
        spawn_step(json!({"type": "task", "desc": "a"})),
        spawn_step(json!({"type": "task", "desc": "b"})),
        spawn_step(json!({"type": "task", "desc": "c"})),
    ]));
    node.seed(&root).await.unwrap();
    node.settle().await;

    let notes = node.list().await.unwrap();
    assert_eq!(notes.len(), 4);
    let root = node.get("root").await.unwrap();
    assert_eq!(root.state.status, Status::Done);
    assert_eq!(root.graph.len(), 3);
    assert!(root.graph.iter().all(|e| e.relation == "contains"));
    for edge in &root.graph {
        let child = node.get(&edge.target).await.unwrap();
        assert_eq!(child.state.status, Status::Done);
        assert_eq!(child.context, vec!["root".to_string()]);
    }

    let snapshot = node.snapshot().await.unwrap();
    assert_eq!(snapshot.nodes.len(), 4);
    assert_eq!(snapshot.edges.len(), 3);
    node.close().await;
}

#[tokio::test]
async fn respawning_an_id_links_it_once() {
    let node = Node::start(config()).await.unwrap();
    for desc in ["first", "second"] {
        node.spawn(SpawnRequest::new(json!({"type": "task", "desc": desc})).with_id("dup")).await.unwrap();
    }
    node.settle().await;

    let root = node.get("root").await.unwrap();
    assert_eq!(root.graph.iter().filter(|e| e.target == "dup").count(), 1);
    assert_eq!(node.get("dup").await.unwrap().desc(), Some("second"));
    node.close().await;
}

#[tokio::test]
async fn nested_spawns_link_under_their_parent() {
    let node = Node::start(config()).await.unwrap();
    let parent = node
        .spawn(SpawnRequest::new(json!({"type": "plan"})).with_id("plan").with_logic(Logic::sequential(vec![
            Step::new("spawn", json!({"id": "step-1", "content": {"type": "step"}, "context": ["plan"]})),
            Step::new("spawn", json!({"id": "step-2", "content": {"type": "step"}, "context": ["plan"]})),
        ])))
        .await
        .unwrap();
    node.settle().await;

    let plan = node.get(&parent).await.unwrap();
    let targets: Vec<&str> = plan.graph.iter().map(|e| e.target.as_str()).collect();
    assert_eq!(targets, vec!["step-1", "step-2"]);
    assert_eq!(plan.state.status, Status::Done);
    assert!(node.get("root").await.unwrap().contains("plan"));
    assert!(!node.get("root").await.unwrap().contains("step-1"));
    node.close().await;
}

#[tokio::test]
async fn spawn_under_missing_parent_falls_back_to_root() {
    let node = Node::start(config()).await.unwrap();
    let id = node.spawn(SpawnRequest::new(json!({"type": "orphan"})).with_parent("nowhere")).await.unwrap();
    node.settle().await;

    assert_eq!(node.get(&id).await.unwrap().context, vec!["root".to_string()]);
    assert!(node.get("root").await.unwrap().contains(&id));
    assert!(node.find("nowhere").await.unwrap().is_none());
    node.close().await;
}

#[tokio::test]
async fn self_spawning_notes_wait_for_an_explicit_run() {
    let node = Node::start(config()).await.unwrap();
    let id = node
        .spawn(SpawnRequest::new(json!({"type": "seed", "name": "spawn"}))
            .with_id("seeder")
            .with_logic(Logic::single(json!({"id": "sprout", "content": {"type": "leaf"}, "context": ["seeder"]}))))
        .await
        .unwrap();
    node.settle().await;

    assert_eq!(node.get(&id).await.unwrap().state.status, Status::Running);
    assert!(node.find("sprout").await.unwrap().is_none());

    node.run(&id).await.unwrap();
    node.settle().await;

    let seeder = node.get(&id).await.unwrap();
    assert_eq!(seeder.state.status, Status::Done);
    assert!(seeder.contains("sprout"));
    assert_eq!(node.get("sprout").await.unwrap().state.status, Status::Done);
    node.close().await;
}

#[tokio::test]
async fn pause_holds_work_until_resaved() {
    let node = Node::start(config()).await.unwrap();
    node.pause().await.unwrap();

    let id = node.spawn(SpawnRequest::new(json!({"type": "task"}))).await.unwrap();
    node.settle().await;
    assert_eq!(node.get(&id).await.unwrap().state.status, Status::Running);

    node.resume().await.unwrap();
    node.settle().await;
    // Resuming does not replay what was skipped.
    assert_eq!(node.get(&id).await.unwrap().state.status, Status::Running);

    let note = node.get(&id).await.unwrap();
    node.seed(&note).await.unwrap();
    node.settle().await;
    assert_eq!(node.get(&id).await.unwrap().state.status, Status::Done);
    node.close().await;
}

#[tokio::test]
async fn explicit_run_still_respects_pause() {
    let node = Node::start(config()).await.unwrap();
    node.spawn(SpawnRequest::new(json!({"type": "seed", "name": "spawn"})).with_id("s")
        .with_logic(Logic::single(json!({"content": {"type": "leaf"}}))))
        .await
        .unwrap();
    node.pause().await.unwrap();
    node.run("s").await.unwrap();
    node.settle().await;
    assert_eq!(node.get("s").await.unwrap().state.status, Status::Running);
    node.close().await;
}

#[tokio::test]
async fn control_capability_pauses_from_a_step() {
    let node = Node::start(config()).await.unwrap();
    node.spawn(SpawnRequest::new(json!({"type": "switch"})).with_logic(Logic::sequential(vec![
        Step::new("control", json!({"command": "pause"})),
    ])))
    .await
    .unwrap();
    node.settle().await;

    assert!(node.is_paused().await.unwrap());
    let control = node.get(ids::CONTROL).await.unwrap();
    assert_eq!(control.content["paused"], true);
    node.close().await;
}

#[tokio::test(start_paused = true)]
async fn failing_note_is_retried_three_times_then_failed() {
    let registry = ToolRegistry::with_builtins().with(Explode { schema: InputSchema::new() });
    let node = Node::start_with(
        NodeConfig::new("retry").with_max_retries(3).with_base_delay(Duration::from_millis(1000)),
        registry,
    )
    .await
    .unwrap();

    let started = tokio::time::Instant::now();
    let id = node
        .spawn(SpawnRequest::new(json!({"type": "doomed"})).with_logic(Logic::sequential(vec![Step::new("explode", json!({}))])))
        .await
        .unwrap();
    node.settle().await;

    let note = node.get(&id).await.unwrap();
    assert_eq!(note.state.status, Status::Failed);
    let log = node.memory_log(&id).await.unwrap();
    assert_eq!(log.len(), 4);
    for line in &log[..3] {
        assert!(line.starts_with("Error: "), "{line}");
        assert!(line.contains("kaboom"), "{line}");
    }
    assert_eq!(log[3], "max retries reached");
    // 1s + 2s + 3s of backoff
    assert!(started.elapsed() >= Duration::from_secs(6));
    assert_eq!(node.stats().exhausted(), 1);
    node.close().await;
}

#[tokio::test]
async fn failed_attempt_discards_partial_results() {
    let registry = ToolRegistry::with_builtins()
        .with(Explode { schema: InputSchema::new() })
        .with(Summarize { schema: InputSchema::new().required("text", PropertySchema::new("string", "summary text")) });
    let node = Node::start_with(config().with_max_retries(1), registry).await.unwrap();

    let id = node
        .spawn(SpawnRequest::new(json!({"type": "task"})).with_logic(Logic::sequential(vec![
            Step::new("summarize", json!({"text": "partial"})),
            Step::new("explode", json!({})),
        ])))
        .await
        .unwrap();
    node.settle().await;

    let note = node.get(&id).await.unwrap();
    assert_eq!(note.state.status, Status::Failed);
    assert!(note.content.get("summary").is_none());
    node.close().await;
}

#[tokio::test]
async fn invalid_step_input_fails_with_validation_log() {
    let registry = ToolRegistry::with_builtins()
        .with(Summarize { schema: InputSchema::new().required("text", PropertySchema::new("string", "summary text")) });
    let node = Node::start_with(config().with_max_retries(2), registry).await.unwrap();

    let id = node
        .spawn(SpawnRequest::new(json!({"type": "task"})).with_logic(Logic::sequential(vec![
            Step::new("summarize", json!({"text": 42})),
        ])))
        .await
        .unwrap();
    node.settle().await;

    let log = node.memory_log(&id).await.unwrap();
    assert_eq!(log.len(), 3);
    assert!(log[0].contains("summarize"));
    assert_eq!(node.get(&id).await.unwrap().state.status, Status::Failed);
    node.close().await;
}

#[tokio::test]
async fn unknown_capability_is_retried_like_any_failure() {
    let node = Node::start(config().with_max_retries(2)).await.unwrap();
    let id = node
        .spawn(SpawnRequest::new(json!({"type": "task", "name": "does-not-exist"})))
        .await
        .unwrap();
    node.settle().await;

    let log = node.memory_log(&id).await.unwrap();
    assert_eq!(log.len(), 3);
    assert!(log[0].starts_with("Error: "));
    assert!(log[0].contains("does-not-exist"));
    assert_eq!(node.get(&id).await.unwrap().state.status, Status::Failed);
    node.close().await;
}

#[tokio::test]
async fn capability_output_merges_into_content() {
    let registry = ToolRegistry::with_builtins()
        .with(Summarize { schema: InputSchema::new().required("text", PropertySchema::new("string", "summary text")) });
    let node = Node::start_with(config(), registry).await.unwrap();
    let id = node
        .spawn(SpawnRequest::new(json!({"type": "doc", "name": "summarize", "desc": "keep me"}))
            .with_logic(Logic::single(json!({"text": "short"}))))
        .await
        .unwrap();
    node.settle().await;

    let note = node.get(&id).await.unwrap();
    assert_eq!(note.content["summary"], "short");
    assert_eq!(note.content["desc"], "keep me");
    // `running` from the capability finalizes to done
    assert_eq!(note.state.status, Status::Done);
    node.close().await;
}

#[tokio::test]
async fn concurrency_never_exceeds_k() {
    const K: usize = 3;
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = ToolRegistry::with_builtins().with(Overlap {
        schema: InputSchema::new(),
        active: active.clone(),
        peak: peak.clone(),
        calls: calls.clone(),
    });
    let node = Node::start_with(config().with_concurrency(K), registry).await.unwrap();

    let mut ids = Vec::new();
    for i in 0..K + 5 {
        ids.push(node.spawn(SpawnRequest::new(json!({"type": "overlap", "name": "overlap"})).with_id(format!("p{}", i))).await.unwrap());
    }
    node.settle().await;

    assert_eq!(calls.load(Ordering::SeqCst), K + 5);
    assert!(peak.load(Ordering::SeqCst) <= K, "peak {}", peak.load(Ordering::SeqCst));
    assert!(node.stats().peak() <= K);
    for id in &ids {
        let note = node.get(id).await.unwrap();
        assert_eq!(note.state.status, Status::Done);
        assert_eq!(node.memory_log(id).await.unwrap(), vec![format!("overlapped {}", id)]);
    }
    node.close().await;
}

#[tokio::test]
async fn every_note_ends_in_a_known_status() {
    let registry = ToolRegistry::with_builtins().with(Explode { schema: InputSchema::new() });
    let node = Node::start_with(config().with_max_retries(1), registry).await.unwrap();
    node.spawn(SpawnRequest::new(json!({"type": "ok"}))).await.unwrap();
    node.spawn(SpawnRequest::new(json!({"type": "bad", "name": "explode"}))).await.unwrap();
    node.spawn(SpawnRequest::new(json!({"type": "later"})).with_status(Status::Pending)).await.unwrap();
    node.settle().await;

    for note in node.list().await.unwrap() {
        let raw = serde_json::to_value(&note.state).unwrap();
        let status = raw["status"].as_str().unwrap();
        assert!(["pending", "running", "done", "failed"].contains(&status));
        assert_ne!(note.state.status, Status::Running, "{} left running", note.id);
    }
    node.close().await;
}

#[tokio::test]
async fn runs_of_one_id_never_overlap() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = ToolRegistry::with_builtins().with(Overlap {
        schema: InputSchema::new(),
        active: active.clone(),
        peak: peak.clone(),
        calls: calls.clone(),
    });
    let node = Node::start_with(config().with_concurrency(8), registry).await.unwrap();

    // Park the Note so only the explicit runs below can execute it.
    node.pause().await.unwrap();
    node.spawn(SpawnRequest::new(json!({"type": "job", "name": "overlap"})).with_id("x")).await.unwrap();
    node.settle().await;
    node.resume().await.unwrap();
    node.settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    for _ in 0..5 {
        node.run("x").await.unwrap();
    }
    node.settle().await;

    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(node.get("x").await.unwrap().state.status, Status::Done);
    assert_eq!(node.memory_log("x").await.unwrap(), vec!["overlapped x".to_string()]);
    assert!(node.stats().skipped() >= 4);
    node.close().await;
}

#[tokio::test]
async fn panicking_capability_is_logged_and_failed() {
    let registry = ToolRegistry::with_builtins().with(Crash { schema: InputSchema::new() });
    let node = Node::start_with(config().with_max_retries(2), registry).await.unwrap();
    let id = node.spawn(SpawnRequest::new(json!({"type": "task", "name": "crash"}))).await.unwrap();
    node.settle().await;

    let log = node.memory_log(&id).await.unwrap();
    assert_eq!(log.len(), 3);
    for line in &log[..2] {
        assert!(line.starts_with("Error: "), "{line}");
        assert!(line.contains("panicked: capability crashed"), "{line}");
    }
    assert_eq!(log[2], "max retries reached");
    assert_eq!(node.get(&id).await.unwrap().state.status, Status::Failed);
    node.close().await;
}
