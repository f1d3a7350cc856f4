//! Note Store: keyed persistence with a change feed
//!
//! Every successful `save` emits a [`ChangeEvent`] to every subscriber. The
//! backend (memory map, JSON directory) is swappable behind [`NoteStore`].
//!
//! ```text
//! save(note) ──▶ backend write ──▶ Notifier::emit(id)
//!                                      │
//!                                      ├──▶ ChangeReceiver (scheduler)
//!                                      └──▶ ChangeReceiver (any other watcher)
//! ```
//!
//! Each receiver carries a [`Backlog`]: incremented on send, decremented by
//! the consumer once the event's work is finished. `Backlog::settled` is how
//! callers wait for the notification loop to run dry.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::core::{EngineError, EngineResult, Note, NoteId};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};

#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Prepare the backend. No-op for the memory map.
    async fn initialize(&self) -> EngineResult<()>;
    /// Upsert, then notify subscribers once the write is visible.
    async fn save(&self, note: &Note) -> EngineResult<()>;
    async fn load(&self, id: &str) -> EngineResult<Note>;
    /// Snapshot of every Note, ordered by `ts` then id.
    async fn list(&self) -> EngineResult<Vec<Note>>;
    fn watch(&self) -> ChangeReceiver;

    async fn find(&self, id: &str) -> EngineResult<Option<Note>> {
        match self.load(id).await {
            Ok(note) => Ok(Some(note)),
            Err(EngineError::NoteNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Emitted by `save`.
    Change,
    /// Explicit run request; bypasses the self-reference guard.
    Run,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Change => "change",
            ChangeKind::Run => "run",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub id: NoteId,
}

impl ChangeEvent {
    pub fn change(id: impl Into<NoteId>) -> Self { Self { kind: ChangeKind::Change, id: id.into() } }
    pub fn run(id: impl Into<NoteId>) -> Self { Self { kind: ChangeKind::Run, id: id.into() } }
}

/// Outstanding events for one receiver: sent but not yet finished.
#[derive(Debug, Default)]
pub struct Backlog {
    count: AtomicUsize,
    idle: Notify,
}

impl Backlog {
    fn enter(&self) { self.count.fetch_add(1, Ordering::SeqCst); }

    /// Mark one received event as fully handled.
    pub fn finish(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    pub fn pending(&self) -> usize { self.count.load(Ordering::SeqCst) }

    /// Resolve once nothing is outstanding.
    pub async fn settled(&self) {
        loop {
            let notified = self.idle.notified();
            if self.pending() == 0 { return; }
            notified.await;
        }
    }
}

/// Sending half of one subscription.
#[derive(Debug, Clone)]
pub struct ChangeSender {
    tx: mpsc::UnboundedSender<ChangeEvent>,
    backlog: Arc<Backlog>,
}

impl ChangeSender {
    /// False once the receiver is gone.
    pub fn send(&self, event: ChangeEvent) -> bool {
        self.backlog.enter();
        if self.tx.send(event).is_err() {
            self.backlog.finish();
            return false;
        }
        true
    }
}

pub struct ChangeReceiver {
    rx: mpsc::UnboundedReceiver<ChangeEvent>,
    sender: ChangeSender,
}

impl ChangeReceiver {
    fn channel() -> (ChangeSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = ChangeSender { tx, backlog: Arc::new(Backlog::default()) };
        (sender.clone(), Self { rx, sender })
    }

    pub async fn recv(&mut self) -> Option<ChangeEvent> { self.rx.recv().await }

    pub fn try_recv(&mut self) -> Option<ChangeEvent> { self.rx.try_recv().ok() }

    pub fn backlog(&self) -> Arc<Backlog> { self.sender.backlog.clone() }

    /// Extra sender feeding this receiver, accounted in the same backlog.
    pub fn injector(&self) -> ChangeSender { self.sender.clone() }
}

/// Fan-out shared by the backends.
#[derive(Default)]
pub struct Notifier {
    subscribers: Mutex<Vec<ChangeSender>>,
}

impl Notifier {
    pub fn subscribe(&self) -> ChangeReceiver {
        let (sender, receiver) = ChangeReceiver::channel();
        self.subscribers.lock().unwrap_or_else(|p| p.into_inner()).push(sender);
        receiver
    }

    pub fn emit(&self, id: &str) {
        let mut subs = self.subscribers.lock().unwrap_or_else(|p| p.into_inner());
        subs.retain(|s| s.send(ChangeEvent::change(id)));
    }

    pub fn subscriber_count(&self) -> usize { self.subscribers.lock().unwrap_or_else(|p| p.into_inner()).len() }
}
