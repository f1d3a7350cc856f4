//! Arena: the Note Store plus per-id serialization
//!
//! Every component treats Notes as values: load, mutate locally, save back.
//! Two lock tables keyed by id keep that safe:
//!
//! - **attempt** lock: held for a whole supervised run, so one id never has
//!   two executions in flight;
//! - **write** lock: held around each read-modify-write, so concurrent
//!   writers to one id (a parent's own commit and its children's graph
//!   links) never lose each other's updates.
//!
//! The two tables are separate so a running attempt can still have its
//! graph extended by the children it spawns.

use crate::core::{EngineError, EngineResult, Note, NoteId};
use crate::store::NoteStore;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub struct NoteLocks {
    attempts: DashMap<NoteId, Arc<Mutex<()>>>,
    writes: DashMap<NoteId, Arc<Mutex<()>>>,
}

impl NoteLocks {
    pub async fn attempt(&self, id: &str) -> OwnedMutexGuard<()> { Self::acquire(&self.attempts, id).await }

    pub async fn write(&self, id: &str) -> OwnedMutexGuard<()> { Self::acquire(&self.writes, id).await }

    async fn acquire(table: &DashMap<NoteId, Arc<Mutex<()>>>, id: &str) -> OwnedMutexGuard<()> {
        // Clone the slot out so no map shard stays locked across the await.
        let slot = table.entry(id.to_string()).or_default().clone();
        slot.lock_owned().await
    }
}

/// Shared handle over the store and its lock tables.
#[derive(Clone)]
pub struct Arena {
    store: Arc<dyn NoteStore>,
    locks: Arc<NoteLocks>,
}

impl Arena {
    pub fn new(store: Arc<dyn NoteStore>) -> Self { Self { store, locks: Arc::new(NoteLocks::default()) } }

    pub fn store(&self) -> &Arc<dyn NoteStore> { &self.store }
    pub fn locks(&self) -> &NoteLocks { &self.locks }

    pub async fn load(&self, id: &str) -> EngineResult<Note> { self.store.load(id).await }
    pub async fn find(&self, id: &str) -> EngineResult<Option<Note>> { self.store.find(id).await }
    pub async fn list(&self) -> EngineResult<Vec<Note>> { self.store.list().await }

    /// Upsert a whole Note, replacing whatever was stored under its id.
    pub async fn put(&self, note: &Note) -> EngineResult<()> {
        let _guard = self.locks.write(&note.id).await;
        self.store.save(note).await
    }

    /// Load, mutate, save under the write lock. `f` returns whether anything
    /// changed; unchanged Notes are not re-saved (no spurious change events).
    pub async fn update<F>(&self, id: &str, f: F) -> EngineResult<Note>
    where
        F: FnOnce(&mut Note) -> bool + Send,
    {
        let _guard = self.locks.write(id).await;
        let mut note = self.store.load(id).await?;
        if f(&mut note) { self.store.save(&note).await?; }
        Ok(note)
    }

    /// Like [`Arena::update`] but creates the Note with `init` when absent.
    pub async fn upsert<I, F>(&self, id: &str, init: I, f: F) -> EngineResult<Note>
    where
        I: FnOnce() -> Note + Send,
        F: FnOnce(&mut Note) -> bool + Send,
    {
        let _guard = self.locks.write(id).await;
        let (mut note, created) = match self.store.find(id).await? {
            Some(note) => (note, false),
            None => (init(), true),
        };
        if f(&mut note) || created { self.store.save(&note).await?; }
        Ok(note)
    }

    /// Persist a Memory Note for `parent` without referencing it yet.
    pub async fn record(&self, parent: &str, text: impl Into<String>) -> EngineResult<NoteId> {
        let memory = Note::memory(parent, text);
        self.store.save(&memory).await?;
        Ok(memory.id)
    }

    /// Persist a Memory Note and append its id to `parent.memory`.
    pub async fn append_memory(&self, parent: &str, text: impl Into<String>) -> EngineResult<NoteId> {
        if self.store.find(parent).await?.is_none() {
            return Err(EngineError::NoteNotFound(parent.into()));
        }
        let id = self.record(parent, text).await?;
        let mem = id.clone();
        self.update(parent, move |note| { note.memory.push(mem); true }).await?;
        Ok(id)
    }

    /// Memory log lines of `id`, oldest first. Missing entries are skipped.
    pub async fn memory_log(&self, id: &str) -> EngineResult<Vec<String>> {
        let note = self.store.load(id).await?;
        let mut lines = Vec::with_capacity(note.memory.len());
        for mem in &note.memory {
            if let Some(entry) = self.store.find(mem).await? {
                lines.push(entry.log_text().map(str::to_string).unwrap_or_else(|| entry.content.to_string()));
            }
        }
        Ok(lines)
    }
}
