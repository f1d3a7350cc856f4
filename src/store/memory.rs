//! In-memory arena keyed by id

use super::{ChangeReceiver, NoteStore, Notifier};
use crate::core::{EngineError, EngineResult, Note, NoteId};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryStore {
    notes: RwLock<HashMap<NoteId, Note>>,
    notifier: Notifier,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub async fn len(&self) -> usize { self.notes.read().await.len() }
}

#[async_trait]
impl NoteStore for MemoryStore {
    async fn initialize(&self) -> EngineResult<()> { Ok(()) }

    async fn save(&self, note: &Note) -> EngineResult<()> {
        self.notes.write().await.insert(note.id.clone(), note.clone());
        self.notifier.emit(&note.id);
        Ok(())
    }

    async fn load(&self, id: &str) -> EngineResult<Note> {
        self.notes.read().await.get(id).cloned().ok_or_else(|| EngineError::NoteNotFound(id.into()))
    }

    async fn list(&self) -> EngineResult<Vec<Note>> {
        let mut notes: Vec<Note> = self.notes.read().await.values().cloned().collect();
        notes.sort_by(|a, b| a.ts.cmp(&b.ts).then_with(|| a.id.cmp(&b.id)));
        Ok(notes)
    }

    fn watch(&self) -> ChangeReceiver { self.notifier.subscribe() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Logic, Step};
    use crate::store::ChangeEvent;
    use serde_json::json;

    #[tokio::test]
    async fn save_then_load_reads_back() {
        let store = MemoryStore::new();
        let mut rx = store.watch();
        let note = Note::new("n1", json!({"type": "task"}));
        store.save(&note).await.unwrap();
        assert_eq!(store.load("n1").await.unwrap(), note);
        assert_eq!(rx.recv().await, Some(ChangeEvent::change("n1")));
    }

    #[tokio::test]
    async fn missing_note_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(store.load("ghost").await, Err(EngineError::NoteNotFound(id)) if id == "ghost"));
        assert!(store.find("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn resave_is_deep_equal() {
        let store = MemoryStore::new();
        let mut note = Note::new("n1", json!({"type": "task", "nested": {"a": [1, 2, {"b": null}]}}))
            .with_logic(Logic::sequential(vec![Step::new("spawn", json!({"content": {"type": "child"}}))]));
        note.link_child("c1");
        store.save(&note).await.unwrap();
        let loaded = store.load("n1").await.unwrap();
        store.save(&loaded).await.unwrap();
        assert_eq!(store.load("n1").await.unwrap(), note);
    }

    #[tokio::test]
    async fn upsert_overwrites_in_place() {
        let store = MemoryStore::new();
        store.save(&Note::new("n1", json!({"v": 1}))).await.unwrap();
        store.save(&Note::new("n1", json!({"v": 2}))).await.unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(store.load("n1").await.unwrap().content["v"], 2);
    }
}
