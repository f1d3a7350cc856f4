//! Durable backend: one JSON file per Note

use super::{ChangeReceiver, NoteStore, Notifier};
use crate::core::{EngineError, EngineResult, Note};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

const EXT: &str = "json";

pub struct FileStore {
    dir: PathBuf,
    notifier: Notifier,
    tmp_seq: AtomicU64,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), notifier: Notifier::default(), tmp_seq: AtomicU64::new(0) }
    }

    fn path_for(&self, id: &str) -> PathBuf { self.dir.join(format!("{}.{}", encode_id(id), EXT)) }
}

/// Percent-encode everything outside `[A-Za-z0-9._-]` so any id maps to one flat filename.
fn encode_id(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for b in id.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' => out.push(b as char),
            b'.' if !out.is_empty() => out.push('.'),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

#[async_trait]
impl NoteStore for FileStore {
    async fn initialize(&self) -> EngineResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tracing::info!("FileStore: {}", self.dir.display());
        Ok(())
    }

    async fn save(&self, note: &Note) -> EngineResult<()> {
        let target = self.path_for(&note.id);
        let tmp = self.dir.join(format!(".{}.{}.tmp", encode_id(&note.id), self.tmp_seq.fetch_add(1, Ordering::Relaxed)));
        let bytes = serde_json::to_vec_pretty(note)?;
        let written = match tokio::fs::write(&tmp, bytes).await {
            Ok(()) => tokio::fs::rename(&tmp, &target).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("FileStore: could not remove {}: {}", tmp.display(), cleanup);
                }
            }
            return Err(e.into());
        }
        self.notifier.emit(&note.id);
        Ok(())
    }

    async fn load(&self, id: &str) -> EngineResult<Note> {
        match tokio::fs::read(self.path_for(id)).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(EngineError::NoteNotFound(id.into())),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> EngineResult<Vec<Note>> {
        let mut notes = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(notes),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXT) { continue; }
            match tokio::fs::read(&path).await {
                Ok(bytes) => match serde_json::from_slice::<Note>(&bytes) {
                    Ok(note) => notes.push(note),
                    Err(e) => tracing::warn!("FileStore: skipping {}: {}", path.display(), e),
                },
                // Renamed away between read_dir and read.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        notes.sort_by(|a, b| a.ts.cmp(&b.ts).then_with(|| a.id.cmp(&b.id)));
        Ok(notes)
    }

    fn watch(&self) -> ChangeReceiver { self.notifier.subscribe() }
}
