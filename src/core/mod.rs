//! Core types shared by every layer

pub mod error;
pub mod ids;
pub mod note;

pub use error::{EngineError, EngineResult};
pub use note::{next_id, Edge, Logic, Note, NoteId, NoteState, Resources, SpawnRequest, Status, Step};
