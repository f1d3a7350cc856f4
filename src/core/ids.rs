//! Well-known ids and constants
//!
//! Centralized registry for the ids, relations and content tags the engine
//! treats specially. Everything else in a Note is opaque to the core.

/// Default parent of every spawned Note.
pub const ROOT: &str = "root";

/// Control Note holding the global pause gate.
pub const CONTROL: &str = "ui-status";

/// Relations recorded in `Note::graph`
pub mod relation {
    pub const CONTAINS: &str = "contains";
}

/// `content.type` tags
pub mod kind {
    pub const ROOT: &str = "root";
    pub const CONTROL: &str = "control";
    pub const MEMORY: &str = "memory";
    /// Fallback when a spawn request carries no type.
    pub const NOTE: &str = "note";
}

/// Built-in capability names
pub mod capability {
    pub const SPAWN: &str = "spawn";
    pub const CONTROL: &str = "control";
}

/// Logic modes
pub mod logic {
    pub const SEQUENTIAL: &str = "sequential";
}

/// Memory log lines written by the retry controller
pub mod log {
    pub const ERROR_PREFIX: &str = "Error: ";
    pub const RETRIES_EXHAUSTED: &str = "max retries reached";
}
