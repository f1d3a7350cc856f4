//! Engine: turns saved Notes into executions
//!
//! ```text
//! NoteStore::save ──▶ ChangeEvent ──▶ Scheduler (K permits)
//!                                         │
//!                                         ▼
//!                               RetryController::supervise
//!                                         │  attempt lock per id
//!                                         ▼
//!                               Executor::run ──▶ gate ──▶ steps ──▶ commit
//!                                                            │
//!                                                  ToolRegistry::invoke
//! ```
//!
//! | Piece | Responsibility |
//! |-------|----------------|
//! | [`Arena`] | store handle + per-id attempt/write locks |
//! | [`Executor`] | one attempt: pause gate, status gate, self-reference guard, steps |
//! | [`RetryController`] | up to `max_retries` attempts, linear backoff, failure log |
//! | [`Scheduler`] | bounded concurrency over the change feed |

mod arena;
pub mod executor;
pub mod retry;
pub mod scheduler;

pub use arena::{Arena, NoteLocks};
pub use executor::{Attempt, Executor, SkipReason};
pub use retry::{RetryController, RetryPolicy, RetryReport};
pub use scheduler::{Scheduler, SchedulerHandle, SchedulerStats};
