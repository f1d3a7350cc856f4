//! Retry Controller: bounded re-attempts with linear backoff
//!
//! ```text
//! attempt 1 ──fail──▶ log "Error: ..." ──sleep 1×base──▶ attempt 2
//! attempt 2 ──fail──▶ log "Error: ..." ──sleep 2×base──▶ attempt 3
//! attempt 3 ──fail──▶ log "Error: ..." ──sleep 3×base──▶ log "max retries reached", status = failed
//! ```
//!
//! Failures stop here. Nothing is re-raised into the scheduler.

use super::executor::{Attempt, Executor};
use crate::core::{ids, EngineError, EngineResult, NoteId, Status};
use crate::store::ChangeKind;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, at least 1.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self { Self { max_retries: 3, base_delay: Duration::from_millis(1000) } }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self { Self { max_retries: max_retries.max(1), base_delay } }

    /// Wait after failed attempt `attempt` (1-based). Saturates instead of overflowing.
    pub fn delay_for(&self, attempt: u32) -> Duration { self.base_delay.checked_mul(attempt).unwrap_or(Duration::MAX) }
}

/// What supervising one trigger amounted to.
#[derive(Debug)]
pub struct RetryReport {
    pub id: NoteId,
    pub attempts: u32,
    pub delays: Vec<Duration>,
    pub result: EngineResult<Attempt>,
}

impl RetryReport {
    pub fn exhausted(&self) -> bool { matches!(self.result, Err(EngineError::RetryExhausted { .. })) }
}

#[derive(Clone)]
pub struct RetryController {
    executor: Executor,
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(executor: Executor, policy: RetryPolicy) -> Self { Self { executor, policy } }

    pub fn policy(&self) -> &RetryPolicy { &self.policy }
    pub fn executor(&self) -> &Executor { &self.executor }

    /// Run `id` until an attempt succeeds or the budget is spent. Holds the
    /// per-id attempt lock throughout, backoff included.
    pub async fn supervise(&self, id: &str, kind: ChangeKind) -> RetryReport {
        let arena = self.executor.arena();
        let _attempt = arena.locks().attempt(id).await;
        let max = self.policy.max_retries.max(1);
        let mut delays = Vec::new();

        for attempt in 1..=max {
            match self.executor.run(id, kind).await {
                Ok(outcome) => return RetryReport { id: id.into(), attempts: attempt, delays, result: Ok(outcome) },
                Err(EngineError::NoteNotFound(missing)) if missing == id => {
                    tracing::warn!("{}: note vanished, not retrying", id);
                    return RetryReport { id: id.into(), attempts: attempt, delays, result: Err(EngineError::NoteNotFound(missing)) };
                }
                Err(e) => {
                    tracing::warn!("{} attempt {}/{} failed: {}", id, attempt, max, e);
                    if let Err(log_err) = arena.append_memory(id, format!("{}{}", ids::log::ERROR_PREFIX, e)).await {
                        tracing::error!("{}: could not log failure: {}", id, log_err);
                    }
                    let delay = self.policy.delay_for(attempt);
                    delays.push(delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }

        if let Err(e) = self.give_up(id).await {
            tracing::error!("{}: could not mark failed: {}", id, e);
        }
        tracing::warn!("{}: {} after {} attempts", id, ids::log::RETRIES_EXHAUSTED, max);
        RetryReport { id: id.into(), attempts: max, delays, result: Err(EngineError::RetryExhausted { id: id.into(), attempts: max }) }
    }

    async fn give_up(&self, id: &str) -> EngineResult<()> {
        let arena = self.executor.arena();
        let logged = arena.record(id, ids::log::RETRIES_EXHAUSTED).await?;
        arena.update(id, move |note| {
            note.memory.push(logged);
            note.state.status = Status::Failed;
            true
        }).await?;
        Ok(())
    }
}
