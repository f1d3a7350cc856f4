//! Scheduler: change feed in, supervised runs out, at most K at a time
//!
//! ```text
//! ChangeReceiver ──recv──▶ acquire permit (arrival order) ──▶ JoinSet task
//!                                                              │
//!                                      RetryController::supervise(id)
//!                                                              │
//!                                      drop permit, Backlog::finish()
//! ```
//!
//! Permits are taken in the loop, before spawning, so admission is FIFO and
//! the number of in-flight executions never exceeds the semaphore size.

use super::executor::Attempt;
use super::retry::{RetryController, RetryReport};
use crate::core::NoteId;
use crate::store::{Backlog, ChangeEvent, ChangeReceiver, ChangeSender};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};

/// Running counters, readable while the loop runs.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    admitted: AtomicU64,
    completed: AtomicU64,
    skipped: AtomicU64,
    exhausted: AtomicU64,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl SchedulerStats {
    pub fn admitted(&self) -> u64 { self.admitted.load(Ordering::SeqCst) }
    pub fn completed(&self) -> u64 { self.completed.load(Ordering::SeqCst) }
    pub fn skipped(&self) -> u64 { self.skipped.load(Ordering::SeqCst) }
    pub fn exhausted(&self) -> u64 { self.exhausted.load(Ordering::SeqCst) }
    pub fn active(&self) -> usize { self.active.load(Ordering::SeqCst) }
    /// Highest number of tasks holding a permit at once.
    pub fn peak(&self) -> usize { self.peak.load(Ordering::SeqCst) }

    fn begin(&self) {
        self.admitted.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn record(&self, report: &RetryReport) {
        match &report.result {
            Ok(Attempt::Completed(_)) => self.completed.fetch_add(1, Ordering::SeqCst),
            Ok(Attempt::Skipped(_)) => self.skipped.fetch_add(1, Ordering::SeqCst),
            Err(_) if report.exhausted() => self.exhausted.fetch_add(1, Ordering::SeqCst),
            Err(_) => 0,
        };
    }
}

/// Finishes one backlog entry and frees the active slot, even if the task panics.
struct TaskGuard {
    backlog: Arc<Backlog>,
    stats: Arc<SchedulerStats>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.stats.active.fetch_sub(1, Ordering::SeqCst);
        self.backlog.finish();
    }
}

pub struct Scheduler {
    retry: RetryController,
    concurrency: usize,
}

impl Scheduler {
    pub fn new(retry: RetryController, concurrency: usize) -> Self { Self { retry, concurrency: concurrency.max(1) } }

    /// Start the loop on the current runtime.
    pub fn spawn(self, feed: ChangeReceiver, shutdown: broadcast::Receiver<()>) -> SchedulerHandle {
        let injector = feed.injector();
        let backlog = feed.backlog();
        let stats = Arc::new(SchedulerStats::default());
        let join = tokio::spawn(self.run(feed, shutdown, stats.clone()));
        SchedulerHandle { join: Mutex::new(Some(join)), injector, backlog, stats }
    }

    async fn run(self, mut feed: ChangeReceiver, mut shutdown: broadcast::Receiver<()>, stats: Arc<SchedulerStats>) {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let backlog = feed.backlog();
        let retry = Arc::new(self.retry);
        let mut tasks: JoinSet<()> = JoinSet::new();
        tracing::info!("Scheduler started (concurrency {})", self.concurrency);

        loop {
            let event = tokio::select! {
                _ = shutdown.recv() => break,
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    reap(joined);
                    continue;
                }
                event = feed.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            let permit = tokio::select! {
                _ = shutdown.recv() => {
                    backlog.finish();
                    break;
                }
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        backlog.finish();
                        break;
                    }
                },
            };

            let ChangeEvent { kind, id } = event;
            tracing::debug!("admit {} ({})", id, kind.as_str());
            stats.begin();
            let guard = TaskGuard { backlog: backlog.clone(), stats: stats.clone() };
            let retry = retry.clone();
            let stats = stats.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let _guard = guard;
                let report = retry.supervise(&id, kind).await;
                stats.record(&report);
                log_report(&report);
            });
        }

        tracing::info!("Scheduler stopping, {} task(s) in flight", tasks.len());
        while let Some(joined) = tasks.join_next().await {
            reap(joined);
        }
        while feed.try_recv().is_some() {
            backlog.finish();
        }
        tracing::info!("Scheduler stopped");
    }
}

fn reap(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            tracing::error!("execution task panicked: {}", e);
        }
    }
}

fn log_report(report: &RetryReport) {
    match &report.result {
        Ok(Attempt::Completed(status)) => {
            tracing::info!("{} -> {} ({} attempt(s))", report.id, status, report.attempts)
        }
        Ok(Attempt::Skipped(reason)) => tracing::debug!("{} skipped: {}", report.id, reason),
        Err(e) => tracing::warn!("{}: {}", report.id, e),
    }
}

/// Owner side of a running scheduler.
pub struct SchedulerHandle {
    join: Mutex<Option<JoinHandle<()>>>,
    injector: ChangeSender,
    backlog: Arc<Backlog>,
    stats: Arc<SchedulerStats>,
}

impl SchedulerHandle {
    /// Queue an explicit run. False once the loop is gone.
    pub fn run(&self, id: impl Into<NoteId>) -> bool { self.injector.send(ChangeEvent::run(id)) }

    /// Wait until every queued event, and everything it caused, is handled.
    pub async fn settled(&self) { self.backlog.settled().await }

    pub fn pending(&self) -> usize { self.backlog.pending() }
    pub fn stats(&self) -> &Arc<SchedulerStats> { &self.stats }
    pub fn is_finished(&self) -> bool {
        self.join.lock().unwrap_or_else(|p| p.into_inner()).as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the loop to exit (after shutdown). Later calls return at once.
    pub async fn join(&self) {
        let handle = self.join.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("scheduler loop ended abnormally: {}", e);
            }
        }
    }
}
