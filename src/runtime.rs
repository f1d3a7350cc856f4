//! Runtime - Graceful shutdown and signal handling
//!
//! One [`Shutdown`] per node: the scheduler subscribes to it, `Node::close`
//! and the signal handlers trigger it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// One-shot stop signal. Clones share the same state.
#[derive(Clone)]
pub struct Shutdown {
    sender: broadcast::Sender<()>,
    fired: Arc<AtomicBool>,
}

impl Default for Shutdown {
    fn default() -> Self { Self::new() }
}

impl Shutdown {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self { sender, fired: Arc::new(AtomicBool::new(false)) }
    }

    /// Receivers created after the trigger never see it; use [`Shutdown::wait`] for late listeners.
    pub fn subscribe(&self) -> broadcast::Receiver<()> { self.sender.subscribe() }

    /// Fire the signal. Returns false if it had already fired.
    pub fn trigger(&self) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        let receivers = self.sender.send(()).unwrap_or(0);
        tracing::debug!("shutdown sent to {} receiver(s)", receivers);
        true
    }

    pub fn is_triggered(&self) -> bool { self.fired.load(Ordering::SeqCst) }

    /// Resolve once the signal has fired, including before this call.
    pub async fn wait(&self) {
        let mut rx = self.subscribe();
        if self.is_triggered() {
            return;
        }
        let _ = rx.recv().await;
    }
}

/// Install signal handlers and return shutdown handle
pub fn install_signal_handlers() -> Shutdown {
    let shutdown = Shutdown::new();
    let handle = shutdown.clone();

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(mut sigterm), Ok(mut sigint)) => {
                    tokio::select! {
                        _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                        _ = sigint.recv() => tracing::info!("Received SIGINT"),
                    }
                }
                _ => wait_ctrl_c().await,
            }
        }

        #[cfg(not(unix))]
        wait_ctrl_c().await;

        handle.trigger();
    });

    shutdown
}

async fn wait_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C"),
        Err(e) => {
            tracing::error!("Signal handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
