//! Signal handling and cooperative cancellation for the background loops.
//!
//! Every long-lived task receives a clone of a [`ShutdownToken`] and selects
//! on [`ShutdownToken::cancelled`] at each suspension point. SIGINT/SIGTERM
//! are wired to the token by [`ShutdownGuard`].

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// A token that can be shared across tasks to request and observe shutdown.
#[derive(Clone)]
pub struct ShutdownToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    /// Check if shutdown has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Request cancellation; every clone observes it.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Resolve once cancellation has been requested.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // the sender lives in self, so wait_for only errors if it was dropped
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Listens for SIGINT and SIGTERM and cancels the given token.
///
/// If signal handlers cannot be registered (e.g., in restricted environments),
/// the guard is still created but signal handling will be disabled.
pub struct ShutdownGuard {
    handle: tokio::task::JoinHandle<()>,
}

impl ShutdownGuard {
    pub fn new(token: ShutdownToken) -> Self {
        let handle = tokio::spawn(async move {
            if let Some(name) = wait_for_signal().await {
                info!("Received {}, initiating graceful shutdown...", name);
                token.cancel();
            }
        });
        Self { handle }
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> Option<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let sigint = signal(SignalKind::interrupt())
        .map_err(|e| warn!("Failed to register SIGINT handler: {}", e))
        .ok();
    let sigterm = signal(SignalKind::terminate())
        .map_err(|e| warn!("Failed to register SIGTERM handler: {}", e))
        .ok();

    match (sigint, sigterm) {
        (Some(mut int), Some(mut term)) => {
            tokio::select! {
                _ = int.recv() => Some("SIGINT"),
                _ = term.recv() => Some("SIGTERM"),
            }
        }
        (Some(mut int), None) => int.recv().await.map(|_| "SIGINT"),
        (None, Some(mut term)) => term.recv().await.map(|_| "SIGTERM"),
        (None, None) => {
            warn!("No signal handlers registered - graceful shutdown disabled");
            None
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Option<&'static str> {
    match tokio::signal::ctrl_c().await {
        Ok(()) => Some("Ctrl-C"),
        Err(e) => {
            warn!("Failed to register Ctrl-C handler: {}", e);
            None
        }
    }
}
