//! Graceful shutdown handling
//!
//! Long-running commands (`run`, `retry`, `create --run`, `recover`,
//! `sweep`) install the handlers and stop on SIGINT/SIGTERM. A job
//! interrupted mid-stage is simply left at its last checkpoint and picked up
//! by the next run or sweep. Other commands keep the default signal
//! behavior.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{error, info, warn};

/// Shutdown coordinator for graceful termination
#[derive(Clone)]
pub struct ShutdownCoordinator {
    shutdown_requested: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("shutdown_requested", &self.shutdown_requested.load(Ordering::SeqCst))
            .finish()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            shutdown_requested: Arc::new(AtomicBool::new(false)),
            shutdown_notify: Arc::new(Notify::new()),
        }
    }

    /// Request shutdown; later calls are no-ops
    pub fn request_shutdown(&self) {
        if !self.shutdown_requested.swap(true, Ordering::SeqCst) {
            info!("Shutdown requested");
            self.shutdown_notify.notify_waiters();
        }
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    /// Resolve once shutdown has been requested, including before the call
    pub async fn wait_for_shutdown(&self) {
        let notified = self.shutdown_notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_shutdown_requested() {
            return;
        }
        notified.await;
    }

    /// Spawn a task that requests shutdown on SIGINT or SIGTERM
    pub fn install_signal_handlers(&self) -> tokio::task::JoinHandle<()> {
        let coordinator = self.clone();

        tokio::spawn(async move {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};

                let (mut sigint, mut sigterm) =
                    match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
                        (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
                        (Err(e), _) | (_, Err(e)) => {
                            error!(error = %e, "Failed to install signal handlers");
                            return;
                        }
                    };

                tokio::select! {
                    _ = sigint.recv() => {
                        warn!("Received SIGINT, initiating graceful shutdown...");
                    }
                    _ = sigterm.recv() => {
                        warn!("Received SIGTERM, initiating graceful shutdown...");
                    }
                }
                coordinator.request_shutdown();
            }

            #[cfg(not(unix))]
            {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!(error = %e, "Failed to install Ctrl+C handler");
                    return;
                }
                warn!("Received Ctrl+C, initiating graceful shutdown...");
                coordinator.request_shutdown();
            }
        })
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
