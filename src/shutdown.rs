use std::future::Future;

use async_shutdown::{
    ShutdownAlreadyCompleted, ShutdownComplete, ShutdownManager, ShutdownSignal,
    WrapDelayShutdown,
};
use tokio::signal;
use tracing::{error, info};

/// Process-wide stop switch. Cloning shares the same switch.
#[derive(Clone)]
pub struct Shutdown {
    manager: ShutdownManager<()>,
}

impl Shutdown {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Shutdown {
        Self::new_with_signal(shutdown_signal())
    }

    pub fn new_with_signal<F>(signal: F) -> Shutdown
    where
        F: Future + Send + 'static,
    {
        let manager = ShutdownManager::new();

        tokio::spawn({
            let manager = manager.clone();
            async move {
                signal.await;
                info!("Shutdown start");
                _ = manager.trigger_shutdown(());
            }
        });

        Shutdown { manager }
    }

    /// Keep shutdown from completing until `future` resolves.
    pub fn wrap_delay_shutdown<F: Future>(
        &self,
        future: F,
    ) -> Result<WrapDelayShutdown<(), F>, ShutdownAlreadyCompleted<()>> {
        self.manager.wrap_delay_shutdown(future)
    }

    pub fn trigger_shutdown(&self) {
        _ = self.manager.trigger_shutdown(());
    }

    pub fn is_shutdown_triggered(&self) -> bool {
        self.manager.is_shutdown_triggered()
    }

    pub fn wait_shutdown_triggered(&self) -> ShutdownSignal<()> {
        self.manager.wait_shutdown_triggered()
    }

    pub fn wait_shutdown_complete(&self) -> ShutdownComplete<()> {
        self.manager.wait_shutdown_complete()
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(%err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(not(unix))]
    ctrl_c.await;

    #[cfg(unix)]
    {
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut terminate) => {
                    terminate.recv().await;
                }
                Err(err) => {
                    error!(%err, "failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        };
    }
}
