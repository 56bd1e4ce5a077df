use std::future::Future;
use std::time::Duration;

use eyre::{Context, Result};
use tokio::task::{JoinError, JoinHandle};
use tokio::{select, spawn};
use tracing::{debug, error, span, warn, Instrument, Level};

use crate::shutdown::Shutdown;

const SLOW_SHUTDOWN_WARNING: Duration = Duration::from_secs(3);

#[derive(Debug)]
pub enum ServiceExit {
    GracefulShutdown,
    EarlyStop,
    Panic(JoinError),
}

/// Run a long-lived task tied to the process lifetime.
///
/// A task that returns before shutdown, or panics, shuts the process down.
/// Shutdown does not complete until the task has returned.
pub fn spawn_service(
    shutdown: &Shutdown,
    name: impl Into<String>,
    future: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<ServiceExit>> {
    let name = name.into();

    let supervised = {
        let shutdown = shutdown.clone();
        async move {
            debug!("Service starting");
            let mut task = spawn(future);

            let joined = select! {
                joined = &mut task => joined,
                _ = async {
                    shutdown.wait_shutdown_triggered().await;
                    tokio::time::sleep(SLOW_SHUTDOWN_WARNING).await;
                } => {
                    warn!("Service shutdown is taking some time");
                    task.await
                }
            };

            let exit = match joined {
                Ok(()) if shutdown.is_shutdown_triggered() => ServiceExit::GracefulShutdown,
                Ok(()) => ServiceExit::EarlyStop,
                Err(err) => ServiceExit::Panic(err),
            };

            match &exit {
                ServiceExit::GracefulShutdown => debug!("Service gracefully shutdown"),
                ServiceExit::EarlyStop => {
                    error!("Service stopped early");
                    shutdown.trigger_shutdown();
                }
                ServiceExit::Panic(err) => {
                    error!(%err, "Service panicked");
                    shutdown.trigger_shutdown();
                }
            }

            exit
        }
        .instrument(span!(Level::ERROR, "service", "{}", name))
    };

    let delayed = shutdown.wrap_delay_shutdown(supervised).context(name)?;
    Ok(spawn(delayed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn graceful_shutdown_on_shutdown_request() {
        let shutdown = Shutdown::new();
        let handle = spawn_service(&shutdown, "test", {
            let shutdown = shutdown.clone();
            async move {
                shutdown.wait_shutdown_triggered().await;
                tokio::time::sleep(Duration::from_micros(500)).await;
            }
        })
        .unwrap();

        shutdown.trigger_shutdown();

        assert_matches!(handle.await, Ok(ServiceExit::GracefulShutdown));
    }

    #[tokio::test]
    async fn should_shut_down_others_on_early_stop() {
        let shutdown = Shutdown::new();
        let handle = spawn_service(&shutdown, "watcher", async move {
            tokio::time::sleep(Duration::from_micros(500)).await;
        })
        .unwrap();

        let other_handle = spawn_service(&shutdown, "server", {
            let shutdown = shutdown.clone();
            async move {
                shutdown.wait_shutdown_triggered().await;
            }
        })
        .unwrap();

        assert_matches!(handle.await, Ok(ServiceExit::EarlyStop));
        assert!(shutdown.is_shutdown_triggered());
        assert_matches!(other_handle.await, Ok(ServiceExit::GracefulShutdown));
    }

    #[tokio::test]
    async fn should_capture_panic() {
        let shutdown = Shutdown::new();
        let handle = spawn_service(&shutdown, "test", async move {
            tokio::time::sleep(Duration::from_micros(500)).await;
            panic!();
        })
        .unwrap();

        assert_matches!(handle.await, Ok(ServiceExit::Panic(_)));
        shutdown.wait_shutdown_complete().await;
    }
}
