// Package shutdown provides graceful shutdown functionality.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::signal;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
#[error("graceful shutdown timeout exceeded")]
pub struct TimeoutError;

/// Graceful shutdown handler.
///
/// Waits for SIGINT, SIGTERM or cancellation of the shared token, then
/// gives every registered closer a bounded amount of time to finish.
#[derive(Clone)]
pub struct GracefulShutdown {
    shutdown_token: CancellationToken,
    timeout: Duration,
    closers: TaskTracker,
}

impl GracefulShutdown {
    pub fn new(shutdown_token: CancellationToken, timeout: Duration) -> Self {
        Self {
            shutdown_token,
            timeout,
            closers: TaskTracker::new(),
        }
    }

    /// Registers a closer that runs once shutdown starts.
    pub fn on_shutdown<F>(&self, close: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.shutdown_token.clone();
        self.closers.spawn(async move {
            token.cancelled().await;
            close.await;
        });
    }

    /// Waits for a shutdown signal, then for all closers to complete.
    pub async fn await_shutdown(&self) -> Result<()> {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!(component = "graceful-shutdown", event = "os_signal", signal = "SIGINT", "cancellation started");
            }
            _ = sigterm() => {
                info!(component = "graceful-shutdown", event = "os_signal", signal = "SIGTERM", "cancellation started");
            }
            _ = self.shutdown_token.cancelled() => {
                info!(component = "graceful-shutdown", event = "ctx_done", "cancellation started");
            }
        }

        self.cancel_and_await_with_timeout().await
    }

    async fn cancel_and_await_with_timeout(&self) -> Result<()> {
        self.shutdown_token.cancel();
        self.closers.close();

        match timeout(self.timeout, self.closers.wait()).await {
            Ok(()) => {
                info!(
                    component = "graceful-shutdown",
                    event = "shutdown_success",
                    "service was gracefully shut down"
                );
                Ok(())
            }
            Err(_) => {
                warn!(
                    component = "graceful-shutdown",
                    event = "shutdown_timeout",
                    timeout_secs = self.timeout.as_secs(),
                    "not all tasks were closed within timeout"
                );
                Err(TimeoutError.into())
            }
        }
    }
}

#[cfg(unix)]
async fn sigterm() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut s) => {
            s.recv().await;
        }
        Err(_) => std::future::pending::<()>().await,
    }
}

#[cfg(not(unix))]
async fn sigterm() {
    std::future::pending::<()>().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_runs_closers_on_cancel() {
        let token = CancellationToken::new();
        let gs = GracefulShutdown::new(token.clone(), Duration::from_secs(1));
        let closed = Arc::new(AtomicBool::new(false));
        let flag = closed.clone();
        gs.on_shutdown(async move {
            flag.store(true, Ordering::SeqCst);
        });

        token.cancel();
        gs.await_shutdown().await.unwrap();
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_times_out_on_stuck_closer() {
        let token = CancellationToken::new();
        let gs = GracefulShutdown::new(token.clone(), Duration::from_millis(20));
        gs.on_shutdown(async {
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        token.cancel();
        let err = gs.await_shutdown().await.unwrap_err();
        assert!(err.downcast_ref::<TimeoutError>().is_some());
    }
}
