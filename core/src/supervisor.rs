//! Restart a long-running task after recoverable failures.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::{OratorError, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RestartPolicy {
    pub max_restarts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_restarts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RestartPolicy {
    /// Delay before restart number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Run `task` until it returns `Ok`, a fatal error, or the restart budget
    /// is spent. Returns the last outcome.
    pub async fn supervise<F, Fut>(&self, name: &str, mut task: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut restarts = 0u32;
        loop {
            match task().await {
                Ok(()) => {
                    info!(target: "supervisor", task = %name, "Task finished");
                    return Ok(());
                }
                Err(e) if e.is_fatal() => {
                    error!(target: "supervisor", task = %name, error = %e, "Fatal error; not restarting");
                    return Err(e);
                }
                Err(e) if restarts >= self.max_restarts => {
                    error!(target: "supervisor", task = %name, restarts, error = %e, "Restart budget exhausted");
                    return Err(e);
                }
                Err(e) => {
                    restarts += 1;
                    let delay = self.backoff(restarts);
                    warn!(
                        target: "supervisor",
                        task = %name,
                        error = %e,
                        "Task failed; restarting ({}/{}) in {}ms",
                        restarts,
                        self.max_restarts,
                        delay.as_millis()
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Convenience for tasks whose errors are plain strings.
pub fn recoverable(reason: impl Into<String>) -> OratorError {
    OratorError::Io(std::io::Error::new(std::io::ErrorKind::Other, reason.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast(max_restarts: u32) -> RestartPolicy {
        RestartPolicy {
            max_restarts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = RestartPolicy {
            max_restarts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
        };
        assert_eq!(p.backoff(1), Duration::from_millis(100));
        assert_eq!(p.backoff(2), Duration::from_millis(200));
        assert_eq!(p.backoff(3), Duration::from_millis(350));
        assert_eq!(p.backoff(40), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn restarts_until_success() {
        let runs = Arc::new(AtomicU32::new(0));
        let r = runs.clone();
        let out = fast(5)
            .supervise("flaky", move || {
                let r = r.clone();
                async move {
                    if r.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(recoverable("not yet"))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;
        assert!(out.is_ok());
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_stop_immediately() {
        let runs = Arc::new(AtomicU32::new(0));
        let r = runs.clone();
        let out = fast(5)
            .supervise("doomed", move || {
                r.fetch_add(1, Ordering::SeqCst);
                async { Err(OratorError::Fatal("bad token".into())) }
            })
            .await;
        assert!(matches!(out, Err(OratorError::Fatal(_))));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_budget() {
        let runs = Arc::new(AtomicU32::new(0));
        let r = runs.clone();
        let out = fast(2)
            .supervise("broken", move || {
                r.fetch_add(1, Ordering::SeqCst);
                async { Err(recoverable("still broken")) }
            })
            .await;
        assert!(out.is_err());
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }
}
