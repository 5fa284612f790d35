use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

type AppProcess = Box<
    dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
        + Send,
>;

type Closer = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send>;

/// Supervises the service's long-lived tasks.
///
/// Processes run concurrently until one fails or a shutdown signal arrives;
/// everything is then cancelled through a shared token and the closers run
/// under a timeout, regardless of how the processes ended.
pub struct Runner {
    processes: Vec<AppProcess>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    token: CancellationToken,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    pub fn new() -> Self {
        Self {
            processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            token: CancellationToken::new(),
        }
    }

    pub fn with_process<F, Fut>(mut self, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.processes.push(Box::new(|token| Box::pin(process(token))));
        self
    }

    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// Run until all processes finish or shutdown is requested. Returns the
    /// first process error, after cleanup has run.
    pub async fn run(self) -> anyhow::Result<()> {
        let token = self.token;
        let mut tasks = JoinSet::new();

        for process in self.processes {
            let process_token = token.clone();
            tasks.spawn(async move { process(process_token).await });
        }

        spawn_signal_handlers(token.clone());

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => debug!("app process completed"),
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        error!(error = %e, "app process failed");
                        first_error = Some(e);
                    }
                    token.cancel();
                }
                Err(e) => {
                    error!(error = %e, "app process panicked");
                    token.cancel();
                }
            }
        }

        if !self.closers.is_empty() {
            info!(timeout = ?self.closer_timeout, "running closers");
            if tokio::time::timeout(self.closer_timeout, run_closers(self.closers))
                .await
                .is_err()
            {
                error!(timeout = ?self.closer_timeout, "closers timed out");
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn spawn_signal_handlers(token: CancellationToken) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received shutdown signal");
                ctrl_c_token.cancel();
            }
            Err(e) => error!(error = %e, "error setting up signal handler"),
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("received SIGTERM");
                token.cancel();
            }
            Err(e) => error!(error = %e, "error setting up SIGTERM handler"),
        }
    });
}

async fn run_closers(closers: Vec<Closer>) {
    let mut tasks = JoinSet::new();
    for closer in closers {
        tasks.spawn(async move { closer().await });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => debug!("closer completed"),
            Ok(Err(e)) => error!(error = %e, "closer failed"),
            Err(e) => error!(error = %e, "closer panicked"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_processes_stop_on_first_failure_and_closers_run() {
        let closed = Arc::new(AtomicBool::new(false));
        let closed_clone = Arc::clone(&closed);

        let result = Runner::new()
            .with_process(|token| async move {
                token.cancelled().await;
                Ok(())
            })
            .with_process(|_token| async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Err(anyhow::anyhow!("boom"))
            })
            .with_closer(move || async move {
                closed_clone.store(true, Ordering::SeqCst);
                Ok(())
            })
            .with_closer_timeout(Duration::from_secs(1))
            .run()
            .await;

        assert!(result.is_err());
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_clean_completion_returns_ok() {
        let result = Runner::new()
            .with_process(|_token| async move { Ok(()) })
            .run()
            .await;
        assert!(result.is_ok());
    }
}
