use std::future::Future;

use anyhow::{Error, Result};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// Runs named tasks until all have finished. Ctrl-C or the first failing task
/// cancels the shared token so the others can wind down.
pub struct Supervisor {
    shutdown: CancellationToken,
    tasks: JoinSet<(String, Result<()>)>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            shutdown: CancellationToken::new(),
            tasks: JoinSet::new(),
        }
    }

    pub fn spawn<F, Fut>(&mut self, name: &'static str, factory: F)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let shutdown = self.shutdown.child_token();
        self.tasks.spawn(async move {
            let result = factory(shutdown).await;
            (name.to_string(), result)
        });
    }

    pub async fn run(mut self) -> Result<()> {
        let mut first_err: Option<Error> = None;

        while !self.tasks.is_empty() {
            tokio::select! {
                Some(outcome) = self.tasks.join_next() => {
                    self.handle_task_outcome(&mut first_err, outcome);
                }
                _ = tokio::signal::ctrl_c(), if !self.shutdown.is_cancelled() => {
                    tracing::info!("received ctrl-c, shutting down");
                    self.shutdown.cancel();
                }
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn handle_task_outcome(
        &self,
        first_err: &mut Option<Error>,
        outcome: std::result::Result<(String, Result<()>), JoinError>,
    ) {
        let err = match outcome {
            Ok((name, Ok(()))) => {
                tracing::info!(task = %name, "task exited gracefully");
                return;
            }
            Ok((name, Err(err))) => {
                tracing::error!(task = %name, error = %err, "task exited with error");
                err
            }
            Err(join_err) => {
                tracing::error!(error = ?join_err, "task panicked");
                join_err.into()
            }
        };

        if first_err.is_none() {
            *first_err = Some(err);
        }
        if !self.shutdown.is_cancelled() {
            tracing::info!("supervisor shutting down");
            self.shutdown.cancel();
        }
    }
}
