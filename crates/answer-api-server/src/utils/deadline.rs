use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Error, Debug, PartialEq)]
pub enum DeadlineError {
    #[error("{0} timed out")]
    Elapsed(&'static str),

    #[error("{0} task failed: {1}")]
    TaskFailed(&'static str, String),
}

/// Race `fut` against a timer.
///
/// The call runs as its own task; when the timer wins the task is detached,
/// not aborted, so the real call may still finish later and its result is
/// dropped.
pub async fn race_with_timeout<F, T>(
    op: &'static str,
    limit: Duration,
    fut: F,
) -> Result<T, DeadlineError>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let call = tokio::spawn(fut);

    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(join_err)) => {
            error!("{} task failed: {}", op, join_err);
            Err(DeadlineError::TaskFailed(op, join_err.to_string()))
        }
        Err(_) => {
            debug!("{} lost the race against {:?}, detaching call", op, limit);
            Err(DeadlineError::Elapsed(op))
        }
    }
}
