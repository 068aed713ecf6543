use log::warn;
use std::future::Future;
use std::time::Duration;

use crate::error::ExtractionError;

/// Runs `work` on its own task and waits at most `limit` for it.
///
/// On timeout the task is detached, not aborted: whatever it was doing keeps
/// running in the background and its result is dropped.
pub async fn run_with_timeout<F, T>(
    operation: &'static str,
    limit: Duration,
    work: F
) -> Result<T, ExtractionError>
    where F: Future<Output = Result<T, ExtractionError>> + Send + 'static, T: Send + 'static
{
    let handle = tokio::spawn(work);
    match tokio::time::timeout(limit, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(ExtractionError::Worker(join_err.to_string())),
        Err(_) => {
            warn!("{} exceeded {:?}, abandoning worker", operation, limit);
            Err(ExtractionError::TimedOut { operation, after: limit })
        }
    }
}
