use std::{future::Future, time::Duration};

use domain_upload::{
    exception::{UploadException, UploadResult},
    model::vo::SessionHandle,
};

/// Timeout and bounded retries of gateway requests.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub limit: u32,
    /// Wait before attempt n+1 is `backoff * n` plus jitter.
    pub backoff: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            limit: 3,
            backoff: Duration::from_millis(500),
            timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Send `request` until it succeeds, fails for good, or the attempts run out.
    pub async fn run<T, F, Fut>(
        &self,
        handle: &SessionHandle,
        operation: &str,
        mut request: F,
    ) -> UploadResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = UploadResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match guarded(handle, operation, self.timeout, request()).await {
                Err(e) if e.is_retryable() && attempt < self.limit => {
                    tracing::warn!(key = %handle.key, operation, attempt, "Retrying after: {e}");
                    back_off(handle, self.backoff, attempt).await?;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

/// Await `request` unless the attempt gets cancelled or `timeout` passes first.
pub(crate) async fn guarded<T>(
    handle: &SessionHandle,
    operation: &str,
    timeout: Duration,
    request: impl Future<Output = UploadResult<T>>,
) -> UploadResult<T> {
    tokio::select! {
        biased;
        _ = handle.cancel.cancelled() => Err(cancelled(handle)),
        result = tokio::time::timeout(timeout, request) => result.unwrap_or_else(|_| {
            Err(UploadException::Timeout {
                key: handle.key.to_owned(),
                operation: operation.to_owned(),
            })
        }),
    }
}

/// Sleep before the next attempt, waking up early on cancellation.
pub(crate) async fn back_off(
    handle: &SessionHandle,
    base: Duration,
    attempt: u32,
) -> UploadResult<()> {
    let delay = base * attempt + jitter(base);
    tokio::select! {
        _ = handle.cancel.cancelled() => Err(cancelled(handle)),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

pub(crate) fn cancelled(handle: &SessionHandle) -> UploadException {
    UploadException::Cancelled {
        key: handle.key.to_owned(),
    }
}

/// Up to a quarter of `base`, so parallel parts don't retry in lockstep.
fn jitter(base: Duration) -> Duration {
    let quarter = base.as_millis() as u64 / 4;
    if quarter == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::random::<u64>() % (quarter + 1))
}
