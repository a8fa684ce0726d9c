//! Timeout helpers.

use std::future::Future;
use std::time::Duration;

use futures::{Stream, StreamExt};

use crate::error::ThreadRunError;

/// Wrap a future with an optional timeout. `None` waits indefinitely.
pub async fn with_timeout<T>(
    duration: Option<Duration>,
    future: impl Future<Output = Result<T, ThreadRunError>>,
) -> Result<T, ThreadRunError> {
    let Some(duration) = duration else {
        return future.await;
    };
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(ThreadRunError::Timeout(duration.as_millis() as u64)),
    }
}

/// Next stream item, failing if none arrives within `idle`.
pub async fn next_within<S>(
    stream: &mut S,
    idle: Option<Duration>,
) -> Result<Option<S::Item>, ThreadRunError>
where
    S: Stream + Unpin + ?Sized,
{
    with_timeout(idle, async { Ok(stream.next().await) }).await
}
