use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

/// Extension trait bounding a future with a per-attempt deadline
pub trait TimeoutExt<T>: Sized {
    /// Run the future, failing with `Error::Timeout` when the deadline passes.
    fn with_deadline(
        self,
        service: &str,
        duration: Duration,
    ) -> impl Future<Output = Result<T>> + Send;
}

impl<F, T> TimeoutExt<T> for F
where
    F: Future<Output = Result<T>> + Send,
    T: Send,
{
    async fn with_deadline(self, service: &str, duration: Duration) -> Result<T> {
        match timeout(duration, self).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                service: service.to_string(),
                timeout: duration,
            }),
        }
    }
}
