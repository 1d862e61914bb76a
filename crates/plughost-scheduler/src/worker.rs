use async_trait::async_trait;
use plughost_core::BoxError;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// A unit of scheduled work.
///
/// `execute` is called once per due instant, never concurrently with itself.
/// Long-running work should watch `cancel` and return
/// [`WorkerError::Cancelled`] when it fires.
#[async_trait]
pub trait Worker: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, cancel: CancellationToken) -> Result<(), WorkerError>;
}

#[derive(Debug, Error)]
pub enum WorkerError {
    /// The worker stopped because cancellation was requested. Not a failure.
    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Failed(#[source] BoxError),
}

impl WorkerError {
    pub fn failed(err: impl Into<BoxError>) -> Self {
        WorkerError::Failed(err.into())
    }
}
