use plughost_core::BoxError;
use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The provided schedule definition is invalid or unsupported.
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// The worker returned an error other than cancellation. Fatal for that
    /// worker's host; there is no retry.
    #[error("Worker '{worker}' failed: {source}")]
    WorkerExecutionFailed {
        worker: String,
        #[source]
        source: BoxError,
    },
}

impl SchedulerError {
    pub fn code(&self) -> &'static str {
        match self {
            SchedulerError::InvalidSchedule(_) => "INVALID_SCHEDULE",
            SchedulerError::WorkerExecutionFailed { .. } => "WORKER_EXECUTION_FAILED",
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
