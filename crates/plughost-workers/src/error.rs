use plughost_core::BoxError;
use plughost_modules::ModuleError;
use plughost_scheduler::SchedulerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A worker entry is missing a required field or has an invalid value.
    #[error("Worker '{worker}' is misconfigured: {reason}")]
    ConfigurationInvalid { worker: String, reason: String },

    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error(transparent)]
    Schedule(#[from] SchedulerError),

    #[error("Service injector '{type_name}' failed: {source}")]
    ServiceInjection {
        type_name: String,
        #[source]
        source: BoxError,
    },

    #[error("Worker factory '{type_name}' failed: {source}")]
    WorkerCreation {
        type_name: String,
        #[source]
        source: BoxError,
    },

    /// The worker host task panicked or was aborted.
    #[error("Worker task ended abnormally: {0}")]
    WorkerTask(#[from] tokio::task::JoinError),
}

impl OrchestratorError {
    pub fn code(&self) -> &'static str {
        match self {
            OrchestratorError::ConfigurationInvalid { .. } => "CONFIGURATION_INVALID",
            OrchestratorError::Module(e) => e.code(),
            OrchestratorError::Schedule(e) => e.code(),
            OrchestratorError::ServiceInjection { .. } => "SERVICE_INJECTION_FAILED",
            OrchestratorError::WorkerCreation { .. } => "WORKER_CREATION_FAILED",
            OrchestratorError::WorkerTask(_) => "WORKER_TASK_FAILED",
        }
    }

    /// Errors an operator fixes by editing configuration or deploying modules.
    pub fn is_configuration_error(&self) -> bool {
        match self {
            OrchestratorError::ConfigurationInvalid { .. } => true,
            OrchestratorError::Schedule(SchedulerError::InvalidSchedule(_)) => true,
            OrchestratorError::Module(e) => matches!(
                e,
                ModuleError::ModuleNotFound { .. }
                    | ModuleError::VersionRequired { .. }
                    | ModuleError::VersionConflict { .. }
                    | ModuleError::TypeNotFound { .. }
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
