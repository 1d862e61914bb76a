use thiserror::Error;

/// Type-erased error used at plugin boundaries, where the concrete error type
/// belongs to code the host was not compiled against.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid version '{input}': {reason}")]
    InvalidVersion { input: String, reason: String },

    #[error("Invalid worker id '{input}': {reason}")]
    InvalidWorkerId { input: String, reason: String },

    #[error("No service registered for {capability}")]
    ServiceNotRegistered { capability: String },

    #[error("Service registry is sealed; cannot register {capability}")]
    RegistrySealed { capability: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Short error code string used in structured log fields.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Config(_) => "CONFIG_ERROR",
            CoreError::InvalidVersion { .. } => "INVALID_VERSION",
            CoreError::InvalidWorkerId { .. } => "INVALID_WORKER_ID",
            CoreError::ServiceNotRegistered { .. } => "SERVICE_NOT_REGISTERED",
            CoreError::RegistrySealed { .. } => "REGISTRY_SEALED",
            CoreError::Serialization(_) => "SERIALIZATION_ERROR",
            CoreError::Io(_) => "IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
