use plughost_core::BoxError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModuleError {
    /// No configured store holds a module with this name.
    #[error("Module '{name}' not found in any module root")]
    ModuleNotFound { name: String },

    /// The module was found but its manifest could not be read, parsed or linked.
    #[error("Module '{name}' failed to load: {reason}")]
    ModuleLoadFailed { name: String, reason: String },

    /// A versioned module is already loaded and the request named no version.
    #[error("Module '{name}' is loaded at version {loaded}; a version must be requested")]
    VersionRequired { name: String, loaded: String },

    /// A newer copy is already loaded; the lower version cannot be loaded alongside it.
    #[error("Module '{name}' is loaded at version {loaded}, which is newer than requested {requested}")]
    VersionConflict {
        name: String,
        loaded: String,
        requested: String,
    },

    #[error("Type '{type_name}' is not exported by module '{module}'")]
    TypeNotFound { module: String, type_name: String },

    #[error("Failed to instantiate '{type_name}' as {capability}: {source}")]
    InstantiationFailed {
        type_name: String,
        capability: &'static str,
        #[source]
        source: BoxError,
    },

    /// Two constructors were registered under the same catalog key.
    #[error("Type '{type_name}' is already registered in the catalog")]
    DuplicateType { type_name: String },
}

impl ModuleError {
    /// Short error code string used in structured log fields.
    pub fn code(&self) -> &'static str {
        match self {
            ModuleError::ModuleNotFound { .. } => "MODULE_NOT_FOUND",
            ModuleError::ModuleLoadFailed { .. } => "MODULE_LOAD_FAILED",
            ModuleError::VersionRequired { .. } => "VERSION_REQUIRED",
            ModuleError::VersionConflict { .. } => "VERSION_CONFLICT",
            ModuleError::TypeNotFound { .. } => "TYPE_NOT_FOUND",
            ModuleError::InstantiationFailed { .. } => "INSTANTIATION_FAILED",
            ModuleError::DuplicateType { .. } => "DUPLICATE_TYPE",
        }
    }
}

pub type Result<T> = std::result::Result<T, ModuleError>;
