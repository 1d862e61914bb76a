pub mod config;
pub mod error;
pub mod services;
pub mod types;
pub mod version;

pub use error::{BoxError, CoreError, Result};
pub use services::ServiceRegistry;
pub use types::{ModuleName, ModuleRef, WorkerId};
pub use version::ModuleVersion;
