//! Module resolution for plughost.
//!
//! A module is a `<name>.module.toml` manifest found in one of the configured
//! content roots. Its exports are linked against the [`TypeCatalog`] compiled
//! into the host, then instantiated on demand as capability trait objects.

pub mod catalog;
pub mod error;
pub mod instantiator;
pub mod loader;
pub mod manifest;
pub mod resolver;
pub mod store;

pub use catalog::{Constructor, TypeCatalog};
pub use error::{ModuleError, Result};
pub use instantiator::{ArgumentError, ConstructorArgs, TypeInstantiator};
pub use loader::{LoadedModule, ManifestLoader, ModuleLoader};
pub use manifest::ModuleManifest;
pub use resolver::ModuleResolver;
pub use store::{module_name_from_path, FsModuleStore, MemoryModuleStore, ModuleStore, MODULE_FILE_SUFFIX};
