use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::sync::Arc;

use plughost_core::{ModuleName, ModuleVersion};
use tracing::debug;

use crate::catalog::{Constructor, TypeCatalog};
use crate::error::{ModuleError, Result};
use crate::manifest::ModuleManifest;

/// A module after loading: its identity plus the table of types it exports.
///
/// Immutable once built. Every load produces its own export table, so two
/// modules never share entries even when they export the same names.
pub struct LoadedModule {
    name: ModuleName,
    version: Option<ModuleVersion>,
    origin: String,
    description: Option<String>,
    exports: HashMap<String, Constructor>,
}

impl LoadedModule {
    /// A module compiled into the host that exports the whole catalog.
    pub fn builtin(
        name: impl Into<ModuleName>,
        version: Option<ModuleVersion>,
        catalog: &TypeCatalog,
    ) -> Self {
        let exports = catalog
            .type_names()
            .into_iter()
            .filter_map(|type_name| {
                catalog
                    .get(type_name)
                    .map(|ctor| (type_name.to_string(), ctor.clone()))
            })
            .collect();
        Self {
            name: name.into(),
            version,
            origin: "builtin".to_string(),
            description: None,
            exports,
        }
    }

    pub fn name(&self) -> &ModuleName {
        &self.name
    }

    pub fn version(&self) -> Option<&ModuleVersion> {
        self.version.as_ref()
    }

    /// Store the module was loaded from.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn export(&self, type_name: &str) -> Option<&Constructor> {
        self.exports.get(type_name)
    }

    pub fn exported_types(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.exports.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModule")
            .field("name", &self.name.as_str())
            .field("version", &self.version)
            .field("origin", &self.origin)
            .field("exports", &self.exported_types())
            .finish()
    }
}

/// Turns module bytes into a [`LoadedModule`].
pub trait ModuleLoader: Send + Sync {
    fn load(&self, name: &ModuleName, origin: &str, reader: &mut dyn Read) -> Result<LoadedModule>;
}

/// Loads `<name>.module.toml` manifests and links their exports against a
/// [`TypeCatalog`].
#[derive(Debug, Clone)]
pub struct ManifestLoader {
    catalog: Arc<TypeCatalog>,
}

impl ManifestLoader {
    pub fn new(catalog: Arc<TypeCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &TypeCatalog {
        &self.catalog
    }
}

impl ModuleLoader for ManifestLoader {
    fn load(&self, name: &ModuleName, origin: &str, reader: &mut dyn Read) -> Result<LoadedModule> {
        let failed = |reason: String| ModuleError::ModuleLoadFailed {
            name: name.to_string(),
            reason,
        };

        let mut text = String::new();
        reader
            .read_to_string(&mut text)
            .map_err(|e| failed(format!("read from {origin}: {e}")))?;
        let manifest = ModuleManifest::parse(&text).map_err(|e| failed(e.to_string()))?;

        if ModuleName::new(manifest.name.as_str()) != *name {
            return Err(failed(format!(
                "manifest declares module '{}'",
                manifest.name
            )));
        }
        if manifest.exports.is_empty() {
            return Err(failed("manifest exports no types".to_string()));
        }

        let mut exports = HashMap::with_capacity(manifest.exports.len());
        for type_name in &manifest.exports {
            let ctor = self.catalog.get(type_name).ok_or_else(|| {
                failed(format!("export '{type_name}' is not linked into this host"))
            })?;
            exports.insert(type_name.clone(), ctor.clone());
        }

        debug!(module = %name, origin, exports = exports.len(), "module manifest linked");

        Ok(LoadedModule {
            name: ModuleName::new(manifest.name),
            version: manifest.version,
            origin: origin.to_string(),
            description: manifest.description,
            exports,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Marker: Send + Sync {}
    struct Unit;
    impl Marker for Unit {}

    fn loader() -> ManifestLoader {
        let mut catalog = TypeCatalog::new();
        catalog
            .register::<dyn Marker, _>("t::Unit", |_| Ok(Arc::new(Unit)))
            .unwrap();
        catalog
            .register::<dyn Marker, _>("t::Other", |_| Ok(Arc::new(Unit)))
            .unwrap();
        ManifestLoader::new(Arc::new(catalog))
    }

    fn load(text: &str) -> Result<LoadedModule> {
        loader().load(&ModuleName::new("alpha"), "test", &mut text.as_bytes())
    }

    #[test]
    fn loads_only_declared_exports() {
        let module = load(
            r#"
            name = "Alpha"
            version = "2.0"
            description = "first"
            exports = ["t::Unit"]
            "#,
        )
        .unwrap();
        assert_eq!(module.name().as_str(), "Alpha");
        assert_eq!(module.version(), Some(&ModuleVersion::new(2, 0, 0)));
        assert_eq!(module.origin(), "test");
        assert_eq!(module.description(), Some("first"));
        assert_eq!(module.exported_types(), vec!["t::Unit"]);
        assert!(module.export("t::Other").is_none());
    }

    #[test]
    fn unparseable_manifest_fails() {
        let err = load("name = ").unwrap_err();
        assert_eq!(err.code(), "MODULE_LOAD_FAILED");
    }

    #[test]
    fn unlinked_export_fails() {
        let err = load("name = \"alpha\"\nexports = [\"t::Missing\"]").unwrap_err();
        assert!(err.to_string().contains("t::Missing"));
    }

    #[test]
    fn mismatched_name_fails() {
        let err = load("name = \"beta\"\nexports = [\"t::Unit\"]").unwrap_err();
        assert!(matches!(err, ModuleError::ModuleLoadFailed { .. }));
    }

    #[test]
    fn empty_exports_fail() {
        assert!(load("name = \"alpha\"").is_err());
    }

    #[test]
    fn builtin_exports_whole_catalog() {
        let module = LoadedModule::builtin("host", None, loader().catalog());
        assert_eq!(module.exported_types(), vec!["t::Other", "t::Unit"]);
        assert_eq!(module.origin(), "builtin");
    }
}
