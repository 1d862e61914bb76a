//! Module resolution with a process-wide cache and version policy.

use std::sync::Arc;

use dashmap::DashMap;
use plughost_core::{ModuleName, ModuleVersion};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::{ModuleError, Result};
use crate::loader::{LoadedModule, ModuleLoader};
use crate::store::ModuleStore;

type Slot = Arc<OnceCell<Arc<LoadedModule>>>;

/// Resolves module names to loaded modules.
///
/// Stores are searched in the order they were added; the first store that
/// has the module wins. Loaded modules are cached for the life of the
/// resolver and never replaced. Concurrent first resolutions of one name
/// share a single load.
pub struct ModuleResolver {
    stores: Vec<Arc<dyn ModuleStore>>,
    loader: Arc<dyn ModuleLoader>,
    cache: DashMap<ModuleName, Slot>,
}

impl ModuleResolver {
    pub fn new(loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            stores: Vec::new(),
            loader,
            cache: DashMap::new(),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ModuleStore>) -> Self {
        self.stores.push(store);
        self
    }

    /// Seed the cache with a module that is already in the process.
    pub fn with_preloaded(self, module: LoadedModule) -> Self {
        let name = module.name().clone();
        self.cache
            .insert(name, Arc::new(OnceCell::from(Arc::new(module))));
        self
    }

    pub fn stores(&self) -> &[Arc<dyn ModuleStore>] {
        &self.stores
    }

    /// Resolve `name`, optionally requiring at least `version`.
    pub async fn resolve(
        &self,
        name: &ModuleName,
        version: Option<&ModuleVersion>,
    ) -> Result<Arc<LoadedModule>> {
        self.resolve_from(name, version, None).await
    }

    /// Like [`resolve`](Self::resolve), but a first load of `name` searches
    /// `preferred` before the configured stores. Once cached, the module is
    /// returned whatever store it came from.
    pub async fn resolve_preferring(
        &self,
        name: &ModuleName,
        version: Option<&ModuleVersion>,
        preferred: Arc<dyn ModuleStore>,
    ) -> Result<Arc<LoadedModule>> {
        self.resolve_from(name, version, Some(preferred)).await
    }

    async fn resolve_from(
        &self,
        name: &ModuleName,
        version: Option<&ModuleVersion>,
        preferred: Option<Arc<dyn ModuleStore>>,
    ) -> Result<Arc<LoadedModule>> {
        // Clone the slot out so no map guard is held across the await.
        let slot: Slot = {
            let entry = self.cache.entry(name.clone()).or_default();
            Arc::clone(entry.value())
        };

        let mut fresh = false;
        let loaded_here = &mut fresh;
        let outcome = slot
            .get_or_try_init(|| async move {
                *loaded_here = true;
                let stores: Vec<Arc<dyn ModuleStore>> = preferred
                    .into_iter()
                    .chain(self.stores.iter().cloned())
                    .collect();
                let loader = Arc::clone(&self.loader);
                let owned = name.clone();
                // Stores read from disk; keep that off the runtime threads.
                tokio::task::spawn_blocking(move || load(&owned, &stores, loader.as_ref()))
                    .await
                    .map_err(|e| ModuleError::ModuleLoadFailed {
                        name: name.to_string(),
                        reason: format!("load task failed: {e}"),
                    })?
            })
            .await;

        let module = match outcome {
            Ok(module) => Arc::clone(module),
            Err(e) => {
                // Drop the empty slot unless another resolution still waits on it.
                self.cache
                    .remove_if(name, |_, s| s.get().is_none() && Arc::strong_count(s) == 2);
                return Err(e);
            }
        };

        if fresh {
            return Ok(module);
        }
        check_version(&module, version)?;
        debug!(module = %name, "module resolved from cache");
        Ok(module)
    }

    /// The cached module for `name`, if one has finished loading.
    pub fn cached(&self, name: &ModuleName) -> Option<Arc<LoadedModule>> {
        self.cache
            .get(name)
            .and_then(|slot| slot.value().get().cloned())
    }

    pub fn loaded_modules(&self) -> Vec<Arc<LoadedModule>> {
        let mut modules: Vec<_> = self
            .cache
            .iter()
            .filter_map(|slot| slot.value().get().cloned())
            .collect();
        modules.sort_by(|a, b| a.name().key().cmp(b.name().key()));
        modules
    }
}

/// Load `name` from the first store that has it. A failing load there does
/// not fall through to later stores.
fn load(
    name: &ModuleName,
    stores: &[Arc<dyn ModuleStore>],
    loader: &dyn ModuleLoader,
) -> Result<Arc<LoadedModule>> {
    let store = stores
        .iter()
        .find(|store| store.exists(name))
        .ok_or_else(|| {
            warn!(module = %name, stores = stores.len(), "module not found");
            ModuleError::ModuleNotFound {
                name: name.to_string(),
            }
        })?;

    let origin = store.describe();
    let mut reader = store
        .open_read(name)
        .map_err(|e| ModuleError::ModuleLoadFailed {
            name: name.to_string(),
            reason: format!("open from {origin}: {e}"),
        })?;
    let module = loader.load(name, &origin, &mut reader)?;

    info!(
        module = %module.name(),
        version = ?module.version().map(ToString::to_string),
        origin = %origin,
        "module loaded"
    );
    Ok(Arc::new(module))
}

/// Version policy for a module that was already cached.
fn check_version(module: &LoadedModule, requested: Option<&ModuleVersion>) -> Result<()> {
    let Some(loaded) = module.version() else {
        return Ok(());
    };
    match requested {
        None => Err(ModuleError::VersionRequired {
            name: module.name().to_string(),
            loaded: loaded.to_string(),
        }),
        Some(requested) if requested < loaded => Err(ModuleError::VersionConflict {
            name: module.name().to_string(),
            loaded: loaded.to_string(),
            requested: requested.to_string(),
        }),
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TypeCatalog;
    use crate::loader::ManifestLoader;
    use crate::store::MemoryModuleStore;
    use std::io::{self, Read};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    trait Marker: Send + Sync {}
    struct Unit;
    impl Marker for Unit {}

    fn loader() -> Arc<dyn ModuleLoader> {
        let mut catalog = TypeCatalog::new();
        catalog
            .register::<dyn Marker, _>("t::Unit", |_| Ok(Arc::new(Unit)))
            .unwrap();
        Arc::new(ManifestLoader::new(Arc::new(catalog)))
    }

    fn manifest(name: &str, version: Option<&str>) -> String {
        match version {
            Some(v) => format!("name = \"{name}\"\nversion = \"{v}\"\nexports = [\"t::Unit\"]"),
            None => format!("name = \"{name}\"\nexports = [\"t::Unit\"]"),
        }
    }

    fn resolver_with(store: MemoryModuleStore) -> ModuleResolver {
        ModuleResolver::new(loader()).with_store(Arc::new(store))
    }

    fn v(s: &str) -> ModuleVersion {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn equal_or_higher_request_returns_same_instance() {
        let resolver = resolver_with(
            MemoryModuleStore::new("a").with_module("alpha", manifest("alpha", Some("1.0"))),
        );
        let name = ModuleName::new("alpha");

        let first = resolver.resolve(&name, Some(&v("1.0"))).await.unwrap();
        let same = resolver.resolve(&name, Some(&v("1.0"))).await.unwrap();
        let higher = resolver.resolve(&name, Some(&v("2.0"))).await.unwrap();

        assert!(Arc::ptr_eq(&first, &same));
        assert!(Arc::ptr_eq(&first, &higher));
        assert_eq!(resolver.loaded_modules().len(), 1);
    }

    #[tokio::test]
    async fn lower_request_after_higher_load_conflicts() {
        let resolver = resolver_with(
            MemoryModuleStore::new("a").with_module("alpha", manifest("alpha", Some("2.0"))),
        );
        let name = ModuleName::new("alpha");

        resolver.resolve(&name, Some(&v("2.0"))).await.unwrap();
        let err = resolver.resolve(&name, Some(&v("1.0"))).await.unwrap_err();
        assert!(matches!(err, ModuleError::VersionConflict { .. }));
        assert_eq!(err.code(), "VERSION_CONFLICT");
    }

    #[tokio::test]
    async fn first_load_skips_version_comparison() {
        let resolver = resolver_with(
            MemoryModuleStore::new("a").with_module("alpha", manifest("alpha", Some("1.0"))),
        );
        let module = resolver
            .resolve(&ModuleName::new("alpha"), Some(&v("3.0")))
            .await
            .unwrap();
        assert_eq!(module.version(), Some(&v("1.0")));
    }

    #[tokio::test]
    async fn unversioned_request_for_versioned_module_fails_once_cached() {
        let resolver = resolver_with(
            MemoryModuleStore::new("a").with_module("alpha", manifest("alpha", Some("1.0"))),
        );
        let name = ModuleName::new("ALPHA");

        resolver.resolve(&name, None).await.unwrap();
        let err = resolver.resolve(&name, None).await.unwrap_err();
        assert!(matches!(err, ModuleError::VersionRequired { .. }));
    }

    #[tokio::test]
    async fn unversioned_module_accepts_any_request() {
        let resolver = resolver_with(
            MemoryModuleStore::new("a").with_module("alpha", manifest("alpha", None)),
        );
        let name = ModuleName::new("alpha");

        resolver.resolve(&name, Some(&v("5.0"))).await.unwrap();
        resolver.resolve(&name, None).await.unwrap();
        resolver.resolve(&name, Some(&v("0.1"))).await.unwrap();
    }

    #[tokio::test]
    async fn missing_module_is_not_found() {
        let resolver = resolver_with(MemoryModuleStore::new("empty"));
        let err = resolver
            .resolve(&ModuleName::new("ghost"), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "MODULE_NOT_FOUND");
        assert!(resolver.cached(&ModuleName::new("ghost")).is_none());
    }

    #[tokio::test]
    async fn unknown_names_leave_no_cache_entries() {
        let resolver = resolver_with(MemoryModuleStore::new("empty"));
        for name in ["ghost", "phantom", "ghost"] {
            assert!(resolver.resolve(&ModuleName::new(name), None).await.is_err());
        }
        assert!(resolver.cache.is_empty());
    }

    #[tokio::test]
    async fn preferred_store_is_searched_first() {
        let resolver = ModuleResolver::new(loader()).with_store(Arc::new(
            MemoryModuleStore::new("shared").with_module("alpha", manifest("alpha", Some("1.0"))),
        ));
        let own: Arc<dyn ModuleStore> = Arc::new(
            MemoryModuleStore::new("own").with_module("alpha", manifest("alpha", Some("1.0"))),
        );
        let name = ModuleName::new("alpha");

        let module = resolver
            .resolve_preferring(&name, Some(&v("1.0")), own)
            .await
            .unwrap();
        assert_eq!(module.origin(), "memory:own");

        // Later resolutions share the cached copy.
        let again = resolver.resolve(&name, Some(&v("1.0"))).await.unwrap();
        assert!(Arc::ptr_eq(&module, &again));
    }

    #[tokio::test]
    async fn preferred_store_without_module_falls_back_to_configured_stores() {
        let resolver = resolver_with(
            MemoryModuleStore::new("shared").with_module("alpha", manifest("alpha", None)),
        );
        let own: Arc<dyn ModuleStore> = Arc::new(MemoryModuleStore::new("own"));

        let module = resolver
            .resolve_preferring(&ModuleName::new("alpha"), None, own)
            .await
            .unwrap();
        assert_eq!(module.origin(), "memory:shared");
    }

    #[tokio::test]
    async fn failed_load_is_not_cached() {
        let store = Arc::new(MemoryModuleStore::new("a").with_module("alpha", "not toml ="));
        let resolver = ModuleResolver::new(loader()).with_store(store.clone());
        let name = ModuleName::new("alpha");

        let err = resolver.resolve(&name, None).await.unwrap_err();
        assert!(matches!(err, ModuleError::ModuleLoadFailed { .. }));
        assert!(resolver.cached(&name).is_none());

        store.insert("alpha", manifest("alpha", None));
        resolver.resolve(&name, None).await.unwrap();
        assert!(resolver.cached(&name).is_some());
    }

    #[tokio::test]
    async fn first_store_with_module_wins() {
        let resolver = ModuleResolver::new(loader())
            .with_store(Arc::new(
                MemoryModuleStore::new("first").with_module("alpha", manifest("alpha", Some("1.0"))),
            ))
            .with_store(Arc::new(
                MemoryModuleStore::new("second")
                    .with_module("alpha", manifest("alpha", Some("9.0"))),
            ));

        let module = resolver
            .resolve(&ModuleName::new("alpha"), Some(&v("1.0")))
            .await
            .unwrap();
        assert_eq!(module.origin(), "memory:first");
    }

    #[tokio::test]
    async fn broken_first_store_does_not_fall_through() {
        let resolver = ModuleResolver::new(loader())
            .with_store(Arc::new(
                MemoryModuleStore::new("first").with_module("alpha", "garbage = ["),
            ))
            .with_store(Arc::new(
                MemoryModuleStore::new("second").with_module("alpha", manifest("alpha", None)),
            ));

        assert!(resolver
            .resolve(&ModuleName::new("alpha"), None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn preloaded_modules_follow_the_same_policy() {
        let mut catalog = TypeCatalog::new();
        catalog
            .register::<dyn Marker, _>("t::Unit", |_| Ok(Arc::new(Unit)))
            .unwrap();
        let resolver = ModuleResolver::new(loader()).with_preloaded(LoadedModule::builtin(
            "host",
            Some(v("2.0")),
            &catalog,
        ));
        let name = ModuleName::new("host");

        assert!(resolver.resolve(&name, Some(&v("2.0"))).await.is_ok());
        assert!(matches!(
            resolver.resolve(&name, Some(&v("1.0"))).await,
            Err(ModuleError::VersionConflict { .. })
        ));
    }

    struct SlowStore {
        opens: AtomicUsize,
    }

    impl ModuleStore for SlowStore {
        fn describe(&self) -> String {
            "slow".to_string()
        }

        fn exists(&self, _name: &ModuleName) -> bool {
            true
        }

        fn open_read(&self, name: &ModuleName) -> io::Result<Box<dyn Read + Send>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            Ok(Box::new(io::Cursor::new(manifest(name.as_str(), Some("1.0")))))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_resolution_loads_once() {
        let store = Arc::new(SlowStore {
            opens: AtomicUsize::new(0),
        });
        let resolver = Arc::new(ModuleResolver::new(loader()).with_store(store.clone()));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let resolver = Arc::clone(&resolver);
                tokio::spawn(async move {
                    resolver
                        .resolve(&ModuleName::new("alpha"), Some(&v("1.0")))
                        .await
                })
            })
            .collect();

        let mut modules = Vec::new();
        for task in tasks {
            modules.push(task.await.unwrap().unwrap());
        }

        assert_eq!(store.opens.load(Ordering::SeqCst), 1);
        assert!(modules.iter().all(|m| Arc::ptr_eq(m, &modules[0])));
    }
}
