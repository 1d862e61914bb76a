//! Typed service registry shared between the host and loaded modules.
//!
//! Services are keyed by capability type (usually a trait object such as
//! `dyn Clock`) and stored as `Arc<C>`. Modules register what their workers
//! need during orchestration; afterwards the registry is sealed and only
//! read.

use std::any::{type_name, Any, TypeId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::error::{CoreError, Result};

struct ServiceEntry {
    capability: &'static str,
    /// Always a boxed `Arc<C>` for the capability `C` this entry is keyed by.
    instance: Box<dyn Any + Send + Sync>,
}

#[derive(Default)]
pub struct ServiceRegistry {
    services: DashMap<TypeId, ServiceEntry>,
    sealed: AtomicBool,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `instance` as the provider of capability `C`.
    ///
    /// A later registration for the same capability replaces the earlier one.
    pub fn register<C>(&self, instance: Arc<C>) -> Result<()>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        let capability = type_name::<C>();
        if self.is_sealed() {
            return Err(CoreError::RegistrySealed {
                capability: capability.to_string(),
            });
        }

        let previous = self.services.insert(
            TypeId::of::<C>(),
            ServiceEntry {
                capability,
                instance: Box::new(instance),
            },
        );
        if previous.is_some() {
            debug!(capability, "service replaced");
        } else {
            debug!(capability, "service registered");
        }
        Ok(())
    }

    /// Look up the provider of capability `C`.
    pub fn resolve<C>(&self) -> Option<Arc<C>>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        self.services
            .get(&TypeId::of::<C>())
            .and_then(|entry| entry.instance.downcast_ref::<Arc<C>>().cloned())
    }

    /// Like [`resolve`](Self::resolve) but reports a missing service as an error.
    pub fn require<C>(&self) -> Result<Arc<C>>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        self.resolve::<C>()
            .ok_or_else(|| CoreError::ServiceNotRegistered {
                capability: type_name::<C>().to_string(),
            })
    }

    pub fn contains<C>(&self) -> bool
    where
        C: ?Sized + Send + Sync + 'static,
    {
        self.services.contains_key(&TypeId::of::<C>())
    }

    /// Freeze the registry. Subsequent registrations fail with `RegistrySealed`.
    pub fn seal(&self) {
        if !self.sealed.swap(true, Ordering::AcqRel) {
            debug!(services = self.services.len(), "service registry sealed");
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Capability names of all registered services, sorted.
    pub fn capabilities(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.services.iter().map(|e| e.value().capability).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("capabilities", &self.capabilities())
            .field("sealed", &self.is_sealed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    impl std::fmt::Debug for dyn Greeter {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("dyn Greeter")
        }
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    struct French;

    impl Greeter for French {
        fn greet(&self) -> String {
            "bonjour".to_string()
        }
    }

    #[test]
    fn resolves_trait_object_services() {
        let registry = ServiceRegistry::new();
        registry.register::<dyn Greeter>(Arc::new(English)).unwrap();

        let greeter = registry.resolve::<dyn Greeter>().unwrap();
        assert_eq!(greeter.greet(), "hello");
        assert!(registry.contains::<dyn Greeter>());
    }

    #[test]
    fn resolves_concrete_services() {
        let registry = ServiceRegistry::new();
        registry.register(Arc::new(42u32)).unwrap();
        assert_eq!(*registry.resolve::<u32>().unwrap(), 42);
        assert!(registry.resolve::<u64>().is_none());
    }

    #[test]
    fn later_registration_replaces_earlier() {
        let registry = ServiceRegistry::new();
        registry.register::<dyn Greeter>(Arc::new(English)).unwrap();
        registry.register::<dyn Greeter>(Arc::new(French)).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.require::<dyn Greeter>().unwrap().greet(), "bonjour");
    }

    #[test]
    fn require_reports_missing_capability() {
        let registry = ServiceRegistry::new();
        let err = registry.require::<dyn Greeter>().unwrap_err();
        assert_eq!(err.code(), "SERVICE_NOT_REGISTERED");
        assert!(err.to_string().contains("Greeter"));
    }

    #[test]
    fn sealed_registry_rejects_registration_but_still_resolves() {
        let registry = ServiceRegistry::new();
        registry.register::<dyn Greeter>(Arc::new(English)).unwrap();
        registry.seal();

        let err = registry.register(Arc::new(1u8)).unwrap_err();
        assert!(matches!(err, CoreError::RegistrySealed { .. }));
        assert!(registry.resolve::<dyn Greeter>().is_some());
    }
}
