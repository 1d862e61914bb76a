use std::any::{type_name, Any};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use plughost_core::ServiceRegistry;
use thiserror::Error;
use tracing::debug;

use crate::error::{ModuleError, Result};
use crate::loader::LoadedModule;

/// A constructor parameter that could not be supplied.
#[derive(Debug, Error)]
pub enum ArgumentError {
    #[error("no argument of type {type_name} was supplied")]
    MissingArgument { type_name: &'static str },

    #[error("no service registered for {capability}")]
    MissingService { capability: &'static str },
}

/// Parameters handed to a catalog constructor, looked up by type.
///
/// Literal values are consulted first; for services, the registry attached
/// with [`with_services`](Self::with_services) is the fallback.
#[derive(Default)]
pub struct ConstructorArgs<'a> {
    literals: Vec<Option<Box<dyn Any + Send + Sync>>>,
    services: Option<&'a ServiceRegistry>,
}

impl<'a> ConstructorArgs<'a> {
    pub fn new() -> Self {
        Self {
            literals: Vec::new(),
            services: None,
        }
    }

    /// Add a literal value.
    pub fn with<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.literals.push(Some(Box::new(value)));
        self
    }

    pub fn with_services(mut self, services: &'a ServiceRegistry) -> Self {
        self.services = Some(services);
        self
    }

    /// Remove and return the first unclaimed literal of type `T`.
    pub fn take<T: Any + Send + Sync>(&mut self) -> std::result::Result<T, ArgumentError> {
        let slot = self
            .literals
            .iter_mut()
            .find(|slot| slot.as_ref().is_some_and(|value| value.is::<T>()))
            .ok_or(ArgumentError::MissingArgument {
                type_name: type_name::<T>(),
            })?;
        match slot.take().map(|value| value.downcast::<T>()) {
            Some(Ok(value)) => Ok(*value),
            _ => Err(ArgumentError::MissingArgument {
                type_name: type_name::<T>(),
            }),
        }
    }

    /// Resolve a shared service: a literal `Arc<C>` first, then the registry.
    pub fn service<C>(&self) -> std::result::Result<Arc<C>, ArgumentError>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        let literal = self
            .literals
            .iter()
            .flatten()
            .find_map(|value| value.downcast_ref::<Arc<C>>().cloned());
        literal
            .or_else(|| self.services.and_then(|services| services.resolve::<C>()))
            .ok_or(ArgumentError::MissingService {
                capability: type_name::<C>(),
            })
    }
}

/// Builds instances of module-exported types as a requested capability.
///
/// Stateless; one instance can serve any number of callers concurrently.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeInstantiator;

impl TypeInstantiator {
    pub fn new() -> Self {
        Self
    }

    /// Build `type_name` from `module` using only the literal `args`.
    pub fn instantiate<C>(
        &self,
        module: &LoadedModule,
        type_name: &str,
        mut args: ConstructorArgs<'_>,
    ) -> Result<Arc<C>>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        args.services = None;
        self.build(module, type_name, args)
    }

    /// Build `type_name` from `module`, falling back to `services` for any
    /// parameter the literal `args` do not supply.
    pub fn instantiate_with_services<'a, C>(
        &self,
        module: &LoadedModule,
        type_name: &str,
        services: &'a ServiceRegistry,
        args: ConstructorArgs<'a>,
    ) -> Result<Arc<C>>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        self.build(module, type_name, args.with_services(services))
    }

    fn build<C>(
        &self,
        module: &LoadedModule,
        type_name: &str,
        mut args: ConstructorArgs<'_>,
    ) -> Result<Arc<C>>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        let capability = std::any::type_name::<C>();
        let ctor = module
            .export(type_name)
            .ok_or_else(|| ModuleError::TypeNotFound {
                module: module.name().to_string(),
                type_name: type_name.to_string(),
            })?;
        let failed = |source| ModuleError::InstantiationFailed {
            type_name: type_name.to_string(),
            capability,
            source,
        };

        let built = match catch_unwind(AssertUnwindSafe(|| ctor.build(&mut args))) {
            Ok(result) => result.map_err(failed)?,
            Err(panic) => return Err(failed(panic_message(panic.as_ref()).into())),
        };
        let instance = built.downcast::<Arc<C>>().map_err(|_| {
            failed(format!("type provides {}, not {capability}", ctor.capability()).into())
        })?;

        debug!(module = %module.name(), type_name, capability, "type instantiated");
        Ok(*instance)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("constructor panicked: {msg}")
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("constructor panicked: {msg}")
    } else {
        "constructor panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TypeCatalog;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    trait Counter: Send + Sync {}

    impl std::fmt::Debug for dyn Greeter {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("dyn Greeter")
        }
    }

    impl std::fmt::Debug for dyn Counter {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("dyn Counter")
        }
    }

    struct Fixed(String);

    impl Greeter for Fixed {
        fn greet(&self) -> String {
            self.0.clone()
        }
    }

    struct Named {
        prefix: Arc<dyn Greeter>,
        name: String,
    }

    impl Greeter for Named {
        fn greet(&self) -> String {
            format!("{} {}", self.prefix.greet(), self.name)
        }
    }

    fn module() -> LoadedModule {
        let mut catalog = TypeCatalog::new();
        catalog
            .register::<dyn Greeter, _>("t::Fixed", |_| Ok(Arc::new(Fixed("hi".into()))))
            .unwrap();
        catalog
            .register::<dyn Greeter, _>("t::Named", |args| {
                let prefix = args.service::<dyn Greeter>()?;
                let name = args.take::<String>()?;
                Ok(Arc::new(Named { prefix, name }))
            })
            .unwrap();
        catalog
            .register::<dyn Greeter, _>("t::Broken", |_| Err("no config".into()))
            .unwrap();
        catalog
            .register::<dyn Greeter, _>("t::Panics", |_| panic!("boom"))
            .unwrap();
        LoadedModule::builtin("test", None, &catalog)
    }

    #[test]
    fn builds_parameterless_type() {
        let greeter: Arc<dyn Greeter> = TypeInstantiator::new()
            .instantiate(&module(), "t::Fixed", ConstructorArgs::new())
            .unwrap();
        assert_eq!(greeter.greet(), "hi");
    }

    #[test]
    fn literals_take_precedence_over_services() {
        let services = ServiceRegistry::new();
        services
            .register::<dyn Greeter>(Arc::new(Fixed("from registry".into())))
            .unwrap();

        let literal: Arc<dyn Greeter> = Arc::new(Fixed("literal".into()));
        let greeter: Arc<dyn Greeter> = TypeInstantiator::new()
            .instantiate_with_services(
                &module(),
                "t::Named",
                &services,
                ConstructorArgs::new().with(literal).with("ada".to_string()),
            )
            .unwrap();
        assert_eq!(greeter.greet(), "literal ada");
    }

    #[test]
    fn services_fill_missing_parameters() {
        let services = ServiceRegistry::new();
        services
            .register::<dyn Greeter>(Arc::new(Fixed("hello".into())))
            .unwrap();

        let greeter: Arc<dyn Greeter> = TypeInstantiator::new()
            .instantiate_with_services(
                &module(),
                "t::Named",
                &services,
                ConstructorArgs::new().with("bob".to_string()),
            )
            .unwrap();
        assert_eq!(greeter.greet(), "hello bob");
    }

    #[test]
    fn missing_dependency_is_instantiation_failure() {
        let err = TypeInstantiator::new()
            .instantiate::<dyn Greeter>(&module(), "t::Named", ConstructorArgs::new())
            .unwrap_err();
        assert_eq!(err.code(), "INSTANTIATION_FAILED");
        assert!(err.to_string().contains("no service registered"));
    }

    #[test]
    fn unknown_type_is_type_not_found() {
        let err = TypeInstantiator::new()
            .instantiate::<dyn Greeter>(&module(), "t::Nope", ConstructorArgs::new())
            .unwrap_err();
        assert!(matches!(err, ModuleError::TypeNotFound { .. }));
    }

    #[test]
    fn constructor_error_is_wrapped() {
        let err = TypeInstantiator::new()
            .instantiate::<dyn Greeter>(&module(), "t::Broken", ConstructorArgs::new())
            .unwrap_err();
        assert!(err.to_string().contains("no config"));
    }

    #[test]
    fn constructor_panic_is_wrapped() {
        let err = TypeInstantiator::new()
            .instantiate::<dyn Greeter>(&module(), "t::Panics", ConstructorArgs::new())
            .unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn wrong_capability_is_instantiation_failure() {
        let err = TypeInstantiator::new()
            .instantiate::<dyn Counter>(&module(), "t::Fixed", ConstructorArgs::new())
            .unwrap_err();
        assert_eq!(err.code(), "INSTANTIATION_FAILED");
        assert!(err.to_string().contains("Greeter"));
    }

    #[test]
    fn take_claims_each_literal_once() {
        let mut args = ConstructorArgs::new().with(1u32).with(2u32);
        assert_eq!(args.take::<u32>().unwrap(), 1);
        assert_eq!(args.take::<u32>().unwrap(), 2);
        assert!(args.take::<u32>().is_err());
    }
}
