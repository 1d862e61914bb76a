use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use plughost_core::BoxError;
use tracing::debug;

use crate::error::{ModuleError, Result};
use crate::instantiator::ConstructorArgs;

type BuildFn =
    dyn Fn(&mut ConstructorArgs<'_>) -> std::result::Result<Box<dyn Any + Send + Sync>, BoxError>
        + Send
        + Sync;

/// A named way to build one type, erased down to the capability it provides.
///
/// The built value is always an `Arc<C>` boxed as `Any`, where `C` is the
/// capability named by [`capability`](Self::capability).
#[derive(Clone)]
pub struct Constructor {
    type_name: String,
    capability: &'static str,
    build: Arc<BuildFn>,
}

impl Constructor {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn capability(&self) -> &'static str {
        self.capability
    }

    pub(crate) fn build(
        &self,
        args: &mut ConstructorArgs<'_>,
    ) -> std::result::Result<Box<dyn Any + Send + Sync>, BoxError> {
        (self.build)(args)
    }
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constructor")
            .field("type_name", &self.type_name)
            .field("capability", &self.capability)
            .finish()
    }
}

/// Every type this host binary can construct, keyed by the names module
/// manifests export.
///
/// A module can only export names that are linked here; loading resolves
/// each export against the catalog.
#[derive(Debug, Clone, Default)]
pub struct TypeCatalog {
    constructors: HashMap<String, Constructor>,
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link `type_name` to a constructor producing capability `C`.
    pub fn register<C, F>(&mut self, type_name: impl Into<String>, ctor: F) -> Result<()>
    where
        C: ?Sized + Send + Sync + 'static,
        F: Fn(&mut ConstructorArgs<'_>) -> std::result::Result<Arc<C>, BoxError>
            + Send
            + Sync
            + 'static,
    {
        let type_name = type_name.into();
        if self.constructors.contains_key(&type_name) {
            return Err(ModuleError::DuplicateType { type_name });
        }

        let capability = std::any::type_name::<C>();
        let build: Arc<BuildFn> = Arc::new(move |args: &mut ConstructorArgs<'_>| {
            ctor(args).map(|instance| Box::new(instance) as Box<dyn Any + Send + Sync>)
        });
        debug!(type_name = %type_name, capability, "type linked");
        self.constructors.insert(
            type_name.clone(),
            Constructor {
                type_name,
                capability,
                build,
            },
        );
        Ok(())
    }

    /// Add every entry of `other`. Fails on the first name already present.
    pub fn merge(&mut self, other: TypeCatalog) -> Result<()> {
        for (name, ctor) in other.constructors {
            if self.constructors.contains_key(&name) {
                return Err(ModuleError::DuplicateType { type_name: name });
            }
            self.constructors.insert(name, ctor);
        }
        Ok(())
    }

    pub fn get(&self, type_name: &str) -> Option<&Constructor> {
        self.constructors.get(type_name)
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.constructors.contains_key(type_name)
    }

    /// Registered names, sorted.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}
