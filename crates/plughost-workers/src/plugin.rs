//! Interfaces a module implements to contribute workers.

use std::sync::Arc;

use plughost_core::{BoxError, ServiceRegistry};
use plughost_scheduler::Worker;

use crate::descriptor::WorkerDescriptor;

/// Builds the worker for one descriptor.
///
/// Catalog constructors for factories receive the descriptor as a literal
/// argument and may also pull services from the registry.
pub trait WorkerFactory: Send + Sync {
    fn create(
        &self,
        descriptor: &WorkerDescriptor,
        services: &ServiceRegistry,
    ) -> Result<Arc<dyn Worker>, BoxError>;
}

/// Registers the services a worker needs before its factory is built.
pub trait WorkerServiceInjector: Send + Sync {
    fn configure_services(
        &self,
        descriptor: &WorkerDescriptor,
        services: &ServiceRegistry,
    ) -> Result<(), BoxError>;
}
