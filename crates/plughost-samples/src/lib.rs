//! Sample workers linked into the `plughost` binary.
//!
//! Deploy `samples.module.toml` next to the host config to expose them:
//!
//! ```toml
//! name = "samples"
//! version = "1.0.0"
//! exports = [
//!     "samples::SampleWorkerFactory",
//!     "samples::SampleWorkerServiceInjector",
//!     "samples::PingWorkerFactory",
//!     "samples::PingServiceInjector",
//! ]
//! ```

pub mod ping;
pub mod sample;

use std::sync::Arc;

use plughost_core::config::HostInfo;
use plughost_modules::TypeCatalog;
use plughost_workers::{WorkerFactory, WorkerServiceInjector};

pub use ping::{PingCounter, PingServiceInjector, PingWorker, PingWorkerFactory};
pub use sample::{
    SampleService, SampleServiceInWorker, SampleWorker, SampleWorkerFactory,
    SampleWorkerServiceInjector, SampleWorkerSettings,
};

pub const MODULE_NAME: &str = "samples";

/// Catalog entries for every sample type, keyed by their exported names.
pub fn catalog() -> plughost_modules::Result<TypeCatalog> {
    let mut catalog = TypeCatalog::new();
    catalog.register::<dyn WorkerServiceInjector, _>(
        "samples::SampleWorkerServiceInjector",
        |_| Ok(Arc::new(SampleWorkerServiceInjector)),
    )?;
    catalog.register::<dyn WorkerFactory, _>("samples::SampleWorkerFactory", |args| {
        let host = args.service::<HostInfo>()?;
        Ok(Arc::new(SampleWorkerFactory::new(host)))
    })?;
    catalog.register::<dyn WorkerServiceInjector, _>("samples::PingServiceInjector", |_| {
        Ok(Arc::new(PingServiceInjector))
    })?;
    catalog.register::<dyn WorkerFactory, _>("samples::PingWorkerFactory", |_| {
        Ok(Arc::new(PingWorkerFactory))
    })?;
    Ok(catalog)
}
