use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use plughost_core::config::HostInfo;
use plughost_core::{BoxError, ServiceRegistry};
use plughost_scheduler::{Worker, WorkerError};
use plughost_workers::{WorkerDescriptor, WorkerFactory, WorkerServiceInjector};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub const DEFAULT_FIRST_NAME: &str = "TheWorkerName";

/// Service the sample module makes available to its workers.
pub trait SampleService: Send + Sync {
    fn do_something(&self);
}

#[derive(Debug, Default)]
pub struct SampleServiceInWorker {
    calls: AtomicU64,
}

impl SampleServiceInWorker {
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl SampleService for SampleServiceInWorker {
    fn do_something(&self) {
        let call = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        info!(call, "sample service is doing something");
    }
}

/// Registers [`SampleServiceInWorker`] as the `dyn SampleService` provider.
#[derive(Debug, Default)]
pub struct SampleWorkerServiceInjector;

impl WorkerServiceInjector for SampleWorkerServiceInjector {
    fn configure_services(
        &self,
        descriptor: &WorkerDescriptor,
        services: &ServiceRegistry,
    ) -> Result<(), BoxError> {
        info!(worker = %descriptor.name, "configuring sample services");
        services.register::<dyn SampleService>(Arc::new(SampleServiceInWorker::default()))?;
        Ok(())
    }
}

/// `[workers.<key>.settings]` for a sample worker.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SampleWorkerSettings {
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub default_first_name: Option<String>,
}

pub struct SampleWorkerFactory {
    host: Arc<HostInfo>,
}

impl SampleWorkerFactory {
    pub fn new(host: Arc<HostInfo>) -> Self {
        info!(host = %host.name, "sample worker factory created");
        Self { host }
    }

    pub fn host(&self) -> &HostInfo {
        &self.host
    }
}

impl WorkerFactory for SampleWorkerFactory {
    fn create(
        &self,
        descriptor: &WorkerDescriptor,
        services: &ServiceRegistry,
    ) -> Result<Arc<dyn Worker>, BoxError> {
        let settings: SampleWorkerSettings = descriptor.settings()?;
        let service = services.require::<dyn SampleService>()?;
        Ok(Arc::new(SampleWorker {
            service,
            retry_count: settings.retry_count,
            default_first_name: settings
                .default_first_name
                .unwrap_or_else(|| DEFAULT_FIRST_NAME.to_string()),
        }))
    }
}

pub struct SampleWorker {
    service: Arc<dyn SampleService>,
    retry_count: u32,
    default_first_name: String,
}

impl SampleWorker {
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn default_first_name(&self) -> &str {
        &self.default_first_name
    }
}

#[async_trait]
impl Worker for SampleWorker {
    fn name(&self) -> &str {
        "Sample Worker"
    }

    async fn execute(&self, _cancel: CancellationToken) -> Result<(), WorkerError> {
        info!(
            retry_count = self.retry_count,
            default_first_name = %self.default_first_name,
            "sample worker executing"
        );
        self.service.do_something();
        Ok(())
    }
}
