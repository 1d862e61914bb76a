use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use plughost_core::{BoxError, ServiceRegistry};
use plughost_scheduler::{Worker, WorkerError};
use plughost_workers::{WorkerDescriptor, WorkerFactory, WorkerServiceInjector};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Shared count of ping executions.
#[derive(Debug, Default)]
pub struct PingCounter(AtomicU64);

impl PingCounter {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// Registers a [`PingCounter`] unless one already exists.
#[derive(Debug, Default)]
pub struct PingServiceInjector;

impl WorkerServiceInjector for PingServiceInjector {
    fn configure_services(
        &self,
        _descriptor: &WorkerDescriptor,
        services: &ServiceRegistry,
    ) -> Result<(), BoxError> {
        if !services.contains::<PingCounter>() {
            services.register(Arc::new(PingCounter::default()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct PingWorkerFactory;

impl WorkerFactory for PingWorkerFactory {
    fn create(
        &self,
        descriptor: &WorkerDescriptor,
        services: &ServiceRegistry,
    ) -> Result<Arc<dyn Worker>, BoxError> {
        Ok(Arc::new(PingWorker {
            name: descriptor.name.clone(),
            counter: services.require::<PingCounter>()?,
        }))
    }
}

pub struct PingWorker {
    name: String,
    counter: Arc<PingCounter>,
}

#[async_trait]
impl Worker for PingWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _cancel: CancellationToken) -> Result<(), WorkerError> {
        let count = self.counter.bump();
        info!(worker = %self.name, count, "ping");
        Ok(())
    }
}
