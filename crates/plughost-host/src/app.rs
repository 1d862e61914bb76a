use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use plughost_core::config::{HostInfo, PlugHostConfig};
use plughost_core::ServiceRegistry;
use plughost_modules::TypeCatalog;
use plughost_workers::{Orchestrator, WorkerRegistry};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Everything the host needs before any worker starts.
pub struct HostApp {
    pub config: PlugHostConfig,
    pub registry: WorkerRegistry,
    pub services: Arc<ServiceRegistry>,
    pub catalog: Arc<TypeCatalog>,
}

impl HostApp {
    /// Validate workers, register host-level services and link the
    /// compiled-in type catalog.
    pub fn bootstrap(config: PlugHostConfig) -> anyhow::Result<Self> {
        let registry = WorkerRegistry::from_config(&config);

        let services = Arc::new(ServiceRegistry::new());
        services.register(Arc::new(HostInfo::from_config(&config.host)))?;

        let catalog = plughost_samples::catalog().context("linking sample types")?;
        info!(
            host = %config.host.name,
            types = catalog.len(),
            workers = registry.len(),
            "host bootstrapped"
        );

        Ok(Self {
            config,
            registry,
            services,
            catalog: Arc::new(catalog),
        })
    }

    /// Resolve every module and type without starting workers.
    /// Returns the number of problems found.
    pub async fn check(&self) -> usize {
        let orchestrator = Orchestrator::for_registry(&self.registry, Arc::clone(&self.catalog));
        let failures = orchestrator.check(&self.registry).await;

        for failure in self.registry.rejected().iter().chain(failures.iter()) {
            error!(worker = %failure.key, code = failure.error.code(), "{failure}");
        }
        let problems = self.registry.rejected().len() + failures.len();
        if problems == 0 {
            info!(workers = self.registry.len(), "configuration check passed");
        }
        problems
    }

    /// Start every worker and run until `shutdown` resolves or every worker
    /// host has stopped on its own. Fails if any worker ended with an error.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
        let cancel = CancellationToken::new();
        let mut orchestrator = Orchestrator::for_registry(&self.registry, Arc::clone(&self.catalog))
            .with_cancellation(&cancel);

        let report = orchestrator
            .start(&self.registry, Arc::clone(&self.services))
            .await;
        let failed = report.failures.len() + self.registry.rejected().len();
        if failed > 0 {
            warn!(failed, started = report.started.len(), "some workers did not start");
        }

        let monitors: Vec<_> = orchestrator
            .running()
            .iter()
            .map(|w| w.monitor.clone())
            .collect();
        let all_stopped = async move {
            for mut monitor in monitors {
                monitor.stopped().await;
            }
        };

        tokio::select! {
            _ = shutdown => info!("shutdown requested"),
            _ = all_stopped => info!("all worker hosts have stopped"),
        }

        cancel.cancel();
        let mut crashed = 0usize;
        for exit in orchestrator.join().await {
            match exit.outcome {
                Ok(reason) => info!(worker_id = %exit.id, worker = %exit.name, ?reason, "worker exited"),
                Err(e) => {
                    crashed += 1;
                    error!(worker_id = %exit.id, worker = %exit.name, error = %e, "worker exited with error");
                }
            }
        }
        if crashed > 0 {
            anyhow::bail!("{crashed} worker(s) exited with an error");
        }
        Ok(())
    }
}
