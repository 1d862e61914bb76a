use std::sync::Arc;

use plughost_core::{ServiceRegistry, WorkerId};
use plughost_modules::{
    ConstructorArgs, FsModuleStore, LoadedModule, ManifestLoader, ModuleError, ModuleResolver,
    TypeCatalog, TypeInstantiator,
};
use plughost_scheduler::{
    Clock, HostMonitor, MonotonicClock, Schedule, SchedulerError, StopReason, WorkerHost,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::descriptor::{DescriptorFailure, WorkerDescriptor, WorkerRegistry};
use crate::error::{OrchestratorError, Result};
use crate::plugin::{WorkerFactory, WorkerServiceInjector};

/// A spawned worker host.
#[derive(Debug)]
pub struct RunningWorker {
    pub id: WorkerId,
    pub name: String,
    pub monitor: HostMonitor,
    handle: JoinHandle<std::result::Result<StopReason, SchedulerError>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedWorker {
    pub id: WorkerId,
    pub name: String,
}

/// Outcome of [`Orchestrator::start`].
#[derive(Debug, Default)]
pub struct StartReport {
    pub started: Vec<StartedWorker>,
    pub failures: Vec<DescriptorFailure>,
}

impl StartReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// How a worker host ended.
#[derive(Debug)]
pub struct WorkerExit {
    pub id: WorkerId,
    pub name: String,
    pub outcome: Result<StopReason>,
}

/// Turns worker descriptors into running worker hosts.
///
/// Owns the module resolver, so every worker that names the same module
/// shares one loaded copy of it.
pub struct Orchestrator {
    resolver: Arc<ModuleResolver>,
    instantiator: TypeInstantiator,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    hosts: Vec<RunningWorker>,
}

impl Orchestrator {
    pub fn new(resolver: Arc<ModuleResolver>) -> Self {
        Self {
            resolver,
            instantiator: TypeInstantiator::new(),
            clock: Arc::new(MonotonicClock::new()),
            cancel: CancellationToken::new(),
            hosts: Vec::new(),
        }
    }

    /// Resolver over the registry's module roots, linking manifests against
    /// `catalog`.
    pub fn for_registry(registry: &WorkerRegistry, catalog: Arc<TypeCatalog>) -> Self {
        let mut resolver = ModuleResolver::new(Arc::new(ManifestLoader::new(catalog)));
        for root in registry.module_roots() {
            resolver = resolver.with_store(Arc::new(FsModuleStore::new(root)));
        }
        Self::new(Arc::new(resolver))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Tie every worker host to `parent`: cancelling it stops them all.
    pub fn with_cancellation(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    pub fn resolver(&self) -> &Arc<ModuleResolver> {
        &self.resolver
    }

    pub fn running(&self) -> &[RunningWorker] {
        &self.hosts
    }

    /// Start a host for every descriptor in `registry`.
    ///
    /// A descriptor that fails at any step is logged and reported; the rest
    /// still start. The service registry is sealed once all descriptors
    /// have been processed.
    pub async fn start(
        &mut self,
        registry: &WorkerRegistry,
        services: Arc<ServiceRegistry>,
    ) -> StartReport {
        let mut report = StartReport::default();

        for descriptor in registry.descriptors() {
            match self.start_one(descriptor, &services).await {
                Ok(running) => {
                    info!(
                        worker_id = %running.id,
                        worker = %running.name,
                        module = %descriptor.module,
                        "worker started"
                    );
                    report.started.push(StartedWorker {
                        id: running.id,
                        name: running.name.clone(),
                    });
                    self.hosts.push(running);
                }
                Err(e) => {
                    error!(
                        worker_id = %descriptor.id,
                        worker = %descriptor.name,
                        code = e.code(),
                        error = %e,
                        "worker failed to start"
                    );
                    report
                        .failures
                        .push(DescriptorFailure::for_descriptor(descriptor, e));
                }
            }
        }

        services.seal();
        info!(
            started = report.started.len(),
            failed = report.failures.len(),
            "orchestration finished"
        );
        report
    }

    async fn start_one(
        &self,
        descriptor: &WorkerDescriptor,
        services: &ServiceRegistry,
    ) -> Result<RunningWorker> {
        let module = self.resolve_module(descriptor).await?;

        let injector: Arc<dyn WorkerServiceInjector> = self.instantiator.instantiate(
            &module,
            &descriptor.service_injector_type,
            ConstructorArgs::new(),
        )?;
        injector
            .configure_services(descriptor, services)
            .map_err(|source| OrchestratorError::ServiceInjection {
                type_name: descriptor.service_injector_type.clone(),
                source,
            })?;

        let factory: Arc<dyn WorkerFactory> = self.instantiator.instantiate_with_services(
            &module,
            &descriptor.factory_type,
            services,
            ConstructorArgs::new().with(descriptor.clone()),
        )?;
        let worker = factory
            .create(descriptor, services)
            .map_err(|source| OrchestratorError::WorkerCreation {
                type_name: descriptor.factory_type.clone(),
                source,
            })?;

        let schedule = Schedule::build(&descriptor.schedule, self.clock.now())?;
        let host = WorkerHost::new(descriptor.id, worker, schedule).with_clock(Arc::clone(&self.clock));
        let monitor = host.monitor();
        let handle = tokio::spawn(host.run(self.cancel.child_token()));

        Ok(RunningWorker {
            id: descriptor.id,
            name: descriptor.name.clone(),
            monitor,
            handle,
        })
    }

    /// The descriptor's module. A first load searches the directory named by
    /// its `module_path` before the shared roots.
    async fn resolve_module(&self, descriptor: &WorkerDescriptor) -> Result<Arc<LoadedModule>> {
        let name = &descriptor.module.name;
        let version = descriptor.module.version.as_ref();
        let Some(dir) = descriptor.module_dir() else {
            return Ok(self.resolver.resolve(name, version).await?);
        };

        let module = self
            .resolver
            .resolve_preferring(name, version, Arc::new(FsModuleStore::new(dir)))
            .await?;
        let expected = dir.display().to_string();
        if module.origin() != expected && module.origin() != "builtin" {
            warn!(
                worker_id = %descriptor.id,
                module = %name,
                origin = module.origin(),
                expected = %expected,
                "module already loaded from another location"
            );
        }
        Ok(module)
    }

    /// Resolve every module and look up every type without starting anything.
    pub async fn check(&self, registry: &WorkerRegistry) -> Vec<DescriptorFailure> {
        let mut failures = Vec::new();
        for descriptor in registry.descriptors() {
            if let Err(e) = self.check_one(descriptor).await {
                warn!(worker_id = %descriptor.id, worker = %descriptor.name, error = %e, "worker check failed");
                failures.push(DescriptorFailure::for_descriptor(descriptor, e));
            }
        }
        failures
    }

    async fn check_one(&self, descriptor: &WorkerDescriptor) -> Result<()> {
        let module = self.resolve_module(descriptor).await?;
        for type_name in [&descriptor.service_injector_type, &descriptor.factory_type] {
            if module.export(type_name).is_none() {
                return Err(ModuleError::TypeNotFound {
                    module: module.name().to_string(),
                    type_name: type_name.clone(),
                }
                .into());
            }
        }
        Schedule::build(&descriptor.schedule, self.clock.now())?;
        Ok(())
    }

    /// Request cancellation of every worker host. Returns immediately.
    pub fn stop_all(&self) {
        info!(workers = self.hosts.len(), "stopping all workers");
        self.cancel.cancel();
    }

    /// Wait for every worker host to end.
    pub async fn join(self) -> Vec<WorkerExit> {
        let mut exits = Vec::with_capacity(self.hosts.len());
        for host in self.hosts {
            let outcome = match host.handle.await {
                Ok(result) => result.map_err(OrchestratorError::from),
                Err(e) => Err(OrchestratorError::from(e)),
            };
            exits.push(WorkerExit {
                id: host.id,
                name: host.name,
                outcome,
            });
        }
        exits
    }

    /// [`stop_all`](Self::stop_all) followed by [`join`](Self::join).
    pub async fn shutdown(self) -> Vec<WorkerExit> {
        self.stop_all();
        self.join().await
    }
}
