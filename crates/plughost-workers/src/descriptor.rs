use std::fmt;
use std::path::{Path, PathBuf};

use plughost_core::config::{PlugHostConfig, WorkerConfig};
use plughost_core::{ModuleRef, ModuleVersion, WorkerId};
use plughost_modules::module_name_from_path;
use plughost_scheduler::ScheduleSpec;
use serde::de::DeserializeOwned;
use tracing::{error, info};

use crate::error::{OrchestratorError, Result};

/// Validated definition of one worker.
#[derive(Debug, Clone)]
pub struct WorkerDescriptor {
    /// Config table key (`[workers.<key>]`).
    pub key: String,
    pub id: WorkerId,
    pub name: String,
    pub schedule: ScheduleSpec,
    /// Absolute path of the module manifest.
    pub module_path: PathBuf,
    /// Module name taken from `module_path`, plus the requested version.
    pub module: ModuleRef,
    pub factory_type: String,
    pub service_injector_type: String,
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl WorkerDescriptor {
    /// Validate one config entry. Relative module paths resolve against
    /// `base_dir`.
    pub fn from_config(key: &str, config: &WorkerConfig, base_dir: &Path) -> Result<Self> {
        let invalid = |reason: String| OrchestratorError::ConfigurationInvalid {
            worker: key.to_string(),
            reason,
        };
        let required = |field: &str, value: &Option<String>| -> Result<String> {
            match value.as_deref().map(str::trim) {
                Some(v) if !v.is_empty() => Ok(v.to_string()),
                _ => Err(invalid(format!("missing required field '{field}'"))),
            }
        };

        let id: WorkerId = required("id", &config.id)?
            .parse()
            .map_err(|e: plughost_core::CoreError| invalid(e.to_string()))?;
        let name = config
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| key.to_string());

        let schedule = config
            .schedule_config()
            .map_err(|e| invalid(e.to_string()))?
            .ok_or_else(|| invalid("missing required field 'schedule'".to_string()))?;
        let schedule = ScheduleSpec::try_from(&schedule).map_err(|e| invalid(e.to_string()))?;

        let module_path = PathBuf::from(required("module_path", &config.module_path)?);
        let module_path = if module_path.is_absolute() {
            module_path
        } else {
            base_dir.join(module_path)
        };
        let module_name = module_name_from_path(&module_path).ok_or_else(|| {
            invalid(format!(
                "cannot derive a module name from '{}'",
                module_path.display()
            ))
        })?;
        let module_version = config
            .module_version
            .as_deref()
            .map(str::parse::<ModuleVersion>)
            .transpose()
            .map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            key: key.to_string(),
            id,
            name,
            schedule,
            module_path,
            module: ModuleRef::new(module_name, module_version),
            factory_type: required("factory_type", &config.factory_type)?,
            service_injector_type: required(
                "service_injector_type",
                &config.service_injector_type,
            )?,
            settings: config.settings.clone(),
        })
    }

    /// Directory holding the module manifest.
    pub fn module_dir(&self) -> Option<&Path> {
        self.module_path.parent()
    }

    /// Deserialize the worker's settings table into `T`.
    pub fn settings<T: DeserializeOwned>(&self) -> std::result::Result<T, serde_json::Error> {
        serde_json::from_value(serde_json::Value::Object(self.settings.clone()))
    }
}

/// A worker that could not be validated, started or checked.
#[derive(Debug)]
pub struct DescriptorFailure {
    pub key: String,
    pub worker_id: Option<WorkerId>,
    pub name: String,
    pub error: OrchestratorError,
}

impl DescriptorFailure {
    pub fn for_descriptor(descriptor: &WorkerDescriptor, error: OrchestratorError) -> Self {
        Self {
            key: descriptor.key.clone(),
            worker_id: Some(descriptor.id),
            name: descriptor.name.clone(),
            error,
        }
    }
}

impl fmt::Display for DescriptorFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.worker_id {
            Some(id) => write!(f, "worker '{}' ({id}): {}", self.name, self.error),
            None => write!(f, "worker '{}': {}", self.name, self.error),
        }
    }
}

/// All configured workers, in config key order, plus the module roots they
/// need.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    descriptors: Vec<WorkerDescriptor>,
    rejected: Vec<DescriptorFailure>,
    module_roots: Vec<PathBuf>,
}

impl WorkerRegistry {
    /// Validate every `[workers.*]` entry. Invalid entries are logged and
    /// kept in [`rejected`](Self::rejected); they never abort the others.
    pub fn from_config(config: &PlugHostConfig) -> Self {
        let base_dir = config.host.base_dir();
        let mut registry = Self::default();

        for root in &config.modules.roots {
            let root = PathBuf::from(root);
            registry.add_root(if root.is_absolute() {
                root
            } else {
                base_dir.join(root)
            });
        }

        for (key, worker) in &config.workers {
            match WorkerDescriptor::from_config(key, worker, &base_dir) {
                Ok(descriptor) => registry.push(descriptor),
                Err(e) => {
                    error!(worker = %key, code = e.code(), error = %e, "invalid worker configuration");
                    registry.rejected.push(DescriptorFailure {
                        key: key.clone(),
                        worker_id: worker.id.as_deref().and_then(|id| id.parse().ok()),
                        name: worker.name.clone().unwrap_or_else(|| key.clone()),
                        error: e,
                    });
                }
            }
        }

        info!(
            workers = registry.descriptors.len(),
            rejected = registry.rejected.len(),
            roots = registry.module_roots.len(),
            "worker registry built"
        );
        registry
    }

    /// Build a registry directly from descriptors.
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = WorkerDescriptor>) -> Self {
        let mut registry = Self::default();
        for descriptor in descriptors {
            registry.push(descriptor);
        }
        registry
    }

    fn push(&mut self, descriptor: WorkerDescriptor) {
        if let Some(dir) = descriptor.module_dir() {
            self.add_root(dir.to_path_buf());
        }
        self.descriptors.push(descriptor);
    }

    fn add_root(&mut self, root: PathBuf) {
        if !self.module_roots.contains(&root) {
            self.module_roots.push(root);
        }
    }

    pub fn descriptors(&self) -> &[WorkerDescriptor] {
        &self.descriptors
    }

    pub fn rejected(&self) -> &[DescriptorFailure] {
        &self.rejected
    }

    /// Configured roots first, then each distinct worker module directory.
    pub fn module_roots(&self) -> &[PathBuf] {
        &self.module_roots
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
