//! Worker orchestration: turns `[workers.*]` configuration into running
//! worker hosts, resolving each worker's module and building it through the
//! module's service injector and factory.

pub mod descriptor;
pub mod error;
pub mod orchestrator;
pub mod plugin;

pub use descriptor::{DescriptorFailure, WorkerDescriptor, WorkerRegistry};
pub use error::{OrchestratorError, Result};
pub use orchestrator::{Orchestrator, RunningWorker, StartReport, StartedWorker, WorkerExit};
pub use plugin::{WorkerFactory, WorkerServiceInjector};
