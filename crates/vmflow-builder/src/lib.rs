//! vmflow-builder - VM build lifecycle
//!
//! Drives one VM from nothing to a provisioned, powered-off machine through
//! the [`Gateway`](vmflow_api::Gateway).
//!
//! ## Pipeline
//!
//! ```text
//! ResourceProvisioner ─► DiskImportWaiter ─► PowerController ─► AddressResolver
//!        │                                                            │
//!        │ rollback: delete VM                                        ▼
//!        │                                  ProvisionStep ─► ShutdownCoordinator
//!        │                                  (no executor: SimpleShutdownStep)
//!        ▼
//!   BuildFailure  ◄── first fatal error           Artifact ◄── success
//! ```

pub mod artifact;
pub mod context;
pub mod error;
pub mod executor;
pub mod runner;
pub mod settings;
pub mod state;
pub mod step;
pub mod steps;

pub use artifact::Artifact;
pub use context::BuildContext;
pub use error::{BuildError, Result};
pub use executor::{CommandExecutor, ExecError, RemoteCommand, RemoteSession};
pub use runner::{BuildFailure, BuildOutcome, LifecycleRunner};
pub use settings::BuildSettings;
pub use state::{AddressSource, BuildState, DiscoveredAddress, ImportTracker, ProvisionedVm};
pub use step::Step;
pub use steps::{ShutdownReport, ShutdownState};
