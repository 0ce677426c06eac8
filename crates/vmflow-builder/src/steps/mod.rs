//! Lifecycle steps, in pipeline order

pub mod address;
pub mod import;
pub mod power;
pub mod provision;
pub mod resources;
pub mod shutdown;
pub mod simple_shutdown;

pub use address::AddressResolver;
pub use import::DiskImportWaiter;
pub use power::PowerController;
pub use provision::ProvisionStep;
pub use resources::ResourceProvisioner;
pub use shutdown::{ShutdownCoordinator, ShutdownReport, ShutdownState};
pub use simple_shutdown::SimpleShutdownStep;
