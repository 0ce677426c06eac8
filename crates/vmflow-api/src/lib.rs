//! vmflow-api - control-plane REST gateway
//!
//! Typed access to the virtualization control plane used by a VM build.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              Gateway (trait)                 │
//! │  create_vm / create_disk / power_action ...  │
//! └──────────────────────┬───────────────────────┘
//!                        │
//!                ┌───────┴───────┐
//!                │ VergeGateway  │
//!                └───────┬───────┘
//!        ┌────────┬──────┴──┬───────────┐
//!        ▼        ▼         ▼           ▼
//!     VmApi   DriveApi   NicApi    NetworkApi
//!        └────────┴────┬────┴───────────┘
//!                      ▼
//!              ApiClient (reqwest, basic auth)
//! ```

pub mod client;
pub mod drive;
pub mod error;
pub mod gateway;
pub mod model;
pub mod network;
pub mod nic;
pub mod vm;
mod wire;

pub use client::{ApiClient, ClusterConnection, QueryOptions};
pub use drive::{DiskInfo, DriveApi, ImportStatus};
pub use error::{ApiError, Result};
pub use gateway::{Gateway, PowerAction, VergeGateway};
pub use model::{
    BYTES_PER_GB, CloudInitFile, DiskKey, DiskSpec, MachineId, MediaMode, NicKey, NicSpec, VmKey,
    VmSpec, gb_to_bytes,
};
pub use network::{NetworkApi, NetworkSummary};
pub use nic::NicApi;
pub use vm::{GuestInterface, VmApi, VmSummary};
