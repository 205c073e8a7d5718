//! vmstate: declarative present/absent state for NSX-T and vSphere networking

pub mod config;
pub mod diff;
pub mod error;
pub mod manager;
pub mod nsxt;
pub mod policy;
pub mod resource;
pub mod state;
pub mod vsphere;

/// Version injected at compile time via VMSTATE_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("VMSTATE_VERSION") {
    Some(v) => v,
    None => "dev",
};
