// powerctl-runtime: Remote execution against real hosts
// Depends on powerctl-core (executor contract, settings)

pub mod executor;
pub mod proxmox;
pub mod ssh;
pub mod wol;

pub use executor::ProxmoxExecutor;
