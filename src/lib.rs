//! # powerctl: confirmation-gated power orchestration for hypervisor clusters
//!
//! Facade crate that re-exports the powerctl workspace crates so consumers
//! can depend on a single `powerctl` library.
//!
//! ## Crate breakdown
//!
//! | Module | Crate | Purpose |
//! |--------|-------|---------|
//! | [`core`] | powerctl-core | Topology config, settings, MAC/wake addresses, remote executor contract |
//! | [`runtime`] | powerctl-runtime | SSH transport, Proxmox commands and parsers, Wake-on-LAN |
//! | [`orchestrator`] | powerctl-orchestrator | Confirmation gate, shutdown/startup algorithms, reports |
//! | [`cli`] | powerctl-cli | Command tree, terminal surface, logging |

pub use powerctl_cli as cli;
pub use powerctl_core as core;
pub use powerctl_orchestrator as orchestrator;
pub use powerctl_runtime as runtime;
