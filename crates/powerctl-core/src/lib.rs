// powerctl-core: Pure types, topology config, remote executor contract
// No internal powerctl dependencies; this is the foundation crate.

pub mod mac;
pub mod remote;
pub mod settings;
pub mod time;
pub mod topology;
