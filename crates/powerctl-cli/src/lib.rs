// powerctl-cli: Clap commands, terminal surface, logging
// Depends on powerctl-core, powerctl-runtime, powerctl-orchestrator

pub mod commands;
pub mod logging;
pub mod output;
pub mod terminal;
pub mod ui;

pub use commands::run;
