use std::fmt;

use serde::{Deserialize, Serialize};

/// The three cluster-wide power operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    /// Stop every VM and container, then power off every host.
    FullShutdown,
    /// Like a full shutdown, but critical containers and their hosts stay up.
    ShutdownKeepCritical,
    /// Wake every host, then start containers and VMs.
    FullStartup,
}

impl OperationKind {
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::FullShutdown | Self::ShutdownKeepCritical)
    }

    /// Title shown while waiting for approval.
    pub fn confirm_title(&self) -> &'static str {
        match self {
            Self::FullShutdown => "Confirm Full Cluster Shutdown",
            Self::ShutdownKeepCritical => "Confirm Partial Shutdown (Keep Critical)",
            Self::FullStartup => "Confirm Full Cluster Startup",
        }
    }

    /// Title shown while the run is executing.
    pub fn running_title(&self) -> &'static str {
        match self {
            Self::FullShutdown => "Shutting Down Cluster...",
            Self::ShutdownKeepCritical => "Shutting Down (Keeping Critical Services)...",
            Self::FullStartup => "Starting Cluster...",
        }
    }

    /// Noun used in final report titles.
    pub fn noun(&self) -> &'static str {
        if self.is_shutdown() {
            "Shutdown"
        } else {
            "Startup"
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FullShutdown => "full-shutdown",
            Self::ShutdownKeepCritical => "shutdown-keep-critical",
            Self::FullStartup => "full-startup",
        })
    }
}
