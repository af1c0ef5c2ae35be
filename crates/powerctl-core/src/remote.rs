//! Contract between the orchestrator and whatever actually touches hosts.
//!
//! The orchestrator never looks at transport details. It issues a
//! [`PowerAction`] against a target address and reads back a
//! [`RemoteOutcome`]: a success flag plus whatever diagnostic text the
//! transport captured. Queries return plain lists.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use crate::mac::MacAddress;

/// Identifier of a VM or container on its host. Inventories write these
/// as integers (`100`) or strings (`"a1b2c3"`); both normalise to text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for ResourceId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for ResourceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for ResourceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(n.into()),
            Raw::Text(s) if s.trim().is_empty() => {
                Err(serde::de::Error::custom("resource id must not be empty"))
            }
            Raw::Text(s) => Ok(Self(s.trim().to_string())),
        }
    }
}

/// A running VM or container as reported by a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub name: String,
}

impl Resource {
    pub fn new(id: impl Into<ResourceId>, name: &str) -> Self {
        Self {
            id: id.into(),
            name: name.to_string(),
        }
    }

    /// Report label: `"name (id)"`.
    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    Running,
    Stopped,
    Unknown,
}

impl PowerState {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "running" => Self::Running,
            "stopped" => Self::Stopped,
            _ => Self::Unknown,
        }
    }
}

/// A VM in any state, from a full inventory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmEntry {
    pub id: ResourceId,
    pub name: String,
    pub state: PowerState,
}

impl VmEntry {
    pub fn resource(&self) -> Resource {
        Resource {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}

/// Which layer of the cluster an action touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Hosts,
    Vms,
    Containers,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Hosts => "Hosts",
            Self::Vms => "VMs",
            Self::Containers => "Containers",
        })
    }
}

/// A single mutating operation against a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PowerAction {
    StopVm(ResourceId),
    StartVm(ResourceId),
    StopContainer(ResourceId),
    StartContainer(ResourceId),
    ShutdownHost,
    /// Target address is the broadcast destination, not a host.
    SendWake(MacAddress),
}

impl PowerAction {
    /// Short verb for logs: "stop-vm", "send-wake", ...
    pub fn verb(&self) -> &'static str {
        match self {
            Self::StopVm(_) => "stop-vm",
            Self::StartVm(_) => "start-vm",
            Self::StopContainer(_) => "stop-container",
            Self::StartContainer(_) => "start-container",
            Self::ShutdownHost => "shutdown-host",
            Self::SendWake(_) => "send-wake",
        }
    }
}

/// Result of one remote action. Consumed once by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteOutcome {
    pub succeeded: bool,
    pub diagnostic: String,
}

impl RemoteOutcome {
    pub fn ok() -> Self {
        Self {
            succeeded: true,
            diagnostic: String::new(),
        }
    }

    pub fn failed(diagnostic: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            diagnostic: diagnostic.into(),
        }
    }

    /// True when the transport dropped because the far end went away.
    ///
    /// A host that is powering itself off tears down the session while the
    /// shutdown command is still "running", so callers issuing
    /// [`PowerAction::ShutdownHost`] treat this as success.
    pub fn connection_dropped(&self) -> bool {
        let text = self.diagnostic.to_ascii_lowercase();
        text.contains("connection reset") || text.contains("closed")
    }
}

/// Executes power actions and inventory queries against cluster hosts.
///
/// Implementations enforce their own per-call timeout and never return an
/// error: every failure is folded into [`RemoteOutcome::failed`] or, for
/// queries, an empty/negative answer.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn is_host_online(&self, address: &str) -> bool;

    async fn running_vms(&self, address: &str) -> Vec<Resource>;

    /// Every VM defined on the host, including stopped ones.
    async fn all_vms(&self, address: &str) -> Vec<VmEntry>;

    async fn running_containers(&self, address: &str) -> Vec<Resource>;

    async fn execute(&self, target: &str, action: &PowerAction) -> RemoteOutcome;
}
