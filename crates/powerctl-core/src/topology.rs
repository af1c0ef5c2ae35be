use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::mac::WakeAddress;
use crate::remote::ResourceId;
use crate::settings::{Pacing, PowerSettings, SshSettings};

/// Static cluster inventory loaded from TOML.
///
/// Read-only for the lifetime of the process. Host order in `hosts` is
/// preserved; the explicit shutdown/startup orders take precedence for
/// power operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterTopology {
    /// Hosts powered off in this order.
    pub shutdown_order: Vec<String>,
    /// Hosts woken and checked in this order.
    pub startup_order: Vec<String>,
    #[serde(default)]
    pub power: PowerSettings,
    #[serde(default)]
    pub pacing: Pacing,
    #[serde(default)]
    pub ssh: SshSettings,
    pub hosts: Vec<HostEntry>,
    /// Host name -> NIC hardware address (or `unknown`).
    #[serde(default)]
    pub wol_addresses: BTreeMap<String, WakeAddress>,
    /// Cross-host bring-up order for containers.
    #[serde(default)]
    pub container_startup: Vec<ContainerEntry>,
    /// Containers that survive a keep-critical shutdown, by logical name.
    #[serde(default)]
    pub critical_containers: BTreeMap<String, ContainerLocation>,
}

/// A physical or hypervisor host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEntry {
    pub name: String,
    /// Address the executor connects to.
    pub address: String,
}

/// One slot in the container start priority list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerEntry {
    pub name: String,
    /// Address of the host running the container.
    pub host: String,
    pub id: ResourceId,
}

/// Where a critical container lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerLocation {
    pub host: String,
    pub id: ResourceId,
}

impl ClusterTopology {
    /// Load the topology from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read cluster config: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Invalid cluster config: {}", path.display()))
    }

    /// Parse and validate a topology from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        let topology: Self =
            toml::from_str(s).with_context(|| "Failed to parse cluster config TOML")?;
        topology.validate()?;
        Ok(topology)
    }

    fn validate(&self) -> Result<()> {
        if self.hosts.is_empty() {
            anyhow::bail!("Cluster config must have at least one [[hosts]] entry");
        }

        let mut names = HashSet::new();
        let mut addresses = HashSet::new();
        for host in &self.hosts {
            if host.name.trim().is_empty() || host.address.trim().is_empty() {
                anyhow::bail!("Host entries need a non-empty name and address");
            }
            if !names.insert(host.name.as_str()) {
                anyhow::bail!("Duplicate host name '{}' in hosts config", host.name);
            }
            if !addresses.insert(host.address.as_str()) {
                anyhow::bail!("Duplicate host address {} in hosts config", host.address);
            }
        }

        for (label, order) in [
            ("shutdown_order", &self.shutdown_order),
            ("startup_order", &self.startup_order),
        ] {
            let mut seen = HashSet::new();
            for name in order {
                if !names.contains(name.as_str()) {
                    anyhow::bail!("{} references unknown host '{}'", label, name);
                }
                if !seen.insert(name.as_str()) {
                    anyhow::bail!("{} lists host '{}' more than once", label, name);
                }
            }
        }

        for name in self.wol_addresses.keys() {
            if !names.contains(name.as_str()) {
                anyhow::bail!("wol_addresses references unknown host '{}'", name);
            }
        }

        for entry in &self.container_startup {
            if !addresses.contains(entry.host.as_str()) {
                anyhow::bail!(
                    "Container '{}' in container_startup references unknown host address {}",
                    entry.name,
                    entry.host
                );
            }
        }

        for (name, location) in &self.critical_containers {
            if !addresses.contains(location.host.as_str()) {
                anyhow::bail!(
                    "Critical container '{}' references unknown host address {}",
                    name,
                    location.host
                );
            }
        }

        if self.power.confirmation_ttl_secs == 0 {
            anyhow::bail!("power.confirmation_ttl_secs must be greater than zero");
        }
        if self.power.wake_timeout_secs == 0 || self.power.wake_poll_interval_secs == 0 {
            anyhow::bail!("power.wake_timeout_secs and wake_poll_interval_secs must be non-zero");
        }
        if self.power.wake_poll_interval_secs > self.power.wake_timeout_secs {
            anyhow::bail!(
                "power.wake_poll_interval_secs ({}) exceeds wake_timeout_secs ({})",
                self.power.wake_poll_interval_secs,
                self.power.wake_timeout_secs
            );
        }
        Ok(())
    }

    pub fn host(&self, name: &str) -> Option<&HostEntry> {
        self.hosts.iter().find(|h| h.name == name)
    }

    /// Reverse lookup: which host owns this address.
    pub fn host_by_address(&self, address: &str) -> Option<&HostEntry> {
        self.hosts.iter().find(|h| h.address == address)
    }

    /// Wake address for a host. Hosts missing from `wol_addresses` are
    /// treated the same as the `unknown` sentinel.
    pub fn wake_address(&self, name: &str) -> WakeAddress {
        self.wol_addresses
            .get(name)
            .copied()
            .unwrap_or(WakeAddress::Unknown)
    }

    /// Hosts in shutdown order.
    pub fn shutdown_hosts(&self) -> impl Iterator<Item = &HostEntry> {
        self.shutdown_order.iter().filter_map(|name| self.host(name))
    }

    /// Hosts in startup order.
    pub fn startup_hosts(&self) -> impl Iterator<Item = &HostEntry> {
        self.startup_order.iter().filter_map(|name| self.host(name))
    }

    pub fn shutdown_position(&self, name: &str) -> Option<usize> {
        self.shutdown_order.iter().position(|n| n == name)
    }

    pub fn startup_position(&self, name: &str) -> Option<usize> {
        self.startup_order.iter().position(|n| n == name)
    }
}
