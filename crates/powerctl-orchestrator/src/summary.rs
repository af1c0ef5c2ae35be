use std::fmt::Write as _;
use std::time::Duration;

use serde::Serialize;

use powerctl_core::remote::{PowerState, RemoteExecutor};
use powerctl_core::settings::PowerSettings;
use powerctl_core::time::format_elapsed;
use powerctl_core::topology::ClusterTopology;

use crate::operation::OperationKind;
use crate::shutdown::Exclusions;

/// Live state of one host at summary time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostStatus {
    pub name: String,
    pub address: String,
    pub online: bool,
    /// Left running by a keep-critical shutdown.
    pub kept: bool,
    pub wake_address: String,
    /// VM names the run will act on.
    pub vms: Vec<String>,
    /// Container names the run will act on.
    pub containers: Vec<String>,
}

/// Pre-flight description of an operation. Building one changes nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationSummary {
    pub kind: OperationKind,
    pub title: String,
    pub hosts: Vec<HostStatus>,
    /// Hosts the run will power off or wake.
    pub affected_hosts: Vec<String>,
    pub vm_count: usize,
    pub container_count: usize,
    pub kept_containers: Vec<String>,
    /// Hosts with no usable wake address that are off now (startup) or
    /// about to be powered off (shutdown).
    pub unwakeable: Vec<String>,
    pub steps: Vec<String>,
    pub confirmation_ttl_secs: u64,
}

pub(crate) async fn build(
    topology: &ClusterTopology,
    executor: &dyn RemoteExecutor,
    power: &PowerSettings,
    kind: OperationKind,
) -> OperationSummary {
    let mut summary = OperationSummary {
        kind,
        title: kind.confirm_title().to_string(),
        hosts: Vec::new(),
        affected_hosts: Vec::new(),
        vm_count: 0,
        container_count: 0,
        kept_containers: Vec::new(),
        unwakeable: Vec::new(),
        steps: Vec::new(),
        confirmation_ttl_secs: power.confirmation_ttl_secs,
    };
    if kind.is_shutdown() {
        shutdown_view(&mut summary, topology, executor).await;
    } else {
        startup_view(&mut summary, topology, executor, power).await;
    }
    summary
}

async fn shutdown_view(
    summary: &mut OperationSummary,
    topology: &ClusterTopology,
    executor: &dyn RemoteExecutor,
) {
    let exclusions = match summary.kind {
        OperationKind::ShutdownKeepCritical => Exclusions::critical(topology),
        _ => Exclusions::none(),
    };
    summary.kept_containers = exclusions.container_names();

    for host in topology.shutdown_hosts() {
        let online = executor.is_host_online(&host.address).await;
        let kept = exclusions.keeps_host(&host.address);
        let mut status = HostStatus {
            name: host.name.clone(),
            address: host.address.clone(),
            online,
            kept,
            wake_address: topology.wake_address(&host.name).to_string(),
            vms: Vec::new(),
            containers: Vec::new(),
        };

        if online {
            if !kept {
                status.vms = executor
                    .running_vms(&host.address)
                    .await
                    .into_iter()
                    .map(|vm| vm.name)
                    .collect();
                summary.affected_hosts.push(host.name.clone());
                if topology.wake_address(&host.name).mac().is_none() {
                    summary.unwakeable.push(host.name.clone());
                }
            }
            status.containers = executor
                .running_containers(&host.address)
                .await
                .into_iter()
                .filter(|ct| exclusions.kept_container(&host.address, &ct.id).is_none())
                .map(|ct| ct.name)
                .collect();
        }

        summary.vm_count += status.vms.len();
        summary.container_count += status.containers.len();
        summary.hosts.push(status);
    }

    summary.steps = match summary.kind {
        OperationKind::ShutdownKeepCritical => vec![
            "Stop VMs on hosts being shut down".to_string(),
            "Stop all containers except critical ones".to_string(),
            "Shut down the remaining hosts".to_string(),
        ],
        _ => vec![
            "Stop all VMs (gracefully)".to_string(),
            "Stop all containers".to_string(),
            "Shut down all hosts".to_string(),
        ],
    };
}

async fn startup_view(
    summary: &mut OperationSummary,
    topology: &ClusterTopology,
    executor: &dyn RemoteExecutor,
    power: &PowerSettings,
) {
    for host in topology.startup_hosts() {
        let online = executor.is_host_online(&host.address).await;
        let wake = topology.wake_address(&host.name);
        let mut status = HostStatus {
            name: host.name.clone(),
            address: host.address.clone(),
            online,
            kept: false,
            wake_address: wake.to_string(),
            vms: Vec::new(),
            containers: Vec::new(),
        };

        if online {
            status.vms = executor
                .all_vms(&host.address)
                .await
                .into_iter()
                .filter(|vm| vm.state != PowerState::Running)
                .map(|vm| vm.name)
                .collect();
        } else {
            summary.affected_hosts.push(host.name.clone());
            if wake.mac().is_none() {
                summary.unwakeable.push(host.name.clone());
            }
        }
        summary.vm_count += status.vms.len();
        summary.hosts.push(status);
    }
    summary.container_count = topology.container_startup.len();

    let mut containers_step = "Start containers in priority order".to_string();
    if let Some(first) = topology.container_startup.first() {
        let _ = write!(containers_step, " ({} first)", first.name);
    }
    summary.steps = vec![
        "Send wake signal to offline hosts".to_string(),
        format!(
            "Wait for hosts to come online (up to {} each)",
            format_elapsed(power.wake_timeout())
        ),
        containers_step,
        "Start all VMs".to_string(),
    ];
}

impl OperationSummary {
    pub fn online_hosts(&self) -> Vec<&str> {
        self.hosts
            .iter()
            .filter(|h| h.online)
            .map(|h| h.name.as_str())
            .collect()
    }

    pub fn offline_hosts(&self) -> Vec<&str> {
        self.hosts
            .iter()
            .filter(|h| !h.online)
            .map(|h| h.name.as_str())
            .collect()
    }

    /// Human-readable body for the approval prompt.
    pub fn body(&self) -> String {
        let mut out = String::new();
        if self.kind.is_shutdown() {
            self.shutdown_body(&mut out);
        } else {
            self.startup_body(&mut out);
        }

        out.push_str("\nOrder:\n");
        for (i, step) in self.steps.iter().enumerate() {
            let _ = writeln!(out, "{}. {}", i + 1, step);
        }

        if !self.unwakeable.is_empty() {
            let _ = writeln!(
                out,
                "\nWarning: no wake address for {}. These hosts cannot be woken.",
                self.unwakeable.join(", ")
            );
        }
        let _ = write!(
            out,
            "\nApprove within {} or the request expires.",
            format_elapsed(Duration::from_secs(self.confirmation_ttl_secs))
        );
        out
    }

    fn shutdown_body(&self, out: &mut String) {
        out.push_str("Will be stopped:\n");
        let _ = writeln!(out, "- {} VMs", self.vm_count);
        let _ = writeln!(out, "- {} containers", self.container_count);
        let _ = writeln!(
            out,
            "- {} hosts ({})",
            self.affected_hosts.len(),
            list_or_none(&self.affected_hosts)
        );

        for host in &self.hosts {
            if !host.online {
                let _ = writeln!(out, "\n{} ({}): offline", host.name, host.address);
                continue;
            }
            if host.vms.is_empty() && host.containers.is_empty() {
                continue;
            }
            let _ = writeln!(out, "\n{} ({})", host.name, host.address);
            if !host.vms.is_empty() {
                let _ = writeln!(out, "  VMs: {}", host.vms.join(", "));
            }
            if !host.containers.is_empty() {
                let _ = writeln!(out, "  Containers: {}", host.containers.join(", "));
            }
        }

        if self.kind == OperationKind::ShutdownKeepCritical {
            out.push_str("\nKept running:\n");
            for name in &self.kept_containers {
                let _ = writeln!(out, "- {} (critical container)", name);
            }
            for host in self.hosts.iter().filter(|h| h.kept) {
                let _ = writeln!(out, "- {} ({}), critical host", host.name, host.address);
            }
        } else {
            out.push_str("\nEverything will be offline. Run `powerctl startup` to bring it back.\n");
        }
    }

    fn startup_body(&self, out: &mut String) {
        out.push_str("Current status:\n");
        let _ = writeln!(out, "- Online: {}", list_or_none(&self.online_hosts()));
        let _ = writeln!(out, "- Offline: {}", list_or_none(&self.offline_hosts()));
        let _ = writeln!(
            out,
            "\nWill be started:\n- {} containers\n- {} stopped VMs on online hosts",
            self.container_count, self.vm_count
        );
    }
}

fn list_or_none<S: AsRef<str>>(items: &[S]) -> String {
    if items.is_empty() {
        "None".to_string()
    } else {
        items
            .iter()
            .map(|s| s.as_ref())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCluster, TWO_NODE, populated_cluster, topology};

    #[tokio::test]
    async fn test_full_shutdown_counts() {
        let topo = topology(TWO_NODE);
        let cluster = populated_cluster();
        let summary = build(&topo, &cluster, &topo.power, OperationKind::FullShutdown).await;

        assert_eq!(summary.vm_count, 3);
        assert_eq!(summary.container_count, 3);
        assert_eq!(summary.affected_hosts, vec!["node02", "node01"]);
        assert!(summary.kept_containers.is_empty());

        let body = summary.body();
        assert!(body.contains("- 3 VMs\n"));
        assert!(body.contains("node02 (10.0.0.2)\n  VMs: web, db\n  Containers: media"));
        assert!(body.contains("1. Stop all VMs (gracefully)"));
        assert!(body.ends_with("Approve within 1m 0s or the request expires."));
    }

    #[tokio::test]
    async fn test_keep_critical_excludes_kept() {
        let topo = topology(TWO_NODE);
        let cluster = populated_cluster();
        let summary =
            build(&topo, &cluster, &topo.power, OperationKind::ShutdownKeepCritical).await;

        // router on node01 stays, pihole stays; unifi and media stop.
        assert_eq!(summary.vm_count, 2);
        assert_eq!(summary.container_count, 2);
        assert_eq!(summary.affected_hosts, vec!["node02"]);
        assert_eq!(summary.kept_containers, vec!["pi-hole"]);

        let body = summary.body();
        assert!(body.contains("- pi-hole (critical container)"));
        assert!(body.contains("- node01 (10.0.0.1), critical host"));
        assert!(!body.contains("pihole"));
    }

    #[tokio::test]
    async fn test_shutdown_flags_hosts_that_cannot_be_woken() {
        let toml = TWO_NODE
            .replace("node01 = \"aa:bb:cc:dd:ee:01\"", "node01 = \"unknown\"")
            .replace("node02 = \"aa:bb:cc:dd:ee:02\"", "");
        let topo = topology(&toml);
        let cluster = populated_cluster();

        let full = build(&topo, &cluster, &topo.power, OperationKind::FullShutdown).await;
        assert_eq!(full.unwakeable, vec!["node02", "node01"]);
        assert!(full.body().contains("Warning: no wake address for node02, node01."));

        // node01 stays up under keep-critical, so only node02 is at risk.
        let kept =
            build(&topo, &cluster, &topo.power, OperationKind::ShutdownKeepCritical).await;
        assert_eq!(kept.unwakeable, vec!["node02"]);
    }

    #[tokio::test]
    async fn test_summary_has_no_side_effects() {
        let topo = topology(TWO_NODE);
        let cluster = populated_cluster();
        for kind in [
            OperationKind::FullShutdown,
            OperationKind::ShutdownKeepCritical,
            OperationKind::FullStartup,
        ] {
            build(&topo, &cluster, &topo.power, kind).await;
            build(&topo, &cluster, &topo.power, kind).await;
        }
        assert!(cluster.actions().is_empty());
    }

    #[tokio::test]
    async fn test_startup_flags_unwakeable_offline_hosts() {
        let toml = TWO_NODE.replace("node02 = \"aa:bb:cc:dd:ee:02\"", "node02 = \"unknown\"");
        let topo = topology(&toml);
        let cluster = FakeCluster::new();
        cluster.add_host("10.0.0.1", true);
        cluster.add_host("10.0.0.2", false);
        cluster.add_vm("10.0.0.1", 101, "router", PowerState::Stopped);

        let summary = build(&topo, &cluster, &topo.power, OperationKind::FullStartup).await;

        assert_eq!(summary.unwakeable, vec!["node02"]);
        assert_eq!(summary.affected_hosts, vec!["node02"]);
        assert_eq!(summary.vm_count, 1);
        assert_eq!(summary.container_count, 2);

        let body = summary.body();
        assert!(body.contains("- Online: node01\n- Offline: node02"));
        assert!(body.contains("up to 5m 0s each"));
        assert!(body.contains("(pi-hole first)"));
        assert!(body.contains("Warning: no wake address for node02."));
    }

    #[tokio::test]
    async fn test_online_host_without_address_is_not_flagged() {
        let toml = TWO_NODE.replace("node01 = \"aa:bb:cc:dd:ee:01\"", "");
        let topo = topology(&toml);
        let cluster = populated_cluster();
        let summary = build(&topo, &cluster, &topo.power, OperationKind::FullStartup).await;
        assert!(summary.unwakeable.is_empty());
        assert_eq!(summary.hosts[0].wake_address, "unknown");
    }
}
