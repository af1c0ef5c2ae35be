//! Tiered shutdown: VMs, then containers, then hosts, each in shutdown order.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use powerctl_core::remote::{PowerAction, ResourceId, Tier};
use powerctl_core::topology::ClusterTopology;

use crate::execution::{Pacer, RunContext};
use crate::report::PowerOperationReport;

/// Resources a shutdown must leave running.
#[derive(Debug, Default)]
pub(crate) struct Exclusions {
    /// Host addresses kept online.
    hosts: HashSet<String>,
    /// (host address, container id) -> logical name.
    containers: HashMap<(String, ResourceId), String>,
}

impl Exclusions {
    pub fn none() -> Self {
        Self::default()
    }

    /// Keep every critical container and every host that runs one.
    pub fn critical(topology: &ClusterTopology) -> Self {
        let mut exclusions = Self::default();
        for (name, loc) in &topology.critical_containers {
            exclusions.hosts.insert(loc.host.clone());
            exclusions
                .containers
                .insert((loc.host.clone(), loc.id.clone()), name.clone());
        }
        exclusions
    }

    pub fn keeps_host(&self, address: &str) -> bool {
        self.hosts.contains(address)
    }

    pub fn kept_container(&self, address: &str, id: &ResourceId) -> Option<&str> {
        self.containers
            .get(&(address.to_string(), id.clone()))
            .map(String::as_str)
    }

    /// Logical names of kept containers, sorted.
    pub fn container_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.containers.values().cloned().collect();
        names.sort();
        names
    }

    /// Record every exclusion as a skip before any tier runs.
    pub fn record(&self, topology: &ClusterTopology, report: &mut PowerOperationReport) {
        let mut by_host: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (name, loc) in &topology.critical_containers {
            if self.containers.contains_key(&(loc.host.clone(), loc.id.clone())) {
                report.skip(Tier::Containers, name.as_str(), "critical container");
                by_host.entry(loc.host.as_str()).or_default().push(name);
            }
        }
        for (address, names) in by_host {
            let label = topology
                .host_by_address(address)
                .map_or(address, |h| h.name.as_str());
            report.skip(
                Tier::Hosts,
                label,
                format!("hosts critical container {}", names.join(", ")),
            );
        }
    }
}

pub(crate) async fn run(ctx: &mut RunContext<'_>, exclusions: &Exclusions) {
    exclusions.record(ctx.topology, &mut ctx.report);
    stop_vms(ctx, exclusions).await;
    stop_containers(ctx, exclusions).await;
    shutdown_hosts(ctx, exclusions).await;
}

async fn stop_vms(ctx: &mut RunContext<'_>, exclusions: &Exclusions) {
    let mut pacer = Pacer::new(ctx.pacing.vm_stop());

    for host in ctx.topology.shutdown_hosts() {
        if exclusions.keeps_host(&host.address) {
            debug!(host = %host.name, "Host kept online, leaving its VMs");
            continue;
        }
        if !ctx.executor.is_host_online(&host.address).await {
            debug!(host = %host.name, "Host offline, no VMs to stop");
            continue;
        }

        ctx.progress(&format!("Stopping VMs on {}...", host.name)).await;
        for vm in ctx.executor.running_vms(&host.address).await {
            pacer.ready().await;
            debug!(host = %host.name, vm = %vm.label(), "Stopping VM");
            let outcome = ctx
                .apply(&host.address, &PowerAction::StopVm(vm.id.clone()))
                .await;
            ctx.report.record(Tier::Vms, vm.label(), &outcome);
        }
    }
}

async fn stop_containers(ctx: &mut RunContext<'_>, exclusions: &Exclusions) {
    let mut pacer = Pacer::new(ctx.pacing.container_stop());
    ctx.progress("Stopping containers...").await;

    // Kept hosts are still walked: only their critical containers stay up.
    for host in ctx.topology.shutdown_hosts() {
        if !ctx.executor.is_host_online(&host.address).await {
            continue;
        }
        for ct in ctx.executor.running_containers(&host.address).await {
            if let Some(name) = exclusions.kept_container(&host.address, &ct.id) {
                debug!(host = %host.name, container = name, "Leaving critical container running");
                continue;
            }
            pacer.ready().await;
            debug!(host = %host.name, container = %ct.label(), "Stopping container");
            let outcome = ctx
                .apply(&host.address, &PowerAction::StopContainer(ct.id.clone()))
                .await;
            ctx.report.record(Tier::Containers, ct.label(), &outcome);
        }
    }
}

async fn shutdown_hosts(ctx: &mut RunContext<'_>, exclusions: &Exclusions) {
    let mut pacer = Pacer::new(ctx.pacing.host_shutdown());

    for host in ctx.topology.shutdown_hosts() {
        if exclusions.keeps_host(&host.address) {
            continue;
        }
        if !ctx.executor.is_host_online(&host.address).await {
            debug!(host = %host.name, "Host already offline");
            continue;
        }

        pacer.ready().await;
        ctx.progress(&format!("Shutting down {}...", host.name)).await;
        debug!(host = %host.name, address = %host.address, "Shutting down host");
        let outcome = ctx.apply(&host.address, &PowerAction::ShutdownHost).await;

        // The session dies with the host, so a dropped connection means it went down.
        if outcome.succeeded || outcome.connection_dropped() {
            ctx.report.succeed(Tier::Hosts);
        } else {
            ctx.report.fail(Tier::Hosts, host.name.clone());
        }
    }
}
