//! Startup: wake hosts, wait for them, start containers by priority, then VMs.

use tracing::{debug, info, warn};

use powerctl_core::remote::{PowerAction, PowerState, Tier};
use powerctl_core::topology::HostEntry;

use crate::execution::{Pacer, RunContext, wait_for_online};

/// What the wake phase did for a host. Drives the wait phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WakeState {
    AlreadyOnline,
    WakeSent,
    /// No usable wake address; already counted as a failure.
    Unwakeable,
}

pub(crate) async fn run(ctx: &mut RunContext<'_>) {
    let hosts = wake_hosts(ctx).await;
    wait_for_hosts(ctx, &hosts).await;
    start_containers(ctx).await;
    start_vms(ctx).await;
}

async fn wake_hosts<'t>(ctx: &mut RunContext<'t>) -> Vec<(&'t HostEntry, WakeState)> {
    let mut pacer = Pacer::new(ctx.pacing.wake());
    let topology = ctx.topology;
    let mut states = Vec::new();

    for host in topology.startup_hosts() {
        if ctx.executor.is_host_online(&host.address).await {
            debug!(host = %host.name, "Host already online");
            states.push((host, WakeState::AlreadyOnline));
            continue;
        }

        let Some(mac) = topology.wake_address(&host.name).mac() else {
            warn!(host = %host.name, "No wake address configured");
            ctx.report
                .fail(Tier::Hosts, format!("{} (no address)", host.name));
            states.push((host, WakeState::Unwakeable));
            continue;
        };

        pacer.ready().await;
        ctx.progress(&format!("Sending wake signal to {}...", host.name))
            .await;
        info!(host = %host.name, %mac, "Sending wake signal");
        let outcome = ctx
            .executor
            .execute(&ctx.power.wake_broadcast, &PowerAction::SendWake(mac))
            .await;
        if !outcome.succeeded {
            // The wait phase decides whether the host made it.
            warn!(host = %host.name, diagnostic = %outcome.diagnostic, "Wake signal not sent");
        }
        states.push((host, WakeState::WakeSent));
    }
    states
}

async fn wait_for_hosts(ctx: &mut RunContext<'_>, hosts: &[(&HostEntry, WakeState)]) {
    for (host, state) in hosts {
        match state {
            WakeState::AlreadyOnline => ctx.report.succeed(Tier::Hosts),
            WakeState::Unwakeable => {}
            WakeState::WakeSent => {
                ctx.progress(&format!("Waiting for {} to come online...", host.name))
                    .await;
                let online = wait_for_online(
                    ctx.executor,
                    &host.address,
                    ctx.power.wake_timeout(),
                    ctx.power.wake_poll_interval(),
                )
                .await;
                if online {
                    info!(host = %host.name, "Host online");
                    ctx.report.succeed(Tier::Hosts);
                } else {
                    warn!(host = %host.name, timeout_secs = ctx.power.wake_timeout_secs, "Host did not come online");
                    ctx.report
                        .fail(Tier::Hosts, format!("{} (timeout)", host.name));
                }
            }
        }
    }
}

async fn start_containers(ctx: &mut RunContext<'_>) {
    let mut pacer = Pacer::new(ctx.pacing.container_start());
    ctx.progress("Starting containers...").await;

    for entry in &ctx.topology.container_startup {
        if !ctx.executor.is_host_online(&entry.host).await {
            warn!(container = %entry.name, address = %entry.host, "Container host offline");
            ctx.report
                .fail(Tier::Containers, format!("{} (host offline)", entry.name));
            continue;
        }

        let running = ctx.executor.running_containers(&entry.host).await;
        if running.iter().any(|ct| ct.id == entry.id) {
            debug!(container = %entry.name, "Container already running");
            continue;
        }

        pacer.ready().await;
        debug!(container = %entry.name, id = %entry.id, address = %entry.host, "Starting container");
        let outcome = ctx
            .apply(&entry.host, &PowerAction::StartContainer(entry.id.clone()))
            .await;
        ctx.report.record(
            Tier::Containers,
            format!("{} ({})", entry.name, entry.id),
            &outcome,
        );
    }
}

async fn start_vms(ctx: &mut RunContext<'_>) {
    let mut pacer = Pacer::new(ctx.pacing.vm_start());

    for host in ctx.topology.startup_hosts() {
        if !ctx.executor.is_host_online(&host.address).await {
            debug!(host = %host.name, "Host offline, skipping its VMs");
            continue;
        }

        ctx.progress(&format!("Starting VMs on {}...", host.name))
            .await;
        for vm in ctx.executor.all_vms(&host.address).await {
            if vm.state == PowerState::Running {
                continue;
            }
            pacer.ready().await;
            let vm = vm.resource();
            debug!(host = %host.name, vm = %vm.label(), "Starting VM");
            let outcome = ctx
                .apply(&host.address, &PowerAction::StartVm(vm.id.clone()))
                .await;
            ctx.report.record(Tier::Vms, vm.label(), &outcome);
        }
    }
}
