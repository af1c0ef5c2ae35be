//! In-memory cluster and surface doubles for orchestrator tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::time::Instant;

use powerctl_core::mac::MacAddress;
use powerctl_core::remote::{
    PowerAction, PowerState, RemoteExecutor, RemoteOutcome, Resource, ResourceId, VmEntry,
};
use powerctl_core::topology::ClusterTopology;

use crate::report::FinalizedReport;
use crate::surface::{Closure, NotificationSurface, SurfaceHandle};

#[derive(Default)]
struct FakeHost {
    online: bool,
    boot_at: Option<Instant>,
    /// Boot delay applied when a wake packet for `mac` arrives.
    wake: Option<(MacAddress, Duration)>,
    vms: Vec<(Resource, PowerState)>,
    containers: Vec<(Resource, PowerState)>,
}

impl FakeHost {
    fn online(&mut self) -> bool {
        if let Some(at) = self.boot_at
            && Instant::now() >= at
        {
            self.online = true;
            self.boot_at = None;
        }
        self.online
    }
}

#[derive(Default)]
struct FakeState {
    hosts: HashMap<String, FakeHost>,
    scripted: Vec<(String, PowerAction, RemoteOutcome)>,
    actions: Vec<(String, PowerAction)>,
}

/// Scripted cluster: hosts keyed by address, guests that change state when
/// stopped or started, and a log of every action executed.
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<FakeState>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_host<R>(&self, address: &str, f: impl FnOnce(&mut FakeHost) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(state.hosts.entry(address.to_string()).or_default())
    }

    pub fn add_host(&self, address: &str, online: bool) {
        self.with_host(address, |h| h.online = online);
    }

    /// Bring an offline host up on its own after `delay`.
    pub fn boot_in(&self, address: &str, delay: Duration) {
        self.with_host(address, |h| h.boot_at = Some(Instant::now() + delay));
    }

    /// Host boots `delay` after a wake packet for `mac` is sent.
    pub fn wakes_with(&self, address: &str, mac: &str, delay: Duration) {
        let mac: MacAddress = mac.parse().unwrap();
        self.with_host(address, |h| h.wake = Some((mac, delay)));
    }

    pub fn add_vm(&self, address: &str, id: u64, name: &str, state: PowerState) {
        self.with_host(address, |h| h.vms.push((Resource::new(id, name), state)));
    }

    pub fn add_container(&self, address: &str, id: u64, name: &str, state: PowerState) {
        self.with_host(address, |h| {
            h.containers.push((Resource::new(id, name), state))
        });
    }

    /// Return `outcome` (once) instead of simulating `action` on `target`.
    pub fn respond(&self, target: &str, action: PowerAction, outcome: RemoteOutcome) {
        self.state
            .lock()
            .unwrap()
            .scripted
            .push((target.to_string(), action, outcome));
    }

    pub fn fail(&self, target: &str, action: PowerAction) {
        self.respond(target, action, RemoteOutcome::failed("simulated failure"));
    }

    pub fn actions(&self) -> Vec<(String, PowerAction)> {
        self.state.lock().unwrap().actions.clone()
    }

    /// Targets of every action matching `verb`, in execution order.
    pub fn targets_of(&self, verb: &str) -> Vec<String> {
        self.actions()
            .into_iter()
            .filter(|(_, a)| a.verb() == verb)
            .map(|(t, _)| t)
            .collect()
    }

    pub fn is_online(&self, address: &str) -> bool {
        self.with_host(address, |h| h.online())
    }

    pub fn container_state(&self, address: &str, id: u64) -> PowerState {
        let id = ResourceId::from(id);
        self.with_host(address, |h| {
            h.containers
                .iter()
                .find(|(r, _)| r.id == id)
                .map(|(_, s)| *s)
                .unwrap_or(PowerState::Unknown)
        })
    }

    pub fn vm_state(&self, address: &str, id: u64) -> PowerState {
        let id = ResourceId::from(id);
        self.with_host(address, |h| {
            h.vms
                .iter()
                .find(|(r, _)| r.id == id)
                .map(|(_, s)| *s)
                .unwrap_or(PowerState::Unknown)
        })
    }
}

fn set_state(guests: &mut [(Resource, PowerState)], id: &ResourceId, to: PowerState) -> bool {
    match guests.iter_mut().find(|(r, _)| &r.id == id) {
        Some((_, state)) => {
            *state = to;
            true
        }
        None => false,
    }
}

fn running(guests: &[(Resource, PowerState)]) -> Vec<Resource> {
    guests
        .iter()
        .filter(|(_, s)| *s == PowerState::Running)
        .map(|(r, _)| r.clone())
        .collect()
}

#[async_trait]
impl RemoteExecutor for FakeCluster {
    async fn is_host_online(&self, address: &str) -> bool {
        self.is_online(address)
    }

    async fn running_vms(&self, address: &str) -> Vec<Resource> {
        self.with_host(address, |h| if h.online() { running(&h.vms) } else { Vec::new() })
    }

    async fn all_vms(&self, address: &str) -> Vec<VmEntry> {
        self.with_host(address, |h| {
            if !h.online() {
                return Vec::new();
            }
            h.vms
                .iter()
                .map(|(r, s)| VmEntry {
                    id: r.id.clone(),
                    name: r.name.clone(),
                    state: *s,
                })
                .collect()
        })
    }

    async fn running_containers(&self, address: &str) -> Vec<Resource> {
        self.with_host(address, |h| {
            if h.online() {
                running(&h.containers)
            } else {
                Vec::new()
            }
        })
    }

    async fn execute(&self, target: &str, action: &PowerAction) -> RemoteOutcome {
        let mut state = self.state.lock().unwrap();
        state.actions.push((target.to_string(), action.clone()));

        if let Some(pos) = state
            .scripted
            .iter()
            .position(|(t, a, _)| t == target && a == action)
        {
            return state.scripted.remove(pos).2;
        }

        if let PowerAction::SendWake(mac) = action {
            for host in state.hosts.values_mut() {
                if let Some((wake_mac, delay)) = host.wake
                    && wake_mac == *mac
                    && host.boot_at.is_none()
                {
                    host.boot_at = Some(Instant::now() + delay);
                }
            }
            return RemoteOutcome::ok();
        }

        let Some(host) = state.hosts.get_mut(target) else {
            return RemoteOutcome::failed(format!("ssh: connect to host {}: No route", target));
        };
        if !host.online() {
            return RemoteOutcome::failed("ssh: connect to host: Connection timed out");
        }
        let found = match action {
            PowerAction::StopVm(id) => set_state(&mut host.vms, id, PowerState::Stopped),
            PowerAction::StartVm(id) => set_state(&mut host.vms, id, PowerState::Running),
            PowerAction::StopContainer(id) => {
                set_state(&mut host.containers, id, PowerState::Stopped)
            }
            PowerAction::StartContainer(id) => {
                set_state(&mut host.containers, id, PowerState::Running)
            }
            PowerAction::ShutdownHost => {
                host.online = false;
                true
            }
            PowerAction::SendWake(_) => true,
        };
        if found {
            RemoteOutcome::ok()
        } else {
            RemoteOutcome::failed("no such guest")
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    Summary { title: String, body: String },
    Progress(String),
    Final(FinalizedReport),
    Closed(Closure),
}

/// Surface that records everything it is asked to show.
#[derive(Default)]
pub struct RecordingSurface {
    events: Mutex<Vec<SurfaceEvent>>,
    refuse_summary: bool,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// A surface whose `present_summary` always fails.
    pub fn broken() -> Self {
        Self {
            refuse_summary: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<SurfaceEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn progress(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SurfaceEvent::Progress(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn finals(&self) -> Vec<FinalizedReport> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SurfaceEvent::Final(report) => Some(report),
                _ => None,
            })
            .collect()
    }

    pub fn closures(&self) -> Vec<Closure> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SurfaceEvent::Closed(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: SurfaceEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl NotificationSurface for RecordingSurface {
    async fn present_summary(&self, title: &str, body: &str) -> Result<SurfaceHandle> {
        if self.refuse_summary {
            bail!("surface unavailable");
        }
        let mut events = self.events.lock().unwrap();
        events.push(SurfaceEvent::Summary {
            title: title.to_string(),
            body: body.to_string(),
        });
        Ok(SurfaceHandle::new(format!("msg-{}", events.len())))
    }

    async fn update_progress(&self, _handle: &SurfaceHandle, text: &str) -> Result<()> {
        self.push(SurfaceEvent::Progress(text.to_string()));
        Ok(())
    }

    async fn present_final_report(
        &self,
        _handle: &SurfaceHandle,
        report: &FinalizedReport,
    ) -> Result<()> {
        self.push(SurfaceEvent::Final(report.clone()));
        Ok(())
    }

    async fn present_closed(&self, _handle: &SurfaceHandle, closure: Closure) -> Result<()> {
        self.push(SurfaceEvent::Closed(closure));
        Ok(())
    }
}

/// Two hosts: A (node01, 10.0.0.1) runs critical container pi-hole (100),
/// B (node02, 10.0.0.2) runs general workloads.
pub const TWO_NODE: &str = r#"
shutdown_order = ["node02", "node01"]
startup_order = ["node01", "node02"]

[[hosts]]
name = "node01"
address = "10.0.0.1"

[[hosts]]
name = "node02"
address = "10.0.0.2"

[wol_addresses]
node01 = "aa:bb:cc:dd:ee:01"
node02 = "aa:bb:cc:dd:ee:02"

[[container_startup]]
name = "pi-hole"
host = "10.0.0.1"
id = 100

[[container_startup]]
name = "media"
host = "10.0.0.2"
id = 201

[critical_containers.pi-hole]
host = "10.0.0.1"
id = 100
"#;

pub fn topology(toml: &str) -> ClusterTopology {
    ClusterTopology::parse(toml).unwrap()
}

/// Both hosts online with a VM and containers each.
pub fn populated_cluster() -> FakeCluster {
    let cluster = FakeCluster::new();
    cluster.add_host("10.0.0.1", true);
    cluster.add_host("10.0.0.2", true);
    cluster.wakes_with("10.0.0.1", "aa:bb:cc:dd:ee:01", Duration::from_secs(40));
    cluster.wakes_with("10.0.0.2", "aa:bb:cc:dd:ee:02", Duration::from_secs(60));
    cluster.add_container("10.0.0.1", 100, "pihole", PowerState::Running);
    cluster.add_container("10.0.0.1", 110, "unifi", PowerState::Running);
    cluster.add_vm("10.0.0.1", 101, "router", PowerState::Running);
    cluster.add_container("10.0.0.2", 201, "media", PowerState::Running);
    cluster.add_vm("10.0.0.2", 202, "web", PowerState::Running);
    cluster.add_vm("10.0.0.2", 203, "db", PowerState::Running);
    cluster
}
