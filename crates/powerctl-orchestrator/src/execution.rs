use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use powerctl_core::remote::{PowerAction, RemoteExecutor, RemoteOutcome};
use powerctl_core::settings::{Pacing, PowerSettings};
use powerctl_core::topology::ClusterTopology;

use crate::report::PowerOperationReport;
use crate::surface::{NotificationSurface, SurfaceHandle};

/// Everything one approved run needs. Lives for exactly one continuation.
pub(crate) struct RunContext<'a> {
    pub topology: &'a ClusterTopology,
    pub executor: &'a dyn RemoteExecutor,
    pub power: &'a PowerSettings,
    pub pacing: &'a Pacing,
    surface: &'a dyn NotificationSurface,
    handle: &'a SurfaceHandle,
    pub report: PowerOperationReport,
}

impl<'a> RunContext<'a> {
    pub fn new(
        topology: &'a ClusterTopology,
        executor: &'a dyn RemoteExecutor,
        power: &'a PowerSettings,
        pacing: &'a Pacing,
        surface: &'a dyn NotificationSurface,
        handle: &'a SurfaceHandle,
        report: PowerOperationReport,
    ) -> Self {
        Self {
            topology,
            executor,
            power,
            pacing,
            surface,
            handle,
            report,
        }
    }

    /// Push the current phase and counters. Awaited in sequence, so updates
    /// arrive in order; failures are logged and the run continues.
    pub async fn progress(&self, phase: &str) {
        let text = self.report.progress_line(phase);
        if let Err(e) = self.surface.update_progress(self.handle, &text).await {
            warn!(handle = %self.handle, error = %format!("{:#}", e), "Progress update failed");
        }
    }

    /// Run one action, logging the outcome. Accounting is left to the caller.
    pub async fn apply(&self, target: &str, action: &PowerAction) -> RemoteOutcome {
        let outcome = self.executor.execute(target, action).await;
        if outcome.succeeded {
            info!(target, action = action.verb(), "Action succeeded");
        } else {
            warn!(
                target,
                action = action.verb(),
                diagnostic = %outcome.diagnostic.trim(),
                "Action failed"
            );
        }
        outcome
    }
}

/// Spaces out consecutive remote calls of one tier.
pub(crate) struct Pacer {
    pause: Duration,
    primed: bool,
}

impl Pacer {
    pub fn new(pause: Duration) -> Self {
        Self {
            pause,
            primed: false,
        }
    }

    /// Call before each remote action. The first call returns immediately.
    pub async fn ready(&mut self) {
        if self.primed && !self.pause.is_zero() {
            sleep(self.pause).await;
        }
        self.primed = true;
    }
}

/// Poll a host until it answers or `timeout` elapses.
pub(crate) async fn wait_for_online(
    executor: &dyn RemoteExecutor,
    address: &str,
    timeout: Duration,
    poll_interval: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        if executor.is_host_online(address).await {
            debug!(address, attempt, "Host answered");
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        debug!(address, attempt, "Host not online yet");
        sleep(poll_interval.min(deadline - now)).await;
    }
}
