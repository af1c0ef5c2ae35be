use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep_until;
use tracing::{error, info, warn};

use powerctl_core::remote::RemoteExecutor;
use powerctl_core::settings::{Pacing, PowerSettings};
use powerctl_core::topology::ClusterTopology;

use crate::error::PowerError;
use crate::execution::RunContext;
use crate::gate::{ConfirmationGate, ConfirmationToken, Decision, GateResolution, IgnoreReason};
use crate::operation::OperationKind;
use crate::report::{FinalizedReport, PowerOperationReport};
use crate::shutdown::{self, Exclusions};
use crate::startup;
use crate::summary::{self, OperationSummary};
use crate::surface::{Closure, DecisionEvent, NotificationSurface, SurfaceHandle};

/// Continuation parked in the gate until someone decides.
struct PendingRun {
    kind: OperationKind,
    handle: SurfaceHandle,
}

/// Issued to the caller when a request is waiting for approval.
#[derive(Debug, Clone, Serialize)]
pub struct Ticket {
    pub token: ConfirmationToken,
    pub kind: OperationKind,
    pub handle: SurfaceHandle,
    pub expires_in_secs: u64,
    pub summary: OperationSummary,
}

/// What a decision led to.
#[derive(Debug)]
pub enum Resolution {
    Completed(FinalizedReport),
    Cancelled,
    Expired,
    Ignored(IgnoreReason),
    /// The run panicked before producing a report. The slot is released.
    Aborted,
}

struct Inner {
    topology: ClusterTopology,
    executor: Arc<dyn RemoteExecutor>,
    surface: Arc<dyn NotificationSurface>,
    power: PowerSettings,
    pacing: Pacing,
    gate: ConfirmationGate<PendingRun>,
}

/// Drives confirmation and execution of cluster power operations.
///
/// Cheap to clone; clones share one gate, so at most one operation is
/// pending or running across all of them.
#[derive(Clone)]
pub struct PowerOrchestrator {
    inner: Arc<Inner>,
}

impl PowerOrchestrator {
    /// Settings and pacing are taken from the topology.
    pub fn new(
        topology: ClusterTopology,
        executor: Arc<dyn RemoteExecutor>,
        surface: Arc<dyn NotificationSurface>,
    ) -> Self {
        let power = topology.power.clone();
        let pacing = topology.pacing.clone();
        Self::with_settings(topology, executor, surface, power, pacing)
    }

    pub fn with_settings(
        topology: ClusterTopology,
        executor: Arc<dyn RemoteExecutor>,
        surface: Arc<dyn NotificationSurface>,
        power: PowerSettings,
        pacing: Pacing,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                topology,
                executor,
                surface,
                power,
                pacing,
                gate: ConfirmationGate::new(),
            }),
        }
    }

    pub fn topology(&self) -> &ClusterTopology {
        &self.inner.topology
    }

    /// Pre-flight summary. Read-only; safe to call at any time.
    pub async fn summarize(&self, kind: OperationKind) -> OperationSummary {
        summary::build(
            &self.inner.topology,
            self.inner.executor.as_ref(),
            &self.inner.power,
            kind,
        )
        .await
    }

    /// Kind of the operation currently pending or running.
    pub async fn busy(&self) -> Option<OperationKind> {
        self.inner.gate.busy().await
    }

    /// Present a summary and open a confirmation for `requester`.
    ///
    /// Rejected with [`PowerError::AlreadyInProgress`] while another
    /// request is pending or running. Must be called inside a tokio runtime:
    /// expiry is swept by a spawned timer.
    pub async fn request(
        &self,
        kind: OperationKind,
        requester: &str,
    ) -> Result<Ticket, PowerError> {
        self.sweep_expired().await;
        if let Some(busy) = self.busy().await {
            info!(%kind, %busy, requester, "Request rejected, operation in progress");
            return Err(PowerError::AlreadyInProgress { kind: busy });
        }

        let summary = self.summarize(kind).await;
        let handle = self
            .inner
            .surface
            .present_summary(&summary.title, &summary.body())
            .await
            .map_err(PowerError::Surface)?;

        let ttl = self.inner.power.confirmation_ttl();
        let pending = PendingRun {
            kind,
            handle: handle.clone(),
        };
        let opened = match self.inner.gate.open(kind, requester, pending, ttl).await {
            Ok(opened) => opened,
            Err(e) => {
                // Lost the race to another request after presenting.
                self.close(&handle, Closure::Rejected).await;
                return Err(e);
            }
        };

        let this = self.clone();
        tokio::spawn(async move {
            sleep_until(opened.expires_at).await;
            this.sweep_expired().await;
        });

        Ok(Ticket {
            token: opened.token,
            kind,
            handle,
            expires_in_secs: ttl.as_secs(),
            summary,
        })
    }

    /// Apply a decision. On approval the operation runs to completion
    /// before this returns.
    ///
    /// The run itself is a spawned task: dropping this future does not stop
    /// it, and the run slot is released when it ends.
    pub async fn resolve(
        &self,
        token: ConfirmationToken,
        requester: &str,
        decision: Decision,
    ) -> Resolution {
        match self.inner.gate.resolve(token, requester, decision).await {
            GateResolution::Approved(run) => match self.spawn_run(run).await {
                Ok(Some(report)) => Resolution::Completed(report),
                Ok(None) => Resolution::Aborted,
                Err(e) => {
                    error!(error = %e, "Run supervisor failed");
                    Resolution::Aborted
                }
            },
            GateResolution::Cancelled(run) => {
                self.close(&run.handle, Closure::Cancelled).await;
                Resolution::Cancelled
            }
            GateResolution::Expired(run) => {
                self.close(&run.handle, Closure::Expired).await;
                Resolution::Expired
            }
            GateResolution::Ignored(reason) => Resolution::Ignored(reason),
        }
    }

    /// Route a surface event to the confirmation it refers to.
    pub async fn handle_event(&self, event: DecisionEvent) -> Resolution {
        let handle = event.handle.clone();
        let Some(token) = self
            .inner
            .gate
            .find_pending(|run| run.handle == handle)
            .await
        else {
            return Resolution::Ignored(IgnoreReason::UnknownToken);
        };
        self.resolve(token, &event.requester, event.decision).await
    }

    /// Consume decision events until the sender side closes. An approved
    /// run blocks the stream until it completes.
    pub async fn serve_events(&self, mut events: mpsc::Receiver<DecisionEvent>) {
        while let Some(event) = events.recv().await {
            let handle = event.handle.clone();
            match self.handle_event(event).await {
                Resolution::Completed(report) => {
                    info!(%handle, title = %report.title(), "Operation finished");
                }
                Resolution::Ignored(reason) => {
                    info!(%handle, ?reason, "Decision event ignored");
                }
                Resolution::Aborted => {
                    error!(%handle, "Operation aborted without a report");
                }
                Resolution::Cancelled | Resolution::Expired => {}
            }
        }
    }

    /// Expire a stale confirmation, if any. Returns true when one expired.
    pub async fn sweep_expired(&self) -> bool {
        match self.inner.gate.expire_stale().await {
            Some((token, run)) => {
                info!(%token, kind = %run.kind, "Pending confirmation expired");
                self.close(&run.handle, Closure::Expired).await;
                true
            }
            None => false,
        }
    }

    async fn close(&self, handle: &SurfaceHandle, closure: Closure) {
        if let Err(e) = self.inner.surface.present_closed(handle, closure).await {
            warn!(%handle, ?closure, error = %format!("{:#}", e), "Failed to present closure");
        }
    }

    /// Detach an approved run from the caller. The outer task owns the
    /// slot and frees it whether the run finishes or panics.
    fn spawn_run(&self, run: PendingRun) -> JoinHandle<Option<FinalizedReport>> {
        let this = self.clone();
        tokio::spawn(async move {
            let runner = this.clone();
            let kind = run.kind;
            let outcome = tokio::spawn(async move { runner.execute(run).await }).await;
            this.inner.gate.finish().await;
            match outcome {
                Ok(report) => Some(report),
                Err(e) => {
                    error!(%kind, error = %e, "Power operation panicked");
                    None
                }
            }
        })
    }

    async fn execute(&self, run: PendingRun) -> FinalizedReport {
        let inner = &*self.inner;
        info!(kind = %run.kind, handle = %run.handle, "Starting power operation");

        let mut ctx = RunContext::new(
            &inner.topology,
            inner.executor.as_ref(),
            &inner.power,
            &inner.pacing,
            inner.surface.as_ref(),
            &run.handle,
            PowerOperationReport::new(run.kind),
        );
        ctx.progress(run.kind.running_title()).await;

        match run.kind {
            OperationKind::FullShutdown => shutdown::run(&mut ctx, &Exclusions::none()).await,
            OperationKind::ShutdownKeepCritical => {
                let exclusions = Exclusions::critical(&inner.topology);
                shutdown::run(&mut ctx, &exclusions).await
            }
            OperationKind::FullStartup => startup::run(&mut ctx).await,
        }

        let report = ctx.report.finalize();
        info!(
            kind = %run.kind,
            clean = report.is_clean(),
            elapsed_secs = report.elapsed_secs,
            "Power operation finished"
        );
        if let Err(e) = inner
            .surface
            .present_final_report(&run.handle, &report)
            .await
        {
            error!(handle = %run.handle, error = %format!("{:#}", e), "Failed to present final report");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::{advance, sleep};

    use super::*;
    use crate::testing::{
        FakeCluster, RecordingSurface, SurfaceEvent, TWO_NODE, populated_cluster, topology,
    };

    struct Harness {
        orchestrator: PowerOrchestrator,
        cluster: Arc<FakeCluster>,
        surface: Arc<RecordingSurface>,
    }

    fn harness_with(cluster: FakeCluster, surface: RecordingSurface) -> Harness {
        let cluster = Arc::new(cluster);
        let surface = Arc::new(surface);
        let topo = topology(TWO_NODE);
        let power = topo.power.clone();
        let orchestrator = PowerOrchestrator::with_settings(
            topo,
            cluster.clone(),
            surface.clone(),
            power,
            Pacing::none(),
        );
        Harness {
            orchestrator,
            cluster,
            surface,
        }
    }

    fn harness() -> Harness {
        harness_with(populated_cluster(), RecordingSurface::new())
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_presents_summary_without_acting() {
        let h = harness();
        let ticket = h
            .orchestrator
            .request(OperationKind::FullShutdown, "alice")
            .await
            .unwrap();

        assert_eq!(ticket.expires_in_secs, 60);
        assert_eq!(ticket.summary.vm_count, 3);
        assert!(matches!(
            &h.surface.events()[0],
            SurfaceEvent::Summary { title, .. } if title == "Confirm Full Cluster Shutdown"
        ));
        assert!(h.cluster.actions().is_empty());
        assert_eq!(h.orchestrator.busy().await, Some(OperationKind::FullShutdown));
    }

    #[tokio::test(start_paused = true)]
    async fn test_approve_runs_and_reports() {
        let h = harness();
        let ticket = h
            .orchestrator
            .request(OperationKind::ShutdownKeepCritical, "alice")
            .await
            .unwrap();
        let resolution = h
            .orchestrator
            .resolve(ticket.token, "alice", Decision::Approve)
            .await;

        let Resolution::Completed(report) = resolution else {
            panic!("expected completion, got {:?}", resolution);
        };
        assert_eq!(report.hosts.skipped_labels(), vec!["node01"]);
        assert_eq!(h.surface.finals(), vec![report]);
        assert_eq!(
            h.surface.progress()[0].lines().next(),
            Some("Shutting Down (Keeping Critical Services)...")
        );
        assert_eq!(h.orchestrator.busy().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_never_runs() {
        let h = harness();
        let ticket = h
            .orchestrator
            .request(OperationKind::FullShutdown, "alice")
            .await
            .unwrap();
        let resolution = h
            .orchestrator
            .resolve(ticket.token, "alice", Decision::Cancel)
            .await;

        assert!(matches!(resolution, Resolution::Cancelled));
        assert_eq!(h.surface.closures(), vec![Closure::Cancelled]);
        assert!(h.cluster.actions().is_empty());
        assert!(h.surface.finals().is_empty());

        // Late approval on the same token is a no-op.
        let late = h
            .orchestrator
            .resolve(ticket.token, "alice", Decision::Approve)
            .await;
        assert!(matches!(late, Resolution::Ignored(IgnoreReason::UnknownToken)));
        assert!(h.cluster.actions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_closes_and_never_runs() {
        let h = harness();
        let ticket = h
            .orchestrator
            .request(OperationKind::FullShutdown, "alice")
            .await
            .unwrap();

        sleep(Duration::from_secs(61)).await;
        assert_eq!(h.surface.closures(), vec![Closure::Expired]);
        assert_eq!(h.orchestrator.busy().await, None);

        let resolution = h
            .orchestrator
            .resolve(ticket.token, "alice", Decision::Approve)
            .await;
        assert!(matches!(resolution, Resolution::Ignored(_)));
        assert!(h.surface.finals().is_empty());
        assert!(h.surface.progress().is_empty());
        assert!(h.cluster.actions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_approve_at_deadline_expires() {
        let h = harness();
        let ticket = h
            .orchestrator
            .request(OperationKind::FullStartup, "alice")
            .await
            .unwrap();

        // Jump the clock without letting the watcher run first.
        advance(Duration::from_secs(60)).await;
        let resolution = h
            .orchestrator
            .resolve(ticket.token, "alice", Decision::Approve)
            .await;
        assert!(matches!(
            resolution,
            Resolution::Expired | Resolution::Ignored(IgnoreReason::UnknownToken)
        ));
        assert_eq!(h.surface.closures(), vec![Closure::Expired]);
        assert!(h.surface.finals().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthorized_resolve_changes_nothing() {
        let h = harness();
        let ticket = h
            .orchestrator
            .request(OperationKind::FullShutdown, "alice")
            .await
            .unwrap();

        for decision in [Decision::Approve, Decision::Cancel] {
            let r = h.orchestrator.resolve(ticket.token, "mallory", decision).await;
            assert!(matches!(r, Resolution::Ignored(IgnoreReason::NotRequester)));
        }
        assert!(h.cluster.actions().is_empty());
        assert!(h.surface.closures().is_empty());

        let r = h
            .orchestrator
            .resolve(ticket.token, "alice", Decision::Approve)
            .await;
        assert!(matches!(r, Resolution::Completed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_request_rejected_while_pending() {
        let h = harness();
        h.orchestrator
            .request(OperationKind::FullShutdown, "alice")
            .await
            .unwrap();
        let err = h
            .orchestrator
            .request(OperationKind::FullStartup, "bob")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PowerError::AlreadyInProgress {
                kind: OperationKind::FullShutdown
            }
        ));
        assert_eq!(
            err.to_string(),
            "a full-shutdown operation is already in progress"
        );
        // Only the first summary was shown.
        assert_eq!(h.surface.events().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_rejected_while_running() {
        let cluster = populated_cluster();
        cluster.add_host("10.0.0.2", false);
        let h = harness_with(cluster, RecordingSurface::new());
        // Startup waits up to 300s for node02, so the run is in flight for a while.
        let ticket = h
            .orchestrator
            .request(OperationKind::FullStartup, "alice")
            .await
            .unwrap();

        let runner = h.orchestrator.clone();
        let run = tokio::spawn(async move {
            runner.resolve(ticket.token, "alice", Decision::Approve).await
        });
        sleep(Duration::from_secs(5)).await;

        let err = h
            .orchestrator
            .request(OperationKind::FullShutdown, "bob")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PowerError::AlreadyInProgress {
                kind: OperationKind::FullStartup
            }
        ));

        let Resolution::Completed(report) = run.await.unwrap() else {
            panic!("run should complete");
        };
        assert_eq!(report.kind, OperationKind::FullStartup);
        assert!(h.orchestrator.busy().await.is_none());
        h.orchestrator
            .request(OperationKind::FullShutdown, "bob")
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_broken_surface_opens_nothing() {
        let h = harness_with(populated_cluster(), RecordingSurface::broken());
        let err = h
            .orchestrator
            .request(OperationKind::FullShutdown, "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, PowerError::Surface(_)));
        assert_eq!(h.orchestrator.busy().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_route_by_handle() {
        let h = harness();
        let ticket = h
            .orchestrator
            .request(OperationKind::FullShutdown, "alice")
            .await
            .unwrap();

        let (tx, rx) = mpsc::channel(8);
        let server = h.orchestrator.clone();
        let serving = tokio::spawn(async move { server.serve_events(rx).await });

        tx.send(DecisionEvent {
            handle: SurfaceHandle::new("unrelated"),
            requester: "alice".to_string(),
            decision: Decision::Approve,
        })
        .await
        .unwrap();
        tx.send(DecisionEvent {
            handle: ticket.handle.clone(),
            requester: "bob".to_string(),
            decision: Decision::Approve,
        })
        .await
        .unwrap();
        tx.send(DecisionEvent {
            handle: ticket.handle.clone(),
            requester: "alice".to_string(),
            decision: Decision::Approve,
        })
        .await
        .unwrap();
        drop(tx);
        serving.await.unwrap();

        assert_eq!(h.surface.finals().len(), 1);
        assert_eq!(h.cluster.targets_of("shutdown-host").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_resolver_does_not_stop_run() {
        let cluster = populated_cluster();
        // node02 is off and never answers its wake packet.
        cluster.add_host("10.0.0.2", false);
        cluster.wakes_with("10.0.0.2", "aa:bb:cc:dd:ee:ff", Duration::from_secs(0));
        let h = harness_with(cluster, RecordingSurface::new());
        let ticket = h
            .orchestrator
            .request(OperationKind::FullStartup, "alice")
            .await
            .unwrap();

        let runner = h.orchestrator.clone();
        let run = tokio::spawn(async move {
            runner.resolve(ticket.token, "alice", Decision::Approve).await
        });
        sleep(Duration::from_secs(5)).await;
        run.abort();
        assert!(run.await.unwrap_err().is_cancelled());

        sleep(Duration::from_secs(3600)).await;
        assert_eq!(h.orchestrator.busy().await, None);
        let finals = h.surface.finals();
        assert_eq!(finals.len(), 1);
        assert_eq!(finals[0].hosts.failed, vec!["node02 (timeout)".to_string()]);
        h.orchestrator
            .request(OperationKind::FullShutdown, "bob")
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_approvals_run_once() {
        let h = harness();
        let ticket = h
            .orchestrator
            .request(OperationKind::FullShutdown, "alice")
            .await
            .unwrap();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let o = h.orchestrator.clone();
            tasks.push(tokio::spawn(async move {
                o.resolve(ticket.token, "alice", Decision::Approve).await
            }));
        }
        let mut completed = 0;
        for task in tasks {
            if let Resolution::Completed(_) = task.await.unwrap() {
                completed += 1;
            }
        }
        assert_eq!(completed, 1);
        assert_eq!(h.surface.finals().len(), 1);
    }
}
