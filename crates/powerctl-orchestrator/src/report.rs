use std::fmt::Write as _;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use powerctl_core::remote::{RemoteOutcome, Tier};
use powerctl_core::time::{format_elapsed, utc_now};

use crate::operation::OperationKind;

/// Failure labels shown per tier in a rendered report.
pub const MAX_FAILURES_SHOWN: usize = 3;

/// Something deliberately left alone, with the reason shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedItem {
    pub label: String,
    pub reason: String,
}

/// Outcome counts for one tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TierTally {
    pub total: usize,
    pub succeeded: usize,
    pub failed: Vec<String>,
    pub skipped: Vec<SkippedItem>,
}

impl TierTally {
    pub fn skipped_labels(&self) -> Vec<&str> {
        self.skipped.iter().map(|s| s.label.as_str()).collect()
    }
}

/// Per-run accumulator, owned by the executing continuation.
#[derive(Debug)]
pub struct PowerOperationReport {
    kind: OperationKind,
    started_at: String,
    started: Instant,
    hosts: TierTally,
    vms: TierTally,
    containers: TierTally,
}

impl PowerOperationReport {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            started_at: utc_now(),
            started: Instant::now(),
            hosts: TierTally::default(),
            vms: TierTally::default(),
            containers: TierTally::default(),
        }
    }

    pub fn tier(&self, tier: Tier) -> &TierTally {
        match tier {
            Tier::Hosts => &self.hosts,
            Tier::Vms => &self.vms,
            Tier::Containers => &self.containers,
        }
    }

    fn tier_mut(&mut self, tier: Tier) -> &mut TierTally {
        match tier {
            Tier::Hosts => &mut self.hosts,
            Tier::Vms => &mut self.vms,
            Tier::Containers => &mut self.containers,
        }
    }

    pub fn succeed(&mut self, tier: Tier) {
        let t = self.tier_mut(tier);
        t.total += 1;
        t.succeeded += 1;
    }

    /// Count an attempt that failed.
    pub fn fail(&mut self, tier: Tier, label: impl Into<String>) {
        let t = self.tier_mut(tier);
        t.total += 1;
        t.failed.push(label.into());
    }

    /// Record a skip. Skips never count toward `total`.
    pub fn skip(&mut self, tier: Tier, label: impl Into<String>, reason: impl Into<String>) {
        self.tier_mut(tier).skipped.push(SkippedItem {
            label: label.into(),
            reason: reason.into(),
        });
    }

    /// Account one remote outcome. Returns whether it counted as success.
    pub fn record(&mut self, tier: Tier, label: String, outcome: &RemoteOutcome) -> bool {
        if outcome.succeeded {
            self.succeed(tier);
        } else {
            self.fail(tier, label);
        }
        outcome.succeeded
    }

    /// Phase line plus running counters, for live progress.
    pub fn progress_line(&self, phase: &str) -> String {
        let mut line = phase.to_string();
        for tier in tier_order(self.kind) {
            let t = self.tier(tier);
            let _ = write!(line, "\n{}: {}/{}", tier, t.succeeded, t.total);
            if !t.failed.is_empty() {
                let _ = write!(line, " ({} failed)", t.failed.len());
            }
        }
        line
    }

    /// Close the report. Consumes the accumulator so nothing mutates it later.
    pub fn finalize(self) -> FinalizedReport {
        let completion = if [&self.hosts, &self.vms, &self.containers]
            .iter()
            .all(|t| t.failed.is_empty())
        {
            Completion::Clean
        } else {
            Completion::CompletedWithErrors
        };
        FinalizedReport {
            kind: self.kind,
            started_at: self.started_at,
            elapsed_secs: self.started.elapsed().as_secs(),
            completion,
            hosts: self.hosts,
            vms: self.vms,
            containers: self.containers,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Completion {
    Clean,
    CompletedWithErrors,
}

/// Immutable result of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalizedReport {
    pub kind: OperationKind,
    pub started_at: String,
    pub elapsed_secs: u64,
    pub completion: Completion,
    pub hosts: TierTally,
    pub vms: TierTally,
    pub containers: TierTally,
}

impl FinalizedReport {
    pub fn is_clean(&self) -> bool {
        self.completion == Completion::Clean
    }

    pub fn tier(&self, tier: Tier) -> &TierTally {
        match tier {
            Tier::Hosts => &self.hosts,
            Tier::Vms => &self.vms,
            Tier::Containers => &self.containers,
        }
    }

    pub fn title(&self) -> String {
        match self.completion {
            Completion::Clean => format!("{} Complete", self.kind.noun()),
            Completion::CompletedWithErrors => {
                format!("{} Completed with Errors", self.kind.noun())
            }
        }
    }

    pub fn render(&self) -> String {
        let order = tier_order(self.kind);
        let mut out = format!(
            "{}\nCompleted in {}\n",
            self.title(),
            format_elapsed(Duration::from_secs(self.elapsed_secs))
        );

        out.push('\n');
        for tier in order {
            let t = self.tier(tier);
            let _ = write!(out, "{}: {}/{}", tier, t.succeeded, t.total);
            if !t.skipped.is_empty() {
                let _ = write!(out, " ({} kept online)", t.skipped.len());
            }
            out.push('\n');
        }

        if !self.is_clean() {
            out.push_str("\nFailures\n");
            for tier in order {
                let failed = &self.tier(tier).failed;
                if failed.is_empty() {
                    continue;
                }
                let shown = failed[..failed.len().min(MAX_FAILURES_SHOWN)].join(", ");
                let _ = write!(out, "  {}: {}", tier, shown);
                if failed.len() > MAX_FAILURES_SHOWN {
                    let _ = write!(out, " and {} more", failed.len() - MAX_FAILURES_SHOWN);
                }
                out.push('\n');
            }
        }

        let kept: Vec<&SkippedItem> = order
            .iter()
            .flat_map(|tier| self.tier(*tier).skipped.iter())
            .collect();
        if !kept.is_empty() {
            out.push_str("\nKept Running\n");
            for item in kept {
                let _ = writeln!(out, "  {}: {}", item.label, item.reason);
            }
        }
        out
    }
}

/// Tiers in the order an operation touches them.
fn tier_order(kind: OperationKind) -> [Tier; 3] {
    if kind.is_shutdown() {
        [Tier::Vms, Tier::Containers, Tier::Hosts]
    } else {
        [Tier::Hosts, Tier::Containers, Tier::Vms]
    }
}
