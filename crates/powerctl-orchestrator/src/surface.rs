use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::gate::Decision;
use crate::report::FinalizedReport;

/// Opaque id of one presentation on a surface (a message, a terminal
/// session, ...). Decision events refer back to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceHandle(String);

impl SurfaceHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SurfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Terminal states that end a request without running it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Closure {
    Cancelled,
    Expired,
    /// Another operation took the gate between summary and open.
    Rejected,
}

impl Closure {
    pub fn title(&self) -> &'static str {
        match self {
            Self::Cancelled => "Operation Cancelled",
            Self::Expired => "Operation Expired",
            Self::Rejected => "Operation Rejected",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Cancelled => "No changes were made.",
            Self::Expired => "Confirmation timed out. Run the command again.",
            Self::Rejected => "Another power operation is already in progress.",
        }
    }
}

/// Inbound approve/cancel signal from a surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionEvent {
    pub handle: SurfaceHandle,
    pub requester: String,
    pub decision: Decision,
}

/// Where summaries, progress and reports are shown to a human.
///
/// Errors are reported back but only `present_summary` failures abort a
/// request; the rest are logged by the orchestrator and the run goes on.
#[async_trait]
pub trait NotificationSurface: Send + Sync {
    async fn present_summary(&self, title: &str, body: &str) -> Result<SurfaceHandle>;

    async fn update_progress(&self, handle: &SurfaceHandle, text: &str) -> Result<()>;

    async fn present_final_report(
        &self,
        handle: &SurfaceHandle,
        report: &FinalizedReport,
    ) -> Result<()>;

    async fn present_closed(&self, handle: &SurfaceHandle, closure: Closure) -> Result<()>;
}
