// powerctl-orchestrator: Confirmation gate, shutdown/startup algorithms, reports
// Depends on powerctl-core (topology, executor contract)

pub mod error;
pub mod gate;
pub mod operation;
pub mod orchestrator;
pub mod report;
pub mod summary;
pub mod surface;

mod execution;
mod shutdown;
mod startup;

#[cfg(test)]
mod testing;

pub use error::PowerError;
pub use gate::{ConfirmationGate, ConfirmationToken, Decision, IgnoreReason};
pub use operation::OperationKind;
pub use orchestrator::{PowerOrchestrator, Resolution, Ticket};
pub use report::{Completion, FinalizedReport, PowerOperationReport, SkippedItem, TierTally};
pub use summary::{HostStatus, OperationSummary};
pub use surface::{Closure, DecisionEvent, NotificationSurface, SurfaceHandle};
