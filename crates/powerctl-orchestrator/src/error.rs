use thiserror::Error;

use crate::operation::OperationKind;

/// Caller-facing failures of a power request. Item-level remote failures
/// are never errors; they end up in the run report.
#[derive(Debug, Error)]
pub enum PowerError {
    /// A confirmation is pending or a run is executing.
    #[error("a {kind} operation is already in progress")]
    AlreadyInProgress { kind: OperationKind },

    /// The summary could not be shown, so nobody can approve it.
    #[error("failed to present confirmation: {0:#}")]
    Surface(anyhow::Error),
}
