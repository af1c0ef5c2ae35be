use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::PowerError;
use crate::operation::OperationKind;

/// Handle for one pending human approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfirmationToken(Uuid);

impl ConfirmationToken {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConfirmationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Cancel,
}

/// A request waiting for its requester to approve or cancel it.
struct PendingConfirmation<C> {
    token: ConfirmationToken,
    kind: OperationKind,
    requester: String,
    issued_at: Instant,
    expires_at: Instant,
    continuation: C,
}

impl<C> PendingConfirmation<C> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

enum GateState<C> {
    Idle,
    Pending(PendingConfirmation<C>),
    /// An approved continuation holds exclusive run rights.
    Running { kind: OperationKind },
}

/// Why a resolve attempt changed nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Token is not the one pending: already resolved, expired, or never issued.
    UnknownToken,
    /// Someone other than the original requester answered.
    NotRequester,
}

/// Outcome of a resolve attempt. Exactly one resolve per token ever sees
/// anything other than `Ignored`.
#[derive(Debug)]
pub enum GateResolution<C> {
    /// Caller now owns the continuation and the run slot; call
    /// [`ConfirmationGate::finish`] once it completes.
    Approved(C),
    Cancelled(C),
    Expired(C),
    Ignored(IgnoreReason),
}

/// Issued-token details handed back by [`ConfirmationGate::open`].
#[derive(Debug, Clone, Copy)]
pub struct Opened {
    pub token: ConfirmationToken,
    pub expires_at: Instant,
}

/// Holds zero or one pending approval and the "run in progress" slot.
///
/// Every transition happens under one mutex, so concurrent approvals,
/// cancellations, expiry sweeps and new requests are linearised and the
/// first event on a token wins. Terminal states never re-enter `Pending`.
pub struct ConfirmationGate<C> {
    state: Mutex<GateState<C>>,
}

impl<C> Default for ConfirmationGate<C> {
    fn default() -> Self {
        Self {
            state: Mutex::new(GateState::Idle),
        }
    }
}

impl<C> ConfirmationGate<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a pending confirmation. Rejected while another confirmation is
    /// pending or an approved run is still executing.
    pub async fn open(
        &self,
        kind: OperationKind,
        requester: &str,
        continuation: C,
        ttl: Duration,
    ) -> Result<Opened, PowerError> {
        let mut state = self.state.lock().await;
        if let Some(busy) = busy_kind(&state) {
            return Err(PowerError::AlreadyInProgress { kind: busy });
        }

        let issued_at = Instant::now();
        let pending = PendingConfirmation {
            token: ConfirmationToken::new(),
            kind,
            requester: requester.to_string(),
            issued_at,
            expires_at: issued_at + ttl,
            continuation,
        };
        let opened = Opened {
            token: pending.token,
            expires_at: pending.expires_at,
        };
        info!(token = %opened.token, %kind, requester, ttl_secs = ttl.as_secs(), "Confirmation opened");
        *state = GateState::Pending(pending);
        Ok(opened)
    }

    /// Apply a decision from `requester` to `token`.
    ///
    /// A decision arriving at or after the deadline expires the token
    /// instead of applying.
    pub async fn resolve(
        &self,
        token: ConfirmationToken,
        requester: &str,
        decision: Decision,
    ) -> GateResolution<C> {
        let mut state = self.state.lock().await;

        let pending = match std::mem::replace(&mut *state, GateState::Idle) {
            GateState::Pending(p) if p.token == token => p,
            other => {
                *state = other;
                debug!(%token, "Resolve for unknown or settled token ignored");
                return GateResolution::Ignored(IgnoreReason::UnknownToken);
            }
        };
        if pending.requester != requester {
            *state = GateState::Pending(pending);
            debug!(%token, requester, "Resolve from non-requester ignored");
            return GateResolution::Ignored(IgnoreReason::NotRequester);
        }

        let now = Instant::now();
        let kind = pending.kind;
        if pending.is_expired(now) {
            info!(%token, %kind, "Confirmation expired before decision");
            return GateResolution::Expired(pending.continuation);
        }

        match decision {
            Decision::Approve => {
                let waited = now.saturating_duration_since(pending.issued_at);
                info!(%token, %kind, waited_ms = waited.as_millis() as u64, "Confirmation approved");
                *state = GateState::Running { kind };
                GateResolution::Approved(pending.continuation)
            }
            Decision::Cancel => {
                info!(%token, %kind, "Confirmation cancelled");
                GateResolution::Cancelled(pending.continuation)
            }
        }
    }

    /// Expire the pending confirmation if its deadline has passed.
    /// Returns the continuation exactly once, to the caller that expired it.
    pub async fn expire_stale(&self) -> Option<(ConfirmationToken, C)> {
        let mut state = self.state.lock().await;
        match std::mem::replace(&mut *state, GateState::Idle) {
            GateState::Pending(p) if p.is_expired(Instant::now()) => {
                info!(token = %p.token, kind = %p.kind, "Confirmation expired");
                Some((p.token, p.continuation))
            }
            other => {
                *state = other;
                None
            }
        }
    }

    /// Release the run slot after an approved continuation completes.
    pub async fn finish(&self) {
        let mut state = self.state.lock().await;
        if let GateState::Running { kind } = &*state {
            debug!(%kind, "Run slot released");
            *state = GateState::Idle;
        }
    }

    /// Kind of the operation currently pending or running, if any.
    pub async fn busy(&self) -> Option<OperationKind> {
        busy_kind(&*self.state.lock().await)
    }

    /// Token of the pending confirmation whose continuation matches.
    pub async fn find_pending(&self, matches: impl Fn(&C) -> bool) -> Option<ConfirmationToken> {
        match &*self.state.lock().await {
            GateState::Pending(p) if matches(&p.continuation) => Some(p.token),
            _ => None,
        }
    }
}

fn busy_kind<C>(state: &GateState<C>) -> Option<OperationKind> {
    match state {
        GateState::Idle => None,
        GateState::Pending(p) => Some(p.kind),
        GateState::Running { kind } => Some(*kind),
    }
}
