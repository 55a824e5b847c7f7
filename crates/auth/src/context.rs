//! Per-request identity carrier.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use taskmgr_core::CorrelationId;

use crate::{ClaimSet, Decision};

/// Resolved identity of a caller. Verification failures always resolve to
/// `Anonymous`, never to a default role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Anonymous,
    Authenticated(Arc<ClaimSet>),
}

impl Identity {
    pub fn claims(&self) -> Option<&ClaimSet> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(claims) => Some(claims),
        }
    }

    /// Subject recorded as actor in audit entries.
    pub fn actor(&self) -> &str {
        self.claims().map(ClaimSet::subject).unwrap_or("anonymous")
    }
}

impl From<ClaimSet> for Identity {
    fn from(claims: ClaimSet) -> Self {
        Self::Authenticated(Arc::new(claims))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextState {
    Unresolved,
    Anonymous,
    Authenticated,
    Authorized,
    Rejected,
    Completed,
    Failed,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("invalid request context transition {from:?} -> {to:?}")]
    InvalidTransition { from: ContextState, to: ContextState },
}

/// Request-scoped context: identity plus correlation id, moving forward
/// through `Unresolved → Anonymous|Authenticated → Authorized|Rejected →
/// Completed|Failed`.
///
/// Discarded at the end of the request; never persisted.
#[derive(Debug, Clone)]
pub struct RequestContext {
    correlation_id: CorrelationId,
    identity: Identity,
    state: ContextState,
}

impl RequestContext {
    pub fn new(correlation_id: CorrelationId) -> Self {
        Self {
            correlation_id,
            identity: Identity::Anonymous,
            state: ContextState::Unresolved,
        }
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn claims(&self) -> Option<&ClaimSet> {
        self.identity.claims()
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    /// Bind the outcome of credential verification.
    pub fn resolve(&mut self, identity: Identity) -> Result<(), ContextError> {
        let to = match identity {
            Identity::Anonymous => ContextState::Anonymous,
            Identity::Authenticated(_) => ContextState::Authenticated,
        };
        self.transition(to)?;
        self.identity = identity;
        Ok(())
    }

    /// Bind the gate decision for the action this request attempts.
    pub fn record_decision(&mut self, decision: &Decision) -> Result<(), ContextError> {
        let to = if decision.is_allowed() {
            ContextState::Authorized
        } else {
            ContextState::Rejected
        };
        self.transition(to)
    }

    pub fn complete(&mut self) -> Result<(), ContextError> {
        self.transition(ContextState::Completed)
    }

    pub fn fail(&mut self) -> Result<(), ContextError> {
        self.transition(ContextState::Failed)
    }

    fn transition(&mut self, to: ContextState) -> Result<(), ContextError> {
        use ContextState::*;

        let allowed = matches!(
            (self.state, to),
            (Unresolved, Anonymous | Authenticated)
                | (Anonymous | Authenticated, Authorized | Rejected | Completed | Failed)
                | (Authorized, Completed | Failed)
                | (Rejected, Failed)
        );

        if !allowed {
            return Err(ContextError::InvalidTransition {
                from: self.state,
                to,
            });
        }

        self.state = to;
        Ok(())
    }
}
