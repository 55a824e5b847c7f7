//! API-side authorization guard.
//!
//! Sequences every protected action the same way: gate decision, then the
//! audit entry, then (only if both allow it) the handler's effect. Domain
//! state and the audit store stay auth-agnostic.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use thiserror::Error;
use tracing::{error, info};

use taskmgr_auth::{AuthorizationGate, Capability, Decision, DenialReason};
use taskmgr_infra::{AuditEntry, AuditLog};

use crate::app::errors::json_error;
use crate::context::RequestScope;

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("denied: {reason}")]
    Denied { reason: DenialReason, anonymous: bool },

    #[error("audit log unavailable")]
    AuditUnavailable,
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        match self {
            // Reasons are logged, never returned.
            GuardError::Denied { anonymous: true, .. } => {
                json_error(StatusCode::UNAUTHORIZED, "unauthenticated", "authentication required")
            }
            GuardError::Denied { .. } => json_error(StatusCode::FORBIDDEN, "forbidden", "forbidden"),
            GuardError::AuditUnavailable => json_error(
                StatusCode::FORBIDDEN,
                "audit_unavailable",
                "action refused: audit log unavailable",
            ),
        }
    }
}

/// What is being attempted, for the audit trail.
#[derive(Debug, Clone)]
pub struct Action<'a> {
    pub capability: Capability,
    /// Verb + resource type, e.g. `delete_task`.
    pub name: &'static str,
    pub resource_id: Option<String>,
    pub resource_owner: Option<&'a str>,
}

impl<'a> Action<'a> {
    pub fn new(capability: Capability, name: &'static str) -> Self {
        Self {
            capability,
            name,
            resource_id: None,
            resource_owner: None,
        }
    }

    pub fn on(mut self, resource_id: impl ToString) -> Self {
        self.resource_id = Some(resource_id.to_string());
        self
    }

    pub fn owned_by(mut self, owner: &'a str) -> Self {
        self.resource_owner = Some(owner);
        self
    }
}

#[derive(Clone)]
pub struct Guard {
    gate: Arc<AuthorizationGate>,
    audit: AuditLog,
}

impl Guard {
    pub fn new(gate: AuthorizationGate, audit: AuditLog) -> Self {
        Self {
            gate: Arc::new(gate),
            audit,
        }
    }

    pub fn gate(&self) -> &AuthorizationGate {
        &self.gate
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Gate only, no audit entry. For public or non-privileged reads.
    pub fn check(
        &self,
        scope: &RequestScope,
        capability: &Capability,
        resource_owner: Option<&str>,
    ) -> Result<(), GuardError> {
        let decision = self.decide(scope, capability, resource_owner);
        into_result(scope, decision)
    }

    /// For state-changing actions. The audit entry is persisted before this
    /// returns `Ok`; if it cannot be, the action is refused.
    pub async fn authorize_mutation(
        &self,
        scope: &RequestScope,
        action: Action<'_>,
    ) -> Result<(), GuardError> {
        let decision = self.decide(scope, &action.capability, action.resource_owner);
        let entry = audit_entry(scope, &decision, &action);

        if let Err(e) = self.audit.record(entry).await {
            if decision.is_allowed() {
                error!(
                    correlation_id = %scope.correlation_id(),
                    action = action.name,
                    error = %e,
                    "refusing action: audit entry not persisted"
                );
                return Err(GuardError::AuditUnavailable);
            }
            error!(
                correlation_id = %scope.correlation_id(),
                action = action.name,
                error = %e,
                "denial not persisted to audit log"
            );
        }

        into_result(scope, decision)
    }

    /// For privileged reads: the audit entry is written in the background.
    pub fn authorize_read(&self, scope: &RequestScope, action: Action<'_>) -> Result<(), GuardError> {
        let decision = self.decide(scope, &action.capability, action.resource_owner);
        self.audit
            .record_best_effort(audit_entry(scope, &decision, &action));
        into_result(scope, decision)
    }

    fn decide(
        &self,
        scope: &RequestScope,
        capability: &Capability,
        resource_owner: Option<&str>,
    ) -> Decision {
        let decision = self
            .gate
            .authorize(scope.identity(), capability, resource_owner);
        scope.record_decision(&decision);

        if let Some(reason) = decision.denial_reason() {
            info!(
                correlation_id = %scope.correlation_id(),
                actor = scope.identity().actor(),
                %capability,
                %reason,
                "access denied"
            );
        }
        decision
    }
}

fn audit_entry(scope: &RequestScope, decision: &Decision, action: &Action<'_>) -> AuditEntry {
    AuditEntry::for_decision(
        decision,
        Utc::now(),
        scope.correlation_id(),
        scope.identity().actor(),
        action.name,
        action.resource_id.clone(),
    )
}

fn into_result(scope: &RequestScope, decision: Decision) -> Result<(), GuardError> {
    match decision {
        Decision::Allowed => Ok(()),
        Decision::Denied(reason) => Err(GuardError::Denied {
            reason,
            anonymous: scope.is_anonymous(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use taskmgr_auth::{AuthMode, CapabilityTable, Identity, RequestContext};
    use taskmgr_core::CorrelationId;
    use taskmgr_infra::{AuditFilter, AuditSink, InMemoryAuditSink};

    fn anonymous_scope() -> RequestScope {
        let mut ctx = RequestContext::new(CorrelationId::new());
        ctx.resolve(Identity::Anonymous).unwrap();
        RequestScope::new(ctx)
    }

    #[tokio::test]
    async fn anonymous_mutation_is_denied_and_audited() {
        let sink = Arc::new(InMemoryAuditSink::new());
        let guard = Guard::new(
            AuthorizationGate::new(AuthMode::Development, CapabilityTable::default()),
            AuditLog::new(sink.clone()),
        );
        let scope = anonymous_scope();

        let err = guard
            .authorize_mutation(&scope, Action::new(Capability::MANAGE_ANY_TASK, "admin_delete_task").on("t1"))
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::Denied { anonymous: true, reason: DenialReason::Unauthenticated }));

        let entries = sink.list(&AuditFilter::default()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entry.actor_subject(), "anonymous");
        assert_eq!(entries[0].entry.resource_id(), Some("t1"));
        assert_eq!(entries[0].entry.correlation_id(), scope.correlation_id());
    }

    #[test]
    fn public_check_allows_anonymous() {
        let guard = Guard::new(
            AuthorizationGate::new(AuthMode::Development, CapabilityTable::default()),
            AuditLog::new(Arc::new(InMemoryAuditSink::new())),
        );
        assert!(guard.check(&anonymous_scope(), &Capability::HEALTH, None).is_ok());
    }

    #[test]
    fn denial_responses_do_not_leak_reason() {
        let anonymous = GuardError::Denied { reason: DenialReason::Unauthenticated, anonymous: true };
        assert_eq!(anonymous.into_response().status(), StatusCode::UNAUTHORIZED);

        let forbidden = GuardError::Denied { reason: DenialReason::NotOwner, anonymous: false };
        assert_eq!(forbidden.into_response().status(), StatusCode::FORBIDDEN);

        assert_eq!(GuardError::AuditUnavailable.into_response().status(), StatusCode::FORBIDDEN);
    }
}
