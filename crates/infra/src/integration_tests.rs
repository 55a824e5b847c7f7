//! Integration tests for the request authorization pipeline.
//!
//! Tests: Credential → TokenVerifier → RequestContext → AuthorizationGate → AuditLog
//!
//! Verifies:
//! - Every decision on a mutating action lands in the trail before the effect
//! - Denials carry their reason; allowed entries carry none
//! - The request context ends in the state its decision implies

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use taskmgr_auth::{
        AuthConfig, AuthorizationGate, Capability, CapabilityTable, ContextState, Credential,
        LocalDevConfig, LocalIdentity, RequestContext, Role, TokenVerifier,
    };
    use taskmgr_core::CorrelationId;

    use crate::audit_log::{AuditEntry, AuditFilter, AuditLog, AuditOutcome, InMemoryAuditSink};

    fn setup() -> (TokenVerifier, AuthorizationGate, AuditLog, Arc<InMemoryAuditSink>) {
        let config = AuthConfig {
            local_dev: Some(LocalDevConfig {
                identities: vec![
                    LocalIdentity { email: "dev@local.test".into(), role: Role::USER },
                    LocalIdentity { email: "admin@local.test".into(), role: Role::ADMIN },
                ],
                session_ttl_secs: 600,
            }),
            ..AuthConfig::default()
        };
        let verifier = TokenVerifier::from_config(&config, None).unwrap();
        let gate = AuthorizationGate::new(verifier.mode(), CapabilityTable::default());
        let sink = Arc::new(InMemoryAuditSink::new());
        let log = AuditLog::new(sink.clone());
        (verifier, gate, log, sink)
    }

    /// One request: resolve, decide, audit, then complete or fail.
    async fn run_request(
        verifier: &TokenVerifier,
        gate: &AuthorizationGate,
        log: &AuditLog,
        credential: Option<Credential>,
        capability: &Capability,
        owner: Option<&str>,
        action: &str,
    ) -> RequestContext {
        let now = Utc::now();
        let mut ctx = RequestContext::new(CorrelationId::new());
        let identity = verifier.resolve_identity(credential.as_ref(), now).await;
        ctx.resolve(identity).unwrap();

        let decision = gate.authorize(ctx.identity(), capability, owner);
        ctx.record_decision(&decision).unwrap();

        let entry = AuditEntry::for_decision(
            &decision,
            now,
            ctx.correlation_id(),
            ctx.identity().actor(),
            action,
            Some("task-1".to_string()),
        );
        let recorded = log.record(entry).await;

        if decision.is_allowed() && recorded.is_ok() {
            ctx.complete().unwrap();
        } else {
            ctx.fail().unwrap();
        }
        ctx
    }

    fn session(verifier: &TokenVerifier, email: &str) -> Credential {
        let id = verifier.create_local_session(email, Utc::now()).unwrap();
        Credential::LocalSession(id.to_string())
    }

    #[tokio::test]
    async fn owner_allowed_and_stranger_denied_are_both_recorded() {
        let (verifier, gate, log, sink) = setup();
        let dev = session(&verifier, "dev@local.test");

        let ctx = run_request(
            &verifier,
            &gate,
            &log,
            Some(dev.clone()),
            &Capability::MANAGE_OWN_TASK,
            Some("local-dev@local.test"),
            "delete_task",
        )
        .await;
        assert_eq!(ctx.state(), ContextState::Completed);

        let ctx = run_request(
            &verifier,
            &gate,
            &log,
            Some(dev),
            &Capability::MANAGE_OWN_TASK,
            Some("local-someone-else@local.test"),
            "delete_task",
        )
        .await;
        assert_eq!(ctx.state(), ContextState::Failed);

        assert_eq!(sink.len(), 2);
        let entries = log.list(&AuditFilter::by_action("delete_task")).await.unwrap();
        assert_eq!(entries[0].entry.outcome(), AuditOutcome::Allowed);
        assert_eq!(entries[0].entry.reason(), None);
        assert_eq!(entries[1].entry.outcome(), AuditOutcome::Denied);
        assert_eq!(entries[1].entry.reason(), Some("not owner"));
        assert!(entries[0].sequence < entries[1].sequence);
    }

    #[tokio::test]
    async fn admin_passes_role_gate_that_user_fails() {
        let (verifier, gate, log, _sink) = setup();
        let admin = session(&verifier, "admin@local.test");
        let dev = session(&verifier, "dev@local.test");

        let ctx = run_request(
            &verifier,
            &gate,
            &log,
            Some(admin),
            &Capability::MANAGE_ANY_TASK,
            None,
            "admin_delete_task",
        )
        .await;
        assert_eq!(ctx.state(), ContextState::Completed);

        let ctx = run_request(
            &verifier,
            &gate,
            &log,
            Some(dev),
            &Capability::MANAGE_ANY_TASK,
            None,
            "admin_delete_task",
        )
        .await;
        assert_eq!(ctx.state(), ContextState::Failed);

        let denied = log
            .list(&AuditFilter::by_actor("local-dev@local.test"))
            .await
            .unwrap();
        assert_eq!(denied.len(), 1);
        assert_eq!(denied[0].entry.reason(), Some("missing role 'admin'"));
    }

    #[tokio::test]
    async fn unknown_or_revoked_sessions_are_anonymous_and_audited_as_such() {
        let (verifier, gate, log, _sink) = setup();
        let dev = session(&verifier, "dev@local.test");
        let Credential::LocalSession(reference) = &dev else {
            unreachable!()
        };
        assert!(verifier.revoke_local_session(reference));

        for credential in [Some(dev.clone()), Some(Credential::LocalSession("garbage".into())), None] {
            let ctx = run_request(
                &verifier,
                &gate,
                &log,
                credential,
                &Capability::MANAGE_OWN_TASK,
                Some("local-dev@local.test"),
                "update_task",
            )
            .await;
            assert_eq!(ctx.state(), ContextState::Failed);
            assert!(ctx.claims().is_none());
        }

        let entries = log.list(&AuditFilter::by_actor("anonymous")).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.entry.reason() == Some("unauthenticated")));
    }
}
