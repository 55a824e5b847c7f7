use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

use taskmgr_auth::{ContextState, Decision, Identity, RequestContext};
use taskmgr_core::CorrelationId;

/// Handle on the request's [`RequestContext`], shared between the
/// authentication middleware and the handler.
///
/// Request extensions are cloned into handlers, so the state machine sits
/// behind a mutex to let the middleware observe the final state.
#[derive(Debug, Clone)]
pub struct RequestScope {
    correlation_id: CorrelationId,
    identity: Identity,
    context: Arc<Mutex<RequestContext>>,
}

impl RequestScope {
    pub fn new(context: RequestContext) -> Self {
        Self {
            correlation_id: context.correlation_id(),
            identity: context.identity().clone(),
            context: Arc::new(Mutex::new(context)),
        }
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn subject(&self) -> Option<&str> {
        self.identity.claims().map(|c| c.subject())
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self.identity, Identity::Anonymous)
    }

    pub fn state(&self) -> ContextState {
        self.lock().state()
    }

    pub fn record_decision(&self, decision: &Decision) {
        if let Err(e) = self.lock().record_decision(decision) {
            warn!(correlation_id = %self.correlation_id, error = %e, "decision not recorded");
        }
    }

    /// Close the context once the response is known. A rejected context
    /// always ends `Failed`.
    pub fn finish(&self, succeeded: bool) -> ContextState {
        let mut context = self.lock();
        let result = if succeeded && context.state() != ContextState::Rejected {
            context.complete()
        } else {
            context.fail()
        };
        if let Err(e) = result {
            warn!(correlation_id = %self.correlation_id, error = %e, "request context not closed");
        }
        context.state()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RequestContext> {
        self.context.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
