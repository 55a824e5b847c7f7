use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, header},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::{Instrument, debug, info_span};

use taskmgr_auth::{Credential, RequestContext, TokenVerifier};
use taskmgr_core::CorrelationId;

use crate::context::RequestScope;

pub const SESSION_COOKIE: &str = "taskmgr_session";
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");
pub const CORRELATION_ID_HEADER: HeaderName = HeaderName::from_static("x-correlation-id");

#[derive(Clone)]
pub struct AuthState {
    pub verifier: Arc<TokenVerifier>,
}

/// Resolve the caller's identity once per request and expose it to handlers
/// as a [`RequestScope`] extension.
///
/// Never rejects: an absent or invalid credential resolves to an anonymous
/// caller and the authorization gate decides what that caller may do.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let correlation_id = correlation_id(req.headers());
    let span = info_span!(
        "request",
        %correlation_id,
        method = %req.method(),
        path = %req.uri().path(),
        caller = tracing::field::Empty,
    );

    async move {
        let credential = extract_credential(req.headers());
        let identity = state
            .verifier
            .resolve_identity(credential.as_ref(), Utc::now())
            .await;
        tracing::Span::current().record("caller", identity.actor());

        let mut context = RequestContext::new(correlation_id);
        if let Err(e) = context.resolve(identity) {
            debug!(error = %e, "request context already resolved");
        }
        let scope = RequestScope::new(context);
        req.extensions_mut().insert(scope.clone());

        let mut response = next.run(req).await;

        let status = response.status();
        let state = scope.finish(status.is_success() || status.is_redirection());
        debug!(status = status.as_u16(), ?state, "request finished");

        if let Ok(value) = HeaderValue::from_str(&correlation_id.to_string()) {
            response.headers_mut().insert(CORRELATION_ID_HEADER, value);
        }
        response
    }
    .instrument(span)
    .await
}

fn correlation_id(headers: &HeaderMap) -> CorrelationId {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or_default()
}

/// `Authorization: Bearer` wins over the session cookie.
fn extract_credential(headers: &HeaderMap) -> Option<Credential> {
    if let Some(token) = extract_bearer(headers) {
        return Some(Credential::Bearer(token.to_string()));
    }
    session_cookie(headers).map(|reference| Credential::LocalSession(reference.to_string()))
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(header::AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

pub(crate) fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}
