//! Local development login/logout.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::json;
use tracing::info;

use taskmgr_auth::{Credential, LocalSessionError};
use taskmgr_infra::AuditEntry;

use crate::app::{dto::LocalLoginRequest, errors, services::AppServices};
use crate::context::RequestScope;
use crate::middleware::{session_cookie, SESSION_COOKIE};

/// POST /login/local - issue a session cookie for a configured identity
pub async fn login_local(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<RequestScope>,
    Json(body): Json<LocalLoginRequest>,
) -> axum::response::Response {
    let now = Utc::now();

    let session = match services.verifier.create_local_session(&body.email, now) {
        Ok(id) => id,
        Err(LocalSessionError::Disabled) => {
            return errors::json_error(
                StatusCode::NOT_FOUND,
                "local_login_disabled",
                "local login is not available",
            );
        }
        Err(LocalSessionError::UnknownIdentity) => {
            info!(correlation_id = %scope.correlation_id(), "local login for unknown identity refused");
            return errors::json_error(StatusCode::UNAUTHORIZED, "unknown_identity", "unknown identity");
        }
    };

    let reference = session.to_string();
    let claims = match services
        .verifier
        .verify(&Credential::LocalSession(reference.clone()), now)
        .await
    {
        Ok(claims) => claims,
        Err(e) => {
            return errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "session_error", e.to_string());
        }
    };

    services.audit.record_best_effort(AuditEntry::allowed(
        now,
        scope.correlation_id(),
        claims.subject(),
        "login",
        None,
    ));

    let max_age = (claims.expires_at() - now).num_seconds().max(0);
    let cookie = format!("{SESSION_COOKIE}={reference}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");

    let mut headers = HeaderMap::new();
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            headers.insert(header::SET_COOKIE, value);
        }
        Err(e) => {
            return errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "session_error", e.to_string());
        }
    }

    (
        StatusCode::OK,
        headers,
        Json(json!({
            "subject": claims.subject(),
            "email": claims.email(),
            "roles": claims.roles().iter().map(|r| r.as_str()).collect::<Vec<_>>(),
            "expires_at": claims.expires_at(),
        })),
    )
        .into_response()
}

/// POST /logout - forget the local session (if any) and clear the cookie
pub async fn logout(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<RequestScope>,
    headers: HeaderMap,
) -> axum::response::Response {
    let revoked = session_cookie(&headers)
        .map(|reference| services.verifier.revoke_local_session(reference))
        .unwrap_or(false);

    if !scope.is_anonymous() {
        services.audit.record_best_effort(AuditEntry::allowed(
            Utc::now(),
            scope.correlation_id(),
            scope.identity().actor(),
            "logout",
            None,
        ));
    }

    (
        StatusCode::OK,
        [(
            header::SET_COOKIE,
            format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
        )],
        Json(json!({ "revoked": revoked })),
    )
        .into_response()
}
