use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::json;

use taskmgr_auth::Capability;

use crate::app::{errors, services::AppServices};
use crate::context::RequestScope;

pub async fn landing(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<RequestScope>,
) -> axum::response::Response {
    if let Err(e) = services.guard.check(&scope, &Capability::LANDING, None) {
        return e.into_response();
    }

    Json(json!({
        "service": "taskmgr",
        "auth_mode": services.verifier.mode(),
        "local_login": services.verifier.local_sessions_enabled(),
        "authenticated": !scope.is_anonymous(),
    }))
    .into_response()
}

pub async fn health(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<RequestScope>,
) -> axum::response::Response {
    if let Err(e) = services.guard.check(&scope, &Capability::HEALTH, None) {
        return e.into_response();
    }

    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now(),
    }))
    .into_response()
}

/// Prometheus text exposition of task counts.
pub async fn metrics(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<RequestScope>,
) -> axum::response::Response {
    if let Err(e) = services.guard.check(&scope, &Capability::METRICS, None) {
        return e.into_response();
    }

    let counts = match services.tasks.counts() {
        Ok(c) => c,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let body = format!(
        "# HELP tasks_total Total tasks\n\
         # TYPE tasks_total gauge\n\
         tasks_total {}\n\
         # HELP tasks_by_status Tasks per status\n\
         # TYPE tasks_by_status gauge\n\
         tasks_by_status{{status=\"pending\"}} {}\n\
         tasks_by_status{{status=\"in_progress\"}} {}\n\
         tasks_by_status{{status=\"completed\"}} {}\n",
        counts.total, counts.pending, counts.in_progress, counts.completed
    );

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response()
}

pub async fn whoami(Extension(scope): Extension<RequestScope>) -> axum::response::Response {
    let Some(claims) = scope.identity().claims() else {
        return errors::unauthenticated();
    };

    Json(json!({
        "subject": claims.subject(),
        "email": claims.email(),
        "roles": claims.roles().iter().map(|r| r.as_str()).collect::<Vec<_>>(),
        "source": claims.source(),
        "expires_at": claims.expires_at(),
        "correlation_id": scope.correlation_id(),
    }))
    .into_response()
}
