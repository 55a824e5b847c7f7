//! Admin routes: panel overview, deleting any task, audit trail.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get},
    Json, Router,
};
use serde_json::json;

use taskmgr_auth::Capability;
use taskmgr_infra::AuditFilter;

use crate::app::dto::AuditQuery;
use crate::app::routes::parse_task_id;
use crate::app::{errors, services::AppServices};
use crate::authz::Action;
use crate::context::RequestScope;

/// Recent entries shown on the panel.
const PANEL_AUDIT_LIMIT: usize = 50;

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn router() -> Router {
    Router::new()
        .route("/", get(panel))
        .route("/tasks/:id", delete(delete_any_task))
        .route("/audit", get(audit_log))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// GET /admin - every task, per-user counts, recent audit entries
pub async fn panel(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<RequestScope>,
) -> axum::response::Response {
    if let Err(e) = services
        .guard
        .authorize_read(&scope, Action::new(Capability::ADMIN_PANEL_ACCESS, "view_admin_panel"))
    {
        return e.into_response();
    }

    let tasks = match services.tasks.list_all() {
        Ok(t) => t,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let per_user = match services.tasks.per_owner() {
        Ok(c) => c,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let recent_audit = match services.audit.list(&AuditFilter::recent(PANEL_AUDIT_LIMIT)).await {
        Ok(entries) => json!(entries),
        // The panel still renders; the audit section reports the outage.
        Err(e) => json!({ "error": "audit_unavailable", "message": e.to_string() }),
    };

    Json(json!({
        "tasks": tasks,
        "per_user": per_user
            .into_iter()
            .map(|(owner, count)| json!({ "owner": owner, "tasks": count }))
            .collect::<Vec<_>>(),
        "recent_audit": recent_audit,
    }))
    .into_response()
}

/// DELETE /admin/tasks/:id - delete any user's task
pub async fn delete_any_task(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<RequestScope>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let action = Action::new(Capability::MANAGE_ANY_TASK, "admin_delete_task").on(&id);
    if let Err(e) = services.guard.authorize_mutation(&scope, action).await {
        return e.into_response();
    }

    let id = match parse_task_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match services.tasks.delete(id) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// GET /admin/audit - audit trail, oldest first unless `newest_first`, optionally filtered and capped by `limit`
pub async fn audit_log(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<RequestScope>,
    Query(query): Query<AuditQuery>,
) -> axum::response::Response {
    if let Err(e) = services
        .guard
        .authorize_read(&scope, Action::new(Capability::ADMIN_PANEL_ACCESS, "view_audit_log"))
    {
        return e.into_response();
    }

    match services.audit.list(&AuditFilter::from(query)).await {
        Ok(entries) => Json(json!({ "entries": entries })).into_response(),
        Err(e) => errors::json_error(StatusCode::SERVICE_UNAVAILABLE, "audit_unavailable", e.to_string()),
    }
}
