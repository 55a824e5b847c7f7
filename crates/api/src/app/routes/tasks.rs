//! Task routes: callers manage their own tasks; admins may act on any.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::json;

use taskmgr_auth::Capability;
use taskmgr_core::TaskId;

use crate::app::dto::{CreateTaskRequest, ListTasksQuery, StatusChangeRequest, UpdateTaskRequest};
use crate::app::routes::parse_task_id;
use crate::app::tasks::{Task, TaskPatch};
use crate::app::{errors, services::AppServices};
use crate::authz::Action;
use crate::context::RequestScope;

/// GET /tasks - own tasks; `?all=true` lists everyone's (admin only)
pub async fn list_tasks(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<RequestScope>,
    Query(query): Query<ListTasksQuery>,
) -> axum::response::Response {
    let tasks = if query.all {
        if let Err(e) = services
            .guard
            .authorize_read(&scope, Action::new(Capability::VIEW_ALL_TASKS, "list_all_tasks"))
        {
            return e.into_response();
        }
        services.tasks.list_all()
    } else {
        let subject = scope.subject().unwrap_or_default();
        if let Err(e) = services
            .guard
            .check(&scope, &Capability::MANAGE_OWN_TASK, Some(subject))
        {
            return e.into_response();
        }
        services.tasks.list_owned_by(subject)
    };

    match tasks {
        Ok(tasks) => Json(json!({ "tasks": tasks })).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// POST /tasks - create a task owned by the caller
pub async fn create_task(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<RequestScope>,
    Json(body): Json<CreateTaskRequest>,
) -> axum::response::Response {
    let id = TaskId::new();
    let subject = scope.subject().unwrap_or_default();

    let action = Action::new(Capability::MANAGE_OWN_TASK, "create_task")
        .on(id)
        .owned_by(subject);
    if let Err(e) = services.guard.authorize_mutation(&scope, action).await {
        return e.into_response();
    }

    let email = scope.identity().claims().and_then(|c| c.email());
    match services.tasks.create(
        id,
        &body.title,
        body.description,
        body.priority,
        subject,
        email,
        Utc::now(),
    ) {
        Ok(task) => (StatusCode::CREATED, Json(task)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// PUT /tasks/:id - edit an own task (or any, for admins)
pub async fn update_task(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<RequestScope>,
    Path(id): Path<String>,
    Json(body): Json<UpdateTaskRequest>,
) -> axum::response::Response {
    let task = match load_task(&services, &scope, &id, "update_task").await {
        Ok(task) => task,
        Err(response) => return response,
    };

    let action = Action::new(Capability::MANAGE_OWN_TASK, "update_task")
        .on(task.id)
        .owned_by(&task.owner);
    if let Err(e) = services.guard.authorize_mutation(&scope, action).await {
        return e.into_response();
    }

    match services.tasks.update(task.id, TaskPatch::from(body), Utc::now()) {
        Ok(task) => Json(task).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// POST /tasks/:id/status - change only the status
pub async fn change_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<RequestScope>,
    Path(id): Path<String>,
    Json(body): Json<StatusChangeRequest>,
) -> axum::response::Response {
    let task = match load_task(&services, &scope, &id, "status_change").await {
        Ok(task) => task,
        Err(response) => return response,
    };

    let action = Action::new(Capability::MANAGE_OWN_TASK, "status_change")
        .on(task.id)
        .owned_by(&task.owner);
    if let Err(e) = services.guard.authorize_mutation(&scope, action).await {
        return e.into_response();
    }

    let patch = TaskPatch {
        status: Some(body.status),
        ..Default::default()
    };
    match services.tasks.update(task.id, patch, Utc::now()) {
        Ok(task) => Json(json!({ "success": true, "task": task })).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// DELETE /tasks/:id - delete an own task (or any, for admins)
pub async fn delete_task(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<RequestScope>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let task = match load_task(&services, &scope, &id, "delete_task").await {
        Ok(task) => task,
        Err(response) => return response,
    };

    let action = Action::new(Capability::MANAGE_OWN_TASK, "delete_task")
        .on(task.id)
        .owned_by(&task.owner);
    if let Err(e) = services.guard.authorize_mutation(&scope, action).await {
        return e.into_response();
    }

    match services.tasks.delete(task.id) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// Look up the task an action targets. A found task is returned for the
/// caller's own owner check; an unknown id is answered the same way a
/// foreign task would be unless the caller may act on any task.
pub(crate) async fn load_task(
    services: &AppServices,
    scope: &RequestScope,
    raw_id: &str,
    action: &'static str,
) -> Result<Task, axum::response::Response> {
    let found = match raw_id.parse::<TaskId>() {
        Ok(id) => services.tasks.get(id).map_err(errors::domain_error_to_response)?,
        Err(_) => None,
    };
    if let Some(task) = found {
        return Ok(task);
    }

    // No owner to check against: only callers who may act on any task learn
    // that the id does not exist. Everyone else gets the gate's denial, and
    // the attempt is audited either way.
    let attempt = Action::new(Capability::MANAGE_ANY_TASK, action).on(raw_id);
    services
        .guard
        .authorize_mutation(scope, attempt)
        .await
        .map_err(IntoResponse::into_response)?;

    parse_task_id(raw_id)?;
    Err(errors::json_error(StatusCode::NOT_FOUND, "not_found", "task not found"))
}
