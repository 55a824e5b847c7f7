use axum::{
    routing::{delete, get, post, put},
    Router,
};

pub mod admin;
pub mod session;
pub mod system;
pub mod tasks;

/// Router for every endpoint. Authentication is resolved by middleware,
/// authorization per handler.
pub fn router() -> Router {
    Router::new()
        .route("/", get(system::landing))
        .route("/health", get(system::health))
        .route("/metrics", get(system::metrics))
        .route("/whoami", get(system::whoami))
        .route("/login/local", post(session::login_local))
        .route("/logout", post(session::logout))
        .route("/tasks", get(tasks::list_tasks).post(tasks::create_task))
        .route("/tasks/:id", put(tasks::update_task).delete(tasks::delete_task))
        .route("/tasks/:id/status", post(tasks::change_status))
        .nest("/admin", admin::router())
}

pub(crate) fn parse_task_id(raw: &str) -> Result<taskmgr_core::TaskId, axum::response::Response> {
    raw.parse()
        .map_err(crate::app::errors::domain_error_to_response)
}
