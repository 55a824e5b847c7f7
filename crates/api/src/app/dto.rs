use chrono::{DateTime, Utc};
use serde::Deserialize;

use taskmgr_infra::AuditFilter;

use crate::app::tasks::{Priority, TaskPatch, TaskStatus};

// ─────────────────────────────────────────────────────────────────────────────
// Request DTOs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LocalLoginRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
}

impl From<UpdateTaskRequest> for TaskPatch {
    fn from(body: UpdateTaskRequest) -> Self {
        TaskPatch {
            title: body.title,
            description: body.description,
            status: body.status,
            priority: body.priority,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusChangeRequest {
    pub status: TaskStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListTasksQuery {
    /// `true` lists every user's tasks (admin only).
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    pub actor: Option<String>,
    pub action: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    #[serde(default)]
    pub newest_first: bool,
}

impl From<AuditQuery> for AuditFilter {
    fn from(q: AuditQuery) -> Self {
        AuditFilter {
            actor: q.actor,
            action: q.action,
            from: q.from,
            to: q.to,
            limit: q.limit,
            newest_first: q.newest_first,
        }
    }
}
