//! In-memory task store.
//!
//! Persistence is deliberately trivial; what matters is that every write
//! goes through the guard first.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use taskmgr_core::{DomainError, DomainResult, TaskId};

pub const MAX_TITLE_LEN: usize = 200;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    /// Subject of the caller who created the task.
    pub owner: String,
    pub owner_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskCounts {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
}

#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: RwLock<HashMap<TaskId, Task>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &self,
        id: TaskId,
        title: &str,
        description: Option<String>,
        priority: Option<Priority>,
        owner: &str,
        owner_email: Option<&str>,
        now: DateTime<Utc>,
    ) -> DomainResult<Task> {
        let task = Task {
            id,
            title: validate_title(title)?,
            description: description.unwrap_or_default(),
            status: TaskStatus::Pending,
            priority: priority.unwrap_or_default(),
            owner: owner.to_string(),
            owner_email: owner_email.map(str::to_string),
            created_at: now,
            updated_at: now,
        };

        self.write()?.insert(id, task.clone());
        Ok(task)
    }

    pub fn get(&self, id: TaskId) -> DomainResult<Option<Task>> {
        Ok(self.read()?.get(&id).cloned())
    }

    /// Newest first.
    pub fn list_all(&self) -> DomainResult<Vec<Task>> {
        let mut tasks: Vec<Task> = self.read()?.values().cloned().collect();
        tasks.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.as_uuid().cmp(a.id.as_uuid()))
        });
        Ok(tasks)
    }

    pub fn list_owned_by(&self, owner: &str) -> DomainResult<Vec<Task>> {
        let mut tasks = self.list_all()?;
        tasks.retain(|t| t.owner == owner);
        Ok(tasks)
    }

    pub fn update(&self, id: TaskId, patch: TaskPatch, now: DateTime<Utc>) -> DomainResult<Task> {
        let title = patch.title.as_deref().map(validate_title).transpose()?;

        let mut tasks = self.write()?;
        let task = tasks.get_mut(&id).ok_or_else(DomainError::not_found)?;
        if let Some(title) = title {
            task.title = title;
        }
        if let Some(description) = patch.description {
            task.description = description;
        }
        if let Some(status) = patch.status {
            task.status = status;
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        task.updated_at = now;
        Ok(task.clone())
    }

    pub fn delete(&self, id: TaskId) -> DomainResult<Task> {
        self.write()?.remove(&id).ok_or_else(DomainError::not_found)
    }

    pub fn counts(&self) -> DomainResult<TaskCounts> {
        let tasks = self.read()?;
        let mut counts = TaskCounts {
            total: tasks.len(),
            ..Default::default()
        };
        for task in tasks.values() {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::InProgress => counts.in_progress += 1,
                TaskStatus::Completed => counts.completed += 1,
            }
        }
        Ok(counts)
    }

    /// `(owner, task count)` pairs, most tasks first.
    pub fn per_owner(&self) -> DomainResult<Vec<(String, usize)>> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for task in self.read()?.values() {
            *counts.entry(task.owner.clone()).or_default() += 1;
        }
        let mut counts: Vec<(String, usize)> = counts.into_iter().collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(counts)
    }

    fn read(&self) -> DomainResult<std::sync::RwLockReadGuard<'_, HashMap<TaskId, Task>>> {
        self.tasks
            .read()
            .map_err(|_| DomainError::validation("task store lock poisoned"))
    }

    fn write(&self) -> DomainResult<std::sync::RwLockWriteGuard<'_, HashMap<TaskId, Task>>> {
        self.tasks
            .write()
            .map_err(|_| DomainError::validation("task store lock poisoned"))
    }
}

fn validate_title(title: &str) -> DomainResult<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(DomainError::validation("title must not be empty"));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(DomainError::validation(format!(
            "title must be at most {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(title.to_string())
}
