//! Port for the external project-management service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::models::{Sprint, Task, TaskStatus, User};
use crate::domain::ports::errors::CollaboratorError;

/// Partial update applied to a task.
///
/// Mutations are the wrapper's only retried writes, so each patch carries
/// an idempotency key the remote service can deduplicate on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl TaskPatch {
    pub fn assign(assignee: Uuid) -> Self {
        Self {
            assignee: Some(assignee),
            status: None,
            idempotency_key: Some(Uuid::new_v4().to_string()),
        }
    }
}

/// Source of truth for tasks, users, and sprints.
///
/// The core never keeps a long-lived mutable copy of anything fetched
/// through this port; every agent cycle re-fetches.
#[async_trait]
pub trait ProjectService: Send + Sync {
    /// Fetch tasks for a team, optionally restricted to a sprint.
    async fn fetch_tasks(
        &self,
        team_id: Uuid,
        sprint_id: Option<Uuid>,
    ) -> Result<Vec<Task>, CollaboratorError>;

    /// Fetch the candidate user roster for a team.
    async fn fetch_users(&self, team_id: Uuid) -> Result<Vec<User>, CollaboratorError>;

    /// Fetch the currently active sprint for a team, if any.
    async fn fetch_active_sprint(
        &self,
        team_id: Uuid,
    ) -> Result<Option<Sprint>, CollaboratorError>;

    /// Apply a partial update to a task and return the updated record.
    async fn update_task(
        &self,
        task_id: Uuid,
        patch: TaskPatch,
    ) -> Result<Task, CollaboratorError>;
}
