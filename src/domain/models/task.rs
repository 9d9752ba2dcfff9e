//! Task domain model.
//!
//! Tasks are owned by the external project-management service; the core
//! treats them as read-mostly inputs fetched per agent cycle. Their
//! dependency edges form a DAG over each team's task set.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a task in the board workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is defined but not started
    Backlog,
    /// Task is actively being worked on
    InProgress,
    /// Task is waiting on something outside its dependency edges
    Blocked,
    /// Task is finished
    Done,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Backlog
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backlog => "backlog",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Done => "done",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "backlog" => Some(Self::Backlog),
            "in_progress" | "in progress" => Some(Self::InProgress),
            "blocked" => Some(Self::Blocked),
            "done" | "complete" | "completed" => Some(Self::Done),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Priority level for tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low = 1,
    Medium = 2,
    High = 3,
    Urgent = 4,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

/// A unit of work tracked by the project-management service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
    /// Estimated effort in story points.
    #[serde(default)]
    pub effort: f64,
    #[serde(default)]
    pub assignee: Option<Uuid>,
    /// Skill tags a user must cover to take this task.
    #[serde(default)]
    pub required_skills: BTreeSet<String>,
    /// Tasks this task depends on. Ordered so iteration is deterministic.
    #[serde(default)]
    pub depends_on: BTreeSet<Uuid>,
    #[serde(default)]
    pub sprint_id: Option<Uuid>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(title: impl Into<String>, effort: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            status: TaskStatus::default(),
            priority: TaskPriority::default(),
            effort,
            assignee: None,
            required_skills: BTreeSet::new(),
            depends_on: BTreeSet::new(),
            sprint_id: None,
            due_date: None,
            started_at: None,
            completed_at: None,
            updated_at: Utc::now(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.status.is_done()
    }

    /// Whether this task counts toward its assignee's current workload.
    pub fn counts_toward_workload(&self) -> bool {
        self.assignee.is_some() && !self.is_done()
    }

    /// Time from start to completion, when both timestamps exist.
    pub fn cycle_time(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) if end >= start => Some(end - start),
            _ => None,
        }
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.is_done() && self.due_date.is_some_and(|due| due < now)
    }
}
