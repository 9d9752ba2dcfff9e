//! User domain model.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::Task;

/// A team member who can be assigned tasks.
///
/// Workload is never stored: it is always derived from the task set at
/// read time so there is no stale local copy to drift from the
/// project-management service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    /// Skill tags this user covers.
    #[serde(default)]
    pub skills: BTreeSet<String>,
    /// Effort ceiling. Soft constraint: teams can run over capacity.
    #[serde(default = "default_capacity")]
    pub capacity: f64,
}

fn default_capacity() -> f64 {
    10.0
}

impl User {
    pub fn new(name: impl Into<String>, capacity: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            skills: BTreeSet::new(),
            capacity,
        }
    }

    /// Sum of effort of this user's assigned, non-Done tasks.
    pub fn workload(&self, tasks: &[Task]) -> f64 {
        tasks
            .iter()
            .filter(|t| t.counts_toward_workload() && t.assignee == Some(self.id))
            .map(|t| t.effort)
            .sum()
    }

    /// Whether this user's skills cover every required tag.
    pub fn covers(&self, required: &BTreeSet<String>) -> bool {
        required.is_subset(&self.skills)
    }

    /// Required tags this user does not cover.
    pub fn missing_skills(&self, required: &BTreeSet<String>) -> BTreeSet<String> {
        required.difference(&self.skills).cloned().collect()
    }
}
