//! Sprint domain model.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A sprint time window owned by the project-management service.
///
/// Velocity and completion rate are never stored on the sprint; they are
/// recomputed from task state whenever a report needs them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sprint {
    pub id: Uuid,
    pub team_id: Uuid,
    pub name: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default)]
    pub task_ids: BTreeSet<Uuid>,
}

impl Sprint {
    pub fn new(
        team_id: Uuid,
        name: impl Into<String>,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            team_id,
            name: name.into(),
            starts_at,
            ends_at,
            task_ids: BTreeSet::new(),
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now && now < self.ends_at
    }

    pub fn contains(&self, task_id: Uuid) -> bool {
        self.task_ids.contains(&task_id)
    }
}
