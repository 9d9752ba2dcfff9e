//! Metric snapshot domain model.
//!
//! Snapshots are immutable once created: every recomputation produces a
//! new snapshot rather than overwriting an old one, so trend queries can
//! compare values across time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a metric was computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum MetricScope {
    Team(Uuid),
    Sprint(Uuid),
    Task(Uuid),
}

impl MetricScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Team(_) => "team",
            Self::Sprint(_) => "sprint",
            Self::Task(_) => "task",
        }
    }
}

/// A versioned, timestamped aggregate value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub id: Uuid,
    pub scope: MetricScope,
    pub name: String,
    pub value: f64,
    pub computed_at: DateTime<Utc>,
}

impl MetricSnapshot {
    pub fn new(scope: MetricScope, name: impl Into<String>, value: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            scope,
            name: name.into(),
            value,
            computed_at: Utc::now(),
        }
    }
}
