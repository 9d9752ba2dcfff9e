//! Assignment optimizer.
//!
//! Greedy bin-packing: tasks are taken in descending effort order, each
//! offered to the skill-qualified candidate whose workload-to-capacity
//! ratio stays lowest after the hypothetical assignment. Capacity is a
//! soft constraint: over-capacity picks are flagged, never rejected.
//!
//! The optimizer only proposes. Applying a plan back to the
//! project-management service is the caller's job.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::models::{AssignmentConfig, Task, User};

/// One proposed task -> user pairing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub task_id: Uuid,
    pub user_id: Uuid,
    /// Workload/capacity ratio the user would carry after this assignment.
    pub projected_ratio: f64,
    /// Ratio exceeds the configured capacity tolerance.
    pub over_capacity: bool,
}

/// A task no candidate is qualified for. Reported, never thrown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnassignableTask {
    pub task_id: Uuid,
    /// Smallest skill gap across the roster (the best near-match's
    /// missing tags), to make the report actionable.
    pub missing_skills: BTreeSet<String>,
}

/// The optimizer's output: proposals plus soft failures.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssignmentPlan {
    pub assignments: Vec<Assignment>,
    pub unassignable: Vec<UnassignableTask>,
}

impl AssignmentPlan {
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty() && self.unassignable.is_empty()
    }
}

/// Greedy workload-balancing optimizer. Deterministic: identical inputs in
/// any order produce the identical plan.
#[derive(Debug, Clone)]
pub struct AssignmentOptimizer {
    capacity_tolerance: f64,
}

impl AssignmentOptimizer {
    pub fn new(config: &AssignmentConfig) -> Self {
        Self {
            capacity_tolerance: config.capacity_tolerance,
        }
    }

    /// Plan assignments for `tasks` over `roster`.
    ///
    /// `workloads` carries each user's current committed effort (missing
    /// users start at zero); the map is copied, never mutated in place.
    pub fn plan(
        &self,
        tasks: &[Task],
        roster: &[User],
        workloads: &BTreeMap<Uuid, f64>,
    ) -> AssignmentPlan {
        let mut plan = AssignmentPlan::default();
        let mut load: BTreeMap<Uuid, f64> = roster
            .iter()
            .map(|u| (u.id, workloads.get(&u.id).copied().unwrap_or(0.0)))
            .collect();

        // Sorted roster makes every candidate scan deterministic.
        let mut roster: Vec<&User> = roster.iter().collect();
        roster.sort_by_key(|u| u.id);

        let mut ordered: Vec<&Task> = tasks.iter().collect();
        ordered.sort_by(|a, b| {
            b.effort
                .total_cmp(&a.effort)
                .then_with(|| a.id.cmp(&b.id))
        });

        for task in ordered {
            let qualified: Vec<&User> = roster
                .iter()
                .filter(|u| u.covers(&task.required_skills))
                .copied()
                .collect();

            if qualified.is_empty() {
                plan.unassignable.push(UnassignableTask {
                    task_id: task.id,
                    missing_skills: smallest_skill_gap(task, &roster),
                });
                continue;
            }

            // Lowest projected ratio wins; ascending-id iteration makes
            // strict < keep the lower user id on ties.
            let mut chosen: Option<(&User, f64)> = None;
            for user in qualified {
                let current = load.get(&user.id).copied().unwrap_or(0.0);
                let ratio = projected_ratio(current + task.effort, user.capacity);
                if chosen.is_none_or(|(_, best)| ratio < best) {
                    chosen = Some((user, ratio));
                }
            }

            if let Some((user, ratio)) = chosen {
                *load.entry(user.id).or_insert(0.0) += task.effort;
                plan.assignments.push(Assignment {
                    task_id: task.id,
                    user_id: user.id,
                    projected_ratio: ratio,
                    over_capacity: ratio > 1.0 + self.capacity_tolerance,
                });
            }
        }

        plan
    }
}

fn projected_ratio(workload: f64, capacity: f64) -> f64 {
    if capacity > 0.0 {
        workload / capacity
    } else {
        f64::INFINITY
    }
}

/// The best near-match's missing tags, tie-broken toward the lower user id.
fn smallest_skill_gap(task: &Task, roster: &[&User]) -> BTreeSet<String> {
    roster
        .iter()
        .map(|u| u.missing_skills(&task.required_skills))
        .min_by_key(BTreeSet::len)
        .unwrap_or_else(|| task.required_skills.clone())
}
