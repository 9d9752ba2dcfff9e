//! Metrics aggregator.
//!
//! Pure functions over task/user/sprint slices. Every aggregate defines a
//! neutral value for empty input (0.0 for rates, `None` for averages);
//! nothing here can fail. Raw records come straight from the
//! project-management service each cycle and derived values are recorded
//! as immutable `MetricSnapshot`s for trend queries.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::models::{MetricScope, MetricSnapshot, MetricWeights, Sprint, Task, User};

/// Aggregator parameterized by the configured health-score weights.
#[derive(Debug, Clone)]
pub struct MetricsAggregator {
    weights: MetricWeights,
}

impl MetricsAggregator {
    pub fn new(weights: MetricWeights) -> Self {
        Self { weights }
    }

    /// Sum of effort of Done tasks completed inside the sprint window.
    pub fn velocity(&self, tasks: &[Task], sprint: &Sprint) -> f64 {
        tasks
            .iter()
            .filter(|t| t.is_done())
            .filter(|t| {
                t.completed_at
                    .is_some_and(|at| at >= sprint.starts_at && at < sprint.ends_at)
            })
            .map(|t| t.effort)
            .sum()
    }

    /// Done count over total count; 0.0 for an empty set.
    pub fn completion_rate(&self, tasks: &[Task]) -> f64 {
        if tasks.is_empty() {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let rate = tasks.iter().filter(|t| t.is_done()).count() as f64 / tasks.len() as f64;
        rate
    }

    /// Mean completion-minus-start duration over tasks that have both
    /// timestamps. Tasks without a start are excluded, not counted as zero.
    /// `None` when no task qualifies.
    pub fn average_cycle_time(&self, tasks: &[Task]) -> Option<Duration> {
        let times: Vec<Duration> = tasks.iter().filter_map(Task::cycle_time).collect();
        if times.is_empty() {
            return None;
        }
        let total: i64 = times.iter().map(Duration::num_seconds).sum();
        #[allow(clippy::cast_possible_wrap)]
        Some(Duration::seconds(total / times.len() as i64))
    }

    /// Current committed effort per user (assigned, non-Done tasks).
    /// Every roster member appears, at zero if idle.
    pub fn workloads(&self, tasks: &[Task], roster: &[User]) -> BTreeMap<Uuid, f64> {
        let mut map: BTreeMap<Uuid, f64> = roster.iter().map(|u| (u.id, 0.0)).collect();
        for task in tasks.iter().filter(|t| t.counts_toward_workload()) {
            if let Some(assignee) = task.assignee {
                if let Some(load) = map.get_mut(&assignee) {
                    *load += task.effort;
                }
            }
        }
        map
    }

    /// Population variance of workload-to-capacity ratios across the
    /// roster. 0.0 with fewer than two users.
    pub fn workload_variance(&self, tasks: &[Task], roster: &[User]) -> f64 {
        if roster.len() < 2 {
            return 0.0;
        }
        let loads = self.workloads(tasks, roster);
        let ratios: Vec<f64> = roster
            .iter()
            .map(|u| {
                let load = loads.get(&u.id).copied().unwrap_or(0.0);
                if u.capacity > 0.0 {
                    load / u.capacity
                } else {
                    0.0
                }
            })
            .collect();

        #[allow(clippy::cast_precision_loss)]
        let n = ratios.len() as f64;
        let mean = ratios.iter().sum::<f64>() / n;
        ratios.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n
    }

    /// Weighted health score in [0, 1]: completion rate, inverted
    /// normalized cycle time, and workload balance. Weights renormalize
    /// over the terms that have data, so a team with no completed tasks
    /// is not scored on cycle time it never produced.
    pub fn health_score(&self, tasks: &[Task], roster: &[User]) -> f64 {
        let mut weighted = 0.0;
        let mut weight_sum = 0.0;

        if self.weights.completion_weight > 0.0 {
            weighted += self.weights.completion_weight * self.completion_rate(tasks);
            weight_sum += self.weights.completion_weight;
        }

        if self.weights.cycle_time_weight > 0.0 {
            if let Some(avg) = self.average_cycle_time(tasks) {
                #[allow(clippy::cast_precision_loss)]
                let hours = avg.num_seconds() as f64 / 3600.0;
                let norm = self.weights.cycle_time_norm_hours.max(f64::EPSILON);
                // 1.0 at zero cycle time, 0.5 at the norm scale.
                weighted += self.weights.cycle_time_weight * (norm / (norm + hours));
                weight_sum += self.weights.cycle_time_weight;
            }
        }

        if self.weights.balance_weight > 0.0 && roster.len() >= 2 {
            let variance = self.workload_variance(tasks, roster);
            weighted += self.weights.balance_weight * (1.0 / (1.0 + variance));
            weight_sum += self.weights.balance_weight;
        }

        if weight_sum <= 0.0 {
            return 0.0;
        }
        (weighted / weight_sum).clamp(0.0, 1.0)
    }

    /// Effort still open (not Done).
    pub fn remaining_effort(&self, tasks: &[Task]) -> f64 {
        tasks.iter().filter(|t| !t.is_done()).map(|t| t.effort).sum()
    }

    /// Snapshot an aggregate for trend queries.
    pub fn snapshot(&self, scope: MetricScope, name: &str, value: f64) -> MetricSnapshot {
        MetricSnapshot::new(scope, name, value)
    }
}

/// Shared, append-only snapshot store with time-based retention.
///
/// Safe under concurrent agent cycles; with the compute cache, this is
/// the only cross-cycle mutable state.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    inner: Arc<RwLock<Vec<MetricSnapshot>>>,
    retention: Duration,
}

impl SnapshotStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Vec::new())),
            retention,
        }
    }

    pub async fn record(&self, snapshot: MetricSnapshot) {
        self.inner.write().await.push(snapshot);
    }

    pub async fn record_all(&self, snapshots: Vec<MetricSnapshot>) {
        self.inner.write().await.extend(snapshots);
    }

    /// Snapshots for a scope and metric name, oldest first.
    pub async fn history(&self, scope: MetricScope, name: &str) -> Vec<MetricSnapshot> {
        self.inner
            .read()
            .await
            .iter()
            .filter(|s| s.scope == scope && s.name == name)
            .cloned()
            .collect()
    }

    /// Drop snapshots older than the retention window.
    pub async fn prune(&self, now: DateTime<Utc>) {
        let cutoff = now - self.retention;
        self.inner.write().await.retain(|s| s.computed_at >= cutoff);
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new(Duration::days(90))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TaskStatus;

    fn aggregator() -> MetricsAggregator {
        MetricsAggregator::new(MetricWeights::default())
    }

    fn done_task(effort: f64, started_hours_ago: i64, cycle_hours: i64) -> Task {
        let mut t = Task::new("t", effort);
        t.status = TaskStatus::Done;
        let start = Utc::now() - Duration::hours(started_hours_ago);
        t.started_at = Some(start);
        t.completed_at = Some(start + Duration::hours(cycle_hours));
        t
    }

    #[test]
    fn empty_inputs_yield_neutral_values() {
        let agg = aggregator();
        let sprint = Sprint::new(
            Uuid::new_v4(),
            "empty",
            Utc::now(),
            Utc::now() + Duration::days(14),
        );

        assert!((agg.velocity(&[], &sprint) - 0.0).abs() < f64::EPSILON);
        assert!((agg.completion_rate(&[]) - 0.0).abs() < f64::EPSILON);
        assert_eq!(agg.average_cycle_time(&[]), None);
        assert!((agg.workload_variance(&[], &[]) - 0.0).abs() < f64::EPSILON);
        assert!((agg.remaining_effort(&[]) - 0.0).abs() < f64::EPSILON);
        assert!(agg.health_score(&[], &[]) >= 0.0);
    }

    #[test]
    fn velocity_counts_done_effort_inside_window_only() {
        let agg = aggregator();
        let now = Utc::now();
        let sprint = Sprint::new(
            Uuid::new_v4(),
            "s",
            now - Duration::days(7),
            now + Duration::days(7),
        );

        let inside = done_task(3.0, 48, 24);
        let mut outside = done_task(5.0, 48, 24);
        outside.completed_at = Some(now - Duration::days(30));
        let open = Task::new("open", 8.0);

        assert!((agg.velocity(&[inside, outside, open], &sprint) - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn completion_rate_is_done_over_total() {
        let agg = aggregator();
        let done = done_task(1.0, 10, 5);
        let open = Task::new("open", 1.0);
        assert!((agg.completion_rate(&[done, open]) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn cycle_time_excludes_tasks_without_timestamps() {
        let agg = aggregator();
        let with = done_task(1.0, 20, 10);
        let mut without = Task::new("no start", 1.0);
        without.status = TaskStatus::Done;
        without.completed_at = Some(Utc::now());

        let avg = agg.average_cycle_time(&[with, without]).unwrap();
        // Only the 10h task counts; a zero from the other would halve it.
        assert_eq!(avg, Duration::hours(10));
    }

    #[test]
    fn workload_variance_reflects_imbalance() {
        let agg = aggregator();
        let u1 = User::new("u1", 10.0);
        let u2 = User::new("u2", 10.0);

        let mut heavy = Task::new("heavy", 8.0);
        heavy.assignee = Some(u1.id);

        let balanced_users = vec![u1.clone(), u2.clone()];
        let skewed = agg.workload_variance(std::slice::from_ref(&heavy), &balanced_users);
        assert!(skewed > 0.0);

        let mut t2 = Task::new("even", 8.0);
        t2.assignee = Some(u2.id);
        let even = agg.workload_variance(&[heavy, t2], &balanced_users);
        assert!((even - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn health_score_renormalizes_missing_terms() {
        // One user, no completed tasks: only the completion term has data.
        let agg = aggregator();
        let open = Task::new("open", 3.0);
        let roster = vec![User::new("solo", 10.0)];

        let score = agg.health_score(std::slice::from_ref(&open), &roster);
        assert!((score - 0.0).abs() < f64::EPSILON);

        let done = done_task(2.0, 10, 4);
        let score = agg.health_score(&[done], &roster);
        assert!(score > 0.5);
        assert!(score <= 1.0);
    }

    #[tokio::test]
    async fn snapshot_store_retains_and_prunes() {
        let store = SnapshotStore::new(Duration::days(7));
        let scope = MetricScope::Team(Uuid::new_v4());

        let mut old = MetricSnapshot::new(scope, "velocity", 10.0);
        old.computed_at = Utc::now() - Duration::days(30);
        store.record(old).await;
        store.record(MetricSnapshot::new(scope, "velocity", 12.0)).await;

        assert_eq!(store.history(scope, "velocity").await.len(), 2);
        store.prune(Utc::now()).await;
        let kept = store.history(scope, "velocity").await;
        assert_eq!(kept.len(), 1);
        assert!((kept[0].value - 12.0).abs() < f64::EPSILON);
    }
}
