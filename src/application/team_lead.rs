//! Team-lead agent strategy: sprint and team-health reporting.
//!
//! One strategy, three report shapes on the stock weekly cadence: the
//! full sprint report, a light mid-sprint progress check-in, and KPI
//! targets derived from recorded metric history.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::debug;

use crate::domain::models::{AgentKind, MetricScope, ReportKind, Sprint, TaskStatus};
use crate::domain::ports::{CompletionParams, MessagePayload};
use crate::services::{DependencyGraph, MetricsAggregator};

use super::controller::{
    Alert, Collaborators, ComputedReport, CycleError, CycleInput, CycleOutput, CycleStage,
    OutboundMessage, ReportStrategy,
};

/// Produces the team-lead reports: velocity, completion, cycle time,
/// health, workload alerts, and a language-model narrative.
#[derive(Debug, Default)]
pub struct TeamLeadStrategy {
    report: ReportKind,
}

impl TeamLeadStrategy {
    pub fn new(report: ReportKind) -> Self {
        Self { report }
    }
}

#[async_trait]
impl ReportStrategy for TeamLeadStrategy {
    fn kind(&self) -> AgentKind {
        AgentKind::TeamLead
    }

    async fn compute(
        &self,
        env: &Collaborators,
        input: &CycleInput,
    ) -> Result<ComputedReport, CycleError> {
        // Dependency validation runs before anything consumes the graph.
        let graph = DependencyGraph::build(&input.tasks).map_err(|source| CycleError::Domain {
            stage: CycleStage::Computing,
            source,
        })?;

        match self.report {
            ReportKind::Sprint => self.compute_sprint(env, input, &graph).await,
            ReportKind::Progress => self.compute_progress(env, input, &graph).await,
            ReportKind::Kpi => self.compute_kpi(env, input, &graph).await,
        }
    }

    fn format(
        &self,
        env: &Collaborators,
        input: &CycleInput,
        report: &ComputedReport,
    ) -> CycleOutput {
        if self.report == ReportKind::Progress && active_sprint(input).is_none() {
            // Nothing to check in on; the cycle delivers nothing.
            return CycleOutput::default();
        }

        let mut text = format!("*{}*\n", report.title);
        if let Some(narrative) = &report.narrative {
            text.push_str(narrative);
            text.push('\n');
        }
        text.push_str(&format!(
            "Actionable now: {} task(s); critical path length: {}\n",
            report.actionable.len(),
            report.critical_path.len()
        ));
        for alert in &report.alerts {
            text.push_str(&format!("[{}] {}\n", alert.severity.as_str(), alert.message));
        }

        let metrics_block = json!({
            "team_id": input.team_id,
            "report": self.report.as_str(),
            "metrics": report
                .snapshots
                .iter()
                .map(|s| json!({"name": s.name, "value": s.value}))
                .collect::<Vec<_>>(),
        });

        CycleOutput {
            messages: vec![OutboundMessage {
                channel: env.config.chat.reports_channel.clone(),
                payload: MessagePayload::text(text).with_block(metrics_block),
            }],
            ..CycleOutput::default()
        }
    }
}

impl TeamLeadStrategy {
    /// Full end-of-sprint report: every aggregate, alerts, and a cached
    /// narrative.
    async fn compute_sprint(
        &self,
        env: &Collaborators,
        input: &CycleInput,
        graph: &DependencyGraph,
    ) -> Result<ComputedReport, CycleError> {
        let agg = MetricsAggregator::new(env.config.metrics.clone());
        let team_scope = MetricScope::Team(input.team_id);

        let completion = agg.completion_rate(&input.tasks);
        let health = agg.health_score(&input.tasks, &input.users);
        let variance = agg.workload_variance(&input.tasks, &input.users);
        let avg_cycle_hours = agg
            .average_cycle_time(&input.tasks)
            .map(|d| d.num_minutes() as f64 / 60.0);

        let mut snapshots = vec![
            agg.snapshot(team_scope, "completion_rate", completion),
            agg.snapshot(team_scope, "health_score", health),
            agg.snapshot(team_scope, "workload_variance", variance),
        ];

        let velocity = input.sprint.as_ref().map(|sprint| {
            let v = agg.velocity(&input.tasks, sprint);
            snapshots.push(agg.snapshot(MetricScope::Sprint(sprint.id), "velocity", v));
            v
        });

        let mut alerts = Vec::new();
        let tolerance = 1.0 + env.config.assignment.capacity_tolerance;
        let loads = agg.workloads(&input.tasks, &input.users);
        for user in &input.users {
            let load = loads.get(&user.id).copied().unwrap_or(0.0);
            if user.capacity > 0.0 && load / user.capacity > tolerance {
                alerts.push(Alert::warning(format!(
                    "{} is over capacity ({load:.1} of {:.1})",
                    user.name, user.capacity
                )));
            }
        }
        let blocked = input
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Blocked)
            .count();
        if blocked > 0 {
            alerts.push(Alert::warning(format!("{blocked} task(s) marked blocked")));
        }
        if health < env.config.metrics.health_alert_threshold {
            alerts.push(Alert::critical(format!(
                "team health score {health:.2} below threshold {:.2}",
                env.config.metrics.health_alert_threshold
            )));
        }

        let narrative = self
            .sprint_narrative(env, input, completion, health, velocity, avg_cycle_hours)
            .await?;

        let sprint_name = input
            .sprint
            .as_ref()
            .map_or_else(|| "no active sprint".to_string(), |s| s.name.clone());

        Ok(ComputedReport {
            title: format!("Sprint report - {sprint_name}"),
            narrative: Some(narrative),
            snapshots,
            alerts,
            plan: None,
            actionable: graph.actionable_now().into_iter().collect(),
            critical_path: graph.critical_path(),
        })
    }

    /// Mid-sprint check-in. Only runs while a sprint is in progress, and
    /// skips the heavy aggregates and the report cache: midweek numbers
    /// move too fast to pin for a week.
    async fn compute_progress(
        &self,
        env: &Collaborators,
        input: &CycleInput,
        graph: &DependencyGraph,
    ) -> Result<ComputedReport, CycleError> {
        let Some(sprint) = active_sprint(input) else {
            debug!(team_id = %input.team_id, "no sprint in progress, skipping check-in");
            return Ok(ComputedReport {
                title: "Progress check-in - no sprint in progress".to_string(),
                ..ComputedReport::default()
            });
        };

        let agg = MetricsAggregator::new(env.config.metrics.clone());
        let completion = agg.completion_rate(&input.tasks);
        let remaining = agg.remaining_effort(&input.tasks);
        let days_left = (sprint.ends_at - Utc::now()).num_days().max(0);

        let mut alerts = Vec::new();
        let blocked = input
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Blocked)
            .count();
        if blocked > 0 {
            alerts.push(Alert::warning(format!("{blocked} task(s) marked blocked")));
        }

        let prompt = format!(
            "Write a short mid-sprint progress check-in for the team.\n\
             sprint: {}\n\
             completion_rate: {completion:.2}\n\
             remaining_effort: {remaining:.1}\n\
             days_left: {days_left}\n\
             actionable_tasks: {}",
            sprint.name,
            graph.actionable_now().len(),
        );
        let narrative = self.direct_narrative(env, &prompt).await?;

        Ok(ComputedReport {
            title: format!("Progress check-in - {}", sprint.name),
            narrative: Some(narrative),
            snapshots: Vec::new(),
            alerts,
            plan: None,
            actionable: graph.actionable_now().into_iter().collect(),
            critical_path: graph.critical_path(),
        })
    }

    /// Weekly KPI targets: current aggregates against the recorded
    /// history, so trends feed the targets.
    async fn compute_kpi(
        &self,
        env: &Collaborators,
        input: &CycleInput,
        graph: &DependencyGraph,
    ) -> Result<ComputedReport, CycleError> {
        let agg = MetricsAggregator::new(env.config.metrics.clone());
        let team_scope = MetricScope::Team(input.team_id);

        let completion = agg.completion_rate(&input.tasks);
        let health = agg.health_score(&input.tasks, &input.users);

        let previous_completion = last_value(env, team_scope, "completion_rate").await;
        let previous_health = last_value(env, team_scope, "health_score").await;

        let mut alerts = Vec::new();
        if let Some(previous) = previous_health {
            if health < previous {
                alerts.push(Alert::warning(format!(
                    "health score declining: {health:.2} from {previous:.2}"
                )));
            }
        }

        let prompt = format!(
            "Propose KPI targets for next week based on the trend.\n\
             completion_rate: {completion:.2} (was {})\n\
             health_score: {health:.2} (was {})\n\
             open_tasks: {}",
            fmt_opt(previous_completion),
            fmt_opt(previous_health),
            input.tasks.iter().filter(|t| !t.is_done()).count(),
        );
        let narrative = self.direct_narrative(env, &prompt).await?;

        let snapshots = vec![
            agg.snapshot(team_scope, "completion_rate", completion),
            agg.snapshot(team_scope, "health_score", health),
        ];

        Ok(ComputedReport {
            title: "KPI targets for next week".to_string(),
            narrative: Some(narrative),
            snapshots,
            alerts,
            plan: None,
            actionable: graph.actionable_now().into_iter().collect(),
            critical_path: graph.critical_path(),
        })
    }

    /// Language-model narrative for the sprint report, memoized per
    /// team+sprint. The prompt is deterministic for given metric values,
    /// so the cache key stays hot for the whole report TTL.
    async fn sprint_narrative(
        &self,
        env: &Collaborators,
        input: &CycleInput,
        completion: f64,
        health: f64,
        velocity: Option<f64>,
        avg_cycle_hours: Option<f64>,
    ) -> Result<String, CycleError> {
        let sprint_key = input
            .sprint
            .as_ref()
            .map_or_else(|| "none".to_string(), |s| s.id.to_string());
        let key = format!("sprint_report:{}:{sprint_key}", input.team_id);
        let ttl = std::time::Duration::from_secs(env.config.cache.report_ttl_secs);

        let prompt = format!(
            "Summarize this sprint for the team lead.\n\
             completion_rate: {completion:.2}\n\
             health_score: {health:.2}\n\
             velocity: {}\n\
             avg_cycle_time_hours: {}\n\
             open_tasks: {}",
            fmt_opt(velocity),
            fmt_opt(avg_cycle_hours),
            input.tasks.iter().filter(|t| !t.is_done()).count(),
        );
        let params = CompletionParams::from(&env.config.llm);

        debug!(%key, "requesting sprint narrative");
        let value = env
            .cache
            .get_or_compute(&key, ttl, async {
                let text = env
                    .retry
                    .execute(|| env.llm.complete(&prompt, &params))
                    .await?;
                Ok(json!(text))
            })
            .await
            .map_err(|source| CycleError::Cache {
                stage: CycleStage::Computing,
                source,
            })?;

        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Uncached language-model call for the midweek and KPI narratives.
    async fn direct_narrative(
        &self,
        env: &Collaborators,
        prompt: &str,
    ) -> Result<String, CycleError> {
        let params = CompletionParams::from(&env.config.llm);
        env.retry
            .execute(|| env.llm.complete(prompt, &params))
            .await
            .map_err(|source| CycleError::Collaborator {
                stage: CycleStage::Computing,
                source,
            })
    }
}

/// The fetched sprint, if it is currently in progress.
fn active_sprint(input: &CycleInput) -> Option<&Sprint> {
    input.sprint.as_ref().filter(|s| s.is_active(Utc::now()))
}

/// Most recent recorded value for a team metric, if any.
async fn last_value(env: &Collaborators, scope: MetricScope, name: &str) -> Option<f64> {
    env.snapshots
        .history(scope, name)
        .await
        .last()
        .map(|s| s.value)
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"))
}
