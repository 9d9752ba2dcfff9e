//! Task-management agent strategy: blocker analysis and assignment
//! optimization.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::domain::models::{AgentKind, Task, TaskStatus};
use crate::domain::ports::{CompletionParams, MessagePayload, TaskPatch};
use crate::services::{AssignmentOptimizer, DependencyGraph, MetricsAggregator};

use super::controller::{
    Alert, Collaborators, ComputedReport, CycleError, CycleInput, CycleOutput, CycleStage,
    OutboundMessage, ReportStrategy, TaskUpdate,
};

/// Detects stuck work and proposes assignments for unowned tasks.
#[derive(Debug, Default)]
pub struct TaskManagementStrategy;

#[async_trait]
impl ReportStrategy for TaskManagementStrategy {
    fn kind(&self) -> AgentKind {
        AgentKind::TaskManagement
    }

    async fn compute(
        &self,
        env: &Collaborators,
        input: &CycleInput,
    ) -> Result<ComputedReport, CycleError> {
        // The graph must validate acyclic before the optimizer consumes
        // anything derived from it.
        let graph = DependencyGraph::build(&input.tasks).map_err(|source| CycleError::Domain {
            stage: CycleStage::Computing,
            source,
        })?;

        let now = Utc::now();
        let stuck = stuck_tasks(&graph, &input.tasks);
        let overdue: Vec<&Task> = input.tasks.iter().filter(|t| t.is_overdue(now)).collect();

        let mut alerts = Vec::new();
        if !stuck.is_empty() {
            alerts.push(Alert::warning(format!(
                "{} task(s) transitively stuck behind blocked work",
                stuck.len()
            )));
        }
        for task in &overdue {
            alerts.push(Alert::warning(format!(
                "'{}' is overdue ({} priority)",
                task.title,
                task.priority.as_str()
            )));
        }

        // Assignment planning over unowned, open tasks. Workload
        // distribution is memoized briefly; plans tolerate slightly
        // stale loads.
        let workloads = self.workload_distribution(env, input).await?;
        let unassigned: Vec<Task> = input
            .tasks
            .iter()
            .filter(|t| t.assignee.is_none() && !t.is_done())
            .cloned()
            .collect();
        let optimizer = AssignmentOptimizer::new(&env.config.assignment);
        let plan = optimizer.plan(&unassigned, &input.users, &workloads);

        for unassignable in &plan.unassignable {
            alerts.push(Alert::warning(format!(
                "no qualified assignee for task {}; missing skills: {}",
                unassignable.task_id,
                if unassignable.missing_skills.is_empty() {
                    "(none listed)".to_string()
                } else {
                    unassignable
                        .missing_skills
                        .iter()
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", ")
                }
            )));
        }

        let narrative = self.blocker_analysis(env, input, &stuck).await?;

        Ok(ComputedReport {
            title: "Task management report".to_string(),
            narrative: Some(narrative),
            snapshots: Vec::new(),
            alerts,
            plan: Some(plan),
            actionable: graph.actionable_now().into_iter().collect(),
            critical_path: graph.critical_path(),
        })
    }

    fn format(
        &self,
        env: &Collaborators,
        input: &CycleInput,
        report: &ComputedReport,
    ) -> CycleOutput {
        let mut output = CycleOutput::default();

        let mut text = format!("*{}*\n", report.title);
        if let Some(narrative) = &report.narrative {
            text.push_str(narrative);
            text.push('\n');
        }
        text.push_str(&format!(
            "Actionable now: {} task(s)\n",
            report.actionable.len()
        ));
        for alert in &report.alerts {
            text.push_str(&format!("[{}] {}\n", alert.severity.as_str(), alert.message));
        }

        if let Some(plan) = &report.plan {
            if !plan.assignments.is_empty() {
                // Applied assignments change per-user loads, so the
                // memoized distribution must not outlive them.
                output
                    .invalidations
                    .push(format!("workload:{}", input.team_id));
            }
            for assignment in &plan.assignments {
                output.updates.push(TaskUpdate {
                    task_id: assignment.task_id,
                    patch: TaskPatch::assign(assignment.user_id),
                });

                let title = task_title(input, assignment.task_id);
                let note = if assignment.over_capacity {
                    " (over capacity - please rebalance)"
                } else {
                    ""
                };
                output.messages.push(OutboundMessage {
                    channel: format!("@{}", assignment.user_id),
                    payload: MessagePayload::text(format!(
                        ":dart: You have been assigned '{title}'{note}"
                    )),
                });
                text.push_str(&format!(
                    "Assigned '{title}' -> user {} (ratio {:.2})\n",
                    assignment.user_id, assignment.projected_ratio
                ));
            }
        }

        let summary_block = json!({
            "team_id": input.team_id,
            "actionable": report.actionable,
            "critical_path": report.critical_path,
        });
        output.messages.insert(
            0,
            OutboundMessage {
                channel: env.config.chat.reports_channel.clone(),
                payload: MessagePayload::text(text).with_block(summary_block),
            },
        );
        output
    }
}

impl TaskManagementStrategy {
    /// Per-user load map, cached under the short workload TTL.
    async fn workload_distribution(
        &self,
        env: &Collaborators,
        input: &CycleInput,
    ) -> Result<std::collections::BTreeMap<Uuid, f64>, CycleError> {
        let key = format!("workload:{}", input.team_id);
        let ttl = std::time::Duration::from_secs(env.config.cache.workload_ttl_secs);
        let cache_err = |source| CycleError::Cache {
            stage: CycleStage::Computing,
            source,
        };

        let agg = MetricsAggregator::new(env.config.metrics.clone());
        let value = env
            .cache
            .get_or_compute(&key, ttl, async {
                let loads = agg.workloads(&input.tasks, &input.users);
                Ok(serde_json::to_value(loads)?)
            })
            .await
            .map_err(cache_err)?;

        serde_json::from_value(value)
            .map_err(|e| cache_err(crate::services::CacheError::Compute(e.to_string())))
    }

    /// Cached language-model read on what is blocking the team.
    async fn blocker_analysis(
        &self,
        env: &Collaborators,
        input: &CycleInput,
        stuck: &BTreeSet<Uuid>,
    ) -> Result<String, CycleError> {
        let key = format!("task_analysis:{}", input.team_id);
        let ttl = std::time::Duration::from_secs(env.config.cache.analysis_ttl_secs);

        let mut lines: Vec<String> = Vec::new();
        for task in input.tasks.iter().filter(|t| stuck.contains(&t.id)) {
            lines.push(format!(
                "- '{}' ({}, {} deps)",
                task.title,
                task.status.as_str(),
                task.depends_on.len()
            ));
        }
        let prompt = format!(
            "Analyze blockers and risks for this team.\nStuck tasks:\n{}",
            if lines.is_empty() {
                "(none)".to_string()
            } else {
                lines.join("\n")
            }
        );
        let params = CompletionParams::from(&env.config.llm);

        debug!(%key, stuck = stuck.len(), "requesting blocker analysis");
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
}

/// Open tasks whose transitive dependency closure contains a task that is
/// itself marked Blocked.
fn stuck_tasks(graph: &DependencyGraph, tasks: &[Task]) -> BTreeSet<Uuid> {
    let blocked: BTreeSet<Uuid> = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Blocked)
        .map(|t| t.id)
        .collect();

    tasks
        .iter()
        .filter(|t| !t.is_done())
        .filter(|t| !graph.blocked_by(t.id).is_disjoint(&blocked))
        .map(|t| t.id)
        .collect()
}

fn task_title(input: &CycleInput, task_id: Uuid) -> String {
    input
        .tasks
        .iter()
        .find(|t| t.id == task_id)
        .map_or_else(|| task_id.to_string(), |t| t.title.clone())
}
