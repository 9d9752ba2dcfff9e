//! Agent cycle controller.
//!
//! One controller drives one agent kind through the fixed per-cycle
//! lifecycle: Idle -> Fetching -> Computing -> Formatting -> Delivering
//! -> Idle, with Failed reachable from any stage. Failures are isolated
//! per invocation: a failed cycle emits a diagnostic notification and a
//! `CycleRecord`, and the next scheduled cycle runs regardless.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::error::DomainError;
use crate::domain::models::{AgentKind, Config, MetricSnapshot, Sprint, Task, User};
use crate::domain::ports::{
    ChatService, CollaboratorError, LanguageModel, MessagePayload, ProjectService, TaskPatch,
};
use crate::services::{CacheError, ComputeCache, RetryPolicy, SnapshotStore};

/// Stage of the per-cycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStage {
    Idle,
    Fetching,
    Computing,
    Formatting,
    Delivering,
    Failed,
}

impl CycleStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Computing => "computing",
            Self::Formatting => "formatting",
            Self::Delivering => "delivering",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a cycle moved to Failed.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("collaborator call failed while {stage}: {source}")]
    Collaborator {
        stage: CycleStage,
        source: CollaboratorError,
    },

    #[error("computation failed while {stage}: {source}")]
    Domain {
        stage: CycleStage,
        source: DomainError,
    },

    #[error("cache failure while {stage}: {source}")]
    Cache {
        stage: CycleStage,
        source: CacheError,
    },

    #[error("cycle exceeded its {budget_secs}s wall-clock budget")]
    BudgetExceeded { budget_secs: u64 },
}

impl CycleError {
    pub fn stage(&self) -> CycleStage {
        match self {
            Self::Collaborator { stage, .. }
            | Self::Domain { stage, .. }
            | Self::Cache { stage, .. } => *stage,
            Self::BudgetExceeded { .. } => CycleStage::Failed,
        }
    }
}

/// Severity of a report alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

/// A condition worth surfacing in the delivered report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub severity: AlertSeverity,
    pub message: String,
}

impl Alert {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: AlertSeverity::Warning,
            message: message.into(),
        }
    }

    pub fn critical(message: impl Into<String>) -> Self {
        Self {
            severity: AlertSeverity::Critical,
            message: message.into(),
        }
    }
}

/// Raw state fetched at the start of a cycle. Discarded when the cycle
/// ends; nothing here outlives an invocation.
#[derive(Debug, Clone)]
pub struct CycleInput {
    pub team_id: Uuid,
    pub sprint: Option<Sprint>,
    pub tasks: Vec<Task>,
    pub users: Vec<User>,
}

/// Structured result of a strategy's compute stage.
#[derive(Debug, Clone, Default)]
pub struct ComputedReport {
    pub title: String,
    pub narrative: Option<String>,
    pub snapshots: Vec<MetricSnapshot>,
    pub alerts: Vec<Alert>,
    pub plan: Option<crate::services::AssignmentPlan>,
    pub actionable: Vec<Uuid>,
    pub critical_path: Vec<Uuid>,
}

/// One outbound chat message.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub channel: String,
    pub payload: MessagePayload,
}

/// One task mutation to apply back through the project service.
#[derive(Debug, Clone)]
pub struct TaskUpdate {
    pub task_id: Uuid,
    pub patch: TaskPatch,
}

/// Everything a cycle wants delivered.
#[derive(Debug, Clone, Default)]
pub struct CycleOutput {
    pub messages: Vec<OutboundMessage>,
    pub updates: Vec<TaskUpdate>,
    /// Cache keys the applied updates make stale, dropped once the
    /// updates have landed.
    pub invalidations: Vec<String>,
}

/// Shared collaborator handles and tuning, threaded explicitly through
/// every controller. The cache and the stores are the only shared
/// mutable state.
pub struct Collaborators {
    pub project: Arc<dyn ProjectService>,
    pub chat: Arc<dyn ChatService>,
    pub llm: Arc<dyn LanguageModel>,
    pub cache: ComputeCache,
    pub retry: RetryPolicy,
    pub snapshots: SnapshotStore,
    pub cycles: CycleLog,
    pub config: Config,
}

/// Per-agent compute and format behavior, injected into the shared
/// controller lifecycle (composition, not inheritance).
#[async_trait]
pub trait ReportStrategy: Send + Sync {
    fn kind(&self) -> AgentKind;

    /// Derive the report from fetched state. Graph analysis runs before
    /// any assignment planning inside implementations.
    async fn compute(
        &self,
        env: &Collaborators,
        input: &CycleInput,
    ) -> Result<ComputedReport, CycleError>;

    /// Turn the computed report into messages and task updates.
    fn format(&self, env: &Collaborators, input: &CycleInput, report: &ComputedReport)
        -> CycleOutput;
}

/// Outcome of one cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    Delivered { messages: usize, updates: usize },
    Failed { stage: CycleStage, cause: String },
}

/// Observability record for one cycle invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleRecord {
    pub id: Uuid,
    pub agent: AgentKind,
    pub team_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: CycleOutcome,
}

impl CycleRecord {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, CycleOutcome::Failed { .. })
    }
}

/// Bounded record of cycle outcomes, shared across controllers. The
/// oldest records fall off once the cap is reached, so a long-lived
/// scheduler process holds a fixed window of history.
#[derive(Debug, Clone, Default)]
pub struct CycleLog {
    inner: Arc<RwLock<Vec<CycleRecord>>>,
}

impl CycleLog {
    /// Records retained before the oldest are discarded.
    pub const MAX_RECORDS: usize = 1024;

    pub async fn record(&self, record: CycleRecord) {
        let mut log = self.inner.write().await;
        log.push(record);
        if log.len() > Self::MAX_RECORDS {
            let excess = log.len() - Self::MAX_RECORDS;
            log.drain(..excess);
        }
    }

    pub async fn recent(&self, limit: usize) -> Vec<CycleRecord> {
        let log = self.inner.read().await;
        log.iter().rev().take(limit).cloned().collect()
    }

    pub async fn failure_count(&self) -> usize {
        self.inner.read().await.iter().filter(|r| r.is_failed()).count()
    }
}

/// Drives one agent kind through report cycles.
#[derive(Clone)]
pub struct AgentController {
    strategy: Arc<dyn ReportStrategy>,
    env: Arc<Collaborators>,
}

impl AgentController {
    pub fn new(strategy: Arc<dyn ReportStrategy>, env: Arc<Collaborators>) -> Self {
        Self { strategy, env }
    }

    pub fn kind(&self) -> AgentKind {
        self.strategy.kind()
    }

    /// Run one full cycle. Never panics and never returns an error: the
    /// outcome, success or failure, lands in the returned record and the
    /// cycle log, and failures also produce a diagnostic notification.
    pub async fn run_cycle(&self, team_id: Uuid, sprint_id: Option<Uuid>) -> CycleRecord {
        let started_at = Utc::now();
        let budget_secs = self.env.config.cycle_budget_secs;
        let agent = self.strategy.kind();

        info!(agent = agent.as_str(), %team_id, "cycle starting");

        let result = match timeout(
            Duration::from_secs(budget_secs),
            self.cycle_body(team_id, sprint_id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(CycleError::BudgetExceeded { budget_secs }),
        };

        let outcome = match result {
            Ok((messages, updates)) => {
                info!(agent = agent.as_str(), %team_id, messages, updates, "cycle delivered");
                CycleOutcome::Delivered { messages, updates }
            }
            Err(err) => {
                let stage = err.stage();
                error!(agent = agent.as_str(), %team_id, %stage, error = %err, "cycle failed");
                self.emit_diagnostic(team_id, &err).await;
                CycleOutcome::Failed {
                    stage,
                    cause: err.to_string(),
                }
            }
        };

        let record = CycleRecord {
            id: Uuid::new_v4(),
            agent,
            team_id,
            started_at,
            finished_at: Utc::now(),
            outcome,
        };
        self.env.cycles.record(record.clone()).await;
        record
    }

    async fn cycle_body(
        &self,
        team_id: Uuid,
        sprint_id: Option<Uuid>,
    ) -> Result<(usize, usize), CycleError> {
        let env = &self.env;

        // Fetching: always re-fetch, never reuse a prior cycle's copy.
        let fetch = |source: CollaboratorError| CycleError::Collaborator {
            stage: CycleStage::Fetching,
            source,
        };
        let sprint = env
            .retry
            .execute(|| env.project.fetch_active_sprint(team_id))
            .await
            .map_err(fetch)?;
        let effective_sprint = sprint_id.or_else(|| sprint.as_ref().map(|s| s.id));
        let tasks = env
            .retry
            .execute(|| env.project.fetch_tasks(team_id, effective_sprint))
            .await
            .map_err(fetch)?;
        let users = env
            .retry
            .execute(|| env.project.fetch_users(team_id))
            .await
            .map_err(fetch)?;

        let input = CycleInput {
            team_id,
            sprint,
            tasks,
            users,
        };

        // Computing
        let report = self.strategy.compute(env, &input).await?;
        env.snapshots.record_all(report.snapshots.clone()).await;
        env.snapshots.prune(Utc::now()).await;

        // Formatting
        let output = self.strategy.format(env, &input, &report);

        // Delivering: task updates first so notifications describe
        // applied state. At-least-once: already-delivered pieces are not
        // retracted if a later one fails.
        let deliver = |source: CollaboratorError| CycleError::Collaborator {
            stage: CycleStage::Delivering,
            source,
        };
        for update in &output.updates {
            env.retry
                .execute(|| env.project.update_task(update.task_id, update.patch.clone()))
                .await
                .map_err(deliver)?;
        }
        for key in &output.invalidations {
            env.cache.invalidate(key);
        }
        for message in &output.messages {
            env.retry
                .execute(|| env.chat.post_message(&message.channel, message.payload.clone()))
                .await
                .map_err(deliver)?;
        }

        Ok((output.messages.len(), output.updates.len()))
    }

    /// Best-effort failure notification; a dead chat service must not
    /// mask the original failure.
    async fn emit_diagnostic(&self, team_id: Uuid, err: &CycleError) {
        let payload = MessagePayload::text(format!(
            ":rotating_light: {} cycle failed for team {team_id}: {err}",
            self.strategy.kind().as_str()
        ));
        if let Err(post_err) = self
            .env
            .chat
            .post_message(&self.env.config.chat.diagnostics_channel, payload)
            .await
        {
            warn!(error = %post_err, "diagnostic notification could not be delivered");
        }
    }
}
