//! End-to-end agent cycle tests against scripted collaborators.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use uuid::Uuid;

use foreman::application::{
    AgentController, Collaborators, CycleLog, CycleOutcome, CycleStage, TaskManagementStrategy,
    TeamLeadStrategy,
};
use foreman::domain::models::{
    Config, MetricScope, MetricSnapshot, ReportKind, Sprint, Task, TaskStatus, User,
};
use foreman::domain::ports::{
    ChatService, CollaboratorError, CompletionParams, LanguageModel, MessagePayload,
    ProjectService, TaskPatch,
};
use foreman::services::{ComputeCache, RetryPolicy, SnapshotStore};

/// Project-management double with a switchable failure mode and a record
/// of applied task patches.
struct ScriptedProjectService {
    tasks: Mutex<Vec<Task>>,
    users: Vec<User>,
    sprint: Option<Sprint>,
    failing: AtomicBool,
    slow: bool,
    updates: Mutex<Vec<(Uuid, TaskPatch)>>,
}

impl ScriptedProjectService {
    fn new(tasks: Vec<Task>, users: Vec<User>, sprint: Option<Sprint>) -> Self {
        Self {
            tasks: Mutex::new(tasks),
            users,
            sprint,
            failing: AtomicBool::new(false),
            slow: false,
            updates: Mutex::new(Vec::new()),
        }
    }

    fn check(&self) -> Result<(), CollaboratorError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(CollaboratorError::Auth)
        } else {
            Ok(())
        }
    }

    async fn stall(&self) {
        if self.slow {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        }
    }
}

#[async_trait]
impl ProjectService for ScriptedProjectService {
    async fn fetch_tasks(
        &self,
        _team_id: Uuid,
        _sprint_id: Option<Uuid>,
    ) -> Result<Vec<Task>, CollaboratorError> {
        self.check()?;
        self.stall().await;
        Ok(self.tasks.lock().expect("tasks lock").clone())
    }

    async fn fetch_users(&self, _team_id: Uuid) -> Result<Vec<User>, CollaboratorError> {
        self.check()?;
        Ok(self.users.clone())
    }

    async fn fetch_active_sprint(
        &self,
        _team_id: Uuid,
    ) -> Result<Option<Sprint>, CollaboratorError> {
        self.check()?;
        self.stall().await;
        Ok(self.sprint.clone())
    }

    async fn update_task(
        &self,
        task_id: Uuid,
        patch: TaskPatch,
    ) -> Result<Task, CollaboratorError> {
        self.check()?;
        let mut tasks = self.tasks.lock().expect("tasks lock");
        let task = tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| CollaboratorError::NotFound(task_id.to_string()))?;
        if let Some(assignee) = patch.assignee {
            task.assignee = Some(assignee);
        }
        if let Some(status) = patch.status {
            task.status = status;
        }
        self.updates
            .lock()
            .expect("updates lock")
            .push((task_id, patch));
        Ok(task.clone())
    }
}

/// Chat double that records every delivered message.
#[derive(Default)]
struct RecordingChatService {
    sent: Mutex<Vec<(String, MessagePayload)>>,
}

impl RecordingChatService {
    fn sent(&self) -> Vec<(String, MessagePayload)> {
        self.sent.lock().expect("sent lock").clone()
    }
}

#[async_trait]
impl ChatService for RecordingChatService {
    async fn post_message(
        &self,
        channel: &str,
        payload: MessagePayload,
    ) -> Result<String, CollaboratorError> {
        let mut sent = self.sent.lock().expect("sent lock");
        sent.push((channel.to_string(), payload));
        Ok(format!("ts-{}", sent.len()))
    }
}

struct FixedLanguageModel;

#[async_trait]
impl LanguageModel for FixedLanguageModel {
    async fn complete(
        &self,
        _prompt: &str,
        _params: &CompletionParams,
    ) -> Result<String, CollaboratorError> {
        Ok("Sprint is on track.".to_string())
    }
}

fn build_env(
    project: Arc<ScriptedProjectService>,
    chat: Arc<RecordingChatService>,
    config: Config,
) -> Arc<Collaborators> {
    Arc::new(Collaborators {
        project,
        chat,
        llm: Arc::new(FixedLanguageModel),
        cache: ComputeCache::new(),
        retry: RetryPolicy::new(&config.retry),
        snapshots: SnapshotStore::new(ChronoDuration::days(90)),
        cycles: CycleLog::default(),
        config,
    })
}

fn sample_tasks(assignee: Uuid) -> Vec<Task> {
    let mut done = Task::new("ship login page", 3.0);
    done.status = TaskStatus::Done;
    done.assignee = Some(assignee);
    let start = Utc::now() - ChronoDuration::days(2);
    done.started_at = Some(start);
    done.completed_at = Some(start + ChronoDuration::hours(20));

    let mut in_progress = Task::new("wire billing API", 5.0);
    in_progress.status = TaskStatus::InProgress;
    in_progress.assignee = Some(assignee);
    in_progress.started_at = Some(Utc::now() - ChronoDuration::hours(6));

    let mut backlog = Task::new("write release notes", 1.0);
    backlog.depends_on.insert(in_progress.id);

    vec![done, in_progress, backlog]
}

#[tokio::test]
async fn team_lead_cycle_delivers_report_and_snapshots() {
    let mut user = User::new("dana", 10.0);
    user.skills.insert("rust".to_string());
    let team_id = Uuid::new_v4();
    let sprint = Sprint::new(
        team_id,
        "sprint 12",
        Utc::now() - ChronoDuration::days(7),
        Utc::now() + ChronoDuration::days(7),
    );

    let project = Arc::new(ScriptedProjectService::new(
        sample_tasks(user.id),
        vec![user],
        Some(sprint.clone()),
    ));
    let chat = Arc::new(RecordingChatService::default());
    let env = build_env(Arc::clone(&project), Arc::clone(&chat), Config::default());

    let controller = AgentController::new(Arc::new(TeamLeadStrategy::default()), Arc::clone(&env));
    let record = controller.run_cycle(team_id, None).await;

    assert!(
        matches!(record.outcome, CycleOutcome::Delivered { messages: 1, updates: 0 }),
        "unexpected outcome: {:?}",
        record.outcome
    );

    let sent = chat.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "#team-reports");
    assert!(sent[0].1.text.contains("Sprint report"));
    assert!(sent[0].1.text.contains("Sprint is on track."));
    assert_eq!(sent[0].1.blocks.len(), 1);

    let completion = env
        .snapshots
        .history(MetricScope::Team(team_id), "completion_rate")
        .await;
    assert_eq!(completion.len(), 1);
    assert!((completion[0].value - 1.0 / 3.0).abs() < 1e-9);

    let velocity = env
        .snapshots
        .history(MetricScope::Sprint(sprint.id), "velocity")
        .await;
    assert_eq!(velocity.len(), 1);
    assert!((velocity[0].value - 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn fetch_failure_emits_diagnostic_and_next_cycle_recovers() {
    let user = User::new("lee", 10.0);
    let team_id = Uuid::new_v4();
    let project = Arc::new(ScriptedProjectService::new(
        sample_tasks(user.id),
        vec![user],
        None,
    ));
    project.failing.store(true, Ordering::SeqCst);

    let chat = Arc::new(RecordingChatService::default());
    let env = build_env(Arc::clone(&project), Arc::clone(&chat), Config::default());
    let controller = AgentController::new(Arc::new(TeamLeadStrategy::default()), Arc::clone(&env));

    let record = controller.run_cycle(team_id, None).await;
    match &record.outcome {
        CycleOutcome::Failed { stage, cause } => {
            assert_eq!(*stage, CycleStage::Fetching);
            assert!(cause.contains("authentication"), "cause: {cause}");
        }
        other => panic!("expected failure, got {other:?}"),
    }

    let sent = chat.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "#agent-diagnostics");
    assert!(sent[0].1.text.contains("cycle failed"));

    // The failure is isolated to its invocation.
    project.failing.store(false, Ordering::SeqCst);
    let record = controller.run_cycle(team_id, None).await;
    assert!(matches!(record.outcome, CycleOutcome::Delivered { .. }));

    assert_eq!(env.cycles.failure_count().await, 1);
    assert_eq!(env.cycles.recent(10).await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn cycle_budget_timeout_marks_cycle_failed() {
    let user = User::new("sam", 10.0);
    let team_id = Uuid::new_v4();
    let mut project = ScriptedProjectService::new(sample_tasks(user.id), vec![user], None);
    project.slow = true;
    let project = Arc::new(project);

    let config = Config {
        cycle_budget_secs: 1,
        ..Config::default()
    };

    let chat = Arc::new(RecordingChatService::default());
    let env = build_env(Arc::clone(&project), Arc::clone(&chat), config);
    let controller = AgentController::new(Arc::new(TeamLeadStrategy::default()), env);

    let record = controller.run_cycle(team_id, None).await;
    match &record.outcome {
        CycleOutcome::Failed { cause, .. } => {
            assert!(cause.contains("budget"), "cause: {cause}");
        }
        other => panic!("expected budget failure, got {other:?}"),
    }
}

#[tokio::test]
async fn dependency_cycle_fails_at_computing_stage() {
    let mut a = Task::new("a", 1.0);
    let mut b = Task::new("b", 1.0);
    a.depends_on.insert(b.id);
    b.depends_on.insert(a.id);

    let team_id = Uuid::new_v4();
    let project = Arc::new(ScriptedProjectService::new(vec![a, b], Vec::new(), None));
    let chat = Arc::new(RecordingChatService::default());
    let env = build_env(Arc::clone(&project), Arc::clone(&chat), Config::default());
    let controller = AgentController::new(Arc::new(TaskManagementStrategy), env);

    let record = controller.run_cycle(team_id, None).await;
    match &record.outcome {
        CycleOutcome::Failed { stage, cause } => {
            assert_eq!(*stage, CycleStage::Computing);
            assert!(cause.contains("cycle"), "cause: {cause}");
        }
        other => panic!("expected computing failure, got {other:?}"),
    }
}

#[tokio::test]
async fn task_management_assigns_unowned_tasks_and_notifies() {
    let mut rustacean = User::new("avery", 10.0);
    rustacean.skills.insert("rust".to_string());

    let mut unowned = Task::new("fix flaky parser test", 2.0);
    unowned.required_skills.insert("rust".to_string());

    let team_id = Uuid::new_v4();
    let project = Arc::new(ScriptedProjectService::new(
        vec![unowned.clone()],
        vec![rustacean.clone()],
        None,
    ));
    let chat = Arc::new(RecordingChatService::default());
    let env = build_env(Arc::clone(&project), Arc::clone(&chat), Config::default());
    let controller = AgentController::new(Arc::new(TaskManagementStrategy), env);

    let record = controller.run_cycle(team_id, None).await;
    assert!(
        matches!(record.outcome, CycleOutcome::Delivered { messages: 2, updates: 1 }),
        "unexpected outcome: {:?}",
        record.outcome
    );

    // Updates land before notifications, and the patch carries an
    // idempotency key for the retried write path.
    let updates = project.updates.lock().expect("updates lock").clone();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].0, unowned.id);
    assert_eq!(updates[0].1.assignee, Some(rustacean.id));
    assert!(updates[0].1.idempotency_key.is_some());

    let sent = chat.sent();
    assert_eq!(sent[0].0, "#team-reports");
    assert!(sent[0].1.text.contains("fix flaky parser test"));
    assert_eq!(sent[1].0, format!("@{}", rustacean.id));
    assert!(sent[1].1.text.contains("assigned"));
}

#[tokio::test]
async fn narrative_is_cached_across_cycles() {
    struct CountingLanguageModel {
        calls: std::sync::atomic::AtomicU32,
    }

    #[async_trait]
    impl LanguageModel for CountingLanguageModel {
        async fn complete(
            &self,
            _prompt: &str,
            _params: &CompletionParams,
        ) -> Result<String, CollaboratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("cached narrative".to_string())
        }
    }

    let user = User::new("kim", 10.0);
    let team_id = Uuid::new_v4();
    let project = Arc::new(ScriptedProjectService::new(
        sample_tasks(user.id),
        vec![user],
        None,
    ));
    let chat = Arc::new(RecordingChatService::default());
    let llm = Arc::new(CountingLanguageModel {
        calls: std::sync::atomic::AtomicU32::new(0),
    });

    let config = Config::default();
    let env = Arc::new(Collaborators {
        project,
        chat,
        llm: Arc::clone(&llm) as Arc<dyn LanguageModel>,
        cache: ComputeCache::new(),
        retry: RetryPolicy::new(&config.retry),
        snapshots: SnapshotStore::new(ChronoDuration::days(90)),
        cycles: CycleLog::default(),
        config,
    });
    let controller = AgentController::new(Arc::new(TeamLeadStrategy::default()), env);

    let first = controller.run_cycle(team_id, None).await;
    let second = controller.run_cycle(team_id, None).await;
    assert!(matches!(first.outcome, CycleOutcome::Delivered { .. }));
    assert!(matches!(second.outcome, CycleOutcome::Delivered { .. }));

    // Same team+sprint key within the TTL: one completion call total.
    assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn progress_report_only_runs_while_a_sprint_is_active() {
    let user = User::new("noor", 10.0);
    let team_id = Uuid::new_v4();
    let ended = Sprint::new(
        team_id,
        "sprint 11",
        Utc::now() - ChronoDuration::days(21),
        Utc::now() - ChronoDuration::days(7),
    );

    let project = Arc::new(ScriptedProjectService::new(
        sample_tasks(user.id),
        vec![user.clone()],
        Some(ended),
    ));
    let chat = Arc::new(RecordingChatService::default());
    let env = build_env(Arc::clone(&project), Arc::clone(&chat), Config::default());

    let controller = AgentController::new(
        Arc::new(TeamLeadStrategy::new(ReportKind::Progress)),
        Arc::clone(&env),
    );

    // The sprint is over: the check-in delivers nothing, and the cycle
    // still counts as a success.
    let record = controller.run_cycle(team_id, None).await;
    assert!(
        matches!(record.outcome, CycleOutcome::Delivered { messages: 0, updates: 0 }),
        "unexpected outcome: {:?}",
        record.outcome
    );
    assert!(chat.sent().is_empty());

    // With a sprint in progress a single check-in goes out, with no
    // snapshots recorded on the light path.
    let active = Sprint::new(
        team_id,
        "sprint 12",
        Utc::now() - ChronoDuration::days(3),
        Utc::now() + ChronoDuration::days(11),
    );
    let project = Arc::new(ScriptedProjectService::new(
        sample_tasks(user.id),
        vec![user],
        Some(active),
    ));
    let chat = Arc::new(RecordingChatService::default());
    let env = build_env(Arc::clone(&project), Arc::clone(&chat), Config::default());
    let controller = AgentController::new(
        Arc::new(TeamLeadStrategy::new(ReportKind::Progress)),
        Arc::clone(&env),
    );

    let record = controller.run_cycle(team_id, None).await;
    assert!(
        matches!(record.outcome, CycleOutcome::Delivered { messages: 1, updates: 0 }),
        "unexpected outcome: {:?}",
        record.outcome
    );
    let sent = chat.sent();
    assert!(sent[0].1.text.contains("Progress check-in - sprint 12"));
    assert!(env
        .snapshots
        .history(MetricScope::Team(team_id), "completion_rate")
        .await
        .is_empty());
}

#[tokio::test]
async fn kpi_report_reads_recorded_history_for_trends() {
    let user = User::new("priya", 10.0);
    let team_id = Uuid::new_v4();
    let project = Arc::new(ScriptedProjectService::new(
        sample_tasks(user.id),
        vec![user],
        None,
    ));
    let chat = Arc::new(RecordingChatService::default());
    let env = build_env(Arc::clone(&project), Arc::clone(&chat), Config::default());

    // A prior cycle left a perfect health score behind; the current
    // state cannot match it, so the trend alert must fire.
    env.snapshots
        .record(MetricSnapshot::new(
            MetricScope::Team(team_id),
            "health_score",
            1.0,
        ))
        .await;

    let controller = AgentController::new(
        Arc::new(TeamLeadStrategy::new(ReportKind::Kpi)),
        Arc::clone(&env),
    );
    let record = controller.run_cycle(team_id, None).await;
    assert!(
        matches!(record.outcome, CycleOutcome::Delivered { messages: 1, updates: 0 }),
        "unexpected outcome: {:?}",
        record.outcome
    );

    let sent = chat.sent();
    assert!(sent[0].1.text.contains("KPI targets"));
    assert!(sent[0].1.text.contains("health score declining"));

    // The KPI pass records its own aggregates, extending the trend.
    let health = env
        .snapshots
        .history(MetricScope::Team(team_id), "health_score")
        .await;
    assert_eq!(health.len(), 2);
    assert!(health[1].value < health[0].value);
}

#[tokio::test]
async fn applied_assignments_invalidate_the_cached_workloads() {
    let mut rustacean = User::new("kofi", 10.0);
    rustacean.skills.insert("rust".to_string());
    let mut unowned = Task::new("profile the hot loop", 2.0);
    unowned.required_skills.insert("rust".to_string());

    let team_id = Uuid::new_v4();
    let project = Arc::new(ScriptedProjectService::new(
        vec![unowned],
        vec![rustacean],
        None,
    ));
    let chat = Arc::new(RecordingChatService::default());
    let env = build_env(Arc::clone(&project), Arc::clone(&chat), Config::default());
    let controller = AgentController::new(Arc::new(TaskManagementStrategy), Arc::clone(&env));

    let record = controller.run_cycle(team_id, None).await;
    assert!(matches!(
        record.outcome,
        CycleOutcome::Delivered { updates: 1, .. }
    ));

    // Compute memoized the per-user loads, but applying the assignment
    // made them stale, so delivery must have dropped the entry.
    assert!(!env.cache.contains_fresh(&format!("workload:{team_id}")));

    // The blocker analysis was untouched by the updates and stays warm.
    assert!(env.cache.contains_fresh(&format!("task_analysis:{team_id}")));
}

#[tokio::test]
async fn snapshots_outside_the_retention_window_are_pruned() {
    let user = User::new("mara", 10.0);
    let team_id = Uuid::new_v4();
    let project = Arc::new(ScriptedProjectService::new(
        sample_tasks(user.id),
        vec![user],
        None,
    ));
    let chat = Arc::new(RecordingChatService::default());

    let config = Config::default();
    let env = Arc::new(Collaborators {
        project,
        chat,
        llm: Arc::new(FixedLanguageModel),
        cache: ComputeCache::new(),
        retry: RetryPolicy::new(&config.retry),
        snapshots: SnapshotStore::new(ChronoDuration::days(7)),
        cycles: CycleLog::default(),
        config,
    });

    let mut stale = MetricSnapshot::new(MetricScope::Team(team_id), "completion_rate", 0.5);
    stale.computed_at = Utc::now() - ChronoDuration::days(30);
    env.snapshots.record(stale).await;

    let controller =
        AgentController::new(Arc::new(TeamLeadStrategy::default()), Arc::clone(&env));
    let record = controller.run_cycle(team_id, None).await;
    assert!(matches!(record.outcome, CycleOutcome::Delivered { .. }));

    // The cycle's own snapshot survives; the month-old one is gone.
    let history = env
        .snapshots
        .history(MetricScope::Team(team_id), "completion_rate")
        .await;
    assert_eq!(history.len(), 1);
    assert!(history[0].computed_at > Utc::now() - ChronoDuration::days(1));
}
