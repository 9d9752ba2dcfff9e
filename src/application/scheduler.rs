//! Cron-driven report scheduler.
//!
//! Holds the configured schedule entries and fires agent cycles when
//! they come due. Cycles run in spawned tasks, so schedules for
//! different teams and agents overlap freely, and a failed cycle never
//! stops the loop (the controller already isolates failures).

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::models::{AgentKind, ReportKind, ScheduleConfig};

use super::controller::{AgentController, Collaborators};
use super::task_management::TaskManagementStrategy;
use super::team_lead::TeamLeadStrategy;

/// One armed schedule, bound to the controller it fires.
struct Entry {
    name: String,
    agent: AgentKind,
    report: ReportKind,
    team_id: Uuid,
    sprint_id: Option<Uuid>,
    schedule: cron::Schedule,
    next_fire: Option<DateTime<Utc>>,
    controller: AgentController,
}

impl Entry {
    fn rearm(&mut self, now: DateTime<Utc>) {
        self.next_fire = self.schedule.after(&now).next();
    }
}

/// Fires report cycles on their cron schedules.
pub struct ReportScheduler {
    entries: Vec<Entry>,
    stopped: Arc<AtomicBool>,
    tick: Duration,
}

impl ReportScheduler {
    /// Build from validated schedule configs. Invalid cron expressions
    /// are rejected here as well as at config load. Each entry gets a
    /// controller wired for its agent and report kind.
    pub fn new(schedules: &[ScheduleConfig], env: Arc<Collaborators>) -> anyhow::Result<Self> {
        let now = Utc::now();
        let mut entries = Vec::with_capacity(schedules.len());
        for config in schedules {
            let schedule = cron::Schedule::from_str(&config.cron).map_err(|e| {
                anyhow::anyhow!(
                    "invalid cron expression '{}' for '{}': {e}",
                    config.cron,
                    config.name
                )
            })?;
            let controller = match config.agent {
                AgentKind::TeamLead => AgentController::new(
                    Arc::new(TeamLeadStrategy::new(config.report)),
                    Arc::clone(&env),
                ),
                AgentKind::TaskManagement => AgentController::new(
                    Arc::new(TaskManagementStrategy),
                    Arc::clone(&env),
                ),
            };
            let mut entry = Entry {
                name: config.name.clone(),
                agent: config.agent,
                report: config.report,
                team_id: config.team_id,
                sprint_id: config.sprint_id,
                schedule,
                next_fire: None,
                controller,
            };
            entry.rearm(now);
            entries.push(entry);
        }

        Ok(Self {
            entries,
            stopped: Arc::new(AtomicBool::new(false)),
            tick: Duration::from_secs(1),
        })
    }

    /// Handle for signaling the run loop to stop.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stopped)
    }

    /// Spawn cycles for every entry due at `now` and re-arm them.
    /// Returns how many cycles were launched.
    pub fn fire_due(&mut self, now: DateTime<Utc>) -> usize {
        let mut fired = 0;
        for entry in &mut self.entries {
            let due = entry.next_fire.is_some_and(|at| at <= now);
            if !due {
                continue;
            }
            info!(
                schedule = %entry.name,
                agent = entry.agent.as_str(),
                report = entry.report.as_str(),
                team_id = %entry.team_id,
                "schedule fired"
            );
            let controller = entry.controller.clone();
            let team_id = entry.team_id;
            let sprint_id = entry.sprint_id;
            tokio::spawn(async move {
                controller.run_cycle(team_id, sprint_id).await;
            });
            entry.rearm(now);
            fired += 1;
        }
        fired
    }

    /// Run until the stop handle is flipped.
    pub async fn run(&mut self) {
        if self.entries.is_empty() {
            warn!("no schedules configured, scheduler exiting");
            return;
        }
        info!(entries = self.entries.len(), "scheduler running");
        while !self.stopped.load(Ordering::Relaxed) {
            self.fire_due(Utc::now());
            tokio::time::sleep(self.tick).await;
        }
        info!("scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::local::{
        ConsoleChatService, Fixture, FixtureProjectService, StaticLanguageModel,
    };
    use crate::domain::models::Config;
    use crate::services::{ComputeCache, RetryPolicy, SnapshotStore};
    use crate::application::CycleLog;
    use chrono::Duration as ChronoDuration;

    fn env() -> Arc<Collaborators> {
        Arc::new(Collaborators {
            project: Arc::new(FixtureProjectService::new(Fixture::default())),
            chat: Arc::new(ConsoleChatService),
            llm: Arc::new(StaticLanguageModel),
            cache: ComputeCache::new(),
            retry: RetryPolicy::default(),
            snapshots: SnapshotStore::default(),
            cycles: CycleLog::default(),
            config: Config::default(),
        })
    }

    #[tokio::test]
    async fn default_schedules_arm_one_entry_per_report() {
        let config = Config::default();
        let scheduler = ReportScheduler::new(&config.schedules, env()).unwrap();

        assert_eq!(scheduler.entries.len(), 3);
        let reports: Vec<ReportKind> = scheduler.entries.iter().map(|e| e.report).collect();
        assert_eq!(
            reports,
            vec![ReportKind::Sprint, ReportKind::Progress, ReportKind::Kpi]
        );
        for entry in &scheduler.entries {
            assert_eq!(entry.agent, AgentKind::TeamLead);
            assert_eq!(entry.controller.kind(), AgentKind::TeamLead);
            assert!(entry.next_fire.is_some(), "'{}' must be armed", entry.name);
        }
    }

    #[tokio::test]
    async fn rearm_advances_past_now() {
        let config = Config::default();
        let mut scheduler = ReportScheduler::new(&config.schedules, env()).unwrap();
        let entry = &mut scheduler.entries[0];
        entry.schedule = cron::Schedule::from_str("0 * * * * *").unwrap(); // every minute at :00

        let now = Utc::now();
        entry.rearm(now);
        let next = entry.next_fire.unwrap();
        assert!(next > now);
        assert!(next <= now + ChronoDuration::seconds(60));

        // Re-arming from the fire time moves strictly forward.
        entry.rearm(next);
        assert!(entry.next_fire.unwrap() > next);
    }

    #[tokio::test]
    async fn due_entries_fire_once_and_rearm() {
        let config = Config::default();
        let mut scheduler = ReportScheduler::new(&config.schedules, env()).unwrap();
        let now = Utc::now();
        scheduler.entries[0].next_fire = Some(now - ChronoDuration::seconds(1));

        assert_eq!(scheduler.fire_due(now), 1);
        assert!(scheduler.entries[0].next_fire.unwrap() > now);
        // Nothing is due anymore.
        assert_eq!(scheduler.fire_due(now), 0);
    }
}
