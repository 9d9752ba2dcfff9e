//! Command-line interface.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::Duration as ChronoDuration;
use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

use crate::adapters::{
    ConsoleChatService, Fixture, FixtureProjectService, InMemoryKvStore, StaticLanguageModel,
};
use crate::application::{
    AgentController, Collaborators, CycleLog, ReportScheduler, TaskManagementStrategy,
    TeamLeadStrategy,
};
use crate::domain::models::{AgentKind, Config, ReportKind};
use crate::infrastructure::ConfigLoader;
use crate::services::{ComputeCache, RetryPolicy, SnapshotStore};

#[derive(Parser)]
#[command(name = "foreman", about = "Team-lead and task-management agent cycles", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a YAML config file (defaults to foreman.yaml discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit machine-readable JSON instead of text where applicable
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one agent cycle on demand
    Cycle(CycleArgs),
    /// Run the cron scheduler loop
    Schedule(ScheduleArgs),
}

#[derive(Args)]
pub struct CycleArgs {
    /// Agent to run: team-lead or task-management
    #[arg(long)]
    pub agent: String,

    /// Team-lead report to produce: sprint, progress, or kpi
    #[arg(long, default_value = "sprint")]
    pub report: String,

    /// Team to report on
    #[arg(long)]
    pub team: Uuid,

    /// Restrict to one sprint
    #[arg(long)]
    pub sprint: Option<Uuid>,

    /// YAML fixture with tasks/users/sprints (local project data)
    #[arg(long)]
    pub fixture: Option<PathBuf>,
}

#[derive(Args)]
pub struct ScheduleArgs {
    /// YAML fixture with tasks/users/sprints (local project data)
    #[arg(long)]
    pub fixture: Option<PathBuf>,
}

/// Report a top-level failure and exit nonzero.
pub fn handle_error(err: &anyhow::Error, json: bool) {
    if json {
        eprintln!("{}", serde_json::json!({ "error": format!("{err:#}") }));
    } else {
        eprintln!("error: {err:#}");
    }
    std::process::exit(1);
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

fn build_env(config: Config, fixture: Option<&PathBuf>) -> Result<Arc<Collaborators>> {
    let project = match fixture {
        Some(path) => FixtureProjectService::from_file(path)?,
        None => FixtureProjectService::new(Fixture::default()),
    };
    let retry = RetryPolicy::new(&config.retry);
    Ok(Arc::new(Collaborators {
        project: Arc::new(project),
        chat: Arc::new(ConsoleChatService),
        llm: Arc::new(StaticLanguageModel),
        cache: ComputeCache::with_backing(Arc::new(InMemoryKvStore::new())),
        retry,
        snapshots: SnapshotStore::new(ChronoDuration::days(90)),
        cycles: CycleLog::default(),
        config,
    }))
}

pub async fn run_cycle(args: CycleArgs, config_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let agent = AgentKind::from_str(&args.agent)
        .ok_or_else(|| anyhow::anyhow!("unknown agent '{}'", args.agent))?;
    let report = ReportKind::from_str(&args.report)
        .ok_or_else(|| anyhow::anyhow!("unknown report '{}'", args.report))?;
    let config = load_config(config_path)?;
    let env = build_env(config, args.fixture.as_ref())?;

    let controller = match agent {
        AgentKind::TeamLead => AgentController::new(Arc::new(TeamLeadStrategy::new(report)), env),
        AgentKind::TaskManagement => {
            AgentController::new(Arc::new(TaskManagementStrategy), env)
        }
    };

    let record = controller.run_cycle(args.team, args.sprint).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        println!(
            "cycle {} for team {} finished: {:?}",
            record.id, record.team_id, record.outcome
        );
    }
    if record.is_failed() {
        std::process::exit(1);
    }
    Ok(())
}

pub async fn run_scheduler(args: ScheduleArgs, config_path: Option<&PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let schedules = config.schedules.clone();
    let env = build_env(config, args.fixture.as_ref())?;

    let mut scheduler = ReportScheduler::new(&schedules, env)?;
    let stop = scheduler.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.store(true, std::sync::atomic::Ordering::Relaxed);
        }
    });
    scheduler.run().await;
    Ok(())
}
