//! Configuration model.
//!
//! Everything tunable is carried in one explicit struct threaded through
//! controller construction. There is no ambient global configuration.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Main configuration structure for foreman.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Cache TTL windows per computation kind
    #[serde(default)]
    pub cache: CacheConfig,

    /// Retry policy for external collaborator calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Team-health metric weighting
    #[serde(default)]
    pub metrics: MetricWeights,

    /// Assignment optimizer tuning
    #[serde(default)]
    pub assignment: AssignmentConfig,

    /// Chat channels for reports and diagnostics
    #[serde(default)]
    pub chat: ChatConfig,

    /// Language-model request parameters
    #[serde(default)]
    pub llm: LlmConfig,

    /// Scheduled report cycles
    #[serde(default = "default_schedules")]
    pub schedules: Vec<ScheduleConfig>,

    /// Wall-clock budget for a single agent cycle, in seconds
    #[serde(default = "default_cycle_budget_secs")]
    pub cycle_budget_secs: u64,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

const fn default_cycle_budget_secs() -> u64 {
    300
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            retry: RetryConfig::default(),
            metrics: MetricWeights::default(),
            assignment: AssignmentConfig::default(),
            chat: ChatConfig::default(),
            llm: LlmConfig::default(),
            schedules: default_schedules(),
            cycle_budget_secs: default_cycle_budget_secs(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Cache TTLs, in seconds, per computation kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CacheConfig {
    /// Sprint report narratives (default 7 days)
    #[serde(default = "default_report_ttl")]
    pub report_ttl_secs: u64,

    /// Blocker/dependency analyses (default 1 hour)
    #[serde(default = "default_analysis_ttl")]
    pub analysis_ttl_secs: u64,

    /// Workload distribution aggregates (default 15 minutes)
    #[serde(default = "default_workload_ttl")]
    pub workload_ttl_secs: u64,
}

const fn default_report_ttl() -> u64 {
    60 * 60 * 24 * 7
}

const fn default_analysis_ttl() -> u64 {
    60 * 60
}

const fn default_workload_ttl() -> u64 {
    60 * 15
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            report_ttl_secs: default_report_ttl(),
            analysis_ttl_secs: default_analysis_ttl(),
            workload_ttl_secs: default_workload_ttl(),
        }
    }
}

/// Retry policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Total attempts including the first (must be >= 1)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff in milliseconds
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    /// Backoff ceiling in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Jitter fraction in [0, 1]; each delay is scaled by a factor
    /// drawn uniformly from [1 - jitter, 1 + jitter]
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

const fn default_max_attempts() -> u32 {
    4
}

const fn default_base_backoff_ms() -> u64 {
    500
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

const fn default_jitter() -> f64 {
    0.2
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            jitter: default_jitter(),
        }
    }
}

/// Weights for the team health score. The score is a weighted mean of
/// completion rate, normalized inverted cycle time, and workload balance;
/// weights are renormalized over the terms that have data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MetricWeights {
    #[serde(default = "default_completion_weight")]
    pub completion_weight: f64,

    #[serde(default = "default_cycle_time_weight")]
    pub cycle_time_weight: f64,

    #[serde(default = "default_balance_weight")]
    pub balance_weight: f64,

    /// Cycle-time normalization scale: an average cycle time of this many
    /// hours scores 0.5 on the inverted scale.
    #[serde(default = "default_cycle_time_norm_hours")]
    pub cycle_time_norm_hours: f64,

    /// Health scores below this raise a critical alert.
    #[serde(default = "default_health_alert_threshold")]
    pub health_alert_threshold: f64,
}

const fn default_health_alert_threshold() -> f64 {
    0.4
}

const fn default_completion_weight() -> f64 {
    0.4
}

const fn default_cycle_time_weight() -> f64 {
    0.3
}

const fn default_balance_weight() -> f64 {
    0.3
}

const fn default_cycle_time_norm_hours() -> f64 {
    48.0
}

impl Default for MetricWeights {
    fn default() -> Self {
        Self {
            completion_weight: default_completion_weight(),
            cycle_time_weight: default_cycle_time_weight(),
            balance_weight: default_balance_weight(),
            cycle_time_norm_hours: default_cycle_time_norm_hours(),
            health_alert_threshold: default_health_alert_threshold(),
        }
    }
}

/// Assignment optimizer tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AssignmentConfig {
    /// Fraction above capacity tolerated before an assignment is flagged
    /// as over-capacity (soft constraint, never a hard rejection)
    #[serde(default = "default_capacity_tolerance")]
    pub capacity_tolerance: f64,
}

const fn default_capacity_tolerance() -> f64 {
    0.1
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            capacity_tolerance: default_capacity_tolerance(),
        }
    }
}

/// Chat channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ChatConfig {
    #[serde(default = "default_reports_channel")]
    pub reports_channel: String,

    #[serde(default = "default_diagnostics_channel")]
    pub diagnostics_channel: String,
}

fn default_reports_channel() -> String {
    "#team-reports".to_string()
}

fn default_diagnostics_channel() -> String {
    "#agent-diagnostics".to_string()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            reports_channel: default_reports_channel(),
            diagnostics_channel: default_diagnostics_channel(),
        }
    }
}

/// Language-model request parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LlmConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

fn default_model() -> String {
    "gpt-4-turbo-preview".to_string()
}

const fn default_max_tokens() -> u32 {
    1024
}

const fn default_temperature() -> f64 {
    0.2
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

/// Which agent a schedule drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    TeamLead,
    TaskManagement,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TeamLead => "team_lead",
            Self::TaskManagement => "task_management",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "team_lead" | "teamlead" => Some(Self::TeamLead),
            "task_management" | "taskmanagement" => Some(Self::TaskManagement),
            _ => None,
        }
    }
}

/// Which report a team-lead cycle produces. Ignored by the
/// task-management agent, which has a single report shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    /// Full end-of-sprint report with metrics, alerts, and narrative.
    #[default]
    Sprint,
    /// Light mid-sprint check-in; only runs while a sprint is active.
    Progress,
    /// Weekly KPI targets derived from recorded metric history.
    Kpi,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sprint => "sprint",
            Self::Progress => "progress",
            Self::Kpi => "kpi",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sprint" => Some(Self::Sprint),
            "progress" => Some(Self::Progress),
            "kpi" => Some(Self::Kpi),
            _ => None,
        }
    }
}

/// One scheduled report cycle (cron expression, 6-field with seconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ScheduleConfig {
    pub name: String,
    pub agent: AgentKind,
    pub team_id: Uuid,
    pub cron: String,
    #[serde(default)]
    pub report: ReportKind,
    #[serde(default)]
    pub sprint_id: Option<Uuid>,
}

/// Stock weekly cadence: Friday sprint report, Wednesday progress
/// check-in, Monday KPI targets. The nil team id stands for the
/// deployment's default team until overridden in configuration.
fn default_schedules() -> Vec<ScheduleConfig> {
    let entry = |name: &str, cron: &str, report| ScheduleConfig {
        name: name.to_string(),
        agent: AgentKind::TeamLead,
        team_id: Uuid::nil(),
        cron: cron.to_string(),
        report,
        sprint_id: None,
    };
    vec![
        entry("friday-sprint-report", "0 0 16 * * Fri", ReportKind::Sprint),
        entry(
            "wednesday-progress-report",
            "0 0 12 * * Wed",
            ReportKind::Progress,
        ),
        entry("monday-kpi-targets", "0 0 9 * * Mon", ReportKind::Kpi),
    ]
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert!(config.retry.max_attempts >= 1);
        assert!(config.retry.base_backoff_ms <= config.retry.max_backoff_ms);
        assert!(config.metrics.completion_weight > 0.0);
        assert_eq!(config.cache.analysis_ttl_secs, 3600);
    }

    #[test]
    fn default_schedules_cover_the_weekly_cadence() {
        let config = Config::default();
        assert_eq!(config.schedules.len(), 3);

        let reports: Vec<ReportKind> = config.schedules.iter().map(|s| s.report).collect();
        assert_eq!(
            reports,
            vec![ReportKind::Sprint, ReportKind::Progress, ReportKind::Kpi]
        );
        use std::str::FromStr;
        for schedule in &config.schedules {
            assert_eq!(schedule.agent, AgentKind::TeamLead);
            assert!(
                cron::Schedule::from_str(&schedule.cron).is_ok(),
                "default cron '{}' must parse",
                schedule.cron
            );
        }
    }

    #[test]
    fn agent_kind_parses_both_spellings() {
        assert_eq!(AgentKind::from_str("team-lead"), Some(AgentKind::TeamLead));
        assert_eq!(
            AgentKind::from_str("task_management"),
            Some(AgentKind::TaskManagement)
        );
        assert_eq!(AgentKind::from_str("unknown"), None);
    }
}
