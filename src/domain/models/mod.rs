//! Domain models for the foreman orchestration core.

pub mod config;
pub mod metrics;
pub mod sprint;
pub mod task;
pub mod user;

pub use config::{
    AgentKind, AssignmentConfig, CacheConfig, ChatConfig, Config, LlmConfig, LoggingConfig,
    MetricWeights, ReportKind, RetryConfig, ScheduleConfig,
};
pub use metrics::{MetricScope, MetricSnapshot};
pub use sprint::Sprint;
pub use task::{Task, TaskPriority, TaskStatus};
pub use user::User;
