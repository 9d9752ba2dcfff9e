//! Foreman - Team-Lead Agent Orchestration
//!
//! Foreman runs scheduled reporting agents over project-management data:
//! it analyzes task dependency graphs, balances assignments across a
//! roster, aggregates sprint metrics, and delivers narrative reports to
//! chat, with single-flight caching in front of expensive computations.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Pure models and collaborator ports
//! - **Service Layer** (`services`): Graph, assignment, metrics, cache, retry
//! - **Application Layer** (`application`): Agent controllers and the scheduler
//! - **Adapters** (`adapters`): Local implementations of the ports
//! - **Infrastructure Layer** (`infrastructure`): Configuration loading
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use foreman::application::{AgentController, TeamLeadStrategy};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Build collaborators, then run a cycle on demand
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::{
    AgentController, Collaborators, CycleOutcome, CycleRecord, ReportScheduler, ReportStrategy,
    TaskManagementStrategy, TeamLeadStrategy,
};
pub use domain::models::{
    AgentKind, Config, MetricScope, MetricSnapshot, ReportKind, Sprint, Task, TaskPriority,
    TaskStatus, User,
};
pub use domain::ports::{
    ChatService, CollaboratorError, KeyValueStore, LanguageModel, ProjectService, TaskPatch,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    AssignmentOptimizer, ComputeCache, DependencyGraph, MetricsAggregator, RetryPolicy,
};
