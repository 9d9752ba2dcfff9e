//! Algorithmic core: graph analysis, assignment planning, metric
//! aggregation, caching, and retry.

pub mod assignment;
pub mod cache;
pub mod dependency_graph;
pub mod metrics;
pub mod retry;

pub use assignment::{Assignment, AssignmentOptimizer, AssignmentPlan, UnassignableTask};
pub use cache::{CacheError, ComputeCache};
pub use dependency_graph::DependencyGraph;
pub use metrics::{MetricsAggregator, SnapshotStore};
pub use retry::RetryPolicy;
