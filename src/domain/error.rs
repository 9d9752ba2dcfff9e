//! Domain errors for the foreman orchestration core.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors raised by graph, assignment, and metric computation.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Adding the edge `from -> to` would close a dependency cycle.
    /// The graph is left untouched when this is returned.
    #[error("dependency cycle detected: task {from} cannot depend on {to}")]
    CycleDetected { from: Uuid, to: Uuid },

    #[error("task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: Uuid, dependency: Uuid },

    #[error("task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("validation failed: {0}")]
    ValidationFailed(String),
}

pub type DomainResult<T> = Result<T, DomainError>;
