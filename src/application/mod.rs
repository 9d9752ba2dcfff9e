//! Application layer: agent controllers, strategies, and the scheduler.

pub mod controller;
pub mod scheduler;
pub mod task_management;
pub mod team_lead;

pub use controller::{
    AgentController, Alert, AlertSeverity, Collaborators, ComputedReport, CycleError, CycleInput,
    CycleLog, CycleOutcome, CycleOutput, CycleRecord, CycleStage, OutboundMessage, ReportStrategy,
    TaskUpdate,
};
pub use scheduler::ReportScheduler;
pub use task_management::TaskManagementStrategy;
pub use team_lead::TeamLeadStrategy;
