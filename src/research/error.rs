//! Error taxonomy for research runs.
//!
//! Only planning ([`ConfigurationError`]) and aggregation
//! ([`AggregationError`]) failures abort a whole run. Capability failures are
//! recovered per task and recorded on the task itself.

use crate::research::run::RunPhase;
use crate::research::task::TaskId;
use thiserror::Error;
use uuid::Uuid;

/// The plan for a query could not be built. Fatal: the run is rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Unknown pipeline stage '{0}'")]
    UnknownStage(String),

    #[error("Stage '{stage}' depends on '{dependency}', which is not enabled")]
    DisabledDependency { stage: String, dependency: String },

    #[error("Stage '{0}' depends on itself")]
    SelfDependency(String),

    #[error("Dependency cycle between stages: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("The pipeline produced no tasks for this query")]
    EmptyPlan,
}

/// A terminal run state was malformed. Fatal: the run fails.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AggregationError {
    #[error("Run is in phase '{0}', expected a run whose tasks have all finished")]
    WrongPhase(RunPhase),

    #[error("Task '{0}' has not finished")]
    TaskNotTerminal(TaskId),

    #[error("Task '{0}' succeeded without producing output")]
    MissingOutput(TaskId),

    #[error("Task '{task}' produced {found} output, expected {expected}")]
    OutputMismatch {
        task: TaskId,
        expected: &'static str,
        found: &'static str,
    },
}

/// Errors surfaced by coordinator operations.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("Research run {0} not found")]
    NotFound(Uuid),

    #[error("Report not ready: run is {phase}")]
    NotReady { phase: RunPhase },

    #[error("Run is already {phase}")]
    AlreadyTerminal { phase: RunPhase },

    #[error("Invalid phase transition {from} -> {to}")]
    InvalidTransition { from: RunPhase, to: RunPhase },

    #[error("Task '{task}' cannot start: dependency '{dependency}' has not succeeded")]
    DependencyNotSatisfied { task: TaskId, dependency: TaskId },

    #[error("Unknown task '{0}'")]
    UnknownTask(TaskId),

    #[error("Task '{task}' cannot move from {from} to {to}")]
    InvalidTaskTransition {
        task: TaskId,
        from: &'static str,
        to: &'static str,
    },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),
}

pub type OrchestrationResult<T> = std::result::Result<T, OrchestrationError>;
